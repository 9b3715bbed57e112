use crate::harness::{Journal, SuiteScenario};
use rand::Rng;
use std::sync::{Arc, Mutex};
use tcase_core::{Controller, OrderingKind, Outcome, ResolvedConfig, Scope, Suite};

const NAMES: [&str; 8] = ["a", "b", "c", "d", "e", "f", "g", "h"];

fn recording_suite(journal: Journal) -> impl FnOnce(&mut Scope<'_>) -> tcase_core::Result<()> {
    move |s| {
        for group in ["first", "second"] {
            let journal = journal.clone();
            s.describe(group, move |s| {
                for name in NAMES {
                    let journal = journal.clone();
                    let event = format!("{}/{}", group, name);
                    s.test(name, move |_| Ok(journal.record(event.clone())))?;
                }
                Ok(())
            })?;
        }
        Ok(())
    }
}

fn run_order(seed: u64, ordering: OrderingKind) -> Vec<String> {
    let journal = Journal::new();
    SuiteScenario::new("ordered")
        .seed(seed)
        .ordering(ordering)
        .suite(recording_suite(journal.clone()))
        .expect_all_passed()
        .run()
        .unwrap();
    journal.events()
}

fn declared() -> Vec<String> {
    ["first", "second"]
        .iter()
        .flat_map(|group| NAMES.iter().map(move |name| format!("{}/{}", group, name)))
        .collect()
}

#[test]
fn test_defined_ordering_follows_declaration() {
    assert_eq!(run_order(42, OrderingKind::Defined), declared());
    assert_eq!(run_order(7, OrderingKind::Defined), declared());
}

#[test]
fn test_random_ordering_is_reproducible_from_seed() {
    let first = run_order(42, OrderingKind::Random);
    let second = run_order(42, OrderingKind::Random);
    assert_eq!(first, second);

    let mut sorted = first.clone();
    sorted.sort();
    assert_eq!(sorted, declared());
}

#[test]
fn test_random_ordering_depends_on_seed() {
    let baseline = run_order(1, OrderingKind::Random);
    let differs = (2..10).any(|seed| run_order(seed, OrderingKind::Random) != baseline);
    assert!(differs, "every seed produced the same order");
}

#[test]
fn test_plan_matches_execution_order() {
    let journal = Journal::new();
    let suite = Suite::build("ordered", recording_suite(journal.clone())).unwrap();
    let config = ResolvedConfig::new(1234, OrderingKind::Random);

    let planned: Vec<String> = suite
        .plan(&config)
        .into_iter()
        .map(|path| path.trim_start_matches("ordered/").to_string())
        .collect();
    let executed = run_order(1234, OrderingKind::Random);
    assert_eq!(planned, executed);
    assert!(journal.events().is_empty());
}

#[test]
fn test_random_source_is_stable_per_test() {
    let draws = Arc::new(Mutex::new(Vec::new()));

    let run = |draws: Arc<Mutex<Vec<(String, u64, u64)>>>| {
        SuiteScenario::new("random")
            .seed(99)
            .suite(move |s| {
                for name in ["x", "y"] {
                    let draws = draws.clone();
                    s.test(name, move |t| {
                        let value: u64 = t.random().gen();
                        draws.lock().unwrap().push((name.to_string(), t.seed(), value));
                        Ok(())
                    })?;
                }
                Ok(())
            })
            .expect_all_passed()
            .run()
            .unwrap();
    };

    run(draws.clone());
    run(draws.clone());

    let draws = draws.lock().unwrap();
    assert_eq!(draws.len(), 4);
    assert_eq!(draws[0], draws[2]);
    assert_eq!(draws[1], draws[3]);
    assert_ne!(draws[0].1, draws[1].1, "sibling tests share a seed");
}

#[test]
fn test_seed_permutation_is_pinned() {
    let journal = Journal::new();
    let j = journal.clone();

    SuiteScenario::new("pinned")
        .seed(42)
        .ordering(OrderingKind::Random)
        .suite(move |s| {
            for n in 1..=5 {
                let journal = j.clone();
                s.test("", move |_| Ok(journal.record(n.to_string())))?;
            }
            Ok(())
        })
        .expect_all_passed()
        .run()
        .unwrap();

    assert_eq!(journal.events(), vec!["1", "5", "4", "2", "3"]);
}

#[test]
fn test_generated_seed_is_reported_under_defined_ordering() {
    SuiteScenario::new("reported_seed")
        .seed(1234)
        .generated_seed()
        .suite(|s| {
            s.test("draws", |t| {
                let value: u64 = t.random().gen();
                t.error(&format!("failed with draw {}", value));
                Ok(())
            })
        })
        .expect_failed(&["draws"])
        .expect_report(|report, summary| {
            anyhow::ensure!(summary.seed_generated);
            anyhow::ensure!(
                report.logs.iter().any(|log| log == "TESTCASE_SEED=1234"),
                "seed not reported: {:?}",
                report.logs
            );
            Ok(())
        })
        .run()
        .unwrap();
}

#[test]
fn test_repeated_descriptions_get_distinct_units_and_seeds() {
    let seeds = Arc::new(Mutex::new(Vec::new()));
    let recorded = seeds.clone();

    SuiteScenario::new("duplicates")
        .seed(7)
        .suite(move |s| {
            for _ in 0..2 {
                let recorded = recorded.clone();
                s.test("same", move |t| {
                    recorded.lock().unwrap().push(t.seed());
                    Ok(())
                })?;
            }
            Ok(())
        })
        .expect_all_passed()
        .expect_outcome("same", Outcome::Passed)
        .expect_outcome("same#01", Outcome::Passed)
        .run()
        .unwrap();

    let seeds = seeds.lock().unwrap();
    assert_eq!(seeds.len(), 2);
    assert_ne!(seeds[0], seeds[1]);
}
