use crate::harness::{Journal, SuiteScenario};
use tcase_core::{race, Controller, Outcome, RaceBlock};

#[test]
fn test_panic_is_confined_to_its_test() {
    let journal = Journal::new();
    let j = journal.clone();

    SuiteScenario::new("panic")
        .suite(move |s| {
            let deferred = j.clone();
            s.test("boom", move |t| {
                let deferred = deferred.clone();
                t.defer(move || deferred.record("unwound"));
                panic!("exploded");
            })?;
            let sibling = j.clone();
            s.test("sibling", move |_| Ok(sibling.record("sibling ran")))
        })
        .expect_failed(&["boom"])
        .expect_log("boom", "panic: exploded")
        .expect_outcome("sibling", Outcome::Passed)
        .run()
        .unwrap();

    assert_eq!(journal.events(), vec!["unwound", "sibling ran"]);
}

#[test]
fn test_fatal_in_before_hook_stops_the_test_but_unwinds() {
    let journal = Journal::new();
    let j = journal.clone();

    SuiteScenario::new("fatal_setup")
        .suite(move |s| {
            s.describe("broken setup", |s| {
                let after = j.clone();
                s.after(move |_| Ok(after.record("after")))?;
                s.before(|t| Err(t.fatal("database unavailable")))?;
                let body = j.clone();
                s.test("never runs", move |_| Ok(body.record("body")))
            })?;
            s.test("healthy", |_| Ok(()))
        })
        .expect_failed(&["broken setup/never runs"])
        .expect_log("broken setup/never runs", "database unavailable")
        .expect_outcome("healthy", Outcome::Passed)
        .run()
        .unwrap();

    assert_eq!(journal.events(), vec!["after"]);
}

#[test]
fn test_non_fatal_errors_let_the_test_continue() {
    let journal = Journal::new();
    let j = journal.clone();

    SuiteScenario::new("errors")
        .suite(move |s| {
            s.test("reports twice", move |t| {
                t.error("first problem");
                t.error("second problem");
                j.record("reached end");
                Ok(())
            })
        })
        .expect_failed(&["reports twice"])
        .expect_log("reports twice", "first problem")
        .expect_log("reports twice", "second problem")
        .run()
        .unwrap();

    assert_eq!(journal.events(), vec!["reached end"]);
}

#[test]
fn test_skip_on_scope_skips_subtree_without_hooks() {
    let journal = Journal::new();
    let j = journal.clone();

    SuiteScenario::new("skipped_scope")
        .suite(move |s| {
            s.describe("unsupported", |s| {
                s.skip("needs a GPU")?;
                let before = j.clone();
                s.before(move |_| Ok(before.record("before")))?;
                s.test("a", |_| Ok(()))?;
                s.describe("deeper", |s| s.test("b", |_| Ok(())))
            })?;
            s.test("supported", |_| Ok(()))
        })
        .expect_counts(1, 0, 2)
        .expect_outcome("unsupported/a", Outcome::Skipped)
        .expect_outcome("unsupported/deeper/b", Outcome::Skipped)
        .expect_log("unsupported/a", "needs a GPU")
        .run()
        .unwrap();

    assert!(journal.events().is_empty());
}

#[test]
fn test_panicking_after_hook_fails_test_but_others_still_unwind() {
    let journal = Journal::new();
    let j = journal.clone();

    SuiteScenario::new("after_panic")
        .suite(move |s| {
            let outer = j.clone();
            s.after(move |_| Ok(outer.record("outer after")))?;
            s.after(|_| panic!("teardown broke"))?;
            s.test("leaf", |_| Ok(()))
        })
        .expect_failed(&["leaf"])
        .expect_log("leaf", "panic in after hook: teardown broke")
        .run()
        .unwrap();

    assert_eq!(journal.events(), vec!["outer after"]);
}

#[test]
fn test_race_runs_blocks_concurrently_inside_a_test() {
    SuiteScenario::new("race")
        .suite(|s| {
            s.test("all blocks finish", |t| {
                let journal = Journal::new();
                let blocks: Vec<RaceBlock<'_>> = (0..3)
                    .map(|i| {
                        let journal = journal.clone();
                        Box::new(move || {
                            journal.record(format!("block {}", i));
                            Ok(())
                        }) as RaceBlock<'_>
                    })
                    .collect();
                race(blocks)?;
                let mut events = journal.events();
                events.sort();
                if events != ["block 0", "block 1", "block 2"] {
                    return Err(t.fatal(&format!("unexpected events {:?}", events)));
                }
                Ok(())
            })
        })
        .expect_all_passed()
        .run()
        .unwrap();
}

#[test]
fn test_nul_in_description_runs_like_any_other_test() {
    SuiteScenario::new("nul_name")
        .suite(|s| {
            s.test("bad\0name", |_| Ok(()))?;
            s.test("sibling", |_| Ok(()))
        })
        .expect_counts(2, 0, 0)
        .expect_outcome("bad\0name", Outcome::Passed)
        .expect_outcome("sibling", Outcome::Passed)
        .run()
        .unwrap();
}
