use crate::harness::{Journal, SuiteScenario};
use std::collections::HashMap;
use std::fs;
use tcase_core::{
    Controller, LocalController, LocalOptions, OrderingKind, RunConfig, Suite, ENV_ORDERING,
    ENV_SEED, FILE_NAME,
};
use tempfile::TempDir;

fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

fn two_tests() -> Suite {
    Suite::build("configured", |s| {
        s.test("a", |_| Ok(()))?;
        s.test("b", |_| Ok(()))
    })
    .unwrap()
}

#[test]
fn test_file_then_environment() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(FILE_NAME);
    fs::write(
        &path,
        "seed = 5\nordering = \"random\"\n\n[eventually]\ntimeout_ms = 250\n",
    )
    .unwrap();

    let config = RunConfig::load(&path).unwrap();
    assert_eq!(config.seed, Some(5));
    assert_eq!(config.ordering, OrderingKind::Random);
    assert_eq!(config.eventually.timeout_ms, 250);
    assert_eq!(config.eventually.interval_ms, 10);

    let config = config
        .with_overrides(overrides(&[(ENV_SEED, "-1"), (ENV_ORDERING, "defined")]))
        .unwrap();
    assert_eq!(config.seed, Some(u64::MAX));
    assert_eq!(config.ordering, OrderingKind::Defined);
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let config = RunConfig::load(&dir.path().join(FILE_NAME)).unwrap();
    assert_eq!(config, RunConfig::default());
    assert_eq!(config.ordering, OrderingKind::Random);
}

#[test]
fn test_invalid_values_are_rejected() {
    let err = RunConfig::default()
        .with_overrides(overrides(&[(ENV_ORDERING, "alphabetical")]))
        .unwrap_err();
    assert!(err.recovery_suggestion().is_some());

    let err = RunConfig::default()
        .with_overrides(overrides(&[(ENV_SEED, "forty-two")]))
        .unwrap_err();
    assert!(err.to_string().contains(ENV_SEED));
}

#[test]
fn test_generated_seed_is_reported_on_random_runs() {
    let suite = two_tests();
    let root = LocalController::new("configured", LocalOptions::default());
    let summary = suite.run(&root, &RunConfig::default());
    let report = root.finish();

    assert!(summary.seed_generated);
    assert_eq!(summary.scheduled, 2);
    let expected = format!("{}={}", ENV_SEED, summary.seed);
    assert!(report.logs.contains(&expected), "logs: {:?}", report.logs);
}

#[test]
fn test_configured_seed_is_not_reported() {
    let suite = two_tests();
    let root = LocalController::new("configured", LocalOptions::default());
    let config = RunConfig {
        seed: Some(3),
        ..RunConfig::default()
    };
    let summary = suite.run(&root, &config);
    let report = root.finish();

    assert!(!summary.seed_generated);
    assert_eq!(summary.seed, 3);
    assert!(report.logs.is_empty());
    assert!(report.passed());
}

#[test]
fn test_short_mode_reaches_tests() {
    let journal = Journal::new();
    let j = journal.clone();

    SuiteScenario::new("short")
        .short()
        .suite(move |s| {
            s.test("long running", move |t| {
                if t.is_short() {
                    return Err(t.skip("skipped in short mode"));
                }
                j.record("ran");
                Ok(())
            })
        })
        .expect_counts(0, 0, 1)
        .expect_log("long running", "skipped in short mode")
        .run()
        .unwrap();

    assert!(journal.events().is_empty());
}
