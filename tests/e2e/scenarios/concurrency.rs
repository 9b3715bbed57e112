use crate::harness::SuiteScenario;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;
use tcase_core::{Controller, Flow, Scope, T};

/// Counts arrivals and lets each arrival wait for the others
#[derive(Clone, Default)]
struct Rendezvous {
    state: Arc<(Mutex<usize>, Condvar)>,
}

impl Rendezvous {
    fn arrive(&self, expected: usize, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.state;
        let mut arrived = lock.lock().unwrap_or_else(PoisonError::into_inner);
        *arrived += 1;
        cvar.notify_all();
        let (arrived, _) = cvar
            .wait_timeout_while(arrived, timeout, |n| *n < expected)
            .unwrap_or_else(PoisonError::into_inner);
        *arrived >= expected
    }
}

fn meet(
    rendezvous: &Rendezvous,
    timeout: Duration,
) -> impl Fn(&T<'_>) -> Flow + Send + Sync + 'static {
    let rendezvous = rendezvous.clone();
    move |t| {
        if rendezvous.arrive(2, timeout) {
            Ok(())
        } else {
            Err(t.fatal("the other test never arrived"))
        }
    }
}

fn pair(s: &mut Scope<'_>, timeout: Duration) -> tcase_core::Result<()> {
    let rendezvous = Rendezvous::default();
    s.test("a", meet(&rendezvous, timeout))?;
    s.test("b", meet(&rendezvous, timeout))
}

#[test]
fn test_parallel_tests_overlap() {
    SuiteScenario::new("parallel")
        .suite(|s| {
            s.parallel()?;
            pair(s, Duration::from_secs(5))
        })
        .expect_all_passed()
        .expect_concurrent("a", true)
        .expect_concurrent("b", true)
        .run()
        .unwrap();
}

#[test]
fn test_parallel_inherits_into_nested_scopes() {
    SuiteScenario::new("inherited")
        .suite(|s| {
            s.no_side_effect()?;
            s.describe("group", |s| pair(s, Duration::from_secs(5)))
        })
        .expect_all_passed()
        .expect_concurrent("group/a", true)
        .run()
        .unwrap();
}

#[test]
fn test_unset_concurrency_runs_one_at_a_time() {
    SuiteScenario::new("default_sequential")
        .suite(|s| pair(s, Duration::from_millis(200)))
        .expect_failed(&["a"])
        .expect_concurrent("a", false)
        .expect_log("a", "never arrived")
        .run()
        .unwrap();
}

#[test]
fn test_sequential_descendant_overrides_parallel_ancestor() {
    SuiteScenario::new("sequential_below")
        .suite(|s| {
            s.parallel()?;
            s.describe("side effects", |s| {
                s.has_side_effect()?;
                pair(s, Duration::from_millis(200))
            })
        })
        .expect_failed(&["side effects/a"])
        .expect_concurrent("side effects/b", false)
        .run()
        .unwrap();
}

#[test]
fn test_sequential_ancestor_overrides_parallel_descendant() {
    SuiteScenario::new("sequential_above")
        .suite(|s| {
            s.sequential()?;
            s.describe("group", |s| {
                s.parallel()?;
                pair(s, Duration::from_millis(200))
            })
        })
        .expect_failed(&["group/a"])
        .run()
        .unwrap();
}

#[test]
fn test_parallel_scope_does_not_affect_siblings() {
    SuiteScenario::new("siblings")
        .suite(|s| {
            s.describe("fast", |s| {
                s.parallel()?;
                pair(s, Duration::from_secs(5))
            })?;
            s.describe("slow", |s| s.test("alone", |_| Ok(())))
        })
        .expect_all_passed()
        .expect_concurrent("fast/a", true)
        .expect_concurrent("slow/alone", false)
        .run()
        .unwrap();
}
