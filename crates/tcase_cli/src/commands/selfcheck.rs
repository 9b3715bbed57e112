//! Self-check command: runs a bundled suite through the local controller.

use anyhow::{bail, Result};
use console::style;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tcase_core::{
    race, Controller, Flow, LocalController, LocalOptions, Outcome, RetryPolicy, RunConfig, Suite,
    TestOptions, UnitReport, Var, T,
};

const RENDEZVOUS_TIMEOUT: Duration = Duration::from_secs(5);

/// Run the self-check suite and print one line per test.
pub fn run(seed: Option<u64>, ordering: Option<&str>, short: bool) -> Result<()> {
    let mut config = RunConfig::from_env()?;
    if let Some(seed) = seed {
        config.seed = Some(seed);
    }
    if let Some(ordering) = ordering {
        config.ordering = ordering.parse()?;
    }

    let suite = build_suite()?;
    let root = LocalController::new(
        "selfcheck",
        LocalOptions {
            short,
            benchmark: false,
        },
    );
    let summary = suite.run(&root, &config);
    let report = root.finish();

    println!(
        "{} {} tests, seed {} ({})",
        style("Self-check:").bold(),
        summary.scheduled,
        style(summary.seed).cyan(),
        summary.ordering
    );
    print_report(&report, 0);
    println!();

    let passed = report.count(Outcome::Passed);
    let failed = report.count(Outcome::Failed);
    let skipped = report.count(Outcome::Skipped);
    println!(
        "  {} passed, {} failed, {} skipped",
        style(passed).green(),
        style(failed).red(),
        style(skipped).yellow()
    );

    if failed > 0 {
        bail!(
            "self-check failed; reproduce with TESTCASE_SEED={}",
            summary.seed
        );
    }
    Ok(())
}

fn print_report(report: &UnitReport, depth: usize) {
    for child in &report.children {
        let indent = "  ".repeat(depth + 1);
        if child.children.is_empty() {
            let marker = match child.outcome {
                Outcome::Passed => style("✓").green(),
                Outcome::Failed => style("×").red(),
                Outcome::Skipped => style("-").yellow(),
            };
            println!("{}{} {}", indent, marker, child.name);
            if child.outcome == Outcome::Failed {
                for log in &child.logs {
                    println!("{}    {}", indent, style(log).dim());
                }
            }
        } else {
            println!("{}{}", indent, style(&child.name).bold());
            print_report(child, depth + 1);
        }
    }
}

struct Rendezvous {
    tx: Mutex<Sender<()>>,
    rx: Mutex<Receiver<()>>,
}

fn rendezvous_pair() -> (Arc<Rendezvous>, Arc<Rendezvous>) {
    let (tx_a, rx_a) = mpsc::channel();
    let (tx_b, rx_b) = mpsc::channel();
    (
        Arc::new(Rendezvous {
            tx: Mutex::new(tx_a),
            rx: Mutex::new(rx_b),
        }),
        Arc::new(Rendezvous {
            tx: Mutex::new(tx_b),
            rx: Mutex::new(rx_a),
        }),
    )
}

fn record(
    trail: &Var<Vec<&'static str>>,
    step: &'static str,
) -> impl Fn(&T<'_>) -> Flow + Send + Sync + 'static {
    let trail = trail.clone();
    move |t| {
        let mut steps = trail.get(t)?;
        steps.push(step);
        trail.set(t, steps)
    }
}

fn build_suite() -> tcase_core::Result<Suite> {
    Suite::build("selfcheck", |s| {
        s.describe("variables", |s| {
            let evaluations = Arc::new(AtomicUsize::new(0));
            let counted = s.let_var("counted", {
                let evaluations = Arc::clone(&evaluations);
                move |_| evaluations.fetch_add(1, Ordering::SeqCst)
            })?;
            let level = s.let_value("level", 1_u32)?;

            s.test("reads are memoized", {
                let counted = counted.clone();
                move |t| {
                    let first = counted.get(t)?;
                    if counted.get(t)? != first {
                        return Err(t.fatal("variable evaluated twice"));
                    }
                    Ok(())
                }
            })?;

            s.describe("nested", |s| {
                level.bind_value(s, 2)?;
                let level = level.clone();
                s.test("nearest binding wins", move |t| {
                    assert_eq!(level.get(t)?, 2);
                    Ok(())
                })
            })?;

            s.test("outer binding is unaffected", move |t| {
                assert_eq!(level.get(t)?, 1);
                level.set(t, 10)?;
                assert_eq!(level.get(t)?, 10);
                Ok(())
            })
        })?;

        s.describe("hooks", |s| {
            let trail: Var<Vec<&'static str>> = s.let_var("trail", |_| Vec::new())?;
            s.before(record(&trail, "outer"))?;
            s.describe("nested", |s| {
                s.before(record(&trail, "inner"))?;
                s.test("ancestors set up first", move |t| {
                    assert_eq!(trail.get(t)?, vec!["outer", "inner"]);
                    Ok(())
                })
            })
        })?;

        s.describe("retries", |s| {
            let attempts = Arc::new(AtomicUsize::new(0));
            s.test_with(
                "flaky test passes on a later attempt",
                TestOptions::new().flaky(RetryPolicy::Count(2)),
                move |t| {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        t.error("first attempt fails");
                    }
                    Ok(())
                },
            )?;

            s.test("eventually converges", |t| {
                let mut polls = 0;
                t.eventually(|c| {
                    polls += 1;
                    if polls < 3 {
                        c.error("not converged");
                    }
                    Ok(())
                })
            })
        })?;

        s.describe("concurrency", |s| {
            s.parallel()?;
            let (left, right) = rendezvous_pair();
            for (name, side) in [("left", left), ("right", right)] {
                s.test(name, move |t| {
                    if t.is_short() {
                        return Err(t.skip("rendezvous skipped in short mode"));
                    }
                    side.tx
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .send(())
                        .map_err(|_| t.fatal("partner is gone"))?;
                    side.rx
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .recv_timeout(RENDEZVOUS_TIMEOUT)
                        .map_err(|_| t.fatal("partner never arrived"))
                })?;
            }
            Ok(())
        })?;

        s.describe("race", |s| {
            s.test("blocks finish together", |_| {
                let hits = AtomicUsize::new(0);
                race(vec![
                    Box::new(|| {
                        hits.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
                    Box::new(|| {
                        hits.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
                ])?;
                assert_eq!(hits.load(Ordering::SeqCst), 2);
                Ok(())
            })
        })
    })
}
