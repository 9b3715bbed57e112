//! Thread-backed controller for running suites outside a host test framework.
//!
//! Every sub-unit runs on its own thread. A sub-unit that doesn't opt into concurrency runs to
//! completion before [`Controller::run`] returns. A sub-unit that calls
//! [`Controller::declare_concurrent`] pauses, lets its parent continue, and resumes together
//! with its concurrent siblings once the parent's own function has returned. The parent then
//! waits for them before running its cleanups.

use crate::controller::{panic_message, Cleanup, Controller, UnitFn};
use crate::error::{Abort, Result, SpecError};
use serde::Serialize;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Run-wide switches of a [`LocalController`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalOptions {
    /// Abbreviated run.
    pub short: bool,
    /// Benchmark run.
    pub benchmark: bool,
}

/// Final state of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Finished without failures.
    Passed,
    /// Reported at least one failure, itself or in a sub-unit.
    Failed,
    /// Skipped before finishing.
    Skipped,
}

/// Result tree produced by a [`LocalController`].
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    /// Unit name.
    pub name: String,
    /// Outcome of the unit.
    pub outcome: Outcome,
    /// Whether the unit ran concurrently with its siblings.
    pub concurrent: bool,
    /// Logged messages, failures included.
    pub logs: Vec<String>,
    /// Sub-units in the order they were started.
    pub children: Vec<UnitReport>,
}

impl UnitReport {
    fn crashed(name: &str) -> Self {
        Self {
            name: name.to_string(),
            outcome: Outcome::Failed,
            concurrent: false,
            logs: vec!["unit thread terminated unexpectedly".to_string()],
            children: Vec::new(),
        }
    }

    /// Returns true unless the unit failed.
    pub fn passed(&self) -> bool {
        self.outcome != Outcome::Failed
    }

    /// Counts units without sub-units that ended with `outcome`.
    ///
    /// Suites only start sub-units for scopes that contain tests, so these are the tests.
    pub fn count(&self, outcome: Outcome) -> usize {
        if self.children.is_empty() {
            return usize::from(self.outcome == outcome);
        }
        self.children.iter().map(|child| child.count(outcome)).sum()
    }

    /// Finds a descendant by the names along its path.
    pub fn find(&self, path: &[&str]) -> Option<&UnitReport> {
        let Some((first, rest)) = path.split_first() else {
            return Some(self);
        };
        self.children
            .iter()
            .find(|child| child.name == *first)
            .and_then(|child| child.find(rest))
    }

    /// Slash-joined names of failed units without sub-units.
    pub fn failures(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_failures("", &mut out);
        out
    }

    fn collect_failures(&self, prefix: &str, out: &mut Vec<String>) {
        let name = if prefix.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", prefix, self.name)
        };
        if self.children.is_empty() {
            if self.outcome == Outcome::Failed {
                out.push(name);
            }
            return;
        }
        for child in &self.children {
            child.collect_failures(&name, out);
        }
    }
}

enum Signal {
    Paused,
    Done,
}

/// One-shot latch that releases paused concurrent sub-units.
struct Gate {
    open: Mutex<bool>,
    signal: Condvar,
}

impl Gate {
    fn new() -> Self {
        Self {
            open: Mutex::new(false),
            signal: Condvar::new(),
        }
    }

    fn open(&self) {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        *open = true;
        self.signal.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        while !*open {
            open = self
                .signal
                .wait(open)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

struct ParentLink {
    signal: Sender<Signal>,
    gate: Arc<Gate>,
}

enum ChildSlot {
    Done(UnitReport),
    Paused(String, JoinHandle<UnitReport>),
}

#[derive(Default)]
struct UnitState {
    failed: bool,
    skipped: bool,
    concurrent: bool,
    started_children: bool,
    logs: Vec<String>,
    cleanups: Vec<Cleanup>,
    children: Vec<ChildSlot>,
}

/// [`Controller`] implementation backed by OS threads.
pub struct LocalController {
    name: String,
    options: LocalOptions,
    state: RefCell<UnitState>,
    release: Arc<Gate>,
    parent: Option<ParentLink>,
}

impl LocalController {
    /// Creates a root unit.
    pub fn new(name: impl Into<String>, options: LocalOptions) -> Self {
        Self {
            name: name.into(),
            options,
            state: RefCell::new(UnitState::default()),
            release: Arc::new(Gate::new()),
            parent: None,
        }
    }

    fn child(name: String, options: LocalOptions, parent: ParentLink) -> Self {
        Self {
            name,
            options,
            state: RefCell::new(UnitState::default()),
            release: Arc::new(Gate::new()),
            parent: Some(parent),
        }
    }

    /// Finishes the unit: resumes and awaits concurrent sub-units, runs cleanups LIFO, and
    /// returns the report.
    pub fn finish(self) -> UnitReport {
        self.release.open();

        let slots = std::mem::take(&mut self.state.borrow_mut().children);
        let mut children = Vec::with_capacity(slots.len());
        for slot in slots {
            let report = match slot {
                ChildSlot::Done(report) => report,
                ChildSlot::Paused(name, handle) => handle
                    .join()
                    .unwrap_or_else(|_| UnitReport::crashed(&name)),
            };
            if report.outcome == Outcome::Failed {
                self.state.borrow_mut().failed = true;
            }
            children.push(report);
        }

        loop {
            let next = self.state.borrow_mut().cleanups.pop();
            let Some(cleanup) = next else { break };
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(cleanup)) {
                let message = format!("panic in cleanup: {}", panic_message(&*payload));
                warn!(unit = %self.name, "{}", message);
                self.error(&message);
            }
        }

        let state = self.state.into_inner();
        let outcome = if state.failed {
            Outcome::Failed
        } else if state.skipped {
            Outcome::Skipped
        } else {
            Outcome::Passed
        };
        UnitReport {
            name: self.name,
            outcome,
            concurrent: state.concurrent,
            logs: state.logs,
            children,
        }
    }
}

impl Controller for LocalController {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, name: &str, unit: UnitFn) -> bool {
        self.state.borrow_mut().started_children = true;

        let (tx, rx) = mpsc::channel();
        let link = ParentLink {
            signal: tx.clone(),
            gate: Arc::clone(&self.release),
        };
        let options = self.options;
        let child_name = name.to_string();

        // Thread names can't hold NUL bytes; the unit keeps its real name.
        let spawned = thread::Builder::new()
            .name(child_name.replace('\0', "\u{fffd}"))
            .spawn(move || {
                let child = LocalController::child(child_name, options, link);
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| unit(&child))) {
                    let message = format!("panic: {}", panic_message(&*payload));
                    warn!(unit = %child.name, "{}", message);
                    child.error(&message);
                }
                let report = child.finish();
                let _ = tx.send(Signal::Done);
                report
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.error(&format!("failed to start unit {:?}: {}", name, e));
                return false;
            }
        };

        match rx.recv() {
            Ok(Signal::Paused) => {
                debug!(parent = %self.name, unit = name, "unit paused for concurrent run");
                self.state
                    .borrow_mut()
                    .children
                    .push(ChildSlot::Paused(name.to_string(), handle));
                true
            }
            Ok(Signal::Done) | Err(_) => {
                let report = handle.join().unwrap_or_else(|_| UnitReport::crashed(name));
                let passed = report.passed();
                let mut state = self.state.borrow_mut();
                if !passed {
                    state.failed = true;
                }
                state.children.push(ChildSlot::Done(report));
                passed
            }
        }
    }

    fn log(&self, message: &str) {
        debug!(unit = %self.name, "{}", message);
        self.state.borrow_mut().logs.push(message.to_string());
    }

    fn error(&self, message: &str) {
        let mut state = self.state.borrow_mut();
        state.failed = true;
        state.logs.push(message.to_string());
    }

    fn skip(&self, reason: &str) -> Abort {
        let mut state = self.state.borrow_mut();
        state.skipped = true;
        if !reason.is_empty() {
            state.logs.push(reason.to_string());
        }
        Abort::Skipped
    }

    fn failed(&self) -> bool {
        self.state.borrow().failed
    }

    fn cleanup(&self, cleanup: Cleanup) {
        self.state.borrow_mut().cleanups.push(cleanup);
    }

    fn declare_concurrent(&self) -> Result<()> {
        {
            let mut state = self.state.borrow_mut();
            if state.concurrent {
                return Err(SpecError::AlreadyConcurrent {
                    unit: self.name.clone(),
                });
            }
            if state.started_children {
                return Err(SpecError::ConcurrentAfterChildren {
                    unit: self.name.clone(),
                });
            }
            state.concurrent = true;
        }

        if let Some(parent) = &self.parent {
            let _ = parent.signal.send(Signal::Paused);
            parent.gate.wait();
        }
        Ok(())
    }

    fn is_short(&self) -> bool {
        self.options.short
    }

    fn is_benchmark(&self) -> bool {
        self.options.benchmark
    }
}
