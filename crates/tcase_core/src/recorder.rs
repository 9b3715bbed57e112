//! Buffering controller used by retries.
//!
//! A [`Recorder`] wraps another controller and keeps every report it receives instead of
//! passing it on. A retry attempt that fails can then be discarded, while the final attempt is
//! replayed onto the real controller in recorded order.

use crate::controller::{Cleanup, Controller, UnitFn};
use crate::error::{Abort, Flow, Result, SpecError};
use std::cell::{Cell, RefCell};

enum Record {
    Log(String),
    Error(String),
    Fatal(String),
    Skip(String),
    Cleanup(Cleanup),
}

/// Controller decorator that records reports for later forwarding.
pub struct Recorder<'a> {
    inner: &'a dyn Controller,
    records: RefCell<Vec<Record>>,
    failed: Cell<bool>,
    skipped: Cell<bool>,
}

impl<'a> Recorder<'a> {
    /// Creates an empty recorder over `inner`.
    pub fn new(inner: &'a dyn Controller) -> Self {
        Self {
            inner,
            records: RefCell::new(Vec::new()),
            failed: Cell::new(false),
            skipped: Cell::new(false),
        }
    }

    /// Whether a failure was recorded.
    pub fn is_failed(&self) -> bool {
        self.failed.get()
    }

    /// Whether a skip was recorded.
    pub fn is_skipped(&self) -> bool {
        self.skipped.get()
    }

    /// Runs and drops the recorded cleanups, last registered first.
    pub fn cleanup_now(&self) {
        loop {
            let next = {
                let mut records = self.records.borrow_mut();
                let position = records
                    .iter()
                    .rposition(|record| matches!(record, Record::Cleanup(_)));
                position.map(|index| records.remove(index))
            };
            match next {
                Some(Record::Cleanup(cleanup)) => cleanup(),
                _ => break,
            }
        }
    }

    /// Replays the recorded reports onto the wrapped controller.
    ///
    /// Returns the abort of a recorded fatal failure or skip, if any.
    pub fn forward(self) -> Flow {
        let mut outcome = Ok(());
        for record in self.records.into_inner() {
            match record {
                Record::Log(message) => self.inner.log(&message),
                Record::Error(message) => self.inner.error(&message),
                Record::Fatal(message) => {
                    outcome = Err(self.inner.fatal(&message));
                }
                Record::Skip(reason) => {
                    outcome = Err(self.inner.skip(&reason));
                }
                Record::Cleanup(cleanup) => self.inner.cleanup(cleanup),
            }
        }
        outcome
    }
}

impl Controller for Recorder<'_> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn run(&self, name: &str, unit: UnitFn) -> bool {
        self.inner.run(name, unit)
    }

    fn log(&self, message: &str) {
        self.records
            .borrow_mut()
            .push(Record::Log(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.failed.set(true);
        self.records
            .borrow_mut()
            .push(Record::Error(message.to_string()));
    }

    fn fatal(&self, message: &str) -> Abort {
        self.failed.set(true);
        self.records
            .borrow_mut()
            .push(Record::Fatal(message.to_string()));
        Abort::Failed
    }

    fn skip(&self, reason: &str) -> Abort {
        self.skipped.set(true);
        self.records
            .borrow_mut()
            .push(Record::Skip(reason.to_string()));
        Abort::Skipped
    }

    fn failed(&self) -> bool {
        self.failed.get()
    }

    fn cleanup(&self, cleanup: Cleanup) {
        self.records.borrow_mut().push(Record::Cleanup(cleanup));
    }

    fn declare_concurrent(&self) -> Result<()> {
        Err(SpecError::ConcurrencyUnsupported(format!(
            "{:?} is running under a retry recorder",
            self.inner.name()
        )))
    }

    fn is_short(&self) -> bool {
        self.inner.is_short()
    }

    fn is_benchmark(&self) -> bool {
        self.inner.is_benchmark()
    }
}
