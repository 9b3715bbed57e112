//! The controller contract the engine consumes from its host environment.

use crate::error::{Abort, Result};
use std::any::Any;

/// A teardown callback registered on a unit. Runs LIFO when the unit finishes.
pub type Cleanup = Box<dyn FnOnce()>;

/// Body of a named sub-unit.
pub type UnitFn = Box<dyn FnOnce(&dyn Controller) + Send>;

/// Host capability that executes and reports units of work.
///
/// This is the only thing the engine needs from a test framework: run a named sub-unit,
/// report failures (fatal or not), register cleanups, log, and opt a unit into concurrent
/// execution. A fatal report doesn't unwind anything by itself; it returns an [`Abort`]
/// that the caller propagates with `?` so registered cleanups still run at the unit boundary.
pub trait Controller {
    /// Name of the unit this controller reports for.
    fn name(&self) -> &str;

    /// Executes `unit` as an independently reportable sub-unit.
    ///
    /// Returns `false` when the sub-unit is known to have failed. A sub-unit that declared
    /// concurrent execution may still be running when this returns.
    fn run(&self, name: &str, unit: UnitFn) -> bool;

    /// Records diagnostic output. Logs of failed units must be surfaced.
    fn log(&self, message: &str);

    /// Reports a non-fatal failure; the unit keeps running.
    fn error(&self, message: &str);

    /// Reports a failure that ends the unit. Return the result with `Err(..)`.
    fn fatal(&self, message: &str) -> Abort {
        self.error(message);
        Abort::Failed
    }

    /// Marks the unit as skipped. Return the result with `Err(..)`.
    fn skip(&self, reason: &str) -> Abort;

    /// Whether the unit has failed so far.
    fn failed(&self) -> bool;

    /// Registers a cleanup that runs when the unit finishes, regardless of outcome.
    fn cleanup(&self, cleanup: Cleanup);

    /// Opts the unit into concurrent execution with its siblings.
    ///
    /// # Errors
    ///
    /// Rejected once the unit has started sub-units, or when it already runs concurrently.
    fn declare_concurrent(&self) -> Result<()>;

    /// Whether the run is abbreviated and long-running checks should be skipped.
    fn is_short(&self) -> bool {
        false
    }

    /// Whether the run measures performance instead of correctness.
    fn is_benchmark(&self) -> bool {
        false
    }
}

/// Renders a panic payload for reporting.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
