//! Retry strategies and the retrying assertion runner.

use crate::controller::{panic_message, Controller};
use crate::error::{Abort, Flow, SpecError};
use crate::recorder::Recorder;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Decides how often a condition is re-evaluated.
///
/// `retry_while` calls `condition` at least once and keeps calling it while it returns true and
/// the strategy allows another attempt.
pub trait RetryStrategy: Send + Sync {
    /// Re-evaluates `condition` until it returns false or the strategy gives up.
    fn retry_while(&self, condition: &mut dyn FnMut() -> bool);
}

impl<F> RetryStrategy for F
where
    F: Fn(&mut dyn FnMut() -> bool) + Send + Sync,
{
    fn retry_while(&self, condition: &mut dyn FnMut() -> bool) {
        self(condition)
    }
}

/// Attempts a condition up to `n + 1` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryCount(pub usize);

impl RetryStrategy for RetryCount {
    fn retry_while(&self, condition: &mut dyn FnMut() -> bool) {
        for _ in 0..=self.0 {
            if !condition() {
                return;
            }
        }
    }
}

/// Retries until a deadline, pausing between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waiter {
    /// Pause between attempts. Zero yields the thread instead of sleeping.
    pub wait_duration: Duration,
    /// Total time budget measured from the first attempt.
    pub wait_timeout: Duration,
}

impl Waiter {
    /// Creates a waiter with the given pause and total budget.
    pub fn new(wait_duration: Duration, wait_timeout: Duration) -> Self {
        Self {
            wait_duration,
            wait_timeout,
        }
    }

    /// Pauses for one interval.
    pub fn wait(&self) {
        if self.wait_duration.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(self.wait_duration);
        }
    }
}

impl RetryStrategy for Waiter {
    fn retry_while(&self, condition: &mut dyn FnMut() -> bool) {
        let deadline = Instant::now() + self.wait_timeout;
        while condition() && Instant::now() < deadline {
            self.wait();
        }
    }
}

enum Escape {
    Abort(Abort),
    Panic(Box<dyn std::any::Any + Send>),
}

/// Runs an assertion block until it passes or the strategy gives up.
///
/// Each attempt reports into a fresh [`Recorder`]. Failed attempts are discarded after their
/// cleanups ran; only the final attempt reaches the real controller.
#[derive(Clone)]
pub struct Retry {
    strategy: Arc<dyn RetryStrategy>,
}

impl fmt::Debug for Retry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry").finish_non_exhaustive()
    }
}

impl Retry {
    /// Wraps an arbitrary strategy.
    pub fn new(strategy: impl RetryStrategy + 'static) -> Self {
        Self {
            strategy: Arc::new(strategy),
        }
    }

    /// Retries up to `n` extra times.
    pub fn count(n: usize) -> Self {
        Self::new(RetryCount(n))
    }

    /// Retries until `timeout` elapses, without pausing between attempts.
    pub fn timeout(timeout: Duration) -> Self {
        Self::new(Waiter::new(Duration::ZERO, timeout))
    }

    /// Runs `block` under the retry strategy and forwards the last attempt to `ctrl`.
    ///
    /// A fatal failure reported through the attempt's controller is retried like any other
    /// failure. A panic, or an abort that didn't come from the attempt's own controller, ends
    /// the retries and is propagated after the attempt's reports were forwarded.
    pub fn assert(
        &self,
        ctrl: &dyn Controller,
        mut block: impl FnMut(&dyn Controller) -> Flow,
    ) -> Flow {
        let mut last: Option<(Recorder<'_>, Option<Escape>)> = None;
        let mut attempt = 0usize;

        self.strategy.retry_while(&mut || {
            if let Some((previous, _)) = &last {
                previous.cleanup_now();
            }
            attempt += 1;

            let recorder = Recorder::new(ctrl);
            let escape = match panic::catch_unwind(AssertUnwindSafe(|| block(&recorder))) {
                Ok(Ok(())) => None,
                Ok(Err(abort)) => Some(Escape::Abort(abort)),
                Err(payload) => Some(Escape::Panic(payload)),
            };

            let retryable = match &escape {
                None => recorder.is_failed(),
                Some(Escape::Abort(Abort::Failed)) => recorder.is_failed(),
                Some(Escape::Abort(Abort::Skipped)) | Some(Escape::Panic(_)) => false,
            };
            if retryable {
                debug!(unit = ctrl.name(), attempt, "attempt failed");
            }
            last = Some((recorder, escape));
            retryable
        });

        let Some((recorder, escape)) = last else {
            return Ok(());
        };
        let forwarded = recorder.forward();
        match escape {
            Some(Escape::Panic(payload)) => {
                debug!(
                    unit = ctrl.name(),
                    "retry stopped by panic: {}",
                    panic_message(&*payload)
                );
                panic::resume_unwind(payload)
            }
            Some(Escape::Abort(abort)) => Err(abort),
            None => forwarded,
        }
    }
}

/// Flaky-test policy: either a retry count, a time budget, or an explicit retry strategy.
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    /// Up to `n` extra attempts.
    Count(usize),
    /// Attempts until the duration elapses.
    Timeout(Duration),
    /// A caller-provided retry.
    Strategy(Retry),
}

impl RetryPolicy {
    /// Converts the policy into a runnable retry.
    pub fn into_retry(self) -> Retry {
        match self {
            Self::Count(n) => Retry::count(n),
            Self::Timeout(timeout) => Retry::timeout(timeout),
            Self::Strategy(retry) => retry,
        }
    }

    /// Parses `"3"`, `"250ms"`, `"2s"` or `"1m"`.
    pub fn parse(input: &str) -> crate::Result<Self> {
        input.parse()
    }
}

impl FromStr for RetryPolicy {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || SpecError::InvalidRetryPolicy(format!("{:?}", s));

        if let Ok(count) = s.parse::<usize>() {
            return Ok(Self::Count(count));
        }

        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(invalid)?;
        let (digits, unit) = s.split_at(split);
        let amount: u64 = digits.parse().map_err(|_| invalid())?;
        let duration = match unit.trim() {
            "ms" => Duration::from_millis(amount),
            "s" => Duration::from_secs(amount),
            "m" => Duration::from_secs(amount * 60),
            _ => return Err(invalid()),
        };
        Ok(Self::Timeout(duration))
    }
}

impl From<usize> for RetryPolicy {
    fn from(n: usize) -> Self {
        Self::Count(n)
    }
}

impl From<Duration> for RetryPolicy {
    fn from(timeout: Duration) -> Self {
        Self::Timeout(timeout)
    }
}

impl From<Retry> for RetryPolicy {
    fn from(retry: Retry) -> Self {
        Self::Strategy(retry)
    }
}
