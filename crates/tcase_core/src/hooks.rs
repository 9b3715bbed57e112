//! Hook composition: turns the scopes on a test's path into its execution pipeline.

use crate::config::ResolvedConfig;
use crate::context::{Enclosing, Unwind, T};
use crate::controller::{panic_message, Controller};
use crate::error::Flow;
use crate::retry::Retry;
use crate::scope::{Concurrency, Entry, ScopeNode, TestCase};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Shared hook or test body.
pub type HookFn = Arc<dyn for<'a, 'c> Fn(&'a T<'c>) -> Flow + Send + Sync>;

pub(crate) type AroundFn = Arc<dyn for<'a, 'c> Fn(&'a T<'c>) -> Flow<Teardown> + Send + Sync>;

/// Post-work returned by an around hook.
///
/// It runs after everything nested inside the hook finished, in unwind order.
pub struct Teardown(Option<Box<dyn for<'a, 'c> FnOnce(&'a T<'c>) -> Flow>>);

impl Teardown {
    /// Wraps the post-work.
    pub fn new(f: impl FnOnce(&T<'_>) -> Flow + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    /// An around hook without post-work.
    pub fn none() -> Self {
        Self(None)
    }

    pub(crate) fn call(self, t: &T<'_>) -> Flow {
        match self.0 {
            Some(f) => f(t),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Teardown").field(&self.0.is_some()).finish()
    }
}

#[derive(Clone)]
pub(crate) enum Hook {
    Before(HookFn),
    After(HookFn),
    Around(AroundFn),
}

/// Read-only view of one test and the scopes above it, root first.
pub(crate) struct LeafPlan<'c> {
    pub(crate) nodes: Vec<&'c ScopeNode>,
    pub(crate) case: &'c TestCase,
}

impl<'c> LeafPlan<'c> {
    /// Follows entry indices from `root` down to a test.
    pub(crate) fn locate(root: &'c ScopeNode, path: &[usize]) -> Option<Self> {
        let (last, scopes) = path.split_last()?;
        let mut nodes = vec![root];
        let mut node = root;
        for &index in scopes {
            match node.entries.get(index)? {
                Entry::Scope(child) => {
                    nodes.push(child);
                    node = child;
                }
                Entry::Leaf(_) => return None,
            }
        }
        match node.entries.get(*last)? {
            Entry::Leaf(case) => Some(Self { nodes, case }),
            Entry::Scope(_) => None,
        }
    }

    /// Parallel somewhere on the path, and sequential nowhere.
    pub(crate) fn is_parallel(&self) -> bool {
        let declared = |mode| self.nodes.iter().any(|node| node.concurrency == mode);
        declared(Concurrency::Parallel) && !declared(Concurrency::Sequential)
    }

    pub(crate) fn skip_reason(&self) -> Option<&'c str> {
        self.nodes.iter().find_map(|node| node.skip.as_deref())
    }

    /// The test's own policy, else the nearest scope's.
    pub(crate) fn flaky(&self) -> Option<Retry> {
        self.case
            .options
            .flaky
            .clone()
            .or_else(|| self.nodes.iter().rev().find_map(|node| node.flaky.clone()))
    }

    /// Whether benchmark runs leave the test out.
    pub(crate) fn excluded_from_benchmark(&self) -> bool {
        self.case.options.skip_benchmark
            || self.nodes.iter().any(|node| node.skip_benchmark)
            || self.flaky().is_some()
    }
}

/// Runs one attempt of a test on `ctrl`.
///
/// Hooks run root to leaf in declaration order. After hooks and around teardowns go onto the
/// unwind stack at their position, so they run in reverse together with cleanups and deferred
/// functions. The stack is drained however the attempt ends. A panic is reported as a fatal
/// failure after the drain.
pub(crate) fn execute_leaf(
    ctrl: &dyn Controller,
    plan: &LeafPlan<'_>,
    seed: u64,
    config: ResolvedConfig,
    enclosing: &Arc<Enclosing>,
) -> Flow {
    let t = T::new(ctrl, plan.nodes.clone(), seed, config, Arc::clone(enclosing));
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_pipeline(&t, plan)));
    t.drain_unwind();
    match outcome {
        Ok(flow) => flow,
        Err(payload) => {
            let message = format!("panic: {}", panic_message(&*payload));
            warn!(unit = ctrl.name(), "{}", message);
            Err(ctrl.fatal(&message))
        }
    }
}

fn run_pipeline(t: &T<'_>, plan: &LeafPlan<'_>) -> Flow {
    if let Some(reason) = plan.skip_reason() {
        return Err(t.skip(reason));
    }
    for node in &plan.nodes {
        for hook in &node.hooks {
            match hook {
                Hook::Before(before) => before(t)?,
                Hook::After(after) => t.push_unwind(Unwind::After(Arc::clone(after))),
                Hook::Around(around) => {
                    let teardown = around(t)?;
                    t.push_unwind(Unwind::Around(teardown));
                }
            }
        }
    }
    (plan.case.body)(t)
}
