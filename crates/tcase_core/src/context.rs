//! Per-test execution context.

use crate::config::ResolvedConfig;
use crate::controller::{panic_message, Cleanup, Controller, UnitFn};
use crate::error::{Abort, Flow, Result, SpecError};
use crate::hooks::{HookFn, Teardown};
use crate::retry::Retry;
use crate::scope::ScopeNode;
use crate::var::{suggestions, VarDef, VarInit};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::any::Any;
use std::cell::{RefCell, RefMut};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Entry on the unwind stack of a test.
pub(crate) enum Unwind<'c> {
    Defer(Box<dyn FnOnce() + 'c>),
    Cleanup(Cleanup),
    After(HookFn),
    Around(Teardown),
}

impl Unwind<'_> {
    fn label(&self) -> &'static str {
        match self {
            Self::Defer(_) => "deferred function",
            Self::Cleanup(_) => "cleanup",
            Self::After(_) => "after hook",
            Self::Around(_) => "around hook",
        }
    }
}

/// Bindings and tags a running test hands down to suites run inside it.
#[derive(Clone, Default)]
pub(crate) struct Enclosing {
    pub(crate) vars: HashMap<String, VarDef>,
    pub(crate) tags: BTreeSet<String>,
}

/// Handle passed to hooks, variable initializers and test bodies.
///
/// A `T` lives for exactly one test execution. It caches variable values, owns the test's
/// unwind stack, and forwards reports to the controller the test runs on. It also implements
/// [`Controller`], so it can be handed to anything that reports through one.
///
/// Deferred functions, cleanups, after hooks and around-hook teardowns share one stack and run
/// last-registered-first once the test body returned or aborted.
pub struct T<'c> {
    ctrl: &'c dyn Controller,
    nodes: Vec<&'c ScopeNode>,
    enclosing: Arc<Enclosing>,
    cache: RefCell<HashMap<String, Box<dyn Any>>>,
    var_befores: RefCell<HashSet<String>>,
    unwind: RefCell<Vec<Unwind<'c>>>,
    tags: BTreeSet<String>,
    seed: u64,
    rng: RefCell<StdRng>,
    config: ResolvedConfig,
}

impl fmt::Debug for T<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("T")
            .field("name", &self.ctrl.name())
            .field("seed", &self.seed)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

impl<'c> T<'c> {
    pub(crate) fn new(
        ctrl: &'c dyn Controller,
        nodes: Vec<&'c ScopeNode>,
        seed: u64,
        config: ResolvedConfig,
        enclosing: Arc<Enclosing>,
    ) -> Self {
        let tags = enclosing
            .tags
            .iter()
            .chain(nodes.iter().flat_map(|node| node.tags.iter()))
            .cloned()
            .collect();
        Self {
            ctrl,
            nodes,
            enclosing,
            cache: RefCell::new(HashMap::new()),
            var_befores: RefCell::new(HashSet::new()),
            unwind: RefCell::new(Vec::new()),
            tags,
            seed,
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
            config,
        }
    }

    /// Registers `f` to run when the test finishes, after everything registered later.
    pub fn defer(&self, f: impl FnOnce() + 'c) {
        self.push_unwind(Unwind::Defer(Box::new(f)));
    }

    /// Whether any scope on the test's path carries `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Tags inherited from the test's scopes and, for a nested suite, the enclosing test.
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Seed of this test's random source.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Random source seeded from the run seed and the test's path.
    pub fn random(&self) -> RefMut<'_, StdRng> {
        self.rng.borrow_mut()
    }

    /// Retries `block` until it passes or the configured `eventually` timeout elapses.
    pub fn eventually(&self, block: impl FnMut(&dyn Controller) -> Flow) -> Flow {
        Retry::new(self.config.eventually.waiter()).assert(self, block)
    }

    /// Configuration for a suite run inside this test: seeded from the test, same ordering.
    pub(crate) fn nested_config(&self) -> ResolvedConfig {
        ResolvedConfig {
            seed: self.seed,
            seed_generated: false,
            ..self.config
        }
    }

    /// Everything bound on this test's path, nearest binding winning.
    pub(crate) fn nested_enclosing(&self) -> Enclosing {
        let mut vars = self.enclosing.vars.clone();
        for node in &self.nodes {
            vars.extend(node.vars.iter().map(|(name, def)| (name.clone(), def.clone())));
        }
        Enclosing {
            vars,
            tags: self.tags.clone(),
        }
    }

    pub(crate) fn push_unwind(&self, entry: Unwind<'c>) {
        self.unwind.borrow_mut().push(entry);
    }

    /// Runs the unwind stack to completion. Failures are reported but never stop the drain.
    pub(crate) fn drain_unwind(&self) {
        loop {
            let next = self.unwind.borrow_mut().pop();
            let Some(entry) = next else { break };
            let label = entry.label();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| match entry {
                Unwind::Defer(f) => {
                    f();
                    Ok(())
                }
                Unwind::Cleanup(f) => {
                    f();
                    Ok(())
                }
                Unwind::After(hook) => hook(self),
                Unwind::Around(teardown) => teardown.call(self),
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(abort)) => {
                    debug!(unit = self.ctrl.name(), ?abort, "{} aborted while unwinding", label);
                }
                Err(payload) => {
                    let message = format!("panic in {}: {}", label, panic_message(&*payload));
                    warn!(unit = self.ctrl.name(), "{}", message);
                    self.ctrl.error(&message);
                }
            }
        }
    }

    /// Runs a variable's `before` hook the first time the variable is touched in this test.
    pub(crate) fn run_var_before(&self, name: &str, hook: &HookFn) -> Flow {
        let first = self.var_befores.borrow_mut().insert(name.to_string());
        if first {
            hook(self)?;
        }
        Ok(())
    }

    /// Evaluates and caches `name` unless a value is already cached.
    ///
    /// The nearest binding on the test's path wins, then the bindings of the enclosing test;
    /// `fallback` is used when nothing binds the name.
    pub(crate) fn load(&self, name: &str, fallback: Option<&VarInit>) -> Flow {
        if self.cache.borrow().contains_key(name) {
            return Ok(());
        }

        let init = match self.nearest_binding(name).or_else(|| fallback.cloned()) {
            Some(init) => init,
            None => {
                let err = SpecError::VarNotFound {
                    name: name.to_string(),
                    suggestions: suggestions(name, &self.visible_names()),
                };
                return Err(self.ctrl.fatal(&err.to_string()));
            }
        };

        let value = init(self)?;
        self.cache
            .borrow_mut()
            .entry(name.to_string())
            .or_insert(value);
        Ok(())
    }

    /// Clones the cached value of `name`.
    pub(crate) fn cached<V: Clone + 'static>(&self, name: &str) -> Flow<V> {
        let value = self
            .cache
            .borrow()
            .get(name)
            .and_then(|value| value.downcast_ref::<V>())
            .cloned();
        value.ok_or_else(|| {
            let err = SpecError::VarTypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<V>(),
            };
            self.ctrl.fatal(&err.to_string())
        })
    }

    pub(crate) fn store(&self, name: &str, value: Box<dyn Any>) {
        self.cache.borrow_mut().insert(name.to_string(), value);
    }

    fn nearest_binding(&self, name: &str) -> Option<VarInit> {
        self.nodes
            .iter()
            .rev()
            .find_map(|node| node.vars.get(name))
            .or_else(|| self.enclosing.vars.get(name))
            .map(|def| def.init.clone())
    }

    fn visible_names(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self
            .nodes
            .iter()
            .flat_map(|node| node.vars.keys().map(String::as_str))
            .chain(self.enclosing.vars.keys().map(String::as_str))
            .collect();
        names.into_iter().map(str::to_string).collect()
    }
}

impl Controller for T<'_> {
    fn name(&self) -> &str {
        self.ctrl.name()
    }

    fn run(&self, name: &str, unit: UnitFn) -> bool {
        self.ctrl.run(name, unit)
    }

    fn log(&self, message: &str) {
        self.ctrl.log(message)
    }

    fn error(&self, message: &str) {
        self.ctrl.error(message)
    }

    fn fatal(&self, message: &str) -> Abort {
        self.ctrl.fatal(message)
    }

    fn skip(&self, reason: &str) -> Abort {
        self.ctrl.skip(reason)
    }

    fn failed(&self) -> bool {
        self.ctrl.failed()
    }

    fn cleanup(&self, cleanup: Cleanup) {
        self.push_unwind(Unwind::Cleanup(cleanup));
    }

    fn declare_concurrent(&self) -> Result<()> {
        self.ctrl.declare_concurrent()
    }

    fn is_short(&self) -> bool {
        self.ctrl.is_short()
    }

    fn is_benchmark(&self) -> bool {
        self.ctrl.is_benchmark()
    }
}
