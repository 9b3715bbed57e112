//! The declarative scope tree.
//!
//! A [`Suite`] is built once by running nested `describe` bodies against [`Scope`] handles.
//! Every body runs exactly once, at build time; running the suite only walks the finished tree.

use crate::config::{ResolvedConfig, RunConfig};
use crate::context::{Enclosing, T};
use crate::controller::Controller;
use crate::error::{Flow, Result, SpecError};
use crate::hooks::{Hook, HookFn, Teardown};
use crate::retry::{Retry, RetryPolicy};
use crate::scheduler::{self, RunSummary};
use crate::var::{Var, VarDef};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Concurrency mode declared on a scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Concurrency {
    /// Inherit.
    #[default]
    Unset,
    /// Tests below may run concurrently.
    Parallel,
    /// Tests below run one at a time, whatever ancestors declared.
    Sequential,
}

pub(crate) struct ScopeNode {
    pub(crate) description: String,
    pub(crate) hooks: Vec<Hook>,
    pub(crate) vars: HashMap<String, VarDef>,
    pub(crate) tags: BTreeSet<String>,
    pub(crate) concurrency: Concurrency,
    pub(crate) skip: Option<String>,
    pub(crate) skip_benchmark: bool,
    pub(crate) flaky: Option<Retry>,
    pub(crate) finalized: bool,
    pub(crate) entries: Vec<Entry>,
}

impl ScopeNode {
    fn new(description: String) -> Self {
        Self {
            description,
            hooks: Vec::new(),
            vars: HashMap::new(),
            tags: BTreeSet::new(),
            concurrency: Concurrency::Unset,
            skip: None,
            skip_benchmark: false,
            flaky: None,
            finalized: false,
            entries: Vec::new(),
        }
    }

    /// Follows scope indices from this node.
    pub(crate) fn descend(&self, path: &[usize]) -> Option<&ScopeNode> {
        path.iter().try_fold(self, |node, &index| match node.entries.get(index)? {
            Entry::Scope(child) => Some(child),
            Entry::Leaf(_) => None,
        })
    }

    fn leaf_count(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| match entry {
                Entry::Scope(child) => child.leaf_count(),
                Entry::Leaf(_) => 1,
            })
            .sum()
    }
}

pub(crate) enum Entry {
    Scope(ScopeNode),
    Leaf(TestCase),
}

pub(crate) struct TestCase {
    pub(crate) description: String,
    pub(crate) body: HookFn,
    pub(crate) options: TestOptions,
}

/// Per-test options.
#[derive(Debug, Clone, Default)]
pub struct TestOptions {
    pub(crate) flaky: Option<Retry>,
    pub(crate) skip_benchmark: bool,
}

impl TestOptions {
    /// No options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Retries the test under `policy` before reporting a failure.
    pub fn flaky(mut self, policy: impl Into<RetryPolicy>) -> Self {
        self.flaky = Some(policy.into().into_retry());
        self
    }

    /// Leaves the test out of benchmark runs.
    pub fn skip_benchmark(mut self) -> Self {
        self.skip_benchmark = true;
        self
    }
}

/// Declaration handle for one scope.
///
/// Hooks, variables, tags and options must be declared before the scope's first test or nested
/// scope; later declarations fail with [`SpecError::ScopeFinalized`] and leave the scope as it
/// was.
pub struct Scope<'s> {
    node: &'s mut ScopeNode,
    path: Vec<String>,
}

impl<'s> Scope<'s> {
    /// Description of this scope.
    pub fn description(&self) -> &str {
        &self.node.description
    }

    /// Descriptions from the suite root down to this scope.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Declares a nested scope and runs `body` against it.
    pub fn describe(
        &mut self,
        description: impl Into<String>,
        body: impl FnOnce(&mut Scope<'_>) -> Result<()>,
    ) -> Result<()> {
        let mut child = ScopeNode::new(description.into());
        let mut path = self.path.clone();
        path.push(child.description.clone());
        body(&mut Scope {
            node: &mut child,
            path,
        })?;
        self.node.finalized = true;
        self.node.entries.push(Entry::Scope(child));
        Ok(())
    }

    /// Same as [`Scope::describe`].
    pub fn context(
        &mut self,
        description: impl Into<String>,
        body: impl FnOnce(&mut Scope<'_>) -> Result<()>,
    ) -> Result<()> {
        self.describe(description, body)
    }

    /// Nested scope described as `when <description>`.
    pub fn when(
        &mut self,
        description: impl AsRef<str>,
        body: impl FnOnce(&mut Scope<'_>) -> Result<()>,
    ) -> Result<()> {
        self.describe(format!("when {}", description.as_ref()), body)
    }

    /// Nested scope described as `and <description>`.
    pub fn and(
        &mut self,
        description: impl AsRef<str>,
        body: impl FnOnce(&mut Scope<'_>) -> Result<()>,
    ) -> Result<()> {
        self.describe(format!("and {}", description.as_ref()), body)
    }

    /// Declares a test.
    pub fn test(
        &mut self,
        description: impl Into<String>,
        body: impl Fn(&T<'_>) -> Flow + Send + Sync + 'static,
    ) -> Result<()> {
        self.test_with(description, TestOptions::default(), body)
    }

    /// Same as [`Scope::test`].
    pub fn then(
        &mut self,
        description: impl Into<String>,
        body: impl Fn(&T<'_>) -> Flow + Send + Sync + 'static,
    ) -> Result<()> {
        self.test(description, body)
    }

    /// Declares a test with options.
    pub fn test_with(
        &mut self,
        description: impl Into<String>,
        options: TestOptions,
        body: impl Fn(&T<'_>) -> Flow + Send + Sync + 'static,
    ) -> Result<()> {
        self.node.finalized = true;
        self.node.entries.push(Entry::Leaf(TestCase {
            description: description.into(),
            body: Arc::new(body),
            options,
        }));
        Ok(())
    }

    /// Setup run before every test below, ancestors first.
    pub fn before(&mut self, hook: impl Fn(&T<'_>) -> Flow + Send + Sync + 'static) -> Result<()> {
        self.guard("before hook")?;
        self.node.hooks.push(Hook::Before(Arc::new(hook)));
        Ok(())
    }

    /// Teardown run after every test below, descendants first.
    pub fn after(&mut self, hook: impl Fn(&T<'_>) -> Flow + Send + Sync + 'static) -> Result<()> {
        self.guard("after hook")?;
        self.node.hooks.push(Hook::After(Arc::new(hook)));
        Ok(())
    }

    /// Hook that encloses everything nested below it.
    ///
    /// `hook` does its pre-work and returns the post-work as a [`Teardown`]. If the pre-work
    /// aborts, the post-work never runs.
    pub fn around(
        &mut self,
        hook: impl Fn(&T<'_>) -> Flow<Teardown> + Send + Sync + 'static,
    ) -> Result<()> {
        self.guard("around hook")?;
        self.node.hooks.push(Hook::Around(Arc::new(hook)));
        Ok(())
    }

    /// Binds a lazily evaluated variable and returns its handle.
    pub fn let_var<V: Clone + 'static>(
        &mut self,
        name: impl Into<String>,
        init: impl Fn(&T<'_>) -> V + Send + Sync + 'static,
    ) -> Result<Var<V>> {
        let var = Var::new(name);
        var.bind(self, init)?;
        Ok(var)
    }

    /// Binds a variable whose initializer may abort the test.
    pub fn try_let_var<V: Clone + 'static>(
        &mut self,
        name: impl Into<String>,
        init: impl Fn(&T<'_>) -> Flow<V> + Send + Sync + 'static,
    ) -> Result<Var<V>> {
        let var = Var::new(name);
        var.try_bind(self, init)?;
        Ok(var)
    }

    /// Binds a variable to a fixed value.
    pub fn let_value<V: Clone + Send + Sync + 'static>(
        &mut self,
        name: impl Into<String>,
        value: V,
    ) -> Result<Var<V>> {
        let var = Var::new(name);
        var.bind_value(self, value)?;
        Ok(var)
    }

    pub(crate) fn declare_var(&mut self, name: &str, def: VarDef) -> Result<()> {
        self.guard("variable")?;
        self.node.vars.insert(name.to_string(), def);
        Ok(())
    }

    /// Adds tags visible to every test below.
    pub fn tag(&mut self, tags: &[&str]) -> Result<()> {
        self.guard("tag")?;
        self.node
            .tags
            .extend(tags.iter().map(|tag| tag.to_string()));
        Ok(())
    }

    /// Skips every test below with `reason`.
    pub fn skip(&mut self, reason: impl Into<String>) -> Result<()> {
        self.guard("skip")?;
        self.node.skip = Some(reason.into());
        Ok(())
    }

    /// Leaves every test below out of benchmark runs.
    pub fn skip_benchmark(&mut self) -> Result<()> {
        self.guard("skip benchmark")?;
        self.node.skip_benchmark = true;
        Ok(())
    }

    /// Retries every test below under `policy`, unless a test sets its own.
    pub fn flaky(&mut self, policy: impl Into<RetryPolicy>) -> Result<()> {
        self.guard("flaky policy")?;
        self.node.flaky = Some(policy.into().into_retry());
        Ok(())
    }

    /// Lets tests below run concurrently. Has no effect under a sequential declaration.
    pub fn parallel(&mut self) -> Result<()> {
        self.set_concurrency(Concurrency::Parallel)
    }

    /// Same as [`Scope::parallel`].
    pub fn no_side_effect(&mut self) -> Result<()> {
        self.parallel()
    }

    /// Forces tests below to run one at a time.
    pub fn sequential(&mut self) -> Result<()> {
        self.set_concurrency(Concurrency::Sequential)
    }

    /// Same as [`Scope::sequential`].
    pub fn has_side_effect(&mut self) -> Result<()> {
        self.sequential()
    }

    fn set_concurrency(&mut self, mode: Concurrency) -> Result<()> {
        if self.node.finalized {
            return Err(SpecError::ConcurrencyLocked {
                scope: self.path.join("/"),
            });
        }
        if self.node.concurrency != Concurrency::Sequential {
            self.node.concurrency = mode;
        }
        Ok(())
    }

    fn guard(&self, operation: &'static str) -> Result<()> {
        if self.node.finalized {
            return Err(SpecError::ScopeFinalized {
                scope: self.path.join("/"),
                operation,
            });
        }
        Ok(())
    }
}

/// A finished scope tree, ready to run any number of times.
#[derive(Clone)]
pub struct Suite {
    root: Arc<ScopeNode>,
}

impl Suite {
    /// Builds the tree by running `body` against the root scope.
    ///
    /// # Errors
    ///
    /// Returns the first declaration error raised anywhere in the tree.
    pub fn build(
        description: impl Into<String>,
        body: impl FnOnce(&mut Scope<'_>) -> Result<()>,
    ) -> Result<Self> {
        let mut root = ScopeNode::new(description.into());
        let path = vec![root.description.clone()];
        body(&mut Scope {
            node: &mut root,
            path,
        })?;
        root.finalized = true;
        Ok(Self {
            root: Arc::new(root),
        })
    }

    /// Description of the root scope.
    pub fn description(&self) -> &str {
        &self.root.description
    }

    /// Number of tests in the tree.
    pub fn leaf_count(&self) -> usize {
        self.root.leaf_count()
    }

    /// Slash-joined names of the tests in the order a run with `config` visits them.
    pub fn plan(&self, config: &ResolvedConfig) -> Vec<String> {
        scheduler::plan(&self.root, config)
    }

    /// Resolves `config` and runs every test as a sub-unit of `ctrl`.
    pub fn run(&self, ctrl: &dyn Controller, config: &RunConfig) -> RunSummary {
        self.run_resolved(ctrl, config.resolve())
    }

    /// Runs every test as a sub-unit of `ctrl` with an already resolved configuration.
    pub fn run_resolved(&self, ctrl: &dyn Controller, config: ResolvedConfig) -> RunSummary {
        scheduler::run_suite(ctrl, &self.root, config, Enclosing::default())
    }

    /// Runs every test as a sub-unit of the running test `t`.
    ///
    /// Nested tests see the variables bound on `t`'s path and its tags. Bindings declared in
    /// this suite take precedence, and values are evaluated afresh in each nested test. The run
    /// is seeded from `t`'s seed and keeps its ordering.
    pub fn run_within(&self, t: &T<'_>) -> RunSummary {
        scheduler::run_suite(t, &self.root, t.nested_config(), t.nested_enclosing())
    }

    pub(crate) fn root(&self) -> &ScopeNode {
        &self.root
    }
}
