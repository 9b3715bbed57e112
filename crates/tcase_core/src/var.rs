//! Typed handles to lazily evaluated, memoized test variables.

use crate::context::T;
use crate::error::{Flow, Result, SpecError};
use crate::hooks::HookFn;
use crate::scope::Scope;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

pub(crate) type VarInit = Arc<dyn for<'a, 'c> Fn(&'a T<'c>) -> Flow<Box<dyn Any>> + Send + Sync>;

type OnLet = Arc<dyn for<'a, 'b> Fn(&'a mut Scope<'b>) -> Result<()> + Send + Sync>;

/// A variable binding registered on a scope.
#[derive(Clone)]
pub(crate) struct VarDef {
    pub(crate) init: VarInit,
}

impl VarDef {
    pub(crate) fn new(init: VarInit) -> Self {
        Self { init }
    }
}

/// Typed handle to a named test variable.
///
/// The value is computed on first read within a test and cached for the rest of that test.
/// Which initializer runs is decided per test: the binding on the scope nearest to the test
/// wins, and the handle's own default initializer is used when no scope binds the name.
///
/// ```
/// use tcase_core::{Suite, Var};
///
/// let answer: Var<i32> = Var::new("answer").with_init(|_| 42);
/// let suite = Suite::build("numbers", |s| {
///     s.describe("override", |s| {
///         answer.bind(s, |_| 7)?;
///         s.test("sees 7", {
///             let answer = answer.clone();
///             move |t| {
///                 assert_eq!(answer.get(t)?, 7);
///                 Ok(())
///             }
///         })
///     })
/// })
/// .unwrap();
/// assert_eq!(suite.leaf_count(), 1);
/// ```
pub struct Var<V> {
    name: Arc<str>,
    init: Option<VarInit>,
    on_let: Option<OnLet>,
    before: Option<HookFn>,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Clone for Var<V> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            init: self.init.clone(),
            on_let: self.on_let.clone(),
            before: self.before.clone(),
            _marker: PhantomData,
        }
    }
}

impl<V> fmt::Debug for Var<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Var")
            .field("name", &self.name)
            .field("type", &std::any::type_name::<V>())
            .field("has_init", &self.init.is_some())
            .finish()
    }
}

impl<V: Clone + 'static> Var<V> {
    /// Handle without a default initializer.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            init: None,
            on_let: None,
            before: None,
            _marker: PhantomData,
        }
    }

    /// Sets the default initializer.
    pub fn with_init(self, init: impl Fn(&T<'_>) -> V + Send + Sync + 'static) -> Self {
        self.with_try_init(move |t| Ok(init(t)))
    }

    /// Sets a default initializer that may abort the test.
    pub fn with_try_init(mut self, init: impl Fn(&T<'_>) -> Flow<V> + Send + Sync + 'static) -> Self {
        self.init = Some(erase(init));
        self
    }

    /// Applies `hook` to every scope the variable gets bound on.
    pub fn on_let(
        mut self,
        hook: impl Fn(&mut Scope<'_>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_let = Some(Arc::new(hook));
        self
    }

    /// Runs `hook` once per test, before the variable is first read or written.
    pub fn before(mut self, hook: impl Fn(&T<'_>) -> Flow + Send + Sync + 'static) -> Self {
        self.before = Some(Arc::new(hook));
        self
    }

    /// Variable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Binds the variable on `scope` with `init`.
    pub fn bind(
        &self,
        scope: &mut Scope<'_>,
        init: impl Fn(&T<'_>) -> V + Send + Sync + 'static,
    ) -> Result<()> {
        self.try_bind(scope, move |t| Ok(init(t)))
    }

    /// Binds the variable on `scope` with an initializer that may abort the test.
    pub fn try_bind(
        &self,
        scope: &mut Scope<'_>,
        init: impl Fn(&T<'_>) -> Flow<V> + Send + Sync + 'static,
    ) -> Result<()> {
        self.bind_erased(scope, erase(init))
    }

    /// Binds the variable on `scope` to a fixed value.
    pub fn bind_value(&self, scope: &mut Scope<'_>, value: V) -> Result<()>
    where
        V: Send + Sync,
    {
        self.bind(scope, move |_| value.clone())
    }

    /// Binds the default initializer on `scope`.
    pub fn bind_default(&self, scope: &mut Scope<'_>) -> Result<()> {
        let init = self.init.clone().ok_or_else(|| {
            SpecError::Config(format!("variable {:?} has no default initializer", self.name))
        })?;
        self.bind_erased(scope, init)
    }

    /// Evaluates the variable at this position of `scope`'s before hooks instead of on first read.
    pub fn eager(&self, scope: &mut Scope<'_>) -> Result<()> {
        let var = self.clone();
        scope.before(move |t| var.get(t).map(drop))
    }

    /// Reads the variable, evaluating it on first use within the test.
    pub fn get(&self, t: &T<'_>) -> Flow<V> {
        if let Some(before) = &self.before {
            t.run_var_before(&self.name, before)?;
        }
        t.load(&self.name, self.init.as_ref())?;
        t.cached(&self.name)
    }

    /// Overwrites the value for the rest of the test.
    pub fn set(&self, t: &T<'_>, value: V) -> Flow {
        if let Some(before) = &self.before {
            t.run_var_before(&self.name, before)?;
        }
        t.store(&self.name, Box::new(value));
        Ok(())
    }

    fn bind_erased(&self, scope: &mut Scope<'_>, init: VarInit) -> Result<()> {
        scope.declare_var(&self.name, VarDef::new(init))?;
        if let Some(on_let) = &self.on_let {
            on_let(scope)?;
        }
        Ok(())
    }
}

fn erase<V: 'static>(init: impl Fn(&T<'_>) -> Flow<V> + Send + Sync + 'static) -> VarInit {
    boxed_init(move |t| init(t).map(|value| Box::new(value) as Box<dyn Any>))
}

fn boxed_init<F>(f: F) -> VarInit
where
    F: for<'a, 'c> Fn(&'a T<'c>) -> Flow<Box<dyn Any>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Names from `visible` that look like `name`; all of them when none does.
pub(crate) fn suggestions(name: &str, visible: &[String]) -> Vec<String> {
    let lowered = name.to_lowercase();
    let mut close: Vec<String> = visible
        .iter()
        .filter(|candidate| {
            let candidate = candidate.to_lowercase();
            candidate.contains(&lowered)
                || lowered.contains(&candidate)
                || edit_distance(&candidate, &lowered) <= 3
        })
        .cloned()
        .collect();
    if close.is_empty() {
        close = visible.to_vec();
    }
    close.sort();
    close
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == *cb {
                diagonal
            } else {
                1 + diagonal.min(above).min(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}
