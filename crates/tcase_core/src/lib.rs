//! tcase Core Library
//!
//! A nested specification engine for tests, providing:
//! - A declarative scope tree with before, after and around hooks
//! - Lazily evaluated, memoized variables that nested scopes can shadow
//! - Deterministic ordering (definition order or seeded shuffle)
//! - Parallel or sequential execution per subtree
//! - Retries for flaky tests and fallible assertions
//!
//! # Quick Start
//!
//! ```
//! use tcase_core::{LocalController, LocalOptions, OrderingKind, ResolvedConfig, Suite};
//!
//! let suite = Suite::build("stack", |s| {
//!     let stack = s.let_var("stack", |_| Vec::<i32>::new())?;
//!
//!     s.when("an element is pushed", |s| {
//!         let stack = stack.clone();
//!         s.before({
//!             let stack = stack.clone();
//!             move |t| {
//!                 let mut items = stack.get(t)?;
//!                 items.push(1);
//!                 stack.set(t, items)
//!             }
//!         })?;
//!         s.then("it is not empty", {
//!             let stack = stack.clone();
//!             move |t| {
//!                 assert!(!stack.get(t)?.is_empty());
//!                 Ok(())
//!             }
//!         })
//!     })?;
//!
//!     s.then("it starts empty", move |t| {
//!         assert!(stack.get(t)?.is_empty());
//!         Ok(())
//!     })
//! })
//! .unwrap();
//!
//! let root = LocalController::new("stack", LocalOptions::default());
//! suite.run_resolved(&root, ResolvedConfig::new(42, OrderingKind::Random));
//! assert!(root.finish().passed());
//! ```
//!
//! # Features
//!
//! ## Shadowing
//!
//! The binding nearest to a test wins, so a nested scope can change one variable and reuse
//! everything else:
//!
//! ```
//! use tcase_core::{LocalController, LocalOptions, OrderingKind, ResolvedConfig, Suite};
//!
//! let suite = Suite::build("greeting", |s| {
//!     let name = s.let_value("name", "world".to_string())?;
//!     let greeting = s.let_var("greeting", {
//!         let name = name.clone();
//!         move |t| format!("hello {}", name.get(t).unwrap_or_default())
//!     })?;
//!
//!     s.describe("for bob", |s| {
//!         name.bind_value(s, "bob".to_string())?;
//!         s.test("greets bob", move |t| {
//!             assert_eq!(greeting.get(t)?, "hello bob");
//!             Ok(())
//!         })
//!     })
//! })
//! .unwrap();
//!
//! let root = LocalController::new("greeting", LocalOptions::default());
//! suite.run_resolved(&root, ResolvedConfig::new(1, OrderingKind::Defined));
//! assert!(root.finish().passed());
//! ```
//!
//! ## Retries
//!
//! ```
//! use tcase_core::{Controller, LocalController, LocalOptions, Retry};
//!
//! let root = LocalController::new("retry", LocalOptions::default());
//! let mut attempts = 0;
//! Retry::count(3)
//!     .assert(&root, |c| {
//!         attempts += 1;
//!         if attempts < 2 {
//!             c.error("flaky");
//!         }
//!         Ok(())
//!     })
//!     .unwrap();
//! assert!(root.finish().passed());
//! ```

mod config;
mod context;
mod contract;
mod controller;
mod error;
mod hooks;
mod local;
mod ordering;
mod race;
mod recorder;
mod retry;
mod scheduler;
mod scope;
mod var;

pub use config::{
    generate_seed, EventuallyConfig, ResolvedConfig, RunConfig, ENV_ORDERING, ENV_SEED, FILE_NAME,
};
pub use context::T;
pub use contract::{run_contracts, Contract};
pub use controller::{Cleanup, Controller, UnitFn};
pub use error::{Abort, Flow, Result, SpecError};
pub use hooks::{HookFn, Teardown};
pub use local::{LocalController, LocalOptions, Outcome, UnitReport};
pub use ordering::{discriminate, OrderingKind};
pub use race::{race, RaceBlock};
pub use recorder::Recorder;
pub use retry::{Retry, RetryCount, RetryPolicy, RetryStrategy, Waiter};
pub use scheduler::RunSummary;
pub use scope::{Concurrency, Scope, Suite, TestOptions};
pub use var::Var;
