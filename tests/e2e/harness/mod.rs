//! E2E test harness for tcase.
//!
//! This module contains test infrastructure with builders, variants, and helpers that not
//! every scenario uses.

#![allow(dead_code)]

pub mod journal;
pub mod runner;

// Re-export commonly used types
pub use assertions::Expectation;
pub use journal::Journal;
pub use scenario::SuiteScenario;
