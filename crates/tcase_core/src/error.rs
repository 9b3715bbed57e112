//! Error types for tcase_core operations.

use thiserror::Error;

/// Core error type for declaration, resolution and configuration problems.
#[derive(Error, Debug)]
pub enum SpecError {
    /// A hook, variable or option was declared after the scope accepted its first test or sub-scope.
    #[error("scope {scope:?} is finalized: {operation} must be declared before the first test or sub-scope")]
    ScopeFinalized {
        /// Description of the finalized scope
        scope: String,
        /// The rejected declaration
        operation: &'static str,
    },

    /// The concurrency mode of a scope was changed after children existed.
    #[error("concurrency mode of scope {scope:?} can't change once it has tests or sub-scopes")]
    ConcurrencyLocked {
        /// Description of the scope
        scope: String,
    },

    /// A variable was read but no scope on the leaf's path declares it.
    #[error("Variable {name:?} is not found. Did you mean? {}", suggestions.join(", "))]
    VarNotFound {
        /// Name that was looked up
        name: String,
        /// Visible names close to the requested one
        suggestions: Vec<String>,
    },

    /// A cached or declared value doesn't have the type the handle expects.
    #[error("variable {name:?} holds a value of another type, expected {expected}")]
    VarTypeMismatch {
        /// Variable name
        name: String,
        /// Type the handle was created with
        expected: &'static str,
    },

    /// A retry/flaky policy couldn't be interpreted.
    #[error("invalid retry policy: {0}")]
    InvalidRetryPolicy(String),

    /// A unit asked for concurrent execution after it started child units.
    #[error("unit {unit:?} can't run concurrently after it already started sub-units")]
    ConcurrentAfterChildren {
        /// Name of the unit
        unit: String,
    },

    /// A unit asked for concurrent execution twice.
    #[error("unit {unit:?} already runs concurrently")]
    AlreadyConcurrent {
        /// Name of the unit
        unit: String,
    },

    /// The controller can't run the unit concurrently at all.
    #[error("controller doesn't support concurrent execution: {0}")]
    ConcurrencyUnsupported(String),

    /// Configuration error (loading, parsing, invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error while reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpecError {
    /// Returns a user-friendly recovery suggestion for the error, if available.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::ScopeFinalized { .. } | Self::ConcurrencyLocked { .. } => Some(
                "Move hooks, variables and concurrency declarations above the first test or nested scope.",
            ),
            Self::VarNotFound { .. } => {
                Some("Bind the variable on an enclosing scope, or give its handle a default initializer.")
            }
            Self::InvalidRetryPolicy(_) => {
                Some("Use a retry count (\"3\") or a duration with unit (\"250ms\", \"2s\").")
            }
            Self::Config(_) => Some("Check TESTCASE_SEED and TESTCASE_ORDERING (defined or random)."),
            Self::AlreadyConcurrent { .. } => {
                Some("The enclosing scope already declared parallel execution for this test.")
            }
            _ => None,
        }
    }
}

/// Convenience Result type for tcase_core operations.
pub type Result<T> = std::result::Result<T, SpecError>;

/// Abrupt end of a unit of work.
///
/// Returned (not thrown) from hooks, variable initializers and test bodies. The failure itself
/// has already been reported to the controller when an `Abort` is produced, so callers only
/// need to stop and unwind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abort {
    /// The unit failed fatally.
    Failed,
    /// The unit was skipped.
    Skipped,
}

/// Control-flow result of test code.
pub type Flow<T = ()> = std::result::Result<T, Abort>;
