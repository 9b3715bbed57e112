//! Reusable behavioral suites.

use crate::error::Result;
use crate::scope::Scope;

/// A set of expectations that any implementation of some interface must satisfy.
///
/// Implementors declare their tests into the scope they are given, usually reading the subject
/// under test from a variable bound by the caller.
pub trait Contract {
    /// Description of the nested scope the contract runs under.
    fn name(&self) -> String {
        let full = std::any::type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base).to_string()
    }

    /// Declares the contract's tests into `scope`.
    fn spec(&self, scope: &mut Scope<'_>) -> Result<()>;
}

/// Declares each contract in its own nested scope of `scope`.
pub fn run_contracts(scope: &mut Scope<'_>, contracts: &[&dyn Contract]) -> Result<()> {
    for contract in contracts {
        scope.describe(contract.name(), |s| contract.spec(s))?;
    }
    Ok(())
}
