use super::assertions::Expectation;
use anyhow::{anyhow, Context, Result};
use tcase_core::{
    LocalController, LocalOptions, ResolvedConfig, RunSummary, Scope, Suite, UnitReport,
};

/// Declaration body of a scenario's suite
pub type SuiteBody = Box<dyn FnOnce(&mut Scope<'_>) -> tcase_core::Result<()>>;

/// Builds and runs a suite on a fresh local controller
pub struct ScenarioRunner {
    name: String,
    options: LocalOptions,
    config: ResolvedConfig,
}

impl ScenarioRunner {
    pub fn new(name: &str, options: LocalOptions, config: ResolvedConfig) -> Self {
        Self {
            name: name.to_string(),
            options,
            config,
        }
    }

    /// Build the suite, reporting declaration errors as failures
    pub fn build(&self, body: SuiteBody) -> Result<Suite> {
        Suite::build(self.name.clone(), body).map_err(|e| anyhow!("suite declaration failed: {}", e))
    }

    /// Run `suite` and return the finished report
    pub fn execute(&self, suite: &Suite) -> (UnitReport, RunSummary) {
        let root = LocalController::new(self.name.clone(), self.options);
        let summary = suite.run_resolved(&root, self.config);
        (root.finish(), summary)
    }

    /// Check every expectation, stopping at the first mismatch
    pub fn verify(
        &self,
        report: &UnitReport,
        summary: &RunSummary,
        expectations: &[Expectation],
    ) -> Result<()> {
        for (i, expectation) in expectations.iter().enumerate() {
            expectation
                .check(report, summary)
                .with_context(|| format!("Expectation {}: {:?}", i, expectation))?;
        }
        Ok(())
    }
}
