//! Run configuration: seed, ordering and `eventually` timing.
//!
//! Values come from an optional `tcase.toml` file and the `TESTCASE_SEED` / `TESTCASE_ORDERING`
//! environment variables, and are resolved once per run into a [`ResolvedConfig`].

use crate::error::{Result, SpecError};
use crate::ordering::OrderingKind;
use crate::retry::Waiter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the ordering seed.
pub const ENV_SEED: &str = "TESTCASE_SEED";

/// Environment variable selecting the ordering strategy.
pub const ENV_ORDERING: &str = "TESTCASE_ORDERING";

/// Default configuration file name.
pub const FILE_NAME: &str = "tcase.toml";

/// Run configuration before resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Ordering seed. Generated at resolution when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Sibling ordering strategy.
    #[serde(default)]
    pub ordering: OrderingKind,

    /// Timing of `T::eventually`.
    #[serde(default)]
    pub eventually: EventuallyConfig,
}

impl RunConfig {
    /// Load configuration from a file, or defaults when the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| SpecError::Config(format!("failed to read config: {}", e)))?;
            toml::from_str(&content)
                .map_err(|e| SpecError::Config(format!("failed to parse config: {}", e)))
        } else {
            Ok(Self::default())
        }
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env()
    }

    /// Applies the process environment on top of this configuration.
    pub fn with_env(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides looked up by environment variable name. Empty values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let present = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(raw) = present(ENV_SEED) {
            self.seed = Some(parse_seed(&raw)?);
        }
        if let Some(raw) = present(ENV_ORDERING) {
            self.ordering = raw.parse()?;
        }
        Ok(self)
    }

    /// Fixes the seed, generating one when unset.
    pub fn resolve(&self) -> ResolvedConfig {
        let (seed, seed_generated) = match self.seed {
            Some(seed) => (seed, false),
            None => (generate_seed(), true),
        };
        ResolvedConfig {
            seed,
            ordering: self.ordering,
            seed_generated,
            eventually: self.eventually,
        }
    }
}

/// Configuration after resolution, threaded through a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedConfig {
    /// Ordering seed.
    pub seed: u64,
    /// Sibling ordering strategy.
    pub ordering: OrderingKind,
    /// Whether the seed was generated instead of configured.
    pub seed_generated: bool,
    /// Timing of `T::eventually`.
    pub eventually: EventuallyConfig,
}

impl ResolvedConfig {
    /// Fixed seed and ordering with default timing.
    pub fn new(seed: u64, ordering: OrderingKind) -> Self {
        Self {
            seed,
            ordering,
            seed_generated: false,
            eventually: EventuallyConfig::default(),
        }
    }
}

/// Timing of the time-boxed retry used by `T::eventually`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventuallyConfig {
    /// Total budget in milliseconds (default: 5000).
    pub timeout_ms: u64,

    /// Pause between attempts in milliseconds (default: 10).
    pub interval_ms: u64,
}

impl EventuallyConfig {
    /// Waiter implementing this timing.
    pub fn waiter(&self) -> Waiter {
        Waiter::new(
            Duration::from_millis(self.interval_ms),
            Duration::from_millis(self.timeout_ms),
        )
    }
}

impl Default for EventuallyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            interval_ms: 10,
        }
    }
}

/// Generates a fresh ordering seed.
pub fn generate_seed() -> u64 {
    rand::random()
}

fn parse_seed(raw: &str) -> Result<u64> {
    let raw = raw.trim();
    if let Ok(seed) = raw.parse::<u64>() {
        return Ok(seed);
    }
    raw.parse::<i64>()
        .map(|seed| seed as u64)
        .map_err(|e| SpecError::Config(format!("invalid {} {:?}: {}", ENV_SEED, raw, e)))
}
