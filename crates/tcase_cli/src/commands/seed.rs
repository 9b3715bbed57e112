//! Seed generation command.

use anyhow::Result;
use tcase_core::{generate_seed, ENV_SEED};

/// Print a fresh seed in `export`-able form.
pub fn run() -> Result<()> {
    println!("{}={}", ENV_SEED, generate_seed());
    Ok(())
}
