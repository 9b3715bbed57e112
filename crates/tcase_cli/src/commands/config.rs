//! Resolved configuration command.

use crate::Format;
use anyhow::{Context, Result};
use console::style;
use std::path::{Path, PathBuf};
use tcase_core::{RunConfig, ENV_ORDERING, ENV_SEED, FILE_NAME};

/// Print the configuration a run would use.
pub fn run(file: Option<&Path>, format: Format) -> Result<()> {
    let path = file
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(FILE_NAME));
    let config = RunConfig::load(&path)
        .and_then(RunConfig::with_env)
        .with_context(|| format!("failed to load {}", path.display()))?;
    let resolved = config.resolve();

    if format == Format::Json {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
        return Ok(());
    }

    println!("{}", style("Run configuration:").bold());
    println!(
        "  File:        {}{}",
        path.display(),
        if path.exists() { "" } else { " (not found, using defaults)" }
    );
    println!(
        "  Seed:        {}{}",
        style(resolved.seed).cyan(),
        if resolved.seed_generated {
            style(" (generated)").dim().to_string()
        } else {
            String::new()
        }
    );
    println!("  Ordering:    {}", style(resolved.ordering).cyan());
    println!(
        "  Eventually:  {}ms timeout, {}ms interval",
        resolved.eventually.timeout_ms, resolved.eventually.interval_ms
    );
    println!();
    println!(
        "  {} {} and {} override the file.",
        style("Tip:").cyan(),
        style(ENV_SEED).cyan(),
        style(ENV_ORDERING).cyan()
    );
    Ok(())
}
