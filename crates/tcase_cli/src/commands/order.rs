//! Ordering preview command.

use anyhow::{bail, Result};
use console::style;
use tcase_core::{generate_seed, OrderingKind};

/// Print the run order of `count` siblings under `scope` for `seed`.
///
/// `scope` is the slash-separated path of scope descriptions, suite root first, as shown in
/// test names.
pub fn run(count: usize, seed: Option<u64>, scope: &str) -> Result<()> {
    if count == 0 {
        bail!("--count must be at least 1");
    }

    let seed = seed.unwrap_or_else(generate_seed);
    let path: Vec<String> = scope
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();
    let order = OrderingKind::Random.order(count, seed, &path);

    println!(
        "{} seed {} under {}",
        style("Order for").bold(),
        style(seed).cyan(),
        style(if scope.is_empty() { "<root>" } else { scope }).cyan()
    );
    let positions: Vec<String> = order.iter().map(|index| (index + 1).to_string()).collect();
    println!("  {}", positions.join(","));
    Ok(())
}
