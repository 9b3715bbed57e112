//! tcase CLI - inspect run configuration and ordering of tcase suites.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "tcase")]
#[command(about = "Nested specification engine for tests", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved run configuration
    Config {
        /// Configuration file (defaults to ./tcase.toml)
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Generate a fresh ordering seed
    Seed,
    /// Show the run order of sibling tests for a seed
    Order {
        /// Number of siblings
        #[arg(short, long)]
        count: usize,
        /// Ordering seed (generated if omitted)
        #[arg(short, long)]
        seed: Option<u64>,
        /// Slash-separated scope path the siblings live under
        #[arg(long, default_value = "")]
        scope: String,
    },
    /// Run the bundled self-check suite
    Selfcheck {
        /// Ordering seed (generated if omitted)
        #[arg(short, long)]
        seed: Option<u64>,
        /// Ordering strategy (defined, random)
        #[arg(long)]
        ordering: Option<String>,
        /// Skip long-running checks
        #[arg(long)]
        short: bool,
    },
}

/// Output format of `config`.
#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

fn main() -> Result<()> {
    // Respects RUST_LOG (e.g. RUST_LOG=tcase_core=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { file, format } => commands::config::run(file.as_deref(), format),
        Commands::Seed => commands::seed::run(),
        Commands::Order { count, seed, scope } => commands::order::run(count, seed, &scope),
        Commands::Selfcheck {
            seed,
            ordering,
            short,
        } => commands::selfcheck::run(seed, ordering.as_deref(), short),
    }
}
