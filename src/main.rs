//! LedgerML - Main Entry Point
//!
//! Trains, evaluates and versions the fraud, credit-score and
//! categorization models from the command line.

use clap::Parser;
use ledgerml::cli::{self, Cli};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledgerml=info".into()),
        )
        .init();

    cli::run(Cli::parse())
}
