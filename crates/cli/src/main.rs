//! pairwise CLI
//!
//! Usage:
//!   pairwise detect --ledger main.beancount [--remote export.json] [--report pairs.csv]
//!   pairwise apply --ledger main.beancount [--transfer-account NAME] [--dry-run]
//!   pairwise config

mod cli;
mod commands;


use anyhow::{bail, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Detect {
            ledger,
            remote,
            report,
            transfer_account,
        } => {
            commands::cmd_detect(
                &ledger,
                remote.as_deref(),
                config,
                report.as_deref(),
                &transfer_account,
            )?;
            Ok(())
        }
        Commands::Apply {
            ledger,
            transfer_account,
            dry_run,
        } => {
            let outcome = commands::cmd_apply(&ledger, config, &transfer_account, dry_run)?;
            if !outcome.is_success() {
                bail!("{} ledger file(s) could not be rewritten", outcome.failed.len());
            }
            Ok(())
        }
        Commands::Config => commands::cmd_config(config),
    }
}
