//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// pairwise - find transfers between your own accounts
#[derive(Parser)]
#[command(name = "pairwise")]
#[command(about = "Detects and records transfers in a plain-text ledger", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Detection criteria file (TOML). Defaults to the user config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Report transfer pairs without touching the ledger
    Detect {
        /// Root ledger file
        #[arg(short, long)]
        ledger: PathBuf,

        /// Remote transactions export (JSON) to include in the search
        #[arg(short, long)]
        remote: Option<PathBuf>,

        /// Write every pair to this CSV file
        #[arg(long)]
        report: Option<PathBuf>,

        /// Account that earlier confirmed transfers were booked against
        #[arg(short, long, default_value = "Assets:Transfers")]
        transfer_account: String,
    },

    /// Detect transfers and write them back into the ledger's detail files
    Apply {
        /// Root ledger file
        #[arg(short, long)]
        ledger: PathBuf,

        /// Account that confirmed transfers are booked against
        #[arg(short, long, default_value = "Assets:Transfers")]
        transfer_account: String,

        /// Show the regenerated files instead of writing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the effective detection criteria
    Config,
}
