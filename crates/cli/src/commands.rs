//! CLI command implementations

use anyhow::{Context, Result};
use pairwise_core::{parse_remote_transactions, Transaction};
use pairwise_ledger::{
    ledger_transactions, load_ledger, ApplyOutcome, Ledger, TransferAccount, TransferApplier,
};
use pairwise_transfer::{
    pattern_advisories, write_csv_file, DetectionCriteria, DetectionResult, TransferDetector,
    TransferPair,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "transfers.toml";

/// `transfers.toml` in the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "pairwise", "Pairwise")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

pub fn load_criteria(config: Option<&Path>) -> DetectionCriteria {
    match config.map(Path::to_path_buf).or_else(default_config_path) {
        Some(path) => DetectionCriteria::load(&path),
        None => DetectionCriteria::default(),
    }
}

fn open_ledger(path: &Path) -> Result<Ledger> {
    load_ledger(path).with_context(|| format!("Failed to load ledger {}", path.display()))
}

/// Ledger transactions followed by remote ones the ledger does not
/// already hold (matched by id).
pub fn gather_transactions(
    ledger: &Ledger,
    remote: Option<&Path>,
    transfer_account: &str,
) -> Result<Vec<Transaction>> {
    let mut transactions = ledger_transactions(ledger, transfer_account);
    let Some(path) = remote else {
        return Ok(transactions);
    };

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let remote = parse_remote_transactions(&json)
        .with_context(|| format!("Invalid remote transactions in {}", path.display()))?;

    let known: HashSet<String> = transactions.iter().map(|t| t.id.clone()).collect();
    let before = transactions.len();
    transactions.extend(remote.into_iter().filter(|t| !known.contains(&t.id)));
    tracing::info!(
        "Added {} remote transaction(s) from {}",
        transactions.len() - before,
        path.display()
    );
    Ok(transactions)
}

pub fn format_pair(pair: &TransferPair) -> String {
    let mut line = format!(
        "{} {} ({}) -> {} {} ({})  {} {}",
        pair.source.date,
        pair.source.id,
        pair.source.account,
        pair.dest.date,
        pair.dest.id,
        pair.dest.account,
        pair.amount(),
        pair.source.currency_code
    );
    if let Some(reason) = &pair.reason {
        line.push_str("  [");
        line.push_str(reason);
        line.push(']');
    }
    line
}

fn print_result(result: &DetectionResult, checked: usize) {
    println!("Checked {checked} transactions");
    println!("Confirmed transfers: {}", result.confirmed_pairs.len());
    for pair in &result.confirmed_pairs {
        println!("   {}", format_pair(pair));
    }
    println!("Suspected transfers: {}", result.suspected_pairs.len());
    for pair in &result.suspected_pairs {
        println!("   {}", format_pair(pair));
    }
    println!("Unmatched: {}", result.unmatched_transactions.len());

    let advisories = pattern_advisories(result);
    if !advisories.is_empty() {
        println!();
        for advisory in advisories {
            println!("{advisory}");
        }
    }
}

fn detect(transactions: &[Transaction], config: Option<&Path>) -> Result<DetectionResult> {
    let detector =
        TransferDetector::new(load_criteria(config)).context("Invalid detection criteria")?;
    let result = detector.detect(transactions);
    print_result(&result, transactions.len());
    Ok(result)
}

pub fn cmd_detect(
    ledger_path: &Path,
    remote: Option<&Path>,
    config: Option<&Path>,
    report: Option<&Path>,
    transfer_account: &str,
) -> Result<DetectionResult> {
    let ledger = open_ledger(ledger_path)?;
    let transactions = gather_transactions(&ledger, remote, transfer_account)?;
    let result = detect(&transactions, config)?;

    if let Some(path) = report {
        write_csv_file(&result, path)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        println!("Report written to {}", path.display());
    }
    Ok(result)
}

pub fn cmd_apply(
    ledger_path: &Path,
    config: Option<&Path>,
    transfer_account: &str,
    dry_run: bool,
) -> Result<ApplyOutcome> {
    let ledger = open_ledger(ledger_path)?;
    let account = TransferAccount::resolve(&ledger, transfer_account)
        .context("Open the transfer account in the ledger or pass --transfer-account")?;
    let result = detect(&ledger_transactions(&ledger, &account.name), config)?;

    let outcome = TransferApplier::new(account).apply(&ledger, &result, dry_run);
    println!();
    if outcome.summary.skipped > 0 {
        println!("Skipped {} pair(s) with unknown ids", outcome.summary.skipped);
    }
    if dry_run {
        for (path, content) in &outcome.rendered {
            println!("--- {}", path.display());
            print!("{content}");
        }
    }
    for path in &outcome.written {
        println!("Wrote {}", path.display());
    }
    for (path, err) in &outcome.failed {
        eprintln!("Failed {}: {err}", path.display());
    }
    Ok(outcome)
}

pub fn cmd_config(config: Option<&Path>) -> Result<()> {
    match config.map(Path::to_path_buf).or_else(default_config_path) {
        Some(path) => println!("# {}", path.display()),
        None => println!("# built-in defaults"),
    }
    let criteria = load_criteria(config);
    print!("{}", criteria.to_toml().context("Failed to render criteria")?);
    Ok(())
}
