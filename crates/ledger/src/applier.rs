//! Writes detection results back into the ledger.
//!
//! Pairs become metadata on both entries. Confirmed pairs also have their
//! income/expense legs re-pointed at the transfer account. Every detail file
//! holding an updated entry is then regenerated through the canonical
//! formatter and swapped in atomically.

use chrono::{DateTime, Utc};
use pairwise_core::{AccountKind, YearMonth};
use pairwise_transfer::{Confidence, DetectionResult, TransferPair};
use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::entry::{Entry, Ledger, MetaValue};
use crate::error::LedgerError;
use crate::format::format_file;

/// The account confirmed transfers are booked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferAccount {
    pub name: String,
    pub id: Option<String>,
}

impl TransferAccount {
    pub fn new(name: &str, id: Option<&str>) -> Self {
        TransferAccount {
            name: name.to_string(),
            id: id.map(str::to_string),
        }
    }

    /// Looks the account up among the ledger's `open` directives.
    pub fn resolve(ledger: &Ledger, name: &str) -> Result<Self, LedgerError> {
        if ledger.open_for(name).is_none() {
            return Err(LedgerError::UnknownTransferAccount(name.to_string()));
        }
        Ok(TransferAccount::new(name, ledger.account_id(name).as_deref()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub confirmed: usize,
    pub suspected: usize,
    /// Pairs naming an id the ledger does not have.
    pub skipped: usize,
    /// Positions of updated entries.
    pub updated: BTreeSet<usize>,
}

#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub summary: ApplySummary,
    /// Rendered content per affected file, in write order.
    pub rendered: Vec<(PathBuf, String)>,
    pub written: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, LedgerError)>,
}

impl ApplyOutcome {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct TransferApplier {
    account: TransferAccount,
}

impl TransferApplier {
    pub fn new(account: TransferAccount) -> Self {
        TransferApplier { account }
    }

    pub fn account(&self) -> &TransferAccount {
        &self.account
    }

    /// Books the entry against the transfer account. When the account's
    /// `open` directive carries an id, it is recorded as `category_id`.
    pub fn mark_confirmed(&self, entry: &mut Entry, counterpart: &str) {
        entry.set_meta("is_transfer", MetaValue::String("true".to_string()));
        entry.set_meta("paired", MetaValue::from_id(counterpart));
        entry.meta.remove("suspect_reason");
        if let Some(id) = &self.account.id {
            entry.set_meta("category_id", MetaValue::from_id(id));
        }
        for posting in &mut entry.postings {
            if AccountKind::of(&posting.account).is_some_and(AccountKind::is_category) {
                posting.account.clone_from(&self.account.name);
            }
        }
    }

    pub fn mark_suspected(&self, entry: &mut Entry, counterpart: &str, reason: &str) {
        entry.set_meta("paired", MetaValue::from_id(counterpart));
        entry.set_meta("suspect_reason", MetaValue::String(reason.to_string()));
        entry.meta.remove("is_transfer");
    }

    /// Returns a copy of `entries` with every pair applied in place. Untouched
    /// entries keep their position and provenance.
    pub fn apply_pairs(&self, entries: &[Entry], result: &DetectionResult) -> (Vec<Entry>, ApplySummary) {
        let mut positions: HashMap<String, usize> = HashMap::new();
        for (pos, entry) in entries.iter().enumerate() {
            if let Some(id) = entry.id() {
                if positions.contains_key(&id) {
                    tracing::warn!("Duplicate entry id {id}; pairing uses the first occurrence");
                    continue;
                }
                positions.insert(id, pos);
            }
        }

        let mut updated = entries.to_vec();
        let mut summary = ApplySummary::default();
        for pair in result.pairs() {
            let (Some(&src), Some(&dst)) = (positions.get(&pair.source.id), positions.get(&pair.dest.id)) else {
                tracing::debug!(
                    "Skipping pair {} -> {}: id not found in ledger",
                    pair.source.id,
                    pair.dest.id
                );
                summary.skipped += 1;
                continue;
            };
            self.apply_pair(pair, &mut updated, src, dst);
            match pair.confidence {
                Confidence::Confirmed => summary.confirmed += 1,
                Confidence::Suspected => summary.suspected += 1,
            }
            summary.updated.extend([src, dst]);
        }
        (updated, summary)
    }

    fn apply_pair(&self, pair: &TransferPair, entries: &mut [Entry], src: usize, dst: usize) {
        let (source_id, dest_id) = (pair.source.id.as_str(), pair.dest.id.as_str());
        match pair.confidence {
            Confidence::Confirmed => {
                self.mark_confirmed(&mut entries[src], dest_id);
                self.mark_confirmed(&mut entries[dst], source_id);
            }
            Confidence::Suspected => {
                let reason = pair.reason.as_deref().unwrap_or_default();
                self.mark_suspected(&mut entries[src], dest_id, reason);
                self.mark_suspected(&mut entries[dst], source_id, reason);
            }
        }
    }

    /// Detail files holding at least one updated entry. The root file is
    /// never regenerated.
    pub fn affected_files(entries: &[Entry], updated: &BTreeSet<usize>, root: &Path) -> BTreeSet<PathBuf> {
        let mut files = BTreeSet::new();
        for &pos in updated {
            match entries.get(pos).and_then(Entry::source_file) {
                Some(file) if file != root => {
                    files.insert(file.to_path_buf());
                }
                Some(_) => tracing::warn!(
                    "Entry {} lives in the root file and is not rewritten",
                    entries[pos].id().unwrap_or_default()
                ),
                None => {}
            }
        }
        files
    }

    /// Regenerates one detail file from every entry that came from it.
    pub fn render_file(
        ledger: &Ledger,
        entries: &[Entry],
        path: &Path,
        generated_at: DateTime<Utc>,
    ) -> Result<String, LedgerError> {
        if ledger.file(path).is_some_and(|f| f.foreign_directives > 0) {
            return Err(LedgerError::NotRegenerable(path.to_path_buf()));
        }
        let mut in_file: Vec<&Entry> = entries
            .iter()
            .filter(|e| e.source_file() == Some(path))
            .collect();
        in_file.sort_by_key(|e| e.sort_key());
        Ok(format_file(YearMonth::from_path(path), &in_file, generated_at))
    }

    pub fn apply(&self, ledger: &Ledger, result: &DetectionResult, dry_run: bool) -> ApplyOutcome {
        self.apply_at(ledger, result, dry_run, Utc::now())
    }

    /// Applies `result` to the ledger and rewrites the affected files, one
    /// by one in path order. A failing file does not stop the others.
    pub fn apply_at(
        &self,
        ledger: &Ledger,
        result: &DetectionResult,
        dry_run: bool,
        generated_at: DateTime<Utc>,
    ) -> ApplyOutcome {
        let (entries, summary) = self.apply_pairs(&ledger.entries, result);
        tracing::info!(
            "Applied {} confirmed and {} suspected pair(s) using {}; skipped {}",
            summary.confirmed,
            summary.suspected,
            self.account.name,
            summary.skipped
        );

        let mut outcome = ApplyOutcome {
            summary,
            ..ApplyOutcome::default()
        };
        for path in Self::affected_files(&entries, &outcome.summary.updated, &ledger.root) {
            let content = match Self::render_file(ledger, &entries, &path, generated_at) {
                Ok(content) => content,
                Err(e) => {
                    tracing::error!("Cannot regenerate {}: {e}", path.display());
                    outcome.failed.push((path, e));
                    continue;
                }
            };
            if !dry_run {
                match write_atomic(&path, &content) {
                    Ok(()) => {
                        tracing::info!("Rewrote {}", path.display());
                        outcome.written.push(path.clone());
                    }
                    Err(e) => {
                        tracing::error!("Failed to write {}: {e}", path.display());
                        outcome.failed.push((path.clone(), e));
                    }
                }
            }
            outcome.rendered.push((path, content));
        }
        outcome
    }
}

/// Writes through a temporary file in the target's directory, then renames
/// it over the target.
fn write_atomic(path: &Path, content: &str) -> Result<(), LedgerError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| LedgerError::io(path, e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| LedgerError::io(path, e))?;
    tmp.as_file().sync_all().map_err(|e| LedgerError::io(path, e))?;
    tmp.persist(path).map_err(|e| LedgerError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::ledger_transactions;
    use crate::format::format_entry;
    use crate::parser::load_ledger;
    use chrono::TimeZone;
    use pairwise_core::{AccountRef, Transaction};
    use pairwise_transfer::{DetectionCriteria, TransferDetector};
    use rust_decimal_macros::dec;

    const TRANSFERS: &str = "Assets:Transfers";

    const MAIN: &str = r#"option "title" "Household"

2020-01-01 open Assets:Checking USD
    id: 1
2020-01-01 open Assets:Savings USD
    id: 2
2020-01-01 open Liabilities:Card USD
2020-01-01 open Assets:Transfers USD
    id: 99

include "2025-01.beancount"
include "2025/2025-02.beancount"
include "2025-03.beancount"
"#;

    const JAN: &str = r#"2025-01-31 * "Bank" "To savings"
    id: 102
  Assets:Savings  500.00 USD
  Income:Misc    -500.00 USD

2025-01-30 * "Bank" "Move money"
    id: 101
  Assets:Checking  -500.00 USD
  Expenses:Misc     500.00 USD
"#;

    const FEB: &str = r#"2025-02-10 * "Card payment"
    id: 201
  Assets:Checking    -40.00 USD
  Expenses:Shopping   40.00 USD

2025-02-14 * "Card payment received"
    id: 202
  Liabilities:Card   40.00 USD
  Income:Other      -40.00 USD
"#;

    const MAR: &str = r#"2025-03-02 * "Cafe" "Coffee"
    id: 301
  Expenses:Food     4.50 USD
  Assets:Checking  -4.50 USD
"#;

    fn write_books(dir: &Path) -> PathBuf {
        std::fs::create_dir(dir.join("2025")).unwrap();
        std::fs::write(dir.join("main.beancount"), MAIN).unwrap();
        std::fs::write(dir.join("2025-01.beancount"), JAN).unwrap();
        std::fs::write(dir.join("2025/2025-02.beancount"), FEB).unwrap();
        std::fs::write(dir.join("2025-03.beancount"), MAR).unwrap();
        dir.join("main.beancount")
    }

    fn detect(ledger: &Ledger) -> DetectionResult {
        TransferDetector::new(DetectionCriteria::default())
            .unwrap()
            .detect(&ledger_transactions(ledger, TRANSFERS))
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap()
    }

    fn applier(ledger: &Ledger) -> TransferApplier {
        TransferApplier::new(TransferAccount::resolve(ledger, TRANSFERS).unwrap())
    }

    #[test]
    fn resolves_transfer_account_id() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = load_ledger(&write_books(dir.path())).unwrap();
        assert_eq!(
            applier(&ledger).account(),
            &TransferAccount::new("Assets:Transfers", Some("99"))
        );
        assert!(matches!(
            TransferAccount::resolve(&ledger, "Assets:Nope"),
            Err(LedgerError::UnknownTransferAccount(_))
        ));
    }

    #[test]
    fn rewrites_only_affected_detail_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = write_books(dir.path());
        let ledger = load_ledger(&root).unwrap();
        let result = detect(&ledger);
        assert_eq!(result.confirmed_pairs.len(), 1);
        assert_eq!(result.suspected_pairs.len(), 1);

        let outcome = applier(&ledger).apply_at(&ledger, &result, false, at());
        assert!(outcome.is_success());
        assert_eq!(outcome.summary.confirmed, 1);
        assert_eq!(outcome.summary.suspected, 1);
        assert_eq!(
            outcome.written,
            // path order compares components, so the 2025/ directory sorts first
            vec![dir.path().join("2025/2025-02.beancount"), dir.path().join("2025-01.beancount")]
        );
        assert_eq!(std::fs::read_to_string(&root).unwrap(), MAIN);
        assert_eq!(std::fs::read_to_string(dir.path().join("2025-03.beancount")).unwrap(), MAR);

        let jan = std::fs::read_to_string(dir.path().join("2025-01.beancount")).unwrap();
        let expected_jan = r#"; Transactions for January 2025
; Generated 2025-04-01 09:00:00 UTC

2025-01-30 * "Bank" "Move money"
    id: 101
    is_transfer: "true"
    paired: 102
    category_id: 99
  Assets:Checking   -500.00 USD
  Assets:Transfers   500.00 USD

2025-01-31 * "Bank" "To savings"
    id: 102
    is_transfer: "true"
    paired: 101
    category_id: 99
  Assets:Savings     500.00 USD
  Assets:Transfers  -500.00 USD
"#;
        assert_eq!(jan, expected_jan);

        let feb = std::fs::read_to_string(dir.path().join("2025/2025-02.beancount")).unwrap();
        assert!(feb.starts_with("; Transactions for February 2025\n"));
        assert!(feb.contains("    paired: 202\n    suspect_reason: \"date-delay-4days\"\n"));
        assert!(feb.contains("  Expenses:Shopping   40.00 USD\n"));
        assert!(!feb.contains("is_transfer"));
    }

    #[test]
    fn dry_run_renders_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = load_ledger(&write_books(dir.path())).unwrap();
        let result = detect(&ledger);
        let outcome = applier(&ledger).apply_at(&ledger, &result, true, at());
        assert!(outcome.written.is_empty());
        assert_eq!(outcome.rendered.len(), 2);
        assert_eq!(std::fs::read_to_string(dir.path().join("2025-01.beancount")).unwrap(), JAN);
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = load_ledger(&write_books(dir.path())).unwrap();
        let result = detect(&ledger);
        let applier = applier(&ledger);
        let (once, _) = applier.apply_pairs(&ledger.entries, &result);
        let (twice, _) = applier.apply_pairs(&once, &result);
        let render = |entries: &[Entry]| entries.iter().map(format_entry).collect::<Vec<_>>();
        assert_eq!(render(&once), render(&twice));
    }

    #[test]
    fn confirmed_pairs_survive_reload_and_reapply() {
        let dir = tempfile::tempdir().unwrap();
        let root = write_books(dir.path());
        let jan_path = dir.path().join("2025-01.beancount");
        // category legs first, so the rewritten transfer leg leads each entry
        std::fs::write(
            &jan_path,
            r#"2025-01-30 * "Bank" "Move money"
    id: 101
  Expenses:Misc     500.00 USD
  Assets:Checking  -500.00 USD

2025-01-31 * "Bank" "To savings"
    id: 102
  Income:Misc     -500.00 USD
  Assets:Savings   500.00 USD
"#,
        )
        .unwrap();

        let ledger = load_ledger(&root).unwrap();
        let first = detect(&ledger);
        let outcome = applier(&ledger).apply_at(&ledger, &first, false, at());
        assert!(outcome.is_success());
        let after_first = std::fs::read_to_string(&jan_path).unwrap();
        assert!(after_first.contains("  Assets:Transfers   500.00 USD\n  Assets:Checking   -500.00 USD\n"));

        let reloaded = load_ledger(&root).unwrap();
        let txs = ledger_transactions(&reloaded, TRANSFERS);
        let moved = txs.iter().find(|t| t.id == "101").unwrap();
        assert_eq!(moved.amount, dec!(-500.00));
        assert_eq!(moved.account.name.as_deref(), Some("Assets:Checking"));
        assert_eq!(moved.category.as_deref(), Some(TRANSFERS));

        let second = detect(&reloaded);
        let pair_ids = |r: &DetectionResult| {
            r.pairs()
                .map(|p| (p.source.id.clone(), p.dest.id.clone(), p.confidence, p.reason.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(pair_ids(&second), pair_ids(&first));
        assert!(second.pair_for("101").is_some_and(|p| p.confidence == Confidence::Confirmed));

        let outcome = applier(&reloaded).apply_at(&reloaded, &second, false, at());
        assert!(outcome.is_success());
        assert_eq!(std::fs::read_to_string(&jan_path).unwrap(), after_first);
        assert!(!after_first.contains("suspect_reason"));
    }

    #[test]
    fn transfer_account_without_id_writes_no_category_id() {
        let applier = TransferApplier::new(TransferAccount::new(TRANSFERS, None));
        let mut entry = Entry::new(chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), "x");
        applier.mark_confirmed(&mut entry, "7");
        assert!(!entry.meta.contains_key("category_id"));

        let applier = TransferApplier::new(TransferAccount::new(TRANSFERS, Some("99")));
        applier.mark_confirmed(&mut entry, "7");
        assert_eq!(entry.meta["category_id"], MetaValue::Number(dec!(99)));
    }

    #[test]
    fn suspected_pair_replaces_earlier_transfer_flag() {
        let applier = TransferApplier::new(TransferAccount::new(TRANSFERS, None));
        let mut entry = Entry::new(chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), "x");
        applier.mark_confirmed(&mut entry, "7");
        applier.mark_suspected(&mut entry, "8", "same-direction");
        assert!(!entry.meta.contains_key("is_transfer"));
        assert_eq!(entry.meta["paired"], MetaValue::Number(dec!(8)));
        applier.mark_confirmed(&mut entry, "a-9");
        assert!(!entry.meta.contains_key("suspect_reason"));
        assert_eq!(entry.meta["paired"], MetaValue::String("a-9".to_string()));
    }

    #[test]
    fn pairs_with_unknown_ids_are_skipped_whole() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = load_ledger(&write_books(dir.path())).unwrap();
        let date = chrono::NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
        let known = Transaction::new("301", dec!(-4.50), date, AccountRef::named("Assets:Checking"));
        let ghost = Transaction::new("999", dec!(4.50), date, AccountRef::named("Assets:Cash"));
        let result = DetectionResult {
            confirmed_pairs: vec![TransferPair {
                source: known,
                dest: ghost,
                confidence: Confidence::Confirmed,
                reason: None,
            }],
            ..DetectionResult::default()
        };
        let (entries, summary) = applier(&ledger).apply_pairs(&ledger.entries, &result);
        assert_eq!(summary.skipped, 1);
        assert!(summary.updated.is_empty());
        assert_eq!(entries, ledger.entries);
    }

    #[test]
    fn one_failing_file_does_not_block_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = load_ledger(&write_books(dir.path())).unwrap();
        let result = detect(&ledger);
        std::fs::remove_dir_all(dir.path().join("2025")).unwrap();

        let outcome = applier(&ledger).apply_at(&ledger, &result, false, at());
        assert!(!outcome.is_success());
        assert_eq!(outcome.written, vec![dir.path().join("2025-01.beancount")]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, dir.path().join("2025/2025-02.beancount"));
    }

    #[test]
    fn files_with_other_directives_are_not_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let root = write_books(dir.path());
        std::fs::write(
            dir.path().join("2025-03.beancount"),
            format!("2025-03-01 balance Assets:Checking 0.00 USD\n\n{MAR}"),
        )
        .unwrap();
        let ledger = load_ledger(&root).unwrap();
        let result = detect(&ledger);
        let path = dir.path().join("2025-03.beancount");
        let mut updated = BTreeSet::new();
        updated.insert(ledger.entries.iter().position(|e| e.id().as_deref() == Some("301")).unwrap());
        assert_eq!(
            TransferApplier::affected_files(&ledger.entries, &updated, &root),
            BTreeSet::from([path.clone()])
        );
        assert!(matches!(
            TransferApplier::render_file(&ledger, &ledger.entries, &path, at()),
            Err(LedgerError::NotRegenerable(_))
        ));
        assert!(result.pairs().all(|p| !p.involves("301")));
    }
}
