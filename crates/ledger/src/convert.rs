use pairwise_core::{AccountKind, AccountRef, Transaction};
use std::collections::HashMap;

use crate::entry::{Entry, Ledger};

/// Builds the detector's view of one ledger entry.
///
/// `account_ids` maps account names to the `id` metadata of their `open`
/// directive. Entries without an `id`, or without an asset/liability posting
/// carrying an amount, have nothing to pair and yield `None`.
///
/// Postings to `transfer_account` never own the transaction: they are the
/// rewritten category legs of an earlier confirmed pair, and read back as
/// the category.
pub fn entry_to_transaction(
    entry: &Entry,
    account_ids: &HashMap<String, String>,
    transfer_account: &str,
) -> Option<Transaction> {
    let id = entry.id()?;
    let (account, amount) = entry.postings.iter().find_map(|p| {
        if p.account == transfer_account {
            return None;
        }
        let kind = AccountKind::of(&p.account)?;
        let amount = p.amount.as_ref()?;
        kind.is_balance_sheet().then_some((&p.account, amount))
    })?;
    let category = entry
        .postings
        .iter()
        .find(|p| AccountKind::of(&p.account).is_some_and(AccountKind::is_category))
        .or_else(|| entry.postings.iter().find(|p| p.account == transfer_account))
        .map(|p| p.account.clone());

    let account_ref = AccountRef::new(
        account_ids.get(account).map(String::as_str),
        Some(account.as_str()),
    );
    let mut tx = Transaction::new(&id, amount.number, entry.date, account_ref);
    tx.currency_code = amount.currency.clone();
    tx.payee = entry.payee.clone();
    tx.memo = Some(entry.narration.clone()).filter(|n| !n.is_empty());
    tx.note = entry.meta_text("note");
    tx.category = category;
    tx.tags = entry.tags.clone();
    tx.is_transfer = entry.meta_text("is_transfer").as_deref() == Some("true");
    tx.paired = entry.meta_text("paired");
    tx.suspect_reason = entry.meta_text("suspect_reason");
    Some(tx)
}

/// Every pairable transaction in the ledger, in entry order.
pub fn ledger_transactions(ledger: &Ledger, transfer_account: &str) -> Vec<Transaction> {
    let account_ids: HashMap<String, String> = ledger
        .opens
        .iter()
        .filter_map(|o| Some((o.account.clone(), o.meta.get("id")?.to_text())))
        .collect();

    let transactions: Vec<Transaction> = ledger
        .entries
        .iter()
        .filter_map(|e| entry_to_transaction(e, &account_ids, transfer_account))
        .collect();
    let skipped = ledger.entries.len() - transactions.len();
    if skipped > 0 {
        tracing::debug!("{skipped} ledger entries have no id or no account posting");
    }
    transactions
}
