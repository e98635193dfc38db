//! Canonical text rendering of ledger entries.
//!
//! Output is byte-stable: formatting an entry, reading it back and
//! formatting it again yields the same text.

use chrono::{DateTime, Utc};
use pairwise_core::YearMonth;
use std::fmt::Write;

use crate::entry::{Entry, Posting};

/// Metadata keys that lead every entry, in this order.
pub const LEADING_META_KEYS: [&str; 5] = [
    "id",
    "last_modified",
    "closing_balance",
    "is_transfer",
    "paired",
];

/// Provenance keys some tools inject into metadata. Never written.
pub const PROVENANCE_META_KEYS: [&str; 2] = ["filename", "lineno"];

const META_INDENT: &str = "    ";
const POSTING_INDENT: &str = "  ";
const MIN_AMOUNT_GAP: usize = 2;

pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Renders one entry. Every line, the last included, ends with `\n`.
pub fn format_entry(entry: &Entry) -> String {
    let mut out = header_line(entry);
    out.push('\n');

    for key in LEADING_META_KEYS {
        if let Some(value) = entry.meta.get(key) {
            let _ = writeln!(out, "{META_INDENT}{key}: {value}");
        }
    }
    // BTreeMap iteration is already sorted by key
    for (key, value) in &entry.meta {
        if LEADING_META_KEYS.contains(&key.as_str())
            || PROVENANCE_META_KEYS.contains(&key.as_str())
        {
            continue;
        }
        let _ = writeln!(out, "{META_INDENT}{key}: {value}");
    }

    for line in posting_lines(&entry.postings) {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn header_line(entry: &Entry) -> String {
    let mut line = format!(
        "{} {} {} {}",
        entry.date.format("%Y-%m-%d"),
        entry.flag,
        quote(entry.payee.as_deref().unwrap_or_default()),
        quote(&entry.narration)
    );
    let mut tags: Vec<&String> = entry.tags.iter().collect();
    tags.sort();
    for tag in tags {
        line.push_str(" #");
        line.push_str(tag);
    }
    for link in &entry.links {
        line.push_str(" ^");
        line.push_str(link);
    }
    line
}

fn posting_lines(postings: &[Posting]) -> Vec<String> {
    let split: Vec<Option<(String, String, &str)>> = postings
        .iter()
        .map(|p| {
            p.amount.as_ref().map(|a| {
                let (int, frac) = a.split_number();
                (int, frac, a.currency.as_str())
            })
        })
        .collect();

    let account_width = postings
        .iter()
        .zip(&split)
        .filter(|(_, s)| s.is_some())
        .map(|(p, _)| p.account.chars().count())
        .max()
        .unwrap_or(0);
    let int_width = split
        .iter()
        .flatten()
        .map(|(int, _, _)| int.chars().count())
        .max()
        .unwrap_or(0);

    postings
        .iter()
        .zip(split)
        .map(|(posting, amount)| match amount {
            Some((int, frac, currency)) => {
                let pad = account_width - posting.account.chars().count()
                    + MIN_AMOUNT_GAP
                    + int_width
                    - int.chars().count();
                format!(
                    "{POSTING_INDENT}{}{}{int}{frac} {currency}",
                    posting.account,
                    " ".repeat(pad)
                )
            }
            None => format!("{POSTING_INDENT}{}", posting.account),
        })
        .collect()
}

/// Renders a whole detail file: an optional period header, then the
/// entries separated by one blank line.
pub fn format_file(
    period: Option<YearMonth>,
    entries: &[&Entry],
    generated_at: DateTime<Utc>,
) -> String {
    let mut blocks: Vec<String> = Vec::with_capacity(entries.len() + 1);
    if let Some(period) = period {
        blocks.push(format!(
            "; Transactions for {}\n; Generated {}\n",
            period.label(),
            generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    blocks.extend(entries.iter().map(|e| format_entry(e)));
    blocks.join("\n")
}
