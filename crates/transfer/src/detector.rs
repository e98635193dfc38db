use pairwise_core::{relative_difference_percent, Transaction};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::criteria::DetectionCriteria;
use crate::error::TransferError;
use crate::index::{BucketIndex, CandidateIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Confirmed,
    Suspected,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Confirmed => write!(f, "confirmed"),
            Confidence::Suspected => write!(f, "suspected"),
        }
    }
}

/// Why a relaxed match was accepted. Tags are stable: they end up in ledger
/// metadata and are read back on later runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuspectReason {
    SameDirection,
    AmountMismatchFx,
    DateDelay(i64),
    DescriptionBased,
}

impl fmt::Display for SuspectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuspectReason::SameDirection => write!(f, "same-direction"),
            SuspectReason::AmountMismatchFx => write!(f, "amount-mismatch-fx"),
            SuspectReason::DateDelay(days) => write!(f, "date-delay-{days}days"),
            SuspectReason::DescriptionBased => write!(f, "description-based"),
        }
    }
}

impl FromStr for SuspectReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "same-direction" => Ok(SuspectReason::SameDirection),
            "amount-mismatch-fx" => Ok(SuspectReason::AmountMismatchFx),
            "description-based" => Ok(SuspectReason::DescriptionBased),
            other => other
                .strip_prefix("date-delay-")
                .and_then(|rest| rest.strip_suffix("days"))
                .and_then(|n| n.parse().ok())
                .map(SuspectReason::DateDelay)
                .ok_or_else(|| format!("Unknown suspect reason: '{other}'")),
        }
    }
}

impl SuspectReason {
    pub fn join(reasons: &[SuspectReason]) -> String {
        reasons
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parses a comma-joined reason string, skipping tags it does not know.
    pub fn parse_list(s: &str) -> Vec<SuspectReason> {
        s.split(',').filter_map(|tag| tag.parse().ok()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferPair {
    /// The outflow side.
    pub source: Transaction,
    /// The inflow side.
    pub dest: Transaction,
    pub confidence: Confidence,
    /// Comma-joined reason tags; only set on suspected pairs.
    pub reason: Option<String>,
}

impl TransferPair {
    /// The negative side becomes the source. With equal signs the first
    /// argument is the source; that choice carries no meaning but is stable.
    fn oriented(
        first: &Transaction,
        second: &Transaction,
        confidence: Confidence,
        reason: Option<String>,
    ) -> Self {
        let (source, dest) = if !first.is_outflow() && second.is_outflow() {
            (second, first)
        } else {
            (first, second)
        };
        TransferPair {
            source: source.clone(),
            dest: dest.clone(),
            confidence,
            reason,
        }
    }

    pub fn amount(&self) -> Decimal {
        self.source.abs_amount()
    }

    pub fn reasons(&self) -> Vec<SuspectReason> {
        self.reason
            .as_deref()
            .map(SuspectReason::parse_list)
            .unwrap_or_default()
    }

    pub fn involves(&self, id: &str) -> bool {
        self.source.id == id || self.dest.id == id
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionResult {
    pub confirmed_pairs: Vec<TransferPair>,
    pub suspected_pairs: Vec<TransferPair>,
    pub unmatched_transactions: Vec<Transaction>,
}

impl DetectionResult {
    /// Confirmed pairs first, then suspected, each in detection order.
    pub fn pairs(&self) -> impl Iterator<Item = &TransferPair> {
        self.confirmed_pairs.iter().chain(self.suspected_pairs.iter())
    }

    pub fn pair_for(&self, id: &str) -> Option<&TransferPair> {
        self.pairs().find(|pair| pair.involves(id))
    }
}

/// Greedy two-phase transfer matcher.
///
/// Phase one accepts exact (or `amount_tolerance`) matches with opposite
/// signs inside the tight date window. Phase two looks at what is left with
/// the relaxed window and FX tolerance, and accepts a candidate as soon as any
/// heuristic fires. Both phases take the first acceptable candidate in input
/// order rather than the best one.
pub struct TransferDetector {
    criteria: DetectionCriteria,
    name_pattern: Option<Regex>,
}

impl TransferDetector {
    pub fn new(criteria: DetectionCriteria) -> Result<Self, TransferError> {
        criteria.validate()?;
        let name_pattern = criteria.name_pattern()?;
        Ok(Self {
            criteria,
            name_pattern,
        })
    }

    pub fn criteria(&self) -> &DetectionCriteria {
        &self.criteria
    }

    pub fn detect(&self, transactions: &[Transaction]) -> DetectionResult {
        let index = BucketIndex::build(transactions);
        self.detect_with(transactions, &index)
    }

    pub fn detect_with<'t, I: CandidateIndex<'t>>(
        &self,
        transactions: &'t [Transaction],
        index: &I,
    ) -> DetectionResult {
        let mut paired = HashSet::new();
        let confirmed_pairs = self.confirm_phase(transactions, index, &mut paired);
        let suspected_pairs = self.suspect_phase(transactions, index, &mut paired);
        let unmatched_transactions: Vec<Transaction> = transactions
            .iter()
            .filter(|tx| !paired.contains(&tx.id))
            .cloned()
            .collect();

        info!(
            transactions = transactions.len(),
            confirmed = confirmed_pairs.len(),
            suspected = suspected_pairs.len(),
            unmatched = unmatched_transactions.len(),
            "Transfer detection finished"
        );

        DetectionResult {
            confirmed_pairs,
            suspected_pairs,
            unmatched_transactions,
        }
    }

    /// Exact-amount, opposite-sign matches within `max_date_difference_days`.
    pub fn confirm_phase<'t, I: CandidateIndex<'t>>(
        &self,
        transactions: &'t [Transaction],
        index: &I,
        paired: &mut HashSet<String>,
    ) -> Vec<TransferPair> {
        let mut pairs = Vec::new();
        for tx in transactions {
            if paired.contains(&tx.id) {
                continue;
            }
            let found = index
                .find_candidates(
                    tx,
                    self.criteria.max_date_difference_days,
                    self.criteria.amount_tolerance,
                )
                .into_iter()
                .find(|c| !paired.contains(&c.id) && tx.has_opposite_sign(c));

            if let Some(candidate) = found {
                debug!(source = %tx.id, dest = %candidate.id, "Confirmed transfer");
                paired.insert(tx.id.clone());
                paired.insert(candidate.id.clone());
                pairs.push(TransferPair::oriented(tx, candidate, Confidence::Confirmed, None));
            }
        }
        pairs
    }

    /// Relaxed matches for whatever phase one left unpaired.
    pub fn suspect_phase<'t, I: CandidateIndex<'t>>(
        &self,
        transactions: &'t [Transaction],
        index: &I,
        paired: &mut HashSet<String>,
    ) -> Vec<TransferPair> {
        let mut pairs = Vec::new();
        for tx in transactions {
            if paired.contains(&tx.id) {
                continue;
            }
            let candidates = index.find_candidates(
                tx,
                self.criteria.max_suspected_date_days,
                self.criteria.fx_amount_tolerance_percent,
            );
            for candidate in candidates {
                if paired.contains(&candidate.id) {
                    continue;
                }
                let reasons = self.suspect_reasons(tx, candidate);
                if reasons.is_empty() {
                    continue;
                }
                let reason = SuspectReason::join(&reasons);
                debug!(source = %tx.id, dest = %candidate.id, %reason, "Suspected transfer");
                paired.insert(tx.id.clone());
                paired.insert(candidate.id.clone());
                pairs.push(TransferPair::oriented(
                    tx,
                    candidate,
                    Confidence::Suspected,
                    Some(reason),
                ));
                break;
            }
        }
        pairs
    }

    /// Every heuristic that fires for the pair, in tag order.
    pub fn suspect_reasons(&self, a: &Transaction, b: &Transaction) -> Vec<SuspectReason> {
        let mut reasons = Vec::new();

        if !a.has_opposite_sign(b) {
            reasons.push(SuspectReason::SameDirection);
        }

        let fx_involved =
            self.criteria.is_fx_account(&a.account) || self.criteria.is_fx_account(&b.account);
        if fx_involved && a.abs_amount() != b.abs_amount() {
            let within = relative_difference_percent(a.amount, b.amount)
                .is_some_and(|pct| pct <= self.criteria.fx_amount_tolerance_percent);
            if within {
                reasons.push(SuspectReason::AmountMismatchFx);
            }
        }

        let days = a.days_apart(b);
        if days > self.criteria.max_date_difference_days {
            reasons.push(SuspectReason::DateDelay(days));
        }

        if self.mentions_own_transfer(a) || self.mentions_own_transfer(b) {
            reasons.push(SuspectReason::DescriptionBased);
        }

        reasons
    }

    fn mentions_own_transfer(&self, tx: &Transaction) -> bool {
        let Some(pattern) = &self.name_pattern else {
            return false;
        };
        let text = tx.description_text();
        text.to_lowercase().contains("transfer") && pattern.is_match(&text)
    }
}

/// Operator hint derived from recurring suspect reasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    DateDelay { days: i64, count: usize },
    FxMismatch { count: usize },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::DateDelay { days, count } => write!(
                f,
                "Pattern detected: {count} transfer(s) with {days}-day delay. \
                 Consider setting max_date_difference_days = {days}"
            ),
            Advisory::FxMismatch { count } => write!(
                f,
                "Pattern detected: {count} suspected FX transfer(s). \
                 Review fx_enabled_accounts and fx_amount_tolerance_percent"
            ),
        }
    }
}

/// Tallies suspected pairs by delay and FX mismatch. Read-only over the
/// result; delays come out in ascending order, FX last.
pub fn pattern_advisories(result: &DetectionResult) -> Vec<Advisory> {
    let mut delays: BTreeMap<i64, usize> = BTreeMap::new();
    let mut fx = 0;
    for pair in &result.suspected_pairs {
        for reason in pair.reasons() {
            match reason {
                SuspectReason::DateDelay(days) => *delays.entry(days).or_default() += 1,
                SuspectReason::AmountMismatchFx => fx += 1,
                _ => {}
            }
        }
    }

    let mut advisories: Vec<Advisory> = delays
        .into_iter()
        .map(|(days, count)| Advisory::DateDelay { days, count })
        .collect();
    if fx > 0 {
        advisories.push(Advisory::FxMismatch { count: fx });
    }
    advisories
}
