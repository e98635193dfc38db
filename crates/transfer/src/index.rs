//! Candidate lookup for transfer matching.
//!
//! Both strategies return candidates in input order, not by closeness. The
//! detector takes the first acceptable one, so that order is part of the
//! contract.

use chrono::NaiveDate;
use pairwise_core::{DateRange, Transaction};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

pub trait CandidateIndex<'t> {
    /// Transactions that could be the other half of a transfer with `txn`:
    /// absolute amount within `amount_tolerance_percent` of `txn`'s, dated
    /// within `max_days`, on a known and different account, and not `txn`
    /// itself.
    fn find_candidates(
        &self,
        txn: &Transaction,
        max_days: i64,
        amount_tolerance_percent: Decimal,
    ) -> Vec<&'t Transaction>;
}

/// Hybrid amount bucket: linear where personal-finance amounts cluster,
/// logarithmic above 10 000.
pub fn amount_bucket(amount: Decimal) -> u32 {
    let a = amount.abs();
    let floor = |d: Decimal| d.floor().to_u32().unwrap_or(0);

    if a < Decimal::ONE {
        0
    } else if a < Decimal::TEN {
        floor(a)
    } else if a < Decimal::ONE_HUNDRED {
        10 + floor(a / Decimal::TEN)
    } else if a < Decimal::ONE_THOUSAND {
        20 + floor(a / Decimal::from(50))
    } else if a < Decimal::from(10_000) {
        40 + floor(a / Decimal::from(500))
    } else {
        let mut magnitude = 0;
        let mut n = a;
        while n >= Decimal::TEN {
            n /= Decimal::TEN;
            magnitude += 1;
        }
        60 + magnitude
    }
}

/// Bounds of the tolerance window around `|amount|`, lower bound clamped at 0.
fn amount_window(amount: Decimal, tolerance_percent: Decimal) -> (Decimal, Decimal) {
    let target = amount.abs();
    let tolerance = target * tolerance_percent.abs() / Decimal::ONE_HUNDRED;
    ((target - tolerance).max(Decimal::ZERO), target + tolerance)
}

/// Final per-candidate checks shared by every strategy.
fn is_candidate(
    query: &Transaction,
    candidate: &Transaction,
    (low, high): (Decimal, Decimal),
    window: DateRange,
) -> bool {
    let amount = candidate.abs_amount();
    candidate.id != query.id
        && amount >= low
        && amount <= high
        && window.contains(candidate.date)
        && query.account.is_distinct_from(&candidate.account)
}

/// Amount buckets plus a per-date map, both built in one pass.
pub struct BucketIndex<'t> {
    transactions: &'t [Transaction],
    by_date: HashMap<NaiveDate, Vec<usize>>,
    by_bucket: HashMap<u32, Vec<usize>>,
}

impl<'t> BucketIndex<'t> {
    pub fn build(transactions: &'t [Transaction]) -> Self {
        let mut by_date: HashMap<NaiveDate, Vec<usize>> = HashMap::new();
        let mut by_bucket: HashMap<u32, Vec<usize>> = HashMap::new();
        for (pos, tx) in transactions.iter().enumerate() {
            by_date.entry(tx.date).or_default().push(pos);
            by_bucket.entry(amount_bucket(tx.amount)).or_default().push(pos);
        }
        tracing::debug!(
            transactions = transactions.len(),
            dates = by_date.len(),
            buckets = by_bucket.len(),
            "Built candidate index"
        );
        Self {
            transactions,
            by_date,
            by_bucket,
        }
    }

    pub fn on_date(&self, date: NaiveDate) -> Vec<&'t Transaction> {
        self.by_date
            .get(&date)
            .map(|positions| positions.iter().map(|&p| &self.transactions[p]).collect())
            .unwrap_or_default()
    }

    pub fn bucket_count(&self) -> usize {
        self.by_bucket.len()
    }
}

impl<'t> CandidateIndex<'t> for BucketIndex<'t> {
    fn find_candidates(
        &self,
        txn: &Transaction,
        max_days: i64,
        amount_tolerance_percent: Decimal,
    ) -> Vec<&'t Transaction> {
        let bounds = amount_window(txn.amount, amount_tolerance_percent);
        let window = DateRange::around(txn.date, max_days);

        let mut positions: Vec<usize> = (amount_bucket(bounds.0)..=amount_bucket(bounds.1))
            .filter_map(|bucket| self.by_bucket.get(&bucket))
            .flatten()
            .copied()
            .collect();

        // Narrow through the date map only when the window is the smaller side.
        let span = (window.end - window.start).num_days().unsigned_abs() as usize + 1;
        if span < positions.len() {
            let dated: HashSet<usize> = window
                .days()
                .filter_map(|day| self.by_date.get(&day))
                .flatten()
                .copied()
                .collect();
            positions.retain(|p| dated.contains(p));
        }

        // Each transaction lives in exactly one bucket, so no dedup needed.
        positions.sort_unstable();
        positions
            .into_iter()
            .map(|p| &self.transactions[p])
            .filter(|candidate| is_candidate(txn, candidate, bounds, window))
            .collect()
    }
}

/// Fallback strategy: positions sorted by absolute amount, queried with two
/// binary searches. Useful when amounts pile into a handful of buckets.
pub struct SortedIndex<'t> {
    transactions: &'t [Transaction],
    by_amount: Vec<usize>,
}

impl<'t> SortedIndex<'t> {
    pub fn build(transactions: &'t [Transaction]) -> Self {
        let mut by_amount: Vec<usize> = (0..transactions.len()).collect();
        by_amount.sort_by(|&a, &b| {
            transactions[a]
                .abs_amount()
                .cmp(&transactions[b].abs_amount())
                .then(a.cmp(&b))
        });
        Self {
            transactions,
            by_amount,
        }
    }
}

impl<'t> CandidateIndex<'t> for SortedIndex<'t> {
    fn find_candidates(
        &self,
        txn: &Transaction,
        max_days: i64,
        amount_tolerance_percent: Decimal,
    ) -> Vec<&'t Transaction> {
        let bounds = amount_window(txn.amount, amount_tolerance_percent);
        let window = DateRange::around(txn.date, max_days);
        let txs = self.transactions;

        let start = self
            .by_amount
            .partition_point(|&p| txs[p].abs_amount() < bounds.0);
        let end = self
            .by_amount
            .partition_point(|&p| txs[p].abs_amount() <= bounds.1);

        let mut positions = self.by_amount[start..end.max(start)].to_vec();
        positions.sort_unstable();
        positions
            .into_iter()
            .map(|p| &txs[p])
            .filter(|candidate| is_candidate(txn, candidate, bounds, window))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairwise_core::AccountRef;
    use rust_decimal_macros::dec;

    fn tx(id: &str, amount: Decimal, day: u32, account: &str) -> Transaction {
        Transaction::new(
            id,
            amount,
            NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
            AccountRef::with_id(account),
        )
    }

    fn ids(found: &[&Transaction]) -> Vec<String> {
        found.iter().map(|t| t.id.clone()).collect()
    }

    #[test]
    fn bucket_boundaries() {
        assert_eq!(amount_bucket(dec!(0.99)), 0);
        assert_eq!(amount_bucket(dec!(1)), 1);
        assert_eq!(amount_bucket(dec!(9.99)), 9);
        assert_eq!(amount_bucket(dec!(10)), 11);
        assert_eq!(amount_bucket(dec!(99.99)), 19);
        assert_eq!(amount_bucket(dec!(100)), 22);
        assert_eq!(amount_bucket(dec!(999.99)), 39);
        assert_eq!(amount_bucket(dec!(1000)), 42);
        assert_eq!(amount_bucket(dec!(9999.99)), 59);
        assert_eq!(amount_bucket(dec!(10000)), 64);
        assert_eq!(amount_bucket(dec!(123456.78)), 65);
    }

    #[test]
    fn bucket_ignores_sign() {
        assert_eq!(amount_bucket(dec!(-250.00)), amount_bucket(dec!(250.00)));
    }

    #[test]
    fn buckets_are_monotonic() {
        let samples = [
            dec!(0), dec!(0.5), dec!(1), dec!(5.5), dec!(10), dec!(55), dec!(100), dec!(149.99),
            dec!(150), dec!(999), dec!(1000), dec!(4999), dec!(9999), dec!(10000), dec!(99999),
            dec!(100000),
        ];
        for pair in samples.windows(2) {
            assert!(amount_bucket(pair[0]) <= amount_bucket(pair[1]), "{pair:?}");
        }
    }

    #[test]
    fn exact_lookup_filters_amount_date_and_account() {
        let txs = vec![
            tx("1", dec!(-100.00), 10, "a"),
            tx("2", dec!(100.00), 11, "b"),  // match
            tx("3", dec!(100.00), 20, "b"),  // too late
            tx("4", dec!(100.00), 10, "a"),  // same account
            tx("5", dec!(100.01), 10, "b"),  // amount off
            tx("6", dec!(-100.00), 9, "c"),  // match, same sign is the detector's call
        ];
        let index = BucketIndex::build(&txs);
        let found = index.find_candidates(&txs[0], 2, Decimal::ZERO);
        assert_eq!(ids(&found), vec!["2", "6"]);
    }

    #[test]
    fn tolerance_window_crosses_bucket_boundaries() {
        let txs = vec![
            tx("1", dec!(-100.00), 10, "a"),
            tx("2", dec!(96.00), 10, "b"),  // bucket 19, inside 5%
            tx("3", dec!(94.00), 10, "b"),  // outside 5%
            tx("4", dec!(104.99), 10, "b"), // inside
            tx("5", dec!(105.01), 10, "b"), // outside
        ];
        let index = BucketIndex::build(&txs);
        let found = index.find_candidates(&txs[0], 0, dec!(5.0));
        assert_eq!(ids(&found), vec!["2", "4"]);
    }

    #[test]
    fn unknown_accounts_never_match() {
        let mut anonymous = tx("2", dec!(50), 10, "b");
        anonymous.account = AccountRef::default();
        let txs = vec![tx("1", dec!(-50), 10, "a"), anonymous];
        let index = BucketIndex::build(&txs);
        assert!(index.find_candidates(&txs[0], 2, Decimal::ZERO).is_empty());
    }

    #[test]
    fn query_never_finds_itself() {
        let txs = vec![tx("1", dec!(-50), 10, "a")];
        let index = BucketIndex::build(&txs);
        let mut copy = txs[0].clone();
        copy.account = AccountRef::with_id("other");
        assert!(index.find_candidates(&copy, 2, Decimal::ZERO).is_empty());
    }

    #[test]
    fn results_keep_input_order_across_buckets() {
        let txs = vec![
            tx("q", dec!(-100.00), 10, "a"),
            tx("high", dec!(103.00), 10, "b"), // bucket 22
            tx("low", dec!(98.00), 10, "b"),   // bucket 19
            tx("exact", dec!(100.00), 10, "b"),
        ];
        let index = BucketIndex::build(&txs);
        let found = index.find_candidates(&txs[0], 0, dec!(5));
        assert_eq!(ids(&found), vec!["high", "low", "exact"]);
    }

    #[test]
    fn wide_date_window_uses_direct_filter() {
        let txs = vec![
            tx("1", dec!(-20), 1, "a"),
            tx("2", dec!(20), 31, "b"),
            tx("3", dec!(20), 15, "b"),
        ];
        let index = BucketIndex::build(&txs);
        let found = index.find_candidates(&txs[0], 20, Decimal::ZERO);
        assert_eq!(ids(&found), vec!["3"]);
    }

    #[test]
    fn on_date_lists_transactions_in_order() {
        let txs = vec![
            tx("1", dec!(-20), 1, "a"),
            tx("2", dec!(20), 2, "b"),
            tx("3", dec!(7), 1, "b"),
        ];
        let index = BucketIndex::build(&txs);
        assert_eq!(ids(&index.on_date(txs[0].date)), vec!["1", "3"]);
        assert!(index.bucket_count() >= 2);
    }

    #[test]
    fn sorted_index_agrees_with_bucket_index() {
        let amounts = [
            dec!(-100.00), dec!(100.00), dec!(-102.00), dec!(98.50), dec!(-5000), dec!(5100),
            dec!(-12345.67), dec!(12345.67), dec!(0.50), dec!(-0.50), dec!(99.99), dec!(-104.00),
        ];
        let txs: Vec<Transaction> = amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| {
                let account = if i % 3 == 0 { "a" } else if i % 3 == 1 { "b" } else { "c" };
                tx(&i.to_string(), *amount, 1 + (i as u32 % 6), account)
            })
            .collect();

        let buckets = BucketIndex::build(&txs);
        let sorted = SortedIndex::build(&txs);
        for query in &txs {
            for (days, pct) in [(0, Decimal::ZERO), (2, Decimal::ZERO), (4, dec!(5.0)), (30, dec!(50))] {
                assert_eq!(
                    ids(&buckets.find_candidates(query, days, pct)),
                    ids(&sorted.find_candidates(query, days, pct)),
                    "query {} days {days} pct {pct}",
                    query.id
                );
            }
        }
    }
}
