use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::account::AccountRef;
use super::error::CoreError;

/// One financial movement, normalized from either the ledger or the remote
/// budgeting service.
///
/// Detection never mutates these; pairing decisions travel through
/// `DetectionResult` and are written back by the ledger applier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    /// Negative for outflows, positive for inflows.
    pub amount: Decimal,
    pub date: NaiveDate,
    pub currency_code: String,
    pub payee: Option<String>,
    pub memo: Option<String>,
    pub note: Option<String>,
    pub account: AccountRef,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub is_transfer: bool,
    pub paired: Option<String>,
    pub suspect_reason: Option<String>,
}

impl Transaction {
    pub fn new(id: &str, amount: Decimal, date: NaiveDate, account: AccountRef) -> Self {
        Transaction {
            id: id.to_string(),
            amount,
            date,
            currency_code: String::new(),
            payee: None,
            memo: None,
            note: None,
            account,
            category: None,
            tags: Vec::new(),
            is_transfer: false,
            paired: None,
            suspect_reason: None,
        }
    }

    pub fn abs_amount(&self) -> Decimal {
        self.amount.abs()
    }

    pub fn is_outflow(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    /// Zero counts as an inflow.
    pub fn has_opposite_sign(&self, other: &Transaction) -> bool {
        self.is_outflow() != other.is_outflow()
    }

    pub fn days_apart(&self, other: &Transaction) -> i64 {
        (self.date - other.date).num_days().abs()
    }

    /// Payee, memo and note joined by spaces, for text heuristics.
    pub fn description_text(&self) -> String {
        [&self.payee, &self.memo, &self.note]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Strict `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Result<NaiveDate, CoreError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| CoreError::InvalidDate(s.trim().to_string()))
}
