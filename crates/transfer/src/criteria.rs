use pairwise_core::AccountRef;
use regex::{Regex, RegexBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::TransferError;

/// Tunable thresholds for transfer detection, persisted as a small TOML file.
///
/// Any field missing from the file takes its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionCriteria {
    /// Date window for confirmed pairs, in days either side.
    pub max_date_difference_days: i64,
    /// Percent amount tolerance for confirmed pairs. Zero means exact.
    pub amount_tolerance: Decimal,
    /// Date window for suspected pairs. Never narrower than the confirmed one.
    pub max_suspected_date_days: i64,
    /// Percent amount tolerance for suspected pairs and the FX heuristic.
    pub fx_amount_tolerance_percent: Decimal,
    /// Ways the ledger owner shows up in transfer descriptions.
    pub name_variations: Vec<String>,
    /// Account-name substrings (case-insensitive) that hold foreign currency.
    pub fx_enabled_accounts: Vec<String>,
}

impl Default for DetectionCriteria {
    fn default() -> Self {
        Self {
            max_date_difference_days: 2,
            amount_tolerance: Decimal::ZERO,
            max_suspected_date_days: 4,
            fx_amount_tolerance_percent: Decimal::new(50, 1),
            name_variations: vec![
                "own account".to_string(),
                "my account".to_string(),
                "myself".to_string(),
                "me".to_string(),
            ],
            fx_enabled_accounts: Vec::new(),
        }
    }
}

impl DetectionCriteria {
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.max_date_difference_days < 0 || self.max_suspected_date_days < 0 {
            return Err(TransferError::InvalidCriteria(
                "date windows must not be negative".to_string(),
            ));
        }
        if self.max_suspected_date_days < self.max_date_difference_days {
            return Err(TransferError::InvalidCriteria(format!(
                "max_suspected_date_days ({}) is smaller than max_date_difference_days ({})",
                self.max_suspected_date_days, self.max_date_difference_days
            )));
        }
        if self.amount_tolerance.is_sign_negative() || self.fx_amount_tolerance_percent.is_sign_negative() {
            return Err(TransferError::InvalidCriteria(
                "amount tolerances must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_toml(toml_content: &str) -> Result<Self, TransferError> {
        let criteria: DetectionCriteria = toml::from_str(toml_content)?;
        criteria.validate()?;
        Ok(criteria)
    }

    pub fn to_toml(&self) -> Result<String, TransferError> {
        Ok(toml::to_string(self)?)
    }

    /// Reads the criteria file, falling back to defaults when it is missing,
    /// unreadable or invalid. A broken config never stops a run.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No criteria file at {}, using defaults", path.display());
                return Self::default();
            }
            Err(e) => {
                tracing::warn!("Cannot read {}: {e}; using default criteria", path.display());
                return Self::default();
            }
        };
        match Self::from_toml(&content) {
            Ok(criteria) => criteria,
            Err(e) => {
                tracing::warn!("Ignoring {}: {e}; using default criteria", path.display());
                Self::default()
            }
        }
    }

    pub fn is_fx_account(&self, account: &AccountRef) -> bool {
        self.fx_enabled_accounts
            .iter()
            .filter(|needle| !needle.is_empty())
            .any(|needle| account.name_contains(needle))
    }

    /// Case-insensitive alternation of the name variations, matched as whole
    /// words. `None` when there are no variations.
    pub fn name_pattern(&self) -> Result<Option<Regex>, TransferError> {
        let alternatives: Vec<String> = self
            .name_variations
            .iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(regex::escape)
            .collect();
        if alternatives.is_empty() {
            return Ok(None);
        }
        let pattern = format!(r"\b(?:{})\b", alternatives.join("|"));
        let regex = RegexBuilder::new(&pattern).case_insensitive(true).build()?;
        Ok(Some(regex))
    }
}
