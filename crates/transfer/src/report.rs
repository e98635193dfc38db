use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::detector::DetectionResult;
use crate::error::TransferError;

/// One CSV row per detected pair, for review outside the ledger.
#[derive(Debug, Serialize)]
struct PairRow<'a> {
    confidence: String,
    source_id: &'a str,
    dest_id: &'a str,
    date_out: NaiveDate,
    date_in: NaiveDate,
    amount: Decimal,
    currency: &'a str,
    source_account: String,
    dest_account: String,
    reason: &'a str,
}

pub fn write_csv<W: Write>(result: &DetectionResult, writer: W) -> Result<(), TransferError> {
    let mut out = csv::Writer::from_writer(writer);
    for pair in result.pairs() {
        out.serialize(PairRow {
            confidence: pair.confidence.to_string(),
            source_id: &pair.source.id,
            dest_id: &pair.dest.id,
            date_out: pair.source.date,
            date_in: pair.dest.date,
            amount: pair.amount(),
            currency: &pair.source.currency_code,
            source_account: pair.source.account.to_string(),
            dest_account: pair.dest.account.to_string(),
            reason: pair.reason.as_deref().unwrap_or_default(),
        })?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_csv_file(result: &DetectionResult, path: &Path) -> Result<(), TransferError> {
    let file = std::fs::File::create(path)?;
    write_csv(result, file)?;
    tracing::info!("Wrote transfer report to {}", path.display());
    Ok(())
}
