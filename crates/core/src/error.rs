use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("Invalid amount: '{0}'")]
    InvalidAmount(String),
    #[error("Invalid period '{0}': expected YYYY-MM")]
    InvalidPeriod(String),
    #[error("Remote transaction {0} has no date")]
    MissingDate(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
