use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Invalid detection criteria: {0}")]
    InvalidCriteria(String),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to write TOML: {0}")]
    TomlWrite(#[from] toml::ser::Error),
    #[error("Invalid name pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
