use pairwise_core::CoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}:{line}: {message}", file.display())]
    Parse {
        file: PathBuf,
        line: usize,
        message: String,
    },
    #[error("{} holds directives that cannot be regenerated", .0.display())]
    NotRegenerable(PathBuf),
    #[error("Transfer account {0} is not opened in the ledger")]
    UnknownTransferAccount(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl LedgerError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        LedgerError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
