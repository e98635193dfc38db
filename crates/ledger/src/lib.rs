pub mod applier;
pub mod convert;
pub mod entry;
pub mod error;
pub mod format;
pub mod parser;

pub use applier::{ApplyOutcome, ApplySummary, TransferAccount, TransferApplier};
pub use convert::{entry_to_transaction, ledger_transactions};
pub use entry::{Entry, Ledger, LedgerFile, Meta, MetaValue, OpenDirective, Posting, SourceLocation};
pub use error::LedgerError;
pub use format::{format_entry, format_file};
pub use parser::{load_ledger, parse_str, ParsedFile};
