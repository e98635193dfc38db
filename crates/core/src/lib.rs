pub mod account;
pub mod amount;
pub mod error;
pub mod period;
pub mod remote;
pub mod transaction;

pub use account::{AccountKind, AccountRef};
pub use amount::{parse_decimal, relative_difference_percent, Amount};
pub use error::CoreError;
pub use period::{DateRange, YearMonth};
pub use remote::{parse_remote_transactions, RemoteTransaction};
pub use transaction::{parse_date, Transaction};
