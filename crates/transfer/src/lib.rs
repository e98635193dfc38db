pub mod criteria;
pub mod detector;
pub mod error;
pub mod index;
pub mod report;

pub use criteria::DetectionCriteria;
pub use detector::{
    pattern_advisories, Advisory, Confidence, DetectionResult, SuspectReason, TransferDetector,
    TransferPair,
};
pub use error::TransferError;
pub use index::{amount_bucket, BucketIndex, CandidateIndex, SortedIndex};
pub use report::{write_csv, write_csv_file};
