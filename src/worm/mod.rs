//! Write-once-read-many record storage with storage-level immutability
//! enforcement, tamper detection, and chain-of-custody tracking.

pub mod record;
pub mod store;

pub use record::{
    AccessEntry, ExportSummary, RecordFilter, RecordStatus, RecordType, StorageIntegrityReport,
    TamperCheck, TamperEvidence, WormRecord,
};
pub use store::WormStore;
