//! WORM record model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kinds of record content accepted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordType {
    Document,
    Dataset,
    Report,
    Configuration,
    Attestation,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Document => "document",
            RecordType::Dataset => "dataset",
            RecordType::Report => "report",
            RecordType::Configuration => "configuration",
            RecordType::Attestation => "attestation",
        }
    }
}

impl std::str::FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(RecordType::Document),
            "dataset" => Ok(RecordType::Dataset),
            "report" => Ok(RecordType::Report),
            "configuration" => Ok(RecordType::Configuration),
            "attestation" => Ok(RecordType::Attestation),
            _ => Err(format!("Unknown record type: {}", s)),
        }
    }
}

/// Record lifecycle status. The only post-creation field change permitted on
/// a record row; transitions leave `active` exactly once and never return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordStatus {
    Active,
    Superseded,
    Archived,
    Sealed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Superseded => "superseded",
            RecordStatus::Archived => "archived",
            RecordStatus::Sealed => "sealed",
        }
    }
}

impl std::str::FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RecordStatus::Active),
            "superseded" => Ok(RecordStatus::Superseded),
            "archived" => Ok(RecordStatus::Archived),
            "sealed" => Ok(RecordStatus::Sealed),
            _ => Err(format!("Unknown record status: {}", s)),
        }
    }
}

/// One chain-of-custody entry: who touched the record and whether its
/// integrity held at that moment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessEntry {
    pub accessor_id: String,
    pub access_type: String,
    pub accessed_at: DateTime<Utc>,
    pub integrity_verified: bool,
    pub context: Option<Value>,
}

/// Outcome of one integrity check against a record's stored content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TamperCheck {
    pub checked_at: DateTime<Utc>,
    pub passed: bool,
    pub violation_type: Option<String>,
    pub expected_hash: Option<String>,
    pub calculated_hash: Option<String>,
}

/// Read-only snapshot of a stored record.
///
/// `content`, `content_hash`, `integrity_signature`, `created_by`, and
/// `created_at` are immutable forever after creation. `access_history` and
/// `tamper_checks` are append-only chain-of-custody lists assembled from the
/// side tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WormRecord {
    pub record_id: String,
    pub record_type: RecordType,
    pub content: Value,
    pub metadata: Value,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub content_hash: String,
    pub integrity_signature: String,
    pub signature_id: String,
    pub status: RecordStatus,
    pub access_history: Vec<AccessEntry>,
    pub tamper_checks: Vec<TamperCheck>,
}

/// Read-only query filter. All fields optional and combined with AND.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub record_type: Option<RecordType>,
    pub created_by: Option<String>,
    pub status: Option<RecordStatus>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

/// One finding from a storage-wide integrity scan.
#[derive(Debug, Clone, Serialize)]
pub struct TamperEvidence {
    pub record_id: String,
    pub violation_type: String,
    pub expected_hash: String,
    pub calculated_hash: String,
}

/// Result of a full-table integrity scan.
#[derive(Debug, Clone, Serialize)]
pub struct StorageIntegrityReport {
    pub total_records: u64,
    pub verified_records: u64,
    pub failed_records: u64,
    pub records_with_signature: u64,
    pub tamper_evidence: Vec<TamperEvidence>,
    pub regulatory_compliant: bool,
}

/// Result of a read-only inspection export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub inspector_id: String,
    pub exported_at: DateTime<Utc>,
    pub total_records: u64,
    pub records_by_type: std::collections::BTreeMap<String, u64>,
    pub files_written: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_record_type_round_trip() {
        for t in [
            RecordType::Document,
            RecordType::Dataset,
            RecordType::Report,
            RecordType::Configuration,
            RecordType::Attestation,
        ] {
            assert_eq!(RecordType::from_str(t.as_str()).unwrap(), t);
        }
    }

    #[test]
    fn test_record_status_round_trip() {
        for s in [
            RecordStatus::Active,
            RecordStatus::Superseded,
            RecordStatus::Archived,
            RecordStatus::Sealed,
        ] {
            assert_eq!(RecordStatus::from_str(s.as_str()).unwrap(), s);
        }
        assert!(RecordStatus::from_str("deleted").is_err());
    }
}
