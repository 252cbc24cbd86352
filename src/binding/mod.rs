//! Electronic signature binding.
//!
//! Cryptographically attaches a named signer, a stated meaning, and a
//! timestamp to one specific record's content hash. Independent of the WORM
//! store's own per-record integrity signature.

pub mod manifest;
pub mod service;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use manifest::SignatureManifest;
pub use service::{ManifestIntegrityReport, SignatureBindingService};

/// What a signature asserts about the record being signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureMeaning {
    Approved,
    Reviewed,
    Verified,
    Authored,
    Witnessed,
    Responsibility,
    Countersigned,
}

impl SignatureMeaning {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureMeaning::Approved => "approved",
            SignatureMeaning::Reviewed => "reviewed",
            SignatureMeaning::Verified => "verified",
            SignatureMeaning::Authored => "authored",
            SignatureMeaning::Witnessed => "witnessed",
            SignatureMeaning::Responsibility => "responsibility",
            SignatureMeaning::Countersigned => "countersigned",
        }
    }
}

impl std::str::FromStr for SignatureMeaning {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(SignatureMeaning::Approved),
            "reviewed" => Ok(SignatureMeaning::Reviewed),
            "verified" => Ok(SignatureMeaning::Verified),
            "authored" => Ok(SignatureMeaning::Authored),
            "witnessed" => Ok(SignatureMeaning::Witnessed),
            "responsibility" => Ok(SignatureMeaning::Responsibility),
            "countersigned" => Ok(SignatureMeaning::Countersigned),
            _ => Err(format!("Unknown signature meaning: {}", s)),
        }
    }
}

/// One electronic signature bound to one record. Created once per
/// `(record_id, signer_id, meaning)` triple; never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureBinding {
    pub record_id: String,
    pub record_content_hash: String,
    pub signature_id: String,
    pub signer_name: String,
    pub signer_id: String,
    pub signature_meaning: SignatureMeaning,
    pub signature_timestamp: DateTime<Utc>,
    pub signature_value: String,
    pub binding_proof: String,
}
