//! Chain-linked digital signatures.
//!
//! `Signer` produces `SignedEntry` values: an ECDSA signature over the
//! canonical bytes of a payload, plus a secondary SHA-256 integrity hash of
//! the same bytes as defense-in-depth against signature-library
//! substitution. Each signature records the previous one, forming a chain in
//! which insertion, deletion, or reordering becomes cryptographically
//! evident.
//!
//! The chain pointer is per-instance state behind a mutex, never
//! process-global, so independent signer instances (tests included) cannot
//! cross-contaminate chains.

use chrono::{DateTime, SecondsFormat, Utc};
use secp256k1::ecdsa::Signature;
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::crypto::canonical::{canonical_bytes, sha256_tagged};
use crate::crypto::keys::VaultKeyPair;
use crate::error::VaultError;

/// A payload signed into the chain.
///
/// Immutable once created; consumed by the audit ledger and the WORM store
/// as an embedded sub-structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedEntry {
    pub payload: Value,
    pub entry_type: String,
    pub system_id: String,
    pub signature: String,
    pub signature_id: String,
    pub signing_timestamp: DateTime<Utc>,
    pub previous_signature: Option<String>,
    pub integrity_hash: String,
}

/// Result of a full-chain scan. Violations are collected, not raised, so
/// the complete set can be reported.
#[derive(Debug, Clone, Serialize)]
pub struct ChainVerification {
    pub chain_valid: bool,
    pub verified_count: usize,
    pub invalid_entries: Vec<InvalidEntry>,
    pub chain_breaks: Vec<ChainBreak>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvalidEntry {
    pub index: usize,
    pub signature_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainBreak {
    pub index: usize,
    pub expected_previous: Option<String>,
    pub found_previous: Option<String>,
}

#[derive(Default)]
struct ChainState {
    last_signature: Option<String>,
}

/// Chain-linked signer bound to one system keypair.
#[derive(Clone)]
pub struct Signer {
    secp: Arc<Secp256k1<All>>,
    system_id: String,
    secret_key: SecretKey,
    public_key: PublicKey,
    chain: Arc<Mutex<ChainState>>,
}

impl Signer {
    pub fn new(keypair: VaultKeyPair) -> Self {
        Self {
            secp: Arc::new(Secp256k1::new()),
            system_id: keypair.system_id,
            secret_key: keypair.secret_key,
            public_key: keypair.public_key,
            chain: Arc::new(Mutex::new(ChainState::default())),
        }
    }

    pub fn system_id(&self) -> &str {
        &self.system_id
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Sign a payload, linking it to the previous signature issued by this
    /// instance. Fails with a signing error if the crypto primitive fails;
    /// never substitutes a placeholder signature.
    pub async fn sign(&self, payload: Value, entry_type: &str) -> Result<SignedEntry, VaultError> {
        let mut chain = self.chain.lock().await;

        let signature_id = Uuid::new_v4().to_string();
        let signing_timestamp = Utc::now();
        let previous_signature = chain.last_signature.clone();

        let canonical = canonical_signing_value(
            &payload,
            entry_type,
            &self.system_id,
            &signature_id,
            &signing_timestamp,
            previous_signature.as_deref(),
        );
        let bytes = canonical_bytes(&canonical)?;
        let integrity_hash = sha256_tagged(&bytes);

        let digest = Sha256::digest(&bytes);
        let message = Message::from_digest_slice(&digest)
            .map_err(|e| VaultError::SigningError(format!("Invalid message digest: {}", e)))?;
        let signature = hex::encode(
            self.secp
                .sign_ecdsa(&message, &self.secret_key)
                .serialize_compact(),
        );

        chain.last_signature = Some(signature.clone());

        debug!(entry_type, %signature_id, "Issued chain-linked signature");

        Ok(SignedEntry {
            payload,
            entry_type: entry_type.to_string(),
            system_id: self.system_id.clone(),
            signature,
            signature_id,
            signing_timestamp,
            previous_signature,
            integrity_hash,
        })
    }

    /// Verify a single entry: integrity hash first, then the signature.
    ///
    /// Returns `false` on any failure (malformed metadata, hash mismatch,
    /// bad signature) rather than raising, so callers can process a stream
    /// containing invalid entries without aborting.
    pub fn verify(&self, entry: &SignedEntry) -> bool {
        let canonical = canonical_signing_value(
            &entry.payload,
            &entry.entry_type,
            &entry.system_id,
            &entry.signature_id,
            &entry.signing_timestamp,
            entry.previous_signature.as_deref(),
        );

        let bytes = match canonical_bytes(&canonical) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(signature_id = %entry.signature_id, "Canonicalization failed during verify: {}", e);
                return false;
            }
        };

        if sha256_tagged(&bytes) != entry.integrity_hash {
            warn!(signature_id = %entry.signature_id, "Integrity hash mismatch");
            return false;
        }

        let signature_bytes = match hex::decode(&entry.signature) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(signature_id = %entry.signature_id, "Malformed signature hex: {}", e);
                return false;
            }
        };
        let signature = match Signature::from_compact(&signature_bytes) {
            Ok(sig) => sig,
            Err(e) => {
                warn!(signature_id = %entry.signature_id, "Invalid signature encoding: {}", e);
                return false;
            }
        };

        let digest = Sha256::digest(&bytes);
        let message = match Message::from_digest_slice(&digest) {
            Ok(message) => message,
            Err(e) => {
                warn!(signature_id = %entry.signature_id, "Invalid digest: {}", e);
                return false;
            }
        };

        self.secp
            .verify_ecdsa(&message, &signature, &self.public_key)
            .is_ok()
    }

    /// Verify an ordered sequence of entries and their chain linkage.
    ///
    /// A chain break or invalid entry is recorded without stopping the scan,
    /// so the full set of violations is reported. The first entry must be a
    /// chain head (`previous_signature: None`); a dangling pointer there
    /// means entries before it were removed.
    pub fn verify_chain(&self, entries: &[SignedEntry]) -> ChainVerification {
        let mut verified_count = 0;
        let mut invalid_entries = Vec::new();
        let mut chain_breaks = Vec::new();

        for (i, entry) in entries.iter().enumerate() {
            if self.verify(entry) {
                verified_count += 1;
            } else {
                invalid_entries.push(InvalidEntry {
                    index: i,
                    signature_id: entry.signature_id.clone(),
                });
            }

            let expected = if i > 0 {
                Some(entries[i - 1].signature.clone())
            } else {
                None
            };
            if entry.previous_signature != expected {
                chain_breaks.push(ChainBreak {
                    index: i,
                    expected_previous: expected,
                    found_previous: entry.previous_signature.clone(),
                });
            }
        }

        ChainVerification {
            chain_valid: invalid_entries.is_empty() && chain_breaks.is_empty(),
            verified_count,
            invalid_entries,
            chain_breaks,
        }
    }

    /// The signature most recently issued by this instance, if any.
    pub async fn last_signature(&self) -> Option<String> {
        self.chain.lock().await.last_signature.clone()
    }
}

/// The exact structure whose canonical bytes are signed. Rebuilt identically
/// at verification time from the stored entry fields.
fn canonical_signing_value(
    payload: &Value,
    entry_type: &str,
    system_id: &str,
    signature_id: &str,
    timestamp: &DateTime<Utc>,
    previous_signature: Option<&str>,
) -> Value {
    json!({
        "payload": payload,
        "timestamp": timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
        "signature_id": signature_id,
        "entry_type": entry_type,
        "system_id": system_id,
        "previous_signature": previous_signature,
    })
}
