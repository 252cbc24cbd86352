//! Signature binding service.
//!
//! Implements signature manifestation (who signed, when, and what the
//! signature means) and signature/record linking (non-repudiation): the
//! signed payload binds the signer's identity and a single-use nonce to the
//! record's content hash, so a binding cannot be replayed against different
//! content.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::binding::{SignatureBinding, SignatureManifest, SignatureMeaning};
use crate::crypto::canonical::{canonical_bytes, content_hash, is_sha256_tag, sha256_tagged};
use crate::crypto::Signer;
use crate::error::VaultError;
use crate::ledger::{AuditLedger, EventType, Severity};

/// Summary of a manifest scan: structural completeness plus signer and
/// meaning distributions.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestIntegrityReport {
    pub total_bindings: usize,
    pub incomplete_bindings: Vec<String>,
    pub bindings_by_signer: BTreeMap<String, u64>,
    pub bindings_by_meaning: BTreeMap<String, u64>,
}

/// Binds signer identity and intent to immutable record content.
#[derive(Clone)]
pub struct SignatureBindingService {
    signer: Signer,
    ledger: AuditLedger,
    manifest: Arc<Mutex<SignatureManifest>>,
}

impl SignatureBindingService {
    /// Load the manifest at `manifest_path`, rebuilding the in-memory index.
    pub fn initialize(
        manifest_path: &Path,
        signer: Signer,
        ledger: AuditLedger,
    ) -> Result<Self, VaultError> {
        let manifest = SignatureManifest::load(manifest_path)?;
        Ok(Self {
            signer,
            ledger,
            manifest: Arc::new(Mutex::new(manifest)),
        })
    }

    /// Create a signature binding for a record.
    ///
    /// Re-signing under the same `(record_id, signer_id, meaning)` triple is
    /// a regulatory violation, not a no-op: it fails with a
    /// duplicate-signature error and never overwrites.
    pub async fn bind(
        &self,
        record_id: &str,
        record_content: &Value,
        signer_name: &str,
        signer_id: &str,
        meaning: SignatureMeaning,
        context: Option<Value>,
    ) -> Result<SignatureBinding, VaultError> {
        let mut manifest = self.manifest.lock().await;

        if manifest.find(record_id, signer_id, meaning).is_some() {
            warn!(
                record_id,
                signer_id,
                meaning = meaning.as_str(),
                "Duplicate signature rejected"
            );
            return Err(VaultError::DuplicateSignature {
                record_id: record_id.to_string(),
                signer_id: signer_id.to_string(),
                meaning: meaning.as_str().to_string(),
            });
        }

        let record_content_hash = content_hash(record_content)?;
        let nonce = Uuid::new_v4().to_string();

        let payload = json!({
            "record_id": record_id,
            "record_content_hash": record_content_hash,
            "signer_name": signer_name,
            "signer_id": signer_id,
            "signature_meaning": meaning.as_str(),
            "nonce": nonce,
            "context": context,
        });
        let signed = self
            .signer
            .sign(payload, EventType::ElectronicSignatureBinding.as_str())
            .await?;

        // Fast-path integrity check over the complete signed entry,
        // signature included, distinct from the signature itself.
        let binding_proof = sha256_tagged(&canonical_bytes(&serde_json::to_value(&signed)?)?);

        let binding = SignatureBinding {
            record_id: record_id.to_string(),
            record_content_hash,
            signature_id: signed.signature_id,
            signer_name: signer_name.to_string(),
            signer_id: signer_id.to_string(),
            signature_meaning: meaning,
            signature_timestamp: signed.signing_timestamp,
            signature_value: signed.signature,
            binding_proof,
        };

        manifest.append(binding.clone())?;

        self.ledger
            .log_event(
                EventType::ElectronicSignatureBinding,
                Severity::Info,
                json!({
                    "record_id": record_id,
                    "signer_id": signer_id,
                    "signature_meaning": meaning.as_str(),
                    "signature_id": &binding.signature_id,
                }),
                None,
            )
            .await?;

        info!(
            record_id,
            signer_id,
            meaning = meaning.as_str(),
            "Signature bound to record"
        );
        Ok(binding)
    }

    /// Verify a binding against the record content as it exists now.
    ///
    /// The content-hash match is the primary defense against post-signature
    /// record tampering. The single-use nonce is not retained, so this is a
    /// hash and structure check, not a full re-signature replay.
    pub fn verify(&self, binding: &SignatureBinding, current_record_content: &Value) -> bool {
        let calculated = match content_hash(current_record_content) {
            Ok(hash) => hash,
            Err(e) => {
                warn!(record_id = %binding.record_id, "Content hashing failed during verify: {}", e);
                return false;
            }
        };
        if calculated != binding.record_content_hash {
            warn!(
                record_id = %binding.record_id,
                "Record content changed after signature"
            );
            return false;
        }

        if !binding_is_complete(binding) {
            warn!(record_id = %binding.record_id, "Structurally incomplete binding");
            return false;
        }

        is_sha256_tag(&binding.binding_proof)
    }

    /// All bindings attached to a record, in append order.
    pub async fn signatures_for(&self, record_id: &str) -> Vec<SignatureBinding> {
        self.manifest
            .lock()
            .await
            .bindings()
            .iter()
            .filter(|b| b.record_id == record_id)
            .cloned()
            .collect()
    }

    /// All bindings issued by a signer, in append order.
    pub async fn signatures_by(&self, signer_id: &str) -> Vec<SignatureBinding> {
        self.manifest
            .lock()
            .await
            .bindings()
            .iter()
            .filter(|b| b.signer_id == signer_id)
            .cloned()
            .collect()
    }

    /// Scan the manifest for structurally incomplete entries and summarize
    /// signer and meaning distributions.
    pub async fn integrity_report(&self) -> ManifestIntegrityReport {
        let manifest = self.manifest.lock().await;

        let mut incomplete = Vec::new();
        let mut by_signer: BTreeMap<String, u64> = BTreeMap::new();
        let mut by_meaning: BTreeMap<String, u64> = BTreeMap::new();

        for binding in manifest.bindings() {
            if !binding_is_complete(binding) || !is_sha256_tag(&binding.binding_proof) {
                incomplete.push(binding.signature_id.clone());
            }
            *by_signer.entry(binding.signer_id.clone()).or_insert(0) += 1;
            *by_meaning
                .entry(binding.signature_meaning.as_str().to_string())
                .or_insert(0) += 1;
        }

        ManifestIntegrityReport {
            total_bindings: manifest.len(),
            incomplete_bindings: incomplete,
            bindings_by_signer: by_signer,
            bindings_by_meaning: by_meaning,
        }
    }
}

fn binding_is_complete(binding: &SignatureBinding) -> bool {
    !binding.record_id.is_empty()
        && is_sha256_tag(&binding.record_content_hash)
        && !binding.signature_id.is_empty()
        && !binding.signer_name.is_empty()
        && !binding.signer_id.is_empty()
        && !binding.signature_value.is_empty()
        && hex::decode(&binding.signature_value).is_ok()
}
