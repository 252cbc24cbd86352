//! Binding manifest file.
//!
//! A JSON document holding the manifest version and the ordered list of
//! signature bindings, rebuilt into memory on load and rewritten wholesale
//! on each append. Acceptable at expected manifest sizes; an append-only
//! log with periodic compaction is the scaling path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::binding::{SignatureBinding, SignatureMeaning};
use crate::error::VaultError;

const MANIFEST_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct ManifestDocument {
    manifest_version: u32,
    bindings: Vec<SignatureBinding>,
}

/// In-memory index over the manifest file, append order preserved.
pub struct SignatureManifest {
    path: PathBuf,
    bindings: Vec<SignatureBinding>,
}

impl SignatureManifest {
    /// Load the manifest from `path`, starting empty if the file does not
    /// exist yet.
    pub fn load(path: &Path) -> Result<Self, VaultError> {
        if !path.exists() {
            return Ok(Self {
                path: path.to_path_buf(),
                bindings: Vec::new(),
            });
        }

        let text = std::fs::read_to_string(path).map_err(|e| {
            VaultError::Storage(format!("Failed to read manifest {}: {}", path.display(), e))
        })?;
        let document: ManifestDocument = serde_json::from_str(&text)?;

        if document.manifest_version != MANIFEST_VERSION {
            return Err(VaultError::Storage(format!(
                "Unsupported manifest version {} in {}",
                document.manifest_version,
                path.display()
            )));
        }

        info!(
            "Loaded signature manifest with {} bindings from {}",
            document.bindings.len(),
            path.display()
        );
        Ok(Self {
            path: path.to_path_buf(),
            bindings: document.bindings,
        })
    }

    /// Append a binding and persist the whole manifest.
    pub fn append(&mut self, binding: SignatureBinding) -> Result<(), VaultError> {
        self.bindings.push(binding);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VaultError::Storage(format!("Failed to create manifest directory: {}", e))
            })?;
        }

        let document = ManifestDocument {
            manifest_version: MANIFEST_VERSION,
            bindings: self.bindings.clone(),
        };
        let text = serde_json::to_string_pretty(&document)?;
        std::fs::write(&self.path, text).map_err(|e| {
            VaultError::Storage(format!(
                "Failed to write manifest {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(())
    }

    pub fn find(
        &self,
        record_id: &str,
        signer_id: &str,
        meaning: SignatureMeaning,
    ) -> Option<&SignatureBinding> {
        self.bindings.iter().find(|b| {
            b.record_id == record_id && b.signer_id == signer_id && b.signature_meaning == meaning
        })
    }

    pub fn bindings(&self) -> &[SignatureBinding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
