use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub key_directory: String,
    pub system_id: String,
    pub ledger_directory: String,
    pub storage_directory: String,
    pub manifest_path: String,
    pub max_segment_bytes: u64,
}

impl VaultConfig {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let key_directory = env::var("VAULT_KEY_DIR")
            .unwrap_or_else(|_| "keys".to_string());

        let system_id = env::var("VAULT_SYSTEM_ID")
            .unwrap_or_else(|_| "record-vault-01".to_string());

        let ledger_directory = env::var("VAULT_LEDGER_DIR")
            .unwrap_or_else(|_| "audit".to_string());

        let storage_directory = env::var("VAULT_STORAGE_DIR")
            .unwrap_or_else(|_| "storage".to_string());

        let manifest_path = env::var("VAULT_MANIFEST_PATH")
            .unwrap_or_else(|_| "storage/signature_manifest.json".to_string());

        let max_segment_bytes = env::var("VAULT_MAX_SEGMENT_BYTES")
            .unwrap_or_else(|_| "10485760".to_string())
            .parse()?;

        Ok(VaultConfig {
            key_directory,
            system_id,
            ledger_directory,
            storage_directory,
            manifest_path,
            max_segment_bytes,
        })
    }
}
