//! Signing key lifecycle.
//!
//! One secp256k1 keypair per system identity, persisted as two hex files in
//! the key directory. Generated on first start, loaded afterwards; never
//! rotated here. Every initialization path ends in a sign/verify self-test,
//! and any failure is fatal: the vault does not run with unusable keys.

use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::VaultError;

const SELF_TEST_MESSAGE: &[u8] = b"record-vault keypair self-test";

/// Asymmetric signing keypair bound to a system identity.
#[derive(Clone)]
pub struct VaultKeyPair {
    pub system_id: String,
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl VaultKeyPair {
    /// Load the keypair for `system_id` from `key_directory`, generating and
    /// persisting a new one if none exists.
    pub fn initialize(key_directory: &Path, system_id: &str) -> Result<Self, VaultError> {
        fs::create_dir_all(key_directory).map_err(|e| {
            VaultError::KeyInit(format!(
                "Failed to create key directory {}: {}",
                key_directory.display(),
                e
            ))
        })?;

        let secret_path = Self::secret_path(key_directory, system_id);
        let public_path = Self::public_path(key_directory, system_id);

        let secp = Secp256k1::new();
        let keypair = if secret_path.exists() {
            Self::load(&secp, &secret_path, &public_path, system_id)?
        } else {
            Self::generate(&secp, &secret_path, &public_path, system_id)?
        };

        keypair.self_test(&secp)?;
        Ok(keypair)
    }

    fn secret_path(key_directory: &Path, system_id: &str) -> PathBuf {
        key_directory.join(format!("{}.key", system_id))
    }

    fn public_path(key_directory: &Path, system_id: &str) -> PathBuf {
        key_directory.join(format!("{}.pub", system_id))
    }

    fn generate(
        secp: &Secp256k1<All>,
        secret_path: &Path,
        public_path: &Path,
        system_id: &str,
    ) -> Result<Self, VaultError> {
        info!("Generating new signing keypair for system {}", system_id);

        let mut rng = rand::rngs::OsRng;
        let secret_key = SecretKey::new(&mut rng);
        let public_key = PublicKey::from_secret_key(secp, &secret_key);

        fs::write(secret_path, hex::encode(secret_key.secret_bytes())).map_err(|e| {
            VaultError::KeyInit(format!("Failed to write private key file: {}", e))
        })?;
        restrict_permissions(secret_path)?;

        fs::write(public_path, hex::encode(public_key.serialize())).map_err(|e| {
            VaultError::KeyInit(format!("Failed to write public key file: {}", e))
        })?;

        info!("Keypair persisted for system {}", system_id);
        Ok(Self {
            system_id: system_id.to_string(),
            secret_key,
            public_key,
        })
    }

    fn load(
        secp: &Secp256k1<All>,
        secret_path: &Path,
        public_path: &Path,
        system_id: &str,
    ) -> Result<Self, VaultError> {
        let secret_hex = fs::read_to_string(secret_path).map_err(|e| {
            VaultError::KeyInit(format!("Failed to read private key file: {}", e))
        })?;
        let secret_bytes = hex::decode(secret_hex.trim())
            .map_err(|e| VaultError::KeyInit(format!("Invalid private key hex: {}", e)))?;
        let secret_key = SecretKey::from_slice(&secret_bytes)
            .map_err(|e| VaultError::KeyInit(format!("Invalid private key: {}", e)))?;

        let public_key = PublicKey::from_secret_key(secp, &secret_key);

        // The stored public half must match the key derived from the private
        // half, otherwise the key material has been corrupted or swapped.
        if public_path.exists() {
            let public_hex = fs::read_to_string(public_path).map_err(|e| {
                VaultError::KeyInit(format!("Failed to read public key file: {}", e))
            })?;
            let stored = hex::decode(public_hex.trim())
                .map_err(|e| VaultError::KeyInit(format!("Invalid public key hex: {}", e)))?;
            if stored != public_key.serialize() {
                return Err(VaultError::KeyInit(format!(
                    "Public key file for {} does not match private key",
                    system_id
                )));
            }
        }

        info!("Loaded existing keypair for system {}", system_id);
        Ok(Self {
            system_id: system_id.to_string(),
            secret_key,
            public_key,
        })
    }

    /// Sign and verify fixed test data with the loaded keys.
    fn self_test(&self, secp: &Secp256k1<All>) -> Result<(), VaultError> {
        let digest = Sha256::digest(SELF_TEST_MESSAGE);
        let message = Message::from_digest_slice(&digest)
            .map_err(|e| VaultError::KeyInit(format!("Self-test digest invalid: {}", e)))?;

        let signature = secp.sign_ecdsa(&message, &self.secret_key);
        secp.verify_ecdsa(&message, &signature, &self.public_key)
            .map_err(|e| {
                VaultError::KeyInit(format!(
                    "Keypair self-test failed for {}: {}",
                    self.system_id, e
                ))
            })?;

        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), VaultError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| {
        VaultError::KeyInit(format!(
            "Failed to restrict permissions on {}: {}",
            path.display(),
            e
        ))
    })
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), VaultError> {
    Ok(())
}
