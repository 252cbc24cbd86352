use thiserror::Error;

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON serialization error: {}", err))
    }
}

impl From<sqlx::Error> for VaultError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(format!("Database error: {}", err))
    }
}

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Key initialization failed: {0}")]
    KeyInit(String),

    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    #[error("Signing failed: {0}")]
    SigningError(String),

    #[error("Audit ledger error: {0}")]
    LedgerError(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Integrity violation on record {record_id}: expected {expected_hash}, calculated {calculated_hash}")]
    IntegrityViolation {
        record_id: String,
        expected_hash: String,
        calculated_hash: String,
    },

    #[error("WORM violation: {0}")]
    WormViolation(String),

    #[error("Duplicate signature: record {record_id} already signed by {signer_id} as {meaning}")]
    DuplicateSignature {
        record_id: String,
        signer_id: String,
        meaning: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl VaultError {
    pub fn invalid_confidence(value: f64) -> Self {
        Self::InvalidArgument(format!(
            "Confidence {} out of range, must be within [0.0, 1.0]",
            value
        ))
    }

    pub fn invalid_status_transition(from: &str, to: &str) -> Self {
        Self::WormViolation(format!(
            "Status transition {} -> {} is not permitted, records leave 'active' exactly once",
            from, to
        ))
    }
}
