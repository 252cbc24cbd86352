//! record-vault: tamper-evident audit ledger, WORM record storage, and
//! electronic signature binding for regulated record-keeping.
//!
//! The components form a leaf-to-root hierarchy: a chain-linked
//! [`crypto::Signer`] at the bottom, the [`ledger::AuditLedger`] and
//! [`worm::WormStore`] built on it, and the
//! [`binding::SignatureBindingService`] binding signer identity and intent
//! to stored records. Construct them explicitly at process start and pass
//! them where needed; there are no hidden globals.

pub mod binding;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod worm;

pub use config::VaultConfig;
pub use error::VaultError;
