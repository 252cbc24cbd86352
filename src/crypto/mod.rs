//! Cryptographic core: canonical serialization, key lifecycle, and
//! chain-linked signing.

pub mod canonical;
pub mod keys;
pub mod signer;

pub use keys::VaultKeyPair;
pub use signer::{ChainVerification, SignedEntry, Signer};
