use std::path::Path;

use record_vault::binding::SignatureBindingService;
use record_vault::crypto::{Signer, VaultKeyPair};
use record_vault::ledger::AuditLedger;
use record_vault::worm::WormStore;

pub const TEST_SYSTEM_ID: &str = "vault-test-01";
pub const TEST_SEGMENT_BYTES: u64 = 1024 * 1024;

/// Build a keypair under `root/keys`.
pub fn test_keypair(root: &Path) -> VaultKeyPair {
    VaultKeyPair::initialize(&root.join("keys"), TEST_SYSTEM_ID)
        .expect("Failed to initialize test keypair")
}

/// Build a ledger under `root/ledger` with its own signer.
pub async fn test_ledger(root: &Path, keypair: &VaultKeyPair) -> AuditLedger {
    AuditLedger::new(
        Signer::new(keypair.clone()),
        &root.join("ledger"),
        TEST_SEGMENT_BYTES,
    )
    .await
    .expect("Failed to open test ledger")
}

/// Build the full component stack under `root`: one keypair, one ledger,
/// and a store plus binding service each signing on its own chain.
pub async fn test_stack(root: &Path) -> (AuditLedger, WormStore, SignatureBindingService) {
    let keypair = test_keypair(root);
    let ledger = test_ledger(root, &keypair).await;

    let store = WormStore::initialize(
        &root.join("storage"),
        Signer::new(keypair.clone()),
        ledger.clone(),
    )
    .await
    .expect("Failed to initialize test WORM store");

    let service = SignatureBindingService::initialize(
        &root.join("storage/signature_manifest.json"),
        Signer::new(keypair),
        ledger.clone(),
    )
    .expect("Failed to initialize test binding service");

    (ledger, store, service)
}
