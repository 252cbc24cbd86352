use serde_json::json;
use tempfile::tempdir;

use record_vault::crypto::{SignedEntry, Signer};
use record_vault::ledger::{list_segments, load_segment, AuditLedger, EventType, Severity};

mod common;
use common::*;

#[tokio::test]
async fn test_chain_survives_segment_rotation() {
    let dir = tempdir().unwrap();
    let keypair = test_keypair(dir.path());
    let signer = Signer::new(keypair.clone());

    // Segments small enough to force several rotations.
    let ledger = AuditLedger::new(signer.clone(), &dir.path().join("ledger"), 512)
        .await
        .unwrap();

    for i in 0..20 {
        ledger
            .log_event(
                EventType::StateTransition,
                Severity::Info,
                json!({"n": i}),
                None,
            )
            .await
            .unwrap();
    }

    let segments = list_segments(ledger.directory()).unwrap();
    assert!(segments.len() > 1, "expected rotation to produce multiple segments");

    // The session chain is the concatenation of its segments in order.
    let mut entries: Vec<SignedEntry> = Vec::new();
    for segment in &segments {
        entries.extend(load_segment(segment).unwrap());
    }
    assert_eq!(entries.len(), 21); // 20 events + session start

    let report = signer.verify_chain(&entries);
    assert!(report.chain_valid);
    assert_eq!(report.verified_count, 21);

    for i in 1..entries.len() {
        assert_eq!(
            entries[i].previous_signature.as_deref(),
            Some(entries[i - 1].signature.as_str())
        );
    }
}

#[tokio::test]
async fn test_tampered_segment_line_is_detected() {
    let dir = tempdir().unwrap();
    let keypair = test_keypair(dir.path());
    let signer = Signer::new(keypair.clone());
    let ledger = AuditLedger::new(signer.clone(), &dir.path().join("ledger"), TEST_SEGMENT_BYTES)
        .await
        .unwrap();

    for i in 0..3 {
        ledger
            .log_event(
                EventType::WorkflowComplete,
                Severity::Info,
                json!({"step": i}),
                None,
            )
            .await
            .unwrap();
    }

    let segments = list_segments(ledger.directory()).unwrap();
    let path = &segments[0];

    // Rewrite the file with one payload edited in place.
    let mut entries = load_segment(path).unwrap();
    entries[2].payload["event_data"]["step"] = json!(99);
    let body: Vec<String> = entries
        .iter()
        .map(|e| serde_json::to_string(e).unwrap())
        .collect();
    std::fs::write(path, body.join("\n") + "\n").unwrap();

    let report = ledger.verify_segment_file(path).unwrap();
    assert!(!report.chain_valid);
    assert_eq!(report.invalid_entries.len(), 1);
    assert_eq!(report.invalid_entries[0].index, 2);
    // The other entries still verify; the scan does not stop at the first hit.
    assert_eq!(report.verified_count, 3);
}

#[tokio::test]
async fn test_deleted_session_head_is_detected() {
    let dir = tempdir().unwrap();
    let keypair = test_keypair(dir.path());
    let signer = Signer::new(keypair.clone());
    let ledger = AuditLedger::new(signer.clone(), &dir.path().join("ledger"), TEST_SEGMENT_BYTES)
        .await
        .unwrap();

    for i in 0..3 {
        ledger
            .log_event(
                EventType::StateTransition,
                Severity::Info,
                json!({"n": i}),
                None,
            )
            .await
            .unwrap();
    }

    let segments = list_segments(ledger.directory()).unwrap();
    let path = &segments[0];

    // Rewrite the segment with the session-start entry removed. Every
    // surviving entry still verifies, but the first one now dangles.
    let entries = load_segment(path).unwrap();
    let body: Vec<String> = entries[1..]
        .iter()
        .map(|e| serde_json::to_string(e).unwrap())
        .collect();
    std::fs::write(path, body.join("\n") + "\n").unwrap();

    let report = ledger.verify_segment_file(path).unwrap();
    assert!(!report.chain_valid);
    assert!(report.invalid_entries.is_empty());
    assert_eq!(report.chain_breaks.len(), 1);
    assert_eq!(report.chain_breaks[0].index, 0);
    assert!(report.chain_breaks[0].found_previous.is_some());
}

#[tokio::test]
async fn test_verification_has_no_side_effects() {
    let dir = tempdir().unwrap();
    let keypair = test_keypair(dir.path());
    let signer = Signer::new(keypair);

    let entry = signer.sign(json!({"k": "v"}), "compliance-validation").await.unwrap();

    let first = signer.verify(&entry);
    let second = signer.verify(&entry);
    assert!(first);
    assert_eq!(first, second);

    // Verifying does not advance the chain pointer.
    let next = signer.sign(json!({"k": "w"}), "compliance-validation").await.unwrap();
    assert_eq!(next.previous_signature.as_deref(), Some(entry.signature.as_str()));
}
