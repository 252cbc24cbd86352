use serde_json::json;
use tempfile::tempdir;

use record_vault::error::VaultError;
use record_vault::ledger::{list_segments, load_segment, EventType, Severity};
use record_vault::worm::{RecordStatus, RecordType};

mod common;
use common::*;

#[tokio::test]
async fn test_state_changes_are_mirrored_into_the_ledger() {
    let dir = tempdir().unwrap();
    let (ledger, store, service) = test_stack(dir.path()).await;

    let content = json!({"title": "Intake SOP", "revision": 4});
    let record = store
        .store_record(RecordType::Document, content.clone(), json!({}), "alice", None)
        .await
        .unwrap();
    store
        .retrieve_record(&record.record_id, "bob", None)
        .await
        .unwrap();
    store
        .update_status(&record.record_id, RecordStatus::Sealed, "alice")
        .await
        .unwrap();
    service
        .bind(
            &record.record_id,
            &content,
            "Alice A.",
            "alice",
            record_vault::binding::SignatureMeaning::Approved,
            None,
        )
        .await
        .unwrap();

    let report = ledger.coverage_report().await;
    assert_eq!(report.events_by_type.get("worm-record-storage"), Some(&1));
    assert_eq!(report.events_by_type.get("access-control-check"), Some(&1));
    assert_eq!(report.events_by_type.get("state-transition"), Some(&1));
    assert_eq!(
        report.events_by_type.get("electronic-signature-binding"),
        Some(&1)
    );

    // Every mirrored event landed in the segment chain, in order, signed.
    let segments = list_segments(ledger.directory()).unwrap();
    assert_eq!(segments.len(), 1);
    let verification = ledger.verify_segment_file(&segments[0]).unwrap();
    assert!(verification.chain_valid);
    assert_eq!(verification.verified_count, 5); // session start + 4 mirrored
}

#[tokio::test]
async fn test_decision_logging_round_trip() {
    let dir = tempdir().unwrap();
    let keypair = test_keypair(dir.path());
    let ledger = test_ledger(dir.path(), &keypair).await;

    let event_id = ledger
        .log_decision(
            "classifier",
            "accept-record",
            0.87,
            &["reject-record".to_string(), "escalate".to_string()],
            "content hash matched the submission manifest",
            json!({"record_id": "r1"}),
            42,
        )
        .await
        .unwrap();

    let segments = list_segments(ledger.directory()).unwrap();
    let entries = load_segment(&segments[0]).unwrap();
    let entry = entries
        .iter()
        .find(|e| e.payload["event_id"] == json!(event_id))
        .expect("decision event should be persisted");

    assert_eq!(entry.entry_type, "agent-decision");
    let data = &entry.payload["event_data"];
    assert_eq!(data["agent_type"], json!("classifier"));
    assert_eq!(data["confidence"], json!(0.87));
    assert_eq!(data["alternatives_considered"].as_array().unwrap().len(), 2);

    let report = ledger.coverage_report().await;
    assert_eq!(report.agents_covered, vec!["classifier".to_string()]);
}

#[tokio::test]
async fn test_invalid_confidence_is_not_logged() {
    let dir = tempdir().unwrap();
    let keypair = test_keypair(dir.path());
    let ledger = test_ledger(dir.path(), &keypair).await;

    let result = ledger
        .log_decision("classifier", "accept", f64::NAN, &[], "", json!({}), 1)
        .await;
    assert!(matches!(result, Err(VaultError::InvalidArgument(_))));

    // Nothing was appended beyond the session-start event.
    let segments = list_segments(ledger.directory()).unwrap();
    assert_eq!(load_segment(&segments[0]).unwrap().len(), 1);
}

#[tokio::test]
async fn test_coverage_percentage_grows_with_distinct_types() {
    let dir = tempdir().unwrap();
    let keypair = test_keypair(dir.path());
    let ledger = test_ledger(dir.path(), &keypair).await;

    let initial = ledger.coverage_report().await.overall_coverage_percentage;

    ledger
        .log_event(EventType::ErrorDetected, Severity::Error, json!({}), None)
        .await
        .unwrap();
    ledger
        .log_event(EventType::RecoveryAttempted, Severity::Warning, json!({}), None)
        .await
        .unwrap();
    ledger
        .log_event(EventType::RecoverySucceeded, Severity::Info, json!({}), None)
        .await
        .unwrap();

    let report = ledger.coverage_report().await;
    assert!(report.overall_coverage_percentage > initial);
    assert_eq!(report.signatures_issued, 4);

    // Repeating a type does not change coverage, only counts.
    ledger
        .log_event(EventType::ErrorDetected, Severity::Error, json!({}), None)
        .await
        .unwrap();
    let after = ledger.coverage_report().await;
    assert_eq!(
        after.overall_coverage_percentage,
        report.overall_coverage_percentage
    );
    assert_eq!(after.events_by_type.get("error-detected"), Some(&2));
}

#[tokio::test]
async fn test_workflow_context_is_persisted() {
    let dir = tempdir().unwrap();
    let keypair = test_keypair(dir.path());
    let ledger = test_ledger(dir.path(), &keypair).await;

    ledger
        .log_event(
            EventType::ConsultationRequired,
            Severity::Warning,
            json!({"reason": "ambiguous-classification"}),
            Some(json!({"workflow": "intake", "step": 3})),
        )
        .await
        .unwrap();

    let segments = list_segments(ledger.directory()).unwrap();
    let entries = load_segment(&segments[0]).unwrap();
    let last = entries.last().unwrap();
    assert_eq!(last.payload["workflow_context"]["workflow"], json!("intake"));
    assert_eq!(last.payload["session_id"], json!(ledger.session_id()));
}
