use serde_json::json;
use tempfile::tempdir;

use record_vault::error::VaultError;
use record_vault::worm::{RecordFilter, RecordStatus, RecordType};

mod common;
use common::*;

#[tokio::test]
async fn test_store_and_retrieve_round_trip() {
    let dir = tempdir().unwrap();
    let (_ledger, store, _service) = test_stack(dir.path()).await;

    let content = json!({"doc": "v1"});
    let stored = store
        .store_record(
            RecordType::Document,
            content.clone(),
            json!({"title": "Intake SOP"}),
            "alice",
            None,
        )
        .await
        .unwrap();

    assert_eq!(stored.status, RecordStatus::Active);
    assert!(stored.content_hash.starts_with("sha256:"));
    assert!(!stored.integrity_signature.is_empty());

    let retrieved = store
        .retrieve_record(&stored.record_id, "bob", None)
        .await
        .unwrap()
        .expect("record should exist");

    assert_eq!(retrieved.content, content);
    assert_eq!(retrieved.content_hash, stored.content_hash);
    assert_eq!(retrieved.created_by, "alice");
    assert_eq!(retrieved.access_history.len(), 1);
    assert_eq!(retrieved.access_history[0].accessor_id, "bob");
    assert_eq!(retrieved.access_history[0].access_type, "retrieve");
    assert!(retrieved.access_history[0].integrity_verified);
}

#[tokio::test]
async fn test_retrieve_missing_record_is_none_not_error() {
    let dir = tempdir().unwrap();
    let (_ledger, store, _service) = test_stack(dir.path()).await;

    let result = store.retrieve_record("no-such-id", "bob", None).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_record_fields_are_immutable_at_storage_level() {
    let dir = tempdir().unwrap();
    let (_ledger, store, _service) = test_stack(dir.path()).await;

    let stored = store
        .store_record(RecordType::Document, json!({"a": 1}), json!({}), "alice", None)
        .await
        .unwrap();

    for sql in [
        "UPDATE worm_records SET content = '{}' WHERE record_id = ?",
        "UPDATE worm_records SET content_hash = 'sha256:0' WHERE record_id = ?",
        "UPDATE worm_records SET created_by = 'mallory' WHERE record_id = ?",
        "DELETE FROM worm_records WHERE record_id = ?",
    ] {
        let result = sqlx::query(sql)
            .bind(&stored.record_id)
            .execute(store.pool())
            .await;
        let err = result.expect_err("storage guard should reject the write");
        assert!(err.to_string().contains("WORM violation"), "got: {}", err);
    }
}

#[tokio::test]
async fn test_status_transitions_are_one_way() {
    let dir = tempdir().unwrap();
    let (_ledger, store, _service) = test_stack(dir.path()).await;

    let stored = store
        .store_record(RecordType::Report, json!({"r": 1}), json!({}), "alice", None)
        .await
        .unwrap();

    store
        .update_status(&stored.record_id, RecordStatus::Superseded, "alice")
        .await
        .unwrap();

    // A second transition is rejected in the application layer.
    let result = store
        .update_status(&stored.record_id, RecordStatus::Archived, "alice")
        .await;
    assert!(matches!(result, Err(VaultError::WormViolation(_))));

    // And going back to active is rejected by the trigger as well.
    let direct = sqlx::query("UPDATE worm_records SET status = 'active' WHERE record_id = ?")
        .bind(&stored.record_id)
        .execute(store.pool())
        .await;
    assert!(direct.is_err());

    let current = store
        .query(
            &RecordFilter {
                status: Some(RecordStatus::Superseded),
                ..Default::default()
            },
            10,
        )
        .await
        .unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].record_id, stored.record_id);
}

#[tokio::test]
async fn test_history_tables_are_append_only() {
    let dir = tempdir().unwrap();
    let (_ledger, store, _service) = test_stack(dir.path()).await;

    let stored = store
        .store_record(RecordType::Document, json!({"a": 1}), json!({}), "alice", None)
        .await
        .unwrap();
    store
        .retrieve_record(&stored.record_id, "bob", None)
        .await
        .unwrap();

    let update = sqlx::query("UPDATE record_access_log SET accessor_id = 'mallory'")
        .execute(store.pool())
        .await;
    assert!(update.is_err());

    let delete = sqlx::query("DELETE FROM record_access_log")
        .execute(store.pool())
        .await;
    assert!(delete.is_err());
}

#[tokio::test]
async fn test_tamper_detection_on_retrieve_and_scan() {
    let dir = tempdir().unwrap();
    let (_ledger, store, _service) = test_stack(dir.path()).await;

    let stored = store
        .store_record(RecordType::Document, json!({"doc": "v1"}), json!({}), "alice", None)
        .await
        .unwrap();
    let intact = store
        .store_record(RecordType::Document, json!({"doc": "v2"}), json!({}), "alice", None)
        .await
        .unwrap();

    // Simulate out-of-band tampering: an attacker with file access drops the
    // guard, edits the content, and restores the guard.
    sqlx::query("DROP TRIGGER worm_records_immutable")
        .execute(store.pool())
        .await
        .unwrap();
    sqlx::query("UPDATE worm_records SET content = ? WHERE record_id = ?")
        .bind(serde_json::to_string(&json!({"doc": "v1-tampered"})).unwrap())
        .bind(&stored.record_id)
        .execute(store.pool())
        .await
        .unwrap();

    let result = store.retrieve_record(&stored.record_id, "bob", None).await;
    match result {
        Err(VaultError::IntegrityViolation {
            record_id,
            expected_hash,
            calculated_hash,
        }) => {
            assert_eq!(record_id, stored.record_id);
            assert_eq!(expected_hash, stored.content_hash);
            assert_ne!(calculated_hash, expected_hash);
        }
        other => panic!("expected integrity violation, got {:?}", other.map(|_| ())),
    }

    // The failed check was appended to the record's chain of custody.
    let records = store.query(&RecordFilter::default(), 10).await.unwrap();
    let tampered = records
        .iter()
        .find(|r| r.record_id == stored.record_id)
        .unwrap();
    assert_eq!(tampered.tamper_checks.len(), 1);
    assert!(!tampered.tamper_checks[0].passed);
    assert_eq!(
        tampered.tamper_checks[0].violation_type.as_deref(),
        Some("content-hash-mismatch")
    );

    // The full scan reports exactly one finding and flags non-compliance.
    let report = store.verify_storage_integrity().await.unwrap();
    assert_eq!(report.total_records, 2);
    assert_eq!(report.failed_records, 1);
    assert_eq!(report.verified_records, 1);
    assert_eq!(report.tamper_evidence.len(), 1);
    assert_eq!(report.tamper_evidence[0].record_id, stored.record_id);
    assert_eq!(report.tamper_evidence[0].violation_type, "content-hash-mismatch");
    assert!(!report.regulatory_compliant);

    // The untouched record is unaffected.
    let clean = store
        .retrieve_record(&intact.record_id, "bob", None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(clean.content, json!({"doc": "v2"}));
}

#[tokio::test]
async fn test_clean_store_is_regulatory_compliant() {
    let dir = tempdir().unwrap();
    let (_ledger, store, _service) = test_stack(dir.path()).await;

    for i in 0..3 {
        store
            .store_record(RecordType::Dataset, json!({"n": i}), json!({}), "alice", None)
            .await
            .unwrap();
    }

    let report = store.verify_storage_integrity().await.unwrap();
    assert_eq!(report.total_records, 3);
    assert_eq!(report.verified_records, 3);
    assert_eq!(report.failed_records, 0);
    assert_eq!(report.records_with_signature, 3);
    assert!(report.tamper_evidence.is_empty());
    assert!(report.regulatory_compliant);
}

#[tokio::test]
async fn test_duplicate_record_id_is_storage_error() {
    let dir = tempdir().unwrap();
    let (_ledger, store, _service) = test_stack(dir.path()).await;

    store
        .store_record(
            RecordType::Document,
            json!({"a": 1}),
            json!({}),
            "alice",
            Some("fixed-id".to_string()),
        )
        .await
        .unwrap();

    let result = store
        .store_record(
            RecordType::Document,
            json!({"a": 2}),
            json!({}),
            "alice",
            Some("fixed-id".to_string()),
        )
        .await;
    assert!(matches!(result, Err(VaultError::Storage(_))));

    // The original record is untouched.
    let record = store
        .retrieve_record("fixed-id", "bob", None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.content, json!({"a": 1}));
}

#[tokio::test]
async fn test_query_filters_and_does_not_touch_access_history() {
    let dir = tempdir().unwrap();
    let (_ledger, store, _service) = test_stack(dir.path()).await;

    store
        .store_record(RecordType::Document, json!({"d": 1}), json!({}), "alice", None)
        .await
        .unwrap();
    store
        .store_record(RecordType::Document, json!({"d": 2}), json!({}), "bob", None)
        .await
        .unwrap();
    store
        .store_record(RecordType::Report, json!({"r": 1}), json!({}), "alice", None)
        .await
        .unwrap();

    let documents = store
        .query(
            &RecordFilter {
                record_type: Some(RecordType::Document),
                ..Default::default()
            },
            10,
        )
        .await
        .unwrap();
    assert_eq!(documents.len(), 2);

    let by_alice = store
        .query(
            &RecordFilter {
                created_by: Some("alice".to_string()),
                ..Default::default()
            },
            10,
        )
        .await
        .unwrap();
    assert_eq!(by_alice.len(), 2);

    // Bulk scans are not individual accesses.
    for record in &documents {
        assert!(record.access_history.is_empty());
    }

    let limited = store.query(&RecordFilter::default(), 2).await.unwrap();
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn test_export_writes_grouped_snapshots() {
    let dir = tempdir().unwrap();
    let (_ledger, store, _service) = test_stack(dir.path()).await;

    store
        .store_record(RecordType::Document, json!({"d": 1}), json!({}), "alice", None)
        .await
        .unwrap();
    store
        .store_record(RecordType::Report, json!({"r": 1}), json!({}), "alice", None)
        .await
        .unwrap();

    let export_dir = dir.path().join("export");
    let summary = store.export(&export_dir, "inspector-7", None).await.unwrap();

    assert_eq!(summary.total_records, 2);
    assert_eq!(summary.records_by_type.get("document"), Some(&1));
    assert_eq!(summary.records_by_type.get("report"), Some(&1));
    assert!(export_dir.join("document_records.json").exists());
    assert!(export_dir.join("report_records.json").exists());
    assert!(export_dir.join("export_manifest.json").exists());

    // Export is read-only: no access history was written.
    let records = store.query(&RecordFilter::default(), 10).await.unwrap();
    for record in &records {
        assert!(record.access_history.is_empty());
    }
}
