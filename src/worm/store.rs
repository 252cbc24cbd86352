//! Write-once record store backed by SQLite.
//!
//! Immutability is enforced at the storage level: triggers installed by the
//! schema migration reject updates to record fields, reversals of status
//! transitions, and all deletes, plus any rewrite of the append-only history
//! tables. `initialize` refuses to run if the triggers are missing. The
//! store itself never carries an update path for record content.

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::crypto::canonical::content_hash;
use crate::crypto::Signer;
use crate::error::VaultError;
use crate::ledger::{AuditLedger, EventType, Severity};
use crate::worm::record::{
    AccessEntry, ExportSummary, RecordFilter, RecordStatus, RecordType, StorageIntegrityReport,
    TamperCheck, TamperEvidence, WormRecord,
};

const WORM_SCHEMA: &str = include_str!("../../migrations/001_worm_schema.sql");

const RECORD_COLUMNS: &str = "record_id, record_type, content, metadata, created_by, created_at, \
     content_hash, integrity_signature, signature_id, status";

const GUARD_TRIGGERS: [&str; 7] = [
    "worm_records_immutable",
    "worm_records_status_one_way",
    "worm_records_no_delete",
    "record_access_log_no_update",
    "record_access_log_no_delete",
    "record_tamper_checks_no_update",
    "record_tamper_checks_no_delete",
];

/// WORM record store. Mutating operations are serialized behind a single
/// lock and a single pooled connection; reads share the same connection.
#[derive(Clone)]
pub struct WormStore {
    pool: SqlitePool,
    signer: Signer,
    ledger: AuditLedger,
    write_lock: Arc<Mutex<()>>,
}

impl WormStore {
    /// Open (or create) the store under `storage_directory` and verify that
    /// the immutability guards are installed. A store without enforced
    /// immutability is not acceptable, so a missing guard is fatal.
    pub async fn initialize(
        storage_directory: &Path,
        signer: Signer,
        ledger: AuditLedger,
    ) -> Result<Self, VaultError> {
        std::fs::create_dir_all(storage_directory).map_err(|e| {
            VaultError::Storage(format!(
                "Failed to create storage directory {}: {}",
                storage_directory.display(),
                e
            ))
        })?;

        let db_path = storage_directory.join("worm.db");
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                VaultError::Storage(format!("Failed to open WORM store {}: {}", db_path.display(), e))
            })?;

        sqlx::raw_sql(WORM_SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| VaultError::Storage(format!("Failed to install WORM schema: {}", e)))?;

        let placeholders = GUARD_TRIGGERS.map(|_| "?").join(", ");
        let guard_sql = format!(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger' AND name IN ({})",
            placeholders
        );
        let mut guard_query = sqlx::query_scalar::<_, i64>(&guard_sql);
        for name in GUARD_TRIGGERS {
            guard_query = guard_query.bind(name);
        }
        let installed = guard_query
            .fetch_one(&pool)
            .await
            .map_err(|e| VaultError::Storage(format!("Failed to verify WORM guards: {}", e)))?;

        if installed as usize != GUARD_TRIGGERS.len() {
            return Err(VaultError::Storage(format!(
                "WORM guards missing: {} of {} triggers installed",
                installed,
                GUARD_TRIGGERS.len()
            )));
        }

        info!("WORM store initialized at {}", db_path.display());
        Ok(Self {
            pool,
            signer,
            ledger,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Store new record content. The content hash and integrity signature are
    /// computed before the insert; an id collision surfaces as a storage
    /// error and is never retried with a new id.
    pub async fn store_record(
        &self,
        record_type: RecordType,
        content: Value,
        metadata: Value,
        created_by: &str,
        record_id: Option<String>,
    ) -> Result<WormRecord, VaultError> {
        let _guard = self.write_lock.lock().await;

        let record_id = record_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let created_at = Utc::now();
        let record_content_hash = content_hash(&content)?;

        let signing_payload = json!({
            "record_id": record_id,
            "record_type": record_type.as_str(),
            "content_hash": record_content_hash,
            "created_by": created_by,
            "created_at": created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
        });
        let signed = self
            .signer
            .sign(signing_payload, EventType::WormRecordStorage.as_str())
            .await?;

        sqlx::query(
            r#"
            INSERT INTO worm_records
            (record_id, record_type, content, metadata, created_by, created_at, content_hash, integrity_signature, signature_id, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record_id)
        .bind(record_type.as_str())
        .bind(serde_json::to_string(&content)?)
        .bind(serde_json::to_string(&metadata)?)
        .bind(created_by)
        .bind(created_at)
        .bind(&record_content_hash)
        .bind(&signed.signature)
        .bind(&signed.signature_id)
        .bind(RecordStatus::Active.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| VaultError::Storage(format!("Failed to store record {}: {}", record_id, e)))?;

        self.ledger
            .log_event(
                EventType::WormRecordStorage,
                Severity::Info,
                json!({
                    "record_id": record_id,
                    "record_type": record_type.as_str(),
                    "content_hash": record_content_hash,
                    "created_by": created_by,
                }),
                None,
            )
            .await?;

        info!(%record_id, record_type = record_type.as_str(), "Stored WORM record");
        Ok(WormRecord {
            record_id,
            record_type,
            content,
            metadata,
            created_by: created_by.to_string(),
            created_at,
            content_hash: record_content_hash,
            integrity_signature: signed.signature,
            signature_id: signed.signature_id,
            status: RecordStatus::Active,
            access_history: Vec::new(),
            tamper_checks: Vec::new(),
        })
    }

    /// Load a record, recomputing its content hash before returning it.
    ///
    /// On mismatch a failed tamper check is appended and an integrity
    /// violation is raised rather than returning possibly-tampered content.
    /// On success an access-history entry is appended first. An absent id is
    /// `Ok(None)`, not an error.
    pub async fn retrieve_record(
        &self,
        record_id: &str,
        accessor_id: &str,
        context: Option<Value>,
    ) -> Result<Option<WormRecord>, VaultError> {
        let _guard = self.write_lock.lock().await;

        let row = sqlx::query(&format!(
            "SELECT {} FROM worm_records WHERE record_id = ?",
            RECORD_COLUMNS
        ))
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut record = self.row_to_record(&row)?;
        let calculated = content_hash(&record.content)?;

        if calculated != record.content_hash {
            warn!(
                record_id,
                expected = %record.content_hash,
                calculated = %calculated,
                "Content hash mismatch on retrieval"
            );
            self.append_tamper_check(
                record_id,
                false,
                Some("content-hash-mismatch"),
                Some(&record.content_hash),
                Some(&calculated),
            )
            .await?;
            self.ledger
                .log_event(
                    EventType::ErrorDetected,
                    Severity::Critical,
                    json!({
                        "record_id": record_id,
                        "violation_type": "content-hash-mismatch",
                        "expected_hash": &record.content_hash,
                        "calculated_hash": &calculated,
                    }),
                    None,
                )
                .await?;
            return Err(VaultError::IntegrityViolation {
                record_id: record_id.to_string(),
                expected_hash: record.content_hash,
                calculated_hash: calculated,
            });
        }

        self.append_access_entry(record_id, accessor_id, "retrieve", true, context.as_ref())
            .await?;
        self.ledger
            .log_event(
                EventType::AccessControlCheck,
                Severity::Info,
                json!({
                    "record_id": record_id,
                    "accessor_id": accessor_id,
                    "access_type": "retrieve",
                    "integrity_verified": true,
                }),
                None,
            )
            .await?;

        record.access_history = self.fetch_access_history(record_id).await?;
        record.tamper_checks = self.fetch_tamper_checks(record_id).await?;
        Ok(Some(record))
    }

    /// Transition a record's status, one way, out of `active`. The trigger
    /// enforces the same rule at the storage level.
    pub async fn update_status(
        &self,
        record_id: &str,
        new_status: RecordStatus,
        actor: &str,
    ) -> Result<(), VaultError> {
        let _guard = self.write_lock.lock().await;

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM worm_records WHERE record_id = ?")
                .bind(record_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(current) = current else {
            return Err(VaultError::Storage(format!(
                "Record not found: {}",
                record_id
            )));
        };

        if current != RecordStatus::Active.as_str() || new_status == RecordStatus::Active {
            return Err(VaultError::invalid_status_transition(
                &current,
                new_status.as_str(),
            ));
        }

        sqlx::query("UPDATE worm_records SET status = ? WHERE record_id = ?")
            .bind(new_status.as_str())
            .bind(record_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                VaultError::WormViolation(format!(
                    "Status update rejected for {}: {}",
                    record_id, e
                ))
            })?;

        self.ledger
            .log_state_transition(record_id, &current, new_status.as_str(), actor)
            .await?;
        Ok(())
    }

    /// Read-only query ordered by creation time descending. Bulk scans do
    /// not write access history.
    pub async fn query(
        &self,
        filter: &RecordFilter,
        limit: u32,
    ) -> Result<Vec<WormRecord>, VaultError> {
        let mut builder = sqlx::QueryBuilder::new(format!(
            "SELECT {} FROM worm_records WHERE 1 = 1",
            RECORD_COLUMNS
        ));
        push_filter(&mut builder, filter);
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(limit as i64);

        let rows = builder.build().fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record = self.row_to_record(&row)?;
            record.access_history = self.fetch_access_history(&record.record_id).await?;
            record.tamper_checks = self.fetch_tamper_checks(&record.record_id).await?;
            records.push(record);
        }
        Ok(records)
    }

    /// Full-table scan recomputing every content hash. Violations become
    /// findings in the report, never errors, so the scan always completes.
    pub async fn verify_storage_integrity(&self) -> Result<StorageIntegrityReport, VaultError> {
        let rows = sqlx::query(&format!("SELECT {} FROM worm_records", RECORD_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        let mut verified = 0u64;
        let mut failed = 0u64;
        let mut with_signature = 0u64;
        let mut tamper_evidence = Vec::new();

        for row in &rows {
            let record_id: String = row.get("record_id");
            let stored_hash: String = row.get("content_hash");
            let signature: String = row.get("integrity_signature");
            if !signature.is_empty() {
                with_signature += 1;
            }

            let content_text: String = row.get("content");
            let calculated = match serde_json::from_str::<Value>(&content_text) {
                Ok(content) => content_hash(&content)?,
                Err(e) => {
                    warn!(%record_id, "Unparseable record content: {}", e);
                    failed += 1;
                    tamper_evidence.push(TamperEvidence {
                        record_id,
                        violation_type: "content-unparseable".to_string(),
                        expected_hash: stored_hash,
                        calculated_hash: String::new(),
                    });
                    continue;
                }
            };

            if calculated == stored_hash {
                verified += 1;
            } else {
                failed += 1;
                tamper_evidence.push(TamperEvidence {
                    record_id,
                    violation_type: "content-hash-mismatch".to_string(),
                    expected_hash: stored_hash,
                    calculated_hash: calculated,
                });
            }
        }

        let report = StorageIntegrityReport {
            total_records: rows.len() as u64,
            verified_records: verified,
            failed_records: failed,
            records_with_signature: with_signature,
            regulatory_compliant: failed == 0 && tamper_evidence.is_empty(),
            tamper_evidence,
        };

        self.ledger
            .log_event(
                EventType::ComplianceValidation,
                if report.regulatory_compliant {
                    Severity::Info
                } else {
                    Severity::Critical
                },
                json!({
                    "scan": "storage-integrity",
                    "total_records": report.total_records,
                    "failed_records": report.failed_records,
                    "regulatory_compliant": report.regulatory_compliant,
                }),
                None,
            )
            .await?;

        Ok(report)
    }

    /// Read-only snapshot export grouped by record type for external
    /// inspection. Does not write access history or touch store state.
    pub async fn export(
        &self,
        output_dir: &Path,
        inspector_id: &str,
        filter: Option<&RecordFilter>,
    ) -> Result<ExportSummary, VaultError> {
        std::fs::create_dir_all(output_dir).map_err(|e| {
            VaultError::Storage(format!(
                "Failed to create export directory {}: {}",
                output_dir.display(),
                e
            ))
        })?;

        let mut builder = sqlx::QueryBuilder::new(format!(
            "SELECT {} FROM worm_records WHERE 1 = 1",
            RECORD_COLUMNS
        ));
        if let Some(filter) = filter {
            push_filter(&mut builder, filter);
        }
        builder.push(" ORDER BY created_at DESC");

        let rows = builder.build().fetch_all(&self.pool).await?;

        let mut by_type: BTreeMap<String, Vec<WormRecord>> = BTreeMap::new();
        for row in rows {
            let mut record = self.row_to_record(&row)?;
            record.access_history = self.fetch_access_history(&record.record_id).await?;
            record.tamper_checks = self.fetch_tamper_checks(&record.record_id).await?;
            by_type
                .entry(record.record_type.as_str().to_string())
                .or_default()
                .push(record);
        }

        let exported_at = Utc::now();
        let mut files_written = Vec::new();
        let mut records_by_type = BTreeMap::new();
        let mut total = 0u64;

        for (type_name, records) in &by_type {
            let path = output_dir.join(format!("{}_records.json", type_name));
            let body = serde_json::to_string_pretty(records)?;
            std::fs::write(&path, body).map_err(|e| {
                VaultError::Storage(format!("Failed to write export {}: {}", path.display(), e))
            })?;
            files_written.push(path.to_string_lossy().to_string());
            records_by_type.insert(type_name.clone(), records.len() as u64);
            total += records.len() as u64;
        }

        let summary = ExportSummary {
            inspector_id: inspector_id.to_string(),
            exported_at,
            total_records: total,
            records_by_type,
            files_written,
        };

        let manifest_path = output_dir.join("export_manifest.json");
        std::fs::write(&manifest_path, serde_json::to_string_pretty(&summary)?).map_err(|e| {
            VaultError::Storage(format!(
                "Failed to write export manifest {}: {}",
                manifest_path.display(),
                e
            ))
        })?;

        self.ledger
            .log_event(
                EventType::ComplianceValidation,
                Severity::Info,
                json!({
                    "action": "inspection-export",
                    "inspector_id": inspector_id,
                    "total_records": total,
                    "output_dir": output_dir.to_string_lossy(),
                }),
                None,
            )
            .await?;

        info!(inspector_id, total, "Exported WORM records for inspection");
        Ok(summary)
    }

    /// The underlying pool, for integration tests that simulate out-of-band
    /// file tampering.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn append_access_entry(
        &self,
        record_id: &str,
        accessor_id: &str,
        access_type: &str,
        integrity_verified: bool,
        context: Option<&Value>,
    ) -> Result<(), VaultError> {
        let context_text = context.map(serde_json::to_string).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO record_access_log
            (record_id, accessor_id, access_type, accessed_at, integrity_verified, context)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record_id)
        .bind(accessor_id)
        .bind(access_type)
        .bind(Utc::now())
        .bind(integrity_verified)
        .bind(context_text)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_tamper_check(
        &self,
        record_id: &str,
        passed: bool,
        violation_type: Option<&str>,
        expected_hash: Option<&str>,
        calculated_hash: Option<&str>,
    ) -> Result<(), VaultError> {
        sqlx::query(
            r#"
            INSERT INTO record_tamper_checks
            (record_id, checked_at, passed, violation_type, expected_hash, calculated_hash)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record_id)
        .bind(Utc::now())
        .bind(passed)
        .bind(violation_type)
        .bind(expected_hash)
        .bind(calculated_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_access_history(&self, record_id: &str) -> Result<Vec<AccessEntry>, VaultError> {
        let rows = sqlx::query(
            r#"
            SELECT accessor_id, access_type, accessed_at, integrity_verified, context
            FROM record_access_log
            WHERE record_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(record_id)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let context: Option<String> = row.get("context");
            entries.push(AccessEntry {
                accessor_id: row.get("accessor_id"),
                access_type: row.get("access_type"),
                accessed_at: row.get("accessed_at"),
                integrity_verified: row.get("integrity_verified"),
                context: context.map(|c| serde_json::from_str(&c)).transpose()?,
            });
        }
        Ok(entries)
    }

    async fn fetch_tamper_checks(&self, record_id: &str) -> Result<Vec<TamperCheck>, VaultError> {
        let rows = sqlx::query(
            r#"
            SELECT checked_at, passed, violation_type, expected_hash, calculated_hash
            FROM record_tamper_checks
            WHERE record_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(record_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| TamperCheck {
                checked_at: row.get("checked_at"),
                passed: row.get("passed"),
                violation_type: row.get("violation_type"),
                expected_hash: row.get("expected_hash"),
                calculated_hash: row.get("calculated_hash"),
            })
            .collect())
    }

    fn row_to_record(&self, row: &SqliteRow) -> Result<WormRecord, VaultError> {
        let content_text: String = row.get("content");
        let metadata_text: String = row.get("metadata");

        Ok(WormRecord {
            record_id: row.get("record_id"),
            record_type: row
                .get::<String, _>("record_type")
                .parse()
                .map_err(|e| VaultError::Storage(format!("Invalid record type: {}", e)))?,
            content: serde_json::from_str(&content_text)?,
            metadata: serde_json::from_str(&metadata_text)?,
            created_by: row.get("created_by"),
            created_at: row.get("created_at"),
            content_hash: row.get("content_hash"),
            integrity_signature: row.get("integrity_signature"),
            signature_id: row.get("signature_id"),
            status: row
                .get::<String, _>("status")
                .parse()
                .map_err(|e| VaultError::Storage(format!("Invalid record status: {}", e)))?,
            access_history: Vec::new(),
            tamper_checks: Vec::new(),
        })
    }
}

fn push_filter(builder: &mut sqlx::QueryBuilder<'_, sqlx::Sqlite>, filter: &RecordFilter) {
    if let Some(record_type) = filter.record_type {
        builder.push(" AND record_type = ");
        builder.push_bind(record_type.as_str());
    }
    if let Some(created_by) = &filter.created_by {
        builder.push(" AND created_by = ");
        builder.push_bind(created_by.clone());
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ");
        builder.push_bind(status.as_str());
    }
    if let Some(after) = filter.created_after {
        builder.push(" AND created_at >= ");
        builder.push_bind(after);
    }
    if let Some(before) = filter.created_before {
        builder.push(" AND created_at <= ");
        builder.push_bind(before);
    }
}
