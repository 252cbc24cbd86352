//! Tamper-evident audit ledger.
//!
//! Every state-changing action in the system is classified, signed into the
//! hash chain, and appended to a durable JSONL segment. A broken audit trail
//! is a regulatory failure, so signing or write errors propagate hard; they
//! are never swallowed.

pub mod event;
pub mod segment;

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::crypto::canonical::content_hash;
use crate::crypto::{ChainVerification, Signer};
use crate::error::VaultError;

pub use event::{AuditEvent, EventType, Severity};
pub use segment::{list_segments, load_segment};

use segment::SegmentWriter;

/// Read-only aggregate over the current session's in-memory counters.
#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub events_by_type: BTreeMap<String, u64>,
    pub agents_covered: Vec<String>,
    pub signatures_issued: u64,
    pub overall_coverage_percentage: f64,
}

#[derive(Default)]
struct CoverageCounters {
    events_by_type: BTreeMap<String, u64>,
    agents: BTreeSet<String>,
    signatures_issued: u64,
}

struct LedgerInner {
    writer: SegmentWriter,
    counters: CoverageCounters,
}

/// Append-only, hash-chained audit ledger for one session.
///
/// A single lock serializes the sign-and-append critical section, so the
/// caller's submission order is the chain order and the file order.
#[derive(Clone)]
pub struct AuditLedger {
    signer: Signer,
    session_id: String,
    directory: PathBuf,
    inner: Arc<Mutex<LedgerInner>>,
}

impl AuditLedger {
    /// Open a new ledger session in `directory`, writing a workflow-start
    /// event as the first entry of the session.
    pub async fn new(
        signer: Signer,
        directory: &Path,
        max_segment_bytes: u64,
    ) -> Result<Self, VaultError> {
        let session_id = Uuid::new_v4().simple().to_string();
        let writer = SegmentWriter::open(directory, &session_id, max_segment_bytes)?;

        let ledger = Self {
            signer,
            session_id,
            directory: directory.to_path_buf(),
            inner: Arc::new(Mutex::new(LedgerInner {
                writer,
                counters: CoverageCounters::default(),
            })),
        };

        ledger
            .log_event(
                EventType::WorkflowStart,
                Severity::Info,
                json!({"action": "ledger-session-start"}),
                None,
            )
            .await?;

        Ok(ledger)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Record one classified event. Returns the event id.
    ///
    /// Signing failure or a failed durable write is a hard error: the ledger
    /// never continues past a gap in the trail.
    pub async fn log_event(
        &self,
        event_type: EventType,
        severity: Severity,
        event_data: Value,
        workflow_context: Option<Value>,
    ) -> Result<String, VaultError> {
        let mut inner = self.inner.lock().await;

        let event = AuditEvent {
            event_id: Uuid::new_v4().to_string(),
            event_type,
            severity,
            timestamp: chrono::Utc::now(),
            session_id: self.session_id.clone(),
            event_data,
            workflow_context,
        };
        let event_id = event.event_id.clone();

        let payload = serde_json::to_value(&event)?;
        let entry = self.signer.sign(payload, event_type.as_str()).await?;
        inner.writer.append(&entry)?;

        let counters = &mut inner.counters;
        *counters
            .events_by_type
            .entry(event_type.as_str().to_string())
            .or_insert(0) += 1;
        counters.signatures_issued += 1;

        debug!(event_type = event_type.as_str(), %event_id, "Recorded audit event");
        Ok(event_id)
    }

    /// Record a single decision point with its full rationale and the
    /// alternatives considered, so it can be reconstructed after the fact.
    ///
    /// Confidence outside [0, 1] is rejected outright, never clamped.
    #[allow(clippy::too_many_arguments)]
    pub async fn log_decision(
        &self,
        agent_type: &str,
        decision: &str,
        confidence: f64,
        alternatives: &[String],
        rationale: &str,
        input_context: Value,
        processing_time_ms: u64,
    ) -> Result<String, VaultError> {
        if !(0.0..=1.0).contains(&confidence) || confidence.is_nan() {
            return Err(VaultError::invalid_confidence(confidence));
        }

        let event_data = json!({
            "agent_type": agent_type,
            "decision": decision,
            "confidence": confidence,
            "alternatives_considered": alternatives,
            "rationale": rationale,
            "input_context": input_context,
            "processing_time_ms": processing_time_ms,
        });

        {
            let mut inner = self.inner.lock().await;
            inner.counters.agents.insert(agent_type.to_string());
        }

        self.log_event(EventType::AgentDecision, Severity::Info, event_data, None)
            .await
    }

    /// Record a data transformation with before/after content hashes, so the
    /// integrity of the transformation can be independently verified later.
    pub async fn log_transformation(
        &self,
        transformation_type: &str,
        before: &Value,
        after: &Value,
        rules_applied: &[String],
        workflow_step: &str,
    ) -> Result<String, VaultError> {
        let event_data = json!({
            "transformation_type": transformation_type,
            "before_hash": content_hash(before)?,
            "after_hash": content_hash(after)?,
            "rules_applied": rules_applied,
            "workflow_step": workflow_step,
        });

        self.log_event(EventType::DataTransformation, Severity::Info, event_data, None)
            .await
    }

    /// Record a one-way status change on some tracked subject.
    pub async fn log_state_transition(
        &self,
        subject_id: &str,
        from_state: &str,
        to_state: &str,
        actor: &str,
    ) -> Result<String, VaultError> {
        let event_data = json!({
            "subject_id": subject_id,
            "from_state": from_state,
            "to_state": to_state,
            "actor": actor,
        });

        self.log_event(EventType::StateTransition, Severity::Info, event_data, None)
            .await
    }

    /// Coverage aggregate for the current session, from in-memory counters.
    /// Does not re-read the segment files.
    pub async fn coverage_report(&self) -> CoverageReport {
        let inner = self.inner.lock().await;
        let counters = &inner.counters;

        let distinct_types = counters.events_by_type.len();
        let overall_coverage_percentage =
            distinct_types as f64 / EventType::ALL.len() as f64 * 100.0;

        CoverageReport {
            events_by_type: counters.events_by_type.clone(),
            agents_covered: counters.agents.iter().cloned().collect(),
            signatures_issued: counters.signatures_issued,
            overall_coverage_percentage,
        }
    }

    /// Load a segment file and verify every entry and the chain linkage,
    /// reporting all violations found.
    pub fn verify_segment_file(&self, path: &Path) -> Result<ChainVerification, VaultError> {
        let entries = load_segment(path)?;
        Ok(self.signer.verify_chain(&entries))
    }
}
