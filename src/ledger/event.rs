//! Audit event taxonomy.
//!
//! Event and severity types are closed enums so that adding a new
//! classification is a compile-time-checked change, not a stringly-typed
//! convention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Classification of every state-changing action recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    AgentDecision,
    DataTransformation,
    StateTransition,
    ErrorDetected,
    RecoveryAttempted,
    RecoverySucceeded,
    RecoveryFailed,
    ConsultationRequired,
    ConsultationBypassed,
    WorkflowStart,
    WorkflowComplete,
    ComplianceValidation,
    ElectronicSignatureBinding,
    AccessControlCheck,
    WormRecordStorage,
}

impl EventType {
    pub const ALL: [EventType; 15] = [
        EventType::AgentDecision,
        EventType::DataTransformation,
        EventType::StateTransition,
        EventType::ErrorDetected,
        EventType::RecoveryAttempted,
        EventType::RecoverySucceeded,
        EventType::RecoveryFailed,
        EventType::ConsultationRequired,
        EventType::ConsultationBypassed,
        EventType::WorkflowStart,
        EventType::WorkflowComplete,
        EventType::ComplianceValidation,
        EventType::ElectronicSignatureBinding,
        EventType::AccessControlCheck,
        EventType::WormRecordStorage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AgentDecision => "agent-decision",
            EventType::DataTransformation => "data-transformation",
            EventType::StateTransition => "state-transition",
            EventType::ErrorDetected => "error-detected",
            EventType::RecoveryAttempted => "recovery-attempted",
            EventType::RecoverySucceeded => "recovery-succeeded",
            EventType::RecoveryFailed => "recovery-failed",
            EventType::ConsultationRequired => "consultation-required",
            EventType::ConsultationBypassed => "consultation-bypassed",
            EventType::WorkflowStart => "workflow-start",
            EventType::WorkflowComplete => "workflow-complete",
            EventType::ComplianceValidation => "compliance-validation",
            EventType::ElectronicSignatureBinding => "electronic-signature-binding",
            EventType::AccessControlCheck => "access-control-check",
            EventType::WormRecordStorage => "worm-record-storage",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent-decision" => Ok(EventType::AgentDecision),
            "data-transformation" => Ok(EventType::DataTransformation),
            "state-transition" => Ok(EventType::StateTransition),
            "error-detected" => Ok(EventType::ErrorDetected),
            "recovery-attempted" => Ok(EventType::RecoveryAttempted),
            "recovery-succeeded" => Ok(EventType::RecoverySucceeded),
            "recovery-failed" => Ok(EventType::RecoveryFailed),
            "consultation-required" => Ok(EventType::ConsultationRequired),
            "consultation-bypassed" => Ok(EventType::ConsultationBypassed),
            "workflow-start" => Ok(EventType::WorkflowStart),
            "workflow-complete" => Ok(EventType::WorkflowComplete),
            "compliance-validation" => Ok(EventType::ComplianceValidation),
            "electronic-signature-binding" => Ok(EventType::ElectronicSignatureBinding),
            "access-control-check" => Ok(EventType::AccessControlCheck),
            "worm-record-storage" => Ok(EventType::WormRecordStorage),
            _ => Err(format!("Unknown event type: {}", s)),
        }
    }
}

/// Event severity, trace through critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "trace",
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trace" => Ok(Severity::Trace),
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// A classified audit event, wrapped in a `SignedEntry` before persistence.
/// Never mutated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub event_data: Value,
    pub workflow_context: Option<Value>,
}
