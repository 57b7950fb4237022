//! Audit records and the per-flow audit trail.

use chrono::NaiveDateTime;

/// Placeholder for fields that are not known.
pub const UNKNOWN: &str = "UNKNOWN";

/// Status of an audited step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    Success,
    Error,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "SUCCESS",
            AuditStatus::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the audit table.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub flow_name: String,
    pub step: String,
    pub status: AuditStatus,
    pub message: String,
    /// Time the outcome became known.
    pub timestamp: NaiveDateTime,
    pub execution_context_id: String,
}

impl AuditRecord {
    fn new(
        flow_name: &str,
        step: &str,
        status: AuditStatus,
        message: String,
        execution_context_id: &str,
    ) -> Self {
        Self {
            flow_name: flow_name.to_string(),
            step: step.to_string(),
            status,
            message,
            timestamp: chrono::Local::now().naive_local(),
            execution_context_id: execution_context_id.to_string(),
        }
    }

    /// Successful step.
    pub fn success(
        flow_name: &str,
        step: &str,
        message: impl Into<String>,
        execution_context_id: &str,
    ) -> Self {
        Self::new(flow_name, step, AuditStatus::Success, message.into(), execution_context_id)
    }

    /// Failed step. Only the first line of `message` is kept.
    pub fn error(flow_name: &str, step: &str, message: &str, execution_context_id: &str) -> Self {
        Self::new(
            flow_name,
            step,
            AuditStatus::Error,
            first_line(message).to_string(),
            execution_context_id,
        )
    }

    /// Flow-level failure, recorded once when a flow aborts.
    pub fn flow_failure(flow_name: &str, failure: &str, execution_context_id: &str) -> Self {
        Self::error(
            flow_name,
            UNKNOWN,
            &format!("Error processing the property file: {}", first_line(failure)),
            execution_context_id,
        )
    }

    pub fn is_error(&self) -> bool {
        self.status == AuditStatus::Error
    }
}

/// First line of a possibly multi-line failure text.
pub fn first_line(text: &str) -> &str {
    let line = text.split('\n').next().unwrap_or_default();
    line.strip_suffix('\r').unwrap_or(line)
}

/// Flow name for a property file: everything before the first `.`.
pub fn flow_name_from_file(property_file: &str) -> &str {
    property_file.split('.').next().unwrap_or(property_file)
}

/// Ordered, append-only sequence of audit records for one flow run.
#[derive(Debug, Default)]
pub struct AuditTrail {
    records: Vec<AuditRecord>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: AuditRecord) {
        tracing::debug!(
            step = %record.step,
            status = %record.status,
            message = %record.message,
            "Audit record appended"
        );
        self.records.push(record);
    }

    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.records.iter().any(AuditRecord::is_error)
    }

    pub fn into_records(self) -> Vec<AuditRecord> {
        self.records
    }
}
