//! Warehouse table audit sink.

use async_trait::async_trait;
use std::sync::Arc;

use super::{AuditSink, SinkKind};
use crate::audit::AuditRecord;
use crate::engine::SqlEngine;
use crate::error::DlprocError;

/// Appends audit rows to a table through the flow's engine session.
///
/// The session itself is owned and stopped by the flow driver.
pub struct WarehouseAuditSink {
    engine: Arc<dyn SqlEngine>,
    table: String,
}

impl WarehouseAuditSink {
    pub fn new(engine: Arc<dyn SqlEngine>, table: impl Into<String>) -> Self {
        Self {
            engine,
            table: table.into(),
        }
    }
}

#[async_trait]
impl AuditSink for WarehouseAuditSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Warehouse
    }

    async fn flush(&self, records: &[AuditRecord]) -> Result<(), DlprocError> {
        if records.is_empty() {
            return Ok(());
        }

        self.engine
            .append_audit_rows(&self.table, records)
            .await
            .map_err(|e| DlprocError::SinkFlush(e.to_string()))?;

        tracing::info!(rows = records.len(), table = %self.table, "Audit records appended");
        Ok(())
    }

    async fn close(&self) -> Result<(), DlprocError> {
        Ok(())
    }
}
