//! Flow driver.
//!
//! Runs one property file end to end: opens the engine session and audit
//! sink, executes the steps, then flushes the audit batch exactly once and
//! releases both collaborators, whatever happened before.

use std::sync::Arc;

use crate::audit::{flow_name_from_file, AuditRecord, AuditTrail, UNKNOWN};
use crate::config::DlprocConfig;
use crate::engine::{DuckDbEngine, SqlEngine};
use crate::error::DlprocError;
use crate::executor::StepExecutor;
use crate::outcome::FlowOutcome;
use crate::sink::{AuditSink, PostgresAuditSink, SinkKind, WarehouseAuditSink};
use crate::tokenizer::StepTokenizer;

/// Process exit code for a successful flow.
pub const EXIT_OK: u8 = 0;
/// Process exit code for usage and connection errors.
pub const EXIT_USAGE: u8 = 1;
/// Process exit code when a step or the property file failed.
pub const EXIT_FLOW_FAILED: u8 = 2;
/// Process exit code when steps succeeded but the audit batch was lost.
pub const EXIT_AUDIT_FAILED: u8 = 3;

/// Collaborators a flow run owns and releases.
pub struct FlowSession {
    pub engine: Arc<dyn SqlEngine>,
    pub sink: Arc<dyn AuditSink>,
}

/// Summary of a finished flow run.
#[derive(Debug)]
pub struct FlowReport {
    pub flow_name: String,
    pub execution_context_id: String,
    pub records: Vec<AuditRecord>,
    pub outcome: FlowOutcome,
    /// Set when the audit batch could not be written.
    pub sink_error: Option<String>,
}

impl FlowReport {
    pub fn exit_code(&self) -> u8 {
        if !self.outcome.is_success() {
            EXIT_FLOW_FAILED
        } else if self.sink_error.is_some() {
            EXIT_AUDIT_FAILED
        } else {
            EXIT_OK
        }
    }
}

pub struct FlowDriver {
    config: DlprocConfig,
}

impl FlowDriver {
    pub fn new(config: DlprocConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DlprocConfig {
        &self.config
    }

    /// Open the engine session and the configured audit sink.
    ///
    /// Failing to reach the audit store is fatal; the engine session opened
    /// before it is stopped again.
    pub async fn connect(&self, property_file: &str) -> Result<FlowSession, DlprocError> {
        self.config.validate()?;

        let engine: Arc<dyn SqlEngine> = Arc::new(DuckDbEngine::open(
            self.config.engine_db.as_deref(),
            property_file,
        )?);

        let sink: Arc<dyn AuditSink> = match self.config.audit_sink {
            SinkKind::Postgres => {
                match PostgresAuditSink::connect(
                    &self.config.postgres_connection_string(),
                    self.config.audit_table.clone(),
                )
                .await
                {
                    Ok(sink) => Arc::new(sink),
                    Err(e) => {
                        if let Err(stop_err) = engine.stop().await {
                            tracing::warn!(error = %stop_err, "Failed to stop engine session");
                        }
                        return Err(e);
                    }
                }
            }
            SinkKind::Warehouse => Arc::new(WarehouseAuditSink::new(
                Arc::clone(&engine),
                self.config.audit_table.clone(),
            )),
        };

        Ok(FlowSession { engine, sink })
    }

    /// Run `property_file` and flush its audit batch.
    pub async fn run(&self, property_file: &str, session: FlowSession) -> FlowReport {
        let FlowSession { engine, sink } = session;
        let flow_name = flow_name_from_file(property_file).to_string();
        let context_id = engine.context_id().to_string();

        tracing::info!(
            flow = %flow_name,
            context_id = %context_id,
            sink = %sink.kind(),
            "Processing property file"
        );

        let mut trail = AuditTrail::new();
        let outcome = self
            .process(property_file, &flow_name, engine.as_ref(), &mut trail)
            .await;

        if let FlowOutcome::Aborted { message, .. } = &outcome {
            tracing::error!(flow = %flow_name, error = %message, "Error processing the property file");
            trail.push(self.abort_record(&flow_name, &context_id, message));
        }

        let records = trail.into_records();
        let sink_error = match sink.flush(&records).await {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(error = %e, rows = records.len(), "Error logging audit entries");
                Some(e.to_string())
            }
        };

        if let Err(e) = sink.close().await {
            tracing::warn!(error = %e, "Failed to close audit sink");
        }
        if let Err(e) = engine.stop().await {
            tracing::warn!(error = %e, "Failed to stop engine session");
        }

        FlowReport {
            flow_name,
            execution_context_id: context_id,
            records,
            outcome,
            sink_error,
        }
    }

    async fn process(
        &self,
        property_file: &str,
        flow_name: &str,
        engine: &dyn SqlEngine,
        trail: &mut AuditTrail,
    ) -> FlowOutcome {
        let path = self.config.property_root.join(property_file);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) => {
                let error = DlprocError::Io(format!("{}: {}", path.display(), e));
                return FlowOutcome::aborted(None, &error);
            }
        };

        let mut executor = StepExecutor::new(engine, flow_name);
        executor.run(StepTokenizer::new(&text), trail).await
    }

    fn abort_record(&self, flow_name: &str, context_id: &str, message: &str) -> AuditRecord {
        if self.config.legacy_abort_record {
            AuditRecord::flow_failure(UNKNOWN, message, UNKNOWN)
        } else {
            AuditRecord::flow_failure(flow_name, message, context_id)
        }
    }
}
