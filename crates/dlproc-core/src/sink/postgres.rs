//! PostgreSQL audit sink.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Transaction};

use super::{AuditSink, SinkKind};
use crate::audit::AuditRecord;
use crate::error::DlprocError;

/// Audit sink writing to a PostgreSQL table.
pub struct PostgresAuditSink {
    client: Mutex<Option<Client>>,
    connection_task: Mutex<Option<JoinHandle<()>>>,
    table: String,
}

impl PostgresAuditSink {
    /// Connect to the audit store.
    pub async fn connect(connection_string: &str, table: impl Into<String>) -> Result<Self, DlprocError> {
        let (client, connection) = tokio_postgres::connect(connection_string, NoTls)
            .await
            .map_err(|e| DlprocError::Connection(format!("Failed to connect to PostgreSQL: {}", e)))?;

        let connection_task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "PostgreSQL connection error");
            }
        });

        let table = table.into();
        tracing::info!(table = %table, "Connected to PostgreSQL audit store");

        Ok(Self {
            client: Mutex::new(Some(client)),
            connection_task: Mutex::new(Some(connection_task)),
            table,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

fn insert_statement(table: &str) -> String {
    format!(
        "INSERT INTO {} (flowname, step, status, message, audit_timestamp, execution_context_id) \
         VALUES ($1, $2, $3, $4, $5, $6)",
        table
    )
}

/// Abort the connection task instead of waiting for the server to hang up.
async fn stop_connection_task(task: JoinHandle<()>) {
    task.abort();
    match task.await {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => {}
        Err(e) => tracing::warn!(error = %e, "PostgreSQL connection task failed"),
    }
}

async fn insert_batch(
    tx: &Transaction<'_>,
    table: &str,
    records: &[AuditRecord],
) -> Result<(), tokio_postgres::Error> {
    let stmt = tx.prepare(&insert_statement(table)).await?;

    for record in records {
        let status = record.status.as_str();
        let params: [&(dyn ToSql + Sync); 6] = [
            &record.flow_name,
            &record.step,
            &status,
            &record.message,
            &record.timestamp,
            &record.execution_context_id,
        ];
        tx.execute(&stmt, &params).await?;
    }

    Ok(())
}

#[async_trait]
impl AuditSink for PostgresAuditSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Postgres
    }

    async fn flush(&self, records: &[AuditRecord]) -> Result<(), DlprocError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut guard = self.client.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| DlprocError::SinkFlush("PostgreSQL connection is closed".to_string()))?;

        let tx = client
            .transaction()
            .await
            .map_err(|e| DlprocError::SinkFlush(e.to_string()))?;

        match insert_batch(&tx, &self.table, records).await {
            Ok(()) => {
                tx.commit()
                    .await
                    .map_err(|e| DlprocError::SinkFlush(e.to_string()))?;
                tracing::info!(rows = records.len(), table = %self.table, "Audit records written");
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "Audit rollback failed");
                }
                Err(DlprocError::SinkFlush(e.to_string()))
            }
        }
    }

    async fn close(&self) -> Result<(), DlprocError> {
        self.client.lock().await.take();

        if let Some(task) = self.connection_task.lock().await.take() {
            stop_connection_task(task).await;
        }

        tracing::debug!("PostgreSQL audit connection closed");
        Ok(())
    }
}
