//! DuckDB-backed engine session.

use async_trait::async_trait;
use duckdb::{params, Connection};
use std::sync::{Arc, Mutex};

use super::{normalize_query, SqlEngine};
use crate::audit::AuditRecord;
use crate::error::DlprocError;

const AUDIT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Engine session on a local DuckDB database.
///
/// Views are created as `TEMP` views, so they live exactly as long as the
/// session's connection.
pub struct DuckDbEngine {
    conn: Arc<Mutex<Option<Connection>>>,
    context_id: String,
    app_name: String,
}

impl DuckDbEngine {
    /// Open a session on `db_path`, or on an in-memory database when `None`.
    pub fn open(db_path: Option<&str>, app_name: impl Into<String>) -> Result<Self, DlprocError> {
        let conn = match db_path {
            Some(path) => Connection::open(path).map_err(|e| {
                DlprocError::Connection(format!("Failed to open DuckDB database {}: {}", path, e))
            })?,
            None => Connection::open_in_memory().map_err(|e| {
                DlprocError::Connection(format!("Failed to create in-memory DuckDB: {}", e))
            })?,
        };

        let engine = Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            context_id: format!("local-{}", uuid::Uuid::new_v4()),
            app_name: app_name.into(),
        };

        tracing::info!(
            app_name = %engine.app_name,
            context_id = %engine.context_id,
            db_path = ?db_path,
            "DuckDB session started"
        );

        Ok(engine)
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Run `f` on the session connection in a blocking task.
    async fn with_connection<T, F>(&self, f: F) -> Result<T, DlprocError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, DlprocError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|e| {
                DlprocError::Database(format!("Failed to acquire connection lock: {}", e))
            })?;
            let conn = guard.as_mut().ok_or(DlprocError::EngineClosed)?;
            f(conn)
        })
        .await
        .map_err(|e| DlprocError::Database(format!("Task join error: {}", e)))?
    }
}

fn ensure_audit_table(conn: &Connection, table: &str) -> Result<(), DlprocError> {
    if let Some((schema, _)) = table.rsplit_once('.') {
        conn.execute_batch(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))?;
    }
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            flowname VARCHAR,
            step VARCHAR,
            status VARCHAR,
            message VARCHAR,
            audit_timestamp TIMESTAMP,
            execution_context_id VARCHAR
        )",
        table
    ))?;
    Ok(())
}

#[async_trait]
impl SqlEngine for DuckDbEngine {
    fn context_id(&self) -> &str {
        &self.context_id
    }

    async fn create_view(&self, view_name: &str, query: &str) -> Result<(), DlprocError> {
        let sql = format!(
            "CREATE OR REPLACE TEMP VIEW {} AS {}",
            view_name,
            normalize_query(query)
        );

        tracing::debug!(view_name, query = %sql, "Creating view");

        self.with_connection(move |conn| {
            conn.execute_batch(&sql)
                .map_err(|e| DlprocError::StepExecution(e.to_string()))
        })
        .await
    }

    async fn execute(&self, query: &str) -> Result<(), DlprocError> {
        let sql = normalize_query(query).to_string();

        tracing::debug!(query = %sql, "Executing target query");

        self.with_connection(move |conn| {
            conn.execute_batch(&sql)
                .map_err(|e| DlprocError::StepExecution(e.to_string()))
        })
        .await
    }

    async fn append_audit_rows(
        &self,
        table: &str,
        records: &[AuditRecord],
    ) -> Result<(), DlprocError> {
        let table = table.to_string();
        let records = records.to_vec();

        self.with_connection(move |conn| {
            ensure_audit_table(conn, &table)?;

            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(&format!(
                    "INSERT INTO {} (flowname, step, status, message, audit_timestamp, execution_context_id)
                     VALUES (?, ?, ?, ?, CAST(? AS TIMESTAMP), ?)",
                    table
                ))?;

                for record in &records {
                    stmt.execute(params![
                        record.flow_name,
                        record.step,
                        record.status.as_str(),
                        record.message,
                        record.timestamp.format(AUDIT_TIMESTAMP_FORMAT).to_string(),
                        record.execution_context_id,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn stop(&self) -> Result<(), DlprocError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DlprocError::Database(format!("Failed to acquire connection lock: {}", e)))?
            .take()
            .ok_or(DlprocError::EngineClosed)?;

        conn.close()
            .map_err(|(_, e)| DlprocError::Database(format!("Failed to close DuckDB: {}", e)))?;

        tracing::info!(context_id = %self.context_id, "DuckDB session stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_rows(engine: &DuckDbEngine, sql: &'static str) -> i64 {
        let conn = engine.conn.lock().unwrap();
        conn.as_ref()
            .unwrap()
            .query_row(sql, [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_context_id_is_stable_and_unique() {
        let a = DuckDbEngine::open(None, "flow_a").unwrap();
        let b = DuckDbEngine::open(None, "flow_b").unwrap();
        assert!(a.context_id().starts_with("local-"));
        assert_eq!(a.context_id(), a.context_id());
        assert_ne!(a.context_id(), b.context_id());
        assert_eq!(a.app_name(), "flow_a");
    }

    #[tokio::test]
    async fn test_view_visible_to_later_queries() {
        let engine = DuckDbEngine::open(None, "test").unwrap();
        engine
            .create_view("nums", "SELECT * FROM range(5) t(n) ")
            .await
            .unwrap();
        engine
            .execute("CREATE TABLE evens AS SELECT n FROM nums WHERE n % 2 = 0;")
            .await
            .unwrap();

        assert_eq!(count_rows(&engine, "SELECT count(*) FROM evens"), 3);
    }

    #[tokio::test]
    async fn test_create_or_replace_view() {
        let engine = DuckDbEngine::open(None, "test").unwrap();
        engine.create_view("v", "SELECT 1 AS x").await.unwrap();
        engine
            .create_view("v", "SELECT * FROM range(3) t(x)")
            .await
            .unwrap();
        assert_eq!(count_rows(&engine, "SELECT count(*) FROM v"), 3);
    }

    #[tokio::test]
    async fn test_failed_query_is_step_execution_error() {
        let engine = DuckDbEngine::open(None, "test").unwrap();
        let err = engine.execute("SELEC broken").await.unwrap_err();
        assert!(matches!(err, DlprocError::StepExecution(_)));

        let err = engine
            .create_view("v", "SELECT * FROM missing_table")
            .await
            .unwrap_err();
        assert!(matches!(err, DlprocError::StepExecution(_)));
    }

    #[tokio::test]
    async fn test_append_audit_rows_appends() {
        let engine = DuckDbEngine::open(None, "test").unwrap();
        let ctx = engine.context_id().to_string();
        let batch = vec![
            AuditRecord::success("sales", "1", "Temporary table v created.", &ctx),
            AuditRecord::error("sales", "2", "boom\nstack", &ctx),
        ];

        engine
            .append_audit_rows("monitoring.audit", &batch)
            .await
            .unwrap();
        engine
            .append_audit_rows("monitoring.audit", &batch[..1])
            .await
            .unwrap();

        assert_eq!(count_rows(&engine, "SELECT count(*) FROM monitoring.audit"), 3);
        assert_eq!(
            count_rows(
                &engine,
                "SELECT count(*) FROM monitoring.audit WHERE status = 'ERROR' AND message = 'boom'"
            ),
            1
        );
    }

    #[tokio::test]
    async fn test_stop_closes_session() {
        let engine = DuckDbEngine::open(None, "test").unwrap();
        engine.stop().await.unwrap();

        assert!(matches!(
            engine.execute("SELECT 1").await.unwrap_err(),
            DlprocError::EngineClosed
        ));
        assert!(matches!(engine.stop().await.unwrap_err(), DlprocError::EngineClosed));
    }

    #[tokio::test]
    async fn test_file_database_persists_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warehouse.duckdb");
        let path_str = path.to_str().unwrap();

        let engine = DuckDbEngine::open(Some(path_str), "test").unwrap();
        engine
            .execute("CREATE TABLE t AS SELECT 42 AS answer")
            .await
            .unwrap();
        engine.stop().await.unwrap();

        let conn = Connection::open(path_str).unwrap();
        let answer: i32 = conn.query_row("SELECT answer FROM t", [], |row| row.get(0)).unwrap();
        assert_eq!(answer, 42);
    }
}
