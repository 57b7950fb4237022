//! SQL engine sessions.
//!
//! A flow talks to exactly one engine session. The session runs step
//! queries, keeps views created by earlier steps visible to later ones, and
//! identifies itself with a context id attached to every audit row.

mod duckdb;

pub use self::duckdb::DuckDbEngine;

use async_trait::async_trait;

use crate::audit::AuditRecord;
use crate::error::DlprocError;

/// Engine session used by a flow run.
#[async_trait]
pub trait SqlEngine: Send + Sync {
    /// Stable identifier of this session, fixed for the whole run.
    fn context_id(&self) -> &str;

    /// Materialize `query` as a session-scoped view named `view_name`.
    async fn create_view(&self, view_name: &str, query: &str) -> Result<(), DlprocError>;

    /// Execute `query` for its side effect.
    async fn execute(&self, query: &str) -> Result<(), DlprocError>;

    /// Append audit rows to `table` without touching existing rows.
    async fn append_audit_rows(
        &self,
        table: &str,
        records: &[AuditRecord],
    ) -> Result<(), DlprocError>;

    /// Shut the session down.
    async fn stop(&self) -> Result<(), DlprocError>;
}

/// Strip whitespace and trailing statement terminators from step SQL.
pub(crate) fn normalize_query(query: &str) -> &str {
    query.trim().trim_end_matches(';').trim_end()
}
