//! Audit sinks.
//!
//! The audit batch of a flow run is handed to exactly one sink, once, when
//! the run ends. Two variants exist: a relational store reached over
//! PostgreSQL and a warehouse table written through the engine session.

mod postgres;
mod warehouse;

pub use self::postgres::PostgresAuditSink;
pub use self::warehouse::WarehouseAuditSink;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;

use crate::audit::AuditRecord;
use crate::error::DlprocError;

/// Which audit sink a flow writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkKind {
    /// Relational store (PostgreSQL).
    #[default]
    Postgres,
    /// Warehouse table on the engine session.
    Warehouse,
}

impl FromStr for SinkKind {
    type Err = DlprocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "relational" => Ok(SinkKind::Postgres),
            "warehouse" | "hive" => Ok(SinkKind::Warehouse),
            other => Err(DlprocError::Config(format!("Unknown audit sink: {}", other))),
        }
    }
}

impl<'de> Deserialize<'de> for SinkKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("unknown audit sink '{}'", value)))
    }
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkKind::Postgres => write!(f, "postgres"),
            SinkKind::Warehouse => write!(f, "warehouse"),
        }
    }
}

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    fn kind(&self) -> SinkKind;

    /// Write the complete batch of a flow run.
    async fn flush(&self, records: &[AuditRecord]) -> Result<(), DlprocError>;

    /// Release the sink's resources.
    async fn close(&self) -> Result<(), DlprocError>;
}
