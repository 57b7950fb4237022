//! dlproc core library
//!
//! Runs the SQL steps of a property file against an engine session and
//! records a per-step audit trail.
//!
//! This crate provides:
//! - Property file tokenizer producing view and target-query steps
//! - Fail-fast step executor
//! - Engine sessions (DuckDB) and audit sinks (PostgreSQL, warehouse table)
//! - Flow driver tying them together with exactly-once audit flushing

pub mod audit;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod executor;
pub mod outcome;
pub mod sink;
pub mod step;
pub mod tokenizer;

#[cfg(test)]
pub(crate) mod testing;

pub use audit::{AuditRecord, AuditStatus, AuditTrail};
pub use config::{DatabaseConfig, DlprocConfig};
pub use driver::{FlowDriver, FlowReport, FlowSession};
pub use engine::{DuckDbEngine, SqlEngine};
pub use error::DlprocError;
pub use executor::{ExecutorState, StepExecutor};
pub use outcome::{FailureKind, FlowOutcome, StepOutcome};
pub use sink::{AuditSink, PostgresAuditSink, SinkKind, WarehouseAuditSink};
pub use step::{StepKind, StepToken};
pub use tokenizer::{LineCursor, StepTokenizer};
