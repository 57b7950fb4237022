//! Error types for flow processing.

use thiserror::Error;

/// Errors that can occur while running a flow.
#[derive(Debug, Error)]
pub enum DlprocError {
    /// Wrong command line usage; carries the usage text.
    #[error("{0}")]
    Usage(String),

    /// The audit store or engine could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A step query failed against the engine.
    #[error("Step execution failed: {0}")]
    StepExecution(String),

    /// The property file ended where another line was required.
    #[error("Truncated property file: marker '{marker}' at line {line} has no following line")]
    TruncatedInput { marker: String, line: usize },

    /// Writing the audit batch failed.
    #[error("Audit flush failed: {0}")]
    SinkFlush(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// The engine session was already stopped.
    #[error("Engine session is closed")]
    EngineClosed,
}

impl From<std::io::Error> for DlprocError {
    fn from(e: std::io::Error) -> Self {
        DlprocError::Io(e.to_string())
    }
}

impl From<duckdb::Error> for DlprocError {
    fn from(e: duckdb::Error) -> Self {
        DlprocError::Database(e.to_string())
    }
}

impl From<tokio_postgres::Error> for DlprocError {
    fn from(e: tokio_postgres::Error) -> Self {
        DlprocError::Database(e.to_string())
    }
}

impl From<envy::Error> for DlprocError {
    fn from(e: envy::Error) -> Self {
        DlprocError::Config(e.to_string())
    }
}
