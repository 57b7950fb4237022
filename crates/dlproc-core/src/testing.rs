//! Recording fakes for engine and sink collaborators.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::audit::AuditRecord;
use crate::engine::SqlEngine;
use crate::error::DlprocError;
use crate::sink::{AuditSink, SinkKind};

/// Engine that records every call and fails queries containing a pattern.
pub struct RecordingEngine {
    context_id: String,
    failures: Vec<(String, String)>,
    calls: Mutex<Vec<String>>,
    appended: Mutex<Vec<AuditRecord>>,
    stops: AtomicUsize,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self {
            context_id: "app-20260101-0001".to_string(),
            failures: Vec::new(),
            calls: Mutex::new(Vec::new()),
            appended: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
        }
    }

    pub fn fail_on(mut self, pattern: &str, error: &str) -> Self {
        self.failures.push((pattern.to_string(), error.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn appended(&self) -> Vec<AuditRecord> {
        self.appended.lock().unwrap().clone()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    fn record(&self, call: String, query: &str) -> Result<(), DlprocError> {
        self.calls.lock().unwrap().push(call);
        match self.failures.iter().find(|(pattern, _)| query.contains(pattern.as_str())) {
            Some((_, error)) => Err(DlprocError::StepExecution(error.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SqlEngine for RecordingEngine {
    fn context_id(&self) -> &str {
        &self.context_id
    }

    async fn create_view(&self, view_name: &str, query: &str) -> Result<(), DlprocError> {
        self.record(format!("view {}: {}", view_name, query), query)
    }

    async fn execute(&self, query: &str) -> Result<(), DlprocError> {
        self.record(format!("exec: {}", query), query)
    }

    async fn append_audit_rows(
        &self,
        _table: &str,
        records: &[AuditRecord],
    ) -> Result<(), DlprocError> {
        self.appended.lock().unwrap().extend_from_slice(records);
        Ok(())
    }

    async fn stop(&self) -> Result<(), DlprocError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Sink that keeps every flushed batch.
pub struct RecordingSink {
    flush_error: Option<String>,
    batches: Mutex<Vec<Vec<AuditRecord>>>,
    closes: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            flush_error: None,
            batches: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            flush_error: Some(error.to_string()),
            ..Self::new()
        }
    }

    pub fn batches(&self) -> Vec<Vec<AuditRecord>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditSink for RecordingSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Postgres
    }

    async fn flush(&self, records: &[AuditRecord]) -> Result<(), DlprocError> {
        self.batches.lock().unwrap().push(records.to_vec());
        match &self.flush_error {
            Some(error) => Err(DlprocError::SinkFlush(error.clone())),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<(), DlprocError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
