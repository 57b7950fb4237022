//! Step and flow outcome types.

use crate::error::DlprocError;

/// Why a step or flow failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A step query failed against the engine.
    StepExecution,
    /// The property file was cut short.
    TruncatedInput,
    /// The property file could not be read.
    PropertyFile,
}

impl FailureKind {
    /// Classify an error raised while a flow was running.
    pub fn of(error: &DlprocError) -> Self {
        match error {
            DlprocError::TruncatedInput { .. } => FailureKind::TruncatedInput,
            DlprocError::Io(_) => FailureKind::PropertyFile,
            _ => FailureKind::StepExecution,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::StepExecution => write!(f, "step_execution"),
            FailureKind::TruncatedInput => write!(f, "truncated_input"),
            FailureKind::PropertyFile => write!(f, "property_file"),
        }
    }
}

/// Result of executing a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Success { message: String },
    Failure {
        kind: FailureKind,
        /// Audit message for the step.
        message: String,
        /// First line of the underlying error.
        cause: String,
    },
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success { .. })
    }
}

/// Result of running all steps of a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    /// Every step succeeded.
    Completed { steps: usize },
    /// Processing stopped at the first failure. `message` carries the
    /// underlying error, not the step's audit message.
    Aborted {
        /// Failing step, `None` when the failure was not tied to a step.
        step: Option<String>,
        kind: FailureKind,
        message: String,
    },
}

impl FlowOutcome {
    pub fn aborted(step: Option<String>, error: &DlprocError) -> Self {
        FlowOutcome::Aborted {
            step,
            kind: FailureKind::of(error),
            message: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FlowOutcome::Completed { .. })
    }
}
