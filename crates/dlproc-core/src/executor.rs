//! Step executor.
//!
//! Consumes step tokens in order, runs each against the engine session and
//! appends one audit record per executed step. The first failure aborts the
//! run; no later token is pulled from the tokenizer.

use crate::audit::{first_line, AuditRecord, AuditTrail};
use crate::engine::{normalize_query, SqlEngine};
use crate::error::DlprocError;
use crate::outcome::{FailureKind, FlowOutcome, StepOutcome};
use crate::step::{StepKind, StepToken};

/// Executor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    ViewExecuted,
    ViewFailed,
    MutationExecuted,
    MutationFailed,
    /// Terminal: a step or the tokenizer failed.
    Aborted,
}

/// First line of an engine failure as it should appear in audit messages.
fn failure_text(error: &DlprocError) -> String {
    let text = match error {
        DlprocError::StepExecution(message) => message.clone(),
        other => other.to_string(),
    };
    first_line(&text).to_string()
}

pub struct StepExecutor<'e> {
    engine: &'e dyn SqlEngine,
    flow_name: String,
    state: ExecutorState,
}

impl<'e> StepExecutor<'e> {
    pub fn new(engine: &'e dyn SqlEngine, flow_name: impl Into<String>) -> Self {
        Self {
            engine,
            flow_name: flow_name.into(),
            state: ExecutorState::Idle,
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    /// Execute one step and move to the matching executed/failed state.
    pub async fn execute_step(&mut self, token: &StepToken) -> StepOutcome {
        match token.kind {
            StepKind::CreateView => self.create_view(token).await,
            StepKind::TargetMutation => self.run_mutation(token).await,
        }
    }

    async fn create_view(&mut self, token: &StepToken) -> StepOutcome {
        let Some(view_name) = token.view_name.as_deref() else {
            self.state = ExecutorState::ViewFailed;
            return StepOutcome::Failure {
                kind: FailureKind::StepExecution,
                message: "Error creating temporary table: missing view name".to_string(),
                cause: "missing view name".to_string(),
            };
        };

        match self.engine.create_view(view_name, &token.query_text).await {
            Ok(()) => {
                self.state = ExecutorState::ViewExecuted;
                StepOutcome::Success {
                    message: format!("Temporary table {} created.", view_name),
                }
            }
            Err(e) => {
                self.state = ExecutorState::ViewFailed;
                let cause = failure_text(&e);
                StepOutcome::Failure {
                    kind: FailureKind::StepExecution,
                    message: format!("Error creating temporary table {}: {}", view_name, cause),
                    cause,
                }
            }
        }
    }

    async fn run_mutation(&mut self, token: &StepToken) -> StepOutcome {
        // A marker with no query lines never reaches the engine.
        if normalize_query(&token.query_text).is_empty() {
            self.state = ExecutorState::MutationFailed;
            return StepOutcome::Failure {
                kind: FailureKind::StepExecution,
                message: "Error executing target query: empty query".to_string(),
                cause: "empty query".to_string(),
            };
        }

        match self.engine.execute(&token.query_text).await {
            Ok(()) => {
                self.state = ExecutorState::MutationExecuted;
                StepOutcome::Success {
                    message: "Target query executed.".to_string(),
                }
            }
            Err(e) => {
                self.state = ExecutorState::MutationFailed;
                let cause = failure_text(&e);
                StepOutcome::Failure {
                    kind: FailureKind::StepExecution,
                    message: format!("Error executing target query: {}", cause),
                    cause,
                }
            }
        }
    }

    /// Run every token in order, recording outcomes into `trail`.
    pub async fn run<I>(&mut self, tokens: I, trail: &mut AuditTrail) -> FlowOutcome
    where
        I: IntoIterator<Item = Result<StepToken, DlprocError>>,
    {
        let context_id = self.engine.context_id().to_string();
        let mut steps = 0;

        for item in tokens {
            let token = match item {
                Ok(token) => token,
                Err(e) => {
                    tracing::error!(error = %e, flow = %self.flow_name, "Property file rejected");
                    self.state = ExecutorState::Aborted;
                    return FlowOutcome::aborted(None, &e);
                }
            };

            match self.execute_step(&token).await {
                StepOutcome::Success { message } => {
                    tracing::info!(
                        flow = %self.flow_name,
                        step = %token.step_id,
                        kind = %token.kind,
                        "Step succeeded"
                    );
                    trail.push(AuditRecord::success(
                        &self.flow_name,
                        &token.step_id,
                        message,
                        &context_id,
                    ));
                    self.state = ExecutorState::Idle;
                    steps += 1;
                }
                StepOutcome::Failure {
                    kind,
                    message,
                    cause,
                } => {
                    tracing::error!(
                        flow = %self.flow_name,
                        step = %token.step_id,
                        kind = %token.kind,
                        error = %message,
                        "Step failed, aborting flow"
                    );
                    trail.push(AuditRecord::error(
                        &self.flow_name,
                        &token.step_id,
                        &message,
                        &context_id,
                    ));
                    self.state = ExecutorState::Aborted;
                    return FlowOutcome::Aborted {
                        step: Some(token.step_id),
                        kind,
                        message: cause,
                    };
                }
            }
        }

        FlowOutcome::Completed { steps }
    }
}
