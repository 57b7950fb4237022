//! Step tokens produced from a property file.

/// What a step does with its query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Query materialized as a session-scoped view.
    CreateView,
    /// Query executed for its side effect on a target table.
    TargetMutation,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::CreateView => write!(f, "create_view"),
            StepKind::TargetMutation => write!(f, "target_mutation"),
        }
    }
}

/// One executable step, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepToken {
    pub kind: StepKind,
    pub step_id: String,
    pub query_text: String,
    /// Set only for `CreateView` steps.
    pub view_name: Option<String>,
}

impl StepToken {
    pub fn create_view(
        step_id: impl Into<String>,
        query_text: impl Into<String>,
        view_name: impl Into<String>,
    ) -> Self {
        Self {
            kind: StepKind::CreateView,
            step_id: step_id.into(),
            query_text: query_text.into(),
            view_name: Some(view_name.into()),
        }
    }

    pub fn target_mutation(step_id: impl Into<String>, query_text: impl Into<String>) -> Self {
        Self {
            kind: StepKind::TargetMutation,
            step_id: step_id.into(),
            query_text: query_text.into(),
            view_name: None,
        }
    }
}
