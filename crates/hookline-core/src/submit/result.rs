//! Outcome of a submission.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::change_set::ChangeSet;
use super::validation::ValidationResults;

/// Phases of the submission pipeline, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitPhase {
    Validating,
    PreCommit,
    Executing,
    PostCommit,
    Done,
    Failed,
}

impl fmt::Display for SubmitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubmitPhase::Validating => "validating",
            SubmitPhase::PreCommit => "pre_commit",
            SubmitPhase::Executing => "executing",
            SubmitPhase::PostCommit => "post_commit",
            SubmitPhase::Done => "done",
            SubmitPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitResult {
    /// Change set as persisted by the executor; `None` when the submission
    /// stopped at validation.
    pub completed_change_set: Option<Arc<ChangeSet>>,
    pub validation_results: ValidationResults,
    pub phase: SubmitPhase,
}

impl SubmitResult {
    /// Successful execution of `change_set`.
    pub fn completed(change_set: Arc<ChangeSet>) -> Self {
        Self {
            completed_change_set: Some(change_set),
            validation_results: ValidationResults::new(),
            phase: SubmitPhase::Done,
        }
    }

    /// Submission stopped because validation reported errors.
    pub fn rejected(validation_results: ValidationResults) -> Self {
        Self {
            completed_change_set: None,
            validation_results,
            phase: SubmitPhase::Failed,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.phase == SubmitPhase::Done && self.completed_change_set.is_some()
    }
}
