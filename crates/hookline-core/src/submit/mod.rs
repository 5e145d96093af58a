//! Change sets, validation results and the submission pipeline.

mod change_set;
mod pipeline;
mod result;
mod validation;

pub use change_set::{
    ActionInvocationEntry, ChangeSet, ChangeSetEntry, DataModificationEntry, EntityAction,
};
pub use pipeline::execute_submit;
pub use result::{SubmitPhase, SubmitResult};
pub use validation::{Severity, ValidationResult, ValidationResults};
