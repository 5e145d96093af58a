//! Submission pipeline: validate, pre-commit, execute, post-commit.

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::change_set::ChangeSet;
use super::result::{SubmitPhase, SubmitResult};
use super::validation::ValidationResults;
use crate::context::ApiContext;
use crate::error::{ApiError, ApiResult};
use crate::hooks::{
    ChangeSetEntryValidator, ChangeSetPostCommitHook, ChangeSetPreCommitHook, SubmitExecutor,
};
use crate::metrics::METRICS;
use crate::obs::{
    emit_post_commit_failed, emit_submit_completed, emit_submit_failed, emit_validation_failed,
};
use crate::step::run_step;

/// Run `change_set` through the submission pipeline on `context`.
///
/// The context reports [`is_submitting`](ApiContext::is_submitting) for the
/// whole run, and the flag is cleared again on every exit path.
///
/// Once the executor has succeeded the change set is persisted, so post-commit
/// hook failures are logged and the completed result is still returned. A
/// cancellation at that point skips the remaining post-commit hooks.
#[instrument(skip_all, fields(operation_id = %context.id(), entries = change_set.len()))]
pub async fn execute_submit(
    context: &mut ApiContext,
    change_set: ChangeSet,
    cancel: &CancellationToken,
) -> ApiResult<SubmitResult> {
    if context.is_submitting() {
        return Err(ApiError::SubmitInProgress);
    }
    let executor = context
        .get_hook_point::<dyn SubmitExecutor>()
        .ok_or(ApiError::NoSubmitHandler)?;

    context.set_submitting(true);
    let outcome = run_phases(context, executor.as_ref(), change_set, cancel).await;
    context.set_submitting(false);

    match &outcome {
        Ok(result) => {
            if result.phase == SubmitPhase::Done {
                METRICS.inc_submissions_completed();
            }
            let entries = result
                .completed_change_set
                .as_ref()
                .map_or(0, |change_set| change_set.len());
            emit_submit_completed(context.id(), entries, result.phase);
        }
        Err(err) if err.is_cancelled() => debug!("submission cancelled"),
        Err(err) => emit_submit_failed(context.id(), err),
    }
    outcome
}

async fn run_phases(
    context: &ApiContext,
    executor: &dyn SubmitExecutor,
    mut change_set: ChangeSet,
    cancel: &CancellationToken,
) -> ApiResult<SubmitResult> {
    let settings = context.configuration().settings();

    debug!(phase = %SubmitPhase::Validating, "submit phase");
    let validators = context.get_hook_points::<dyn ChangeSetEntryValidator>();
    let mut results = ValidationResults::new();
    for entry in change_set.entries() {
        for validator in validators.iter().rev() {
            run_step(
                "change set validator",
                settings,
                cancel,
                validator.validate(context, entry, &mut results, cancel),
            )
            .await?;
        }
    }
    if results.has_errors() {
        METRICS.inc_validation_failures();
        emit_validation_failed(context.id(), results.errors().count(), change_set.len());
        return Ok(SubmitResult::rejected(results));
    }

    debug!(phase = %SubmitPhase::PreCommit, "submit phase");
    for hook in context.get_hook_points::<dyn ChangeSetPreCommitHook>() {
        run_step(
            "pre-commit hook",
            settings,
            cancel,
            hook.on_executing(context, &mut change_set, cancel),
        )
        .await?;
    }

    debug!(phase = %SubmitPhase::Executing, "submit phase");
    let mut result = run_step(
        "submit executor",
        settings,
        cancel,
        executor.execute_submit(context, change_set, cancel),
    )
    .await?;
    if !results.is_empty() {
        let mut merged = results;
        merged.extend(std::mem::take(&mut result.validation_results));
        result.validation_results = merged;
    }

    debug!(phase = %SubmitPhase::PostCommit, "submit phase");
    for hook in context.get_hook_points::<dyn ChangeSetPostCommitHook>() {
        let notified = run_step(
            "post-commit hook",
            settings,
            cancel,
            hook.on_executed(context, &result, cancel),
        )
        .await;
        match notified {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => {
                debug!("post-commit hooks cancelled");
                break;
            }
            Err(err) => emit_post_commit_failed(context.id(), &err),
        }
    }

    result.phase = SubmitPhase::Done;
    Ok(result)
}
