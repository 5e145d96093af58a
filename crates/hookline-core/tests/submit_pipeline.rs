//! Submission pipeline: validation order, rejection, hooks and executor hand-off.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hookline_core::conventions::{
    ConventionBasedChangeSetAuthorizer, ConventionBasedChangeSetEntryFilter,
};
use hookline_core::fakes::{InMemoryQueryExecutor, InMemorySubmitExecutor, RecordingValidator, StaticSubmitExecutor};
use hookline_core::{
    ApiConfiguration, ApiContext, ApiError, ApiResult, ChangeSet, ChangeSetEntry,
    ChangeSetEntryValidator, ChangeSetPostCommitHook, ChangeSetPreCommitHook, SubmitExecutor,
    SubmitPhase, SubmitResult,
};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn one_entry() -> ChangeSet {
    ChangeSet::new().with_entry(ChangeSetEntry::insert(
        "Products",
        object(json!({"Id": 9, "Name": "Mate"})),
    ))
}

type Log = Arc<Mutex<Vec<String>>>;

/// Pre- or post-commit hook appending its name to a shared log.
struct Noting {
    name: &'static str,
    log: Log,
}

#[async_trait]
impl ChangeSetPreCommitHook for Noting {
    async fn on_executing(
        &self,
        context: &ApiContext,
        change_set: &mut ChangeSet,
        _cancel: &CancellationToken,
    ) -> ApiResult<()> {
        assert!(context.is_submitting());
        change_set.any_entity_changed = true;
        self.log.lock().unwrap().push(format!("pre:{}", self.name));
        Ok(())
    }
}

#[async_trait]
impl ChangeSetPostCommitHook for Noting {
    async fn on_executed(
        &self,
        _context: &ApiContext,
        result: &SubmitResult,
        _cancel: &CancellationToken,
    ) -> ApiResult<()> {
        assert!(result.completed_change_set.is_some());
        self.log.lock().unwrap().push(format!("post:{}", self.name));
        Ok(())
    }
}

/// Post-commit hook that always fails.
struct BrokenNotifier;

#[async_trait]
impl ChangeSetPostCommitHook for BrokenNotifier {
    async fn on_executed(
        &self,
        _context: &ApiContext,
        _result: &SubmitResult,
        _cancel: &CancellationToken,
    ) -> ApiResult<()> {
        Err(anyhow::anyhow!("notification queue full").into())
    }
}

struct FailingExecutor;

#[async_trait]
impl SubmitExecutor for FailingExecutor {
    async fn execute_submit(
        &self,
        _context: &ApiContext,
        _change_set: ChangeSet,
        _cancel: &CancellationToken,
    ) -> ApiResult<SubmitResult> {
        Err(anyhow::anyhow!("store unavailable").into())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validators_run_in_reverse_registration_order() {
    let log: Log = Arc::default();
    let mut config = ApiConfiguration::new();
    for name in ["A", "B", "C"] {
        config
            .add_hook_point::<dyn ChangeSetEntryValidator>(Arc::new(RecordingValidator::new(
                name,
                Arc::clone(&log),
            )))
            .unwrap();
    }
    config
        .add_hook_point::<dyn SubmitExecutor>(Arc::new(StaticSubmitExecutor::new(Arc::new(
            ChangeSet::new(),
        ))))
        .unwrap();
    let mut ctx = ApiContext::new(config.into_shared());

    let two_entries = one_entry().with_entry(ChangeSetEntry::remove(
        "Products",
        object(json!({"Id": 1})),
    ));
    let result = ctx
        .submit(Some(two_entries), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.phase, SubmitPhase::Done);
    assert_eq!(*log.lock().unwrap(), ["C", "B", "A", "C", "B", "A"]);
}

#[tokio::test]
async fn error_result_blocks_execution() {
    let log: Log = Arc::default();
    let executor = Arc::new(StaticSubmitExecutor::new(Arc::new(ChangeSet::new())));
    let other = Arc::new(RecordingValidator::new("other", Arc::clone(&log)));
    let failing = Arc::new(RecordingValidator::new("failing", Arc::clone(&log)).failing("nope"));

    // Registered last, so the failing validator runs first.
    let mut config = ApiConfiguration::new();
    config
        .add_hook_point::<dyn ChangeSetEntryValidator>(other)
        .unwrap()
        .add_hook_point::<dyn ChangeSetEntryValidator>(failing)
        .unwrap()
        .add_hook_point::<dyn SubmitExecutor>(executor.clone())
        .unwrap();
    let mut ctx = ApiContext::new(config.into_shared());

    let result = ctx
        .submit(Some(one_entry()), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.phase, SubmitPhase::Failed);
    assert!(result.completed_change_set.is_none());
    assert!(result.validation_results.has_errors());
    assert_eq!(executor.calls(), 0);
    // The remaining validator still ran after the error was recorded.
    assert_eq!(*log.lock().unwrap(), ["failing", "other"]);
    assert!(!ctx.is_submitting());
}

#[tokio::test]
async fn submit_returns_executor_change_set_identity() {
    let completed = Arc::new(one_entry());
    let executor = Arc::new(StaticSubmitExecutor::new(Arc::clone(&completed)));
    let mut config = ApiConfiguration::new();
    config
        .add_hook_point::<dyn SubmitExecutor>(executor.clone())
        .unwrap();
    let mut ctx = ApiContext::new(config.into_shared());

    let result = ctx.submit(None, &CancellationToken::new()).await.unwrap();
    let returned = result.completed_change_set.expect("completed");
    assert!(Arc::ptr_eq(&returned, &completed));
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn hooks_run_in_order_around_execution() {
    let log: Log = Arc::default();
    let validator = Arc::new(RecordingValidator::new("V", Arc::clone(&log)));
    let first = Arc::new(Noting {
        name: "1",
        log: Arc::clone(&log),
    });
    let second = Arc::new(Noting {
        name: "2",
        log: Arc::clone(&log),
    });
    let store = Arc::new(InMemoryQueryExecutor::new().with_rows("Products", vec![]));

    let mut config = ApiConfiguration::new();
    config
        .add_hook_point::<dyn ChangeSetEntryValidator>(validator.clone())
        .unwrap()
        .add_hook_point::<dyn ChangeSetPreCommitHook>(first.clone())
        .unwrap()
        .add_hook_point::<dyn ChangeSetPreCommitHook>(second.clone())
        .unwrap()
        .add_hook_point::<dyn ChangeSetPostCommitHook>(first)
        .unwrap()
        .add_hook_point::<dyn ChangeSetPostCommitHook>(second)
        .unwrap()
        .add_hook_point::<dyn SubmitExecutor>(Arc::new(InMemorySubmitExecutor::new(
            Arc::clone(&store),
        )))
        .unwrap();
    let mut ctx = ApiContext::new(config.into_shared());
    assert!(!ctx.is_submitting());

    let result = ctx
        .submit(Some(one_entry()), &CancellationToken::new())
        .await
        .unwrap();
    assert!(result.is_completed());
    assert!(result.completed_change_set.unwrap().any_entity_changed);
    assert_eq!(store.rows("Products").len(), 1);
    assert_eq!(*log.lock().unwrap(), ["V", "pre:1", "pre:2", "post:1", "post:2"]);
    assert!(validator.saw_submitting());
    assert!(!ctx.is_submitting());
}

#[tokio::test]
async fn post_commit_failure_keeps_completed_result() {
    let log: Log = Arc::default();
    let store = Arc::new(InMemoryQueryExecutor::new().with_rows("Products", vec![]));
    let mut config = ApiConfiguration::new();
    config
        .add_hook_point::<dyn ChangeSetPostCommitHook>(Arc::new(BrokenNotifier))
        .unwrap()
        .add_hook_point::<dyn ChangeSetPostCommitHook>(Arc::new(Noting {
            name: "after",
            log: Arc::clone(&log),
        }))
        .unwrap()
        .add_hook_point::<dyn SubmitExecutor>(Arc::new(InMemorySubmitExecutor::new(
            Arc::clone(&store),
        )))
        .unwrap();
    let mut ctx = ApiContext::new(config.into_shared());

    let result = ctx
        .submit(Some(one_entry()), &CancellationToken::new())
        .await
        .unwrap();
    assert!(result.is_completed());
    assert_eq!(result.phase, SubmitPhase::Done);
    assert_eq!(store.rows("Products").len(), 1);
    assert_eq!(*log.lock().unwrap(), ["post:after"]);
    assert!(!ctx.is_submitting());
}

#[tokio::test]
async fn missing_executor_is_checked_before_validation() {
    let log: Log = Arc::default();
    let mut config = ApiConfiguration::new();
    config
        .add_hook_point::<dyn ChangeSetEntryValidator>(Arc::new(RecordingValidator::new(
            "A",
            Arc::clone(&log),
        )))
        .unwrap();
    let mut ctx = ApiContext::new(config.into_shared());

    let err = ctx
        .submit(Some(one_entry()), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NoSubmitHandler));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn executor_failure_resets_submitting_flag() {
    let mut config = ApiConfiguration::new();
    config
        .add_hook_point::<dyn SubmitExecutor>(Arc::new(FailingExecutor))
        .unwrap();
    let mut ctx = ApiContext::new(config.into_shared());

    let err = ctx
        .submit(Some(one_entry()), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Collaborator(_)));
    assert!(!ctx.is_submitting());
}

#[tokio::test]
async fn cancelled_submit_stops_before_executor() {
    let executor = Arc::new(StaticSubmitExecutor::new(Arc::new(ChangeSet::new())));
    let mut config = ApiConfiguration::new();
    config
        .add_hook_point::<dyn SubmitExecutor>(executor.clone())
        .unwrap();
    let mut ctx = ApiContext::new(config.into_shared());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = ctx.submit(Some(one_entry()), &cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(executor.calls(), 0);
    assert!(!ctx.is_submitting());
}

#[tokio::test]
async fn conventions_authorize_and_adjust_entries() {
    let store = Arc::new(InMemoryQueryExecutor::new().with_rows(
        "Products",
        vec![json!({"Id": 1, "Name": "Tea"})],
    ));
    let authorizer = ConventionBasedChangeSetAuthorizer::new().can_remove("Products", |_, _| false);
    let stamping = ConventionBasedChangeSetEntryFilter::new().on_inserting("Products", |_, entry| {
        entry.values.insert("Source".into(), json!("api"));
    });

    let mut config = ApiConfiguration::new();
    config
        .add_hook_point::<dyn ChangeSetEntryValidator>(Arc::new(authorizer))
        .unwrap()
        .add_hook_point::<dyn ChangeSetPreCommitHook>(Arc::new(stamping))
        .unwrap()
        .add_hook_point::<dyn SubmitExecutor>(Arc::new(InMemorySubmitExecutor::new(
            Arc::clone(&store),
        )))
        .unwrap();
    let mut ctx = ApiContext::new(config.into_shared());
    let cancel = CancellationToken::new();

    let denied = ChangeSet::new().with_entry(ChangeSetEntry::remove(
        "Products",
        object(json!({"Id": 1})),
    ));
    let result = ctx.submit(Some(denied), &cancel).await.unwrap();
    assert_eq!(result.phase, SubmitPhase::Failed);
    let errors: Vec<_> = result.validation_results.errors().map(|r| r.id.as_str()).collect();
    assert_eq!(errors, ["forbidden"]);
    assert_eq!(store.rows("Products").len(), 1);

    let result = ctx.submit(Some(one_entry()), &cancel).await.unwrap();
    assert!(result.is_completed());
    assert!(result.completed_change_set.unwrap().any_entity_changed);
    let rows = store.rows("Products");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["Source"], json!("api"));
}
