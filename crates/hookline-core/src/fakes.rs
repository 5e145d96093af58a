//! In-memory collaborators (tests and the CLI)
//!
//! Provides a static model handler, two query executors, two submit
//! executors and a recording validator that satisfy the capability contracts
//! without any external store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::context::ApiContext;
use crate::error::{ApiError, ApiResult};
use crate::hooks::{ChangeSetEntryValidator, ModelHandler, QueryExecutor, SubmitExecutor};
use crate::model::{DomainModel, ModelReference};
use crate::query::eval::{evaluate_sequence, without_paging};
use crate::query::{Expression, QueryRequest, QueryResult, SourceCall};
use crate::submit::{
    ChangeSet, ChangeSetEntry, DataModificationEntry, EntityAction, SubmitResult,
    ValidationResult, ValidationResults,
};

// ---------------------------------------------------------------------------
// StaticModelHandler
// ---------------------------------------------------------------------------

/// Model handler returning the same model for every context.
#[derive(Debug, Clone)]
pub struct StaticModelHandler {
    model: Arc<DomainModel>,
}

impl StaticModelHandler {
    pub fn new(model: DomainModel) -> Self {
        Self {
            model: Arc::new(model),
        }
    }

    pub fn model(&self) -> Arc<DomainModel> {
        Arc::clone(&self.model)
    }
}

#[async_trait]
impl ModelHandler for StaticModelHandler {
    async fn get_model(
        &self,
        _context: &ApiContext,
        _cancel: &CancellationToken,
    ) -> ApiResult<Arc<DomainModel>> {
        Ok(Arc::clone(&self.model))
    }
}

// ---------------------------------------------------------------------------
// StaticQueryExecutor
// ---------------------------------------------------------------------------

/// Query executor returning fixed rows and recording what it was asked.
#[derive(Debug, Default)]
pub struct StaticQueryExecutor {
    rows: Vec<Value>,
    received: Mutex<Vec<QueryRequest>>,
}

impl StaticQueryExecutor {
    pub fn new(rows: Vec<Value>) -> Self {
        Self {
            rows,
            received: Mutex::new(Vec::new()),
        }
    }

    /// Expressions received so far, oldest first.
    pub fn received_expressions(&self) -> Vec<Expression> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.expression().clone())
            .collect()
    }

    pub fn received_requests(&self) -> Vec<QueryRequest> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryExecutor for StaticQueryExecutor {
    async fn execute_query(
        &self,
        _context: &ApiContext,
        request: QueryRequest,
        _cancel: &CancellationToken,
    ) -> ApiResult<QueryResult> {
        let include_total_count = request.include_total_count();
        self.received.lock().unwrap().push(request);
        let result = QueryResult::new(self.rows.clone());
        Ok(if include_total_count {
            result.with_total_count(self.rows.len() as u64)
        } else {
            result
        })
    }
}

// ---------------------------------------------------------------------------
// InMemoryQueryExecutor
// ---------------------------------------------------------------------------

/// Query executor evaluating expressions over named JSON row sets.
///
/// Entity sets are keyed by name, composable operations by
/// `namespace.name`. Source arguments are ignored.
#[derive(Debug, Default)]
pub struct InMemoryQueryExecutor {
    data: Mutex<HashMap<String, Vec<Value>>>,
}

impl InMemoryQueryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a dataset shaped `{"<entity set>": [rows...], ...}`.
    pub fn from_json(dataset: Value) -> ApiResult<Self> {
        let sets: HashMap<String, Vec<Value>> = serde_json::from_value(dataset)?;
        Ok(Self {
            data: Mutex::new(sets),
        })
    }

    pub fn with_rows(self, entity_set: impl Into<String>, rows: Vec<Value>) -> Self {
        self.data.lock().unwrap().insert(entity_set.into(), rows);
        self
    }

    pub fn with_operation_rows(self, namespace: &str, name: &str, rows: Vec<Value>) -> Self {
        self.data
            .lock()
            .unwrap()
            .insert(format!("{namespace}.{name}"), rows);
        self
    }

    /// Current rows of `entity_set`, empty if unknown.
    pub fn rows(&self, entity_set: &str) -> Vec<Value> {
        self.data
            .lock()
            .unwrap()
            .get(entity_set)
            .cloned()
            .unwrap_or_default()
    }

    /// Names of the loaded row sets, sorted.
    pub fn set_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.data.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    fn evaluate(&self, expression: &Expression) -> ApiResult<Vec<Value>> {
        let data = self.data.lock().unwrap();
        let resolve = |call: &SourceCall<'_>| -> ApiResult<Vec<Value>> {
            let key = match &call.reference {
                ModelReference::EntitySet { name } => name.clone(),
                ModelReference::Operation { namespace, name } => format!("{namespace}.{name}"),
            };
            data.get(&key)
                .cloned()
                .ok_or_else(|| ApiError::Collaborator(anyhow!("no rows loaded for {key}")))
        };
        evaluate_sequence(expression, &resolve)
    }

    fn apply(&self, entry: &DataModificationEntry) -> ApiResult<()> {
        let mut data = self.data.lock().unwrap();
        let rows = data.entry(entry.entity_set.clone()).or_default();
        match entry.action {
            EntityAction::Insert => {
                let mut row = entry.key.clone();
                row.extend(entry.values.clone());
                rows.push(Value::Object(row));
            }
            EntityAction::Update => {
                let mut matched = 0;
                for row in rows.iter_mut().filter(|row| matches_key(row, &entry.key)) {
                    if let Value::Object(fields) = row {
                        fields.extend(entry.values.clone());
                        matched += 1;
                    }
                }
                if matched == 0 {
                    return Err(no_match(entry));
                }
            }
            EntityAction::Remove => {
                let before = rows.len();
                rows.retain(|row| !matches_key(row, &entry.key));
                if rows.len() == before {
                    return Err(no_match(entry));
                }
            }
        }
        Ok(())
    }
}

fn matches_key(row: &Value, key: &Map<String, Value>) -> bool {
    !key.is_empty() && key.iter().all(|(name, value)| row.get(name) == Some(value))
}

fn no_match(entry: &DataModificationEntry) -> ApiError {
    ApiError::Collaborator(anyhow!(
        "no {} entity matches key {}",
        entry.entity_set,
        Value::Object(entry.key.clone())
    ))
}

#[async_trait]
impl QueryExecutor for InMemoryQueryExecutor {
    async fn execute_query(
        &self,
        _context: &ApiContext,
        request: QueryRequest,
        _cancel: &CancellationToken,
    ) -> ApiResult<QueryResult> {
        let rows = self.evaluate(request.expression())?;
        let mut result = QueryResult::new(rows);
        if request.include_total_count() {
            let total = self.evaluate(&without_paging(request.expression()))?.len();
            result = result.with_total_count(total as u64);
        }
        debug!(rows = result.len(), "in-memory query evaluated");
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// StaticSubmitExecutor
// ---------------------------------------------------------------------------

/// Submit executor that ignores its input and completes with a fixed change set.
#[derive(Debug)]
pub struct StaticSubmitExecutor {
    change_set: Arc<ChangeSet>,
    calls: AtomicUsize,
}

impl StaticSubmitExecutor {
    pub fn new(change_set: Arc<ChangeSet>) -> Self {
        Self {
            change_set,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubmitExecutor for StaticSubmitExecutor {
    async fn execute_submit(
        &self,
        _context: &ApiContext,
        _change_set: ChangeSet,
        _cancel: &CancellationToken,
    ) -> ApiResult<SubmitResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SubmitResult::completed(Arc::clone(&self.change_set)))
    }
}

// ---------------------------------------------------------------------------
// InMemorySubmitExecutor
// ---------------------------------------------------------------------------

/// Submit executor writing data modifications into an [`InMemoryQueryExecutor`].
///
/// Updates and removals match rows on every key property; an entry matching
/// nothing fails the submission. Entries already applied stay applied.
#[derive(Debug)]
pub struct InMemorySubmitExecutor {
    store: Arc<InMemoryQueryExecutor>,
}

impl InMemorySubmitExecutor {
    pub fn new(store: Arc<InMemoryQueryExecutor>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SubmitExecutor for InMemorySubmitExecutor {
    async fn execute_submit(
        &self,
        _context: &ApiContext,
        change_set: ChangeSet,
        cancel: &CancellationToken,
    ) -> ApiResult<SubmitResult> {
        for entry in change_set.entries() {
            if cancel.is_cancelled() {
                return Err(ApiError::Cancelled);
            }
            match entry {
                ChangeSetEntry::DataModification(modification) => self.store.apply(modification)?,
                ChangeSetEntry::ActionInvocation(action) => {
                    debug!(action = %action.name, "action invocation has no in-memory effect");
                }
            }
        }
        Ok(SubmitResult::completed(Arc::new(change_set)))
    }
}

// ---------------------------------------------------------------------------
// RecordingValidator
// ---------------------------------------------------------------------------

/// Validator appending its name to a shared log for every entry it sees.
///
/// Several validators sharing one log expose the order the pipeline ran them.
#[derive(Debug)]
pub struct RecordingValidator {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
    error: Option<String>,
    saw_submitting: AtomicBool,
}

impl RecordingValidator {
    pub fn new(name: impl Into<String>, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.into(),
            log,
            error: None,
            saw_submitting: AtomicBool::new(false),
        }
    }

    /// Also record an error result with `message` for every entry.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    /// Whether the context reported `is_submitting` during validation.
    pub fn saw_submitting(&self) -> bool {
        self.saw_submitting.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChangeSetEntryValidator for RecordingValidator {
    async fn validate(
        &self,
        context: &ApiContext,
        _entry: &ChangeSetEntry,
        results: &mut ValidationResults,
        _cancel: &CancellationToken,
    ) -> ApiResult<()> {
        self.log.lock().unwrap().push(self.name.clone());
        if context.is_submitting() {
            self.saw_submitting.store(true, Ordering::SeqCst);
        }
        if let Some(message) = &self.error {
            results.push(ValidationResult::error(self.name.clone(), message.clone()));
        }
        Ok(())
    }
}
