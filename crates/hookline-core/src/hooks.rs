//! Capability traits consulted by the pipelines.
//!
//! These traits define the hook points a host registers on an
//! [`ApiConfiguration`](crate::ApiConfiguration):
//! - `ModelHandler`: supplies the domain model (single-cast)
//! - `ModelMapper`: resolves element names to element types (single-cast)
//! - `QueryExecutor`: retrieves rows for a rewritten query (single-cast)
//! - `SubmitExecutor`: persists a validated change set (single-cast)
//! - `QueryExpressionFilter`: rewrites query expressions (multi-cast, forward)
//! - `ChangeSetEntryValidator`: validates entries (multi-cast, reverse)
//! - `ChangeSetPreCommitHook` / `ChangeSetPostCommitHook`: observe the
//!   change set around execution (multi-cast, forward)
//!
//! Async capabilities receive the request's cancellation token. In-memory
//! implementations live in the [`fakes`](crate::fakes) module.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::Capability;
use crate::context::ApiContext;
use crate::error::ApiResult;
use crate::model::{DomainModel, ElementType, ModelReference};
use crate::query::{Expression, QueryRequest, QueryResult};
use crate::submit::{ChangeSet, ChangeSetEntry, SubmitResult, ValidationResults};

/// Supplies the domain's metadata model.
#[async_trait]
pub trait ModelHandler: Send + Sync {
    async fn get_model(
        &self,
        context: &ApiContext,
        cancel: &CancellationToken,
    ) -> ApiResult<Arc<DomainModel>>;
}

/// Resolves element names to the element type of their rows.
pub trait ModelMapper: Send + Sync {
    /// Resolve an entity set name. `None` declines the name.
    fn try_resolve(&self, context: &ApiContext, name: &str) -> Option<ElementType>;

    /// Resolve a composable operation. `None` declines the name.
    fn try_resolve_operation(
        &self,
        context: &ApiContext,
        namespace: &str,
        name: &str,
    ) -> Option<ElementType>;
}

/// Performs the actual data retrieval for a rewritten query.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute_query(
        &self,
        context: &ApiContext,
        request: QueryRequest,
        cancel: &CancellationToken,
    ) -> ApiResult<QueryResult>;
}

/// Performs the actual persistence of a validated change set.
#[async_trait]
pub trait SubmitExecutor: Send + Sync {
    async fn execute_submit(
        &self,
        context: &ApiContext,
        change_set: ChangeSet,
        cancel: &CancellationToken,
    ) -> ApiResult<SubmitResult>;
}

/// What a query expression filter sees for one visited node.
#[derive(Debug, Clone, Copy)]
pub struct QueryExpressionContext<'a> {
    expression: &'a Expression,
    model_reference: Option<&'a ModelReference>,
    api: &'a ApiContext,
}

impl<'a> QueryExpressionContext<'a> {
    pub fn new(
        expression: &'a Expression,
        model_reference: Option<&'a ModelReference>,
        api: &'a ApiContext,
    ) -> Self {
        Self {
            expression,
            model_reference,
            api,
        }
    }

    /// The node being visited.
    pub fn expression(&self) -> &'a Expression {
        self.expression
    }

    /// Model element denoted by the node; `None` means opaque.
    pub fn model_reference(&self) -> Option<&'a ModelReference> {
        self.model_reference
    }

    /// The owning request context.
    pub fn api(&self) -> &'a ApiContext {
        self.api
    }
}

/// Rewrites a query expression node before execution.
pub trait QueryExpressionFilter: Send + Sync {
    /// Return a replacement for the visited node, or `None` to leave it.
    fn filter(&self, context: &QueryExpressionContext<'_>) -> Option<Expression>;
}

/// Validates one change-set entry, appending to `results`.
///
/// Validators run in reverse registration order and must not assume they run
/// alone: results added by earlier validators are visible.
#[async_trait]
pub trait ChangeSetEntryValidator: Send + Sync {
    async fn validate(
        &self,
        context: &ApiContext,
        entry: &ChangeSetEntry,
        results: &mut ValidationResults,
        cancel: &CancellationToken,
    ) -> ApiResult<()>;
}

/// Inspects or mutates the change set after validation, before execution.
#[async_trait]
pub trait ChangeSetPreCommitHook: Send + Sync {
    async fn on_executing(
        &self,
        context: &ApiContext,
        change_set: &mut ChangeSet,
        cancel: &CancellationToken,
    ) -> ApiResult<()>;
}

/// Notified with the submit result once execution has completed.
#[async_trait]
pub trait ChangeSetPostCommitHook: Send + Sync {
    async fn on_executed(
        &self,
        context: &ApiContext,
        result: &SubmitResult,
        cancel: &CancellationToken,
    ) -> ApiResult<()>;
}

impl Capability for dyn ModelHandler {
    const NAME: &'static str = "ModelHandler";
}

impl Capability for dyn ModelMapper {
    const NAME: &'static str = "ModelMapper";
}

impl Capability for dyn QueryExecutor {
    const NAME: &'static str = "QueryExecutor";
}

impl Capability for dyn SubmitExecutor {
    const NAME: &'static str = "SubmitExecutor";
}

impl Capability for dyn QueryExpressionFilter {
    const NAME: &'static str = "QueryExpressionFilter";
}

impl Capability for dyn ChangeSetEntryValidator {
    const NAME: &'static str = "ChangeSetEntryValidator";
}

impl Capability for dyn ChangeSetPreCommitHook {
    const NAME: &'static str = "ChangeSetPreCommitHook";
}

impl Capability for dyn ChangeSetPostCommitHook {
    const NAME: &'static str = "ChangeSetPostCommitHook";
}

/// Model mapper backed by a fixed [`DomainModel`].
#[derive(Debug, Clone)]
pub struct DomainModelMapper {
    model: Arc<DomainModel>,
}

impl DomainModelMapper {
    pub fn new(model: Arc<DomainModel>) -> Self {
        Self { model }
    }
}

impl ModelMapper for DomainModelMapper {
    fn try_resolve(&self, _context: &ApiContext, name: &str) -> Option<ElementType> {
        self.model.entity_set(name).cloned()
    }

    fn try_resolve_operation(
        &self,
        _context: &ApiContext,
        namespace: &str,
        name: &str,
    ) -> Option<ElementType> {
        self.model.operation(namespace, name).cloned()
    }
}
