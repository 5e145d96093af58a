//! Per-request processing context.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{Capability, SharedConfiguration};
use crate::error::{ApiError, ApiResult};
use crate::hooks::ModelHandler;
use crate::model::{DomainModel, Element};
use crate::properties::PropertyBag;
use crate::query::{self, QueryRequest, QueryResult, QuerySource, TypedSource};
use crate::step::run_step;
use crate::submit::{self, ChangeSet, SubmitResult};

/// Handle for one operation against a committed configuration.
///
/// Queries only need `&ApiContext`; submission takes `&mut` because it flips
/// the submitting flag for its duration.
#[derive(Debug)]
pub struct ApiContext {
    id: Uuid,
    configuration: SharedConfiguration,
    properties: PropertyBag,
    is_submitting: bool,
}

impl ApiContext {
    pub fn new(configuration: SharedConfiguration) -> Self {
        Self {
            id: Uuid::new_v4(),
            configuration,
            properties: PropertyBag::new(),
            is_submitting: false,
        }
    }

    /// Operation id attached to this context's log events.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn configuration(&self) -> &SharedConfiguration {
        &self.configuration
    }

    pub fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut PropertyBag {
        &mut self.properties
    }

    /// True only while the submission pipeline runs on this context.
    pub fn is_submitting(&self) -> bool {
        self.is_submitting
    }

    pub(crate) fn set_submitting(&mut self, submitting: bool) {
        self.is_submitting = submitting;
    }

    pub fn get_hook_point<C: Capability + ?Sized>(&self) -> Option<Arc<C>> {
        self.configuration.get_hook_point::<C>()
    }

    pub fn get_hook_points<C: Capability + ?Sized>(&self) -> Vec<Arc<C>> {
        self.configuration.get_hook_points::<C>()
    }

    /// Fetch the domain model from the registered model handler.
    pub async fn model(&self, cancel: &CancellationToken) -> ApiResult<Arc<DomainModel>> {
        let handler = self
            .get_hook_point::<dyn ModelHandler>()
            .ok_or(ApiError::NoModelHandler)?;
        run_step(
            "model handler",
            self.configuration.settings(),
            cancel,
            handler.get_model(self, cancel),
        )
        .await
    }

    /// Deferred query over entity set `name`.
    pub fn source(&self, name: &str, arguments: Vec<Value>) -> ApiResult<QuerySource> {
        query::source(self, name, arguments)
    }

    /// Deferred query over the composable operation `namespace.name`.
    pub fn operation_source(
        &self,
        namespace: &str,
        name: &str,
        arguments: Vec<Value>,
    ) -> ApiResult<QuerySource> {
        query::operation_source(self, namespace, name, arguments)
    }

    pub fn typed_source<T: Element>(
        &self,
        name: &str,
        arguments: Vec<Value>,
    ) -> ApiResult<TypedSource<T>> {
        query::typed_source(self, name, arguments)
    }

    pub fn typed_operation_source<T: Element>(
        &self,
        namespace: &str,
        name: &str,
        arguments: Vec<Value>,
    ) -> ApiResult<TypedSource<T>> {
        query::typed_operation_source(self, namespace, name, arguments)
    }

    /// Request for `source` using this configuration's default options.
    pub fn request(&self, source: impl Into<QuerySource>) -> QueryRequest {
        QueryRequest::new(source.into())
            .with_include_total_count(self.configuration.settings().include_total_count)
    }

    /// Execute a query through the query pipeline.
    pub async fn query(
        &self,
        request: impl Into<QueryRequest>,
        cancel: &CancellationToken,
    ) -> ApiResult<QueryResult> {
        query::execute_query(self, request.into(), cancel).await
    }

    /// Submit a change set through the submission pipeline. `None` submits
    /// an empty change set.
    pub async fn submit(
        &mut self,
        change_set: Option<ChangeSet>,
        cancel: &CancellationToken,
    ) -> ApiResult<SubmitResult> {
        submit::execute_submit(self, change_set.unwrap_or_default(), cancel).await
    }
}
