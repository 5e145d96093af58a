//! Query requests handed to the pipeline and the results it returns.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::expression::Expression;
use super::source::{QuerySource, TypedSource};
use crate::error::ApiResult;
use crate::model::ElementType;

/// A deferred query plus execution options.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    source: QuerySource,
    include_total_count: bool,
}

impl QueryRequest {
    pub fn new(source: QuerySource) -> Self {
        Self {
            source,
            include_total_count: false,
        }
    }

    /// Ask the executor for the total number of rows before paging.
    pub fn with_include_total_count(mut self, include: bool) -> Self {
        self.include_total_count = include;
        self
    }

    /// Same request over a different expression (used for rewrites).
    pub fn with_expression(self, expression: Expression) -> Self {
        Self {
            source: QuerySource::from_expression(self.source.element_type().clone(), expression),
            include_total_count: self.include_total_count,
        }
    }

    pub fn source(&self) -> &QuerySource {
        &self.source
    }

    pub fn expression(&self) -> &Expression {
        self.source.expression()
    }

    pub fn element_type(&self) -> &ElementType {
        self.source.element_type()
    }

    pub fn include_total_count(&self) -> bool {
        self.include_total_count
    }
}

impl From<QuerySource> for QueryRequest {
    fn from(source: QuerySource) -> Self {
        QueryRequest::new(source)
    }
}

impl<T> From<TypedSource<T>> for QueryRequest {
    fn from(source: TypedSource<T>) -> Self {
        QueryRequest::new(source.into_untyped())
    }
}

/// Rows produced by the query executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Result rows (a single row for scalar operators).
    pub results: Vec<Value>,
    /// Total row count before paging, when requested and supported.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total_count: Option<u64>,
}

impl QueryResult {
    pub fn new(results: Vec<Value>) -> Self {
        Self {
            results,
            total_count: None,
        }
    }

    pub fn with_total_count(mut self, total_count: u64) -> Self {
        self.total_count = Some(total_count);
        self
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// The only row, if there is exactly one.
    pub fn single_value(&self) -> Option<&Value> {
        match self.results.as_slice() {
            [value] => Some(value),
            _ => None,
        }
    }

    /// Deserialize every row into `T`.
    pub fn into_typed<T: DeserializeOwned>(self) -> ApiResult<Vec<T>> {
        self.results
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(Into::into))
            .collect()
    }
}
