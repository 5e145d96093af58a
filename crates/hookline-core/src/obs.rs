//! Structured observability hooks for query and submit operations.
//!
//! This module provides:
//! - Operation-scoped tracing spans: [`operation_span`] for instrumenting
//!   futures, and the `OperationSpan` RAII guard for synchronous code
//! - Emission functions for pipeline milestones
//!
//! Events carry an `event` field so they can be selected in JSON logs.

use tracing::{info, warn};
use uuid::Uuid;

use crate::model::ModelReference;
use crate::submit::SubmitPhase;

/// Span tagged with the context's operation id. Attach it to async work with
/// [`tracing::Instrument::instrument`].
pub fn operation_span(operation_id: Uuid, kind: &'static str) -> tracing::Span {
    tracing::info_span!("hookline.operation", operation_id = %operation_id, kind = kind)
}

/// RAII guard that enters [`operation_span`]. Do not hold it across `.await`.
///
/// ```
/// use hookline_core::obs::OperationSpan;
///
/// let _span = OperationSpan::enter(uuid::Uuid::new_v4(), "query");
/// ```
pub struct OperationSpan {
    _span: tracing::span::EnteredSpan,
}

impl OperationSpan {
    pub fn enter(operation_id: Uuid, kind: &'static str) -> Self {
        Self {
            _span: operation_span(operation_id, kind).entered(),
        }
    }
}

/// Emit event: a query was handed to the executor and returned rows.
pub fn emit_query_executed(operation_id: Uuid, expression: &str, rows: usize, rewrites: usize) {
    info!(
        event = "query.executed",
        operation_id = %operation_id,
        expression = %expression,
        rows = rows,
        rewrites = rewrites,
    );
}

/// Emit event: a filter replaced a node.
pub fn emit_filter_applied(operation_id: Uuid, reference: &ModelReference) {
    info!(event = "query.filter_applied", operation_id = %operation_id, reference = %reference);
}

/// Emit event: validation produced errors and the change set was rejected.
pub fn emit_validation_failed(operation_id: Uuid, errors: usize, entries: usize) {
    warn!(
        event = "submit.validation_failed",
        operation_id = %operation_id,
        errors = errors,
        entries = entries,
    );
}

/// Emit event: submission reached its terminal phase.
pub fn emit_submit_completed(operation_id: Uuid, entries: usize, phase: SubmitPhase) {
    info!(
        event = "submit.completed",
        operation_id = %operation_id,
        entries = entries,
        phase = %phase,
    );
}

/// Emit event: a submit step failed with an error (warning level).
pub fn emit_submit_failed(operation_id: Uuid, error: &dyn std::fmt::Display) {
    warn!(event = "submit.failed", operation_id = %operation_id, error = %error);
}

/// Emit event: a post-commit hook failed after the change set was persisted.
pub fn emit_post_commit_failed(operation_id: Uuid, error: &dyn std::fmt::Display) {
    warn!(event = "submit.post_commit_failed", operation_id = %operation_id, error = %error);
}
