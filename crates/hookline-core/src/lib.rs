//! Hookline: pluggable request-processing core for data-access domain layers
//!
//! A host registers hook points on an [`ApiConfiguration`], commits it, and
//! processes each request through an [`ApiContext`]:
//!
//! - Queries are built as deferred [`QuerySource`]s, rewritten by the
//!   registered [`QueryExpressionFilter`]s and executed by the single
//!   [`QueryExecutor`].
//! - Change sets are validated (validators in reverse registration order),
//!   passed through pre-commit hooks, executed by the single
//!   [`SubmitExecutor`] and reported to post-commit hooks.
//!
//! ## Key Components
//!
//! - `config`: hook-point registry and settings
//! - `hooks`: capability traits
//! - `query`: expression trees, deferred sources, filter chain, query pipeline
//! - `submit`: change sets, validation results, submission pipeline
//! - `conventions`: closure-per-entity-set hook points
//! - `fakes`: in-memory collaborators

pub mod config;
pub mod context;
pub mod conventions;
mod error;
pub mod fakes;
pub mod hooks;
pub mod metrics;
pub mod model;
pub mod obs;
pub mod properties;
pub mod query;
mod step;
pub mod submit;
pub mod telemetry;

pub use config::{ApiConfiguration, ApiSettings, Capability, SharedConfiguration};
pub use context::ApiContext;
pub use error::{ApiError, ApiResult};
pub use hooks::{
    ChangeSetEntryValidator, ChangeSetPostCommitHook, ChangeSetPreCommitHook, DomainModelMapper,
    ModelHandler, ModelMapper, QueryExecutor, QueryExpressionContext, QueryExpressionFilter,
    SubmitExecutor,
};
pub use model::{DomainModel, Element, ElementType, ModelReference};
pub use properties::PropertyBag;
pub use query::{
    BinaryOp, Expression, QueryRequest, QueryResult, QuerySource, ScalarOperator, TypedSource,
};
pub use submit::{
    ChangeSet, ChangeSetEntry, DataModificationEntry, EntityAction, Severity, SubmitPhase,
    SubmitResult, ValidationResult, ValidationResults,
};

/// Crate version, as reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
