//! Error taxonomy for the hook-point registry and the request pipelines.
//!
//! Validation failures are not errors: they accumulate as
//! [`ValidationResults`](crate::submit::ValidationResults) and surface through
//! the [`SubmitResult`](crate::submit::SubmitResult).

/// Errors produced by configuration, source construction and the pipelines.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("configuration is committed; cannot register {capability} hook point")]
    ConfigurationFrozen { capability: &'static str },

    #[error("element not mapped: {name}")]
    UnmappedElement { name: String },

    #[error("element type mismatch: expected {expected}, resolved {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("deferred query cannot be {operation} directly; execute it through the query pipeline")]
    DeferredExecutionViolation { operation: &'static str },

    #[error("no query executor hook point registered")]
    NoQueryHandler,

    #[error("no submit executor hook point registered")]
    NoSubmitHandler,

    #[error("no model handler hook point registered")]
    NoModelHandler,

    #[error("a submission is already in progress on this context")]
    SubmitInProgress,

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("{step} timed out after {limit_ms}ms")]
    StepTimeout { step: &'static str, limit_ms: u64 },

    #[error("operation cancelled")]
    Cancelled,

    #[error("collaborator failed: {0}")]
    Collaborator(#[from] anyhow::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ApiError {
    /// Whether the error is the cancellation signal rather than a domain error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }
}

/// Result type for hookline operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
