//! Pipeline settings carried by the configuration.

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

/// Tunables applied by the query and submission pipelines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiSettings {
    /// Upper bound for a single collaborator call (milliseconds). `None`
    /// leaves collaborator calls unbounded.
    pub step_timeout_ms: Option<u64>,
    /// Default for `include_total_count` on requests built by a context.
    pub include_total_count: bool,
    /// Deepest expression node the filter chain will visit.
    pub max_filter_depth: usize,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            step_timeout_ms: None,
            include_total_count: false,
            max_filter_depth: 64,
        }
    }
}

impl ApiSettings {
    /// Parse settings from a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> ApiResult<Self> {
        let settings: ApiSettings =
            toml::from_str(raw).map_err(|e| ApiError::InvalidSettings(e.to_string()))?;
        if settings.max_filter_depth == 0 {
            return Err(ApiError::InvalidSettings(
                "max_filter_depth must be at least 1".to_string(),
            ));
        }
        Ok(settings)
    }
}
