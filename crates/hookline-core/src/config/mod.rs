//! Configuration: the hook-point registry and pipeline settings.
//!
//! - [`registry`] — `ApiConfiguration` (mutable until committed) and the
//!   read-only `SharedConfiguration` handle
//! - [`settings`] — `ApiSettings` (timeouts, filter depth, count defaults)

pub mod registry;
pub mod settings;

pub use registry::{ApiConfiguration, Capability, SharedConfiguration};
pub use settings::ApiSettings;
