//! Convention-based hook points.
//!
//! Hosts register closures per entity set instead of implementing the
//! capability traits by hand:
//! - [`ConventionBasedQueryFilter`]: rewrites queries over an entity set
//! - [`ConventionBasedChangeSetAuthorizer`]: denies inserts, updates or removals
//! - [`ConventionBasedChangeSetEntryFilter`]: adjusts entries before execution
//!
//! Entity set names match case-insensitively.

mod query;
mod submit;

pub use query::ConventionBasedQueryFilter;
pub use submit::{ConventionBasedChangeSetAuthorizer, ConventionBasedChangeSetEntryFilter};
