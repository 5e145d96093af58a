//! Deferred queries, the expression filter chain and the query pipeline.

pub mod eval;
mod expression;
mod filter;
pub mod operators;
mod pipeline;
mod request;
mod source;

pub use expression::{BinaryOp, Expression, SourceCall};
pub use filter::{apply_filters, FilteredExpression};
pub use operators::ScalarOperator;
pub use pipeline::execute_query;
pub use request::{QueryRequest, QueryResult};
pub use source::{
    operation_source, source, typed_operation_source, typed_source, QuerySource, TypedSource,
};
