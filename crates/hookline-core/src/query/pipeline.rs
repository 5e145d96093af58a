//! Query pipeline: filter chain, executor hand-off, scalar finish.

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::filter::apply_filters;
use super::operators::ScalarOperator;
use super::request::{QueryRequest, QueryResult};
use crate::context::ApiContext;
use crate::error::{ApiError, ApiResult};
use crate::hooks::{QueryExecutor, QueryExpressionFilter};
use crate::metrics::METRICS;
use crate::obs::emit_query_executed;
use crate::step::{ensure_active, run_step};

/// Run `request` through the registered filters and the query executor.
///
/// A trailing scalar operator (`Single`, `Count`, ...) is stripped before the
/// executor sees the expression and applied to the rows it returns; the
/// result then holds exactly one row and no total count.
#[instrument(
    skip_all,
    fields(operation_id = %context.id(), element_type = %request.element_type())
)]
pub async fn execute_query(
    context: &ApiContext,
    request: QueryRequest,
    cancel: &CancellationToken,
) -> ApiResult<QueryResult> {
    ensure_active(cancel)?;

    let executor = context
        .get_hook_point::<dyn QueryExecutor>()
        .ok_or(ApiError::NoQueryHandler)?;
    let filters = context.get_hook_points::<dyn QueryExpressionFilter>();
    let settings = context.configuration().settings();

    let include_total_count = request.include_total_count();
    let filtered = apply_filters(
        context,
        &filters,
        request.expression().clone(),
        settings.max_filter_depth,
    )?;
    let (sequence, scalar) = ScalarOperator::split(filtered.expression);
    let expression_text = sequence.to_string();
    debug!(expression = %expression_text, scalar = ?scalar, "query prepared");

    let request = request
        .with_expression(sequence)
        .with_include_total_count(include_total_count && scalar.is_none());

    let result = run_step(
        "query executor",
        settings,
        cancel,
        executor.execute_query(context, request, cancel),
    )
    .await?;

    let result = match scalar {
        Some(operator) => QueryResult::new(vec![operator.apply(result.results)?]),
        None => result,
    };

    METRICS.inc_queries_executed();
    emit_query_executed(context.id(), &expression_text, result.len(), filtered.rewrites);
    Ok(result)
}
