//! End-to-end behavior of deferred sources and the query pipeline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hookline_core::conventions::ConventionBasedQueryFilter;
use hookline_core::fakes::{InMemoryQueryExecutor, StaticQueryExecutor};
use hookline_core::{
    ApiConfiguration, ApiContext, ApiError, ApiResult, ApiSettings, DomainModel,
    DomainModelMapper, ElementType, Expression, ModelMapper, QueryExecutor,
    QueryExpressionContext, QueryExpressionFilter, QueryRequest, QueryResult,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn model() -> DomainModel {
    DomainModel::new()
        .with_entity_set("Test", ElementType::String)
        .with_entity_set("Other", ElementType::String)
        .with_entity_set("Products", ElementType::Json)
        .with_operation("Shop", "TopSellers", ElementType::Json)
}

fn config_with(executor: Arc<dyn QueryExecutor>) -> ApiConfiguration {
    let mut config = ApiConfiguration::new();
    config
        .add_hook_point::<dyn ModelMapper>(Arc::new(DomainModelMapper::new(Arc::new(model()))))
        .unwrap()
        .add_hook_point(executor)
        .unwrap();
    config
}

fn products_store() -> InMemoryQueryExecutor {
    InMemoryQueryExecutor::new()
        .with_rows(
            "Products",
            vec![
                json!({"Id": 1, "Name": "Tea", "Price": 3, "Discontinued": false}),
                json!({"Id": 2, "Name": "Coffee", "Price": 5, "Discontinued": true}),
                json!({"Id": 3, "Name": "Cocoa", "Price": 4, "Discontinued": false}),
            ],
        )
        .with_rows("Test", vec![json!("Test")])
        .with_rows("Other", vec![json!("Other")])
        .with_operation_rows("Shop", "TopSellers", vec![json!({"Name": "Tea"})])
}

/// Replaces any `Test` source with the `Other` source.
struct RedirectTest;

impl QueryExpressionFilter for RedirectTest {
    fn filter(&self, node: &QueryExpressionContext<'_>) -> Option<Expression> {
        if node.model_reference()?.entity_set()? != "Test" {
            return None;
        }
        Some(Expression::source(ElementType::String, "Other", vec![]))
    }
}

// ---------------------------------------------------------------------------
// Deferred sources
// ---------------------------------------------------------------------------

#[test]
fn source_builds_source_call_with_resolved_type() {
    let ctx = ApiContext::new(config_with(Arc::new(StaticQueryExecutor::new(vec![]))).into_shared());
    let source = ctx.source("Test", vec![json!(1), json!("a")]).unwrap();

    let Expression::Call {
        method,
        type_arguments,
        arguments,
    } = source.expression()
    else {
        panic!("expected a call node, got {}", source.expression());
    };
    assert_eq!(method, "Source");
    assert_eq!(type_arguments, &[ElementType::String]);
    assert_eq!(
        arguments,
        &[
            Expression::constant("Test"),
            Expression::constant(json!([1, "a"]))
        ]
    );
    assert_eq!(source.to_string(), source.expression().to_string());
    assert_eq!(source.to_string(), r#"Source<string>("Test", [1,"a"])"#);
}

#[test]
fn typed_source_checks_element_type() {
    let ctx = ApiContext::new(config_with(Arc::new(StaticQueryExecutor::new(vec![]))).into_shared());

    let err = ctx.typed_source::<i64>("Test", vec![]).unwrap_err();
    match err {
        ApiError::TypeMismatch { expected, actual } => {
            assert_eq!(expected, "int64");
            assert_eq!(actual, "string");
        }
        other => panic!("expected TypeMismatch, got {other:?}"),
    }

    let typed = ctx.typed_source::<String>("Test", vec![]).unwrap();
    let untyped = ctx.source("Test", vec![]).unwrap();
    assert_eq!(typed.expression(), untyped.expression());
    assert_eq!(typed.element_type(), untyped.element_type());
}

#[test]
fn unmapped_names_are_rejected() {
    let ctx = ApiContext::new(config_with(Arc::new(StaticQueryExecutor::new(vec![]))).into_shared());
    assert!(matches!(
        ctx.source("Missing", vec![]),
        Err(ApiError::UnmappedElement { name }) if name == "Missing"
    ));
    assert!(matches!(
        ctx.operation_source("Shop", "Missing", vec![]),
        Err(ApiError::UnmappedElement { name }) if name == "Shop.Missing"
    ));

    let bare = ApiContext::new(ApiConfiguration::new().into_shared());
    assert!(matches!(
        bare.source("Test", vec![]),
        Err(ApiError::UnmappedElement { .. })
    ));
}

#[test]
fn deferred_sources_cannot_be_enumerated() {
    let ctx = ApiContext::new(config_with(Arc::new(StaticQueryExecutor::new(vec![]))).into_shared());
    let source = ctx.source("Test", vec![]).unwrap();
    let typed = ctx.typed_source::<String>("Test", vec![]).unwrap();

    for err in [
        source.enumerate().map(|_| ()).unwrap_err(),
        source.execute().map(|_| ()).unwrap_err(),
        typed.enumerate().map(|_| ()).unwrap_err(),
        typed.execute().map(|_| ()).unwrap_err(),
    ] {
        assert!(matches!(err, ApiError::DeferredExecutionViolation { .. }));
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn end_to_end_sequence_and_single() {
    let executor = Arc::new(StaticQueryExecutor::new(vec![json!("Test")]));
    let ctx = ApiContext::new(config_with(executor.clone()).into_shared());
    let cancel = CancellationToken::new();
    let source = ctx.source("Test", vec![]).unwrap();

    let rows = ctx.query(source.clone(), &cancel).await.unwrap();
    assert_eq!(rows.results, vec![json!("Test")]);

    let single = ctx.query(source.clone().single(), &cancel).await.unwrap();
    assert_eq!(single.single_value(), Some(&json!("Test")));

    // The executor only ever sees the sequence part.
    let received = executor.received_expressions();
    assert_eq!(received, vec![source.expression().clone(); 2]);
}

#[tokio::test]
async fn typed_rows_deserialize() {
    let executor = Arc::new(StaticQueryExecutor::new(vec![json!("Test")]));
    let ctx = ApiContext::new(config_with(executor).into_shared());
    let typed = ctx.typed_source::<String>("Test", vec![]).unwrap();
    let rows: Vec<String> = ctx
        .query(typed, &CancellationToken::new())
        .await
        .unwrap()
        .into_typed()
        .unwrap();
    assert_eq!(rows, ["Test"]);
}

#[tokio::test]
async fn rewriting_filter_changes_what_executor_sees() {
    let store = Arc::new(products_store());
    let mut config = config_with(store);
    config
        .add_hook_point::<dyn QueryExpressionFilter>(Arc::new(RedirectTest))
        .unwrap();
    let ctx = ApiContext::new(config.into_shared());
    let cancel = CancellationToken::new();

    let source = ctx.source("Test", vec![]).unwrap();
    let result = ctx.query(source.clone(), &cancel).await.unwrap();
    assert_eq!(result.results, vec![json!("Other")]);

    let single = ctx.query(source.single(), &cancel).await.unwrap();
    assert_eq!(single.single_value(), Some(&json!("Other")));
}

#[tokio::test]
async fn convention_filter_restricts_entity_set() {
    let store = Arc::new(products_store());
    let mut config = config_with(store);
    let conventions = ConventionBasedQueryFilter::new().on_filter("products", |_, products| {
        products.filter(Expression::lambda(
            "p",
            Expression::param("p").member("Discontinued").eq(false),
        ))
    });
    config
        .add_hook_point::<dyn QueryExpressionFilter>(Arc::new(conventions))
        .unwrap();
    let ctx = ApiContext::new(config.into_shared());
    let cancel = CancellationToken::new();

    let products = ctx.source("Products", vec![]).unwrap();
    let by_price = products
        .clone()
        .order_by_descending(Expression::lambda("p", Expression::param("p").member("Price")))
        .select(
            Expression::lambda("p", Expression::param("p").member("Name")),
            ElementType::String,
        );
    let names = ctx.query(by_price, &cancel).await.unwrap();
    assert_eq!(names.results, vec![json!("Cocoa"), json!("Tea")]);

    let count = ctx.query(products.count(), &cancel).await.unwrap();
    assert_eq!(count.single_value(), Some(&json!(2)));

    // Operations are not entity sets and are left alone.
    let top = ctx
        .query(
            ctx.operation_source("Shop", "TopSellers", vec![]).unwrap(),
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(top.len(), 1);
}

#[tokio::test]
async fn total_count_follows_settings_default() {
    let settings = ApiSettings {
        include_total_count: true,
        ..ApiSettings::default()
    };
    let mut config = ApiConfiguration::with_settings(settings);
    config
        .add_hook_point::<dyn ModelMapper>(Arc::new(DomainModelMapper::new(Arc::new(model()))))
        .unwrap()
        .add_hook_point::<dyn QueryExecutor>(Arc::new(products_store()))
        .unwrap();
    let ctx = ApiContext::new(config.into_shared());
    let cancel = CancellationToken::new();

    let page = ctx.source("Products", vec![]).unwrap().skip(1).take(1);
    let result = ctx.query(ctx.request(page.clone()), &cancel).await.unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.total_count, Some(3));

    // Scalar results never carry a total count.
    let any = ctx.query(page.any(), &cancel).await.unwrap();
    assert_eq!(any.single_value(), Some(&json!(true)));
    assert_eq!(any.total_count, None);
}

#[tokio::test]
async fn single_on_many_rows_is_invalid() {
    let executor = Arc::new(StaticQueryExecutor::new(vec![json!("a"), json!("b")]));
    let ctx = ApiContext::new(config_with(executor).into_shared());
    let request = ctx.source("Test", vec![]).unwrap().single();
    let err = ctx
        .query(request, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidQuery(_)));
}

#[tokio::test]
async fn missing_executor_is_reported() {
    let mut config = ApiConfiguration::new();
    config
        .add_hook_point::<dyn ModelMapper>(Arc::new(DomainModelMapper::new(Arc::new(model()))))
        .unwrap();
    let ctx = ApiContext::new(config.into_shared());
    let source = ctx.source("Test", vec![]).unwrap();
    let err = ctx
        .query(source, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NoQueryHandler));
}

#[tokio::test]
async fn filter_depth_limit_applies() {
    let settings = ApiSettings {
        max_filter_depth: 2,
        ..ApiSettings::default()
    };
    let mut config = ApiConfiguration::with_settings(settings);
    config
        .add_hook_point::<dyn ModelMapper>(Arc::new(DomainModelMapper::new(Arc::new(model()))))
        .unwrap()
        .add_hook_point::<dyn QueryExecutor>(Arc::new(products_store()))
        .unwrap()
        .add_hook_point::<dyn QueryExpressionFilter>(Arc::new(RedirectTest))
        .unwrap();
    let ctx = ApiContext::new(config.into_shared());

    let deep = ctx
        .source("Test", vec![])
        .unwrap()
        .filter(Expression::lambda("s", Expression::param("s").ne("x")));
    let err = ctx
        .query(deep, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidQuery(_)));
}

// ---------------------------------------------------------------------------
// Cancellation and timeouts
// ---------------------------------------------------------------------------

struct SlowExecutor;

#[async_trait]
impl QueryExecutor for SlowExecutor {
    async fn execute_query(
        &self,
        _context: &ApiContext,
        _request: QueryRequest,
        _cancel: &CancellationToken,
    ) -> ApiResult<QueryResult> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(QueryResult::new(vec![Value::Null]))
    }
}

#[tokio::test]
async fn cancelled_request_never_reaches_executor() {
    let executor = Arc::new(StaticQueryExecutor::new(vec![json!("Test")]));
    let ctx = ApiContext::new(config_with(executor.clone()).into_shared());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let source = ctx.source("Test", vec![]).unwrap();
    let err = ctx.query(source, &cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(executor.received_expressions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_running_executor() {
    let ctx = ApiContext::new(config_with(Arc::new(SlowExecutor)).into_shared());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        trigger.cancel();
    });

    let source = ctx.source("Test", vec![]).unwrap();
    let err = ctx.query(source, &cancel).await.unwrap_err();
    assert!(matches!(err, ApiError::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn slow_executor_hits_step_timeout() {
    let settings = ApiSettings {
        step_timeout_ms: Some(100),
        ..ApiSettings::default()
    };
    let mut config = ApiConfiguration::with_settings(settings);
    config
        .add_hook_point::<dyn ModelMapper>(Arc::new(DomainModelMapper::new(Arc::new(model()))))
        .unwrap()
        .add_hook_point::<dyn QueryExecutor>(Arc::new(SlowExecutor))
        .unwrap();
    let ctx = ApiContext::new(config.into_shared());

    let source = ctx.source("Test", vec![]).unwrap();
    let err = ctx
        .query(source, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::StepTimeout { limit_ms: 100, .. }
    ));
}
