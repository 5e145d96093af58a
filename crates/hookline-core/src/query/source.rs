//! Deferred query sources.
//!
//! A source is an expression tree plus the element type of its rows. It can
//! be composed with query operators but never enumerated directly: rows only
//! come out of the query pipeline.

use std::fmt;
use std::marker::PhantomData;

use serde_json::Value;
use tracing::debug;

use super::expression::Expression;
use super::operators::{ScalarOperator, ORDER_BY, ORDER_BY_DESCENDING, SELECT, SKIP, TAKE, WHERE};
use super::request::QueryRequest;
use crate::context::ApiContext;
use crate::error::{ApiError, ApiResult};
use crate::hooks::ModelMapper;
use crate::model::{Element, ElementType, ModelReference};

/// Untyped deferred query.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySource {
    element_type: ElementType,
    expression: Expression,
}

impl QuerySource {
    /// Wrap an existing expression. Nothing is resolved against the model.
    pub fn from_expression(element_type: ElementType, expression: Expression) -> Self {
        Self {
            element_type,
            expression,
        }
    }

    pub fn element_type(&self) -> &ElementType {
        &self.element_type
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn into_expression(self) -> Expression {
        self.expression
    }

    /// Model element of the root node, if it is a source call.
    pub fn model_reference(&self) -> Option<ModelReference> {
        self.expression.model_reference()
    }

    /// Always fails: a deferred query cannot be iterated.
    pub fn enumerate(&self) -> ApiResult<std::vec::IntoIter<Value>> {
        Err(ApiError::DeferredExecutionViolation {
            operation: "enumerated",
        })
    }

    /// Always fails: a deferred query cannot be executed outside the pipeline.
    pub fn execute(&self) -> ApiResult<Value> {
        Err(ApiError::DeferredExecutionViolation {
            operation: "executed",
        })
    }

    /// Keep rows for which `predicate` (a lambda) holds.
    pub fn filter(self, predicate: Expression) -> Self {
        self.compose(WHERE, vec![predicate])
    }

    pub fn order_by(self, key: Expression) -> Self {
        self.compose(ORDER_BY, vec![key])
    }

    pub fn order_by_descending(self, key: Expression) -> Self {
        self.compose(ORDER_BY_DESCENDING, vec![key])
    }

    pub fn skip(self, count: u64) -> Self {
        self.compose(SKIP, vec![Expression::constant(count)])
    }

    pub fn take(self, count: u64) -> Self {
        self.compose(TAKE, vec![Expression::constant(count)])
    }

    /// Project each row through `projection`, yielding rows of `element_type`.
    pub fn select(self, projection: Expression, element_type: ElementType) -> Self {
        let expression = Expression::call(
            SELECT,
            vec![element_type.clone()],
            vec![self.expression, projection],
        );
        Self {
            element_type,
            expression,
        }
    }

    pub fn single(self) -> QueryRequest {
        self.scalar(ScalarOperator::Single)
    }

    pub fn single_or_default(self) -> QueryRequest {
        self.scalar(ScalarOperator::SingleOrDefault)
    }

    pub fn first(self) -> QueryRequest {
        self.scalar(ScalarOperator::First)
    }

    pub fn first_or_default(self) -> QueryRequest {
        self.scalar(ScalarOperator::FirstOrDefault)
    }

    pub fn count(self) -> QueryRequest {
        self.scalar(ScalarOperator::Count)
    }

    pub fn any(self) -> QueryRequest {
        self.scalar(ScalarOperator::Any)
    }

    fn compose(self, method: &str, mut arguments: Vec<Expression>) -> Self {
        arguments.insert(0, self.expression);
        Self {
            expression: Expression::call(method, Vec::new(), arguments),
            element_type: self.element_type,
        }
    }

    fn scalar(self, operator: ScalarOperator) -> QueryRequest {
        let expression = operator.wrap(self.expression);
        QueryRequest::new(QuerySource::from_expression(self.element_type, expression))
    }
}

impl fmt::Display for QuerySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}

/// Deferred query whose rows deserialize to `T`.
pub struct TypedSource<T> {
    inner: QuerySource,
    _rows: PhantomData<fn() -> T>,
}

impl<T> TypedSource<T> {
    fn wrap(inner: QuerySource) -> Self {
        Self {
            inner,
            _rows: PhantomData,
        }
    }

    pub fn as_untyped(&self) -> &QuerySource {
        &self.inner
    }

    pub fn into_untyped(self) -> QuerySource {
        self.inner
    }

    pub fn element_type(&self) -> &ElementType {
        self.inner.element_type()
    }

    pub fn expression(&self) -> &Expression {
        self.inner.expression()
    }

    /// Always fails: a deferred query cannot be iterated.
    pub fn enumerate(&self) -> ApiResult<std::vec::IntoIter<T>> {
        Err(ApiError::DeferredExecutionViolation {
            operation: "enumerated",
        })
    }

    /// Always fails: a deferred query cannot be executed outside the pipeline.
    pub fn execute(&self) -> ApiResult<T> {
        Err(ApiError::DeferredExecutionViolation {
            operation: "executed",
        })
    }

    pub fn filter(self, predicate: Expression) -> Self {
        Self::wrap(self.inner.filter(predicate))
    }

    pub fn order_by(self, key: Expression) -> Self {
        Self::wrap(self.inner.order_by(key))
    }

    pub fn order_by_descending(self, key: Expression) -> Self {
        Self::wrap(self.inner.order_by_descending(key))
    }

    pub fn skip(self, count: u64) -> Self {
        Self::wrap(self.inner.skip(count))
    }

    pub fn take(self, count: u64) -> Self {
        Self::wrap(self.inner.take(count))
    }

    /// Project each row into `U`.
    pub fn select<U: Element>(self, projection: Expression) -> TypedSource<U> {
        TypedSource::wrap(self.inner.select(projection, U::element_type()))
    }

    pub fn single(self) -> QueryRequest {
        self.inner.single()
    }

    pub fn single_or_default(self) -> QueryRequest {
        self.inner.single_or_default()
    }

    pub fn first(self) -> QueryRequest {
        self.inner.first()
    }

    pub fn first_or_default(self) -> QueryRequest {
        self.inner.first_or_default()
    }

    pub fn count(self) -> QueryRequest {
        self.inner.count()
    }

    pub fn any(self) -> QueryRequest {
        self.inner.any()
    }
}

impl<T> From<TypedSource<T>> for QuerySource {
    fn from(source: TypedSource<T>) -> Self {
        source.inner
    }
}

impl<T> Clone for TypedSource<T> {
    fn clone(&self) -> Self {
        Self::wrap(self.inner.clone())
    }
}

impl<T> fmt::Debug for TypedSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypedSource").field(&self.inner).finish()
    }
}

impl<T> fmt::Display for TypedSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

fn mapper(context: &ApiContext, name: &str) -> ApiResult<std::sync::Arc<dyn ModelMapper>> {
    context
        .get_hook_point::<dyn ModelMapper>()
        .ok_or_else(|| ApiError::UnmappedElement {
            name: name.to_string(),
        })
}

/// Build a source over the entity set `name`.
pub fn source(context: &ApiContext, name: &str, arguments: Vec<Value>) -> ApiResult<QuerySource> {
    let element_type = mapper(context, name)?
        .try_resolve(context, name)
        .ok_or_else(|| ApiError::UnmappedElement {
            name: name.to_string(),
        })?;
    debug!(element = %name, element_type = %element_type, "source resolved");
    Ok(QuerySource::from_expression(
        element_type.clone(),
        Expression::source(element_type, name, arguments),
    ))
}

/// Build a source over the composable operation `namespace.name`.
pub fn operation_source(
    context: &ApiContext,
    namespace: &str,
    name: &str,
    arguments: Vec<Value>,
) -> ApiResult<QuerySource> {
    let qualified = format!("{namespace}.{name}");
    let element_type = mapper(context, &qualified)?
        .try_resolve_operation(context, namespace, name)
        .ok_or(ApiError::UnmappedElement { name: qualified })?;
    debug!(namespace = %namespace, element = %name, element_type = %element_type, "operation source resolved");
    Ok(QuerySource::from_expression(
        element_type.clone(),
        Expression::operation_source(element_type, namespace, name, arguments),
    ))
}

/// Typed variant of [`source`]; fails if `T` disagrees with the model.
pub fn typed_source<T: Element>(
    context: &ApiContext,
    name: &str,
    arguments: Vec<Value>,
) -> ApiResult<TypedSource<T>> {
    check_element_type::<T>(source(context, name, arguments)?)
}

/// Typed variant of [`operation_source`].
pub fn typed_operation_source<T: Element>(
    context: &ApiContext,
    namespace: &str,
    name: &str,
    arguments: Vec<Value>,
) -> ApiResult<TypedSource<T>> {
    check_element_type::<T>(operation_source(context, namespace, name, arguments)?)
}

fn check_element_type<T: Element>(source: QuerySource) -> ApiResult<TypedSource<T>> {
    let expected = T::element_type();
    if source.element_type() != &expected {
        return Err(ApiError::TypeMismatch {
            expected: expected.to_string(),
            actual: source.element_type().to_string(),
        });
    }
    Ok(TypedSource::wrap(source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_source() -> QuerySource {
        QuerySource::from_expression(
            ElementType::String,
            Expression::source(ElementType::String, "Test", vec![]),
        )
    }

    #[test]
    fn test_enumeration_is_forbidden() {
        let source = test_source();
        assert!(matches!(
            source.enumerate(),
            Err(ApiError::DeferredExecutionViolation {
                operation: "enumerated"
            })
        ));
        assert!(matches!(
            source.execute(),
            Err(ApiError::DeferredExecutionViolation { .. })
        ));

        let typed: TypedSource<String> = TypedSource::wrap(source);
        assert!(matches!(
            typed.enumerate(),
            Err(ApiError::DeferredExecutionViolation { .. })
        ));
        assert!(matches!(
            typed.execute(),
            Err(ApiError::DeferredExecutionViolation { .. })
        ));
    }

    #[test]
    fn test_composition_wraps_previous_expression() {
        let composed = test_source()
            .filter(Expression::lambda("s", Expression::param("s").ne("x")))
            .order_by(Expression::lambda("s", Expression::param("s")))
            .skip(1)
            .take(2);
        assert_eq!(
            composed.to_string(),
            r#"Take(Skip(OrderBy(Where(Source<string>("Test", []), s => (s != "x")), s => s), 1), 2)"#
        );
        assert_eq!(composed.element_type(), &ElementType::String);
        assert!(composed.model_reference().is_none());
    }

    #[test]
    fn test_scalar_operator_builds_request() {
        let request = test_source().single();
        assert_eq!(
            request.expression().to_string(),
            r#"Single(Source<string>("Test", []))"#
        );
        assert!(!request.include_total_count());
    }

    #[test]
    fn test_typed_select_changes_element_type() {
        let typed: TypedSource<serde_json::Value> = TypedSource::wrap(QuerySource::from_expression(
            ElementType::Json,
            Expression::source(ElementType::Json, "Rows", vec![json!(1)]),
        ));
        let names: TypedSource<String> =
            typed.select(Expression::lambda("r", Expression::param("r").member("Name")));
        assert_eq!(names.element_type(), &ElementType::String);
        assert_eq!(
            names.to_string(),
            r#"Select<string>(Source<json>("Rows", [1]), r => r.Name)"#
        );
    }
}
