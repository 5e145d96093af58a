//! Per-entity-set query filters registered by name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::context::ApiContext;
use crate::hooks::{QueryExpressionContext, QueryExpressionFilter};
use crate::query::{Expression, QuerySource};

type FilterFn = dyn Fn(&ApiContext, QuerySource) -> QuerySource + Send + Sync;

/// Query filter dispatching on entity set name.
///
/// Each entity set may have one handler; names match case-insensitively and
/// a later registration for the same name replaces the earlier one. A handler
/// receives the visited source and returns the source to execute instead.
/// Returning the input unchanged means "no rewrite".
///
/// ```
/// use hookline_core::conventions::ConventionBasedQueryFilter;
/// use hookline_core::Expression;
///
/// let filter = ConventionBasedQueryFilter::new().on_filter("Products", |_ctx, products| {
///     products.filter(Expression::lambda(
///         "p",
///         Expression::param("p").member("Discontinued").eq(false),
///     ))
/// });
/// assert!(filter.handles("products"));
/// ```
#[derive(Default, Clone)]
pub struct ConventionBasedQueryFilter {
    handlers: HashMap<String, Arc<FilterFn>>,
}

impl ConventionBasedQueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the filter for entity set `entity_set`.
    pub fn on_filter<F>(mut self, entity_set: &str, handler: F) -> Self
    where
        F: Fn(&ApiContext, QuerySource) -> QuerySource + Send + Sync + 'static,
    {
        self.handlers
            .insert(entity_set.to_lowercase(), Arc::new(handler));
        self
    }

    /// Register a filter bound to state `S` from the context property bag.
    ///
    /// When the bag holds no `S` the filter is skipped.
    pub fn on_filter_with<S, F>(self, entity_set: &str, handler: F) -> Self
    where
        S: Send + Sync + 'static,
        F: Fn(&S, QuerySource) -> QuerySource + Send + Sync + 'static,
    {
        self.on_filter(entity_set, move |context, source| {
            match context.properties().get::<S>() {
                Some(state) => handler(state, source),
                None => source,
            }
        })
    }

    /// Whether a handler is registered for `entity_set`.
    pub fn handles(&self, entity_set: &str) -> bool {
        self.handlers.contains_key(&entity_set.to_lowercase())
    }
}

impl QueryExpressionFilter for ConventionBasedQueryFilter {
    fn filter(&self, node: &QueryExpressionContext<'_>) -> Option<Expression> {
        let entity_set = node.model_reference()?.entity_set()?;
        let handler = self.handlers.get(&entity_set.to_lowercase())?;
        let call = node.expression().as_source_call()?;

        let input = QuerySource::from_expression(call.element_type.clone(), node.expression().clone());
        let output = handler(node.api(), input);

        if output.element_type() != call.element_type {
            warn!(
                entity_set = %entity_set,
                expected = %call.element_type,
                actual = %output.element_type(),
                "convention filter changed the element type; ignoring it"
            );
            return None;
        }
        if output.expression() == node.expression() {
            return None;
        }
        Some(output.into_expression())
    }
}

impl fmt::Debug for ConventionBasedQueryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("ConventionBasedQueryFilter")
            .field("entity_sets", &names)
            .finish()
    }
}
