//! Query expression filter chain.
//!
//! The chain walks the tree top-down. At every node that denotes a model
//! element, filters run in registration order and the first replacement wins;
//! the walk then continues into the replacement's children. Inside a
//! replacement's subtree, a node equal to the node it replaced is left alone,
//! so a filter that wraps its input (e.g. adds a `Where` over the original
//! source) does not fire again on the wrapped copy. Equal nodes elsewhere in
//! the tree, such as both sides of a self-join, are filtered independently.

use std::sync::Arc;

use tracing::debug;

use crate::context::ApiContext;
use crate::error::{ApiError, ApiResult};
use crate::hooks::{QueryExpressionContext, QueryExpressionFilter};
use crate::metrics::METRICS;
use crate::obs::emit_filter_applied;
use crate::query::Expression;

/// Outcome of one filter pass.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredExpression {
    pub expression: Expression,
    /// Number of nodes replaced.
    pub rewrites: usize,
}

/// Run `filters` over `expression`.
///
/// Fails with [`ApiError::InvalidQuery`] when the tree is deeper than
/// `max_depth`.
pub fn apply_filters(
    context: &ApiContext,
    filters: &[Arc<dyn QueryExpressionFilter>],
    expression: Expression,
    max_depth: usize,
) -> ApiResult<FilteredExpression> {
    if filters.is_empty() {
        return Ok(FilteredExpression {
            expression,
            rewrites: 0,
        });
    }

    let mut walker = FilterWalker {
        context,
        filters,
        max_depth,
        enclosing: Vec::new(),
        rewrites: 0,
    };
    let expression = walker.visit(expression, 1)?;
    Ok(FilteredExpression {
        expression,
        rewrites: walker.rewrites,
    })
}

struct FilterWalker<'a> {
    context: &'a ApiContext,
    filters: &'a [Arc<dyn QueryExpressionFilter>],
    max_depth: usize,
    /// Originals replaced on the path from the root to the current node.
    enclosing: Vec<Expression>,
    rewrites: usize,
}

impl FilterWalker<'_> {
    fn visit(&mut self, expression: Expression, depth: usize) -> ApiResult<Expression> {
        if depth > self.max_depth {
            return Err(ApiError::InvalidQuery(format!(
                "expression deeper than {} nodes",
                self.max_depth
            )));
        }

        let (expression, original) = self.filter_node(expression);
        let scoped = original.is_some();
        if let Some(original) = original {
            self.enclosing.push(original);
        }
        let visited = expression.try_map_children(&mut |child| self.visit(child, depth + 1));
        if scoped {
            self.enclosing.pop();
        }
        visited
    }

    /// Returns the node to descend into and, when it was rewritten, the
    /// original it replaced.
    fn filter_node(&mut self, expression: Expression) -> (Expression, Option<Expression>) {
        let Some(reference) = expression.model_reference() else {
            return (expression, None);
        };
        if self.enclosing.contains(&expression) {
            return (expression, None);
        }

        let node = QueryExpressionContext::new(&expression, Some(&reference), self.context);
        let replacement = self.filters.iter().find_map(|filter| filter.filter(&node));

        match replacement {
            Some(replacement) => {
                debug!(reference = %reference, replacement = %replacement, "query node rewritten");
                emit_filter_applied(self.context.id(), &reference);
                METRICS.inc_filters_applied();
                self.rewrites += 1;
                (replacement, Some(expression))
            }
            None => (expression, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfiguration;
    use crate::model::ElementType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps every matching source in `Where(source, x => x.Visible == true)`.
    struct OnlyVisible {
        calls: AtomicUsize,
    }

    impl QueryExpressionFilter for OnlyVisible {
        fn filter(&self, node: &QueryExpressionContext<'_>) -> Option<Expression> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(Expression::call(
                "Where",
                vec![],
                vec![
                    node.expression().clone(),
                    Expression::lambda("x", Expression::param("x").member("Visible").eq(true)),
                ],
            ))
        }
    }

    struct Never;

    impl QueryExpressionFilter for Never {
        fn filter(&self, _node: &QueryExpressionContext<'_>) -> Option<Expression> {
            None
        }
    }

    struct Redirect(&'static str);

    impl QueryExpressionFilter for Redirect {
        fn filter(&self, node: &QueryExpressionContext<'_>) -> Option<Expression> {
            node.model_reference()?.entity_set()?;
            Some(Expression::source(ElementType::String, self.0, vec![]))
        }
    }

    fn context() -> ApiContext {
        ApiContext::new(ApiConfiguration::new().into_shared())
    }

    fn source(name: &str) -> Expression {
        Expression::source(ElementType::String, name, vec![])
    }

    #[test]
    fn test_wrapping_filter_fires_once_per_source() {
        let ctx = context();
        let only_visible = Arc::new(OnlyVisible {
            calls: AtomicUsize::new(0),
        });
        let filters: Vec<Arc<dyn QueryExpressionFilter>> = vec![only_visible.clone()];

        let out = apply_filters(&ctx, &filters, source("Items"), 64).unwrap();
        assert_eq!(out.rewrites, 1);
        assert_eq!(only_visible.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            out.expression.to_string(),
            r#"Where(Source<string>("Items", []), x => (x.Visible == true))"#
        );
    }

    #[test]
    fn test_first_replacement_wins() {
        let ctx = context();
        let filters: Vec<Arc<dyn QueryExpressionFilter>> = vec![
            Arc::new(Never),
            Arc::new(Redirect("First")),
            Arc::new(Redirect("Second")),
        ];
        let out = apply_filters(&ctx, &filters, source("Items"), 64).unwrap();
        assert_eq!(out.expression, source("First"));
        assert_eq!(out.rewrites, 1);
    }

    #[test]
    fn test_opaque_nodes_are_not_filtered() {
        let ctx = context();
        let filters: Vec<Arc<dyn QueryExpressionFilter>> = vec![Arc::new(Redirect("Other"))];
        let expr = Expression::constant("Items");
        let out = apply_filters(&ctx, &filters, expr.clone(), 64).unwrap();
        assert_eq!(out.expression, expr);
        assert_eq!(out.rewrites, 0);
    }

    #[test]
    fn test_nested_sources_are_each_visited() {
        let ctx = context();
        let filters: Vec<Arc<dyn QueryExpressionFilter>> = vec![Arc::new(Redirect("Swapped"))];
        let expr = Expression::call("Concat", vec![], vec![source("A"), source("B")]);
        let out = apply_filters(&ctx, &filters, expr, 64).unwrap();
        assert_eq!(out.rewrites, 2);
        assert_eq!(
            out.expression,
            Expression::call("Concat", vec![], vec![source("Swapped"), source("Swapped")])
        );
    }

    #[test]
    fn test_repeated_source_is_filtered_at_each_occurrence() {
        let ctx = context();
        let only_visible = Arc::new(OnlyVisible {
            calls: AtomicUsize::new(0),
        });
        let filters: Vec<Arc<dyn QueryExpressionFilter>> = vec![only_visible.clone()];
        let self_join = Expression::call("Concat", vec![], vec![source("Items"), source("Items")]);

        let out = apply_filters(&ctx, &filters, self_join, 64).unwrap();
        assert_eq!(out.rewrites, 2);
        assert_eq!(only_visible.calls.load(Ordering::SeqCst), 2);
        let visible = r#"Where(Source<string>("Items", []), x => (x.Visible == true))"#;
        assert_eq!(
            out.expression.to_string(),
            format!("Concat({visible}, {visible})")
        );
    }

    #[test]
    fn test_depth_limit() {
        let ctx = context();
        let filters: Vec<Arc<dyn QueryExpressionFilter>> = vec![Arc::new(Never)];
        let err = apply_filters(&ctx, &filters, source("Items"), 1).unwrap_err();
        assert!(matches!(err, ApiError::InvalidQuery(_)));
    }
}
