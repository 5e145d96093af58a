//! Query operator names and the scalar operators finished by the pipeline.

use serde_json::Value;

use super::expression::Expression;
use crate::error::{ApiError, ApiResult};

pub const SOURCE: &str = "Source";
pub const WHERE: &str = "Where";
pub const ORDER_BY: &str = "OrderBy";
pub const ORDER_BY_DESCENDING: &str = "OrderByDescending";
pub const SKIP: &str = "Skip";
pub const TAKE: &str = "Take";
pub const SELECT: &str = "Select";

/// Operators that turn a sequence into a single value.
///
/// The pipeline strips a trailing scalar operator before the expression
/// reaches the query executor and applies it to the returned rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarOperator {
    Single,
    SingleOrDefault,
    First,
    FirstOrDefault,
    Count,
    Any,
}

impl ScalarOperator {
    pub fn method_name(&self) -> &'static str {
        match self {
            ScalarOperator::Single => "Single",
            ScalarOperator::SingleOrDefault => "SingleOrDefault",
            ScalarOperator::First => "First",
            ScalarOperator::FirstOrDefault => "FirstOrDefault",
            ScalarOperator::Count => "Count",
            ScalarOperator::Any => "Any",
        }
    }

    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            "Single" => Some(ScalarOperator::Single),
            "SingleOrDefault" => Some(ScalarOperator::SingleOrDefault),
            "First" => Some(ScalarOperator::First),
            "FirstOrDefault" => Some(ScalarOperator::FirstOrDefault),
            "Count" => Some(ScalarOperator::Count),
            "Any" => Some(ScalarOperator::Any),
            _ => None,
        }
    }

    /// Wrap `sequence` in a call to this operator.
    pub fn wrap(&self, sequence: Expression) -> Expression {
        Expression::call(self.method_name(), Vec::new(), vec![sequence])
    }

    /// Scalar operator at the root of `expression`, if any.
    pub fn of(expression: &Expression) -> Option<Self> {
        match expression {
            Expression::Call {
                method, arguments, ..
            } if arguments.len() == 1 => Self::from_method(method),
            _ => None,
        }
    }

    /// Split a trailing scalar operator off `expression`.
    pub fn split(expression: Expression) -> (Expression, Option<Self>) {
        let Some(operator) = Self::of(&expression) else {
            return (expression, None);
        };
        match expression {
            Expression::Call { mut arguments, .. } if arguments.len() == 1 => {
                (arguments.remove(0), Some(operator))
            }
            other => (other, None),
        }
    }

    /// Reduce `rows` to the operator's value.
    pub fn apply(&self, rows: Vec<Value>) -> ApiResult<Value> {
        let count = rows.len();
        let mut rows = rows.into_iter();
        match self {
            ScalarOperator::Single => match (rows.next(), count) {
                (Some(row), 1) => Ok(row),
                _ => Err(ApiError::InvalidQuery(format!(
                    "Single expected exactly one element, found {count}"
                ))),
            },
            ScalarOperator::SingleOrDefault => match count {
                0 | 1 => Ok(rows.next().unwrap_or(Value::Null)),
                _ => Err(ApiError::InvalidQuery(format!(
                    "SingleOrDefault expected at most one element, found {count}"
                ))),
            },
            ScalarOperator::First => rows.next().ok_or_else(|| {
                ApiError::InvalidQuery("First found no elements".to_string())
            }),
            ScalarOperator::FirstOrDefault => Ok(rows.next().unwrap_or(Value::Null)),
            ScalarOperator::Count => Ok(Value::from(count as u64)),
            ScalarOperator::Any => Ok(Value::Bool(count > 0)),
        }
    }
}
