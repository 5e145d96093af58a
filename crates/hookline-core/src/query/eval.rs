//! In-memory evaluation of query expressions over JSON rows.
//!
//! Used by the in-memory query executor. Supports the sequence operators
//! `Where`, `OrderBy`, `OrderByDescending`, `Skip`, `Take` and `Select`, with
//! lambda bodies built from member access, constants, comparisons and
//! boolean connectives.

use std::cmp::Ordering;

use serde_json::Value;

use super::expression::{BinaryOp, Expression, SourceCall};
use super::operators::{ORDER_BY, ORDER_BY_DESCENDING, SELECT, SKIP, TAKE, WHERE};
use crate::error::{ApiError, ApiResult};

/// Evaluate a sequence expression, resolving `Source` leaves with `resolve`.
pub fn evaluate_sequence<F>(expression: &Expression, resolve: &F) -> ApiResult<Vec<Value>>
where
    F: Fn(&SourceCall<'_>) -> ApiResult<Vec<Value>>,
{
    if let Some(source) = expression.as_source_call() {
        return resolve(&source);
    }

    let Expression::Call {
        method, arguments, ..
    } = expression
    else {
        return Err(ApiError::InvalidQuery(format!(
            "expected a sequence, found {expression}"
        )));
    };
    let Some((input, rest)) = arguments.split_first() else {
        return Err(ApiError::InvalidQuery(format!("{method} has no input")));
    };
    let rows = evaluate_sequence(input, resolve)?;

    match method.as_str() {
        WHERE => {
            let predicate = single_argument(method, rest)?;
            let mut kept = Vec::with_capacity(rows.len());
            for row in rows {
                if truthy(&apply_lambda(predicate, &row)?) {
                    kept.push(row);
                }
            }
            Ok(kept)
        }
        ORDER_BY | ORDER_BY_DESCENDING => {
            let selector = single_argument(method, rest)?;
            let mut keyed = rows
                .into_iter()
                .map(|row| Ok((apply_lambda(selector, &row)?, row)))
                .collect::<ApiResult<Vec<_>>>()?;
            keyed.sort_by(|(a, _), (b, _)| {
                let ordering = compare_values(a, b).unwrap_or(Ordering::Equal);
                if method == ORDER_BY_DESCENDING {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
            Ok(keyed.into_iter().map(|(_, row)| row).collect())
        }
        SKIP => {
            let count = count_argument(method, rest)?;
            Ok(rows.into_iter().skip(count).collect())
        }
        TAKE => {
            let count = count_argument(method, rest)?;
            Ok(rows.into_iter().take(count).collect())
        }
        SELECT => {
            let projection = single_argument(method, rest)?;
            rows.iter().map(|row| apply_lambda(projection, row)).collect()
        }
        other => Err(ApiError::InvalidQuery(format!(
            "unsupported query operator {other}"
        ))),
    }
}

/// Copy of `expression` with every `Skip` and `Take` removed, used to count
/// the full result set behind a paged query.
pub fn without_paging(expression: &Expression) -> Expression {
    match expression {
        Expression::Call {
            method, arguments, ..
        } if (method == SKIP || method == TAKE) && !arguments.is_empty() => {
            without_paging(&arguments[0])
        }
        other => other
            .clone()
            .try_map_children::<(), _>(&mut |child| Ok(without_paging(&child)))
            .unwrap_or_else(|()| other.clone()),
    }
}

fn single_argument<'a>(method: &str, rest: &'a [Expression]) -> ApiResult<&'a Expression> {
    match rest {
        [argument] => Ok(argument),
        _ => Err(ApiError::InvalidQuery(format!(
            "{method} expects one argument, found {}",
            rest.len()
        ))),
    }
}

fn count_argument(method: &str, rest: &[Expression]) -> ApiResult<usize> {
    match single_argument(method, rest)? {
        Expression::Constant { value } => value
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| ApiError::InvalidQuery(format!("{method} expects a count, found {value}"))),
        other => Err(ApiError::InvalidQuery(format!(
            "{method} expects a constant count, found {other}"
        ))),
    }
}

fn apply_lambda(lambda: &Expression, row: &Value) -> ApiResult<Value> {
    match lambda {
        Expression::Lambda { parameter, body } => evaluate_scalar(body, parameter, row),
        other => Err(ApiError::InvalidQuery(format!(
            "expected a lambda, found {other}"
        ))),
    }
}

fn evaluate_scalar(expression: &Expression, parameter: &str, row: &Value) -> ApiResult<Value> {
    match expression {
        Expression::Constant { value } => Ok(value.clone()),
        Expression::Parameter { name } if name == parameter => Ok(row.clone()),
        Expression::Parameter { name } => Err(ApiError::InvalidQuery(format!(
            "unbound parameter {name}"
        ))),
        Expression::Member { target, name } => {
            let target = evaluate_scalar(target, parameter, row)?;
            Ok(target.get(name).cloned().unwrap_or(Value::Null))
        }
        Expression::Not { operand } => Ok(Value::Bool(!truthy(&evaluate_scalar(
            operand, parameter, row,
        )?))),
        Expression::Binary { op, left, right } => {
            let left = evaluate_scalar(left, parameter, row)?;
            let right = evaluate_scalar(right, parameter, row)?;
            let result = match op {
                BinaryOp::And => truthy(&left) && truthy(&right),
                BinaryOp::Or => truthy(&left) || truthy(&right),
                BinaryOp::Eq => values_equal(&left, &right),
                BinaryOp::Ne => !values_equal(&left, &right),
                BinaryOp::Gt => compare_values(&left, &right) == Some(Ordering::Greater),
                BinaryOp::Ge => matches!(
                    compare_values(&left, &right),
                    Some(Ordering::Greater | Ordering::Equal)
                ),
                BinaryOp::Lt => compare_values(&left, &right) == Some(Ordering::Less),
                BinaryOp::Le => matches!(
                    compare_values(&left, &right),
                    Some(Ordering::Less | Ordering::Equal)
                ),
            };
            Ok(Value::Bool(result))
        }
        other => Err(ApiError::InvalidQuery(format!(
            "unsupported expression in lambda body: {other}"
        ))),
    }
}

fn truthy(value: &Value) -> bool {
    value.as_bool().unwrap_or(false)
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),
        _ => None,
    }
}
