//! Provider-agnostic expression tree backing deferred queries.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use super::operators::SOURCE;
use crate::model::{ElementType, ModelReference};

/// Binary operators usable inside lambda bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// A node of a query expression tree.
///
/// Sources and query operators are [`Expression::Call`] nodes whose first
/// argument is the input sequence, e.g.
/// `Where(Source<Product>("Products", []), p => (p.Price > 10))`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Expression {
    Constant {
        value: Value,
    },
    Parameter {
        name: String,
    },
    Member {
        target: Box<Expression>,
        name: String,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Not {
        operand: Box<Expression>,
    },
    Lambda {
        parameter: String,
        body: Box<Expression>,
    },
    Call {
        method: String,
        type_arguments: Vec<ElementType>,
        arguments: Vec<Expression>,
    },
}

/// Decoded view of a `Source` call node.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCall<'a> {
    pub element_type: &'a ElementType,
    pub reference: ModelReference,
    pub arguments: &'a [Value],
}

impl Expression {
    pub fn constant(value: impl Into<Value>) -> Self {
        Expression::Constant {
            value: value.into(),
        }
    }

    pub fn param(name: impl Into<String>) -> Self {
        Expression::Parameter { name: name.into() }
    }

    pub fn lambda(parameter: impl Into<String>, body: Expression) -> Self {
        Expression::Lambda {
            parameter: parameter.into(),
            body: Box::new(body),
        }
    }

    pub fn call(
        method: impl Into<String>,
        type_arguments: Vec<ElementType>,
        arguments: Vec<Expression>,
    ) -> Self {
        Expression::Call {
            method: method.into(),
            type_arguments,
            arguments,
        }
    }

    /// `Source<T>(name, [args])` for a named entity set.
    pub fn source(element_type: ElementType, name: &str, arguments: Vec<Value>) -> Self {
        Expression::call(
            SOURCE,
            vec![element_type],
            vec![
                Expression::constant(name),
                Expression::constant(Value::Array(arguments)),
            ],
        )
    }

    /// `Source<T>(namespace, name, [args])` for a composable operation.
    pub fn operation_source(
        element_type: ElementType,
        namespace: &str,
        name: &str,
        arguments: Vec<Value>,
    ) -> Self {
        Expression::call(
            SOURCE,
            vec![element_type],
            vec![
                Expression::constant(namespace),
                Expression::constant(name),
                Expression::constant(Value::Array(arguments)),
            ],
        )
    }

    pub fn member(self, name: impl Into<String>) -> Self {
        Expression::Member {
            target: Box::new(self),
            name: name.into(),
        }
    }

    pub fn binary(self, op: BinaryOp, right: impl Into<Expression>) -> Self {
        Expression::Binary {
            op,
            left: Box::new(self),
            right: Box::new(right.into()),
        }
    }

    pub fn eq(self, right: impl Into<Expression>) -> Self {
        self.binary(BinaryOp::Eq, right)
    }

    pub fn ne(self, right: impl Into<Expression>) -> Self {
        self.binary(BinaryOp::Ne, right)
    }

    pub fn gt(self, right: impl Into<Expression>) -> Self {
        self.binary(BinaryOp::Gt, right)
    }

    pub fn ge(self, right: impl Into<Expression>) -> Self {
        self.binary(BinaryOp::Ge, right)
    }

    pub fn lt(self, right: impl Into<Expression>) -> Self {
        self.binary(BinaryOp::Lt, right)
    }

    pub fn le(self, right: impl Into<Expression>) -> Self {
        self.binary(BinaryOp::Le, right)
    }

    pub fn and(self, right: impl Into<Expression>) -> Self {
        self.binary(BinaryOp::And, right)
    }

    pub fn or(self, right: impl Into<Expression>) -> Self {
        self.binary(BinaryOp::Or, right)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Expression::Not {
            operand: Box::new(self),
        }
    }

    /// Method name when this node is a call.
    pub fn method_name(&self) -> Option<&str> {
        match self {
            Expression::Call { method, .. } => Some(method),
            _ => None,
        }
    }

    /// Decode a `Source` call node. Any other node yields `None`.
    pub fn as_source_call(&self) -> Option<SourceCall<'_>> {
        let Expression::Call {
            method,
            type_arguments,
            arguments,
        } = self
        else {
            return None;
        };
        if method != SOURCE || type_arguments.len() != 1 {
            return None;
        }

        let literal = |index: usize| match arguments.get(index) {
            Some(Expression::Constant { value }) => Some(value),
            _ => None,
        };
        fn args_of(value: &Value) -> Option<&[Value]> {
            value.as_array().map(Vec::as_slice)
        }

        let (reference, args) = match arguments.len() {
            2 => (
                ModelReference::EntitySet {
                    name: literal(0)?.as_str()?.to_string(),
                },
                args_of(literal(1)?)?,
            ),
            3 => (
                ModelReference::Operation {
                    namespace: literal(0)?.as_str()?.to_string(),
                    name: literal(1)?.as_str()?.to_string(),
                },
                args_of(literal(2)?)?,
            ),
            _ => return None,
        };

        Some(SourceCall {
            element_type: &type_arguments[0],
            reference,
            arguments: args,
        })
    }

    /// Model element this node denotes, or `None` when it is opaque.
    pub fn model_reference(&self) -> Option<ModelReference> {
        self.as_source_call().map(|call| call.reference)
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        1 + match self {
            Expression::Constant { .. } | Expression::Parameter { .. } => 0,
            Expression::Member { target, .. } => target.depth(),
            Expression::Binary { left, right, .. } => left.depth().max(right.depth()),
            Expression::Not { operand } => operand.depth(),
            Expression::Lambda { body, .. } => body.depth(),
            Expression::Call { arguments, .. } => {
                arguments.iter().map(Expression::depth).max().unwrap_or(0)
            }
        }
    }

    /// Rebuild this node with every direct child passed through `f`.
    pub fn try_map_children<E, F>(self, f: &mut F) -> Result<Expression, E>
    where
        F: FnMut(Expression) -> Result<Expression, E>,
    {
        Ok(match self {
            leaf @ (Expression::Constant { .. } | Expression::Parameter { .. }) => leaf,
            Expression::Member { target, name } => Expression::Member {
                target: Box::new(f(*target)?),
                name,
            },
            Expression::Binary { op, left, right } => Expression::Binary {
                op,
                left: Box::new(f(*left)?),
                right: Box::new(f(*right)?),
            },
            Expression::Not { operand } => Expression::Not {
                operand: Box::new(f(*operand)?),
            },
            Expression::Lambda { parameter, body } => Expression::Lambda {
                parameter,
                body: Box::new(f(*body)?),
            },
            Expression::Call {
                method,
                type_arguments,
                arguments,
            } => Expression::Call {
                method,
                type_arguments,
                arguments: arguments
                    .into_iter()
                    .map(|argument| f(argument))
                    .collect::<Result<Vec<_>, E>>()?,
            },
        })
    }
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        Expression::Constant { value }
    }
}

impl From<&str> for Expression {
    fn from(value: &str) -> Self {
        Expression::constant(value)
    }
}

impl From<String> for Expression {
    fn from(value: String) -> Self {
        Expression::constant(value)
    }
}

impl From<i64> for Expression {
    fn from(value: i64) -> Self {
        Expression::constant(value)
    }
}

impl From<f64> for Expression {
    fn from(value: f64) -> Self {
        Expression::constant(value)
    }
}

impl From<bool> for Expression {
    fn from(value: bool) -> Self {
        Expression::constant(value)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Constant { value } => write!(f, "{value}"),
            Expression::Parameter { name } => write!(f, "{name}"),
            Expression::Member { target, name } => write!(f, "{target}.{name}"),
            Expression::Binary { op, left, right } => {
                write!(f, "({left} {} {right})", op.symbol())
            }
            Expression::Not { operand } => write!(f, "!{operand}"),
            Expression::Lambda { parameter, body } => write!(f, "{parameter} => {body}"),
            Expression::Call {
                method,
                type_arguments,
                arguments,
            } => {
                write!(f, "{method}")?;
                if !type_arguments.is_empty() {
                    let names: Vec<String> =
                        type_arguments.iter().map(ToString::to_string).collect();
                    write!(f, "<{}>", names.join(", "))?;
                }
                let rendered: Vec<String> = arguments.iter().map(ToString::to_string).collect();
                write!(f, "({})", rendered.join(", "))
            }
        }
    }
}
