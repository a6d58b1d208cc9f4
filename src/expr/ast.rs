//! Expression tree and wire format.
//!
//! Conditions are written in a restricted JSON-logic-style language. On the
//! wire an expression is a plain JSON tree:
//!
//! - scalars and all-literal arrays are literals,
//! - `{"var": "settlement.population"}` or `{"var": ["path", default]}` is a
//!   variable reference,
//! - any other single-key object is an operator application whose value is
//!   the argument list (a lone non-array argument is wrapped).
//!
//! The parsed [`Expression`] is a closed tagged tree with exactly those
//! three shapes, constructed once and immutable. Operator *names* stay as
//! strings here; they resolve against the closed operator set at evaluation
//! time, so an unrecognized operator inside a branch that is never taken
//! never raises.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::ExpressionError;

/// A node in the expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    /// A literal JSON value (string, number, boolean, null or array).
    Literal(Value),

    /// A variable reference: dotted path plus optional default.
    Var {
        path: String,
        default: Option<Value>,
    },

    /// An operator applied to argument expressions.
    Op {
        operator: String,
        args: Vec<Expression>,
    },
}

impl Expression {
    /// Create a literal node.
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Create a variable reference without a default.
    #[must_use]
    pub fn var(path: impl Into<String>) -> Self {
        Self::Var {
            path: path.into(),
            default: None,
        }
    }

    /// Create a variable reference with a default.
    #[must_use]
    pub fn var_or(path: impl Into<String>, default: impl Into<Value>) -> Self {
        Self::Var {
            path: path.into(),
            default: Some(default.into()),
        }
    }

    /// Create an operator application.
    #[must_use]
    pub fn op(operator: impl Into<String>, args: Vec<Expression>) -> Self {
        Self::Op {
            operator: operator.into(),
            args,
        }
    }

    /// Parse an expression from its JSON wire form.
    ///
    /// Multi-key objects and arrays that mix literals with operator objects
    /// are rejected as [`ExpressionError::Malformed`]; operator argument
    /// lists are the place where sub-expressions nest.
    pub fn parse(value: &Value) -> Result<Self, ExpressionError> {
        match value {
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
                Ok(Self::Literal(value.clone()))
            }
            Value::Array(items) => parse_literal_array(items),
            Value::Object(map) => parse_object(map),
        }
    }

    /// Render back to the JSON wire form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Var { path, default } => {
                let mut map = Map::new();
                let var = match default {
                    Some(d) => Value::Array(vec![Value::String(path.clone()), d.clone()]),
                    None => Value::String(path.clone()),
                };
                map.insert("var".to_string(), var);
                Value::Object(map)
            }
            Self::Op { operator, args } => {
                let mut map = Map::new();
                map.insert(
                    operator.clone(),
                    Value::Array(args.iter().map(Expression::to_value).collect()),
                );
                Value::Object(map)
            }
        }
    }
}

fn parse_literal_array(items: &[Value]) -> Result<Expression, ExpressionError> {
    let mut literals = Vec::with_capacity(items.len());
    for item in items {
        match Expression::parse(item)? {
            Expression::Literal(value) => literals.push(value),
            _ => {
                return Err(ExpressionError::Malformed(
                    "array literal may not contain operator or var expressions".to_string(),
                ))
            }
        }
    }
    Ok(Expression::Literal(Value::Array(literals)))
}

fn parse_object(map: &Map<String, Value>) -> Result<Expression, ExpressionError> {
    if map.len() != 1 {
        return Err(ExpressionError::Malformed(format!(
            "expression object must have exactly one key, found {}",
            map.len()
        )));
    }
    // len() == 1 checked above
    let (key, raw) = map.iter().next().ok_or_else(|| {
        ExpressionError::Malformed("expression object must have exactly one key".to_string())
    })?;

    if key == "var" {
        return parse_var(raw);
    }

    let args = match raw {
        Value::Array(items) => items
            .iter()
            .map(Expression::parse)
            .collect::<Result<Vec<_>, _>>()?,
        single => vec![Expression::parse(single)?],
    };
    Ok(Expression::Op {
        operator: key.clone(),
        args,
    })
}

fn parse_var(raw: &Value) -> Result<Expression, ExpressionError> {
    match raw {
        Value::String(path) => Ok(Expression::Var {
            path: path.clone(),
            default: None,
        }),
        Value::Array(items) => {
            let path = match items.first() {
                Some(Value::String(path)) => path.clone(),
                Some(other) => {
                    return Err(ExpressionError::Malformed(format!(
                        "var path must be a string, found {other}"
                    )))
                }
                None => {
                    return Err(ExpressionError::Malformed(
                        "var array form requires a path".to_string(),
                    ))
                }
            };
            if items.len() > 2 {
                return Err(ExpressionError::Malformed(
                    "var array form takes at most a path and a default".to_string(),
                ));
            }
            Ok(Expression::Var {
                path,
                default: items.get(1).cloned(),
            })
        }
        other => Err(ExpressionError::Malformed(format!(
            "var reference must be a string or [path, default] array, found {other}"
        ))),
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Expression::parse(&value).map_err(DeError::custom)
    }
}
