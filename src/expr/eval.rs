//! Expression evaluation.
//!
//! [`evaluate`] walks an [`Expression`] depth-first, left to right, against
//! an entity's [`VariableState`] and returns the resulting JSON value plus
//! an [`ExecutionTrace`] with one post-order step per node actually visited.
//! `and` / `or` / `if` short-circuit: branches that are never taken are not
//! evaluated and leave no trace steps, and an unknown operator inside such a
//! branch never raises.
//!
//! ## Coercion rules (pinned)
//!
//! - Falsy values: `null`, `false`, `0`, `""`, `[]`. Everything else is
//!   truthy (objects included).
//! - Numeric coercion accepts numbers and numeric strings. Booleans, null,
//!   arrays and objects in arithmetic or ordering raise
//!   [`ExpressionError::TypeMismatch`].
//! - Loose equality (`==`) compares like-typed values structurally,
//!   number-vs-numeric-string numerically and bool-vs-number via 0/1. An
//!   array or object loosely compared with a scalar is a `TypeMismatch`,
//!   never a silent stringify. Strict equality (`===`) never errors:
//!   differently-shaped values are simply unequal.
//! - Collection lambdas (`map`, `filter`, `reduce`, `all`, `none`, `some`)
//!   see the current element as their variable context; `reduce` sees
//!   `{"current": .., "accumulator": ..}`. An empty `var` path is not a
//!   reference and resolves to null.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::core::state::descend;
use crate::core::VariableState;
use crate::error::ExpressionError;

use super::ast::Expression;

/// One record per visited expression node, in completion order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub step: usize,
    pub operation: String,
    pub input: Value,
    pub output: Value,
}

/// Ordered trace of a single evaluation, for "why did this condition
/// evaluate to X" explanations. Discarded after use.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    steps: Vec<TraceStep>,
}

impl ExecutionTrace {
    /// The recorded steps, oldest first.
    #[must_use]
    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    /// Number of nodes visited.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if nothing was visited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// JSON-logic truthiness: `null`, `false`, `0`, `""` and `[]` are falsy.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Evaluate an expression against a variable context.
///
/// Pure: no I/O, no mutation of the context. Errors abort the evaluation;
/// callers that gate effects treat an error as non-matching (fail closed).
pub fn evaluate(
    expr: &Expression,
    context: &VariableState,
) -> Result<(Value, ExecutionTrace), ExpressionError> {
    let mut evaluator = Evaluator::default();
    let value = evaluator.eval(expr, &Scope::Root(context))?;
    Ok((value, evaluator.trace))
}

/// The closed operator set. Dispatch is an exhaustive match, so adding an
/// operator is a compile-checked change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Operator {
    And,
    Or,
    Not,
    NotNot,
    Eq,
    StrictEq,
    Ne,
    StrictNe,
    Gt,
    Ge,
    Lt,
    Le,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    In,
    Map,
    Filter,
    Reduce,
    All,
    None,
    Some,
    Merge,
    Cat,
    Substr,
    Missing,
    MissingSome,
    If,
}

impl Operator {
    fn from_key(key: &str) -> Option<Self> {
        Option::Some(match key {
            "and" => Self::And,
            "or" => Self::Or,
            "!" | "not" => Self::Not,
            "!!" => Self::NotNot,
            "==" => Self::Eq,
            "===" => Self::StrictEq,
            "!=" => Self::Ne,
            "!==" => Self::StrictNe,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "<" => Self::Lt,
            "<=" => Self::Le,
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "%" => Self::Mod,
            "in" => Self::In,
            "map" => Self::Map,
            "filter" => Self::Filter,
            "reduce" => Self::Reduce,
            "all" => Self::All,
            "none" => Self::None,
            "some" => Self::Some,
            "merge" => Self::Merge,
            "cat" => Self::Cat,
            "substr" => Self::Substr,
            "missing" => Self::Missing,
            "missing_some" => Self::MissingSome,
            "if" | "?:" => Self::If,
            _ => return Option::None,
        })
    }
}

/// Variable lookup scope: the entity context at the root, or the current
/// element inside a collection lambda.
enum Scope<'a> {
    Root(&'a VariableState),
    Element(&'a Value),
}

impl Scope<'_> {
    fn resolve(&self, path: &str) -> Option<&Value> {
        match self {
            Scope::Root(state) => state.resolve_path(path),
            Scope::Element(value) => {
                let mut segments = path.split('.');
                let first = segments.next().filter(|s| !s.is_empty())?;
                let mut current = descend(value, first)?;
                for segment in segments {
                    current = descend(current, segment)?;
                }
                Some(current)
            }
        }
    }
}

#[derive(Default)]
struct Evaluator {
    trace: ExecutionTrace,
}

impl Evaluator {
    fn record(&mut self, operation: &str, input: Value, output: Value) {
        let step = self.trace.steps.len();
        self.trace.steps.push(TraceStep {
            step,
            operation: operation.to_string(),
            input,
            output,
        });
    }

    fn eval(&mut self, expr: &Expression, scope: &Scope) -> Result<Value, ExpressionError> {
        match expr {
            Expression::Literal(value) => {
                self.record("literal", Value::Null, value.clone());
                Ok(value.clone())
            }
            Expression::Var { path, default } => {
                let resolved = match scope.resolve(path) {
                    Some(value) => value.clone(),
                    None => default.clone().unwrap_or(Value::Null),
                };
                self.record("var", Value::String(path.clone()), resolved.clone());
                Ok(resolved)
            }
            Expression::Op { operator, args } => self.eval_op(operator, args, scope),
        }
    }

    fn eval_op(
        &mut self,
        name: &str,
        args: &[Expression],
        scope: &Scope,
    ) -> Result<Value, ExpressionError> {
        let op = Operator::from_key(name)
            .ok_or_else(|| ExpressionError::UnknownOperator(name.to_string()))?;

        let (inputs, output) = match op {
            Operator::And => self.eval_chain(args, scope, name, false)?,
            Operator::Or => self.eval_chain(args, scope, name, true)?,
            Operator::If => self.eval_if(args, scope)?,

            Operator::Not => {
                let value = self.eval_unary(args, scope, name)?;
                let result = Value::Bool(!is_truthy(&value));
                (vec![value], result)
            }
            Operator::NotNot => {
                let value = self.eval_unary(args, scope, name)?;
                let result = Value::Bool(is_truthy(&value));
                (vec![value], result)
            }

            Operator::Eq | Operator::Ne => {
                let (a, b) = self.eval_binary(args, scope, name)?;
                let eq = loose_eq(name, &a, &b)?;
                let result = if op == Operator::Eq { eq } else { !eq };
                (vec![a, b], Value::Bool(result))
            }
            Operator::StrictEq | Operator::StrictNe => {
                let (a, b) = self.eval_binary(args, scope, name)?;
                let eq = strict_value_eq(&a, &b);
                let result = if op == Operator::StrictEq { eq } else { !eq };
                (vec![a, b], Value::Bool(result))
            }

            Operator::Gt | Operator::Ge => {
                let (a, b) = self.eval_binary(args, scope, name)?;
                let ord = order(name, &a, &b)?;
                let result = match op {
                    Operator::Gt => ord == std::cmp::Ordering::Greater,
                    _ => ord != std::cmp::Ordering::Less,
                };
                (vec![a, b], Value::Bool(result))
            }
            Operator::Lt | Operator::Le => self.eval_less(args, scope, name, op)?,

            Operator::Add => {
                let values = self.eval_all(args, scope)?;
                if values.is_empty() {
                    return Err(arity(name, "at least one argument"));
                }
                let mut sum = 0.0;
                for value in &values {
                    sum += to_number(name, value)?;
                }
                let result = number_value(name, sum)?;
                (values, result)
            }
            Operator::Sub => {
                let values = self.eval_all(args, scope)?;
                let result = match values.as_slice() {
                    [value] => number_value(name, -to_number(name, value)?)?,
                    [a, b] => number_value(name, to_number(name, a)? - to_number(name, b)?)?,
                    _ => return Err(arity(name, "one or two arguments")),
                };
                (values, result)
            }
            Operator::Mul => {
                let values = self.eval_all(args, scope)?;
                if values.is_empty() {
                    return Err(arity(name, "at least one argument"));
                }
                let mut product = 1.0;
                for value in &values {
                    product *= to_number(name, value)?;
                }
                let result = number_value(name, product)?;
                (values, result)
            }
            Operator::Div | Operator::Mod => {
                let (a, b) = self.eval_binary(args, scope, name)?;
                let lhs = to_number(name, &a)?;
                let rhs = to_number(name, &b)?;
                if rhs == 0.0 {
                    return Err(ExpressionError::type_mismatch(name, "division by zero"));
                }
                let raw = if op == Operator::Div { lhs / rhs } else { lhs % rhs };
                let result = number_value(name, raw)?;
                (vec![a, b], result)
            }

            Operator::In => {
                let (needle, haystack) = self.eval_binary(args, scope, name)?;
                let result = match &haystack {
                    Value::Array(items) => items.iter().any(|item| strict_value_eq(&needle, item)),
                    Value::String(text) => match &needle {
                        Value::String(sub) => text.contains(sub.as_str()),
                        other => {
                            return Err(ExpressionError::type_mismatch(
                                name,
                                format!("substring test requires a string needle, found {other}"),
                            ))
                        }
                    },
                    other => {
                        return Err(ExpressionError::type_mismatch(
                            name,
                            format!("haystack must be an array or string, found {other}"),
                        ))
                    }
                };
                (vec![needle, haystack], Value::Bool(result))
            }

            Operator::Map | Operator::Filter | Operator::All | Operator::None | Operator::Some => {
                self.eval_collection(args, scope, name, op)?
            }
            Operator::Reduce => self.eval_reduce(args, scope, name)?,

            Operator::Merge => {
                let values = self.eval_all(args, scope)?;
                let mut merged = Vec::new();
                for value in &values {
                    match value {
                        Value::Array(items) => merged.extend(items.iter().cloned()),
                        other => merged.push(other.clone()),
                    }
                }
                (values, Value::Array(merged))
            }
            Operator::Cat => {
                let values = self.eval_all(args, scope)?;
                let mut text = String::new();
                for value in &values {
                    text.push_str(&render_text(name, value)?);
                }
                (values, Value::String(text))
            }
            Operator::Substr => self.eval_substr(args, scope, name)?,

            Operator::Missing => {
                let values = self.eval_all(args, scope)?;
                let keys = missing_keys(name, &values)?;
                let absent = absent_keys(&keys, scope);
                (values, Value::Array(absent))
            }
            Operator::MissingSome => {
                let (min_value, keys_value) = self.eval_binary(args, scope, name)?;
                let min = to_number(name, &min_value)? as usize;
                let keys = missing_keys(name, std::slice::from_ref(&keys_value))?;
                let absent = absent_keys(&keys, scope);
                let present = keys.len().saturating_sub(absent.len());
                let result = if present >= min {
                    Value::Array(Vec::new())
                } else {
                    Value::Array(absent)
                };
                (vec![min_value, keys_value], result)
            }
        };

        self.record(name, Value::Array(inputs), output.clone());
        Ok(output)
    }

    fn eval_all(&mut self, args: &[Expression], scope: &Scope) -> Result<Vec<Value>, ExpressionError> {
        args.iter().map(|arg| self.eval(arg, scope)).collect()
    }

    fn eval_unary(
        &mut self,
        args: &[Expression],
        scope: &Scope,
        name: &str,
    ) -> Result<Value, ExpressionError> {
        match args {
            [arg] => self.eval(arg, scope),
            _ => Err(arity(name, "exactly one argument")),
        }
    }

    fn eval_binary(
        &mut self,
        args: &[Expression],
        scope: &Scope,
        name: &str,
    ) -> Result<(Value, Value), ExpressionError> {
        match args {
            [a, b] => {
                let a = self.eval(a, scope)?;
                let b = self.eval(b, scope)?;
                Ok((a, b))
            }
            _ => Err(arity(name, "exactly two arguments")),
        }
    }

    /// `and` (stop on first falsy) and `or` (stop on first truthy). Returns
    /// the last evaluated argument's value, JSON-logic style; skipped
    /// arguments are never evaluated and never traced.
    fn eval_chain(
        &mut self,
        args: &[Expression],
        scope: &Scope,
        name: &str,
        stop_on_truthy: bool,
    ) -> Result<(Vec<Value>, Value), ExpressionError> {
        if args.is_empty() {
            return Err(arity(name, "at least one argument"));
        }
        let mut inputs = Vec::new();
        let mut last = Value::Null;
        for arg in args {
            last = self.eval(arg, scope)?;
            inputs.push(last.clone());
            if is_truthy(&last) == stop_on_truthy {
                break;
            }
        }
        Ok((inputs, last))
    }

    /// `if` with chained else-if pairs: `[cond, then, cond2, then2, .., else?]`.
    fn eval_if(
        &mut self,
        args: &[Expression],
        scope: &Scope,
    ) -> Result<(Vec<Value>, Value), ExpressionError> {
        let mut inputs = Vec::new();
        let mut index = 0;
        while index + 1 < args.len() {
            let cond = self.eval(&args[index], scope)?;
            let matched = is_truthy(&cond);
            inputs.push(cond);
            if matched {
                let result = self.eval(&args[index + 1], scope)?;
                inputs.push(result.clone());
                return Ok((inputs, result));
            }
            index += 2;
        }
        if index < args.len() {
            let result = self.eval(&args[index], scope)?;
            inputs.push(result.clone());
            return Ok((inputs, result));
        }
        Ok((inputs, Value::Null))
    }

    fn eval_less(
        &mut self,
        args: &[Expression],
        scope: &Scope,
        name: &str,
        op: Operator,
    ) -> Result<(Vec<Value>, Value), ExpressionError> {
        let strict = op == Operator::Lt;
        let in_order = |ord: std::cmp::Ordering| {
            if strict {
                ord == std::cmp::Ordering::Less
            } else {
                ord != std::cmp::Ordering::Greater
            }
        };
        match args.len() {
            2 | 3 => {
                let values = self.eval_all(args, scope)?;
                let mut result = true;
                for pair in values.windows(2) {
                    if !in_order(order(name, &pair[0], &pair[1])?) {
                        result = false;
                        break;
                    }
                }
                Ok((values, Value::Bool(result)))
            }
            _ => Err(arity(name, "two or three arguments")),
        }
    }

    fn eval_collection(
        &mut self,
        args: &[Expression],
        scope: &Scope,
        name: &str,
        op: Operator,
    ) -> Result<(Vec<Value>, Value), ExpressionError> {
        let [source, lambda] = args else {
            return Err(arity(name, "an array expression and a lambda"));
        };
        let items = self.eval_array(source, scope, name)?;

        let result = match op {
            Operator::Map => {
                let mut mapped = Vec::with_capacity(items.len());
                for item in &items {
                    mapped.push(self.eval(lambda, &Scope::Element(item))?);
                }
                Value::Array(mapped)
            }
            Operator::Filter => {
                let mut kept = Vec::new();
                for item in &items {
                    if is_truthy(&self.eval(lambda, &Scope::Element(item))?) {
                        kept.push(item.clone());
                    }
                }
                Value::Array(kept)
            }
            Operator::All => {
                // all([]) is false, matching JSON-logic
                let mut result = !items.is_empty();
                for item in &items {
                    if !is_truthy(&self.eval(lambda, &Scope::Element(item))?) {
                        result = false;
                        break;
                    }
                }
                Value::Bool(result)
            }
            Operator::Some | Operator::None => {
                let mut any = false;
                for item in &items {
                    if is_truthy(&self.eval(lambda, &Scope::Element(item))?) {
                        any = true;
                        break;
                    }
                }
                Value::Bool(if op == Operator::Some { any } else { !any })
            }
            _ => unreachable!("eval_collection called for a non-collection operator"),
        };
        Ok((vec![Value::Array(items)], result))
    }

    fn eval_reduce(
        &mut self,
        args: &[Expression],
        scope: &Scope,
        name: &str,
    ) -> Result<(Vec<Value>, Value), ExpressionError> {
        let [source, lambda, initial] = args else {
            return Err(arity(name, "an array expression, a lambda and an initial value"));
        };
        let items = self.eval_array(source, scope, name)?;
        let mut accumulator = self.eval(initial, scope)?;
        let initial_value = accumulator.clone();

        for item in &items {
            let mut frame = Map::new();
            frame.insert("current".to_string(), item.clone());
            frame.insert("accumulator".to_string(), accumulator);
            let frame = Value::Object(frame);
            accumulator = self.eval(lambda, &Scope::Element(&frame))?;
        }
        Ok((vec![Value::Array(items), initial_value], accumulator))
    }

    fn eval_substr(
        &mut self,
        args: &[Expression],
        scope: &Scope,
        name: &str,
    ) -> Result<(Vec<Value>, Value), ExpressionError> {
        if args.len() != 2 && args.len() != 3 {
            return Err(arity(name, "two or three arguments"));
        }
        let values = self.eval_all(args, scope)?;
        let Value::String(text) = &values[0] else {
            return Err(ExpressionError::type_mismatch(
                name,
                format!("expected a string, found {}", values[0]),
            ));
        };
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len() as i64;

        let start_raw = to_number(name, &values[1])? as i64;
        let start = if start_raw < 0 {
            (total + start_raw).max(0)
        } else {
            start_raw.min(total)
        };

        let end = match values.get(2) {
            Option::Some(len_value) => {
                let len = to_number(name, len_value)? as i64;
                if len < 0 {
                    (total + len).max(start)
                } else {
                    (start + len).min(total)
                }
            }
            Option::None => total,
        };

        let result: String = chars[start as usize..end as usize].iter().collect();
        Ok((values, Value::String(result)))
    }

    fn eval_array(
        &mut self,
        source: &Expression,
        scope: &Scope,
        name: &str,
    ) -> Result<Vec<Value>, ExpressionError> {
        match self.eval(source, scope)? {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(ExpressionError::type_mismatch(
                name,
                format!("expected an array, found {other}"),
            )),
        }
    }
}

fn arity(operator: &str, expected: &str) -> ExpressionError {
    ExpressionError::Malformed(format!("`{operator}` requires {expected}"))
}

/// Numeric coercion: numbers and numeric strings only.
fn to_number(operator: &str, value: &Value) -> Result<f64, ExpressionError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| {
            ExpressionError::type_mismatch(operator, format!("non-finite number {n}"))
        }),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| {
            ExpressionError::type_mismatch(operator, format!("`{s}` is not numeric"))
        }),
        other => Err(ExpressionError::type_mismatch(
            operator,
            format!("expected a number, found {other}"),
        )),
    }
}

/// Build a JSON number, preferring integer representation.
fn number_value(operator: &str, raw: f64) -> Result<Value, ExpressionError> {
    if !raw.is_finite() {
        return Err(ExpressionError::type_mismatch(
            operator,
            "result is not a finite number",
        ));
    }
    if raw.fract() == 0.0 && raw.abs() < i64::MAX as f64 {
        return Ok(Value::Number(Number::from(raw as i64)));
    }
    Number::from_f64(raw)
        .map(Value::Number)
        .ok_or_else(|| ExpressionError::type_mismatch(operator, "result is not a finite number"))
}

/// Structural equality with numbers compared numerically. Used by `===`
/// (where shape mismatch is simply `false`) and by `in` containment.
fn strict_value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| strict_value_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| strict_value_eq(x, y)))
        }
        _ => a == b,
    }
}

/// Loose equality with the pinned coercion rules.
fn loose_eq(operator: &str, a: &Value, b: &Value) -> Result<bool, ExpressionError> {
    match (a, b) {
        (Value::Null, Value::Null) => Ok(true),
        (Value::Null, _) | (_, Value::Null) => Ok(false),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::Number(x), Value::Number(y)) => Ok(x.as_f64() == y.as_f64()),
        (Value::String(x), Value::String(y)) => Ok(x == y),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            Ok(strict_value_eq(a, b))
        }
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            Ok(s.trim().parse::<f64>().ok() == n.as_f64())
        }
        (Value::Bool(x), Value::Number(n)) | (Value::Number(n), Value::Bool(x)) => {
            Ok(n.as_f64() == Option::Some(if *x { 1.0 } else { 0.0 }))
        }
        (Value::Bool(_), Value::String(_)) | (Value::String(_), Value::Bool(_)) => Ok(false),
        // Array/object against a scalar: the pinned answer is an error, not
        // a JS-style stringify. Use `in` for membership tests.
        _ => Err(ExpressionError::type_mismatch(
            operator,
            format!("cannot loosely compare {a} with {b}"),
        )),
    }
}

/// Ordering: two strings lexicographically, otherwise numeric coercion.
fn order(operator: &str, a: &Value, b: &Value) -> Result<std::cmp::Ordering, ExpressionError> {
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return Ok(x.cmp(y));
    }
    let x = to_number(operator, a)?;
    let y = to_number(operator, b)?;
    x.partial_cmp(&y).ok_or_else(|| {
        ExpressionError::type_mismatch(operator, "values are not comparable")
    })
}

/// Render a scalar for `cat`.
fn render_text(operator: &str, value: &Value) -> Result<String, ExpressionError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        other => Err(ExpressionError::type_mismatch(
            operator,
            format!("cannot concatenate {other}"),
        )),
    }
}

/// Interpret evaluated `missing` arguments as a key list.
fn missing_keys(operator: &str, values: &[Value]) -> Result<Vec<String>, ExpressionError> {
    let flat: Vec<&Value> = match values {
        [Value::Array(items)] => items.iter().collect(),
        other => other.iter().collect(),
    };
    flat.into_iter()
        .map(|value| match value {
            Value::String(key) => Ok(key.clone()),
            other => Err(ExpressionError::type_mismatch(
                operator,
                format!("variable names must be strings, found {other}"),
            )),
        })
        .collect()
}

/// The subset of `keys` that resolve to nothing (or null) in `scope`.
fn absent_keys(keys: &[String], scope: &Scope) -> Vec<Value> {
    keys.iter()
        .filter(|key| match scope.resolve(key) {
            Option::Some(value) => value.is_null(),
            Option::None => true,
        })
        .map(|key| Value::String(key.clone()))
        .collect()
}
