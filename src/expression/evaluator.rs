use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

use super::ast::{BinaryOperator, Expr};
use super::functions;
use super::ExpressionError;
use crate::bindings::Bindings;

pub type EvalResult<T> = Result<T, ExpressionError>;

pub struct Evaluator<'a> {
    bindings: &'a Bindings,
}

impl<'a> Evaluator<'a> {
    pub fn new(bindings: &'a Bindings) -> Self {
        Self { bindings }
    }

    pub fn eval(&self, expr: &Expr, current: &Value) -> EvalResult<Value> {
        match expr {
            Expr::Current => Ok(current.clone()),
            Expr::Field(name) => Ok(current.get(name).cloned().unwrap_or(Value::Null)),
            Expr::Variable(name) => self
                .bindings
                .get(name)
                .cloned()
                .ok_or_else(|| ExpressionError::UndefinedVariable(name.clone())),
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Subexpression(lhs, rhs) => {
                let base = self.eval(lhs, current)?;
                if base.is_null() {
                    return Ok(Value::Null);
                }
                self.eval(rhs, &base)
            }
            Expr::Index(inner, index) => {
                let base = self.eval(inner, current)?;
                Ok(index_value(&base, *index))
            }
            Expr::Values(inner) => match self.eval(inner, current)? {
                Value::Object(map) => Ok(Value::Array(map.into_iter().map(|(_, v)| v).collect())),
                _ => Ok(Value::Null),
            },
            Expr::Projection { base, filter, rhs } => {
                let items = match self.eval(base, current)? {
                    Value::Array(items) => items,
                    _ => return Ok(Value::Null),
                };
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(filter) = filter {
                        if !is_truthy(&self.eval(filter, &item)?) {
                            continue;
                        }
                    }
                    let projected = self.eval(rhs, &item)?;
                    if !projected.is_null() {
                        out.push(projected);
                    }
                }
                Ok(Value::Array(out))
            }
            Expr::Pipe(lhs, rhs) => {
                let base = self.eval(lhs, current)?;
                self.eval(rhs, &base)
            }
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right, current),
            Expr::Not(inner) => Ok(Value::Bool(!is_truthy(&self.eval(inner, current)?))),
            Expr::Negate(inner) => match self.eval(inner, current)? {
                Value::Number(n) => match n.as_i64().and_then(i64::checked_neg) {
                    Some(i) => Ok(Value::from(i)),
                    None => Ok(float_value(-n.as_f64().unwrap_or_default())),
                },
                other => Err(ExpressionError::InvalidType {
                    context: "unary -".to_string(),
                    expected: "number".to_string(),
                    found: type_name(&other).to_string(),
                }),
            },
            Expr::FunctionCall { name, arguments } => {
                let args = arguments
                    .iter()
                    .map(|argument| self.eval(argument, current))
                    .collect::<EvalResult<Vec<_>>>()?;
                functions::call(name, &args)
            }
            Expr::MultiList(items) => {
                if current.is_null() {
                    return Ok(Value::Null);
                }
                let values = items
                    .iter()
                    .map(|item| self.eval(item, current))
                    .collect::<EvalResult<Vec<_>>>()?;
                Ok(Value::Array(values))
            }
            Expr::MultiHash(entries) => {
                if current.is_null() {
                    return Ok(Value::Null);
                }
                let mut map = Map::new();
                for (key, value) in entries {
                    map.insert(key.clone(), self.eval(value, current)?);
                }
                Ok(Value::Object(map))
            }
        }
    }

    fn eval_binary(
        &self,
        op: BinaryOperator,
        left: &Expr,
        right: &Expr,
        current: &Value,
    ) -> EvalResult<Value> {
        let lhs = self.eval(left, current)?;
        match op {
            BinaryOperator::And if !is_truthy(&lhs) => return Ok(lhs),
            BinaryOperator::Or if is_truthy(&lhs) => return Ok(lhs),
            BinaryOperator::And | BinaryOperator::Or => return self.eval(right, current),
            _ => {}
        }
        let rhs = self.eval(right, current)?;
        match op {
            BinaryOperator::Equal => Ok(Value::Bool(values_equal(&lhs, &rhs))),
            BinaryOperator::NotEqual => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
            BinaryOperator::Less
            | BinaryOperator::LessEqual
            | BinaryOperator::Greater
            | BinaryOperator::GreaterEqual => Ok(match compare_values(&lhs, &rhs) {
                Some(ordering) => Value::Bool(match op {
                    BinaryOperator::Less => ordering == Ordering::Less,
                    BinaryOperator::LessEqual => ordering != Ordering::Greater,
                    BinaryOperator::Greater => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                }),
                None => Value::Null,
            }),
            _ => arithmetic(op, &lhs, &rhs),
        }
    }
}

/// Evaluates `expr` against `input` with the given bindings.
pub fn evaluate(expr: &Expr, input: &Value, bindings: &Bindings) -> EvalResult<Value> {
    Evaluator::new(bindings).eval(expr, input)
}

fn index_value(base: &Value, index: i64) -> Value {
    let items = match base {
        Value::Array(items) => items,
        _ => return Value::Null,
    };
    let resolved = if index < 0 {
        items.len() as i64 + index
    } else {
        index
    };
    if resolved < 0 {
        return Value::Null;
    }
    items.get(resolved as usize).cloned().unwrap_or(Value::Null)
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn arithmetic(op: BinaryOperator, lhs: &Value, rhs: &Value) -> EvalResult<Value> {
    let (l, r) = match (lhs, rhs) {
        (Value::Number(l), Value::Number(r)) => (l, r),
        _ => {
            let offending = if lhs.is_number() { rhs } else { lhs };
            return Err(ExpressionError::InvalidType {
                context: format!("operator {}", op),
                expected: "number".to_string(),
                found: type_name(offending).to_string(),
            });
        }
    };

    if let (Some(a), Some(b)) = (l.as_i64(), r.as_i64()) {
        let exact = match op {
            BinaryOperator::Add => a.checked_add(b),
            BinaryOperator::Subtract => a.checked_sub(b),
            BinaryOperator::Multiply => a.checked_mul(b),
            BinaryOperator::Divide if a.checked_rem(b) == Some(0) => a.checked_div(b),
            BinaryOperator::Modulo if b != 0 => a.checked_rem(b),
            _ => None,
        };
        if let Some(result) = exact {
            return Ok(Value::from(result));
        }
    }

    let a = l.as_f64().unwrap_or_default();
    let b = r.as_f64().unwrap_or_default();
    if matches!(op, BinaryOperator::Divide | BinaryOperator::Modulo) && b == 0.0 {
        return Err(ExpressionError::Evaluation("division by zero".to_string()));
    }
    Ok(float_value(match op {
        BinaryOperator::Add => a + b,
        BinaryOperator::Subtract => a - b,
        BinaryOperator::Multiply => a * b,
        BinaryOperator::Divide => a / b,
        _ => a % b,
    }))
}

/// `false`, `null`, and empty strings, arrays and objects are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Number(_) => true,
    }
}

/// Deep equality where `1` and `1.0` are the same number.
pub fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => lhs == rhs,
    }
}

/// Ordering for numbers and strings, `None` for anything else.
pub fn compare_values(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
