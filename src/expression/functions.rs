//! Built-in functions of the `jp` dialect.

use std::collections::HashMap;

use lazy_static::lazy_static;
use serde_json::{Number, Value};

use super::evaluator::{compare_values, type_name, values_equal};
use super::ExpressionError;

pub type FunctionResult = Result<Value, ExpressionError>;

pub struct Signature {
    pub min_args: usize,
    /// `None` for variadic functions
    pub max_args: Option<usize>,
    pub call: fn(&str, &[Value]) -> FunctionResult,
}

impl Signature {
    fn exact(count: usize, call: fn(&str, &[Value]) -> FunctionResult) -> Self {
        Self {
            min_args: count,
            max_args: Some(count),
            call,
        }
    }

    fn variadic(min_args: usize, call: fn(&str, &[Value]) -> FunctionResult) -> Self {
        Self {
            min_args,
            max_args: None,
            call,
        }
    }
}

lazy_static! {
    static ref FUNCTIONS: HashMap<&'static str, Signature> = {
        let mut m = HashMap::new();
        m.insert("abs", Signature::exact(1, abs));
        m.insert("as_string", Signature::exact(1, as_string));
        m.insert("concat", Signature::variadic(1, concat));
        m.insert("contains", Signature::exact(2, contains));
        m.insert("ends_with", Signature::exact(2, ends_with));
        m.insert("env", Signature::exact(1, env));
        m.insert("join", Signature::exact(2, join));
        m.insert("keys", Signature::exact(1, keys));
        m.insert("length", Signature::exact(1, length));
        m.insert("max", Signature::exact(1, max));
        m.insert("min", Signature::exact(1, min));
        m.insert("not_null", Signature::variadic(1, not_null));
        m.insert("split", Signature::exact(2, split));
        m.insert("starts_with", Signature::exact(2, starts_with));
        m.insert("sum", Signature::exact(1, sum));
        m.insert("to_lower", Signature::exact(1, to_lower));
        m.insert("to_number", Signature::exact(1, to_number));
        m.insert("to_string", Signature::exact(1, to_string));
        m.insert("to_upper", Signature::exact(1, to_upper));
        m.insert("trim_space", Signature::exact(1, trim_space));
        m.insert("type", Signature::exact(1, type_of));
        m.insert("values", Signature::exact(1, values));
        m
    };
}

pub fn lookup(name: &str) -> Option<&'static Signature> {
    FUNCTIONS.get(name)
}

/// Validates that `name` exists and accepts `count` arguments.
pub fn check_call(name: &str, count: usize) -> Result<(), ExpressionError> {
    let signature = lookup(name).ok_or_else(|| ExpressionError::UnknownFunction(name.to_string()))?;
    let too_many = signature.max_args.is_some_and(|max| count > max);
    if count < signature.min_args || too_many {
        let expected = match signature.max_args {
            Some(max) if max == signature.min_args => max.to_string(),
            Some(max) => format!("{} to {}", signature.min_args, max),
            None => format!("at least {}", signature.min_args),
        };
        return Err(ExpressionError::Arity {
            name: name.to_string(),
            expected,
            found: count,
        });
    }
    Ok(())
}

pub fn call(name: &str, args: &[Value]) -> FunctionResult {
    check_call(name, args.len())?;
    match lookup(name) {
        Some(signature) => (signature.call)(name, args),
        None => Err(ExpressionError::UnknownFunction(name.to_string())),
    }
}

fn invalid(function: &str, expected: &str, found: &Value) -> ExpressionError {
    ExpressionError::InvalidType {
        context: format!("{}()", function),
        expected: expected.to_string(),
        found: type_name(found).to_string(),
    }
}

fn string_arg<'a>(function: &str, value: &'a Value) -> Result<&'a str, ExpressionError> {
    value.as_str().ok_or_else(|| invalid(function, "string", value))
}

fn array_arg<'a>(function: &str, value: &'a Value) -> Result<&'a Vec<Value>, ExpressionError> {
    value.as_array().ok_or_else(|| invalid(function, "array", value))
}

fn number_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Value::from(f as i64)
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn abs(name: &str, args: &[Value]) -> FunctionResult {
    match &args[0] {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::from(i.saturating_abs())),
            None => Ok(number_value(n.as_f64().unwrap_or_default().abs())),
        },
        other => Err(invalid(name, "number", other)),
    }
}

fn as_string(_: &str, args: &[Value]) -> FunctionResult {
    Ok(match &args[0] {
        Value::String(s) => Value::String(s.clone()),
        _ => Value::Null,
    })
}

fn concat(name: &str, args: &[Value]) -> FunctionResult {
    let mut out = String::new();
    for arg in args {
        out.push_str(string_arg(name, arg)?);
    }
    Ok(Value::String(out))
}

fn contains(name: &str, args: &[Value]) -> FunctionResult {
    match (&args[0], &args[1]) {
        (Value::String(haystack), Value::String(needle)) => {
            Ok(Value::Bool(haystack.contains(needle.as_str())))
        }
        (Value::String(_), _) => Ok(Value::Bool(false)),
        (Value::Array(items), needle) => Ok(Value::Bool(
            items.iter().any(|item| values_equal(item, needle)),
        )),
        (other, _) => Err(invalid(name, "array or string", other)),
    }
}

fn ends_with(name: &str, args: &[Value]) -> FunctionResult {
    let subject = string_arg(name, &args[0])?;
    let suffix = string_arg(name, &args[1])?;
    Ok(Value::Bool(subject.ends_with(suffix)))
}

fn env(name: &str, args: &[Value]) -> FunctionResult {
    let key = string_arg(name, &args[0])?;
    Ok(Value::String(std::env::var(key).unwrap_or_default()))
}

fn join(name: &str, args: &[Value]) -> FunctionResult {
    let separator = string_arg(name, &args[0])?;
    let parts = array_arg(name, &args[1])?
        .iter()
        .map(|part| string_arg(name, part))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::String(parts.join(separator)))
}

fn keys(name: &str, args: &[Value]) -> FunctionResult {
    match &args[0] {
        Value::Object(map) => Ok(Value::Array(
            map.keys().map(|k| Value::String(k.clone())).collect(),
        )),
        other => Err(invalid(name, "object", other)),
    }
}

fn length(name: &str, args: &[Value]) -> FunctionResult {
    let len = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        other => return Err(invalid(name, "string, array or object", other)),
    };
    Ok(Value::from(len))
}

fn extremum(name: &str, args: &[Value], wanted: std::cmp::Ordering) -> FunctionResult {
    let items = array_arg(name, &args[0])?;
    let mut best: Option<&Value> = None;
    for item in items {
        if !matches!(item, Value::Number(_) | Value::String(_)) {
            return Err(invalid(name, "array of numbers or strings", item));
        }
        best = match best {
            None => Some(item),
            Some(current) => match compare_values(item, current) {
                Some(ordering) if ordering == wanted => Some(item),
                Some(_) => Some(current),
                None => return Err(invalid(name, "array of comparable values", item)),
            },
        };
    }
    Ok(best.cloned().unwrap_or(Value::Null))
}

fn max(name: &str, args: &[Value]) -> FunctionResult {
    extremum(name, args, std::cmp::Ordering::Greater)
}

fn min(name: &str, args: &[Value]) -> FunctionResult {
    extremum(name, args, std::cmp::Ordering::Less)
}

fn not_null(_: &str, args: &[Value]) -> FunctionResult {
    Ok(args
        .iter()
        .find(|arg| !arg.is_null())
        .cloned()
        .unwrap_or(Value::Null))
}

fn split(name: &str, args: &[Value]) -> FunctionResult {
    let subject = string_arg(name, &args[0])?;
    let separator = string_arg(name, &args[1])?;
    Ok(Value::Array(
        subject
            .split(separator)
            .map(|part| Value::String(part.to_string()))
            .collect(),
    ))
}

fn starts_with(name: &str, args: &[Value]) -> FunctionResult {
    let subject = string_arg(name, &args[0])?;
    let prefix = string_arg(name, &args[1])?;
    Ok(Value::Bool(subject.starts_with(prefix)))
}

fn sum(name: &str, args: &[Value]) -> FunctionResult {
    let items = array_arg(name, &args[0])?;
    let mut int_total: Option<i64> = Some(0);
    let mut float_total = 0.0;
    for item in items {
        let n = match item {
            Value::Number(n) => n,
            other => return Err(invalid(name, "array of numbers", other)),
        };
        int_total = match (int_total, n.as_i64()) {
            (Some(total), Some(i)) => total.checked_add(i),
            _ => None,
        };
        float_total += n.as_f64().unwrap_or_default();
    }
    Ok(match int_total {
        Some(total) => Value::from(total),
        None => number_value(float_total),
    })
}

fn to_lower(name: &str, args: &[Value]) -> FunctionResult {
    Ok(Value::String(string_arg(name, &args[0])?.to_lowercase()))
}

fn to_upper(name: &str, args: &[Value]) -> FunctionResult {
    Ok(Value::String(string_arg(name, &args[0])?.to_uppercase()))
}

fn to_number(_: &str, args: &[Value]) -> FunctionResult {
    Ok(match &args[0] {
        Value::Number(n) => Value::Number(n.clone()),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                Value::from(i)
            } else {
                s.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        _ => Value::Null,
    })
}

fn to_string(_: &str, args: &[Value]) -> FunctionResult {
    Ok(match &args[0] {
        Value::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    })
}

fn trim_space(name: &str, args: &[Value]) -> FunctionResult {
    Ok(Value::String(string_arg(name, &args[0])?.trim().to_string()))
}

fn type_of(_: &str, args: &[Value]) -> FunctionResult {
    Ok(Value::String(type_name(&args[0]).to_string()))
}

fn values(name: &str, args: &[Value]) -> FunctionResult {
    match &args[0] {
        Value::Object(map) => Ok(Value::Array(map.values().cloned().collect())),
        other => Err(invalid(name, "object", other)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_check_call() {
        assert!(check_call("length", 1).is_ok());
        assert!(matches!(
            check_call("length", 2),
            Err(ExpressionError::Arity { .. })
        ));
        assert!(matches!(
            check_call("nope", 0),
            Err(ExpressionError::UnknownFunction(_))
        ));
        assert!(check_call("concat", 4).is_ok());
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(call("length", &[json!("héllo")]).unwrap(), json!(5));
        assert_eq!(
            call("join", &[json!("-"), json!(["a", "b"])]).unwrap(),
            json!("a-b")
        );
        assert_eq!(
            call("split", &[json!("a,b"), json!(",")]).unwrap(),
            json!(["a", "b"])
        );
        assert_eq!(call("trim_space", &[json!("  x ")]).unwrap(), json!("x"));
        assert_eq!(call("to_upper", &[json!("ab")]).unwrap(), json!("AB"));
        assert_eq!(
            call("concat", &[json!("a"), json!("b"), json!("c")]).unwrap(),
            json!("abc")
        );
        assert!(call("starts_with", &[json!(1), json!("a")]).is_err());
    }

    #[test]
    fn test_collection_functions() {
        assert_eq!(call("sum", &[json!([1, 2, 3])]).unwrap(), json!(6));
        assert_eq!(call("max", &[json!([1, 5, 3])]).unwrap(), json!(5));
        assert_eq!(call("min", &[json!(["b", "a"])]).unwrap(), json!("a"));
        assert_eq!(call("max", &[json!([])]).unwrap(), Value::Null);
        assert_eq!(
            call("contains", &[json!([1, 2]), json!(2)]).unwrap(),
            json!(true)
        );
        assert_eq!(
            call("not_null", &[Value::Null, json!("x")]).unwrap(),
            json!("x")
        );
        assert_eq!(call("keys", &[json!({"a": 1})]).unwrap(), json!(["a"]));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call("to_number", &[json!("42")]).unwrap(), json!(42));
        assert_eq!(call("to_number", &[json!("x")]).unwrap(), Value::Null);
        assert_eq!(call("to_string", &[json!(3)]).unwrap(), json!("3"));
        assert_eq!(call("as_string", &[json!(3)]).unwrap(), Value::Null);
        assert_eq!(call("type", &[json!({})]).unwrap(), json!("object"));
        assert_eq!(call("abs", &[json!(-4)]).unwrap(), json!(4));
    }
}
