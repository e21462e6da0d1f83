use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::time;
use super::{DriverError, Result};

pub const REQL_TYPE: &str = "$reql_type$";

/// Longest array an operation may build.
pub const ARRAY_LIMIT: usize = 100_000;

/// Checks a computed array length against [`ARRAY_LIMIT`]; `None` means the
/// length overflowed.
pub fn array_len(len: Option<usize>) -> Result<usize> {
    match len {
        Some(len) if len <= ARRAY_LIMIT => Ok(len),
        _ => Err(DriverError::Runtime(format!("Array over size limit `{}`.", ARRAY_LIMIT))),
    }
}

pub fn number(n: f64) -> Result<Value> {
    if !n.is_finite() {
        return Err(DriverError::Runtime(format!("Non-finite number: {}", n)));
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Ok(Value::from(n as i64))
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .ok_or_else(|| DriverError::Runtime(format!("Non-finite number: {}", n)))
    }
}

pub fn as_number(value: &Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| DriverError::Runtime(format!("Expected type NUMBER but found {}.", type_name(value))))
}

pub fn as_integer(value: &Value) -> Result<i64> {
    let n = as_number(value)?;
    if n.fract() != 0.0 {
        return Err(DriverError::Runtime(format!("Number not an integer: {}", n)));
    }
    Ok(n as i64)
}

pub fn as_str(value: &Value) -> Result<&str> {
    value
        .as_str()
        .ok_or_else(|| DriverError::Runtime(format!("Expected type STRING but found {}.", type_name(value))))
}

pub fn as_object(value: &Value) -> Result<&Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| DriverError::Runtime(format!("Expected type OBJECT but found {}.", type_name(value))))
}

pub fn as_array(value: &Value) -> Result<&Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| DriverError::Runtime(format!("Expected type ARRAY but found {}.", type_name(value))))
}

pub fn truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

pub fn pseudo_type(value: &Value) -> Option<&str> {
    value.as_object().and_then(|object| object.get(REQL_TYPE)).and_then(Value::as_str)
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NULL",
        Value::Bool(_) => "BOOL",
        Value::Number(_) => "NUMBER",
        Value::String(_) => "STRING",
        Value::Array(_) => "ARRAY",
        Value::Object(_) => match pseudo_type(value) {
            Some("TIME") => "PTYPE<TIME>",
            Some("GROUPED_DATA") => "GROUPED_DATA",
            _ => "OBJECT",
        },
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Array(_) => 0,
        Value::Bool(_) => 1,
        Value::Null => 2,
        Value::Number(_) => 3,
        Value::Object(_) if pseudo_type(value) == Some("TIME") => 5,
        Value::Object(_) => 4,
        Value::String(_) => 6,
    }
}

/// Total order used by comparisons, sorting and `between`.
pub fn compare(lhs: &Value, rhs: &Value) -> Ordering {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => a
            .iter()
            .zip(b)
            .map(|(x, y)| compare(x, y))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        (Value::Object(_), Value::Object(_)) if type_rank(lhs) == 5 && type_rank(rhs) == 5 => {
            let a = time::epoch(lhs).unwrap_or(f64::NAN);
            let b = time::epoch(rhs).unwrap_or(f64::NAN);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::Object(a), Value::Object(b)) => {
            let a: Vec<(&String, &Value)> = a.iter().collect();
            let b: Vec<(&String, &Value)> = b.iter().collect();
            a.iter()
                .zip(&b)
                .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| compare(va, vb)))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or_else(|| a.len().cmp(&b.len()))
        }
        _ => type_rank(lhs).cmp(&type_rank(rhs)),
    }
}

pub fn equals(lhs: &Value, rhs: &Value) -> bool {
    compare(lhs, rhs) == Ordering::Equal && type_rank(lhs) == type_rank(rhs)
}

pub fn add(lhs: Value, rhs: Value) -> Result<Value> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => number(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0)),
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
        (Value::Array(a), Value::Array(b)) => Ok(Value::Array([&a[..], &b[..]].concat())),
        (moment @ Value::Object(_), Value::Number(seconds)) if time::is_time(&moment) => {
            time::shift(&moment, seconds.as_f64().unwrap_or(0.0))
        }
        (lhs, rhs) => Err(DriverError::Runtime(format!(
            "Cannot add {} and {}.",
            type_name(&lhs),
            type_name(&rhs)
        ))),
    }
}

pub fn sub(lhs: Value, rhs: Value) -> Result<Value> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => number(a.as_f64().unwrap_or(0.0) - b.as_f64().unwrap_or(0.0)),
        (moment @ Value::Object(_), Value::Number(seconds)) if time::is_time(&moment) => {
            time::shift(&moment, -seconds.as_f64().unwrap_or(0.0))
        }
        (a @ Value::Object(_), b @ Value::Object(_)) if time::is_time(&a) && time::is_time(&b) => {
            number(time::epoch(&a)? - time::epoch(&b)?)
        }
        (lhs, rhs) => Err(DriverError::Runtime(format!(
            "Cannot subtract {} from {}.",
            type_name(&rhs),
            type_name(&lhs)
        ))),
    }
}

pub fn mul(lhs: Value, rhs: Value) -> Result<Value> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => number(a.as_f64().unwrap_or(0.0) * b.as_f64().unwrap_or(0.0)),
        (Value::Array(items), times @ Value::Number(_)) | (times @ Value::Number(_), Value::Array(items)) => {
            let times = usize::try_from(as_integer(&times)?.max(0)).unwrap_or(usize::MAX);
            let len = array_len(items.len().checked_mul(times))?;
            Ok(Value::Array(items.iter().cloned().cycle().take(len).collect()))
        }
        (lhs, rhs) => Err(DriverError::Runtime(format!(
            "Cannot multiply {} and {}.",
            type_name(&lhs),
            type_name(&rhs)
        ))),
    }
}

pub fn div(lhs: Value, rhs: Value) -> Result<Value> {
    let divisor = as_number(&rhs)?;
    if divisor == 0.0 {
        return Err(DriverError::Runtime("Cannot divide by zero.".to_string()));
    }
    number(as_number(&lhs)? / divisor)
}

pub fn modulo(lhs: Value, rhs: Value) -> Result<Value> {
    let divisor = as_integer(&rhs)?;
    if divisor == 0 {
        return Err(DriverError::Runtime("Cannot take a number modulo 0.".to_string()));
    }
    as_integer(&lhs)?
        .checked_rem(divisor)
        .map(Value::from)
        .ok_or_else(|| DriverError::Runtime("Integer overflow in modulo.".to_string()))
}

/// Recursive merge, the right-hand side wins on conflicting keys.
pub fn merge(lhs: Value, rhs: Value) -> Value {
    match (lhs, rhs) {
        (Value::Object(mut base), Value::Object(patch)) if !patch.contains_key(REQL_TYPE) => {
            for (key, value) in patch {
                if pseudo_type(&value) == Some("LITERAL") && value.get("value").is_none() {
                    base.remove(&key);
                    continue;
                }
                let merged = match base.remove(&key) {
                    Some(existing) => merge(existing, value),
                    None => merge(Value::Null, value),
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        // literal() replaces instead of merging
        (_, Value::Object(mut literal)) if literal.get(REQL_TYPE).and_then(Value::as_str) == Some("LITERAL") => {
            literal.remove("value").unwrap_or(Value::Null)
        }
        (_, rhs) => rhs,
    }
}

/// Field selectors are strings, arrays of selectors or nested objects.
pub fn pluck(value: &Value, selectors: &[Value]) -> Result<Value> {
    let object = as_object(value)?;
    let mut result = Map::new();
    for selector in selectors {
        match selector {
            Value::String(field) => {
                if let Some(found) = object.get(field) {
                    result.insert(field.clone(), found.clone());
                }
            }
            Value::Array(nested) => {
                if let Value::Object(picked) = pluck(value, nested)? {
                    result.extend(picked);
                }
            }
            Value::Object(paths) => {
                for (field, inner) in paths {
                    match (object.get(field), inner) {
                        (Some(found), Value::Bool(true)) => {
                            result.insert(field.clone(), found.clone());
                        }
                        (Some(found @ Value::Object(_)), inner) => {
                            result.insert(field.clone(), pluck(found, std::slice::from_ref(inner))?);
                        }
                        _ => {}
                    }
                }
            }
            other => {
                return Err(DriverError::Runtime(format!("Invalid path argument `{}`.", other)));
            }
        }
    }
    Ok(Value::Object(result))
}

pub fn without(value: &Value, selectors: &[Value]) -> Result<Value> {
    let mut object = as_object(value)?.clone();
    for selector in selectors {
        match selector {
            Value::String(field) => {
                object.remove(field);
            }
            Value::Array(nested) => {
                if let Value::Object(rest) = without(&Value::Object(object.clone()), nested)? {
                    object = rest;
                }
            }
            other => {
                return Err(DriverError::Runtime(format!("Invalid path argument `{}`.", other)));
            }
        }
    }
    Ok(Value::Object(object))
}

pub fn has_fields(value: &Value, selectors: &[Value]) -> bool {
    let Some(object) = value.as_object() else { return false };
    selectors.iter().all(|selector| match selector {
        Value::String(field) => object.get(field).map_or(false, |found| !found.is_null()),
        Value::Array(nested) => has_fields(value, nested),
        Value::Object(paths) => paths.iter().all(|(field, inner)| match (object.get(field), inner) {
            (Some(found), Value::Bool(true)) => !found.is_null(),
            (Some(found), inner) => has_fields(found, std::slice::from_ref(inner)),
            (None, _) => false,
        }),
        _ => false,
    })
}

pub fn get_field<'v>(value: &'v Value, field: &str) -> Result<&'v Value> {
    as_object(value)?
        .get(field)
        .ok_or_else(|| DriverError::NotFound(format!("No attribute `{}` in object.", field)))
}

/// Object predicates match when every field matches, recursing into nested objects.
pub fn matches_pattern(row: &Value, pattern: &Value) -> bool {
    match (row, pattern) {
        (Value::Object(row), Value::Object(pattern)) if !pattern.contains_key(REQL_TYPE) => {
            pattern.iter().all(|(key, expected)| row.get(key).map_or(false, |found| matches_pattern(found, expected)))
        }
        (row, pattern) => equals(row, pattern),
    }
}

pub fn distinct(values: Vec<Value>) -> Vec<Value> {
    let mut values = values;
    values.sort_by(compare);
    values.dedup_by(|a, b| equals(a, b));
    values
}

pub fn contains(values: &[Value], needle: &Value) -> bool {
    values.iter().any(|value| equals(value, needle))
}

/// Resolves a possibly negative index against `len`.
pub fn index(index: i64, len: usize) -> Option<usize> {
    let resolved = if index < 0 { len as i64 + index } else { index };
    (0..len as i64).contains(&resolved).then_some(resolved as usize)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn integral_results_stay_integers() {
        assert_eq!(add(json!(12), json!(2)).unwrap(), json!(14));
        assert_eq!(div(json!(12), json!(2)).unwrap(), json!(6));
        assert_eq!(div(json!(1), json!(4)).unwrap(), json!(0.25));
    }

    #[test]
    fn add_concatenates() {
        assert_eq!(add(json!("1"), json!("1")).unwrap(), json!("11"));
        assert_eq!(add(json!([0]), json!([1])).unwrap(), json!([0, 1]));
        assert!(add(json!("1"), json!(1)).is_err());
    }

    #[test]
    fn merge_overwrites_and_recurses() {
        let merged = merge(json!({"foo": 0, "bar": {"a": 1}}), json!({"foo": 1, "bar": {"b": 2}}));
        assert_eq!(merged, json!({"foo": 1, "bar": {"a": 1, "b": 2}}));
    }

    #[test]
    fn ordering_across_types() {
        assert_eq!(compare(&json!([1]), &json!(true)), Ordering::Less);
        assert_eq!(compare(&json!(null), &json!(0)), Ordering::Less);
        assert_eq!(compare(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare(&json!({"a": 1}), &json!("a")), Ordering::Less);
        assert!(equals(&json!(1), &json!(1.0)));
    }

    #[test]
    fn pluck_and_without() {
        let doc = json!({"id": 1, "name": "stan", "num": 3});
        assert_eq!(pluck(&doc, &[json!("num"), json!("name")]).unwrap(), json!({"name": "stan", "num": 3}));
        assert_eq!(without(&doc, &[json!("id")]).unwrap(), json!({"name": "stan", "num": 3}));
    }

    #[test]
    fn object_patterns() {
        let row = json!({"credit": true, "owner": {"name": "wei", "age": 3}});
        assert!(matches_pattern(&row, &json!({"credit": true})));
        assert!(matches_pattern(&row, &json!({"owner": {"name": "wei"}})));
        assert!(!matches_pattern(&row, &json!({"credit": false})));
    }

    #[test]
    fn negative_indices() {
        assert_eq!(index(-1, 3), Some(2));
        assert_eq!(index(3, 3), None);
        assert_eq!(index(-4, 3), None);
    }
}
