//! Built-in scalars and their input and output coercion rules.

use std::sync::Arc;

use serde_json::{Number, Value};

use super::{inspect, ConstValue, ScalarType};

pub(super) const BUILT_IN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

pub(super) fn built_in(name: &str) -> Option<ScalarType> {
    let (serialize, parse_value, parse_literal): (
        fn(&Value) -> Result<Value, String>,
        fn(&Value) -> Result<Value, String>,
        fn(&ConstValue) -> Result<Value, String>,
    ) = match name {
        "Int" => (serialize_int, parse_int, parse_int_literal),
        "Float" => (serialize_float, parse_float, parse_float_literal),
        "String" => (serialize_string, parse_string, parse_string_literal),
        "Boolean" => (serialize_boolean, parse_boolean, parse_boolean_literal),
        "ID" => (serialize_id, parse_id, parse_id_literal),
        _ => return None,
    };

    Some(ScalarType {
        name: name.to_string(),
        serialize: Arc::new(serialize),
        parse_value: Arc::new(parse_value),
        parse_literal: Arc::new(parse_literal),
    })
}

/// Scalar without custom coercion: values pass through unchanged.
pub(super) fn passthrough(name: &str) -> ScalarType {
    ScalarType {
        name: name.to_string(),
        serialize: Arc::new(|value| Ok(value.clone())),
        parse_value: Arc::new(|value| Ok(value.clone())),
        parse_literal: Arc::new(literal_to_json),
    }
}

pub(super) fn literal_to_json(value: &ConstValue) -> Result<Value, String> {
    value.clone().into_json().map_err(|error| error.to_string())
}

fn int_from_f64(value: f64) -> Option<Result<i32, ()>> {
    if !value.is_finite() || value.fract() != 0.0 {
        return None;
    }
    if value > f64::from(i32::MAX) || value < f64::from(i32::MIN) {
        return Some(Err(()));
    }
    Some(Ok(value as i32))
}

fn serialize_int(value: &Value) -> Result<Value, String> {
    let number = match value {
        Value::Bool(boolean) => return Ok(Value::from(i32::from(*boolean))),
        Value::Number(number) => number.as_f64(),
        Value::String(string) if !string.is_empty() => string.parse::<f64>().ok(),
        _ => None,
    };

    match number.and_then(int_from_f64) {
        Some(Ok(int)) => Ok(Value::from(int)),
        Some(Err(())) => Err(format!(
            "Int cannot represent non 32-bit signed integer value: {}",
            inspect(value)
        )),
        None => Err(format!("Int cannot represent non-integer value: {}", inspect(value))),
    }
}

fn parse_int(value: &Value) -> Result<Value, String> {
    let Value::Number(number) = value else {
        return Err(format!("Int cannot represent non-integer value: {}", inspect(value)));
    };
    match number.as_f64().and_then(int_from_f64) {
        Some(Ok(int)) => Ok(Value::from(int)),
        Some(Err(())) => Err(format!(
            "Int cannot represent non 32-bit signed integer value: {}",
            inspect(value)
        )),
        None => Err(format!("Int cannot represent non-integer value: {}", inspect(value))),
    }
}

fn parse_int_literal(value: &ConstValue) -> Result<Value, String> {
    let ConstValue::Number(number) = value else {
        return Err(format!("Int cannot represent non-integer value: {value}"));
    };
    match number.as_i64() {
        Some(int) => i32::try_from(int)
            .map(Value::from)
            .map_err(|_| format!("Int cannot represent non 32-bit signed integer value: {value}")),
        None => Err(format!("Int cannot represent non-integer value: {value}")),
    }
}

fn float_value(value: f64) -> Option<Value> {
    Number::from_f64(value).map(Value::Number)
}

fn serialize_float(value: &Value) -> Result<Value, String> {
    let float = match value {
        Value::Bool(boolean) => Some(if *boolean { 1.0 } else { 0.0 }),
        Value::Number(_) => return Ok(value.clone()),
        Value::String(string) if !string.is_empty() => string.parse::<f64>().ok().filter(|float| float.is_finite()),
        _ => None,
    };
    float
        .and_then(float_value)
        .ok_or_else(|| format!("Float cannot represent non numeric value: {}", inspect(value)))
}

fn parse_float(value: &Value) -> Result<Value, String> {
    match value {
        Value::Number(_) => Ok(value.clone()),
        _ => Err(format!("Float cannot represent non numeric value: {}", inspect(value))),
    }
}

fn parse_float_literal(value: &ConstValue) -> Result<Value, String> {
    match value {
        ConstValue::Number(number) => Ok(Value::Number(number.clone())),
        _ => Err(format!("Float cannot represent non numeric value: {value}")),
    }
}

fn serialize_string(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(_) => Ok(value.clone()),
        Value::Bool(boolean) => Ok(Value::String(boolean.to_string())),
        Value::Number(number) => Ok(Value::String(number.to_string())),
        _ => Err(format!("String cannot represent value: {}", inspect(value))),
    }
}

fn parse_string(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(_) => Ok(value.clone()),
        _ => Err(format!("String cannot represent a non string value: {}", inspect(value))),
    }
}

fn parse_string_literal(value: &ConstValue) -> Result<Value, String> {
    match value {
        ConstValue::String(string) => Ok(Value::String(string.clone())),
        _ => Err(format!("String cannot represent a non string value: {value}")),
    }
}

fn serialize_boolean(value: &Value) -> Result<Value, String> {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        Value::Number(number) => match number.as_f64() {
            Some(float) if float.is_finite() => Ok(Value::Bool(float != 0.0)),
            _ => Err(format!("Boolean cannot represent a non boolean value: {}", inspect(value))),
        },
        _ => Err(format!("Boolean cannot represent a non boolean value: {}", inspect(value))),
    }
}

fn parse_boolean(value: &Value) -> Result<Value, String> {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        _ => Err(format!("Boolean cannot represent a non boolean value: {}", inspect(value))),
    }
}

fn parse_boolean_literal(value: &ConstValue) -> Result<Value, String> {
    match value {
        ConstValue::Boolean(boolean) => Ok(Value::Bool(*boolean)),
        _ => Err(format!("Boolean cannot represent a non boolean value: {value}")),
    }
}

fn serialize_id(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(_) => Ok(value.clone()),
        Value::Number(number) if number.is_i64() || number.is_u64() => Ok(Value::String(number.to_string())),
        _ => Err(format!("ID cannot represent value: {}", inspect(value))),
    }
}

fn parse_id(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(_) => Ok(value.clone()),
        Value::Number(number) if number.is_i64() || number.is_u64() => Ok(Value::String(number.to_string())),
        _ => Err(format!("ID cannot represent value: {}", inspect(value))),
    }
}

fn parse_id_literal(value: &ConstValue) -> Result<Value, String> {
    match value {
        ConstValue::String(string) => Ok(Value::String(string.clone())),
        ConstValue::Number(number) if number.is_i64() || number.is_u64() => Ok(Value::String(number.to_string())),
        _ => Err(format!("ID cannot represent a non-string and non-integer value: {value}")),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn int_serialization_follows_graphql_js() {
        assert_eq!(serialize_int(&json!(true)), Ok(json!(1)));
        assert_eq!(serialize_int(&json!(3.0)), Ok(json!(3)));
        assert_eq!(serialize_int(&json!("12")), Ok(json!(12)));
        assert_eq!(
            serialize_int(&json!(1.5)),
            Err("Int cannot represent non-integer value: 1.5".to_string())
        );
        assert_eq!(
            serialize_int(&json!(4_294_967_296_i64)),
            Err("Int cannot represent non 32-bit signed integer value: 4294967296".to_string())
        );
    }

    #[test]
    fn literals_must_have_the_right_kind() {
        assert_eq!(parse_int_literal(&ConstValue::from(7)), Ok(json!(7)));
        assert!(parse_int_literal(&ConstValue::String("7".into())).is_err());
        assert_eq!(parse_id_literal(&ConstValue::from(7)), Ok(json!("7")));
        assert!(parse_string_literal(&ConstValue::Boolean(true)).is_err());
    }

    #[test]
    fn string_and_id_serialization() {
        assert_eq!(serialize_string(&json!(false)), Ok(json!("false")));
        assert_eq!(serialize_id(&json!(42)), Ok(json!("42")));
        assert!(serialize_id(&json!(1.5)).is_err());
        assert!(serialize_string(&json!({"a": 1})).is_err());
    }
}
