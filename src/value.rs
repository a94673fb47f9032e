//! Typed result values and the coercion that turns JSON-decoded cells into
//! them, driven by the column's type signature.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::Value as JsonValue;

use crate::error::ClientError;
use crate::signature::{TypeSignature, TypeSignatureParameter};

/// A single materialized cell of a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    /// Map entries in server order.
    Map(Vec<(Value, Value)>),
    /// Row fields as `(name, value)` in declaration order.
    Row(Vec<(String, Value)>),
    /// A value of a type base this client does not interpret.
    Json(JsonValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

// Bases whose values travel as plain strings and stay strings.
const STRING_BASES: &[&str] = &[
    "varchar",
    "char",
    "json",
    "time",
    "time with time zone",
    "timestamp",
    "timestamp with time zone",
    "date",
    "interval year to month",
    "interval day to second",
    "decimal",
];

/// Rewrites a JSON-decoded value into its typed form.
///
/// Nulls pass through for any signature. String-encoded integers fail on
/// overflow; numeric values are narrowed to the target width.
pub fn fix_value(signature: &TypeSignature, value: JsonValue) -> Result<Value, ClientError> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    match signature.base() {
        "array" => fix_array(signature, value),
        "map" => fix_map(signature, value),
        "row" => fix_row(signature, value),
        "bigint" => match value {
            JsonValue::String(text) => match text.parse::<i64>() {
                Ok(parsed) => Ok(Value::BigInt(parsed)),
                Err(_) => Err(mismatch(signature, JsonValue::String(text))),
            },
            JsonValue::Number(number) => Ok(Value::BigInt(number_as_i64(&number))),
            other => Err(mismatch(signature, other)),
        },
        "integer" => match value {
            JsonValue::String(text) => match text.parse::<i32>() {
                Ok(parsed) => Ok(Value::Integer(parsed)),
                Err(_) => Err(mismatch(signature, JsonValue::String(text))),
            },
            JsonValue::Number(number) => Ok(Value::Integer(number_as_i64(&number) as i32)),
            other => Err(mismatch(signature, other)),
        },
        "smallint" => match value {
            JsonValue::String(text) => match text.parse::<i16>() {
                Ok(parsed) => Ok(Value::SmallInt(parsed)),
                Err(_) => Err(mismatch(signature, JsonValue::String(text))),
            },
            JsonValue::Number(number) => Ok(Value::SmallInt(number_as_i64(&number) as i16)),
            other => Err(mismatch(signature, other)),
        },
        "tinyint" => match value {
            JsonValue::String(text) => match text.parse::<i8>() {
                Ok(parsed) => Ok(Value::TinyInt(parsed)),
                Err(_) => Err(mismatch(signature, JsonValue::String(text))),
            },
            JsonValue::Number(number) => Ok(Value::TinyInt(number_as_i64(&number) as i8)),
            other => Err(mismatch(signature, other)),
        },
        "double" => match value {
            JsonValue::String(text) => match text.parse::<f64>() {
                Ok(parsed) => Ok(Value::Double(parsed)),
                Err(_) => Err(mismatch(signature, JsonValue::String(text))),
            },
            JsonValue::Number(number) => Ok(Value::Double(number.as_f64().unwrap_or(0.0))),
            other => Err(mismatch(signature, other)),
        },
        "real" => match value {
            JsonValue::String(text) => match text.parse::<f32>() {
                Ok(parsed) => Ok(Value::Real(parsed)),
                Err(_) => Err(mismatch(signature, JsonValue::String(text))),
            },
            JsonValue::Number(number) => Ok(Value::Real(number.as_f64().unwrap_or(0.0) as f32)),
            other => Err(mismatch(signature, other)),
        },
        "boolean" => match value {
            JsonValue::String(text) => {
                if text.eq_ignore_ascii_case("true") {
                    Ok(Value::Boolean(true))
                } else if text.eq_ignore_ascii_case("false") {
                    Ok(Value::Boolean(false))
                } else {
                    Err(mismatch(signature, JsonValue::String(text)))
                }
            }
            JsonValue::Bool(flag) => Ok(Value::Boolean(flag)),
            other => Err(mismatch(signature, other)),
        },
        base if STRING_BASES.contains(&base) => match value {
            JsonValue::String(text) => Ok(Value::String(text)),
            other => Err(mismatch(signature, other)),
        },
        // Unknown bases carry Base64-encoded binary when rendered as a
        // string; anything else is passed through untouched.
        _ => match value {
            JsonValue::String(text) => match BASE64.decode(&text) {
                Ok(bytes) => Ok(Value::Bytes(bytes)),
                Err(_) => Err(mismatch(signature, JsonValue::String(text))),
            },
            other => Ok(Value::Json(other)),
        },
    }
}

fn fix_array(signature: &TypeSignature, value: JsonValue) -> Result<Value, ClientError> {
    let element = match signature.parameters() {
        [TypeSignatureParameter::Type(element)] => element,
        _ => return Err(malformed(signature, "array takes exactly one type parameter")),
    };
    match value {
        JsonValue::Array(items) => {
            let fixed = items
                .into_iter()
                .map(|item| fix_value(element, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(fixed))
        }
        other => Err(mismatch(signature, other)),
    }
}

fn fix_map(signature: &TypeSignature, value: JsonValue) -> Result<Value, ClientError> {
    let (key_signature, value_signature) = match signature.parameters() {
        [TypeSignatureParameter::Type(key), TypeSignatureParameter::Type(val)] => (key, val),
        _ => return Err(malformed(signature, "map takes exactly two type parameters")),
    };
    match value {
        JsonValue::Object(entries) => {
            let mut fixed = Vec::with_capacity(entries.len());
            for (key, val) in entries {
                fixed.push((
                    fix_value(key_signature, JsonValue::String(key))?,
                    fix_value(value_signature, val)?,
                ));
            }
            Ok(Value::Map(fixed))
        }
        other => Err(mismatch(signature, other)),
    }
}

fn fix_row(signature: &TypeSignature, value: JsonValue) -> Result<Value, ClientError> {
    let items = match value {
        JsonValue::Array(items) => items,
        other => return Err(mismatch(signature, other)),
    };
    if items.len() != signature.parameters().len() {
        return Err(mismatch(signature, JsonValue::Array(items)));
    }
    let mut fields = Vec::with_capacity(items.len());
    for (parameter, item) in signature.parameters().iter().zip(items) {
        match parameter {
            TypeSignatureParameter::NamedType { name, signature } => {
                fields.push((name.clone(), fix_value(signature, item)?));
            }
            _ => return Err(malformed(signature, "row parameters must be named")),
        }
    }
    Ok(Value::Row(fields))
}

fn mismatch(signature: &TypeSignature, value: JsonValue) -> ClientError {
    ClientError::ValueCoercion {
        signature: signature.to_string(),
        value,
    }
}

fn malformed(signature: &TypeSignature, message: &str) -> ClientError {
    ClientError::InvalidTypeSignature {
        signature: signature.to_string(),
        message: message.to_string(),
    }
}

fn number_as_i64(number: &serde_json::Number) -> i64 {
    if let Some(value) = number.as_i64() {
        value
    } else if let Some(value) = number.as_u64() {
        value as i64
    } else {
        number.as_f64().unwrap_or(0.0) as i64
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::signature::TypeSignature;

    fn fix(signature: &str, value: JsonValue) -> Result<Value, ClientError> {
        fix_value(&TypeSignature::parse(signature).unwrap(), value)
    }

    #[test]
    fn null_passes_through_any_signature() {
        for signature in ["bigint", "varchar", "array(bigint)", "row(\"a\" bigint)"] {
            assert_eq!(fix(signature, JsonValue::Null).unwrap(), Value::Null);
        }
    }

    #[test]
    fn integers_coerce_from_number_and_string() {
        assert_eq!(fix("bigint", json!(7)).unwrap(), Value::BigInt(7));
        assert_eq!(fix("bigint", json!("7")).unwrap(), Value::BigInt(7));
        assert_eq!(fix("integer", json!("-3")).unwrap(), Value::Integer(-3));
        assert_eq!(fix("smallint", json!(12)).unwrap(), Value::SmallInt(12));
        assert_eq!(fix("tinyint", json!("-8")).unwrap(), Value::TinyInt(-8));
    }

    #[test]
    fn string_integer_overflow_fails() {
        assert!(fix("tinyint", json!("300")).is_err());
        assert!(fix("integer", json!("9999999999999")).is_err());
        assert!(fix("bigint", json!("not a number")).is_err());
    }

    #[test]
    fn floats_coerce_from_number_and_string() {
        assert_eq!(fix("double", json!(1.5)).unwrap(), Value::Double(1.5));
        assert_eq!(fix("double", json!("1.5")).unwrap(), Value::Double(1.5));
        assert_eq!(fix("real", json!("2.25")).unwrap(), Value::Real(2.25));
    }

    #[test]
    fn booleans_are_strict() {
        assert_eq!(fix("boolean", json!(true)).unwrap(), Value::Boolean(true));
        assert_eq!(fix("boolean", json!("TRUE")).unwrap(), Value::Boolean(true));
        assert_eq!(fix("boolean", json!("false")).unwrap(), Value::Boolean(false));
        assert!(fix("boolean", json!("yes")).is_err());
        assert!(fix("boolean", json!(1)).is_err());
    }

    #[test]
    fn string_bases_keep_strings_and_reject_everything_else() {
        assert_eq!(
            fix("varchar", json!("hello")).unwrap(),
            Value::String("hello".to_string())
        );
        assert_eq!(
            fix("timestamp", json!("2016-06-01 01:02:03")).unwrap(),
            Value::String("2016-06-01 01:02:03".to_string())
        );
        assert_eq!(
            fix("decimal", json!("123.45")).unwrap(),
            Value::String("123.45".to_string())
        );
        assert!(fix("varchar", json!(1)).is_err());
        assert!(fix("date", json!(17000)).is_err());
    }

    #[test]
    fn string_fixing_is_idempotent() {
        let signature = TypeSignature::parse("varchar").unwrap();
        let once = fix_value(&signature, json!("abc")).unwrap();
        let text = match &once {
            Value::String(text) => text.clone(),
            other => panic!("unexpected value {other:?}"),
        };
        assert_eq!(fix_value(&signature, JsonValue::String(text)).unwrap(), once);
    }

    #[test]
    fn unknown_base_decodes_base64_strings() {
        assert_eq!(
            fix("varbinary", json!("aGVsbG8=")).unwrap(),
            Value::Bytes(b"hello".to_vec())
        );
        assert!(fix("varbinary", json!("not base64!!")).is_err());
        assert_eq!(fix("hyperloglog", json!(17)).unwrap(), Value::Json(json!(17)));
    }

    #[test]
    fn arrays_recurse_in_order() {
        assert_eq!(
            fix("array(bigint)", json!([1, 2, 3])).unwrap(),
            Value::Array(vec![Value::BigInt(1), Value::BigInt(2), Value::BigInt(3)])
        );
        assert!(fix("array(bigint)", json!({"a": 1})).is_err());
    }

    #[test]
    fn maps_fix_keys_and_preserve_order() {
        let fixed = fix("map(bigint,varchar)", json!({"2": "b", "1": "a"})).unwrap();
        assert_eq!(
            fixed,
            Value::Map(vec![
                (Value::BigInt(2), Value::String("b".to_string())),
                (Value::BigInt(1), Value::String("a".to_string())),
            ])
        );
    }

    #[test]
    fn rows_become_named_fields() {
        let fixed = fix("row(\"a\" bigint,\"b\" array(varchar))", json!([7, ["x", "y"]])).unwrap();
        assert_eq!(
            fixed,
            Value::Row(vec![
                ("a".to_string(), Value::BigInt(7)),
                (
                    "b".to_string(),
                    Value::Array(vec![
                        Value::String("x".to_string()),
                        Value::String("y".to_string()),
                    ])
                ),
            ])
        );
    }

    #[test]
    fn row_arity_mismatch_fails() {
        assert!(fix("row(\"a\" bigint)", json!([1, 2])).is_err());
        assert!(fix("row(\"a\" bigint)", json!({"a": 1})).is_err());
    }

    #[test]
    fn nulls_nest_inside_containers() {
        assert_eq!(
            fix("array(varchar)", json!(["x", null])).unwrap(),
            Value::Array(vec![Value::String("x".to_string()), Value::Null])
        );
    }
}
