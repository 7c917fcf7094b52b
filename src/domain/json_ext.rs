//! Small helpers for pulling typed fields out of the `serde_json::Value`
//! records the Gateway hands to the Domain Store — these are already-parsed
//! API response items, not raw bytes, so extraction only needs to check
//! shape, not encoding.

use serde_json::Value;

use crate::errors::{JdiError, Result};

pub fn field<'a>(record: &'a Value, name: &str) -> Result<&'a Value> {
    record
        .get(name)
        .ok_or_else(|| JdiError::DataType(format!("missing field '{name}'")))
}

pub fn str_field<'a>(record: &'a Value, name: &str) -> Result<&'a str> {
    field(record, name)?
        .as_str()
        .ok_or_else(|| JdiError::DataType(format!("field '{name}' is not a string")))
}

pub fn opt_str_field<'a>(record: &'a Value, name: &str) -> Option<&'a str> {
    record.get(name).and_then(Value::as_str)
}

pub fn i64_field(record: &Value, name: &str) -> Result<i64> {
    field(record, name)?
        .as_i64()
        .ok_or_else(|| JdiError::DataType(format!("field '{name}' is not an integer")))
}

pub fn opt_i64_field(record: &Value, name: &str) -> Option<i64> {
    record.get(name).and_then(Value::as_i64)
}

pub fn bool_field(record: &Value, name: &str) -> Result<bool> {
    field(record, name)?
        .as_bool()
        .ok_or_else(|| JdiError::DataType(format!("field '{name}' is not a boolean")))
}

pub fn opt_bool_field(record: &Value, name: &str) -> Option<bool> {
    record.get(name).and_then(Value::as_bool)
}

pub fn array_field<'a>(record: &'a Value, name: &str) -> Result<&'a [Value]> {
    field(record, name)?
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| JdiError::DataType(format!("field '{name}' is not an array")))
}

/// Returns `[]` when the field is present-but-null (the API represents
/// empty collections as `null` in several places), and errors only when the
/// field is missing or present with a non-array, non-null value.
pub fn array_field_or_empty<'a>(record: &'a Value, name: &str) -> Result<&'a [Value]> {
    match record.get(name) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => Err(JdiError::DataType(format!("field '{name}' is not an array"))),
    }
}
