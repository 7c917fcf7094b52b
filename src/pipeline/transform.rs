//! Transform Engine (C7).
//!
//! Cartesian-expands nested arrays per an insertion profile and emits flat
//! row maps (named) or tuples (positional). This is the hardest algorithm in
//! the system; see `DESIGN.md` for the grounding.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{JdiError, Result};

/// One step of a JSON key path: a dict key or a list index. `Index(-1)` is
/// the aggregate sentinel — "iterate over the list at this depth."
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathStep {
    Key(String),
    Index(i64),
}

pub type KeyPath = Vec<PathStep>;

/// Which edge cases `recursive_get` treats as hard errors versus a quiet
/// `null`. Mirrors the original's `ErrorHandlingOptions` flag set; the
/// default (matching `DEFAULT_ERROR_HANDLING`) lets a missing dict key
/// resolve to `null` but still raises on the rest.
#[derive(Debug, Clone, Copy)]
pub struct ErrorHandling {
    pub error_on_missing_dict_key: bool,
    pub error_on_non_string_dict_key: bool,
    pub error_on_list_index_out_of_range: bool,
    pub error_on_nested_access_on_non_container: bool,
}

impl Default for ErrorHandling {
    fn default() -> Self {
        Self {
            error_on_missing_dict_key: false,
            error_on_non_string_dict_key: true,
            error_on_list_index_out_of_range: true,
            error_on_nested_access_on_non_container: true,
        }
    }
}

/// Walks `path` into `data`. An empty path returns `data` unchanged. A
/// negative-index step on a list is consumed and maps the remaining path over
/// every element; a dict-key step on a list is *not* consumed and maps the
/// full remaining path (including itself) over every element.
pub fn recursive_get(data: &Value, path: &[PathStep], opts: &ErrorHandling) -> Result<Value> {
    let Some((step, rest)) = path.split_first() else {
        return Ok(data.clone());
    };

    match data {
        Value::Object(map) => match step {
            PathStep::Key(key) => match map.get(key) {
                Some(v) => recursive_get(v, rest, opts),
                None => {
                    if opts.error_on_missing_dict_key {
                        Err(JdiError::DataType(format!("missing dict key '{key}'")))
                    } else {
                        Ok(Value::Null)
                    }
                }
            },
            PathStep::Index(_) => {
                if opts.error_on_non_string_dict_key {
                    Err(JdiError::DataType("non-string key used against a dict".into()))
                } else {
                    Ok(Value::Null)
                }
            }
        },
        Value::Array(items) => match step {
            PathStep::Index(i) if *i >= 0 => match items.get(*i as usize) {
                Some(v) => recursive_get(v, rest, opts),
                None => {
                    if opts.error_on_list_index_out_of_range {
                        Err(JdiError::DataType(format!("list index {i} out of range")))
                    } else {
                        Ok(Value::Null)
                    }
                }
            },
            PathStep::Index(_) => {
                let mapped: Result<Vec<Value>> =
                    items.iter().map(|item| recursive_get(item, rest, opts)).collect();
                Ok(Value::Array(mapped?))
            }
            PathStep::Key(_) => {
                let mapped: Result<Vec<Value>> =
                    items.iter().map(|item| recursive_get(item, path, opts)).collect();
                Ok(Value::Array(mapped?))
            }
        },
        _ if path.is_empty() => Ok(data.clone()),
        _ => {
            if opts.error_on_nested_access_on_non_container {
                Err(JdiError::DataType("nested access on a non-container value".into()))
            } else {
                Ok(Value::Null)
            }
        }
    }
}

fn first_aggregate_index(path: &[PathStep]) -> Option<usize> {
    path.iter().position(|s| matches!(s, PathStep::Index(-1)))
}

type Row = IndexMap<String, Value>;

struct SplitProfile {
    independent: IndexMap<String, KeyPath>,
    groups: Vec<(KeyPath, Vec<(String, KeyPath)>)>,
}

fn split_profile(profile: &IndexMap<String, KeyPath>) -> SplitProfile {
    let mut independent = IndexMap::new();
    let mut groups: Vec<(KeyPath, Vec<(String, KeyPath)>)> = Vec::new();

    for (placeholder, path) in profile {
        match first_aggregate_index(path) {
            None => {
                independent.insert(placeholder.clone(), path.clone());
            }
            Some(idx) => {
                let prefix = path[..idx].to_vec();
                let rest = path[idx + 1..].to_vec();
                if let Some(entry) = groups.iter_mut().find(|(p, _)| *p == prefix) {
                    entry.1.push((placeholder.clone(), rest));
                } else {
                    groups.push((prefix, vec![(placeholder.clone(), rest)]));
                }
            }
        }
    }

    SplitProfile { independent, groups }
}

/// Cartesian-expands one source unit against one aggregate group, crossed
/// with the rows already produced by earlier groups.
fn aggregate_additional_items(
    unit: &Value,
    group_path: &[PathStep],
    placeholders: &[(String, KeyPath)],
    base_items: Vec<Row>,
    opts: &ErrorHandling,
) -> Result<Vec<Row>> {
    let inner = recursive_get(unit, group_path, opts)?;

    let additional_rows: Vec<Row> = match &inner {
        Value::Null => {
            let mut row = Row::new();
            for (placeholder, _) in placeholders {
                row.insert(placeholder.clone(), Value::Null);
            }
            vec![row]
        }
        Value::Array(items) => {
            let any_nested_aggregate = placeholders
                .iter()
                .any(|(_, rest)| first_aggregate_index(rest).is_some());

            let mut rows = Vec::new();
            for item in items {
                if !any_nested_aggregate {
                    let mut row = Row::new();
                    for (placeholder, rest) in placeholders {
                        row.insert(placeholder.clone(), recursive_get(item, rest, opts)?);
                    }
                    rows.push(row);
                } else {
                    let mut sub_profile = IndexMap::new();
                    for (placeholder, rest) in placeholders {
                        sub_profile.insert(placeholder.clone(), rest.clone());
                    }
                    let nested = transform_named(std::slice::from_ref(item), &sub_profile, opts)?;
                    rows.extend(nested);
                }
            }
            rows
        }
        other => {
            return Err(JdiError::DataType(format!(
                "aggregate key at {group_path:?} did not resolve to a list, got {other:?}"
            )))
        }
    };

    let mut result = Vec::with_capacity(base_items.len() * additional_rows.len());
    for base in &base_items {
        for add in &additional_rows {
            let mut merged = base.clone();
            merged.extend(add.iter().map(|(k, v)| (k.clone(), v.clone())));
            result.push(merged);
        }
    }
    Ok(result)
}

/// Transforms `sources` against a named insertion profile, producing one row
/// per Cartesian-product element. Output ordering follows source-unit order,
/// then group-key insertion order, then inner-list order.
pub fn transform_named(
    sources: &[Value],
    profile: &IndexMap<String, KeyPath>,
    opts: &ErrorHandling,
) -> Result<Vec<Row>> {
    let split = split_profile(profile);
    let mut output = Vec::new();

    for unit in sources {
        let mut base = Row::new();
        for (placeholder, path) in &split.independent {
            base.insert(placeholder.clone(), recursive_get(unit, path, opts)?);
        }

        let mut base_items = vec![base];
        for (group_path, placeholders) in &split.groups {
            base_items = aggregate_additional_items(unit, group_path, placeholders, base_items, opts)?;
        }
        output.extend(base_items);
    }

    Ok(output)
}

/// Transforms `sources` against a positional insertion profile; internally
/// reuses [`transform_named`] with stringified integer indices as
/// placeholders, then re-serializes each row to a tuple sorted by index.
pub fn transform_positional(
    sources: &[Value],
    profile: &[KeyPath],
    opts: &ErrorHandling,
) -> Result<Vec<Vec<Value>>> {
    let mut named_profile = IndexMap::new();
    for (i, path) in profile.iter().enumerate() {
        named_profile.insert(i.to_string(), path.clone());
    }
    let rows = transform_named(sources, &named_profile, opts)?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let mut keys: Vec<usize> = row.keys().filter_map(|k| k.parse().ok()).collect();
            keys.sort_unstable();
            keys.into_iter()
                .map(|k| row.get(&k.to_string()).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect())
}

/// Parameter coercion applied after transform, before the Loader binds
/// values into a prepared statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionMethod {
    ToInt,
    ToFloat,
    ToString,
    ToBool,
}

impl ConversionMethod {
    /// Normalizes e.g. `"to-int"` / `"TO_INT"` / `"to_int"` to a variant.
    /// An empty string is deliberately *not* handled here: callers treat `""`
    /// as "no conversion" rather than routing it through this dispatcher
    /// (see SPEC_FULL.md §10).
    pub fn from_str_normalized(s: &str) -> Option<Self> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "TO_INT" => Some(ConversionMethod::ToInt),
            "TO_FLOAT" => Some(ConversionMethod::ToFloat),
            "TO_STRING" => Some(ConversionMethod::ToString),
            "TO_BOOL" => Some(ConversionMethod::ToBool),
            _ => None,
        }
    }
}

/// Applies `method` to `value`; absent/null-incompatible fields are the
/// caller's concern — this only defines the single-value coercion.
pub fn apply_conversion(value: &Value, method: ConversionMethod) -> Result<Value> {
    match method {
        ConversionMethod::ToInt => {
            let n = match value {
                Value::Number(n) => n.as_i64().ok_or_else(|| {
                    JdiError::DataType(format!("cannot convert {value} to int"))
                })?,
                Value::String(s) => s
                    .parse::<i64>()
                    .map_err(|e| JdiError::DataType(format!("cannot convert '{s}' to int: {e}")))?,
                other => {
                    return Err(JdiError::DataType(format!("cannot convert {other} to int")))
                }
            };
            Ok(Value::from(n))
        }
        ConversionMethod::ToFloat => {
            let f = match value {
                Value::Number(n) => n.as_f64().ok_or_else(|| {
                    JdiError::DataType(format!("cannot convert {value} to float"))
                })?,
                Value::String(s) => s.parse::<f64>().map_err(|e| {
                    JdiError::DataType(format!("cannot convert '{s}' to float: {e}"))
                })?,
                other => {
                    return Err(JdiError::DataType(format!("cannot convert {other} to float")))
                }
            };
            Ok(serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null))
        }
        ConversionMethod::ToString => Ok(Value::String(match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        })),
        ConversionMethod::ToBool => Ok(Value::Bool(match value {
            Value::String(s) if s.eq_ignore_ascii_case("true") => true,
            Value::String(s) if s.eq_ignore_ascii_case("false") => false,
            Value::String(s) => !s.is_empty(),
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Value::Null => false,
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
        })),
    }
}

/// Applies per-key conversions to every row, skipping keys the row does not
/// contain (mirrors the original's silent-skip-on-absence behavior).
pub fn convert_rows(
    rows: &mut [IndexMap<String, Value>],
    conversions: &std::collections::HashMap<String, ConversionMethod>,
) -> Result<()> {
    for row in rows.iter_mut() {
        for (key, method) in conversions {
            if let Some(value) = row.get(key) {
                let converted = apply_conversion(value, *method)?;
                row.insert(key.clone(), converted);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(s: &str) -> PathStep {
        PathStep::Key(s.to_string())
    }
    fn agg() -> PathStep {
        PathStep::Index(-1)
    }

    #[test]
    fn recursive_get_empty_path_returns_input() {
        let data = json!({"a": 1});
        let opts = ErrorHandling::default();
        assert_eq!(recursive_get(&data, &[], &opts).unwrap(), data);
    }

    #[test]
    fn recursive_get_missing_key_returns_null_by_default() {
        let data = json!({"a": 1});
        let opts = ErrorHandling::default();
        let result = recursive_get(&data, &[key("b")], &opts).unwrap();
        assert_eq!(result, Value::Null);
    }

    #[test]
    fn s3_transform_expansion_scenario() {
        let unit = json!({
            "user_code": "foo",
            "user_positions": [
                {"position_code": "m", "roles": ["hr", "fin"]},
                {"position_code": "o", "roles": ["sales"]}
            ]
        });

        let mut profile = IndexMap::new();
        profile.insert("u".to_string(), vec![key("user_code")]);
        profile.insert(
            "p".to_string(),
            vec![key("user_positions"), agg(), key("position_code")],
        );
        profile.insert(
            "r".to_string(),
            vec![key("user_positions"), agg(), key("roles"), agg()],
        );

        let opts = ErrorHandling::default();
        let rows = transform_named(&[unit], &profile, &opts).unwrap();

        let expected = vec![
            (("foo", "m", "hr")),
            (("foo", "m", "fin")),
            (("foo", "o", "sales")),
        ];

        assert_eq!(rows.len(), expected.len());
        for (row, (u, p, r)) in rows.iter().zip(expected) {
            assert_eq!(row["u"], json!(u));
            assert_eq!(row["p"], json!(p));
            assert_eq!(row["r"], json!(r));
        }
    }

    #[test]
    fn aggregate_key_pointing_to_null_emits_one_row_of_nulls() {
        let unit = json!({"user_code": "foo", "user_positions": null});
        let mut profile = IndexMap::new();
        profile.insert("u".to_string(), vec![key("user_code")]);
        profile.insert(
            "p".to_string(),
            vec![key("user_positions"), agg(), key("position_code")],
        );
        let opts = ErrorHandling::default();
        let rows = transform_named(&[unit], &profile, &opts).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["p"], Value::Null);
    }

    #[test]
    fn empty_source_list_yields_empty_output() {
        let profile: IndexMap<String, KeyPath> = IndexMap::new();
        let opts = ErrorHandling::default();
        let rows = transform_named(&[], &profile, &opts).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn positional_profile_serializes_in_numeric_order() {
        let unit = json!({"a": "x", "b": "y"});
        let profile = vec![vec![key("b")], vec![key("a")]];
        let opts = ErrorHandling::default();
        let rows = transform_positional(&[unit], &profile, &opts).unwrap();
        assert_eq!(rows[0], vec![json!("y"), json!("x")]);
    }

    #[test]
    fn to_bool_conversion_matches_original_semantics() {
        assert_eq!(
            apply_conversion(&json!("TRUE"), ConversionMethod::ToBool).unwrap(),
            json!(true)
        );
        assert_eq!(
            apply_conversion(&json!("false"), ConversionMethod::ToBool).unwrap(),
            json!(false)
        );
        assert_eq!(
            apply_conversion(&json!("anything-else"), ConversionMethod::ToBool).unwrap(),
            json!(true)
        );
    }
}
