//! TOML Parser (C6): converts a TOML document into a [`PipelineDefinition`],
//! with strict shape validation (spec.md §4.6).
//!
//! Document shape:
//! ```toml
//! [table_definitions]
//! type = "sqlite"
//! path = "db.sqlite"
//! tables = ["CREATE TABLE ..."]
//!
//! [[data_link.sources]]
//! name = "users"
//! type = "API"
//! result_format = "json-object-results"
//!
//! [data_link.insertion_profile.users]
//! query = "INSERT INTO users VALUES (?, ?)"
//! source = "users"
//! named_parameters = { code = ["user_code"] }
//! ```

use std::collections::HashMap;

use indexmap::IndexMap;
use toml::Value as Toml;

use super::model::{DataLink, DataSource, DbDefinition, InsertionProfile, PipelineDefinition, ResultFormat, Source, DEFAULT_RESULTS_KEY};
use super::transform::{ConversionMethod, KeyPath, PathStep};
use crate::errors::{JdiError, Result};
use crate::schema::{self, SqlDialect};

pub fn parse_pipeline_toml(text: &str) -> Result<PipelineDefinition> {
    let doc: Toml = toml::from_str(text)?;
    let root = doc
        .as_table()
        .ok_or_else(|| JdiError::Pipeline("pipeline document root is not a table".into()))?;

    let table_definitions = root
        .get("table_definitions")
        .ok_or_else(|| JdiError::Pipeline("missing [table_definitions]".into()))?;
    let data_link_tbl = root
        .get("data_link")
        .ok_or_else(|| JdiError::Pipeline("missing [data_link]".into()))?;

    Ok(PipelineDefinition {
        table_definition: parse_table_definitions(table_definitions)?,
        data_link: parse_data_link(data_link_tbl)?,
    })
}

fn parse_table_definitions(value: &Toml) -> Result<DbDefinition> {
    let table = as_table(value, "table_definitions")?;
    let dialect = table
        .get("type")
        .and_then(Toml::as_str)
        .ok_or_else(|| JdiError::Pipeline("table_definitions.type is required".into()))?;

    match dialect.to_uppercase().as_str() {
        "SQLITE" => {
            let path = table
                .get("path")
                .and_then(Toml::as_str)
                .ok_or_else(|| JdiError::Pipeline("table_definitions.path is required".into()))?
                .to_string();
            let tables_val = table
                .get("tables")
                .and_then(Toml::as_array)
                .ok_or_else(|| JdiError::Pipeline("table_definitions.tables is required".into()))?;

            let mut tables = Vec::new();
            for ddl_val in tables_val {
                let ddl = ddl_val
                    .as_str()
                    .ok_or_else(|| JdiError::Pipeline("each DDL entry must be a string".into()))?;
                let parsed = schema::parse_sql(ddl, SqlDialect::Sqlite)?;
                if parsed.len() != 1 {
                    return Err(JdiError::Pipeline(format!(
                        "DDL string did not parse to exactly one table: {ddl}"
                    )));
                }
                tables.push(parsed.into_iter().next().unwrap());
            }
            Ok(DbDefinition::Sqlite { path, tables })
        }
        other => Err(JdiError::Pipeline(format!("unsupported dialect: {other}"))),
    }
}

fn parse_data_link(value: &Toml) -> Result<DataLink> {
    let table = as_table(value, "data_link")?;
    let mut link = DataLink::new();

    if let Some(sources) = table.get("sources").and_then(Toml::as_array) {
        for source_val in sources {
            if let Some(source) = parse_data_source(source_val)? {
                link.add_source(source)?;
            }
        }
    }

    let insertion_profile = table
        .get("insertion_profile")
        .ok_or_else(|| JdiError::Pipeline("data_link.insertion_profile is required".into()))?;
    let insertion_profile_tbl = as_table(insertion_profile, "data_link.insertion_profile")?;
    link.insertion_profiles = parse_insertion_profiles(insertion_profile_tbl)?;

    Ok(link)
}

const VALID_SOURCE_TYPES: [&str; 2] = ["API", "SQLITE"];

fn parse_data_source(value: &Toml) -> Result<Option<DataSource>> {
    let table = as_table(value, "data_link.sources[]")?;
    if table.is_empty() {
        return Ok(None);
    }

    let name = table
        .get("name")
        .and_then(Toml::as_str)
        .ok_or_else(|| JdiError::Pipeline("data source 'name' is required".into()))?
        .to_string();

    let type_str = table
        .get("type")
        .and_then(Toml::as_str)
        .ok_or_else(|| JdiError::Pipeline(format!("data source '{name}' is missing 'type'")))?;
    let upper_type = type_str.to_uppercase();
    if !VALID_SOURCE_TYPES.contains(&upper_type.as_str()) {
        return Err(JdiError::Pipeline(format!(
            "data source '{name}' has unsupported type '{type_str}'"
        )));
    }

    let result_format_str = table
        .get("result_format")
        .and_then(Toml::as_str)
        .unwrap_or("NESTED_JSON");
    let result_format = ResultFormat::from_str_normalized(result_format_str).ok_or_else(|| {
        JdiError::Pipeline(format!(
            "data source '{name}' has invalid result_format '{result_format_str}'"
        ))
    })?;

    let results_key = table
        .get("results_key")
        .and_then(Toml::as_str)
        .unwrap_or(DEFAULT_RESULTS_KEY)
        .to_string();

    let source = match upper_type.as_str() {
        "API" => {
            let endpoint = table
                .get("endpoint")
                .and_then(Toml::as_str)
                .ok_or_else(|| JdiError::Pipeline(format!("API source '{name}' requires 'endpoint'")))?
                .to_string();
            let headers = table
                .get("headers")
                .and_then(Toml::as_table)
                .map(table_to_string_map)
                .unwrap_or_default();
            let params = table
                .get("params")
                .and_then(Toml::as_table)
                .map(table_to_string_map)
                .unwrap_or_default();
            DataSource::Api {
                name,
                result_format,
                results_key,
                endpoint,
                headers,
                params,
            }
        }
        "SQLITE" => {
            let path = table
                .get("path")
                .and_then(Toml::as_str)
                .ok_or_else(|| JdiError::Pipeline(format!("SQLite source '{name}' requires 'path'")))?
                .to_string();
            let query = table
                .get("query")
                .and_then(Toml::as_str)
                .ok_or_else(|| JdiError::Pipeline(format!("SQLite source '{name}' requires 'query'")))?
                .to_string();
            DataSource::Sqlite {
                name,
                result_format,
                results_key,
                path,
                query,
            }
        }
        _ => unreachable!(),
    };
    Ok(Some(source))
}

fn parse_insertion_profiles(table: &toml::value::Table) -> Result<HashMap<String, InsertionProfile>> {
    let mut profiles = HashMap::new();

    for (table_name, profile_val) in table {
        let profile = as_table(profile_val, table_name)?;

        let query = profile
            .get("query")
            .and_then(Toml::as_str)
            .ok_or_else(|| {
                JdiError::Pipeline(format!("insertion profile for '{table_name}' requires 'query'"))
            })?
            .to_string();

        let mut sources = Vec::new();
        for (key, is_regex) in [("source", false), ("regex_source", true)] {
            if let Some(v) = profile.get(key) {
                match v {
                    Toml::String(s) => sources.push(Source {
                        name: s.clone(),
                        regex: is_regex,
                    }),
                    Toml::Array(items) => {
                        for item in items {
                            let s = item.as_str().ok_or_else(|| {
                                JdiError::Pipeline(format!(
                                    "{key} entries for '{table_name}' must be strings"
                                ))
                            })?;
                            sources.push(Source {
                                name: s.to_string(),
                                regex: is_regex,
                            });
                        }
                    }
                    _ => {
                        return Err(JdiError::Pipeline(format!(
                            "{key} for '{table_name}' must be a string or array of strings"
                        )))
                    }
                }
            }
        }
        if sources.is_empty() {
            return Err(JdiError::Pipeline(format!(
                "insertion profile for '{table_name}' has no source"
            )));
        }

        let is_positional = profile.contains_key("positional_parameters");
        let is_named = profile.contains_key("named_parameters");
        if is_positional && is_named {
            return Err(JdiError::Pipeline(format!(
                "insertion profile for '{table_name}' cannot have both positional and named parameters"
            )));
        }
        if !is_positional && !is_named {
            return Err(JdiError::Pipeline(format!(
                "insertion profile for '{table_name}' must have positional or named parameters"
            )));
        }

        let profile = if is_positional {
            parse_positional_profile(profile, query, sources, table_name)?
        } else {
            parse_named_profile(profile, query, sources, table_name)?
        };
        profiles.insert(table_name.clone(), profile);
    }

    Ok(profiles)
}

fn parse_positional_profile(
    profile: &toml::value::Table,
    query: String,
    sources: Vec<Source>,
    table_name: &str,
) -> Result<InsertionProfile> {
    let raw_params = profile
        .get("positional_parameters")
        .and_then(Toml::as_array)
        .ok_or_else(|| {
            JdiError::Pipeline(format!(
                "positional_parameters missing or not an array for '{table_name}'"
            ))
        })?;

    let mut parameters = Vec::with_capacity(raw_params.len());
    for (i, param) in raw_params.iter().enumerate() {
        let arr = param.as_array().ok_or_else(|| {
            JdiError::Pipeline(format!(
                "positional parameter {i} for '{table_name}' is not an array"
            ))
        })?;
        parameters.push(to_key_path(arr)?);
    }

    let conversions = parse_conversion_method_indexed(profile, table_name, parameters.len())?;

    Ok(InsertionProfile::Positional {
        query,
        sources,
        parameters,
        conversions,
    })
}

fn parse_named_profile(
    profile: &toml::value::Table,
    query: String,
    sources: Vec<Source>,
    table_name: &str,
) -> Result<InsertionProfile> {
    let raw_params = profile
        .get("named_parameters")
        .and_then(Toml::as_table)
        .ok_or_else(|| {
            JdiError::Pipeline(format!(
                "named_parameters missing or not a table for '{table_name}'"
            ))
        })?;

    let mut parameters = IndexMap::new();
    for (key, value) in raw_params {
        let arr = value.as_array().ok_or_else(|| {
            JdiError::Pipeline(format!(
                "named parameter '{key}' for '{table_name}' is not an array"
            ))
        })?;
        parameters.insert(key.clone(), to_key_path(arr)?);
    }

    let conversions = parse_conversion_method_named(profile, table_name, &parameters)?;

    Ok(InsertionProfile::Named {
        query,
        sources,
        parameters,
        conversions,
    })
}

fn to_key_path(arr: &[Toml]) -> Result<KeyPath> {
    arr.iter()
        .map(|step| match step {
            Toml::String(s) => Ok(PathStep::Key(s.clone())),
            Toml::Integer(i) => Ok(PathStep::Index(*i)),
            other => Err(JdiError::Pipeline(format!(
                "key path steps must be strings or integers, got {other:?}"
            ))),
        })
        .collect()
}

/// `conversion_method` is a flat array of `[index_or_key, method_name, ...]`
/// pairs. An empty-string method name is treated as identity (no entry is
/// recorded) per SPEC_FULL.md §10's resolution of the original's ambiguity.
fn parse_conversion_method_indexed(
    profile: &toml::value::Table,
    table_name: &str,
    param_count: usize,
) -> Result<HashMap<usize, ConversionMethod>> {
    let mut conversions = HashMap::new();
    let Some(raw) = profile.get("conversion_method") else {
        return Ok(conversions);
    };
    let items = raw.as_array().ok_or_else(|| {
        JdiError::Pipeline(format!("conversion_method for '{table_name}' must be an array"))
    })?;
    if items.len() % 2 != 0 {
        return Err(JdiError::Pipeline(format!(
            "conversion_method for '{table_name}' is not a list of pairs"
        )));
    }
    for pair in items.chunks(2) {
        let index = pair[0].as_integer().ok_or_else(|| {
            JdiError::Pipeline(format!("conversion_method index must be an integer in '{table_name}'"))
        })?;
        if index < 0 || index as usize >= param_count {
            return Err(JdiError::Pipeline(format!(
                "conversion_method index {index} out of range for '{table_name}'"
            )));
        }
        let method_str = pair[1].as_str().ok_or_else(|| {
            JdiError::Pipeline(format!("conversion_method value must be a string in '{table_name}'"))
        })?;
        if method_str.is_empty() {
            continue;
        }
        let method = ConversionMethod::from_str_normalized(method_str).ok_or_else(|| {
            JdiError::Pipeline(format!(
                "invalid conversion method '{method_str}' for '{table_name}'"
            ))
        })?;
        conversions.insert(index as usize, method);
    }
    Ok(conversions)
}

fn parse_conversion_method_named(
    profile: &toml::value::Table,
    table_name: &str,
    parameters: &IndexMap<String, KeyPath>,
) -> Result<HashMap<String, ConversionMethod>> {
    let mut conversions = HashMap::new();
    let Some(raw) = profile.get("conversion_method") else {
        return Ok(conversions);
    };
    let items = raw.as_array().ok_or_else(|| {
        JdiError::Pipeline(format!("conversion_method for '{table_name}' must be an array"))
    })?;
    if items.len() % 2 != 0 {
        return Err(JdiError::Pipeline(format!(
            "conversion_method for '{table_name}' is not a list of pairs"
        )));
    }
    for pair in items.chunks(2) {
        let key = pair[0].as_str().ok_or_else(|| {
            JdiError::Pipeline(format!("conversion_method key must be a string in '{table_name}'"))
        })?;
        if !parameters.contains_key(key) {
            return Err(JdiError::Pipeline(format!(
                "conversion_method references unknown parameter '{key}' in '{table_name}'"
            )));
        }
        let method_str = pair[1].as_str().ok_or_else(|| {
            JdiError::Pipeline(format!("conversion_method value must be a string in '{table_name}'"))
        })?;
        if method_str.is_empty() {
            continue;
        }
        let method = ConversionMethod::from_str_normalized(method_str).ok_or_else(|| {
            JdiError::Pipeline(format!(
                "invalid conversion method '{method_str}' for '{table_name}'"
            ))
        })?;
        conversions.insert(key.to_string(), method);
    }
    Ok(conversions)
}

fn table_to_string_map(table: &toml::value::Table) -> HashMap<String, String> {
    table
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect()
}

fn as_table<'a>(value: &'a Toml, path: &str) -> Result<&'a toml::value::Table> {
    value
        .as_table()
        .ok_or_else(|| JdiError::Pipeline(format!("'{path}' must be a table")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_pipeline_document() {
        let doc = r#"
[table_definitions]
type = "sqlite"
path = "db.sqlite"
tables = ["CREATE TABLE users(user_code TEXT PRIMARY KEY, name TEXT)"]

[[data_link.sources]]
name = "users"
type = "API"
endpoint = "/v3/users/"
result_format = "json-object-results"

[data_link.insertion_profile.users]
query = "INSERT INTO users VALUES (?, ?)"
source = "users"
named_parameters = { code = ["user_code"], name = ["name"] }
"#;
        let pipeline = parse_pipeline_toml(doc).unwrap();
        assert_eq!(pipeline.data_link.sources.len(), 1);
        assert_eq!(pipeline.data_link.insertion_profiles.len(), 1);
        match pipeline.table_definition {
            DbDefinition::Sqlite { path, tables } => {
                assert_eq!(path, "db.sqlite");
                assert_eq!(tables.len(), 1);
            }
        }
    }

    #[test]
    fn rejects_both_positional_and_named_parameters() {
        let doc = r#"
[table_definitions]
type = "sqlite"
path = "db.sqlite"
tables = ["CREATE TABLE users(user_code TEXT PRIMARY KEY)"]

[data_link]

[data_link.insertion_profile.users]
query = "INSERT INTO users VALUES (?)"
source = "users"
named_parameters = { code = ["user_code"] }
positional_parameters = [["user_code"]]
"#;
        assert!(parse_pipeline_toml(doc).is_err());
    }

    #[test]
    fn rejects_insertion_profiles_plural_key() {
        let doc = r#"
[table_definitions]
type = "sqlite"
path = "db.sqlite"
tables = ["CREATE TABLE users(user_code TEXT PRIMARY KEY)"]

[data_link]

[data_link.insertion_profiles.users]
query = "INSERT INTO users VALUES (?)"
source = "users"
named_parameters = { code = ["user_code"] }
"#;
        assert!(parse_pipeline_toml(doc).is_err());
    }
}
