//! Loader (C8): applies transformed rows to a target SQLite table via a
//! prepared statement, once per table, committing once at the end.
//!
//! SQL errors never propagate as a crate-level [`JdiError`] — the caller
//! (Gateway, C10) decides whether a failed store is fatal or a per-item
//! warning, so this module only ever returns a boolean success plus a
//! message (spec.md §4.8).

use std::collections::HashMap;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use sqlx::sqlite::SqliteArguments;
use sqlx::SqlitePool;

use super::model::{DataLink, InsertionProfile, Source};
use super::transform::{
    apply_conversion, convert_rows, transform_named, transform_positional, ConversionMethod,
    ErrorHandling, KeyPath,
};
use crate::errors::{JdiError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct StoreOutcome {
    pub success: bool,
    pub message: Option<String>,
}

impl StoreOutcome {
    fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Loads one table's insertion profile against SQLite, given the already
/// fetched source payloads keyed by data-source name.
pub async fn load_table(
    pool: &SqlitePool,
    profile: &InsertionProfile,
    link: &DataLink,
    fetched: &HashMap<String, Value>,
    opts: &ErrorHandling,
) -> Result<StoreOutcome> {
    let units = resolve_units(profile.sources(), link, fetched)?;

    let exec_result = match profile {
        InsertionProfile::Positional {
            query,
            parameters,
            conversions,
            ..
        } => {
            let mut rows = transform_positional(&units, parameters, opts)?;
            convert_positional_rows(&mut rows, conversions)?;
            execute_positional(pool, query, &rows).await
        }
        InsertionProfile::Named {
            query,
            parameters,
            conversions,
            ..
        } => {
            let mut rows = transform_named(&units, parameters, opts)?;
            convert_rows(&mut rows, conversions)?;
            execute_named(pool, query, &rows, parameters).await
        }
    };

    match exec_result {
        Ok(()) => Ok(StoreOutcome::ok()),
        Err(JdiError::Sqlx(e)) => Ok(StoreOutcome::failed(e.to_string())),
        Err(other) => Err(other),
    }
}

/// Resolves a profile's declared sources into the flat list of source units
/// each `transform_*` call expects, expanding `regex_source` references
/// against every matching name in the data link.
fn resolve_units(
    sources: &[Source],
    link: &DataLink,
    fetched: &HashMap<String, Value>,
) -> Result<Vec<Value>> {
    let mut units = Vec::new();

    for source_ref in sources {
        if source_ref.regex {
            let re = Regex::new(&source_ref.name)?;
            for (name, data_source) in &link.sources {
                if re.is_match(name) {
                    units.extend(data_source.extract_data(fetched.get(name))?);
                }
            }
        } else {
            let data_source = link.sources.get(&source_ref.name).ok_or_else(|| {
                JdiError::Pipeline(format!("unknown data source '{}'", source_ref.name))
            })?;
            units.extend(data_source.extract_data(fetched.get(&source_ref.name))?);
        }
    }

    Ok(units)
}

fn convert_positional_rows(
    rows: &mut [Vec<Value>],
    conversions: &HashMap<usize, ConversionMethod>,
) -> Result<()> {
    for row in rows.iter_mut() {
        for (&idx, method) in conversions {
            if let Some(value) = row.get(idx) {
                row[idx] = apply_conversion(value, *method)?;
            }
        }
    }
    Ok(())
}

async fn execute_named(
    pool: &SqlitePool,
    query: &str,
    rows: &[IndexMap<String, Value>],
    parameters: &IndexMap<String, KeyPath>,
) -> Result<()> {
    let mut tx = pool.begin().await?;
    for row in rows {
        let mut q = sqlx::query(query);
        for key in parameters.keys() {
            let value = row.get(key).cloned().unwrap_or(Value::Null);
            q = bind_value(q, value);
        }
        q.execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

async fn execute_positional(pool: &SqlitePool, query: &str, rows: &[Vec<Value>]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for row in rows {
        let mut q = sqlx::query(query);
        for value in row {
            q = bind_value(q, value.clone());
        }
        q.execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>;

fn bind_value(query: SqliteQuery<'_>, value: Value) -> SqliteQuery<'_> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
        Value::String(s) => query.bind(s),
        other => query.bind(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::model::{DataSource, ResultFormat, DEFAULT_RESULTS_KEY};
    use serde_json::json;

    async fn setup() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE users(user_code TEXT PRIMARY KEY, name TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    fn key(s: &str) -> KeyPath {
        vec![super::super::transform::PathStep::Key(s.to_string())]
    }

    #[tokio::test]
    async fn loads_named_rows_into_sqlite() {
        let pool = setup().await;

        let mut link = DataLink::new();
        link.add_source(DataSource::Raw {
            name: "users".into(),
            result_format: ResultFormat::MultipleJsonEntries,
            results_key: DEFAULT_RESULTS_KEY.into(),
            data: json!([{"user_code": "u1", "name": "Alice"}]),
        })
        .unwrap();

        let mut parameters = IndexMap::new();
        parameters.insert("code".to_string(), key("user_code"));
        parameters.insert("name".to_string(), key("name"));

        let profile = InsertionProfile::Named {
            query: "INSERT INTO users(user_code, name) VALUES (?, ?)".to_string(),
            sources: vec![Source {
                name: "users".into(),
                regex: false,
            }],
            parameters,
            conversions: HashMap::new(),
        };

        let fetched = HashMap::new();
        let outcome = load_table(&pool, &profile, &link, &fetched, &ErrorHandling::default())
            .await
            .unwrap();
        assert!(outcome.success);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn sql_error_surfaces_as_a_failed_outcome_not_an_error() {
        let pool = setup().await;

        let mut link = DataLink::new();
        link.add_source(DataSource::Raw {
            name: "users".into(),
            result_format: ResultFormat::MultipleJsonEntries,
            results_key: DEFAULT_RESULTS_KEY.into(),
            data: json!([{"user_code": "u1", "name": "Alice"}]),
        })
        .unwrap();

        let mut parameters = IndexMap::new();
        parameters.insert("code".to_string(), key("user_code"));

        let profile = InsertionProfile::Named {
            query: "INSERT INTO does_not_exist(user_code) VALUES (?)".to_string(),
            sources: vec![Source {
                name: "users".into(),
                regex: false,
            }],
            parameters,
            conversions: HashMap::new(),
        };

        let fetched = HashMap::new();
        let outcome = load_table(&pool, &profile, &link, &fetched, &ErrorHandling::default())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.is_some());
    }
}
