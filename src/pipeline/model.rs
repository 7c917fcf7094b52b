//! Pipeline Model (C5): pure data classes for a pipeline definition — the DB
//! definition, polymorphic data sources, and positional/named insertion
//! profiles.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{JdiError, Result};
use crate::pipeline::transform::{ConversionMethod, KeyPath};
use crate::schema::TableStructure;

/// Contract between a data source and the transformer: how the extracted
/// payload should be interpreted as a list of units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultFormat {
    DbFlatRows,
    JsonObjectResults,
    NestedJson,
    MultipleJsonEntries,
}

pub const DEFAULT_RESULTS_KEY: &str = "results";

impl ResultFormat {
    pub fn from_str_normalized(s: &str) -> Option<Self> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "DB_FLAT_ROWS" => Some(ResultFormat::DbFlatRows),
            "JSON_OBJECT_RESULTS" => Some(ResultFormat::JsonObjectResults),
            "NESTED_JSON" => Some(ResultFormat::NestedJson),
            "MULTIPLE_JSON_ENTRIES" => Some(ResultFormat::MultipleJsonEntries),
            _ => None,
        }
    }
}

/// A named reference to a data source from an insertion profile; `regex`
/// marks the name as a pattern matching more than one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub regex: bool,
}

/// Polymorphic data source: `{API, SQLite-query, Raw}`, all sharing
/// `{name, result_format, results_key}`.
#[derive(Debug, Clone)]
pub enum DataSource {
    Api {
        name: String,
        result_format: ResultFormat,
        results_key: String,
        endpoint: String,
        headers: HashMap<String, String>,
        params: HashMap<String, String>,
    },
    Sqlite {
        name: String,
        result_format: ResultFormat,
        results_key: String,
        path: String,
        query: String,
    },
    Raw {
        name: String,
        result_format: ResultFormat,
        results_key: String,
        data: Value,
    },
}

impl DataSource {
    pub fn name(&self) -> &str {
        match self {
            DataSource::Api { name, .. } => name,
            DataSource::Sqlite { name, .. } => name,
            DataSource::Raw { name, .. } => name,
        }
    }

    pub fn result_format(&self) -> ResultFormat {
        match self {
            DataSource::Api { result_format, .. } => *result_format,
            DataSource::Sqlite { result_format, .. } => *result_format,
            DataSource::Raw { result_format, .. } => *result_format,
        }
    }

    pub fn results_key(&self) -> &str {
        match self {
            DataSource::Api { results_key, .. } => results_key,
            DataSource::Sqlite { results_key, .. } => results_key,
            DataSource::Raw { results_key, .. } => results_key,
        }
    }

    /// Extracts the list of units this source produces, per its
    /// `ResultFormat` contract. `API`/`SQLite` variants require the caller to
    /// have already fetched `fetched_payload` (an HTTP response body or SQL
    /// result set serialized to JSON); `Raw` carries its data inline.
    pub fn extract_data(&self, fetched_payload: Option<&Value>) -> Result<Vec<Value>> {
        let payload = match self {
            DataSource::Raw { data, .. } => data,
            _ => fetched_payload.ok_or_else(|| {
                JdiError::Pipeline(format!("no payload supplied for source '{}'", self.name()))
            })?,
        };

        match self.result_format() {
            ResultFormat::DbFlatRows => Ok(match payload {
                Value::Array(rows) => rows.clone(),
                other => vec![other.clone()],
            }),
            ResultFormat::JsonObjectResults => match payload.get(self.results_key()) {
                Some(Value::Array(rows)) => Ok(rows.clone()),
                Some(other) => Ok(vec![other.clone()]),
                None => Ok(Vec::new()),
            },
            ResultFormat::NestedJson => Ok(vec![payload.clone()]),
            ResultFormat::MultipleJsonEntries => match payload {
                Value::Array(entries) => Ok(entries.clone()),
                other => Ok(vec![other.clone()]),
            },
        }
    }
}

/// Positional or Named insertion profile: `{query, sources, parameters,
/// conversions}`.
#[derive(Debug, Clone)]
pub enum InsertionProfile {
    Positional {
        query: String,
        sources: Vec<Source>,
        parameters: Vec<KeyPath>,
        conversions: HashMap<usize, ConversionMethod>,
    },
    Named {
        query: String,
        sources: Vec<Source>,
        parameters: IndexMap<String, KeyPath>,
        conversions: HashMap<String, ConversionMethod>,
    },
}

impl InsertionProfile {
    pub fn query(&self) -> &str {
        match self {
            InsertionProfile::Positional { query, .. } => query,
            InsertionProfile::Named { query, .. } => query,
        }
    }

    pub fn sources(&self) -> &[Source] {
        match self {
            InsertionProfile::Positional { sources, .. } => sources,
            InsertionProfile::Named { sources, .. } => sources,
        }
    }
}

/// DB Definition; the SQLite variant carries the database path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DbDefinition {
    Sqlite {
        path: String,
        #[serde(skip)]
        tables: Vec<TableStructure>,
    },
}

/// `{sources: map<name, DataSource>, insertion_profiles: map<table_name,
/// InsertionProfile>}`. Source names are unique within a data link.
#[derive(Debug, Default)]
pub struct DataLink {
    pub sources: IndexMap<String, DataSource>,
    pub insertion_profiles: HashMap<String, InsertionProfile>,
}

impl DataLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects duplicates by source name.
    pub fn add_source(&mut self, source: DataSource) -> Result<()> {
        if self.sources.contains_key(source.name()) {
            return Err(JdiError::Pipeline(format!(
                "duplicate data source name: {}",
                source.name()
            )));
        }
        self.sources.insert(source.name().to_string(), source);
        Ok(())
    }
}

/// `{table_definition, data_link}`.
#[derive(Debug)]
pub struct PipelineDefinition {
    pub table_definition: DbDefinition,
    pub data_link: DataLink,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_link_rejects_duplicate_source_names() {
        let mut link = DataLink::new();
        let src = DataSource::Raw {
            name: "s1".into(),
            result_format: ResultFormat::NestedJson,
            results_key: DEFAULT_RESULTS_KEY.into(),
            data: Value::Null,
        };
        link.add_source(src).unwrap();
        let dup = DataSource::Raw {
            name: "s1".into(),
            result_format: ResultFormat::NestedJson,
            results_key: DEFAULT_RESULTS_KEY.into(),
            data: Value::Null,
        };
        assert!(link.add_source(dup).is_err());
    }

    #[test]
    fn result_format_normalizes_case_and_hyphens() {
        assert_eq!(
            ResultFormat::from_str_normalized("json-object-results"),
            Some(ResultFormat::JsonObjectResults)
        );
    }
}
