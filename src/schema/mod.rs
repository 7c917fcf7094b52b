//! Schema Toolkit (C4): the `TableStructure` data model, the DDL parser and
//! the live-DB validator.

pub mod parser;
pub mod validator;

use serde::{Deserialize, Serialize};

pub use parser::parse_sql;
pub use validator::check_table_structure;

/// Controls one observable parsing difference: in non-SQLite dialects a
/// column listed in a table-level `PRIMARY KEY` is implicitly `NOT NULL`; in
/// SQLite it is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlDialect {
    Sqlite,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub type_token: String,
    pub not_null: bool,
    pub autoincrement: bool,
    pub default_literal: Option<String>,
    pub foreign_key: Option<(String, String)>,
}

/// `{name, columns[], unique_keys[list of lists], primary_keys[list], raw_ddl}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStructure {
    pub name: String,
    pub columns: Vec<Column>,
    pub unique_keys: Vec<Vec<String>>,
    pub primary_keys: Vec<String>,
    pub raw_ddl: Option<String>,
}

impl TableStructure {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}
