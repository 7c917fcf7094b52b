//! Live-DB validator: compares a [`TableStructure`] against what is actually
//! in a SQLite database via `PRAGMA` introspection.

use std::collections::HashSet;

use sqlx::{Row, SqlitePool};

use super::{SqlDialect, TableStructure};
use crate::errors::Result;

#[derive(sqlx::FromRow)]
struct TableInfoRow {
    #[sqlx(rename = "cid")]
    _cid: i64,
    name: String,
    #[sqlx(rename = "type")]
    col_type: String,
    notnull: i64,
    dflt_value: Option<String>,
    pk: i64,
}

/// Returns the first discrepancy found between `table` and the live
/// database, or `None` if the live table matches.
pub async fn check_table_structure(
    pool: &SqlitePool,
    table: &TableStructure,
    dialect: SqlDialect,
) -> Result<Option<String>> {
    let exists: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(&table.name)
            .fetch_optional(pool)
            .await?;
    if exists.is_none() {
        return Ok(Some(format!("Table '{}' does not exist", table.name)));
    }

    if let Some(msg) = validate_table_info(pool, table).await? {
        return Ok(Some(msg));
    }
    if let Some(msg) = validate_index_list(pool, table).await? {
        return Ok(Some(msg));
    }
    if let Some(msg) = validate_foreign_keys(pool, table, dialect).await? {
        return Ok(Some(msg));
    }
    Ok(None)
}

async fn validate_table_info(pool: &SqlitePool, table: &TableStructure) -> Result<Option<String>> {
    let query = format!("PRAGMA table_info({})", table.name);
    let rows = sqlx::query(&query).fetch_all(pool).await?;
    let actual: Vec<TableInfoRow> = rows
        .iter()
        .map(|r| TableInfoRow {
            _cid: r.get("cid"),
            name: r.get("name"),
            col_type: r.get("type"),
            notnull: r.get("notnull"),
            dflt_value: r.get("dflt_value"),
            pk: r.get("pk"),
        })
        .collect();

    let actual_names: HashSet<&str> = actual.iter().map(|r| r.name.as_str()).collect();

    for column in &table.columns {
        let Some(actual_col) = actual.iter().find(|r| r.name == column.name) else {
            return Ok(Some(format!(
                "Table '{}' is missing expected column '{}'",
                table.name, column.name
            )));
        };
        if !actual_col.col_type.eq_ignore_ascii_case(&column.type_token) {
            return Ok(Some(format!(
                "Table '{}' column '{}' has type '{}', expected '{}'",
                table.name, column.name, actual_col.col_type, column.type_token
            )));
        }
        let actual_not_null = actual_col.notnull != 0;
        if actual_not_null != column.not_null {
            return Ok(Some(format!(
                "Table '{}' column '{}' NOT NULL mismatch: expected {}, got {}",
                table.name, column.name, column.not_null, actual_not_null
            )));
        }
        if let Some(expected_default) = &column.default_literal {
            match &actual_col.dflt_value {
                Some(actual_default) if actual_default == expected_default => {}
                _ => {
                    return Ok(Some(format!(
                        "Table '{}' column '{}' default mismatch: expected '{}', got {:?}",
                        table.name, column.name, expected_default, actual_col.dflt_value
                    )))
                }
            }
        }
        if column.autoincrement && actual_col.pk == 0 {
            return Ok(Some(format!(
                "Table '{}' column '{}' expected AUTOINCREMENT but is not the primary key",
                table.name, column.name
            )));
        }
    }

    let expected_names: HashSet<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    let unexpected: Vec<&str> = actual_names.difference(&expected_names).copied().collect();
    if !unexpected.is_empty() {
        return Ok(Some(format!(
            "Table '{}' has unexpected columns: {}",
            table.name,
            unexpected.join(", ")
        )));
    }

    let actual_pk: HashSet<&str> = actual
        .iter()
        .filter(|r| r.pk > 0)
        .map(|r| r.name.as_str())
        .collect();
    let expected_pk: HashSet<&str> = table.primary_keys.iter().map(String::as_str).collect();
    if actual_pk != expected_pk {
        return Ok(Some(format!(
            "Table '{}' primary key mismatch: expected {:?}, got {:?}",
            table.name, expected_pk, actual_pk
        )));
    }

    Ok(None)
}

async fn validate_index_list(pool: &SqlitePool, table: &TableStructure) -> Result<Option<String>> {
    let index_list_query = format!("PRAGMA index_list({})", table.name);
    let index_rows = sqlx::query(&index_list_query).fetch_all(pool).await?;

    let mut actual_unique_sets: Vec<HashSet<String>> = Vec::new();
    for row in index_rows {
        let is_unique: i64 = row.get("unique");
        if is_unique == 0 {
            continue;
        }
        let index_name: String = row.get("name");
        let info_query = format!("PRAGMA index_info({index_name})");
        let info_rows = sqlx::query(&info_query).fetch_all(pool).await?;
        let cols: HashSet<String> = info_rows.iter().map(|r| r.get::<String, _>("name")).collect();
        actual_unique_sets.push(cols);
    }

    for expected in &table.unique_keys {
        let expected_set: HashSet<String> = expected.iter().cloned().collect();
        if !actual_unique_sets.contains(&expected_set) {
            return Ok(Some(format!(
                "Unique keys mismatch for table '{}': expected a UNIQUE index on {:?}",
                table.name, expected
            )));
        }
    }
    Ok(None)
}

async fn validate_foreign_keys(
    pool: &SqlitePool,
    table: &TableStructure,
    dialect: SqlDialect,
) -> Result<Option<String>> {
    if dialect != SqlDialect::Sqlite {
        let enabled: (i64,) = sqlx::query_as("PRAGMA foreign_keys").fetch_one(pool).await?;
        if enabled.0 == 0 {
            return Ok(Some("PRAGMA foreign_keys is not enabled".to_string()));
        }
    }

    let fk_query = format!("PRAGMA foreign_key_list({})", table.name);
    let rows = sqlx::query(&fk_query).fetch_all(pool).await?;

    for column in &table.columns {
        let Some((ref_table, ref_column)) = &column.foreign_key else {
            continue;
        };
        let matched = rows.iter().any(|r| {
            let from: String = r.get("from");
            let to: String = r.get("to");
            let table_name: String = r.get("table");
            from == column.name && table_name == *ref_table && to == *ref_column
        });
        if !matched {
            return Ok(Some(format!(
                "Table '{}' column '{}' expected foreign key to {}({}) not found",
                table.name, column.name, ref_table, ref_column
            )));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parser::parse_sql;

    async fn setup() -> SqlitePool {
        sqlx::sqlite::SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn detects_missing_unique_index() {
        let pool = setup().await;
        sqlx::query("CREATE TABLE u(id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();

        let expected = &parse_sql(
            "CREATE TABLE u(id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE)",
            SqlDialect::Sqlite,
        )
        .unwrap()[0];

        let result = check_table_structure(&pool, expected, SqlDialect::Sqlite)
            .await
            .unwrap();
        let message = result.expect("expected a mismatch message");
        assert!(message.contains("Unique keys mismatch") || message.contains("unique"));
    }

    #[tokio::test]
    async fn matching_table_passes() {
        let pool = setup().await;
        let ddl = "CREATE TABLE u(id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE)";
        sqlx::query(ddl).execute(&pool).await.unwrap();
        let expected = &parse_sql(ddl, SqlDialect::Sqlite).unwrap()[0];
        let result = check_table_structure(&pool, expected, SqlDialect::Sqlite)
            .await
            .unwrap();
        assert_eq!(result, None);
    }
}
