//! Store and retrieve `/v1/group/` responses. Grounded on
//! `jobcan_di/database/group.py`.

use serde_json::{json, Value};
use sqlx::{Row, SqlitePool};

use super::json_ext::{opt_str_field, str_field};
use crate::errors::Result;

pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS groups (
            group_code TEXT PRIMARY KEY,
            group_name TEXT,
            parent_group_code TEXT,
            description TEXT,
            UNIQUE (group_code, group_name)
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Matches the original's "only insert when no row with this name and
/// code already exists" guard, which tolerates a `NULL` group_code.
pub async fn update(pool: &SqlitePool, record: &Value) -> Result<()> {
    let group_code = opt_str_field(record, "group_code");
    let group_name = str_field(record, "group_name")?;

    sqlx::query(
        "INSERT INTO groups (group_code, group_name, parent_group_code, description)
         SELECT ?, ?, ?, ?
         WHERE NOT EXISTS (
             SELECT 1 FROM groups
             WHERE group_name = ? AND (
                 (? IS NULL AND group_code IS NULL) OR
                 (? IS NOT NULL AND group_code = ?)
             )
         )",
    )
    .bind(group_code)
    .bind(group_name)
    .bind(opt_str_field(record, "parent_group_code"))
    .bind(opt_str_field(record, "description"))
    .bind(group_name)
    .bind(group_code)
    .bind(group_code)
    .bind(group_code)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn retrieve(pool: &SqlitePool, group_codes: &[String]) -> Result<Vec<Value>> {
    let rows = if group_codes.is_empty() {
        sqlx::query("SELECT group_code, group_name, parent_group_code, description FROM groups")
            .fetch_all(pool)
            .await?
    } else {
        let placeholders = vec!["?"; group_codes.len()].join(",");
        let sql = format!(
            "SELECT group_code, group_name, parent_group_code, description FROM groups WHERE group_code IN ({placeholders})"
        );
        let mut q = sqlx::query(&sql);
        for code in group_codes {
            q = q.bind(code);
        }
        q.fetch_all(pool).await?
    };

    rows.into_iter()
        .map(|row| {
            Ok(json!({
                "group_code": row.try_get::<Option<String>, _>("group_code")?,
                "group_name": row.try_get::<String, _>("group_name")?,
                "parent_group_code": row.try_get::<Option<String>, _>("parent_group_code")?,
                "description": row.try_get::<Option<String>, _>("description")?,
            }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn round_trips_a_group() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        create_tables(&pool).await.unwrap();

        update(&pool, &json!({"group_code": "g1", "group_name": "Sales", "parent_group_code": null, "description": null}))
            .await
            .unwrap();

        let results = retrieve(&pool, &[]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["group_name"], "Sales");
    }

    #[tokio::test]
    async fn skips_duplicate_name_and_code_pair() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        create_tables(&pool).await.unwrap();

        let record = json!({"group_code": "g1", "group_name": "Sales", "parent_group_code": null, "description": null});
        update(&pool, &record).await.unwrap();
        update(&pool, &record).await.unwrap();

        assert_eq!(retrieve(&pool, &[]).await.unwrap().len(), 1);
    }
}
