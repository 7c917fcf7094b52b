//! Store and retrieve `/v1/positions/` responses. Grounded on
//! `jobcan_di/database/positions.py`.

use serde_json::{json, Value};
use sqlx::{Row, SqlitePool};

use super::json_ext::{opt_str_field, str_field};
use crate::errors::Result;

pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS positions (
            position_code TEXT PRIMARY KEY,
            position_name TEXT,
            description TEXT
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update(pool: &SqlitePool, record: &Value) -> Result<()> {
    sqlx::query("INSERT OR REPLACE INTO positions (position_code, position_name, description) VALUES (?, ?, ?)")
        .bind(str_field(record, "position_code")?)
        .bind(str_field(record, "position_name")?)
        .bind(opt_str_field(record, "description"))
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn retrieve(pool: &SqlitePool, position_codes: &[String]) -> Result<Vec<Value>> {
    let rows = if position_codes.is_empty() {
        sqlx::query("SELECT position_code, position_name, description FROM positions").fetch_all(pool).await?
    } else {
        let placeholders = vec!["?"; position_codes.len()].join(",");
        let sql =
            format!("SELECT position_code, position_name, description FROM positions WHERE position_code IN ({placeholders})");
        let mut q = sqlx::query(&sql);
        for code in position_codes {
            q = q.bind(code);
        }
        q.fetch_all(pool).await?
    };

    rows.into_iter()
        .map(|row| {
            Ok(json!({
                "position_code": row.try_get::<String, _>("position_code")?,
                "position_name": row.try_get::<String, _>("position_name")?,
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
    async fn round_trips_a_position() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        create_tables(&pool).await.unwrap();

        update(&pool, &json!({"position_code": "p1", "position_name": "Manager", "description": null})).await.unwrap();

        let results = retrieve(&pool, &["p1".to_string()]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["position_name"], "Manager");
    }
}
