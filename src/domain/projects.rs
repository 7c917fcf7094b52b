//! Store and retrieve `/v1/project/` responses. Grounded on
//! `jobcan_di/database/project.py`.

use serde_json::{json, Value};
use sqlx::{Row, SqlitePool};

use super::json_ext::str_field;
use crate::errors::Result;

pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query("CREATE TABLE IF NOT EXISTS projects (project_code TEXT PRIMARY KEY, project_name TEXT)")
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update(pool: &SqlitePool, record: &Value) -> Result<()> {
    sqlx::query("INSERT OR REPLACE INTO projects (project_code, project_name) VALUES (?, ?)")
        .bind(str_field(record, "project_code")?)
        .bind(str_field(record, "project_name")?)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn retrieve(pool: &SqlitePool, project_codes: &[String]) -> Result<Vec<Value>> {
    let rows = if project_codes.is_empty() {
        sqlx::query("SELECT project_code, project_name FROM projects").fetch_all(pool).await?
    } else {
        let placeholders = vec!["?"; project_codes.len()].join(",");
        let sql = format!("SELECT project_code, project_name FROM projects WHERE project_code IN ({placeholders})");
        let mut q = sqlx::query(&sql);
        for code in project_codes {
            q = q.bind(code);
        }
        q.fetch_all(pool).await?
    };

    rows.into_iter()
        .map(|row| {
            Ok(json!({
                "project_code": row.try_get::<String, _>("project_code")?,
                "project_name": row.try_get::<String, _>("project_name")?,
            }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn round_trips_a_project() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        create_tables(&pool).await.unwrap();

        update(&pool, &json!({"project_code": "pr1", "project_name": "Website Redesign"})).await.unwrap();

        let results = retrieve(&pool, &[]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["project_name"], "Website Redesign");
    }
}
