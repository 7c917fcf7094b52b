//! Store and retrieve `/v1/forms/` responses. Grounded on
//! `jobcan_di/database/forms.py`.

use serde_json::{json, Value};
use sqlx::{Row, SqlitePool};

use super::json_ext::{i64_field, opt_str_field, str_field};
use crate::errors::Result;

pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS forms (
            id INTEGER PRIMARY KEY,
            category TEXT,
            form_type TEXT,
            settlement_type TEXT,
            name TEXT,
            view_type TEXT,
            description TEXT
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update(pool: &SqlitePool, record: &Value) -> Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO forms (id, category, form_type, settlement_type, name, view_type, description)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(i64_field(record, "id")?)
    .bind(str_field(record, "category")?)
    .bind(str_field(record, "form_type")?)
    .bind(opt_str_field(record, "settlement_type"))
    .bind(str_field(record, "name")?)
    .bind(str_field(record, "view_type")?)
    .bind(opt_str_field(record, "description"))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn retrieve(pool: &SqlitePool, form_ids: &[i64]) -> Result<Vec<Value>> {
    let rows = if form_ids.is_empty() {
        sqlx::query("SELECT id, category, form_type, settlement_type, name, view_type, description FROM forms")
            .fetch_all(pool)
            .await?
    } else {
        let placeholders = vec!["?"; form_ids.len()].join(",");
        let sql = format!(
            "SELECT id, category, form_type, settlement_type, name, view_type, description
             FROM forms WHERE id IN ({placeholders})"
        );
        let mut q = sqlx::query(&sql);
        for id in form_ids {
            q = q.bind(id);
        }
        q.fetch_all(pool).await?
    };

    rows.into_iter()
        .map(|row| {
            Ok(json!({
                "id": row.try_get::<i64, _>("id")?,
                "category": row.try_get::<String, _>("category")?,
                "form_type": row.try_get::<String, _>("form_type")?,
                "settlement_type": row.try_get::<Option<String>, _>("settlement_type")?,
                "name": row.try_get::<String, _>("name")?,
                "view_type": row.try_get::<String, _>("view_type")?,
                "description": row.try_get::<Option<String>, _>("description")?,
            }))
        })
        .collect()
}

pub async fn retrieve_form_ids(pool: &SqlitePool) -> Result<Vec<i64>> {
    let rows = sqlx::query("SELECT id FROM forms").fetch_all(pool).await?;
    rows.into_iter().map(|row| row.try_get::<i64, _>("id").map_err(Into::into)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn round_trips_a_form_and_lists_ids() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        create_tables(&pool).await.unwrap();

        update(
            &pool,
            &json!({
                "id": 7, "category": "expense", "form_type": "custom", "settlement_type": null,
                "name": "Travel Expense", "view_type": "default", "description": null,
            }),
        )
        .await
        .unwrap();

        let results = retrieve(&pool, &[]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["name"], "Travel Expense");
        assert_eq!(retrieve_form_ids(&pool).await.unwrap(), vec![7]);
    }
}
