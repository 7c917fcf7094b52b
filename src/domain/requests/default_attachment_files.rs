//! `detail` -> `default_attachment_files`. Grounded on
//! `jobcan_di/database/requests/_default_attachment_files.py`.

use serde_json::{json, Value};
use sqlx::SqlitePool;

use super::data_class::FileDataList;
use crate::domain::json_ext::array_field_or_empty;
use crate::errors::Result;

pub fn update_default_attachment_files(detail: &Value, f_list: &mut FileDataList) -> Result<()> {
    for file in array_field_or_empty(detail, "default_attachment_files")? {
        f_list.add_file(file, 5, None);
    }
    Ok(())
}

/// A file with `default_attachment` repeated `n` appears `n` times in the
/// result, matching the original's recursive-CTE expansion.
pub async fn retrieve_default_attachment_files(pool: &SqlitePool, request_id: &str) -> Result<Vec<Value>> {
    let rows: Vec<(String, String, String, i64)> = sqlx::query_as(
        "SELECT f.id, f.name, f.type, a.default_attachment FROM file_associations a
         JOIN files f ON a.file_id = f.id
         WHERE a.request_id = ? AND a.default_attachment > 0",
    )
    .bind(request_id)
    .fetch_all(pool)
    .await?;

    let mut files = Vec::new();
    for (id, name, file_type, count) in rows {
        for _ in 0..count {
            files.push(json!({ "id": id, "name": name, "type": file_type }));
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::requests::table_init;
    use serde_json::json;

    async fn pool() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        table_init::create_tables(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn retrieve_repeats_a_file_by_its_attachment_count() {
        let pool = pool().await;
        sqlx::query("INSERT INTO files (id, name, type) VALUES ('f1', 'a.pdf', 'pdf')").execute(&pool).await.unwrap();
        sqlx::query(
            "INSERT INTO file_associations (request_id, file_id, default_attachment) VALUES ('r1', 'f1', 3)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let files = retrieve_default_attachment_files(&pool, "r1").await.unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(files[0]["id"], json!("f1"));
    }

    #[tokio::test]
    async fn retrieve_skips_files_with_no_default_attachment() {
        let pool = pool().await;
        sqlx::query("INSERT INTO files (id, name, type) VALUES ('f1', 'a.pdf', 'pdf')").execute(&pool).await.unwrap();
        sqlx::query(
            "INSERT INTO file_associations (request_id, file_id, customized_item_id, default_attachment) VALUES ('r1', 'f1', 1, 0)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let files = retrieve_default_attachment_files(&pool, "r1").await.unwrap();
        assert!(files.is_empty());
    }
}
