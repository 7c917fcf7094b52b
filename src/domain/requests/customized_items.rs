//! `customized_items`, `table_data`, `generic_masters` and
//! `generic_master_additional_items`. Grounded on
//! `jobcan_di/database/requests/_customized_items.py`.

use serde_json::{json, Value};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use super::data_class::{FileDataList, GenericMasterDataList};
use crate::domain::json_ext::{array_field_or_empty, opt_str_field, str_field};
use crate::errors::Result;

async fn update_table_data(
    tx: &mut Transaction<'_, Sqlite>,
    customized_item: &Value,
    customized_item_id: i64,
    g_list: &mut GenericMasterDataList,
) -> Result<()> {
    let rows = array_field_or_empty(customized_item, "table")?;
    for (i, row) in rows.iter().enumerate() {
        let cells = row.as_array().cloned().unwrap_or_default();
        for (j, cell) in cells.iter().enumerate() {
            sqlx::query(
                "INSERT INTO table_data (customized_item_id, column_number, value, index_1, index_2)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(customized_item_id, index_1, index_2) DO UPDATE SET
                     column_number = excluded.column_number,
                     value = excluded.value",
            )
            .bind(customized_item_id)
            .bind(cell.get("column_number").and_then(Value::as_i64))
            .bind(opt_str_field(cell, "value"))
            .bind(i as i64)
            .bind(j as i64)
            .execute(&mut **tx)
            .await?;

            let td_id: i64 =
                sqlx::query("SELECT id FROM table_data WHERE customized_item_id = ? AND index_1 = ? AND index_2 = ?")
                    .bind(customized_item_id)
                    .bind(i as i64)
                    .bind(j as i64)
                    .fetch_one(&mut **tx)
                    .await?
                    .try_get(0)?;

            if let Some(gm) = cell.get("generic_master").filter(|v| !v.is_null()) {
                g_list.add_generic_master(gm, None, Some(td_id));
            }
        }
    }
    Ok(())
}

async fn update_generic_masters(tx: &mut Transaction<'_, Sqlite>, g_list: &mut GenericMasterDataList) -> Result<()> {
    let mut gm_ids = Vec::with_capacity(g_list.masters().len());
    for master in g_list.masters() {
        let existing: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM generic_masters
             WHERE (customized_item_id IS ? OR (customized_item_id IS NULL AND ? IS NULL))
               AND (table_data_id IS ? OR (table_data_id IS NULL AND ? IS NULL))",
        )
        .bind(master.customized_item_id)
        .bind(master.customized_item_id)
        .bind(master.table_data_id)
        .bind(master.table_data_id)
        .fetch_optional(&mut **tx)
        .await?;

        let gm_id = if let Some((id,)) = existing {
            sqlx::query("UPDATE generic_masters SET record_name = ?, record_code = ? WHERE id = ?")
                .bind(&master.record_name)
                .bind(&master.record_code)
                .bind(id)
                .execute(&mut **tx)
                .await?;
            id
        } else {
            let result = sqlx::query(
                "INSERT INTO generic_masters (record_name, record_code, customized_item_id, table_data_id)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&master.record_name)
            .bind(&master.record_code)
            .bind(master.customized_item_id)
            .bind(master.table_data_id)
            .execute(&mut **tx)
            .await?;
            result.last_insert_rowid()
        };
        gm_ids.push(gm_id);
    }
    g_list.set_master_ids(&gm_ids);

    for (gm_id, items) in g_list.ids_and_items() {
        for (i, value) in items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO generic_master_additional_items (generic_master_id, item_value, item_index)
                 VALUES (?, ?, ?)
                 ON CONFLICT(generic_master_id, item_index) DO UPDATE SET item_value = excluded.item_value",
            )
            .bind(gm_id)
            .bind(value)
            .bind(i as i64)
            .execute(&mut **tx)
            .await?;
        }
    }
    Ok(())
}

pub async fn update_customized_items(
    tx: &mut Transaction<'_, Sqlite>,
    detail: &Value,
    request_id: &str,
    f_list: &mut FileDataList,
) -> Result<()> {
    let mut g_list = GenericMasterDataList::new();
    let items = array_field_or_empty(detail, "customized_items")?;

    for (i, item) in items.iter().enumerate() {
        sqlx::query(
            "INSERT INTO customized_items (request_id, title, content, item_index)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(request_id, item_index) DO UPDATE SET title = excluded.title, content = excluded.content",
        )
        .bind(request_id)
        .bind(str_field(item, "title")?)
        .bind(opt_str_field(item, "content"))
        .bind(i as i64)
        .execute(&mut **tx)
        .await?;

        let item_id: i64 = sqlx::query("SELECT id FROM customized_items WHERE request_id = ? AND item_index = ?")
            .bind(request_id)
            .bind(i as i64)
            .fetch_one(&mut **tx)
            .await?
            .try_get(0)?;

        for file in array_field_or_empty(item, "files")? {
            f_list.add_file(file, 0, Some(item_id));
        }

        if let Some(gm) = item.get("generic_master").filter(|v| !v.is_null()) {
            g_list.add_generic_master(gm, Some(item_id), None);
        }

        update_table_data(tx, item, item_id, &mut g_list).await?;
    }

    update_generic_masters(tx, &mut g_list).await
}

pub async fn retrieve_customized_items(pool: &SqlitePool, request_id: &str) -> Result<Vec<Value>> {
    let items = sqlx::query(
        "SELECT ci.id, ci.title, ci.content FROM customized_items ci WHERE ci.request_id = ? ORDER BY ci.item_index",
    )
    .bind(request_id)
    .fetch_all(pool)
    .await?;

    let mut results = Vec::with_capacity(items.len());
    for row in items {
        let item_id: i64 = row.try_get("id")?;

        let generic_master: Option<(String, String, i64)> =
            sqlx::query_as("SELECT record_name, record_code, id FROM generic_masters WHERE customized_item_id = ?")
                .bind(item_id)
                .fetch_optional(pool)
                .await?;
        let generic_master_json = match generic_master {
            Some((record_name, record_code, gm_id)) => {
                json!({
                    "record_name": record_name,
                    "record_code": record_code,
                    "additional_items": additional_items(pool, gm_id).await?,
                })
            }
            None => Value::Null,
        };

        let files: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT f.id, f.name, f.type FROM file_associations fa
             JOIN files f ON fa.file_id = f.id WHERE fa.customized_item_id = ?",
        )
        .bind(item_id)
        .fetch_all(pool)
        .await?;

        let table_rows: Vec<(i64, i64, i64, Option<String>)> = sqlx::query_as(
            "SELECT index_1, index_2, column_number, value FROM table_data WHERE customized_item_id = ?
             ORDER BY index_1, index_2",
        )
        .bind(item_id)
        .fetch_all(pool)
        .await?;

        let mut table: Vec<Vec<Value>> = Vec::new();
        for (index_1, index_2, column_number, value) in table_rows {
            let td_id: i64 = sqlx::query(
                "SELECT id FROM table_data WHERE customized_item_id = ? AND index_1 = ? AND index_2 = ?",
            )
            .bind(item_id)
            .bind(index_1)
            .bind(index_2)
            .fetch_one(pool)
            .await?
            .try_get(0)?;

            let gm_for_cell: Option<(String, String, i64)> =
                sqlx::query_as("SELECT record_name, record_code, id FROM generic_masters WHERE table_data_id = ?")
                    .bind(td_id)
                    .fetch_optional(pool)
                    .await?;
            let gm_for_cell_json = match gm_for_cell {
                Some((record_name, record_code, gm_id)) => json!({
                    "record_name": record_name,
                    "record_code": record_code,
                    "additional_items": additional_items(pool, gm_id).await?,
                }),
                None => Value::Null,
            };

            let cell = json!({ "column_number": column_number, "value": value, "generic_master": gm_for_cell_json });
            while table.len() <= index_1 as usize {
                table.push(Vec::new());
            }
            table[index_1 as usize].push(cell);
        }

        results.push(json!({
            "title": row.try_get::<String, _>("title")?,
            "content": row.try_get::<Option<String>, _>("content")?,
            "generic_master": generic_master_json,
            "files": files.into_iter().map(|(id, name, file_type)| json!({"id": id, "name": name, "type": file_type})).collect::<Vec<_>>(),
            "table": table,
        }));
    }

    Ok(results)
}

async fn additional_items(pool: &SqlitePool, generic_master_id: i64) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT item_value FROM generic_master_additional_items WHERE generic_master_id = ? ORDER BY item_index",
    )
    .bind(generic_master_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(v,)| v).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::requests::table_init;
    use serde_json::json;

    async fn setup() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        table_init::create_tables(&pool).await.unwrap();
        sqlx::query("INSERT INTO requests (id) VALUES ('r1')").execute(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn stores_and_retrieves_customized_items_with_generic_master() {
        let pool = setup().await;
        let detail = json!({
            "customized_items": [{
                "title": "Item 1",
                "content": "some content",
                "files": [],
                "generic_master": {"record_name": "Category", "record_code": "cat1", "additional_items": ["a", "b"]},
                "table": [],
            }]
        });

        let mut f_list = FileDataList::new("r1");
        let mut tx = pool.begin().await.unwrap();
        update_customized_items(&mut tx, &detail, "r1", &mut f_list).await.unwrap();
        tx.commit().await.unwrap();

        let results = retrieve_customized_items(&pool, "r1").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["title"], "Item 1");
        assert_eq!(results[0]["generic_master"]["record_code"], "cat1");
        assert_eq!(results[0]["generic_master"]["additional_items"].as_array().unwrap().len(), 2);
    }
}
