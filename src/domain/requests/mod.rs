//! Store and retrieve `/v1/requests/{request_id}` responses. Grounded on
//! `jobcan_di/database/requests/_requests.py` and its sibling modules.
//!
//! Full depth is kept for `requests` itself and the sub-trees named in
//! `data_class`/`customized_items`/`approval_process`/`default_attachment_files`/
//! `table_init`'s doc comments; `expense`, `payment`, `ec`, `modify_logs` and
//! `viewers` get DDL-only tables via [`table_init::create_tables`] and are
//! surfaced as `null`/`[]` placeholders in [`retrieve`].

mod approval_process;
mod customized_items;
mod data_class;
mod default_attachment_files;
pub mod table_init;

use serde_json::{json, Value};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::domain::json_ext::{i64_field, opt_bool_field, opt_i64_field, opt_str_field, str_field};
use crate::errors::Result;
use data_class::FileDataList;

pub use table_init::create_tables;

async fn update_files(tx: &mut Transaction<'_, Sqlite>, f_list: &FileDataList) -> Result<()> {
    for file in f_list.files() {
        sqlx::query("INSERT OR REPLACE INTO files (id, name, type, user_name, date, deleted) VALUES (?, ?, ?, ?, ?, ?)")
            .bind(&file.id)
            .bind(&file.name)
            .bind(&file.file_type)
            .bind(&file.user_name)
            .bind(&file.date)
            .bind(file.deleted)
            .execute(&mut **tx)
            .await?;
    }

    for assoc in f_list.associations() {
        sqlx::query(
            "INSERT INTO file_associations (
                request_id, file_id, customized_item_id, expense_specific_row_id,
                payment_specific_row_id, approval_step_id, approval_after_completion_id, default_attachment
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(request_id, file_id) DO UPDATE SET
                 customized_item_id = excluded.customized_item_id,
                 expense_specific_row_id = excluded.expense_specific_row_id,
                 payment_specific_row_id = excluded.payment_specific_row_id,
                 approval_step_id = excluded.approval_step_id,
                 approval_after_completion_id = excluded.approval_after_completion_id,
                 default_attachment = excluded.default_attachment",
        )
        .bind(&assoc.request_id)
        .bind(&assoc.file_id)
        .bind(assoc.customized_item_id)
        .bind(assoc.expense_specific_row_id)
        .bind(assoc.payment_specific_row_id)
        .bind(assoc.approval_step_id)
        .bind(assoc.approval_after_completion_id)
        .bind(assoc.default_attachment)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

pub async fn update(pool: &SqlitePool, record: &Value) -> Result<()> {
    let id = str_field(record, "id")?.to_string();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT OR REPLACE INTO requests (
            id, title, status, form_id, form_name, form_type, settlement_type,
            applied_date, applicant_code, applicant_last_name, applicant_first_name,
            applicant_group_name, applicant_group_code, applicant_position_name,
            proxy_applicant_last_name, proxy_applicant_first_name, group_name, group_code,
            project_name, project_code, flow_step_name, is_content_changed, total_amount,
            pay_at, final_approval_period, final_approved_date
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(str_field(record, "title")?)
    .bind(str_field(record, "status")?)
    .bind(i64_field(record, "form_id")?)
    .bind(opt_str_field(record, "form_name"))
    .bind(opt_str_field(record, "form_type"))
    .bind(opt_str_field(record, "settlement_type"))
    .bind(opt_str_field(record, "applied_date"))
    .bind(opt_str_field(record, "applicant_code"))
    .bind(opt_str_field(record, "applicant_last_name"))
    .bind(opt_str_field(record, "applicant_first_name"))
    .bind(opt_str_field(record, "applicant_group_name"))
    .bind(opt_str_field(record, "applicant_group_code"))
    .bind(opt_str_field(record, "applicant_position_name"))
    .bind(opt_str_field(record, "proxy_applicant_last_name"))
    .bind(opt_str_field(record, "proxy_applicant_first_name"))
    .bind(opt_str_field(record, "group_name"))
    .bind(opt_str_field(record, "group_code"))
    .bind(opt_str_field(record, "project_name"))
    .bind(opt_str_field(record, "project_code"))
    .bind(opt_str_field(record, "flow_step_name"))
    .bind(opt_bool_field(record, "is_content_changed"))
    .bind(opt_i64_field(record, "total_amount"))
    .bind(opt_str_field(record, "pay_at"))
    .bind(opt_str_field(record, "final_approval_period"))
    .bind(opt_str_field(record, "final_approved_date"))
    .execute(&mut *tx)
    .await?;

    let mut f_list = FileDataList::new(&id);
    let detail = record.get("detail").cloned().unwrap_or(Value::Null);

    customized_items::update_customized_items(&mut tx, &detail, &id, &mut f_list).await?;
    approval_process::update_approval_process(&mut tx, detail.get("approval_process"), &id, &mut f_list).await?;
    default_attachment_files::update_default_attachment_files(&detail, &mut f_list)?;
    update_files(&mut tx, &f_list).await?;

    tx.commit().await?;
    Ok(())
}

pub async fn retrieve(pool: &SqlitePool, request_id: &str) -> Result<Option<Value>> {
    let header = sqlx::query(
        "SELECT title, status, form_id, form_name, form_type, settlement_type, applied_date,
                applicant_code, applicant_last_name, applicant_first_name, applicant_group_name,
                applicant_group_code, applicant_position_name, proxy_applicant_last_name,
                proxy_applicant_first_name, group_name, group_code, project_name, project_code,
                flow_step_name, is_content_changed, total_amount, pay_at, final_approval_period,
                final_approved_date
         FROM requests WHERE id = ?",
    )
    .bind(request_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = header else { return Ok(None) };

    let customized_items = customized_items::retrieve_customized_items(pool, request_id).await?;
    let approval_process = approval_process::retrieve_approval_process(pool, request_id).await?;
    let default_attachment_files =
        default_attachment_files::retrieve_default_attachment_files(pool, request_id).await?;

    Ok(Some(json!({
        "id": request_id,
        "title": row.try_get::<String, _>("title")?,
        "status": row.try_get::<String, _>("status")?,
        "form_id": row.try_get::<i64, _>("form_id")?,
        "form_name": row.try_get::<Option<String>, _>("form_name")?,
        "form_type": row.try_get::<Option<String>, _>("form_type")?,
        "settlement_type": row.try_get::<Option<String>, _>("settlement_type")?,
        "applied_date": row.try_get::<Option<String>, _>("applied_date")?,
        "applicant_code": row.try_get::<Option<String>, _>("applicant_code")?,
        "applicant_last_name": row.try_get::<Option<String>, _>("applicant_last_name")?,
        "applicant_first_name": row.try_get::<Option<String>, _>("applicant_first_name")?,
        "applicant_group_name": row.try_get::<Option<String>, _>("applicant_group_name")?,
        "applicant_group_code": row.try_get::<Option<String>, _>("applicant_group_code")?,
        "applicant_position_name": row.try_get::<Option<String>, _>("applicant_position_name")?,
        "proxy_applicant_last_name": row.try_get::<Option<String>, _>("proxy_applicant_last_name")?,
        "proxy_applicant_first_name": row.try_get::<Option<String>, _>("proxy_applicant_first_name")?,
        "group_name": row.try_get::<Option<String>, _>("group_name")?,
        "group_code": row.try_get::<Option<String>, _>("group_code")?,
        "project_name": row.try_get::<Option<String>, _>("project_name")?,
        "project_code": row.try_get::<Option<String>, _>("project_code")?,
        "flow_step_name": row.try_get::<Option<String>, _>("flow_step_name")?,
        "is_content_changed": row.try_get::<Option<bool>, _>("is_content_changed")?,
        "total_amount": row.try_get::<Option<i64>, _>("total_amount")?,
        "pay_at": row.try_get::<Option<String>, _>("pay_at")?,
        "final_approval_period": row.try_get::<Option<String>, _>("final_approval_period")?,
        "final_approved_date": row.try_get::<Option<String>, _>("final_approved_date")?,
        "detail": {
            "customized_items": customized_items,
            "expense": Value::Null,
            "payment": Value::Null,
            "ec": Value::Null,
            "approval_process": approval_process,
            "viewers": Value::Array(Vec::new()),
            "default_attachment_files": default_attachment_files,
            "modify_logs": Value::Array(Vec::new()),
        },
    })))
}

/// `status`/`ant_status` are mutually exclusive inclusion/exclusion filters
/// on top of `form_id`, matching the original's `retrieve_ids`.
pub async fn retrieve_ids(
    pool: &SqlitePool,
    form_id: i64,
    status: Option<&[String]>,
    ant_status: Option<&[String]>,
) -> Result<Vec<String>> {
    assert!(status.is_none() || ant_status.is_none(), "status and ant_status cannot both be specified");

    let rows = if let Some(status) = status {
        let placeholders = vec!["?"; status.len()].join(",");
        let mut q = sqlx::query(&format!("SELECT id FROM requests WHERE form_id = ? AND status IN ({placeholders})"));
        q = q.bind(form_id);
        for s in status {
            q = q.bind(s);
        }
        q.fetch_all(pool).await?
    } else if let Some(ant_status) = ant_status {
        let placeholders = vec!["?"; ant_status.len()].join(",");
        let mut q =
            sqlx::query(&format!("SELECT id FROM requests WHERE form_id = ? AND status NOT IN ({placeholders})"));
        q = q.bind(form_id);
        for s in ant_status {
            q = q.bind(s);
        }
        q.fetch_all(pool).await?
    } else {
        sqlx::query("SELECT id FROM requests WHERE form_id = ?").bind(form_id).fetch_all(pool).await?
    };

    rows.into_iter().map(|row| row.try_get::<String, _>("id").map_err(Into::into)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_request() -> Value {
        json!({
            "id": "req-1",
            "title": "Business trip",
            "status": "in_progress",
            "form_id": 7,
            "form_name": "Travel",
            "form_type": "expense",
            "settlement_type": null,
            "applied_date": "2026-07-01",
            "applicant_code": "u1",
            "applicant_last_name": "Yamada",
            "applicant_first_name": "Taro",
            "applicant_group_name": null,
            "applicant_group_code": null,
            "applicant_position_name": null,
            "proxy_applicant_last_name": null,
            "proxy_applicant_first_name": null,
            "group_name": null,
            "group_code": null,
            "project_name": null,
            "project_code": null,
            "flow_step_name": null,
            "is_content_changed": false,
            "total_amount": 5000,
            "pay_at": null,
            "final_approval_period": null,
            "final_approved_date": null,
            "detail": {
                "customized_items": [],
                "approval_process": null,
            }
        })
    }

    #[tokio::test]
    async fn stores_and_retrieves_a_request() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        create_tables(&pool).await.unwrap();

        update(&pool, &sample_request()).await.unwrap();

        let result = retrieve(&pool, "req-1").await.unwrap().unwrap();
        assert_eq!(result["title"], "Business trip");
        assert_eq!(result["total_amount"], 5000);
        assert!(result["detail"]["customized_items"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn retrieve_ids_filters_by_status() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        create_tables(&pool).await.unwrap();
        update(&pool, &sample_request()).await.unwrap();

        let mut other = sample_request();
        other["id"] = json!("req-2");
        other["status"] = json!("completed");
        update(&pool, &other).await.unwrap();

        let in_progress = retrieve_ids(&pool, 7, Some(&["in_progress".to_string()]), None).await.unwrap();
        assert_eq!(in_progress, vec!["req-1".to_string()]);

        let not_completed = retrieve_ids(&pool, 7, None, Some(&["completed".to_string()])).await.unwrap();
        assert_eq!(not_completed, vec!["req-1".to_string()]);
    }
}
