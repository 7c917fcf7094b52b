//! `approval_process`, `approval_steps`, `approvers`,
//! `approval_route_modify_logs`, and the `comments`/`comment_associations`
//! pair they feed. Grounded on
//! `jobcan_di/database/requests/_approval_process.py`.

use serde_json::{json, Value};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use super::data_class::{CommentDataList, FileDataList};
use crate::domain::json_ext::{array_field_or_empty, opt_bool_field, opt_str_field, str_field};
use crate::errors::Result;

async fn update_approval_route_modify_logs(
    tx: &mut Transaction<'_, Sqlite>,
    modify_logs: &[Value],
    ap_id: i64,
) -> Result<()> {
    for (i, log) in modify_logs.iter().enumerate() {
        sqlx::query(
            "INSERT INTO approval_route_modify_logs (approval_process_id, date, user_name, log_index)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(approval_process_id, log_index) DO UPDATE SET
                 date = excluded.date, user_name = excluded.user_name",
        )
        .bind(ap_id)
        .bind(str_field(log, "date")?)
        .bind(opt_str_field(log, "user_name"))
        .bind(i as i64)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn update_approvers(tx: &mut Transaction<'_, Sqlite>, approvers: &[Value], as_id: i64) -> Result<()> {
    for (i, approver) in approvers.iter().enumerate() {
        sqlx::query(
            "INSERT INTO approvers (approval_step_id, status, approved_date, approver_name,
                                    proxy_approver_name, proxy_approver_code, approver_index)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(approval_step_id, approver_index) DO UPDATE SET
                 status = excluded.status, approved_date = excluded.approved_date,
                 approver_name = excluded.approver_name, proxy_approver_name = excluded.proxy_approver_name,
                 proxy_approver_code = excluded.proxy_approver_code",
        )
        .bind(as_id)
        .bind(opt_str_field(approver, "status"))
        .bind(opt_str_field(approver, "approved_date"))
        .bind(opt_str_field(approver, "approver_name"))
        .bind(opt_str_field(approver, "proxy_approver_name"))
        .bind(opt_str_field(approver, "proxy_approver_code"))
        .bind(i as i64)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn update_approval_steps(
    tx: &mut Transaction<'_, Sqlite>,
    steps: &[Value],
    ap_id: i64,
    f_list: &mut FileDataList,
    c_list: &mut CommentDataList,
) -> Result<()> {
    for (i, step) in steps.iter().enumerate() {
        sqlx::query(
            "INSERT INTO approval_steps (approval_process_id, name, condition, status, step_index)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(approval_process_id, step_index) DO UPDATE SET
                 name = excluded.name, condition = excluded.condition, status = excluded.status",
        )
        .bind(ap_id)
        .bind(opt_str_field(step, "name"))
        .bind(opt_str_field(step, "condition"))
        .bind(opt_str_field(step, "status"))
        .bind(i as i64)
        .execute(&mut **tx)
        .await?;

        let step_id: i64 = sqlx::query("SELECT id FROM approval_steps WHERE approval_process_id = ? AND step_index = ?")
            .bind(ap_id)
            .bind(i as i64)
            .fetch_one(&mut **tx)
            .await?
            .try_get(0)?;

        let approvers = array_field_or_empty(step, "approvers")?;
        if !approvers.is_empty() {
            update_approvers(tx, approvers, step_id).await?;
        }

        for comment in array_field_or_empty(step, "comments")? {
            c_list.add_comment(comment, Some(step_id), None);
        }
        for file in array_field_or_empty(step, "files")? {
            f_list.add_file(file, 3, Some(step_id));
        }
    }
    Ok(())
}

async fn update_approval_after_completion(
    after_completion: &Value,
    ap_id: i64,
    f_list: &mut FileDataList,
    c_list: &mut CommentDataList,
) -> Result<()> {
    for comment in array_field_or_empty(after_completion, "comments")? {
        c_list.add_comment(comment, None, Some(ap_id));
    }
    for file in array_field_or_empty(after_completion, "files")? {
        f_list.add_file(file, 4, Some(ap_id));
    }
    Ok(())
}

async fn update_comments(tx: &mut Transaction<'_, Sqlite>, c_list: &mut CommentDataList) -> Result<()> {
    let mut comment_ids = Vec::with_capacity(c_list.comments().len());
    for comment in c_list.comments() {
        let existing: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM comments WHERE user_name = ? AND date = ? AND
             ((text IS NULL AND ? IS NULL) OR text = ?)",
        )
        .bind(&comment.user_name)
        .bind(&comment.date)
        .bind(&comment.text)
        .bind(&comment.text)
        .fetch_optional(&mut **tx)
        .await?;

        let id = if let Some((id,)) = existing {
            sqlx::query("UPDATE comments SET deleted = ? WHERE id = ?").bind(comment.deleted).bind(id).execute(&mut **tx).await?;
            id
        } else {
            sqlx::query("INSERT INTO comments (user_name, date, text, deleted) VALUES (?, ?, ?, ?)")
                .bind(&comment.user_name)
                .bind(&comment.date)
                .bind(&comment.text)
                .bind(comment.deleted)
                .execute(&mut **tx)
                .await?
                .last_insert_rowid()
        };
        comment_ids.push(id);
    }
    c_list.set_comment_ids(&comment_ids);

    for assoc in c_list.associations() {
        sqlx::query(
            "INSERT INTO comment_associations (comment_id, approval_step_id, approval_after_completion_id)
             VALUES (?, ?, ?)
             ON CONFLICT(comment_id) DO UPDATE SET
                 approval_step_id = excluded.approval_step_id,
                 approval_after_completion_id = excluded.approval_after_completion_id",
        )
        .bind(assoc.comment_id)
        .bind(assoc.approval_step_id)
        .bind(assoc.approval_after_completion_id)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

pub async fn update_approval_process(
    tx: &mut Transaction<'_, Sqlite>,
    approval_process: Option<&Value>,
    request_id: &str,
    f_list: &mut FileDataList,
) -> Result<()> {
    let Some(ap) = approval_process else { return Ok(()) };
    let mut c_list = CommentDataList::new();

    sqlx::query(
        "INSERT INTO approval_process (request_id, is_route_changed_by_applicant)
         VALUES (?, ?)
         ON CONFLICT(request_id) DO UPDATE SET is_route_changed_by_applicant = excluded.is_route_changed_by_applicant",
    )
    .bind(request_id)
    .bind(opt_bool_field(ap, "is_route_changed_by_applicant"))
    .execute(&mut **tx)
    .await?;

    let ap_id: i64 = sqlx::query("SELECT id FROM approval_process WHERE request_id = ?")
        .bind(request_id)
        .fetch_one(&mut **tx)
        .await?
        .try_get(0)?;

    let modify_logs = array_field_or_empty(ap, "approval_route_modify_logs")?;
    if !modify_logs.is_empty() {
        update_approval_route_modify_logs(tx, modify_logs, ap_id).await?;
    }

    let steps = array_field_or_empty(ap, "steps")?;
    if !steps.is_empty() {
        update_approval_steps(tx, steps, ap_id, f_list, &mut c_list).await?;
    }

    if let Some(after_completion) = ap.get("after_completion").filter(|v| !v.is_null()) {
        update_approval_after_completion(after_completion, ap_id, f_list, &mut c_list).await?;
    }

    update_comments(tx, &mut c_list).await
}

async fn comments_for(pool: &SqlitePool, column: &str, id: i64) -> Result<Vec<Value>> {
    let rows: Vec<(String, String, Option<String>, bool)> = sqlx::query_as(&format!(
        "SELECT c.user_name, c.date, c.text, c.deleted FROM comments c
         JOIN comment_associations ca ON c.id = ca.comment_id WHERE ca.{column} = ?"
    ))
    .bind(id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(user_name, date, text, deleted)| json!({"user_name": user_name, "date": date, "text": text, "deleted": deleted}))
        .collect())
}

async fn files_for(pool: &SqlitePool, column: &str, id: i64) -> Result<Vec<Value>> {
    let rows: Vec<(String, Option<String>, String, String, Option<String>, bool)> = sqlx::query_as(&format!(
        "SELECT f.user_name, f.date, f.id, f.name, f.type, f.deleted FROM file_associations fa
         JOIN files f ON fa.file_id = f.id WHERE fa.{column} = ?"
    ))
    .bind(id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(user_name, date, id, name, file_type, deleted)| {
            json!({"user_name": user_name, "date": date, "id": id, "name": name, "type": file_type, "deleted": deleted})
        })
        .collect())
}

pub async fn retrieve_approval_process(pool: &SqlitePool, request_id: &str) -> Result<Value> {
    let header: Option<(i64, Option<bool>)> =
        sqlx::query_as("SELECT id, is_route_changed_by_applicant FROM approval_process WHERE request_id = ?")
            .bind(request_id)
            .fetch_optional(pool)
            .await?;
    let Some((ap_id, is_route_changed_by_applicant)) = header else { return Ok(Value::Null) };

    let modify_logs: Vec<(String, Option<String>)> = sqlx::query_as(
        "SELECT date, user_name FROM approval_route_modify_logs WHERE approval_process_id = ? ORDER BY log_index",
    )
    .bind(ap_id)
    .fetch_all(pool)
    .await?;

    let step_rows = sqlx::query(
        "SELECT id, name, condition, status FROM approval_steps WHERE approval_process_id = ? ORDER BY step_index",
    )
    .bind(ap_id)
    .fetch_all(pool)
    .await?;

    let mut steps = Vec::with_capacity(step_rows.len());
    for row in step_rows {
        let step_id: i64 = row.try_get("id")?;
        let approvers: Vec<(Option<String>, Option<String>, Option<String>, Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT status, approved_date, approver_name, proxy_approver_name, proxy_approver_code
             FROM approvers WHERE approval_step_id = ? ORDER BY approver_index",
        )
        .bind(step_id)
        .fetch_all(pool)
        .await?;

        steps.push(json!({
            "name": row.try_get::<Option<String>, _>("name")?,
            "condition": row.try_get::<Option<String>, _>("condition")?,
            "status": row.try_get::<Option<String>, _>("status")?,
            "approvers": approvers.into_iter().map(|(status, approved_date, approver_name, proxy_approver_name, proxy_approver_code)| json!({
                "status": status, "approved_date": approved_date, "approver_name": approver_name,
                "proxy_approver_name": proxy_approver_name, "proxy_approver_code": proxy_approver_code,
            })).collect::<Vec<_>>(),
            "comments": comments_for(pool, "approval_step_id", step_id).await?,
            "files": files_for(pool, "approval_step_id", step_id).await?,
        }));
    }

    let after_completion = json!({
        "comments": comments_for(pool, "approval_after_completion_id", ap_id).await?,
        "files": files_for(pool, "approval_after_completion_id", ap_id).await?,
    });

    Ok(json!({
        "is_route_changed_by_applicant": is_route_changed_by_applicant,
        "approval_route_modify_logs": modify_logs.into_iter().map(|(date, user_name)| json!({"date": date, "user_name": user_name})).collect::<Vec<_>>(),
        "steps": steps,
        "after_completion": after_completion,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::requests::table_init;
    use serde_json::json;

    async fn setup(request_id: &str) -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        table_init::create_tables(&pool).await.unwrap();
        sqlx::query("INSERT INTO requests (id) VALUES (?)").bind(request_id).execute(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn stores_and_retrieves_a_step_with_approver_and_comment() {
        let pool = setup("r1").await;
        let ap = json!({
            "is_route_changed_by_applicant": false,
            "approval_route_modify_logs": [],
            "steps": [{
                "name": "Manager approval", "condition": "all", "status": "approved",
                "approvers": [{"status": "approved", "approved_date": "2026-07-01", "approver_name": "Taro",
                               "proxy_approver_name": null, "proxy_approver_code": null}],
                "comments": [{"user_name": "Taro", "date": "2026-07-01", "text": "ok", "deleted": false}],
                "files": [],
            }],
            "after_completion": null,
        });

        let mut f_list = FileDataList::new("r1");
        let mut tx = pool.begin().await.unwrap();
        update_approval_process(&mut tx, Some(&ap), "r1", &mut f_list).await.unwrap();
        tx.commit().await.unwrap();

        let result = retrieve_approval_process(&pool, "r1").await.unwrap();
        assert_eq!(result["steps"][0]["name"], "Manager approval");
        assert_eq!(result["steps"][0]["approvers"][0]["approver_name"], "Taro");
        assert_eq!(result["steps"][0]["comments"][0]["text"], "ok");
    }
}
