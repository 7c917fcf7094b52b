//! Store and retrieve `/v1/fix_journal/` responses. Grounded on
//! `jobcan_di/database/fix_journal.py`.

use serde_json::{json, Value};
use sqlx::{Row, SqlitePool};

use super::json_ext::{array_field_or_empty, i64_field, opt_i64_field, opt_str_field, str_field};
use crate::errors::Result;

const JOURNAL_COLUMNS: &str = "journal_id, journal_type, journal_date, req_date, journal_summary,
    view_id, specifics_row_number, company_code, company_name,
    user_code, user_name, debit_account_title_code, debit_account_title_name,
    debit_account_sub_title_code, debit_account_sub_title_name,
    debit_tax_category_code, debit_tax_category_name, debit_amount,
    debit_tax_amount, debit_amount_without_tax, debit_group_code,
    debit_group_name, debit_accounting_group_code, debit_project_code,
    debit_project_name, credit_account_title_code, credit_account_title_name,
    credit_account_sub_title_code, credit_account_sub_title_name,
    credit_tax_category_code, credit_tax_category_name, credit_amount,
    credit_tax_amount, credit_amount_without_tax, credit_group_code,
    credit_group_name, credit_accounting_group_code, credit_project_code,
    credit_project_name, invoice_registrated_number";

pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS fix_journals (
            journal_id INTEGER PRIMARY KEY,
            journal_type TEXT, journal_date TEXT, req_date TEXT, journal_summary TEXT,
            view_id TEXT, specifics_row_number INTEGER, company_code TEXT, company_name TEXT,
            user_code TEXT, user_name TEXT, debit_account_title_code TEXT, debit_account_title_name TEXT,
            debit_account_sub_title_code TEXT, debit_account_sub_title_name TEXT,
            debit_tax_category_code TEXT, debit_tax_category_name TEXT, debit_amount INTEGER,
            debit_tax_amount INTEGER, debit_amount_without_tax INTEGER, debit_group_code TEXT,
            debit_group_name TEXT, debit_accounting_group_code TEXT, debit_project_code TEXT,
            debit_project_name TEXT, credit_account_title_code TEXT, credit_account_title_name TEXT,
            credit_account_sub_title_code TEXT, credit_account_sub_title_name TEXT,
            credit_tax_category_code TEXT, credit_tax_category_name TEXT, credit_amount INTEGER,
            credit_tax_amount INTEGER, credit_amount_without_tax INTEGER, credit_group_code TEXT,
            credit_group_name TEXT, credit_accounting_group_code TEXT, credit_project_code TEXT,
            credit_project_name TEXT, invoice_registrated_number TEXT
        )"
    ))
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS custom_journal_items (
            journal_id INTEGER,
            key TEXT,
            value TEXT,
            generic_master_record_code TEXT
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

macro_rules! bind_opt_str {
    ($q:expr, $record:expr, $($field:literal),+ $(,)?) => {{
        let mut q = $q;
        $( q = q.bind(opt_str_field($record, $field)); )+
        q
    }};
}

pub async fn update(pool: &SqlitePool, record: &Value) -> Result<()> {
    let journal_id = i64_field(record, "journal_id")?;
    let mut tx = pool.begin().await?;

    let sql = format!(
        "INSERT OR REPLACE INTO fix_journals ({JOURNAL_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    );
    let q = sqlx::query(&sql).bind(journal_id);
    let q = bind_opt_str!(q, record, "journal_type", "journal_date", "req_date", "journal_summary", "view_id");
    let q = q.bind(opt_i64_field(record, "specifics_row_number"));
    let q = bind_opt_str!(q, record, "company_code", "company_name", "user_code", "user_name",
        "debit_account_title_code", "debit_account_title_name",
        "debit_account_sub_title_code", "debit_account_sub_title_name",
        "debit_tax_category_code", "debit_tax_category_name");
    let q = q.bind(opt_i64_field(record, "debit_amount"));
    let q = q.bind(opt_i64_field(record, "debit_tax_amount"));
    let q = q.bind(opt_i64_field(record, "debit_amount_without_tax"));
    let q = bind_opt_str!(q, record, "debit_group_code", "debit_group_name", "debit_accounting_group_code",
        "debit_project_code", "debit_project_name",
        "credit_account_title_code", "credit_account_title_name",
        "credit_account_sub_title_code", "credit_account_sub_title_name",
        "credit_tax_category_code", "credit_tax_category_name");
    let q = q.bind(opt_i64_field(record, "credit_amount"));
    let q = q.bind(opt_i64_field(record, "credit_tax_amount"));
    let q = q.bind(opt_i64_field(record, "credit_amount_without_tax"));
    let q = bind_opt_str!(q, record, "credit_group_code", "credit_group_name", "credit_accounting_group_code",
        "credit_project_code", "credit_project_name", "invoice_registrated_number");
    q.execute(&mut *tx).await?;

    sqlx::query("DELETE FROM custom_journal_items WHERE journal_id = ?").bind(journal_id).execute(&mut *tx).await?;
    for item in array_field_or_empty(record, "custom_journal_item_list")? {
        sqlx::query(
            "INSERT INTO custom_journal_items (journal_id, key, value, generic_master_record_code) VALUES (?, ?, ?, ?)",
        )
        .bind(journal_id)
        .bind(str_field(item, "key")?)
        .bind(opt_str_field(item, "value"))
        .bind(opt_str_field(item, "generic_master_record_code"))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn retrieve(pool: &SqlitePool, journal_ids: &[i64]) -> Result<Vec<Value>> {
    let sql = format!("SELECT {JOURNAL_COLUMNS} FROM fix_journals");
    let rows = if journal_ids.is_empty() {
        sqlx::query(&sql).fetch_all(pool).await?
    } else {
        let placeholders = vec!["?"; journal_ids.len()].join(",");
        let mut q = sqlx::query(&format!("{sql} WHERE journal_id IN ({placeholders})"));
        for id in journal_ids {
            q = q.bind(id);
        }
        q.fetch_all(pool).await?
    };

    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        let journal_id: i64 = row.try_get("journal_id")?;
        let items: Vec<(String, Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT key, value, generic_master_record_code FROM custom_journal_items WHERE journal_id = ?",
        )
        .bind(journal_id)
        .fetch_all(pool)
        .await?;

        results.push(json!({
            "journal_id": journal_id,
            "journal_type": row.try_get::<Option<String>, _>("journal_type")?,
            "journal_date": row.try_get::<Option<String>, _>("journal_date")?,
            "req_date": row.try_get::<Option<String>, _>("req_date")?,
            "journal_summary": row.try_get::<Option<String>, _>("journal_summary")?,
            "view_id": row.try_get::<Option<String>, _>("view_id")?,
            "specifics_row_number": row.try_get::<Option<i64>, _>("specifics_row_number")?,
            "company_code": row.try_get::<Option<String>, _>("company_code")?,
            "company_name": row.try_get::<Option<String>, _>("company_name")?,
            "user_code": row.try_get::<Option<String>, _>("user_code")?,
            "user_name": row.try_get::<Option<String>, _>("user_name")?,
            "debit_account_title_code": row.try_get::<Option<String>, _>("debit_account_title_code")?,
            "debit_account_title_name": row.try_get::<Option<String>, _>("debit_account_title_name")?,
            "debit_account_sub_title_code": row.try_get::<Option<String>, _>("debit_account_sub_title_code")?,
            "debit_account_sub_title_name": row.try_get::<Option<String>, _>("debit_account_sub_title_name")?,
            "debit_tax_category_code": row.try_get::<Option<String>, _>("debit_tax_category_code")?,
            "debit_tax_category_name": row.try_get::<Option<String>, _>("debit_tax_category_name")?,
            "debit_amount": row.try_get::<Option<i64>, _>("debit_amount")?,
            "debit_tax_amount": row.try_get::<Option<i64>, _>("debit_tax_amount")?,
            "debit_amount_without_tax": row.try_get::<Option<i64>, _>("debit_amount_without_tax")?,
            "debit_group_code": row.try_get::<Option<String>, _>("debit_group_code")?,
            "debit_group_name": row.try_get::<Option<String>, _>("debit_group_name")?,
            "debit_accounting_group_code": row.try_get::<Option<String>, _>("debit_accounting_group_code")?,
            "debit_project_code": row.try_get::<Option<String>, _>("debit_project_code")?,
            "debit_project_name": row.try_get::<Option<String>, _>("debit_project_name")?,
            "credit_account_title_code": row.try_get::<Option<String>, _>("credit_account_title_code")?,
            "credit_account_title_name": row.try_get::<Option<String>, _>("credit_account_title_name")?,
            "credit_account_sub_title_code": row.try_get::<Option<String>, _>("credit_account_sub_title_code")?,
            "credit_account_sub_title_name": row.try_get::<Option<String>, _>("credit_account_sub_title_name")?,
            "credit_tax_category_code": row.try_get::<Option<String>, _>("credit_tax_category_code")?,
            "credit_tax_category_name": row.try_get::<Option<String>, _>("credit_tax_category_name")?,
            "credit_amount": row.try_get::<Option<i64>, _>("credit_amount")?,
            "credit_tax_amount": row.try_get::<Option<i64>, _>("credit_tax_amount")?,
            "credit_amount_without_tax": row.try_get::<Option<i64>, _>("credit_amount_without_tax")?,
            "credit_group_code": row.try_get::<Option<String>, _>("credit_group_code")?,
            "credit_group_name": row.try_get::<Option<String>, _>("credit_group_name")?,
            "credit_accounting_group_code": row.try_get::<Option<String>, _>("credit_accounting_group_code")?,
            "credit_project_code": row.try_get::<Option<String>, _>("credit_project_code")?,
            "credit_project_name": row.try_get::<Option<String>, _>("credit_project_name")?,
            "invoice_registrated_number": row.try_get::<Option<String>, _>("invoice_registrated_number")?,
            "custom_journal_item_list": items.into_iter().map(|(key, value, generic_master_record_code)| json!({
                "key": key,
                "value": value,
                "generic_master_record_code": generic_master_record_code,
            })).collect::<Vec<_>>(),
        }));
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "journal_id": 100, "journal_type": "general", "journal_date": "2026-07-01",
            "req_date": "2026-07-01", "journal_summary": "Office supplies", "view_id": "v1",
            "specifics_row_number": 1, "company_code": "c1", "company_name": "Acme",
            "user_code": "u1", "user_name": "Taro",
            "debit_account_title_code": "101", "debit_account_title_name": "Cash",
            "debit_account_sub_title_code": null, "debit_account_sub_title_name": null,
            "debit_tax_category_code": null, "debit_tax_category_name": null,
            "debit_amount": 1000, "debit_tax_amount": 100, "debit_amount_without_tax": 900,
            "debit_group_code": null, "debit_group_name": null, "debit_accounting_group_code": null,
            "debit_project_code": null, "debit_project_name": null,
            "credit_account_title_code": "201", "credit_account_title_name": "Payable",
            "credit_account_sub_title_code": null, "credit_account_sub_title_name": null,
            "credit_tax_category_code": null, "credit_tax_category_name": null,
            "credit_amount": 1000, "credit_tax_amount": 100, "credit_amount_without_tax": 900,
            "credit_group_code": null, "credit_group_name": null, "credit_accounting_group_code": null,
            "credit_project_code": null, "credit_project_name": null,
            "invoice_registrated_number": null,
            "custom_journal_item_list": [{"key": "k1", "value": "v1", "generic_master_record_code": null}],
        })
    }

    #[tokio::test]
    async fn round_trips_a_journal_with_custom_items() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        create_tables(&pool).await.unwrap();
        update(&pool, &sample()).await.unwrap();

        let results = retrieve(&pool, &[]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["journal_summary"], "Office supplies");
        assert_eq!(results[0]["custom_journal_item_list"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replaces_custom_items_on_second_update() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        create_tables(&pool).await.unwrap();
        update(&pool, &sample()).await.unwrap();

        let mut second = sample();
        second["custom_journal_item_list"] = json!([]);
        update(&pool, &second).await.unwrap();

        let results = retrieve(&pool, &[100]).await.unwrap();
        assert!(results[0]["custom_journal_item_list"].as_array().unwrap().is_empty());
    }
}
