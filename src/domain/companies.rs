//! Store and retrieve `/v1/company/` responses. Grounded on
//! `jobcan_di/database/company.py`.

use serde_json::{json, Value};
use sqlx::{Row, SqlitePool};

use super::json_ext::{opt_str_field, str_field};
use crate::errors::Result;

pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS companies (
            company_code TEXT PRIMARY KEY,
            company_name TEXT,
            zip_code TEXT,
            address TEXT,
            bank_code TEXT,
            bank_name TEXT,
            branch_code TEXT,
            branch_name TEXT,
            bank_account_type_code TEXT,
            bank_account_code TEXT,
            bank_account_name_kana TEXT,
            invoice_registrated_number TEXT
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update(pool: &SqlitePool, record: &Value) -> Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO companies (
            company_code, company_name, zip_code, address,
            bank_code, bank_name, branch_code, branch_name,
            bank_account_type_code, bank_account_code, bank_account_name_kana,
            invoice_registrated_number
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(str_field(record, "company_code")?)
    .bind(str_field(record, "company_name")?)
    .bind(opt_str_field(record, "zip_code"))
    .bind(opt_str_field(record, "address"))
    .bind(opt_str_field(record, "bank_code"))
    .bind(opt_str_field(record, "bank_name"))
    .bind(opt_str_field(record, "branch_code"))
    .bind(opt_str_field(record, "branch_name"))
    .bind(opt_str_field(record, "bank_account_type_code"))
    .bind(opt_str_field(record, "bank_account_code"))
    .bind(opt_str_field(record, "bank_account_name_kana"))
    .bind(opt_str_field(record, "invoice_registrated_number"))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn retrieve(pool: &SqlitePool, company_codes: &[String]) -> Result<Vec<Value>> {
    let rows = if company_codes.is_empty() {
        sqlx::query(
            "SELECT company_code, company_name, zip_code, address, bank_code, bank_name,
                    branch_code, branch_name, bank_account_type_code, bank_account_code,
                    bank_account_name_kana, invoice_registrated_number
             FROM companies",
        )
        .fetch_all(pool)
        .await?
    } else {
        let placeholders = vec!["?"; company_codes.len()].join(",");
        let sql = format!(
            "SELECT company_code, company_name, zip_code, address, bank_code, bank_name,
                    branch_code, branch_name, bank_account_type_code, bank_account_code,
                    bank_account_name_kana, invoice_registrated_number
             FROM companies WHERE company_code IN ({placeholders})"
        );
        let mut q = sqlx::query(&sql);
        for code in company_codes {
            q = q.bind(code);
        }
        q.fetch_all(pool).await?
    };

    rows.into_iter()
        .map(|row| {
            Ok(json!({
                "company_code": row.try_get::<String, _>("company_code")?,
                "company_name": row.try_get::<String, _>("company_name")?,
                "zip_code": row.try_get::<Option<String>, _>("zip_code")?,
                "address": row.try_get::<Option<String>, _>("address")?,
                "bank_code": row.try_get::<Option<String>, _>("bank_code")?,
                "bank_name": row.try_get::<Option<String>, _>("bank_name")?,
                "branch_code": row.try_get::<Option<String>, _>("branch_code")?,
                "branch_name": row.try_get::<Option<String>, _>("branch_name")?,
                "bank_account_type_code": row.try_get::<Option<String>, _>("bank_account_type_code")?,
                "bank_account_code": row.try_get::<Option<String>, _>("bank_account_code")?,
                "bank_account_name_kana": row.try_get::<Option<String>, _>("bank_account_name_kana")?,
                "invoice_registrated_number": row.try_get::<Option<String>, _>("invoice_registrated_number")?,
            }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn round_trips_a_company() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        create_tables(&pool).await.unwrap();

        update(
            &pool,
            &json!({
                "company_code": "c1", "company_name": "Acme", "zip_code": null, "address": null,
                "bank_code": null, "bank_name": null, "branch_code": null, "branch_name": null,
                "bank_account_type_code": null, "bank_account_code": null,
                "bank_account_name_kana": null, "invoice_registrated_number": null,
            }),
        )
        .await
        .unwrap();

        let results = retrieve(&pool, &[]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["company_name"], "Acme");
    }
}
