//! Store and retrieve `/v3/users/` responses. Grounded on
//! `jobcan_di/database/users.py`.

use serde_json::{json, Value};
use sqlx::{Row, SqlitePool};

use super::json_ext::{array_field_or_empty, bool_field, i64_field, opt_str_field, str_field};
use crate::errors::Result;

pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            user_code TEXT,
            email TEXT,
            last_name TEXT,
            first_name TEXT,
            is_approver INTEGER,
            user_role INTEGER,
            memo TEXT
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_groups (
            id INTEGER PRIMARY KEY,
            user_id INTEGER,
            group_code TEXT,
            FOREIGN KEY (user_id) REFERENCES users (id),
            FOREIGN KEY (group_code) REFERENCES groups (group_code),
            UNIQUE (user_id, group_code)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_positions (
            id INTEGER PRIMARY KEY,
            user_id INTEGER,
            position_code TEXT,
            group_code TEXT,
            FOREIGN KEY (user_id) REFERENCES users (id),
            FOREIGN KEY (position_code) REFERENCES positions (position_code),
            FOREIGN KEY (group_code) REFERENCES groups (group_code),
            UNIQUE (user_id, position_code, group_code)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_bank_accounts (
            user_id INTEGER,
            bank_code TEXT,
            bank_name TEXT,
            bank_name_kana TEXT,
            branch_code TEXT,
            branch_name TEXT,
            branch_name_kana TEXT,
            bank_account_type_code TEXT,
            bank_account_code TEXT,
            bank_account_name_kana TEXT,
            FOREIGN KEY (user_id) REFERENCES users (id)
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Inserts or updates one user, reconciling `user_groups`/`user_positions`
/// to exactly the membership the record lists and replacing the bank
/// account row wholesale.
pub async fn update(pool: &SqlitePool, record: &Value) -> Result<()> {
    let id = i64_field(record, "id")?;
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT OR REPLACE INTO users (id, user_code, email, last_name, first_name, is_approver, user_role, memo)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(str_field(record, "user_code")?)
    .bind(str_field(record, "email")?)
    .bind(str_field(record, "last_name")?)
    .bind(str_field(record, "first_name")?)
    .bind(bool_field(record, "is_approver")?)
    .bind(i64_field(record, "user_role")?)
    .bind(opt_str_field(record, "memo"))
    .execute(&mut *tx)
    .await?;

    let new_groups: Vec<Option<String>> = array_field_or_empty(record, "user_groups")?
        .iter()
        .map(|g| g.as_str().map(str::to_string))
        .collect();
    let old_groups: Vec<(Option<String>,)> =
        sqlx::query_as("SELECT group_code FROM user_groups WHERE user_id = ?").bind(id).fetch_all(&mut *tx).await?;

    for group_code in &new_groups {
        sqlx::query(
            "INSERT INTO user_groups (user_id, group_code)
             SELECT ?, ? WHERE NOT EXISTS (SELECT 1 FROM user_groups WHERE user_id = ? AND group_code IS ?)",
        )
        .bind(id)
        .bind(group_code)
        .bind(id)
        .bind(group_code)
        .execute(&mut *tx)
        .await?;
    }
    for (old_code,) in &old_groups {
        if !new_groups.contains(old_code) {
            sqlx::query("DELETE FROM user_groups WHERE user_id = ? AND group_code IS ?")
                .bind(id)
                .bind(old_code)
                .execute(&mut *tx)
                .await?;
        }
    }

    let new_positions: Vec<(String, Option<String>)> = array_field_or_empty(record, "user_positions")?
        .iter()
        .map(|p| Ok((str_field(p, "position_code")?.to_string(), opt_str_field(p, "group_code").map(str::to_string))))
        .collect::<Result<_>>()?;
    let old_positions: Vec<(String, Option<String>)> =
        sqlx::query_as("SELECT position_code, group_code FROM user_positions WHERE user_id = ?")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

    for (position_code, group_code) in &new_positions {
        sqlx::query(
            "INSERT INTO user_positions (user_id, position_code, group_code)
             SELECT ?, ?, ? WHERE NOT EXISTS (
                SELECT 1 FROM user_positions WHERE user_id = ? AND position_code = ? AND group_code IS ?
             )",
        )
        .bind(id)
        .bind(position_code)
        .bind(group_code)
        .bind(id)
        .bind(position_code)
        .bind(group_code)
        .execute(&mut *tx)
        .await?;
    }
    for (position_code, group_code) in &old_positions {
        if !new_positions.contains(&(position_code.clone(), group_code.clone())) {
            sqlx::query("DELETE FROM user_positions WHERE user_id = ? AND position_code = ? AND group_code IS ?")
                .bind(id)
                .bind(position_code)
                .bind(group_code)
                .execute(&mut *tx)
                .await?;
        }
    }

    sqlx::query("DELETE FROM user_bank_accounts WHERE user_id = ?").bind(id).execute(&mut *tx).await?;
    if let Some(account) = record.get("user_bank_account").filter(|v| !v.is_null()) {
        sqlx::query(
            "INSERT OR REPLACE INTO user_bank_accounts (
                user_id, bank_code, bank_name, bank_name_kana, branch_code,
                branch_name, branch_name_kana, bank_account_type_code,
                bank_account_code, bank_account_name_kana
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(str_field(account, "bank_code")?)
        .bind(str_field(account, "bank_name")?)
        .bind(str_field(account, "bank_name_kana")?)
        .bind(str_field(account, "branch_code")?)
        .bind(str_field(account, "branch_name")?)
        .bind(str_field(account, "branch_name_kana")?)
        .bind(str_field(account, "bank_account_type_code")?)
        .bind(str_field(account, "bank_account_code")?)
        .bind(str_field(account, "bank_account_name_kana")?)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn retrieve(pool: &SqlitePool, user_ids: &[i64]) -> Result<Vec<Value>> {
    let rows = if user_ids.is_empty() {
        sqlx::query("SELECT id, user_code, email, last_name, first_name, is_approver, user_role, memo FROM users")
            .fetch_all(pool)
            .await?
    } else {
        let placeholders = vec!["?"; user_ids.len()].join(",");
        let sql = format!(
            "SELECT id, user_code, email, last_name, first_name, is_approver, user_role, memo
             FROM users WHERE id IN ({placeholders})"
        );
        let mut q = sqlx::query(&sql);
        for id in user_ids {
            q = q.bind(id);
        }
        q.fetch_all(pool).await?
    };

    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.try_get("id")?;
        let groups: Vec<Option<String>> =
            sqlx::query_as("SELECT group_code FROM user_groups WHERE user_id = ?").bind(id).fetch_all(pool).await?.into_iter().map(|(g,): (Option<String>,)| g).collect();
        let positions: Vec<(String, Option<String>)> =
            sqlx::query_as("SELECT position_code, group_code FROM user_positions WHERE user_id = ?")
                .bind(id)
                .fetch_all(pool)
                .await?;
        let bank_account: Option<(String, String, String, String, String, String, String, String, String)> = sqlx::query_as(
            "SELECT bank_code, bank_name, bank_name_kana, branch_code, branch_name, branch_name_kana,
                    bank_account_type_code, bank_account_code, bank_account_name_kana
             FROM user_bank_accounts WHERE user_id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        results.push(json!({
            "id": id,
            "user_code": row.try_get::<String, _>("user_code")?,
            "email": row.try_get::<String, _>("email")?,
            "last_name": row.try_get::<String, _>("last_name")?,
            "first_name": row.try_get::<String, _>("first_name")?,
            "is_approver": row.try_get::<bool, _>("is_approver")?,
            "user_role": row.try_get::<i64, _>("user_role")?,
            "memo": row.try_get::<Option<String>, _>("memo")?,
            "user_groups": groups,
            "user_positions": positions.into_iter().map(|(position_code, group_code)| {
                json!({"position_code": position_code, "group_code": group_code})
            }).collect::<Vec<_>>(),
            "user_bank_account": bank_account.map(|(bank_code, bank_name, bank_name_kana, branch_code, branch_name, branch_name_kana, bank_account_type_code, bank_account_code, bank_account_name_kana)| json!({
                "bank_code": bank_code,
                "bank_name": bank_name,
                "bank_name_kana": bank_name_kana,
                "branch_code": branch_code,
                "branch_name": branch_name,
                "branch_name_kana": branch_name_kana,
                "bank_account_type_code": bank_account_type_code,
                "bank_account_code": bank_account_code,
                "bank_account_name_kana": bank_account_name_kana,
            })),
        }));
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn setup() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        create_tables(&pool).await.unwrap();
        pool
    }

    fn sample_user() -> Value {
        json!({
            "id": 1,
            "user_code": "u001",
            "email": "a@example.com",
            "last_name": "Yamada",
            "first_name": "Taro",
            "is_approver": true,
            "user_role": 1,
            "memo": null,
            "user_groups": ["g1", "g2"],
            "user_positions": [{"position_code": "p1", "group_code": "g1"}],
            "user_bank_account": null,
        })
    }

    #[tokio::test]
    async fn stores_and_retrieves_a_user_with_groups_and_positions() {
        let pool = setup().await;
        update(&pool, &sample_user()).await.unwrap();

        let results = retrieve(&pool, &[]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["user_code"], "u001");
        assert_eq!(results[0]["user_groups"].as_array().unwrap().len(), 2);
        assert_eq!(results[0]["user_positions"][0]["position_code"], "p1");
    }

    #[tokio::test]
    async fn reconciles_group_membership_on_second_update() {
        let pool = setup().await;
        update(&pool, &sample_user()).await.unwrap();

        let mut second = sample_user();
        second["user_groups"] = json!(["g2", "g3"]);
        update(&pool, &second).await.unwrap();

        let results = retrieve(&pool, &[1]).await.unwrap();
        let mut groups: Vec<String> =
            results[0]["user_groups"].as_array().unwrap().iter().map(|g| g.as_str().unwrap().to_string()).collect();
        groups.sort();
        assert_eq!(groups, vec!["g2", "g3"]);
    }
}
