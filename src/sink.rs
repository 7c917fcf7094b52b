//! Raw-Response Sink (C3).
//!
//! Persists each API response verbatim, either to JSON files on disk or to a
//! side SQLite table. The two modes are mutually exclusive; switching modes
//! closes the current sink before opening the new one.

use std::path::PathBuf;

use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::api_type::ApiType;
use crate::errors::Result;

#[derive(Debug, Clone)]
pub struct FileSinkOptions {
    pub dir: PathBuf,
    pub indent: usize,
}

/// Where a raw response gets archived.
pub enum RawResponseSink {
    Disabled,
    File(FileSinkOptions),
    Db(SqlitePool),
}

impl RawResponseSink {
    pub fn disabled() -> Self {
        RawResponseSink::Disabled
    }

    pub fn file(options: FileSinkOptions) -> Result<Self> {
        std::fs::create_dir_all(&options.dir)?;
        Ok(RawResponseSink::File(options))
    }

    /// Opens (creating if needed) the dedicated raw-response SQLite database.
    pub async fn db(path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new().connect(&url).await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS responses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                api_type TEXT NOT NULL,
                brief_key TEXT NOT NULL,
                detailed_key TEXT,
                response TEXT NOT NULL,
                UNIQUE(api_type, brief_key, detailed_key)
            )",
        )
        .execute(&pool)
        .await?;
        Ok(RawResponseSink::Db(pool))
    }

    /// Closes the sink cleanly before a new mode is opened by the caller.
    pub async fn close(self) {
        if let RawResponseSink::Db(pool) = self {
            pool.close().await;
        }
    }

    /// Archives one page of a paginated basic-data/form-outline endpoint.
    /// Each element of `results` becomes its own row when writing to DB mode;
    /// file mode writes the whole page as one file.
    pub async fn record_page(
        &self,
        api_type: ApiType,
        page_number: usize,
        page: &Value,
    ) -> Result<()> {
        match self {
            RawResponseSink::Disabled => Ok(()),
            RawResponseSink::File(opts) => {
                let file_name = format!("{}-p{}.json", api_type.name().to_lowercase(), page_number);
                write_json_file(&opts.dir.join(file_name), page, opts.indent)
            }
            RawResponseSink::Db(pool) => {
                let key_field = api_type.unique_identifier_key();
                if let Some(Value::Array(items)) = page.get("results") {
                    for item in items {
                        let brief_key = item
                            .get(key_field)
                            .map(value_as_key_string)
                            .unwrap_or_default();
                        upsert_response(pool, api_type, &brief_key, None, item).await?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Archives a single request-detail document.
    pub async fn record_detail(&self, form_id: &str, request_id: &str, detail: &Value) -> Result<()> {
        match self {
            RawResponseSink::Disabled => Ok(()),
            RawResponseSink::File(opts) => {
                let file_name = format!("request_detail-r{request_id}.json");
                write_json_file(&opts.dir.join(file_name), detail, opts.indent)
            }
            RawResponseSink::Db(pool) => {
                upsert_response(pool, ApiType::RequestDetail, form_id, Some(request_id), detail).await
            }
        }
    }
}

async fn upsert_response(
    pool: &SqlitePool,
    api_type: ApiType,
    brief_key: &str,
    detailed_key: Option<&str>,
    response: &Value,
) -> Result<()> {
    let body = serde_json::to_string(response)?;
    sqlx::query(
        "INSERT INTO responses (api_type, brief_key, detailed_key, response)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(api_type, brief_key, detailed_key) DO UPDATE SET response = excluded.response",
    )
    .bind(api_type.name())
    .bind(brief_key)
    .bind(detailed_key)
    .bind(body)
    .execute(pool)
    .await?;
    Ok(())
}

fn value_as_key_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn write_json_file(path: &std::path::Path, value: &Value, indent: usize) -> Result<()> {
    let pretty = if indent == 0 {
        serde_json::to_string(value)?
    } else {
        let spaces = " ".repeat(indent);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(spaces.as_bytes());
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        serde::Serialize::serialize(value, &mut ser)?;
        String::from_utf8(buf).unwrap_or_default()
    };
    std::fs::write(path, pretty)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn db_sink_records_and_replaces_pages() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RawResponseSink::db(&dir.path().join("raw.db")).await.unwrap();
        let page = json!({"results": [{"user_code": "A", "name": "first"}]});
        sink.record_page(ApiType::UserV3, 1, &page).await.unwrap();

        let page2 = json!({"results": [{"user_code": "A", "name": "second"}]});
        sink.record_page(ApiType::UserV3, 1, &page2).await.unwrap();

        if let RawResponseSink::Db(pool) = &sink {
            let rows: Vec<(String,)> = sqlx::query_as("SELECT response FROM responses")
                .fetch_all(pool)
                .await
                .unwrap();
            assert_eq!(rows.len(), 1);
            assert!(rows[0].0.contains("second"));
        }
    }

    #[test]
    fn file_sink_writes_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let opts = FileSinkOptions {
            dir: dir.path().to_path_buf(),
            indent: 2,
        };
        write_json_file(&dir.path().join("out.json"), &json!({"a": 1}), opts.indent).unwrap();
        let contents = std::fs::read_to_string(dir.path().join("out.json")).unwrap();
        assert!(contents.contains('\n'));
    }
}
