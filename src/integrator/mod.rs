//! Integrator (C13).
//!
//! Top-level serial driver: walks `INITIALIZING → BASIC_DATA → FORM_OUTLINE →
//! FORM_DETAIL → TERMINATING` once per `run()`, consulting the previous run's
//! progress snapshot at every boundary so already-completed work is skipped.
//! Grounded on `jobcan_di/integrator/integrator.py`; ties together the
//! Gateway, the Status Model and the Temp Store.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Local;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::api_type::ApiType;
use crate::config::{AppConfig, DEFAULT_BASE_URL};
use crate::domain;
use crate::errors::{FatalError, JdiError, Result};
use crate::gateway::Gateway;
use crate::http::Http;
use crate::rate_limiter::RateLimiter;
use crate::sink::{FileSinkOptions, RawResponseSink};
use crate::status::{
    stage_for_api_type, DetailedStatus, GetFormOutlineStatus, JobcanDIStatus, ProgressTarget, Stage,
};
use crate::temp_store::MemoryTempStore;

/// Statuses considered terminal for a request: a detail already resolved at
/// one of these never needs re-fetching, matching `update_form_detail`'s
/// `ant_status` set in the original gateway.
const TERMINAL_REQUEST_STATUSES: [&str; 4] = ["completed", "rejected", "canceled", "canceled_after_completion"];

fn now_timestamp() -> String {
    Local::now().format("%Y/%m/%d %H:%M:%S").to_string()
}

fn app_status_dir(app_dir: &Path) -> PathBuf {
    app_dir.join("config")
}

/// Owns every long-lived resource for one application directory: the main
/// database, the gateway, the status document and the in-flight form
/// outline cache. Constructed once per process; `run()` may be called
/// repeatedly (see `restart()`).
pub struct Integrator {
    app_dir: PathBuf,
    config: AppConfig,
    gateway: Gateway,
    pool: SqlitePool,
    status: JobcanDIStatus,
    previous_progress: crate::status::AppProgress,
    temp_store: MemoryTempStore,
}

impl Integrator {
    /// Resolves the token, opens the main database, creates every table,
    /// opens the raw-response sink per config, and loads the status/temp
    /// store documents from `app_dir`. Equivalent to the original's
    /// `prepare()` plus its directory/connection setup.
    pub async fn new(config: AppConfig, app_dir: impl Into<PathBuf>) -> Result<Integrator> {
        let app_dir = app_dir.into();
        std::fs::create_dir_all(&app_dir)?;

        let token = crate::config::resolve_api_token(&config.api)?;
        let base_url_str = if config.api.base_url.is_empty() { DEFAULT_BASE_URL } else { &config.api.base_url };
        let base_url = url::Url::parse(base_url_str).map_err(|e| {
            JdiError::Fatal(FatalError::Unexpected { message: format!("invalid base URL '{base_url_str}': {e}") })
        })?;

        let http = Http::new(base_url_str).with_token(&token)?;
        let client = http.build_client()?;

        let rate_limiter = match (config.api.requests_per_sec, config.api.requests_per_hour) {
            (Some(per_sec), _) => RateLimiter::from_requests_per_sec(per_sec),
            (None, Some(per_hour)) => RateLimiter::from_requests_per_hour(per_hour as f64),
            (None, None) => RateLimiter::from_requests_per_hour(5000.0),
        };

        let db_path = app_dir.join(&config.database.db_path);
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let pool = SqlitePoolOptions::new()
            .connect(&format!("sqlite://{}?mode=rwc", db_path.display()))
            .await
            .map_err(|e| JdiError::Fatal(FatalError::DatabaseConnectionFailed { message: e.to_string() }))?;
        domain::create_all_tables(&pool)
            .await
            .map_err(|e| JdiError::Fatal(FatalError::DatabaseTableCreationFailed { message: e.to_string() }))?;

        let sink = if config.data_retrieval.save_raw_data {
            let dir = config.data_retrieval.raw_data_dir.clone().unwrap_or_else(|| "json".to_string());
            RawResponseSink::file(FileSinkOptions {
                dir: app_dir.join(dir),
                indent: config.data_retrieval.json_indent.unwrap_or(2),
            })?
        } else {
            RawResponseSink::disabled()
        };

        let gateway = Gateway::new(client, base_url, rate_limiter, sink, pool.clone());
        gateway.verify_token().await.map_err(JdiError::Fatal)?;

        let mut status = JobcanDIStatus::new(app_status_dir(&app_dir))?;
        status.load()?;
        let previous_progress = status.progress.clone();

        let temp_store = MemoryTempStore::load(&app_dir)?;

        Ok(Integrator { app_dir, config, gateway, pool, status, previous_progress, temp_store })
    }

    fn is_future(&self, target: &ProgressTarget) -> bool {
        self.previous_progress.is_future_process(target)
    }

    fn advance(&mut self, stage: Stage, detail: DetailedStatus) -> Result<()> {
        self.status.progress.set(stage, detail);
        self.status.save()
    }

    /// Runs the full pipeline once: `BASIC_DATA → FORM_OUTLINE → FORM_DETAIL
    /// → TERMINATING`. A fatal error short-circuits into `cancel()`.
    pub async fn run(&mut self) -> Result<()> {
        if let Err(e) = self.run_basic_data().await {
            return self.cancel(e).await;
        }
        if let Err(e) = self.run_form_outline().await {
            return self.cancel(e).await;
        }
        if let Err(e) = self.run_form_detail().await {
            return self.cancel(e).await;
        }
        self.run_terminating().await
    }

    async fn run_basic_data(&mut self) -> Result<()> {
        for api_type in ApiType::BASIC_DATA {
            let target = ProgressTarget::for_api_type(api_type, None);
            if !self.is_future(&target) {
                continue;
            }
            self.advance(stage_for_api_type(api_type), crate::status::detail_for_api_type(api_type))?;

            info!(%api_type, "fetching basic data");
            let result = self.gateway.fetch_basic(api_type).await?;
            for id in &result.store_failed_ids {
                self.status.db_save_failure_record.add(api_type, id.clone());
            }
            if let Some(warning) = &result.fetch_warning {
                warn!(%api_type, %warning, "basic data fetch ended with a retryable warning");
            }
            self.status.save()?;
        }
        Ok(())
    }

    async fn run_form_outline(&mut self) -> Result<()> {
        let form_target = ProgressTarget::for_api_type(ApiType::FormV1, None);
        if self.is_future(&form_target) {
            self.advance(Stage::FormOutline, DetailedStatus::FormOutline(GetFormOutlineStatus::GetFormInfo))?;
            info!("fetching form templates");
            let result = self.gateway.fetch_basic(ApiType::FormV1).await?;
            for id in &result.store_failed_ids {
                self.status.db_save_failure_record.add(ApiType::FormV1, id.clone());
            }
            self.status.save()?;
        }

        self.advance(Stage::FormOutline, DetailedStatus::FormOutline(GetFormOutlineStatus::GetOutline))?;

        let form_ids = domain::forms::retrieve_form_ids(&self.pool).await?;
        for form_id in form_ids {
            let target = ProgressTarget::for_api_type(ApiType::RequestOutline, Some(form_id.to_string()));
            if !self.is_future(&target) {
                continue;
            }

            let applied_after = self.status.form_api_last_access.get(&form_id.to_string()).cloned();
            let canceled_since =
                if self.config.data_retrieval.include_canceled_forms { applied_after.clone() } else { None };

            let access_time = now_timestamp();
            info!(form_id, "fetching form outline");
            let (outline, warning) = self
                .gateway
                .fetch_form_outline(form_id, applied_after.as_deref(), canceled_since.as_deref(), |_id| {})
                .await?;

            self.temp_store.entry(form_id).add_ids(outline.ids.iter().cloned());

            if let Some(warning) = warning {
                warn!(form_id, %warning, "form outline fetch ended with a retryable warning");
                self.status.failure_record.add(ApiType::RequestOutline, form_id.to_string());
            } else {
                self.status.progress.add_specifics([form_id.to_string()]);
                self.status.form_api_last_access.insert(form_id.to_string(), access_time);
            }
            self.temp_store.flush()?;
            self.status.save()?;
        }
        Ok(())
    }

    /// The request ids this form still needs a detail fetch for: whatever
    /// the outline fetch collected, plus anything already stored but not yet
    /// in a terminal status (so an interrupted in-progress request is
    /// retried even if its outline entry was already consumed).
    async fn pending_request_ids(&self, form_id: i64) -> Result<HashSet<String>> {
        let mut ids: HashSet<String> = self.temp_store.get(form_id).map(|o| o.ids.clone()).unwrap_or_default();
        let in_progress = domain::requests::retrieve_ids(
            &self.pool,
            form_id,
            None,
            Some(&TERMINAL_REQUEST_STATUSES.iter().map(|s| s.to_string()).collect::<Vec<_>>()),
        )
        .await?;
        ids.extend(in_progress);
        Ok(ids)
    }

    async fn run_form_detail(&mut self) -> Result<()> {
        self.advance(Stage::FormDetail, DetailedStatus::FormDetail(crate::status::GetFormDetailStatus::SeekTarget))?;
        self.advance(Stage::FormDetail, DetailedStatus::FormDetail(crate::status::GetFormDetailStatus::GetDetail))?;

        let form_ids: Vec<i64> = self.temp_store.iter().map(|(id, _)| *id).collect();
        for form_id in form_ids {
            let target_ids = self.pending_request_ids(form_id).await?;
            let mut remaining = target_ids.clone();

            for request_id in &target_ids {
                let target = ProgressTarget::for_api_type(ApiType::RequestDetail, Some(request_id.clone()));
                if !self.is_future(&target) {
                    remaining.remove(request_id);
                    continue;
                }

                info!(form_id, %request_id, "fetching request detail");
                match self.gateway.fetch_form_detail(form_id, request_id).await? {
                    None => {
                        self.status.progress.add_specifics([request_id.clone()]);
                        remaining.remove(request_id);
                    }
                    Some(warning) => {
                        warn!(form_id, %request_id, %warning, "request detail fetch ended with a retryable warning");
                        self.status.failure_record.add_request_detail(form_id, request_id.clone());
                    }
                }
                self.status.save()?;
            }

            self.temp_store.remove(form_id);
            if !remaining.is_empty() {
                self.temp_store.entry(form_id).add_ids(remaining);
            }
            self.temp_store.flush()?;
        }
        Ok(())
    }

    async fn run_terminating(&mut self) -> Result<()> {
        self.advance(Stage::Terminating, DetailedStatus::Terminating(crate::status::TerminatingStatus::DeleteTempFiles))?;
        self.temp_store.cleanup()?;
        self.advance(Stage::Terminating, DetailedStatus::terminating_completed())?;
        info!("run complete");
        Ok(())
    }

    /// Records a fatal error on the status document and stops without
    /// clearing temp files, matching the original's `cancel(error)`.
    async fn cancel(&mut self, error: JdiError) -> Result<()> {
        warn!(%error, "run canceled by a fatal error");
        self.status.progress.stage = Stage::Failed;
        self.status.save()?;
        Err(error)
    }

    /// Clears the completed end-state, re-snapshots the previous progress,
    /// and re-enters `run()`. Used for continuous/looping operation.
    pub async fn restart(&mut self) -> Result<()> {
        self.status.load()?;
        self.previous_progress = self.status.progress.clone();
        self.run().await
    }

    /// Closes the gateway's database connection. Temp files are only
    /// deleted inside `run_terminating`, once the run actually reaches
    /// `TERMINATING.COMPLETED`.
    pub async fn cleanup(self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }

    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    pub fn status(&self) -> &JobcanDIStatus {
        &self.status
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiConfig, DataRetrievalConfig, DatabaseConfig, DebuggingConfig, LogInit, LoggingConfig, NotificationConfig, NotifyLogLevel};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String, db_path: &str) -> AppConfig {
        AppConfig {
            api: ApiConfig {
                base_url,
                token_env_name: None,
                api_token: Some("test-token".to_string()),
                requests_per_hour: None,
                requests_per_sec: Some(1000.0),
            },
            data_retrieval: DataRetrievalConfig {
                save_raw_data: false,
                raw_data_dir: None,
                json_indent: None,
                json_encoding: "utf-8".to_string(),
                include_canceled_forms: false,
            },
            database: DatabaseConfig { db_path: db_path.to_string() },
            logging: LoggingConfig { log_init: LogInit::Never, log_path: None, log_encoding: "utf-8".to_string() },
            notification: NotificationConfig {
                enable_notification: false,
                clear_previous_notifications_on_startup: false,
                notify_log_level: NotifyLogLevel::Never,
                clear_progress_on_error: false,
            },
            debugging: DebuggingConfig { log_to_console: false, catch_errors_on_run: false },
        }
    }

    async fn empty_basic_data_mocks(server: &MockServer) {
        for endpoint in ["v3/users/", "v1/groups/", "v1/positions/", "v1/projects/", "v1/company/", "v1/fix_journals/unprinted/", "v1/forms/"] {
            Mock::given(method("GET"))
                .and(path(format!("/{endpoint}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "count": 0, "next": null, "previous": null, "results": [],
                })))
                .mount(server)
                .await;
        }
        Mock::given(method("GET")).and(path("/test/")).respond_with(ResponseTemplate::new(200)).mount(server).await;
    }

    #[tokio::test]
    async fn a_run_with_no_remote_data_reaches_terminating_completed() {
        let server = MockServer::start().await;
        empty_basic_data_mocks(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(format!("{}/", server.uri()), "jobcan.sqlite");
        let mut integrator = Integrator::new(config, dir.path()).await.unwrap();

        integrator.run().await.unwrap();
        assert_eq!(integrator.status.progress.get(), (Stage::Terminating, DetailedStatus::terminating_completed()));
    }

    #[tokio::test]
    async fn basic_data_already_completed_is_skipped_on_restart() {
        let server = MockServer::start().await;
        empty_basic_data_mocks(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(format!("{}/", server.uri()), "jobcan.sqlite");
        let mut integrator = Integrator::new(config.clone(), dir.path()).await.unwrap();
        integrator.run().await.unwrap();
        integrator.cleanup().await.unwrap();

        let mut second = Integrator::new(config, dir.path()).await.unwrap();
        second.run().await.unwrap();
        assert_eq!(second.status.progress.get(), (Stage::Terminating, DetailedStatus::terminating_completed()));
    }
}
