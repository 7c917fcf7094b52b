//! End-to-end flow: basic data (one form) -> form outline (two requests) ->
//! form detail, where one request detail 404s. Exercises the Integrator,
//! Gateway and Domain Store together the way the unit tests in
//! `src/integrator/mod.rs` and `src/gateway/mod.rs` exercise each piece
//! alone.

use jobcan_di::config::{
    ApiConfig, AppConfig, DataRetrievalConfig, DatabaseConfig, DebuggingConfig, LogInit,
    LoggingConfig, NotificationConfig, NotifyLogLevel,
};
use jobcan_di::integrator::Integrator;
use jobcan_di::status::{DetailedStatus, Stage};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(base_url: String) -> AppConfig {
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
        database: DatabaseConfig { db_path: "jobcan.sqlite".to_string() },
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

async fn empty_page(server: &MockServer, endpoint: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/{endpoint}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "count": 0, "next": null, "previous": null, "results": [],
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn a_404_on_one_request_detail_is_recorded_without_stopping_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).and(path("/test/")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

    for endpoint in ["v3/users/", "v1/groups/", "v1/positions/", "v1/projects/", "v1/company/", "v1/fix_journals/unprinted/"] {
        empty_page(&server, endpoint).await;
    }

    Mock::given(method("GET"))
        .and(path("/v1/forms/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "count": 1, "next": null, "previous": null,
            "results": [{"id": 1, "category": "expense", "form_type": "normal", "name": "Travel", "view_type": "default"}],
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/requests/"))
        .and(query_param("form_id", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "count": 2, "next": null, "previous": null,
            "results": [{"id": "r1"}, {"id": "r2"}],
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/requests/r1/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "r1", "title": "Tokyo trip", "status": "completed", "form_id": 1,
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/requests/r2/"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({"target": "r2"})))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cfg = config(format!("{}/", server.uri()));
    let mut integrator = Integrator::new(cfg, dir.path()).await.unwrap();

    integrator.run().await.unwrap();

    assert_eq!(
        integrator.status().progress.get(),
        (Stage::Terminating, DetailedStatus::terminating_completed())
    );

    let stored = jobcan_di::domain::requests::retrieve(integrator.pool(), "r1").await.unwrap();
    assert!(stored.is_some());
    assert_eq!(stored.unwrap()["status"], "completed");

    let missing = jobcan_di::domain::requests::retrieve(integrator.pool(), "r2").await.unwrap();
    assert!(missing.is_none());

    assert!(integrator
        .status()
        .failure_record
        .get_request_detail()
        .get("1")
        .is_some_and(|ids| ids.contains(&"r2".to_string())));
}
