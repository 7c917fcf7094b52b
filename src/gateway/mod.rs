//! Gateway (C10).
//!
//! Orchestrates one pass over an endpoint: the HTTP Fetcher collects pages or
//! a detail document, the Raw-Response Sink archives them verbatim, and the
//! Domain Store persists each item. Grounded on spec.md §4.10 and the
//! endpoint table in §6; the original's per-endpoint gateway functions live
//! in `jobcan_di/gateway/`.

use serde_json::Value;
use sqlx::SqlitePool;
use tracing::warn;

use crate::api_type::ApiType;
use crate::domain;
use crate::errors::{FatalError, JdiError, RetryableWarning};
use crate::http::fetcher::{self, FetchOutcome};
use crate::rate_limiter::RateLimiter;
use crate::sink::RawResponseSink;
use crate::temp_store::FormOutline;

type GwResult<T> = std::result::Result<T, FatalError>;

/// Outcome of one pass over a basic-data endpoint.
#[derive(Debug, Default)]
pub struct BasicFetchResult {
    /// `true` only if every page fetched cleanly (no per-page retryable warning).
    pub endpoint_clean: bool,
    /// Natural keys of items whose Domain Store `update` failed.
    pub store_failed_ids: Vec<String>,
    pub fetch_warning: Option<RetryableWarning>,
}

/// The endpoint this crate knows how to fetch, paired with its base path
/// relative to the configured base URL (spec.md §6).
fn basic_endpoint_path(api_type: ApiType) -> &'static str {
    match api_type {
        ApiType::UserV3 => "v3/users/",
        ApiType::GroupV1 => "v1/groups/",
        ApiType::PositionV1 => "v1/positions/",
        ApiType::ProjectV1 => "v1/projects/",
        ApiType::CompanyV1 => "v1/company/",
        ApiType::FixJournalV1 => "v1/fix_journals/unprinted/",
        ApiType::FormV1 => "v1/forms/",
        ApiType::RequestOutline | ApiType::RequestDetail => {
            unreachable!("request outline/detail use their own fetch methods")
        }
    }
}

/// Reads a JSON field as a string key whether it is stored as a JSON string
/// or a JSON number (natural keys like `id` arrive as either).
fn item_key(item: &Value, field: &str) -> String {
    match item.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn natural_key(api_type: ApiType, item: &Value) -> String {
    item_key(item, api_type.unique_identifier_key())
}

fn infra_error_to_fatal(e: JdiError) -> FatalError {
    FatalError::Unexpected { message: e.to_string() }
}

async fn store_basic_item(pool: &SqlitePool, api_type: ApiType, item: &Value) -> crate::errors::Result<()> {
    match api_type {
        ApiType::UserV3 => domain::users::update(pool, item).await,
        ApiType::GroupV1 => domain::groups::update(pool, item).await,
        ApiType::PositionV1 => domain::positions::update(pool, item).await,
        ApiType::ProjectV1 => domain::projects::update(pool, item).await,
        ApiType::CompanyV1 => domain::companies::update(pool, item).await,
        ApiType::FixJournalV1 => domain::fix_journal::update(pool, item).await,
        ApiType::FormV1 => domain::forms::update(pool, item).await,
        ApiType::RequestOutline | ApiType::RequestDetail => {
            unreachable!("request outline/detail are stored by their own flows")
        }
    }
}

pub struct Gateway {
    client: reqwest::Client,
    base_url: url::Url,
    rate_limiter: RateLimiter,
    sink: RawResponseSink,
    pool: SqlitePool,
}

impl Gateway {
    pub fn new(
        client: reqwest::Client,
        base_url: url::Url,
        rate_limiter: RateLimiter,
        sink: RawResponseSink,
        pool: SqlitePool,
    ) -> Gateway {
        Gateway { client, base_url, rate_limiter, sink, pool }
    }

    fn endpoint_url(&self, path: &str) -> GwResult<url::Url> {
        self.base_url.join(path).map_err(|e| FatalError::Unexpected { message: e.to_string() })
    }

    pub async fn verify_token(&self) -> GwResult<()> {
        let url = self.endpoint_url("test/")?;
        fetcher::verify_token(&self.client, &url).await
    }

    /// One pass over a basic-data endpoint: paginate, archive every raw page,
    /// and call the matching Domain Store `update` per item. A per-item
    /// store failure is recorded by natural key and does not stop the pass;
    /// a retryable warning on a page stops pagination (the failed page
    /// carries no reliable `next` link).
    pub async fn fetch_basic(&mut self, api_type: ApiType) -> GwResult<BasicFetchResult> {
        let mut url = self.endpoint_url(basic_endpoint_path(api_type))?;
        let mut result = BasicFetchResult { endpoint_clean: true, ..Default::default() };
        let mut page_number = 0usize;

        loop {
            self.rate_limiter.acquire().await;
            match fetcher::fetch_page(&self.client, url.clone(), api_type, true).await? {
                FetchOutcome::Ok(page) => {
                    page_number += 1;
                    self.sink.record_page(api_type, page_number, &page).await.map_err(infra_error_to_fatal)?;

                    if let Some(Value::Array(items)) = page.get("results") {
                        for item in items {
                            if let Err(e) = store_basic_item(&self.pool, api_type, item).await {
                                warn!(%api_type, key = %natural_key(api_type, item), error = %e, "domain store update failed");
                                result.store_failed_ids.push(natural_key(api_type, item));
                            }
                        }
                    }

                    match page.get("next") {
                        Some(Value::String(next)) => {
                            url = url::Url::parse(next)
                                .map_err(|e| FatalError::Unexpected { message: format!("invalid next-page URL: {e}") })?;
                        }
                        _ => break,
                    }
                }
                FetchOutcome::Retryable(warning) => {
                    result.endpoint_clean = false;
                    result.fetch_warning = Some(warning);
                    break;
                }
            }
        }

        Ok(result)
    }

    fn outline_url(&self, form_id: i64, applied_after: Option<&str>, completed_after: Option<&str>) -> GwResult<url::Url> {
        let mut url = self.endpoint_url("v2/requests/")?;
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("form_id", &form_id.to_string());
            if let Some(after) = applied_after {
                qp.append_pair("applied_after", after);
            }
            if let Some(after) = completed_after {
                qp.append_pair("status", "canceled_after_completion");
                qp.append_pair("completed_after", after);
            }
        }
        Ok(url)
    }

    async fn collect_outline(
        &mut self,
        mut url: url::Url,
        page_number: &mut usize,
        outline: &mut FormOutline,
        warning: &mut Option<RetryableWarning>,
        on_item: &mut impl FnMut(&str),
    ) -> GwResult<()> {
        loop {
            self.rate_limiter.acquire().await;
            match fetcher::fetch_page(&self.client, url.clone(), ApiType::RequestOutline, true).await? {
                FetchOutcome::Ok(page) => {
                    *page_number += 1;
                    self.sink
                        .record_page(ApiType::RequestOutline, *page_number, &page)
                        .await
                        .map_err(infra_error_to_fatal)?;

                    if let Some(Value::Array(items)) = page.get("results") {
                        for item in items {
                            let id = item_key(item, "id");
                            on_item(&id);
                            outline.add_ids([id]);
                        }
                    }

                    match page.get("next") {
                        Some(Value::String(next)) => {
                            url = url::Url::parse(next)
                                .map_err(|e| FatalError::Unexpected { message: format!("invalid next-page URL: {e}") })?;
                        }
                        _ => break,
                    }
                }
                FetchOutcome::Retryable(w) => {
                    *warning = Some(w);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Fetches one form's outline: the normal `applied_after`-filtered query,
    /// plus (when `canceled_since` is given) a second query for requests
    /// canceled after completion since that same date. `on_item` ticks once
    /// per request id seen, for the Integrator's per-item progress callback.
    pub async fn fetch_form_outline(
        &mut self,
        form_id: i64,
        applied_after: Option<&str>,
        canceled_since: Option<&str>,
        mut on_item: impl FnMut(&str),
    ) -> GwResult<(FormOutline, Option<RetryableWarning>)> {
        let mut outline = FormOutline::default();
        let mut warning = None;
        let mut page_number = 0usize;

        let url = self.outline_url(form_id, applied_after, None)?;
        self.collect_outline(url, &mut page_number, &mut outline, &mut warning, &mut on_item).await?;

        if warning.is_none() {
            if let Some(since) = canceled_since {
                let url = self.outline_url(form_id, None, Some(since))?;
                self.collect_outline(url, &mut page_number, &mut outline, &mut warning, &mut on_item).await?;
            }
        }

        outline.success = warning.is_none();
        Ok((outline, warning))
    }

    /// Fetches and stores one request's detail document. Returns a
    /// request-id-tagged warning on failure instead of stopping the run.
    pub async fn fetch_form_detail(&mut self, form_id: i64, request_id: &str) -> GwResult<Option<RetryableWarning>> {
        self.rate_limiter.acquire().await;
        let url = self.endpoint_url(&format!("v1/requests/{request_id}/"))?;

        match fetcher::fetch_detail(&self.client, url, request_id).await? {
            FetchOutcome::Ok(detail) => {
                self.sink
                    .record_detail(&form_id.to_string(), request_id, &detail)
                    .await
                    .map_err(infra_error_to_fatal)?;

                match domain::requests::update(&self.pool, &detail).await {
                    Ok(()) => Ok(None),
                    Err(e) => Ok(Some(RetryableWarning::DBUpdateFailed {
                        api_type: ApiType::RequestDetail,
                        message: e.to_string(),
                    })),
                }
            }
            FetchOutcome::Retryable(warning) => Ok(Some(warning)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn gateway(server: &MockServer) -> Gateway {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        domain::create_all_tables(&pool).await.unwrap();
        Gateway::new(
            reqwest::Client::new(),
            url::Url::parse(&format!("{}/", server.uri())).unwrap(),
            RateLimiter::new(std::time::Duration::ZERO),
            RawResponseSink::disabled(),
            pool,
        )
    }

    #[tokio::test]
    async fn fetch_basic_stores_items_and_follows_pagination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/groups/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 2, "previous": null,
                "next": format!("{}/v1/groups/?page=2", server.uri()),
                "results": [{"group_code": "g1", "group_name": "Sales"}],
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/groups/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 2, "previous": null, "next": null,
                "results": [{"group_code": "g2", "group_name": "Engineering"}],
            })))
            .mount(&server)
            .await;

        let mut gw = gateway(&server).await;
        let result = gw.fetch_basic(ApiType::GroupV1).await.unwrap();
        assert!(result.endpoint_clean);
        assert!(result.store_failed_ids.is_empty());

        let rows = domain::groups::retrieve(&gw.pool, &[]).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn fetch_basic_records_a_per_page_warning_without_a_fatal_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/positions/"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({"target": "all"})))
            .mount(&server)
            .await;

        let mut gw = gateway(&server).await;
        let result = gw.fetch_basic(ApiType::PositionV1).await.unwrap();
        assert!(!result.endpoint_clean);
        assert!(matches!(result.fetch_warning, Some(RetryableWarning::ApiDataNotFound { .. })));
    }

    #[tokio::test]
    async fn fetch_form_outline_collects_ids_from_both_queries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/requests/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 1, "next": null, "previous": null,
                "results": [{"id": "r1"}],
            })))
            .mount(&server)
            .await;

        let mut gw = gateway(&server).await;
        let mut seen = Vec::new();
        let (outline, warning) =
            gw.fetch_form_outline(7, Some("2026/01/01 00:00:00"), Some("2026/01/01 00:00:00"), |id| seen.push(id.to_string())).await.unwrap();
        assert!(warning.is_none());
        assert!(outline.success);
        assert_eq!(outline.ids.len(), 1);
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn fetch_form_detail_tags_a_warning_with_the_request_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/requests/r1/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({"detail": ["bad"]})))
            .mount(&server)
            .await;

        let mut gw = gateway(&server).await;
        let warning = gw.fetch_form_detail(7, "r1").await.unwrap();
        match warning {
            Some(RetryableWarning::FormDetailApiInvalidParameter { request_id, .. }) => assert_eq!(request_id, "r1"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
