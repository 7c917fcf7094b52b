//! HTTP Fetcher (C2).
//!
//! Issues authenticated GETs, paginates by following `next` links, and
//! classifies every response into `Ok`, a per-item `Retryable` warning, or a
//! `Fatal` error per the status-code classification table in the spec.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::warn;

use crate::api_type::ApiType;
use crate::errors::{FatalError, RetryableWarning};
use crate::rate_limiter::RateLimiter;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const LIST_PAGE_TIMEOUT_SECS: u64 = 180;

/// The outcome of fetching one page or one detail document.
#[derive(Debug)]
pub enum FetchOutcome {
    Ok(Value),
    Retryable(RetryableWarning),
}

/// Validates the configured token against the `/test/` endpoint.
pub async fn verify_token(client: &reqwest::Client, test_url: &url::Url) -> Result<(), FatalError> {
    let resp = client
        .get(test_url.clone())
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .send()
        .await
        .map_err(classify_transport_error)?;

    match resp.status() {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(FatalError::TokenInvalid {
            masked_token: "unknown".into(),
        }),
        _ => Ok(()),
    }
}

/// Fetches a single page (or a single detail document) and classifies the
/// response. Connection errors and read timeouts are fatal; HTTP 4xx/5xx
/// (other than a successful 200) are retryable per-item warnings.
pub async fn fetch_page(
    client: &reqwest::Client,
    url: url::Url,
    api_type: ApiType,
    is_list_page: bool,
) -> Result<FetchOutcome, FatalError> {
    let timeout = if is_list_page {
        LIST_PAGE_TIMEOUT_SECS
    } else {
        DEFAULT_TIMEOUT_SECS
    };

    let resp = client
        .get(url)
        .timeout(Duration::from_secs(timeout))
        .send()
        .await
        .map_err(classify_transport_error)?;

    let status = resp.status();
    if status == StatusCode::OK {
        match resp.json::<Value>().await {
            Ok(body) => Ok(FetchOutcome::Ok(body)),
            Err(e) => Ok(FetchOutcome::Retryable(RetryableWarning::ApiResponseJsonDecodeError {
                message: e.to_string(),
            })),
        }
    } else {
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        Ok(FetchOutcome::Retryable(classify_basic_data_error(
            api_type, status, &body,
        )))
    }
}

/// Fetches a single request-detail document. Like `fetch_page`, but
/// classifies a non-200 response via `classify_form_detail_error` so the
/// resulting warning carries `request_id` instead of an `ApiType`.
pub async fn fetch_detail(
    client: &reqwest::Client,
    url: url::Url,
    request_id: &str,
) -> Result<FetchOutcome, FatalError> {
    let resp = client
        .get(url)
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .send()
        .await
        .map_err(classify_transport_error)?;

    let status = resp.status();
    if status == StatusCode::OK {
        match resp.json::<Value>().await {
            Ok(body) => Ok(FetchOutcome::Ok(body)),
            Err(e) => Ok(FetchOutcome::Retryable(RetryableWarning::ApiResponseJsonDecodeError {
                message: e.to_string(),
            })),
        }
    } else {
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        Ok(FetchOutcome::Retryable(classify_form_detail_error(request_id, status, &body)))
    }
}

/// Status-code classification table for basic-data / form-outline endpoints
/// (spec.md §4.2).
pub fn classify_basic_data_error(api_type: ApiType, status: StatusCode, body: &Value) -> RetryableWarning {
    match status {
        StatusCode::BAD_REQUEST => {
            let code = body.get("code").and_then(Value::as_i64);
            match code {
                Some(400003) => RetryableWarning::ApiInvalidParameter {
                    api_type,
                    detail: join_string_array(body.get("detail")),
                },
                Some(400100) => RetryableWarning::ApiInvalidJsonFormat {
                    api_type,
                    detail: body
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                },
                Some(400900) => RetryableWarning::ApiCommonIdSyncFailed { api_type },
                _ => RetryableWarning::ApiUnexpected {
                    api_type,
                    status_code: status.as_u16(),
                },
            }
        }
        StatusCode::NOT_FOUND => RetryableWarning::ApiDataNotFound {
            api_type,
            target: body
                .get("target")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        _ => RetryableWarning::ApiUnexpected {
            api_type,
            status_code: status.as_u16(),
        },
    }
}

/// Same classification, but for a single form-detail request, which carries
/// `request_id` instead of an `ApiType`-tagged target.
pub fn classify_form_detail_error(request_id: &str, status: StatusCode, body: &Value) -> RetryableWarning {
    match status {
        StatusCode::BAD_REQUEST => RetryableWarning::FormDetailApiInvalidParameter {
            request_id: request_id.to_string(),
            detail: join_string_array(body.get("detail")),
        },
        StatusCode::NOT_FOUND => RetryableWarning::FormDetailApiDataNotFound {
            request_id: request_id.to_string(),
        },
        _ => RetryableWarning::FormDetailApiUnexpected {
            request_id: request_id.to_string(),
            status_code: status.as_u16(),
        },
    }
}

fn join_string_array(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

fn classify_transport_error(err: reqwest::Error) -> FatalError {
    if err.is_timeout() {
        FatalError::RequestReadTimeout {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    } else {
        FatalError::RequestConnectionError {
            message: err.to_string(),
        }
    }
}

/// Walks a paginated list endpoint, following the `next` link in each
/// `{count, next, previous, results}` envelope, aggregating every page's
/// `results` array. A retryable warning on one page is surfaced through
/// `on_warning` but does not abort the overall fetch; since the failed page
/// carries no reliable `next` link, pagination cannot continue past it.
pub async fn paginate<F>(
    client: &reqwest::Client,
    rate_limiter: &mut RateLimiter,
    mut url: url::Url,
    api_type: ApiType,
    mut on_warning: F,
) -> Result<Vec<Value>, FatalError>
where
    F: FnMut(RetryableWarning),
{
    let mut results = Vec::new();
    loop {
        rate_limiter.acquire().await;
        match fetch_page(client, url.clone(), api_type, true).await? {
            FetchOutcome::Ok(page) => {
                if let Some(Value::Array(items)) = page.get("results") {
                    results.extend(items.iter().cloned());
                }
                match page.get("next") {
                    Some(Value::String(next)) => {
                        url = url::Url::parse(next).map_err(|e| FatalError::Unexpected {
                            message: format!("invalid next-page URL: {e}"),
                        })?;
                    }
                    _ => break,
                }
            }
            FetchOutcome::Retryable(warning) => {
                warn!(%api_type, %warning, "page fetch returned a retryable warning");
                on_warning(warning);
                break;
            }
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_invalid_parameter() {
        let body = json!({"code": 400003, "detail": ["bad field"]});
        let w = classify_basic_data_error(ApiType::UserV3, StatusCode::BAD_REQUEST, &body);
        assert!(matches!(w, RetryableWarning::ApiInvalidParameter { .. }));
    }

    #[test]
    fn classifies_not_found() {
        let body = json!({"target": "123"});
        let w = classify_basic_data_error(ApiType::UserV3, StatusCode::NOT_FOUND, &body);
        match w {
            RetryableWarning::ApiDataNotFound { target, .. } => assert_eq!(target, "123"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn classifies_server_error_as_unexpected() {
        let w = classify_basic_data_error(ApiType::UserV3, StatusCode::INTERNAL_SERVER_ERROR, &Value::Null);
        assert!(matches!(w, RetryableWarning::ApiUnexpected { status_code: 500, .. }));
    }
}
