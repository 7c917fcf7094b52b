//! Crate-wide error types.
//!
//! Two channels, matching the system's error taxonomy: [`FatalError`] stops a
//! run and is recorded on the status document; [`RetryableWarning`] is
//! recorded in a failure record and the run continues. [`JdiError`] is the
//! transport-level error returned by infrastructure calls (I/O, SQL parsing,
//! config loading) plus a variant that carries a propagated [`FatalError`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api_type::ApiType;

/// Fatal errors. A fatal error stops the current run; the Integrator converts
/// it into a `cancel()` and it is surfaced to the caller.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FatalError {
    #[error("API token not found")]
    TokenNotFound,

    #[error("environment variable '{env_name}' holding the API token is empty")]
    TokenMissingEnvEmpty { env_name: String },

    #[error("environment variable '{env_name}' holding the API token was not found")]
    TokenMissingEnvNotFound { env_name: String },

    #[error("API token is invalid: {masked_token}")]
    TokenInvalid { masked_token: String },

    #[error("failed to connect to the database: {message}")]
    DatabaseConnectionFailed { message: String },

    #[error("failed to create database tables: {message}")]
    DatabaseTableCreationFailed { message: String },

    #[error("request connection error: {message}")]
    RequestConnectionError { message: String },

    #[error("request read timeout after {timeout_secs}s")]
    RequestReadTimeout { timeout_secs: u64 },

    #[error("the integrator has not been initialized")]
    NotInitialized,

    #[error("the API client has not been prepared")]
    ApiClientNotPrepared,

    #[error("the database connection has not been prepared")]
    DatabaseConnectionNotPrepared,

    #[error("the database has not been prepared")]
    DatabaseNotPrepared,

    #[error("unexpected error: {message}")]
    Unexpected { message: String },
}

impl FatalError {
    /// Masks a token the way the original integrator does: keep the first 3
    /// characters, replace the rest with `*`.
    pub fn mask_token(token: &str) -> String {
        if token.len() <= 3 {
            return "*".repeat(token.len());
        }
        let (head, tail) = token.split_at(3);
        format!("{head}{}", "*".repeat(tail.len()))
    }
}

/// Retryable, per-item warnings. Work continues; the offending natural key is
/// recorded in a failure record for retry on the next run.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RetryableWarning {
    #[error("invalid config file path: {file_path}")]
    InvalidConfigFilePath { file_path: String },

    #[error("invalid status file path: {file_path}")]
    InvalidStatusFilePath { file_path: String },

    #[error("invalid log file path: {file_path}")]
    InvalidLogFilePath { file_path: String },

    #[error("API {api_type}: invalid parameter(s): {detail}")]
    ApiInvalidParameter { api_type: ApiType, detail: String },

    #[error("API {api_type}: invalid JSON shape: {detail}")]
    ApiInvalidJsonFormat { api_type: ApiType, detail: String },

    #[error("API {api_type}: identity sync failed")]
    ApiCommonIdSyncFailed { api_type: ApiType },

    #[error("API {api_type}: data not found for target '{target}'")]
    ApiDataNotFound { api_type: ApiType, target: String },

    #[error("API {api_type}: unexpected status {status_code}")]
    ApiUnexpected { api_type: ApiType, status_code: u16 },

    #[error("form detail request {request_id}: invalid parameter(s): {detail}")]
    FormDetailApiInvalidParameter { request_id: String, detail: String },

    #[error("form detail request {request_id}: data not found")]
    FormDetailApiDataNotFound { request_id: String },

    #[error("form detail request {request_id}: unexpected status {status_code}")]
    FormDetailApiUnexpected { request_id: String, status_code: u16 },

    #[error("failed to persist {api_type} to the database: {message}")]
    DBUpdateFailed { api_type: ApiType, message: String },

    #[error("could not decode API response as JSON: {message}")]
    ApiResponseJsonDecodeError { message: String },
}

/// Crate-wide error type for infrastructure / transport failures.
#[derive(Error, Debug)]
pub enum JdiError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("reqwest middleware error: {0}")]
    ReqwestMiddleware(#[from] reqwest_middleware::Error),

    #[error("invalid header name: {0}")]
    HeaderName(#[from] reqwest::header::InvalidHeaderName),

    #[error("invalid header value: {0}")]
    HeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("config error: {0}")]
    Config(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("merge error: {0}")]
    Merge(String),

    #[error("data type error: {0}")]
    DataType(String),

    #[error(transparent)]
    Fatal(#[from] FatalError),
}

pub type Result<T> = std::result::Result<T, JdiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_token_keeping_first_three_chars() {
        assert_eq!(FatalError::mask_token("abcdefgh"), "abc*****");
    }

    #[test]
    fn fatal_error_round_trips_through_json() {
        let err = FatalError::TokenMissingEnvEmpty {
            env_name: "JDI_TOKEN".into(),
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: FatalError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }

    #[test]
    fn retryable_warning_displays_api_type() {
        let warn = RetryableWarning::ApiDataNotFound {
            api_type: ApiType::UserV3,
            target: "123".into(),
        };
        assert!(warn.to_string().contains("123"));
    }
}
