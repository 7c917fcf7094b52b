//! Typed application configuration, loaded from `config.ini` with a
//! `.env`-style overlay (`dotenvy`, matching the teacher's dependency for
//! environment-driven secrets). Covers exactly the option set in
//! spec.md §6 — unlisted `config.ini` options are out of scope.

use std::path::Path;

use ini::Ini;

use crate::errors::{JdiError, Result};

/// Default API host, matching the original integrator's hardcoded default
/// (`jobcan_di/integrator/integrator_config.py`).
pub const DEFAULT_BASE_URL: &str = "https://ssl.wf.jobcan.jp/wf_api";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub token_env_name: Option<String>,
    pub api_token: Option<String>,
    pub requests_per_hour: Option<u32>,
    pub requests_per_sec: Option<f64>,
}

impl Default for ApiConfig {
    fn default() -> ApiConfig {
        ApiConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            token_env_name: None,
            api_token: None,
            requests_per_hour: None,
            requests_per_sec: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataRetrievalConfig {
    pub save_raw_data: bool,
    pub raw_data_dir: Option<String>,
    pub json_indent: Option<usize>,
    pub json_encoding: String,
    pub include_canceled_forms: bool,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub db_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogInit {
    Never,
    AlwaysOnStartup,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_init: LogInit,
    pub log_path: Option<String>,
    pub log_encoding: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLogLevel {
    Never,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub enable_notification: bool,
    pub clear_previous_notifications_on_startup: bool,
    pub notify_log_level: NotifyLogLevel,
    pub clear_progress_on_error: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DebuggingConfig {
    pub log_to_console: bool,
    pub catch_errors_on_run: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub data_retrieval: DataRetrievalConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub notification: NotificationConfig,
    pub debugging: DebuggingConfig,
}

/// Loads and overlays a `.env` file (if present) before reading `config.ini`
/// at `path`, matching the original's "env vars win over the token in the
/// file" precedence (spec.md §6, `[API].TOKEN_ENV_NAME` preempts `API_TOKEN`).
pub fn load_config_from_path(path: &Path) -> Result<AppConfig> {
    let _ = dotenvy::dotenv();
    let ini = Ini::load_from_file(path)
        .map_err(|e| JdiError::Config(format!("failed to read '{}': {e}", path.display())))?;
    parse_config(&ini)
}

fn section<'a>(ini: &'a Ini, name: &str) -> ini::Properties {
    ini.section(Some(name)).cloned().unwrap_or_default()
}

fn get_str(props: &ini::Properties, key: &str) -> Option<String> {
    props.get(key).map(str::to_string)
}

fn get_bool(props: &ini::Properties, key: &str, default: bool) -> Result<bool> {
    match props.get(key) {
        None => Ok(default),
        Some(raw) => match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            other => Err(JdiError::Config(format!("'{key}' is not a boolean: '{other}'"))),
        },
    }
}

fn get_u32(props: &ini::Properties, key: &str) -> Result<Option<u32>> {
    match props.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| JdiError::Config(format!("'{key}' is not an integer: '{raw}'"))),
    }
}

fn get_f64(props: &ini::Properties, key: &str) -> Result<Option<f64>> {
    match props.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| JdiError::Config(format!("'{key}' is not a number: '{raw}'"))),
    }
}

fn get_usize(props: &ini::Properties, key: &str) -> Result<Option<usize>> {
    match props.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| JdiError::Config(format!("'{key}' is not an integer: '{raw}'"))),
    }
}

fn parse_config(ini: &Ini) -> Result<AppConfig> {
    let api_props = section(ini, "API");
    let api = ApiConfig {
        base_url: get_str(&api_props, "BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        token_env_name: get_str(&api_props, "TOKEN_ENV_NAME"),
        api_token: get_str(&api_props, "API_TOKEN"),
        requests_per_hour: get_u32(&api_props, "REQUESTS_PER_HOUR")?,
        requests_per_sec: get_f64(&api_props, "REQUESTS_PER_SEC")?,
    };

    let dr_props = section(ini, "DATA_RETRIEVAL");
    let data_retrieval = DataRetrievalConfig {
        save_raw_data: get_bool(&dr_props, "SAVE_RAW_DATA", false)?,
        raw_data_dir: get_str(&dr_props, "RAW_DATA_DIR"),
        json_indent: get_usize(&dr_props, "JSON_INDENT")?,
        json_encoding: get_str(&dr_props, "JSON_ENCODING").unwrap_or_else(|| "utf-8".to_string()),
        include_canceled_forms: get_bool(&dr_props, "INCLUDE_CANCELED_FORMS", false)?,
    };

    let db_props = section(ini, "DATABASE");
    let database = DatabaseConfig {
        db_path: get_str(&db_props, "DB_PATH")
            .ok_or_else(|| JdiError::Config("[DATABASE].DB_PATH is required".to_string()))?,
    };

    let log_props = section(ini, "LOGGING");
    let log_init = match get_str(&log_props, "LOG_INIT").as_deref() {
        None | Some("NEVER") => LogInit::Never,
        Some("ALWAYS_ON_STARTUP") => LogInit::AlwaysOnStartup,
        Some(other) => {
            return Err(JdiError::Config(format!("invalid LOG_INIT: '{other}'")));
        }
    };
    let logging = LoggingConfig {
        log_init,
        log_path: get_str(&log_props, "LOG_PATH"),
        log_encoding: get_str(&log_props, "LOG_ENCODING").unwrap_or_else(|| "utf-8".to_string()),
    };

    let notif_props = section(ini, "NOTIFICATION");
    let notify_log_level = match get_str(&notif_props, "NOTIFY_LOG_LEVEL").as_deref() {
        None | Some("NEVER") => NotifyLogLevel::Never,
        Some("INFO") => NotifyLogLevel::Info,
        Some("WARNING") => NotifyLogLevel::Warning,
        Some("ERROR") => NotifyLogLevel::Error,
        Some(other) => {
            return Err(JdiError::Config(format!("invalid NOTIFY_LOG_LEVEL: '{other}'")));
        }
    };
    let notification = NotificationConfig {
        enable_notification: get_bool(&notif_props, "ENABLE_NOTIFICATION", false)?,
        clear_previous_notifications_on_startup: get_bool(
            &notif_props,
            "CLEAR_PREVIOUS_NOTIFICATIONS_ON_STARTUP",
            false,
        )?,
        notify_log_level,
        clear_progress_on_error: get_bool(&notif_props, "CLEAR_PROGRESS_ON_ERROR", false)?,
    };

    let debug_props = section(ini, "DEBUGGING");
    let debugging = DebuggingConfig {
        log_to_console: get_bool(&debug_props, "LOG_TO_CONSOLE", false)?,
        catch_errors_on_run: get_bool(&debug_props, "CATCH_ERRORS_ON_RUN", false)?,
    };

    Ok(AppConfig {
        api,
        data_retrieval,
        database,
        logging,
        notification,
        debugging,
    })
}

/// Resolves the effective API token per spec.md §6: `TOKEN_ENV_NAME` (if set)
/// preempts the literal `API_TOKEN`.
pub fn resolve_api_token(api: &ApiConfig) -> Result<String> {
    use crate::errors::FatalError;

    if let Some(env_name) = &api.token_env_name {
        return match std::env::var(env_name) {
            Ok(value) if !value.is_empty() => Ok(value),
            Ok(_) => Err(JdiError::Fatal(FatalError::TokenMissingEnvEmpty {
                env_name: env_name.clone(),
            })),
            Err(_) => Err(JdiError::Fatal(FatalError::TokenMissingEnvNotFound {
                env_name: env_name.clone(),
            })),
        };
    }
    api.api_token
        .clone()
        .ok_or_else(|| JdiError::Fatal(FatalError::TokenNotFound))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_ini(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_the_documented_option_set() {
        let file = write_ini(
            "[API]\nAPI_TOKEN=abc123\nREQUESTS_PER_SEC=2.5\n\n\
             [DATABASE]\nDB_PATH=jobcan.sqlite\n\n\
             [DATA_RETRIEVAL]\nSAVE_RAW_DATA=true\n\n\
             [LOGGING]\nLOG_INIT=ALWAYS_ON_STARTUP\n\n\
             [NOTIFICATION]\nNOTIFY_LOG_LEVEL=WARNING\n\n\
             [DEBUGGING]\nCATCH_ERRORS_ON_RUN=true\n",
        );
        let config = load_config_from_path(file.path()).unwrap();
        assert_eq!(config.api.api_token.as_deref(), Some("abc123"));
        assert_eq!(config.api.requests_per_sec, Some(2.5));
        assert_eq!(config.database.db_path, "jobcan.sqlite");
        assert!(config.data_retrieval.save_raw_data);
        assert_eq!(config.logging.log_init, LogInit::AlwaysOnStartup);
        assert_eq!(config.notification.notify_log_level, NotifyLogLevel::Warning);
        assert!(config.debugging.catch_errors_on_run);
    }

    #[test]
    fn missing_db_path_is_a_config_error() {
        let file = write_ini("[API]\nAPI_TOKEN=abc\n");
        assert!(load_config_from_path(file.path()).is_err());
    }

    #[test]
    fn token_env_name_preempts_the_literal_token() {
        std::env::set_var("JDI_TEST_TOKEN", "from-env");
        let api = ApiConfig {
            token_env_name: Some("JDI_TEST_TOKEN".to_string()),
            api_token: Some("from-file".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_api_token(&api).unwrap(), "from-env");
        std::env::remove_var("JDI_TEST_TOKEN");
    }
}
