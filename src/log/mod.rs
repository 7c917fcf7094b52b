// tracing_setup.rs
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Initializes the tracing subscriber from environment variables.
///
/// - `JDI_LOG_LEVEL`: log level (e.g. "info", "debug", "trace")
/// - `JDI_LOG_FORMAT`: "json" for structured output, otherwise human-readable
/// - Falls back to `RUST_LOG`, then "info"
pub fn init_tracing() {
    let level = std::env::var("JDI_LOG_LEVEL").ok();
    let use_json = std::env::var("JDI_LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);
    init_tracing_with(level.as_deref(), use_json);
}

/// Initializes the tracing subscriber with explicit configuration,
/// bypassing the environment variables (used when `config.ini`'s
/// `[LOGGING]` section is the source of truth).
pub fn init_tracing_with(level: Option<&str>, use_json: bool) {
    let filter = match level {
        Some(lvl) => EnvFilter::new(lvl),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    if use_json {
        let subscriber = Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(ErrorLayer::default());

        tracing::subscriber::set_global_default(subscriber)
            .expect("failed to set global tracing subscriber");
    } else {
        let subscriber = Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(ErrorLayer::default());

        tracing::subscriber::set_global_default(subscriber)
            .expect("failed to set global tracing subscriber");
    }
}
