//! Command-line interface and top-level run entry point.

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, instrument};

use crate::config::load_config_from_path;
use crate::errors::Result;
use crate::integrator::Integrator;

/// Command-line interface for the Jobcan workflow data integrator.
#[derive(Parser, Debug)]
#[command(
    name = "jobcan-di",
    version,
    about = "Resumable ETL integrator that harvests Jobcan workflow data into SQLite.",
    long_about = "Walks the Jobcan workflow API (basic data, form outlines, form details)\n\
and mirrors every record into a local SQLite database. Progress is\n\
write-through persisted after every item, so an interrupted run resumes\n\
exactly where it left off instead of starting over."
)]
pub struct Cli {
    /// Application directory: holds `config.ini`, the status document, the
    /// temp store and (unless overridden) the SQLite database.
    #[arg(long = "config-dir", short = 'c', value_name = "DIR", default_value = ".")]
    pub config_dir: String,

    /// Emit logs in JSON format.
    #[arg(long = "log-json")]
    pub log_json: bool,

    /// Set log level (overrides env vars like RUST_LOG).
    ///
    /// Example: info,warn,debug
    #[arg(long = "log-level")]
    pub log_level: Option<String>,
}

impl Cli {
    /// Resolves the application directory, loads `config.ini`, builds the
    /// `Integrator` and drives it to completion. The single async entry
    /// point invoked from `main()`.
    #[instrument(name = "run", err, skip(self))]
    pub async fn run(self) -> Result<()> {
        crate::log::init_tracing_with(self.log_level.as_deref(), self.log_json);

        let app_dir = PathBuf::from(&self.config_dir);
        let config_path = app_dir.join("config.ini");
        info!(config_dir = %self.config_dir, "loading configuration");
        let config = load_config_from_path(&config_path)?;

        let mut integrator = Integrator::new(config, &app_dir).await?;
        info!("starting run");
        let outcome = integrator.run().await;
        integrator.cleanup().await?;
        outcome?;

        info!("run finished successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_match_the_documented_option_set() {
        let cli = Cli::parse_from(["jobcan-di"]);
        assert_eq!(cli.config_dir, ".");
        assert!(!cli.log_json);
        assert!(cli.log_level.is_none());
    }
}
