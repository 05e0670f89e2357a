//! Logging.

use ferry_config::GenericConfiguration;
use ferry_error::{ErrorContext as _, GenericError};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter, Layer as _};

const DEFAULT_LOG_LEVEL: &str = "info";

/// Logs a message to standard error and exits the process with a non-zero exit code.
///
/// Used for failures that happen before logging is initialized.
pub fn fatal_and_exit(message: String) -> ! {
    eprintln!("FATAL: {}", message);
    std::process::exit(1);
}

/// Logging configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct LoggingConfiguration {
    /// Log filtering directives, in `tracing_subscriber::EnvFilter` syntax.
    ///
    /// Defaults to `info`.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to emit logs as JSON rather than human-readable text.
    #[serde(default)]
    pub log_format_json: bool,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for LoggingConfiguration {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format_json: false,
        }
    }
}

impl LoggingConfiguration {
    /// Reads the logging configuration from the `log_level` and `log_format_json` keys.
    ///
    /// # Errors
    ///
    /// If either key is present but has the wrong type, an error is returned.
    pub fn from_configuration(config: &GenericConfiguration) -> Result<Self, GenericError> {
        let log_level = config
            .try_get_typed::<String>("log_level")?
            .unwrap_or_else(default_log_level);
        let log_format_json = config.try_get_typed::<bool>("log_format_json")?.unwrap_or(false);

        Ok(Self {
            log_level,
            log_format_json,
        })
    }

    fn env_filter(&self) -> Result<EnvFilter, GenericError> {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .parse(&self.log_level)
            .with_error_context(|| format!("Invalid log level '{}'.", self.log_level))
    }
}

/// Initializes the logging subsystem for `tracing`.
///
/// Logs are written to standard output, filtered by `log_level`, either as JSON or in a human-readable format.
///
/// # Errors
///
/// If the log level is invalid, or the logging subsystem was already initialized, an error will be returned.
pub fn initialize_logging(config: &LoggingConfiguration) -> Result<(), GenericError> {
    let filter = config.env_filter()?;

    if config.log_format_json {
        let json_layer = tracing_subscriber::fmt::Layer::new()
            .json()
            .flatten_event(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);
        tracing_subscriber::registry()
            .with(json_layer.with_filter(filter))
            .try_init()?;
    } else {
        let text_layer = tracing_subscriber::fmt::Layer::new().with_target(true);
        tracing_subscriber::registry()
            .with(text_layer.with_filter(filter))
            .try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use ferry_config::ConfigurationLoader;

    use super::*;

    #[test]
    fn reads_configuration_with_defaults() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("ferry.yaml");
        let mut file = std::fs::File::create(&path).expect("should create file");
        file.write_all(b"log_format_json: true\n").expect("should write file");

        let config = ConfigurationLoader::default()
            .from_yaml(&path)
            .expect("should load configuration")
            .into_generic();
        let logging = LoggingConfiguration::from_configuration(&config).expect("should read logging configuration");

        assert_eq!(logging.log_level, "info");
        assert!(logging.log_format_json);
    }

    #[test]
    fn rejects_invalid_log_level() {
        let config = LoggingConfiguration {
            log_level: "ferry=loud".to_string(),
            log_format_json: false,
        };
        assert!(config.env_filter().is_err());

        let config = LoggingConfiguration {
            log_level: "info,ferry_core=debug".to_string(),
            log_format_json: false,
        };
        assert!(config.env_filter().is_ok());
    }
}
