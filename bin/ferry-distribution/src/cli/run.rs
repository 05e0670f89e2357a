use std::path::Path;

use ferry_components::{builtin_forwarders, builtin_receptions};
use ferry_config::{ConfigurationLoader, GenericConfiguration, ParameterGroup as _, ParameterService};
use ferry_error::{generic_error, ErrorContext as _, GenericError};
use tracing::{error, info};

use crate::{activator::DistributionActivator, parameters::DistributionParameterGroup, rest::RestControlPlaneBuilder};

/// Prefix of environment variables overriding configuration values.
const ENVIRONMENT_PREFIX: &str = "FERRY";

/// Loads the configuration file at `path`, overlaid with `FERRY_`-prefixed environment variables.
pub fn load_configuration(path: &Path) -> Result<GenericConfiguration, GenericError> {
    let configuration = ConfigurationLoader::default()
        .from_file(path)
        .with_error_context(|| format!("Failed to load configuration from '{}'.", path.display()))?
        .from_environment(ENVIRONMENT_PREFIX)?
        .into_generic();
    Ok(configuration)
}

/// Loads the root parameter group and fails if it does not validate.
pub fn load_parameters(configuration: &GenericConfiguration) -> Result<DistributionParameterGroup, GenericError> {
    let parameters = DistributionParameterGroup::from_configuration(configuration)
        .error_context("Failed to read distribution parameters.")?;

    let validation = parameters.validate();
    if !validation.is_valid() {
        for (field, message) in validation.invalid_fields() {
            error!(field = %field, "Invalid configuration: {}", message);
        }
        return Err(generic_error!("Configuration is invalid:\n{}", validation));
    }

    Ok(parameters)
}

/// Runs the distribution service until interrupted.
pub async fn run(configuration: GenericConfiguration) -> Result<(), GenericError> {
    let parameters = load_parameters(&configuration)?;
    info!(service = parameters.name(), "Loaded configuration.");

    let mut activator = DistributionActivator::new(
        parameters,
        ParameterService::new(),
        builtin_forwarders(),
        builtin_receptions(),
        RestControlPlaneBuilder,
    );
    activator.initialize()?;

    wait_for_shutdown().await?;
    info!("Received shutdown signal.");

    activator.terminate()?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<(), GenericError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).error_context("Failed to install SIGTERM handler.")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.error_context("Failed to listen for Ctrl-C.")?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<(), GenericError> {
    tokio::signal::ctrl_c()
        .await
        .error_context("Failed to listen for Ctrl-C.")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIGURATION: &str = r#"
name: ferry
rest_server_parameters:
  host: 127.0.0.1
  port: 8080
  user_name: admin
  password: secret
reception_handler_parameters:
  sdc:
    reception_handler_type: file_drop
    reception_handler_configuration_name: inbox
    plugin_handler_parameters:
      artifact_forwarders:
        - name: audit
          forwarder_type: log
reception_handler_configuration_parameters:
  inbox:
    parameter_type: file_drop
    parameters:
      watch_directory: /tmp
"#;

    fn write_configuration(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("distribution.yaml");
        std::fs::write(&path, contents).expect("should write configuration");
        (dir, path)
    }

    #[test]
    fn loads_valid_configuration() {
        let (_dir, path) = write_configuration(CONFIGURATION);
        let configuration = load_configuration(&path).expect("configuration should load");
        let parameters = load_parameters(&configuration).expect("parameters should be valid");

        assert_eq!(parameters.name(), "ferry");
        assert_eq!(parameters.reception_handler_parameters().len(), 1);
    }

    #[test]
    fn invalid_configuration_is_reported() {
        let (_dir, path) = write_configuration(&CONFIGURATION.replace("port: 8080", "port: 0"));
        let configuration = load_configuration(&path).expect("configuration should load");
        let error = load_parameters(&configuration).expect_err("parameters should be invalid");

        let message = format!("{:#}", error);
        assert!(message.contains("field \"port\" INVALID"), "unexpected error: {}", message);
    }

    #[test]
    fn colliding_group_names_are_rejected() {
        let contents = CONFIGURATION
            .replace("reception_handler_configuration_name: inbox", "reception_handler_configuration_name: sdc")
            .replace("  inbox:\n", "  sdc:\n");
        let (_dir, path) = write_configuration(&contents);
        let configuration = load_configuration(&path).expect("configuration should load");
        let error = load_parameters(&configuration).expect_err("parameters should be invalid");

        let message = format!("{:#}", error);
        assert!(message.contains("parameter_group_names"), "unexpected error: {}", message);
    }

    #[test]
    fn missing_configuration_file_is_an_error() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        assert!(load_configuration(&dir.path().join("missing.yaml")).is_err());
    }
}
