use ferry_config::{GenericConfiguration, ParameterGroup as _};
use ferry_error::{generic_error, ErrorContext as _, GenericError};

use crate::parameters::DistributionParameterGroup;

/// Validates the configuration and prints the report to standard output.
///
/// Returns an error if the configuration is invalid, so the process exits with a non-zero code.
pub fn validate(configuration: &GenericConfiguration, json: bool) -> Result<(), GenericError> {
    let parameters = DistributionParameterGroup::from_configuration(configuration)
        .error_context("Failed to read distribution parameters.")?;
    let validation = parameters.validate();

    if json {
        let report = serde_json::to_string_pretty(&validation).error_context("Failed to serialize validation report.")?;
        println!("{}", report);
    } else {
        print!("{}", validation);
    }

    if validation.is_valid() {
        Ok(())
    } else {
        Err(generic_error!(
            "Configuration has {} invalid field(s).",
            validation.invalid_fields().len()
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::cli::run::load_configuration;

    fn sample_configuration() -> GenericConfiguration {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/distribution.yaml");
        load_configuration(&path).expect("sample configuration should load")
    }

    #[test]
    fn sample_configuration_is_valid() {
        let configuration = sample_configuration();
        validate(&configuration, false).expect("sample configuration should be valid");
        validate(&configuration, true).expect("sample configuration should be valid");
    }

    #[test]
    fn invalid_configuration_fails() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("distribution.yaml");
        std::fs::write(&path, "name: ferry\n").expect("should write configuration");

        let configuration = load_configuration(&path).expect("configuration should load");
        let error = validate(&configuration, false).expect_err("configuration should be invalid");
        assert!(error.to_string().contains("invalid field(s)"), "unexpected error: {}", error);
    }
}
