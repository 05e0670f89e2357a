//! Root parameter group of the distribution service.
use std::collections::{hash_map::Entry, BTreeMap, HashMap};

use ferry_config::{
    validation::{check_string_parameter, validate_string_parameter}, ConfigurationError, GenericConfiguration, ParameterGroup, ValidationResult,
    ValidationStatus,
};
use ferry_core::parameters::{
    ArtifactForwarderConfigurationParameterGroup, ReceptionHandlerConfigurationParameterGroup,
    ReceptionHandlerParameters,
};
use serde::Deserialize;

const MAX_PORT: i64 = u16::MAX as i64;

/// Parameters of the control-plane REST server.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RestServerParameters {
    #[serde(skip)]
    name: String,

    host: String,
    port: i64,
    user_name: String,
    password: String,
    https: bool,
    certificate_path: Option<String>,
    private_key_path: Option<String>,
}

impl RestServerParameters {
    /// Names this group after the service it belongs to.
    pub fn set_name<N: Into<String>>(&mut self, name: N) {
        self.name = name.into();
    }

    /// Host the server binds to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port the server binds to.
    pub fn port(&self) -> i64 {
        self.port
    }

    /// User name required by basic authentication.
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Password required by basic authentication.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Whether the server is served over TLS.
    pub fn https(&self) -> bool {
        self.https
    }

    /// Certificate chain and private key paths, if both are configured.
    pub fn pem_files(&self) -> Option<(&str, &str)> {
        self.certificate_path.as_deref().zip(self.private_key_path.as_deref())
    }

    /// Base URL the server is reachable at.
    pub fn base_url(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

impl ParameterGroup for RestServerParameters {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new(&self.name);
        check_string_parameter(&mut result, "host", self.host.as_str());
        if (1..=MAX_PORT).contains(&self.port) {
            result.set_result("port", ValidationStatus::Valid, "");
        } else {
            result.set_result(
                "port",
                ValidationStatus::Invalid,
                format!("must be a positive integer no greater than {}", MAX_PORT),
            );
        }
        check_string_parameter(&mut result, "user_name", self.user_name.as_str());
        check_string_parameter(&mut result, "password", self.password.as_str());

        match (&self.certificate_path, &self.private_key_path) {
            (None, None) => {}
            (Some(certificate_path), Some(private_key_path)) => {
                check_string_parameter(&mut result, "certificate_path", certificate_path.as_str());
                check_string_parameter(&mut result, "private_key_path", private_key_path.as_str());
            }
            (Some(_), None) => result.set_result(
                "private_key_path",
                ValidationStatus::Invalid,
                "must be set together with certificate_path",
            ),
            (None, Some(_)) => result.set_result(
                "certificate_path",
                ValidationStatus::Invalid,
                "must be set together with private_key_path",
            ),
        }

        result
    }
}

/// Root parameter group: the REST server, every reception handler, and every plugin configuration group.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct DistributionParameterGroup {
    name: String,
    rest_server_parameters: Option<RestServerParameters>,
    reception_handler_parameters: BTreeMap<String, ReceptionHandlerParameters>,
    reception_handler_configuration_parameters: BTreeMap<String, ReceptionHandlerConfigurationParameterGroup>,
    artifact_forwarder_configuration_parameters: BTreeMap<String, ArtifactForwarderConfigurationParameterGroup>,
}

impl DistributionParameterGroup {
    /// Extracts the root group from a loaded configuration and names every nested group.
    ///
    /// # Errors
    ///
    /// If the configuration has values of the wrong shape, an error is returned. Missing values are not errors: they
    /// are reported by [`validate`][ParameterGroup::validate].
    pub fn from_configuration(config: &GenericConfiguration) -> Result<Self, ConfigurationError> {
        let mut group: Self = config.as_typed()?;
        group.assign_names();
        Ok(group)
    }

    /// Names the REST server group after the service, and every map entry after its key.
    pub fn assign_names(&mut self) {
        if let Some(rest) = self.rest_server_parameters.as_mut() {
            rest.set_name(self.name.as_str());
        }
        for (name, handler) in self.reception_handler_parameters.iter_mut() {
            handler.assign_name(name.as_str());
        }
        for (name, group) in self.reception_handler_configuration_parameters.iter_mut() {
            group.assign_name(name.as_str());
        }
        for (name, group) in self.artifact_forwarder_configuration_parameters.iter_mut() {
            group.assign_name(name.as_str());
        }
    }

    /// Parameters of the control-plane REST server, if configured.
    pub fn rest_server_parameters(&self) -> Option<&RestServerParameters> {
        self.rest_server_parameters.as_ref()
    }

    /// Reception handlers, keyed by name.
    pub fn reception_handler_parameters(&self) -> &BTreeMap<String, ReceptionHandlerParameters> {
        &self.reception_handler_parameters
    }

    /// Reception plugin configuration groups, keyed by name.
    pub fn reception_handler_configuration_parameters(
        &self,
    ) -> &BTreeMap<String, ReceptionHandlerConfigurationParameterGroup> {
        &self.reception_handler_configuration_parameters
    }

    /// Forwarder configuration groups, keyed by name.
    pub fn artifact_forwarder_configuration_parameters(
        &self,
    ) -> &BTreeMap<String, ArtifactForwarderConfigurationParameterGroup> {
        &self.artifact_forwarder_configuration_parameters
    }

    /// Names of every group registered with the parameter service on startup, each paired with where it is declared.
    ///
    /// Groups are listed in registration order.
    pub fn registered_group_names(&self) -> Vec<(&str, String)> {
        let mut names = vec![(self.name.as_str(), "name".to_string())];
        for (key, handler) in &self.reception_handler_parameters {
            if let Some(plugin_handler) = handler.plugin_handler_parameters() {
                names.push((
                    plugin_handler.name(),
                    format!("reception_handler_parameters.{}.plugin_handler_parameters", key),
                ));
            }
            names.push((handler.name(), format!("reception_handler_parameters.{}", key)));
        }
        for (key, group) in &self.reception_handler_configuration_parameters {
            names.push((group.name(), format!("reception_handler_configuration_parameters.{}", key)));
        }
        for (key, group) in &self.artifact_forwarder_configuration_parameters {
            names.push((group.name(), format!("artifact_forwarder_configuration_parameters.{}", key)));
        }
        names
    }

    fn validate_group_names(&self, result: &mut ValidationResult) {
        let mut owners = HashMap::new();
        let mut duplicates = ValidationResult::new("parameter_group_names");
        for (name, owner) in self.registered_group_names() {
            // Blank names are reported by the group that carries them.
            if !validate_string_parameter(name) {
                continue;
            }
            match owners.entry(name) {
                Entry::Vacant(entry) => {
                    entry.insert(owner);
                }
                Entry::Occupied(entry) => duplicates.set_result(
                    name,
                    ValidationStatus::Invalid,
                    format!(
                        "parameter group name '{}' is used by both {} and {}",
                        name,
                        entry.get(),
                        owner
                    ),
                ),
            }
        }
        if !duplicates.is_valid() {
            result.set_group_result("parameter_group_names", duplicates);
        }
    }
}

impl ParameterGroup for DistributionParameterGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new(&self.name);
        check_string_parameter(&mut result, "name", self.name.as_str());

        match &self.rest_server_parameters {
            Some(rest) => result.set_group_result("rest_server_parameters", rest.validate()),
            None => result.set_result(
                "rest_server_parameters",
                ValidationStatus::Invalid,
                "must have rest_server_parameters",
            ),
        }

        if self.reception_handler_parameters.is_empty() {
            result.set_result(
                "reception_handler_parameters",
                ValidationStatus::Invalid,
                "must have at least one reception handler",
            );
        } else {
            result.set_map_result(
                "reception_handler_parameters",
                self.reception_handler_parameters
                    .iter()
                    .map(|(name, handler)| (name.clone(), handler.validate())),
            );
        }

        result.set_map_result(
            "reception_handler_configuration_parameters",
            self.reception_handler_configuration_parameters
                .iter()
                .map(|(name, group)| (name.clone(), group.validate())),
        );
        result.set_map_result(
            "artifact_forwarder_configuration_parameters",
            self.artifact_forwarder_configuration_parameters
                .iter()
                .map(|(name, group)| (name.clone(), group.validate())),
        );
        self.validate_group_names(&mut result);

        result
    }
}

#[cfg(test)]
impl RestServerParameters {
    /// Creates a new `RestServerParameters` serving plain HTTP.
    pub fn new<H, U, P>(host: H, port: i64, user_name: U, password: P) -> Self
    where
        H: Into<String>,
        U: Into<String>,
        P: Into<String>,
    {
        Self {
            host: host.into(),
            port,
            user_name: user_name.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Serves over TLS, using the given PEM files if both are provided.
    pub fn with_https(mut self, certificate_path: Option<String>, private_key_path: Option<String>) -> Self {
        self.https = true;
        self.certificate_path = certificate_path;
        self.private_key_path = private_key_path;
        self
    }
}

#[cfg(test)]
impl DistributionParameterGroup {
    /// Creates an empty `DistributionParameterGroup`.
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_rest_server_parameters(mut self, parameters: RestServerParameters) -> Self {
        self.rest_server_parameters = Some(parameters);
        self
    }

    pub fn with_reception_handler(mut self, parameters: ReceptionHandlerParameters) -> Self {
        self.reception_handler_parameters
            .insert(parameters.name().to_string(), parameters);
        self
    }

    pub fn with_reception_configuration(mut self, group: ReceptionHandlerConfigurationParameterGroup) -> Self {
        self.reception_handler_configuration_parameters
            .insert(group.name().to_string(), group);
        self
    }

    pub fn with_forwarder_configuration(mut self, group: ArtifactForwarderConfigurationParameterGroup) -> Self {
        self.artifact_forwarder_configuration_parameters
            .insert(group.name().to_string(), group);
        self
    }
}
