//! Parameter groups describing reception handlers, their forwarders, and plugin configuration.
//!
//! Every field deserializes with a default so that missing values surface as validation failures rather than
//! deserialization errors. Group names are never read from configuration: they are assigned from the key each group is
//! declared under.
use std::{collections::HashSet, marker::PhantomData};

use ferry_config::{
    validation::{check_string_parameter, validate_string_parameter},
    ParameterGroup, ValidationResult, ValidationStatus,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

/// Suffix appended to a reception handler's name to name its plugin handler group.
pub const PLUGIN_HANDLER_SUFFIX: &str = "-plugins";

/// Parameters of a single reception handler.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ReceptionHandlerParameters {
    #[serde(skip)]
    name: String,

    reception_handler_type: String,
    reception_handler_configuration_name: String,
    plugin_handler_parameters: Option<PluginHandlerParameters>,
}

impl ReceptionHandlerParameters {
    /// Creates a new `ReceptionHandlerParameters`.
    ///
    /// The handler and its plugin handler group are named after `name`.
    pub fn new<N, T, C>(
        name: N, reception_handler_type: T, reception_handler_configuration_name: C,
        plugin_handler_parameters: Option<PluginHandlerParameters>,
    ) -> Self
    where
        N: Into<String>,
        T: Into<String>,
        C: Into<String>,
    {
        let mut parameters = Self {
            name: String::new(),
            reception_handler_type: reception_handler_type.into(),
            reception_handler_configuration_name: reception_handler_configuration_name.into(),
            plugin_handler_parameters,
        };
        parameters.assign_name(name);
        parameters
    }

    /// Assigns the name of this group, and names the nested plugin handler group `<name>-plugins`.
    pub fn assign_name<N: Into<String>>(&mut self, name: N) {
        self.name = name.into();
        let plugin_handler_name = format!("{}{}", self.name, PLUGIN_HANDLER_SUFFIX);
        if let Some(plugin_handler_parameters) = self.plugin_handler_parameters.as_mut() {
            plugin_handler_parameters.name = plugin_handler_name;
        }
    }

    /// Type tag of the reception plugin.
    pub fn reception_handler_type(&self) -> &str {
        &self.reception_handler_type
    }

    /// Name of the reception configuration group for the reception plugin.
    pub fn reception_handler_configuration_name(&self) -> &str {
        &self.reception_handler_configuration_name
    }

    /// Parameters of the plugin handler owning this reception handler's forwarders.
    pub fn plugin_handler_parameters(&self) -> Option<&PluginHandlerParameters> {
        self.plugin_handler_parameters.as_ref()
    }
}

impl ParameterGroup for ReceptionHandlerParameters {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new(&self.name);
        check_string_parameter(&mut result, "reception_handler_type", self.reception_handler_type.as_str());
        check_string_parameter(
            &mut result,
            "reception_handler_configuration_name",
            self.reception_handler_configuration_name.as_str(),
        );
        match &self.plugin_handler_parameters {
            Some(plugin_handler_parameters) => {
                result.set_group_result("plugin_handler_parameters", plugin_handler_parameters.validate())
            }
            None => result.set_result(
                "plugin_handler_parameters",
                ValidationStatus::Invalid,
                "must have plugin_handler_parameters",
            ),
        }
        result
    }
}

/// Parameters of a plugin handler: the forwarders a reception handler pushes its input to.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PluginHandlerParameters {
    #[serde(skip)]
    name: String,

    artifact_forwarders: Vec<ArtifactForwarderParameters>,
}

impl PluginHandlerParameters {
    /// Creates a new `PluginHandlerParameters` with the given forwarders, in delivery order.
    pub fn new<N: Into<String>>(name: N, artifact_forwarders: Vec<ArtifactForwarderParameters>) -> Self {
        Self {
            name: name.into(),
            artifact_forwarders,
        }
    }

    /// Declared forwarders, in delivery order.
    pub fn artifact_forwarders(&self) -> &[ArtifactForwarderParameters] {
        &self.artifact_forwarders
    }
}

impl ParameterGroup for PluginHandlerParameters {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new(&self.name);
        let mut seen = HashSet::new();
        let forwarder_results = self.artifact_forwarders.iter().enumerate().map(|(index, forwarder)| {
            let mut forwarder_result = forwarder.validate();
            if !seen.insert(forwarder.name.as_str()) {
                forwarder_result.set_result(
                    "name",
                    ValidationStatus::Invalid,
                    format!("duplicate forwarder name '{}'", forwarder.name),
                );
            }
            (index.to_string(), forwarder_result)
        });
        result.set_map_result("artifact_forwarders", forwarder_results.collect::<Vec<_>>());
        result
    }
}

/// Parameters of a single forwarder within a plugin handler.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ArtifactForwarderParameters {
    name: String,
    forwarder_type: String,
    forwarder_configuration_name: Option<String>,
}

impl ArtifactForwarderParameters {
    /// Creates a new `ArtifactForwarderParameters`.
    pub fn new<N, T>(name: N, forwarder_type: T, forwarder_configuration_name: Option<String>) -> Self
    where
        N: Into<String>,
        T: Into<String>,
    {
        Self {
            name: name.into(),
            forwarder_type: forwarder_type.into(),
            forwarder_configuration_name,
        }
    }

    /// Type tag of the forwarder plugin.
    pub fn forwarder_type(&self) -> &str {
        &self.forwarder_type
    }

    /// Name of the forwarder configuration group, if the forwarder takes configuration.
    pub fn forwarder_configuration_name(&self) -> Option<&str> {
        self.forwarder_configuration_name.as_deref()
    }
}

impl ParameterGroup for ArtifactForwarderParameters {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new(&self.name);
        check_string_parameter(&mut result, "name", self.name.as_str());
        check_string_parameter(&mut result, "forwarder_type", self.forwarder_type.as_str());
        if let Some(configuration_name) = &self.forwarder_configuration_name {
            if !validate_string_parameter(configuration_name.as_str()) {
                result.set_result(
                    "forwarder_configuration_name",
                    ValidationStatus::Invalid,
                    "must be a non-blank string when present",
                );
            }
        }
        result
    }
}

/// Marker for configuration consumed by reception plugins.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReceptionPlugin;

/// Marker for configuration consumed by forwarder plugins.
#[derive(Clone, Copy, Debug, Default)]
pub struct ForwarderPlugin;

/// Plugin-specific configuration, declared by name and consumed by a plugin during setup.
///
/// `parameters` holds the plugin's own settings as a mapping; an absent value is treated as an empty mapping. Plugins
/// extract their typed settings with [`typed_parameters`][Self::typed_parameters].
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PluginConfigurationParameterGroup<K> {
    #[serde(skip)]
    name: String,

    parameter_type: String,
    parameters: Value,

    #[serde(skip)]
    _kind: PhantomData<K>,
}

/// Configuration for a reception plugin.
pub type ReceptionHandlerConfigurationParameterGroup = PluginConfigurationParameterGroup<ReceptionPlugin>;

/// Configuration for a forwarder plugin.
pub type ArtifactForwarderConfigurationParameterGroup = PluginConfigurationParameterGroup<ForwarderPlugin>;

impl<K> PluginConfigurationParameterGroup<K> {
    /// Creates a new configuration group.
    pub fn new<N, T>(name: N, parameter_type: T, parameters: Value) -> Self
    where
        N: Into<String>,
        T: Into<String>,
    {
        Self {
            name: name.into(),
            parameter_type: parameter_type.into(),
            parameters,
            _kind: PhantomData,
        }
    }

    /// Assigns the name of this group.
    pub fn assign_name<N: Into<String>>(&mut self, name: N) {
        self.name = name.into();
    }

    /// Tag describing which plugin these parameters are for.
    pub fn parameter_type(&self) -> &str {
        &self.parameter_type
    }

    /// Raw plugin parameters.
    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    /// Deserializes the plugin parameters as `T`.
    ///
    /// # Errors
    ///
    /// If the parameters are not a mapping, or cannot be deserialized as `T`, an error is returned.
    pub fn typed_parameters<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.parameters {
            Value::Null => serde_json::from_value(Value::Object(Map::new())),
            parameters => T::deserialize(parameters),
        }
    }
}

impl<K> ParameterGroup for PluginConfigurationParameterGroup<K>
where
    K: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new(&self.name);
        check_string_parameter(&mut result, "parameter_type", self.parameter_type.as_str());
        match &self.parameters {
            Value::Null | Value::Object(_) => result.set_result("parameters", ValidationStatus::Valid, ""),
            _ => result.set_result("parameters", ValidationStatus::Invalid, "must be a mapping"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::*;

    fn forwarder(name: &str) -> ArtifactForwarderParameters {
        ArtifactForwarderParameters::new(name, "log", None)
    }

    #[test]
    fn assigning_name_names_plugin_handler() {
        let mut parameters: ReceptionHandlerParameters = serde_json::from_value(json!({
            "reception_handler_type": "file_drop",
            "reception_handler_configuration_name": "inbox",
            "plugin_handler_parameters": { "artifact_forwarders": [] },
        }))
        .expect("parameters should deserialize");

        parameters.assign_name("sdc");
        assert_eq!(parameters.name(), "sdc");
        assert_eq!(
            parameters.plugin_handler_parameters().map(|p| p.name()),
            Some("sdc-plugins")
        );
    }

    #[test]
    fn missing_fields_are_reported_not_rejected() {
        let parameters: ReceptionHandlerParameters =
            serde_json::from_value(json!({})).expect("empty mapping should deserialize");
        let result = parameters.validate();

        assert!(!result.is_valid());
        let invalid = result.invalid_fields().into_iter().map(|(path, _)| path).collect::<Vec<_>>();
        assert_eq!(
            invalid,
            vec![
                "reception_handler_type".to_string(),
                "reception_handler_configuration_name".to_string(),
                "plugin_handler_parameters".to_string(),
            ]
        );
    }

    #[test]
    fn empty_forwarder_list_is_valid() {
        let parameters = PluginHandlerParameters::new("sdc-plugins", Vec::new());
        assert!(parameters.validate().is_valid());
    }

    #[test]
    fn duplicate_forwarder_names_are_invalid() {
        let parameters =
            PluginHandlerParameters::new("sdc-plugins", vec![forwarder("audit"), forwarder("archive"), forwarder("audit")]);
        let result = parameters.validate();

        assert!(!result.is_valid());
        assert_eq!(
            result.invalid_fields(),
            vec![(
                "artifact_forwarders.2.name".to_string(),
                "duplicate forwarder name 'audit'".to_string()
            )]
        );
    }

    #[test]
    fn blank_forwarder_configuration_name_is_invalid() {
        let valid = ArtifactForwarderParameters::new("audit", "log", Some("audit-config".to_string()));
        let blank = ArtifactForwarderParameters::new("audit", "log", Some("  ".to_string()));
        assert!(valid.validate().is_valid());
        assert!(!blank.validate().is_valid());
    }

    #[test]
    fn configuration_parameters_must_be_a_mapping() {
        let mapping = ArtifactForwarderConfigurationParameterGroup::new("a", "file", json!({ "path": "/tmp/a" }));
        let absent = ArtifactForwarderConfigurationParameterGroup::new("b", "log", Value::Null);
        let list = ArtifactForwarderConfigurationParameterGroup::new("c", "log", json!(["x"]));
        let untyped = ArtifactForwarderConfigurationParameterGroup::new("d", " ", Value::Null);

        assert!(mapping.validate().is_valid());
        assert!(absent.validate().is_valid());
        assert!(!list.validate().is_valid());
        assert!(!untyped.validate().is_valid());
    }

    #[test]
    fn absent_parameters_deserialize_as_empty_mapping() {
        #[derive(Debug, Default, Deserialize, PartialEq)]
        #[serde(default)]
        struct Settings {
            label: Option<String>,
        }

        let absent = ReceptionHandlerConfigurationParameterGroup::new("inbox", "file_drop", Value::Null);
        let settings: Settings = absent.typed_parameters().expect("empty mapping should deserialize");
        assert_eq!(settings, Settings::default());

        let present = ReceptionHandlerConfigurationParameterGroup::new("inbox", "file_drop", json!({ "label": "x" }));
        let settings: Settings = present.typed_parameters().expect("mapping should deserialize");
        assert_eq!(settings.label.as_deref(), Some("x"));
    }
}
