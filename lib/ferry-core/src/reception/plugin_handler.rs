use std::fmt;

use ferry_config::ParameterGroup as _;
use snafu::ResultExt as _;
use tracing::{debug, info};

use super::{
    ForwarderConfiguration, MissingForwarderConfiguration, PluginContext, PluginInitializationError,
    PluginInstantiation, UnresolvedParameters,
};
use crate::{
    forwarding::{ArtifactForwarder, ForwarderContext},
    parameters::{ArtifactForwarderConfigurationParameterGroup, PluginHandlerParameters},
};

struct NamedForwarder {
    name: String,
    forwarder: Box<dyn ArtifactForwarder>,
}

/// The fixed, ordered set of forwarders a reception handler delivers to.
///
/// A plugin handler is built once, from its parameter group, and never changes afterwards.
pub struct PluginHandler {
    name: String,
    forwarders: Vec<NamedForwarder>,
}

impl PluginHandler {
    /// Builds a plugin handler from the `PluginHandlerParameters` group registered under `group_name`.
    ///
    /// Each declared forwarder is instantiated from the forwarder registry by its type tag and configured with its
    /// configuration group, in declaration order.
    ///
    /// # Errors
    ///
    /// If the parameter group cannot be found, or any forwarder cannot be instantiated or configured, an error naming
    /// the offending group or forwarder is returned.
    pub fn from_parameters(group_name: &str, context: &PluginContext<'_>) -> Result<Self, PluginInitializationError> {
        let parameters = context
            .parameters()
            .get::<PluginHandlerParameters>(group_name)
            .context(UnresolvedParameters { name: group_name })?;

        let mut forwarders = Vec::with_capacity(parameters.artifact_forwarders().len());
        for forwarder_parameters in parameters.artifact_forwarders() {
            let forwarder_name = forwarder_parameters.name();
            let mut forwarder = context
                .forwarders()
                .instantiate(forwarder_parameters.forwarder_type())
                .context(PluginInstantiation { plugin: forwarder_name })?;

            let configuration_name = forwarder_parameters.forwarder_configuration_name();
            let configuration = match configuration_name {
                Some(configuration_name) => Some(
                    context
                        .parameters()
                        .get::<ArtifactForwarderConfigurationParameterGroup>(configuration_name)
                        .context(MissingForwarderConfiguration {
                            forwarder: forwarder_name,
                            configuration: configuration_name,
                        })?,
                ),
                None => None,
            };

            let forwarder_context = ForwarderContext::new(forwarder_name, configuration_name, configuration);
            forwarder
                .configure(&forwarder_context)
                .context(ForwarderConfiguration { forwarder: forwarder_name })?;

            debug!(
                plugin_handler = group_name,
                forwarder = forwarder_name,
                forwarder_type = forwarder_parameters.forwarder_type(),
                "Configured forwarder."
            );
            forwarders.push(NamedForwarder {
                name: forwarder_name.to_string(),
                forwarder,
            });
        }

        info!(
            plugin_handler = group_name,
            forwarders = forwarders.len(),
            "Built plugin handler."
        );

        Ok(Self {
            name: group_name.to_string(),
            forwarders,
        })
    }

    /// Builds a plugin handler from already-configured forwarders, delivered to in the given order.
    pub fn from_forwarders<N, I>(name: N, forwarders: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (String, Box<dyn ArtifactForwarder>)>,
    {
        Self {
            name: name.into(),
            forwarders: forwarders
                .into_iter()
                .map(|(name, forwarder)| NamedForwarder { name, forwarder })
                .collect(),
        }
    }

    /// Name of the plugin handler.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Forwarders, in delivery order, paired with their names.
    pub fn forwarders(&self) -> impl Iterator<Item = (&str, &dyn ArtifactForwarder)> {
        self.forwarders
            .iter()
            .map(|named| (named.name.as_str(), named.forwarder.as_ref()))
    }

    /// Names of the forwarders, in delivery order.
    pub fn forwarder_names(&self) -> Vec<&str> {
        self.forwarders.iter().map(|named| named.name.as_str()).collect()
    }

    /// Number of forwarders.
    pub fn len(&self) -> usize {
        self.forwarders.len()
    }

    /// Returns `true` if the handler has no forwarders.
    pub fn is_empty(&self) -> bool {
        self.forwarders.is_empty()
    }
}

impl fmt::Debug for PluginHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandler")
            .field("name", &self.name)
            .field("forwarders", &self.forwarder_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use ferry_config::ParameterService;
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::{
        parameters::ArtifactForwarderParameters,
        statistics::DistributionStatistics,
        test_util::{forwarder_registry, Recorder},
    };

    fn register_plugin_handler(service: &ParameterService, forwarders: Vec<ArtifactForwarderParameters>) {
        service.register(PluginHandlerParameters::new("sdc-plugins", forwarders));
    }

    #[test]
    fn builds_forwarders_in_declaration_order() {
        let recorder = Recorder::default();
        let service = ParameterService::new();
        service.register(ArtifactForwarderConfigurationParameterGroup::new(
            "audit-config",
            "recording",
            json!({ "label": "audit" }),
        ));
        register_plugin_handler(
            &service,
            vec![
                ArtifactForwarderParameters::new("second", "recording", None),
                ArtifactForwarderParameters::new("first", "recording", Some("audit-config".to_string())),
            ],
        );

        let registry = forwarder_registry(&recorder);
        let statistics = DistributionStatistics::new();
        let context = PluginContext::new(&service, &registry, &statistics);
        let handler = PluginHandler::from_parameters("sdc-plugins", &context).expect("handler should build");

        assert_eq!(handler.forwarder_names(), vec!["second", "first"]);
        assert_eq!(
            recorder.configured(),
            vec![
                ("second".to_string(), None),
                ("first".to_string(), Some("audit".to_string()))
            ]
        );
    }

    #[test]
    fn unknown_group_is_unresolved() {
        let recorder = Recorder::default();
        let service = ParameterService::new();
        let registry = forwarder_registry(&recorder);
        let statistics = DistributionStatistics::new();
        let context = PluginContext::new(&service, &registry, &statistics);

        assert!(matches!(
            PluginHandler::from_parameters("sdc-plugins", &context),
            Err(PluginInitializationError::UnresolvedParameters { name, .. }) if name == "sdc-plugins"
        ));
    }

    #[test]
    fn unknown_forwarder_type_names_forwarder() {
        let recorder = Recorder::default();
        let service = ParameterService::new();
        register_plugin_handler(
            &service,
            vec![ArtifactForwarderParameters::new("kafka", "kafka", None)],
        );
        let registry = forwarder_registry(&recorder);
        let statistics = DistributionStatistics::new();
        let context = PluginContext::new(&service, &registry, &statistics);

        assert!(matches!(
            PluginHandler::from_parameters("sdc-plugins", &context),
            Err(PluginInitializationError::PluginInstantiation { plugin, .. }) if plugin == "kafka"
        ));
    }

    #[test]
    fn missing_configuration_group_names_forwarder() {
        let recorder = Recorder::default();
        let service = ParameterService::new();
        register_plugin_handler(
            &service,
            vec![ArtifactForwarderParameters::new(
                "audit",
                "recording",
                Some("nowhere".to_string()),
            )],
        );
        let registry = forwarder_registry(&recorder);
        let statistics = DistributionStatistics::new();
        let context = PluginContext::new(&service, &registry, &statistics);

        match PluginHandler::from_parameters("sdc-plugins", &context) {
            Err(PluginInitializationError::MissingForwarderConfiguration {
                forwarder,
                configuration,
                ..
            }) => {
                assert_eq!(forwarder, "audit");
                assert_eq!(configuration, "nowhere");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn configure_failure_names_forwarder() {
        let recorder = Recorder::default();
        let service = ParameterService::new();
        service.register(ArtifactForwarderConfigurationParameterGroup::new(
            "bad-config",
            "recording",
            json!({ "fail_configure": true }),
        ));
        register_plugin_handler(
            &service,
            vec![ArtifactForwarderParameters::new(
                "audit",
                "recording",
                Some("bad-config".to_string()),
            )],
        );
        let registry = forwarder_registry(&recorder);
        let statistics = DistributionStatistics::new();
        let context = PluginContext::new(&service, &registry, &statistics);

        assert!(matches!(
            PluginHandler::from_parameters("sdc-plugins", &context),
            Err(PluginInitializationError::ForwarderConfiguration { forwarder, .. }) if forwarder == "audit"
        ));
    }
}
