//! Service lifecycle: starts the control plane, registers parameters, and brings reception handlers up and down.
use std::{
    fmt,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
};

use ferry_config::{ParameterGroup as _, ParameterService};
use ferry_core::{
    forwarding::ForwarderRegistry,
    parameters::ReceptionHandlerParameters,
    reception::{PluginContext, PluginInitializationError, ReceptionHandler, ReceptionRegistry},
    statistics::DistributionStatistics,
};
use ferry_error::GenericError;
use snafu::Snafu;
use tracing::{debug, error, info};

use crate::parameters::{DistributionParameterGroup, RestServerParameters};

/// Lifecycle state of the distribution service.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ActivatorState {
    /// Not running. The initial and final state.
    Stopped,

    /// `initialize` is in progress.
    Starting,

    /// Initialized and serving.
    Running,

    /// `terminate`, or a rollback, is in progress.
    Stopping,
}

impl ActivatorState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Starting => 1,
            Self::Running => 2,
            Self::Stopping => 3,
        }
    }
}

impl fmt::Display for ActivatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Stopped => "STOPPED",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
        };
        f.write_str(label)
    }
}

/// Shared handle to the service's lifecycle state.
#[derive(Clone, Debug, Default)]
pub struct Lifecycle {
    state: Arc<AtomicU8>,
}

impl Lifecycle {
    /// Current lifecycle state.
    pub fn state(&self) -> ActivatorState {
        ActivatorState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns `true` if the service is running.
    pub fn is_alive(&self) -> bool {
        self.state() == ActivatorState::Running
    }

    pub(crate) fn set(&self, state: ActivatorState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

/// What the control-plane server gets to observe about the service.
#[derive(Clone, Debug)]
pub struct ControlPlaneContext {
    /// Lifecycle of the service, reported by the health check.
    pub lifecycle: Lifecycle,

    /// Dispatch statistics shared by every reception handler.
    pub statistics: DistributionStatistics,
}

/// A control-plane server.
pub trait ControlPlaneServer: Send {
    /// Starts serving, returning once the server is ready to accept requests.
    fn start(&mut self) -> Result<(), GenericError>;

    /// Stops serving, returning once the server has shut down.
    fn stop(&mut self) -> Result<(), GenericError>;
}

/// Builds the control-plane server from the REST server parameters.
pub trait ControlPlaneServerBuilder: Send {
    /// Builds a server that is not yet started.
    ///
    /// # Errors
    ///
    /// If the server cannot be built from the given parameters, an error is returned.
    fn build(
        &self, parameters: &RestServerParameters, context: ControlPlaneContext,
    ) -> Result<Box<dyn ControlPlaneServer>, GenericError>;
}

/// Distribution service error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum DistributionServiceError {
    /// The operation is not allowed in the current lifecycle state.
    #[snafu(display("Cannot {} the distribution service while it is {}.", operation, state))]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,

        /// State the service was in.
        state: ActivatorState,
    },

    /// The root parameter group has no REST server parameters.
    #[snafu(display("Distribution service '{}' has no REST server parameters.", name))]
    MissingRestServerParameters {
        /// Name of the service.
        name: String,
    },

    /// The control-plane server could not be built or started.
    #[snafu(display("Failed to start the control-plane server."))]
    ControlPlaneStart {
        /// Error source.
        source: GenericError,
    },

    /// A reception handler could not be created or initialized.
    #[snafu(display("Failed to initialize reception handler '{}'.", name))]
    ReceptionHandlerInitialization {
        /// Name of the reception handler.
        name: String,

        /// Error source.
        source: PluginInitializationError,
    },

    /// The control-plane server failed to stop.
    #[snafu(display("Failed to stop the control-plane server."))]
    Termination {
        /// Error source.
        source: GenericError,
    },
}

/// Brings the distribution service up and down.
///
/// On `initialize`, the control-plane server is started, every parameter group is registered with the parameter
/// service, and every reception handler is created and initialized. On `terminate`, the same steps are undone in
/// reverse. Only the groups registered by `initialize` are deregistered.
pub struct DistributionActivator {
    parameters: Arc<DistributionParameterGroup>,
    parameter_service: ParameterService,
    forwarders: ForwarderRegistry,
    receptions: ReceptionRegistry,
    server_builder: Box<dyn ControlPlaneServerBuilder>,
    statistics: DistributionStatistics,
    lifecycle: Lifecycle,
    server: Option<Box<dyn ControlPlaneServer>>,
    handlers: Vec<ReceptionHandler>,
    registered: Vec<String>,
}

impl DistributionActivator {
    /// Creates a new `DistributionActivator`.
    pub fn new<B>(
        parameters: DistributionParameterGroup, parameter_service: ParameterService, forwarders: ForwarderRegistry,
        receptions: ReceptionRegistry, server_builder: B,
    ) -> Self
    where
        B: ControlPlaneServerBuilder + 'static,
    {
        Self {
            parameters: Arc::new(parameters),
            parameter_service,
            forwarders,
            receptions,
            server_builder: Box::new(server_builder),
            statistics: DistributionStatistics::new(),
            lifecycle: Lifecycle::default(),
            server: None,
            handlers: Vec::new(),
            registered: Vec::new(),
        }
    }

    /// Returns `true` if the service is running.
    pub fn is_alive(&self) -> bool {
        self.lifecycle.is_alive()
    }

    /// Starts the service.
    ///
    /// # Errors
    ///
    /// If the service is not stopped, the control-plane server cannot be started, or any reception handler fails to
    /// initialize, an error is returned and the service is left stopped with nothing registered.
    pub fn initialize(&mut self) -> Result<(), DistributionServiceError> {
        self.transition("initialize", ActivatorState::Stopped, ActivatorState::Starting)?;
        let parameters = Arc::clone(&self.parameters);
        info!(service = parameters.name(), "Starting distribution service.");

        let mut rest = match parameters.rest_server_parameters() {
            Some(rest) => rest.clone(),
            None => {
                self.lifecycle.set(ActivatorState::Stopped);
                return Err(DistributionServiceError::MissingRestServerParameters {
                    name: parameters.name().to_string(),
                });
            }
        };
        rest.set_name(parameters.name());

        let context = ControlPlaneContext {
            lifecycle: self.lifecycle.clone(),
            statistics: self.statistics.clone(),
        };
        let server = self.server_builder.build(&rest, context).and_then(|mut server| {
            server.start()?;
            Ok(server)
        });
        match server {
            Ok(server) => self.server = Some(server),
            Err(source) => {
                self.lifecycle.set(ActivatorState::Stopped);
                return Err(DistributionServiceError::ControlPlaneStart { source });
            }
        }

        self.register_parameters(&parameters);

        for (name, handler_parameters) in parameters.reception_handler_parameters() {
            match self.start_reception_handler(name, handler_parameters) {
                Ok(handler) => self.handlers.push(handler),
                Err(source) => {
                    error!(reception_handler = %name, "Reception handler failed to initialize. Rolling back.");
                    self.shut_down();
                    if let Some(mut server) = self.server.take() {
                        if let Err(e) = server.stop() {
                            error!(error = %e, "Failed to stop the control-plane server during rollback.");
                        }
                    }
                    return Err(DistributionServiceError::ReceptionHandlerInitialization {
                        name: name.clone(),
                        source,
                    });
                }
            }
        }

        self.lifecycle.set(ActivatorState::Running);
        info!(
            service = parameters.name(),
            reception_handlers = self.handlers.len(),
            "Distribution service started."
        );
        Ok(())
    }

    /// Stops the service.
    ///
    /// # Errors
    ///
    /// If the service is not running, or the control-plane server fails to stop, an error is returned. In the latter
    /// case the service is still stopped and every group it registered is deregistered.
    pub fn terminate(&mut self) -> Result<(), DistributionServiceError> {
        self.transition("terminate", ActivatorState::Running, ActivatorState::Stopping)?;
        info!(service = self.parameters.name(), "Stopping distribution service.");

        self.shut_down();

        if let Some(mut server) = self.server.take() {
            server
                .stop()
                .map_err(|source| DistributionServiceError::Termination { source })?;
        }

        info!(service = self.parameters.name(), "Distribution service stopped.");
        Ok(())
    }

    fn transition(
        &self, operation: &'static str, from: ActivatorState, to: ActivatorState,
    ) -> Result<(), DistributionServiceError> {
        let state = self.lifecycle.state();
        if state != from {
            return Err(DistributionServiceError::InvalidState { operation, state });
        }
        self.lifecycle.set(to);
        Ok(())
    }

    fn register_parameters(&mut self, parameters: &Arc<DistributionParameterGroup>) {
        let service = &self.parameter_service;
        service.register_shared(Arc::clone(parameters));

        for handler in parameters.reception_handler_parameters().values() {
            if let Some(plugin_handler) = handler.plugin_handler_parameters() {
                service.register(plugin_handler.clone());
            }
            service.register(handler.clone());
        }
        for group in parameters.reception_handler_configuration_parameters().values() {
            service.register(group.clone());
        }
        for group in parameters.artifact_forwarder_configuration_parameters().values() {
            service.register(group.clone());
        }

        let registered = parameters
            .registered_group_names()
            .into_iter()
            .map(|(name, _)| name.to_string())
            .collect::<Vec<_>>();

        debug!(groups = registered.len(), "Registered parameter groups.");
        self.registered = registered;
    }

    fn start_reception_handler(
        &self, name: &str, parameters: &ReceptionHandlerParameters,
    ) -> Result<ReceptionHandler, PluginInitializationError> {
        let mut handler = ReceptionHandler::create(parameters.reception_handler_type(), &self.receptions)?;
        let context = PluginContext::new(&self.parameter_service, &self.forwarders, &self.statistics);
        handler.initialize(name, &context)?;
        Ok(handler)
    }

    /// Destroys every reception handler, newest first, then deregisters every group registered by `initialize`.
    fn shut_down(&mut self) {
        self.lifecycle.set(ActivatorState::Stopping);
        while let Some(mut handler) = self.handlers.pop() {
            handler.destroy();
        }
        for name in self.registered.drain(..) {
            self.parameter_service.deregister(&name);
        }
        self.lifecycle.set(ActivatorState::Stopped);
    }
}

impl Drop for DistributionActivator {
    fn drop(&mut self) {
        if self.is_alive() {
            if let Err(e) = self.terminate() {
                error!(error = %e, "Failed to terminate distribution service on drop.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ferry_config::{ParameterGroup as _, RegistryError};
    use ferry_core::{
        forwarding::{ArtifactForwarder, ForwarderContext, ForwardingError},
        model::Artifact,
        parameters::{
            ArtifactForwarderConfigurationParameterGroup, ArtifactForwarderParameters, PluginHandlerParameters,
            ReceptionHandlerConfigurationParameterGroup,
        },
        reception::{ArtifactReception, ReceptionContext},
    };
    use ferry_error::generic_error;
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::*;

    impl DistributionActivator {
        fn state(&self) -> ActivatorState {
            self.lifecycle.state()
        }

        fn lifecycle(&self) -> &Lifecycle {
            &self.lifecycle
        }

        fn registered_names(&self) -> &[String] {
            &self.registered
        }
    }

    #[derive(Clone, Default)]
    struct Events(Arc<Mutex<Vec<String>>>);

    impl Events {
        fn push(&self, event: String) {
            self.0.lock().unwrap().push(event);
        }

        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    struct FakeServer {
        events: Events,
        fail_start: bool,
    }

    impl ControlPlaneServer for FakeServer {
        fn start(&mut self) -> Result<(), GenericError> {
            if self.fail_start {
                return Err(generic_error!("address already in use"));
            }
            self.events.push("server started".to_string());
            Ok(())
        }

        fn stop(&mut self) -> Result<(), GenericError> {
            self.events.push("server stopped".to_string());
            Ok(())
        }
    }

    struct FakeServerBuilder {
        events: Events,
        fail_start: bool,
    }

    impl ControlPlaneServerBuilder for FakeServerBuilder {
        fn build(
            &self, parameters: &RestServerParameters, context: ControlPlaneContext,
        ) -> Result<Box<dyn ControlPlaneServer>, GenericError> {
            self.events.push(format!(
                "server built for {} (alive: {})",
                parameters.name(),
                context.lifecycle.is_alive()
            ));
            Ok(Box::new(FakeServer {
                events: self.events.clone(),
                fail_start: self.fail_start,
            }))
        }
    }

    struct NoopForwarder;

    impl ArtifactForwarder for NoopForwarder {
        fn configure(&mut self, _: &ForwarderContext<'_>) -> Result<(), ForwardingError> {
            Ok(())
        }

        fn forward(&self, _: &[Artifact]) -> Result<(), ForwardingError> {
            Ok(())
        }
    }

    struct TrackedReception {
        events: Events,
        name: Option<String>,
    }

    impl ArtifactReception for TrackedReception {
        fn initialize_reception(&mut self, context: ReceptionContext) -> Result<(), GenericError> {
            self.events
                .push(format!("{} initialized", context.handler_name()));
            self.name = Some(context.handler_name().to_string());
            Ok(())
        }

        fn destroy(&mut self) {
            if let Some(name) = self.name.take() {
                self.events.push(format!("{} destroyed", name));
            }
        }
    }

    fn registries(events: &Events) -> (ForwarderRegistry, ReceptionRegistry) {
        let mut forwarders = ForwarderRegistry::new("artifact forwarder");
        forwarders.register("noop", || Ok(Box::new(NoopForwarder) as Box<dyn ArtifactForwarder>));

        let mut receptions = ReceptionRegistry::new("reception");
        let events = events.clone();
        receptions.register("tracked", move || {
            Ok(Box::new(TrackedReception {
                events: events.clone(),
                name: None,
            }) as Box<dyn ArtifactReception>)
        });
        (forwarders, receptions)
    }

    fn handler(name: &str, forwarder_type: &str) -> ReceptionHandlerParameters {
        let plugin_handler = PluginHandlerParameters::new(
            "",
            vec![ArtifactForwarderParameters::new("out", forwarder_type, Some("out-config".to_string()))],
        );
        ReceptionHandlerParameters::new(name, "tracked", "tracked-config", Some(plugin_handler))
    }

    fn parameters(handlers: Vec<ReceptionHandlerParameters>) -> DistributionParameterGroup {
        let mut group = DistributionParameterGroup::new("ferry")
            .with_rest_server_parameters(RestServerParameters::new("localhost", 8080, "admin", "secret"))
            .with_reception_configuration(ReceptionHandlerConfigurationParameterGroup::new(
                "tracked-config",
                "tracked",
                json!({}),
            ))
            .with_forwarder_configuration(ArtifactForwarderConfigurationParameterGroup::new(
                "out-config",
                "noop",
                json!({}),
            ));
        for handler in handlers {
            group = group.with_reception_handler(handler);
        }
        group
    }

    fn activator(
        events: &Events, handlers: Vec<ReceptionHandlerParameters>, fail_start: bool,
    ) -> (DistributionActivator, ParameterService) {
        let (forwarders, receptions) = registries(events);
        let service = ParameterService::new();
        let builder = FakeServerBuilder {
            events: events.clone(),
            fail_start,
        };
        let activator = DistributionActivator::new(parameters(handlers), service.clone(), forwarders, receptions, builder);
        (activator, service)
    }

    #[test]
    fn initialize_then_terminate() {
        let events = Events::default();
        let (mut activator, service) = activator(&events, vec![handler("a", "noop"), handler("b", "noop")], false);
        assert_eq!(activator.state(), ActivatorState::Stopped);

        activator.initialize().expect("activator should initialize");
        assert!(activator.is_alive());
        assert_eq!(
            service.names(),
            vec!["a", "a-plugins", "b", "b-plugins", "ferry", "out-config", "tracked-config"]
        );
        assert!(service.get::<DistributionParameterGroup>("ferry").is_ok());
        let mut registered = activator.registered_names().to_vec();
        registered.sort();
        assert_eq!(registered, service.names());
        assert_eq!(
            events.take(),
            vec![
                "server built for ferry (alive: false)",
                "server started",
                "a initialized",
                "b initialized"
            ]
        );

        activator.terminate().expect("activator should terminate");
        assert!(!activator.is_alive());
        assert_eq!(activator.state(), ActivatorState::Stopped);
        assert!(service.names().is_empty());
        assert!(activator.registered_names().is_empty());
        assert_eq!(events.take(), vec!["b destroyed", "a destroyed", "server stopped"]);
    }

    #[test]
    fn colliding_group_names_are_caught_before_startup() {
        // The handler shares its name with the reception configuration it points at.
        let group = parameters(vec![handler("tracked-config", "noop")]);

        let result = group.validate();
        assert!(!result.is_valid());
        let duplicate = result
            .field("parameter_group_names")
            .and_then(|names| names.field("tracked-config"))
            .expect("duplicate name should be reported");
        assert_eq!(
            duplicate.message(),
            Some(
                "parameter group name 'tracked-config' is used by both reception_handler_parameters.tracked-config \
                 and reception_handler_configuration_parameters.tracked-config"
            )
        );
    }

    #[test]
    fn terminate_leaves_foreign_groups_registered() {
        let events = Events::default();
        let (mut activator, service) = activator(&events, vec![handler("a", "noop")], false);
        service.register(ReceptionHandlerConfigurationParameterGroup::new("unrelated", "tracked", json!({})));

        activator.initialize().expect("activator should initialize");
        activator.terminate().expect("activator should terminate");

        assert_eq!(service.names(), vec!["unrelated"]);
    }

    #[test]
    fn server_start_failure_registers_nothing() {
        let events = Events::default();
        let (mut activator, service) = activator(&events, vec![handler("a", "noop")], true);

        let error = activator.initialize().expect_err("initialization should fail");
        assert!(matches!(error, DistributionServiceError::ControlPlaneStart { .. }));
        assert!(!activator.is_alive());
        assert_eq!(activator.state(), ActivatorState::Stopped);
        assert!(service.names().is_empty());
    }

    #[test]
    fn reception_handler_failure_rolls_back() {
        let events = Events::default();
        let (mut activator, service) =
            activator(&events, vec![handler("a", "noop"), handler("b", "missing")], false);

        let error = activator.initialize().expect_err("initialization should fail");
        match error {
            DistributionServiceError::ReceptionHandlerInitialization { name, source } => {
                assert_eq!(name, "b");
                assert!(matches!(source, PluginInitializationError::PluginHandlerBuild { .. }));
            }
            other => panic!("unexpected error: {}", other),
        }

        assert_eq!(activator.state(), ActivatorState::Stopped);
        assert!(service.names().is_empty());
        assert!(matches!(
            service.get::<DistributionParameterGroup>("ferry"),
            Err(RegistryError::NotFound { .. })
        ));
        assert_eq!(
            events.take(),
            vec![
                "server built for ferry (alive: false)",
                "server started",
                "a initialized",
                "a destroyed",
                "server stopped"
            ]
        );
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let events = Events::default();
        let (mut activator, _service) = activator(&events, vec![handler("a", "noop")], false);

        assert!(matches!(
            activator.terminate(),
            Err(DistributionServiceError::InvalidState {
                operation: "terminate",
                state: ActivatorState::Stopped
            })
        ));

        activator.initialize().expect("activator should initialize");
        assert!(matches!(
            activator.initialize(),
            Err(DistributionServiceError::InvalidState {
                operation: "initialize",
                state: ActivatorState::Running
            })
        ));
        assert!(activator.is_alive());

        activator.terminate().expect("activator should terminate");
        activator.initialize().expect("activator should initialize again");
        assert!(activator.is_alive());
    }

    #[test]
    fn lifecycle_handle_tracks_state() {
        let events = Events::default();
        let (mut activator, _service) = activator(&events, vec![handler("a", "noop")], false);
        let lifecycle = activator.lifecycle().clone();

        assert!(!lifecycle.is_alive());
        activator.initialize().expect("activator should initialize");
        assert!(lifecycle.is_alive());
        drop(activator);
        assert!(!lifecycle.is_alive());
        assert_eq!(lifecycle.state(), ActivatorState::Stopped);
    }
}
