//! Reception handlers.
//!
//! A reception handler pairs a reception plugin, which subscribes to some external notification source, with the plugin
//! handler owning the forwarders every received notification is delivered to.
use std::{fmt, sync::Arc};

use ferry_config::{ParameterGroup as _, ParameterService, RegistryError};
use ferry_error::{render_error_chain, GenericError};
use snafu::{ResultExt as _, Snafu};
use tracing::{error, info};

use crate::{
    forwarding::{ForwarderRegistry, ForwardingError},
    parameters::{ReceptionHandlerConfigurationParameterGroup, ReceptionHandlerParameters},
    plugin::{PluginError, PluginRegistry},
    statistics::DistributionStatistics,
};

mod dispatch;
pub use self::dispatch::{DispatchReport, Dispatcher};

mod plugin_handler;
pub use self::plugin_handler::PluginHandler;

mod telemetry;

/// A plugin initialization error.
///
/// Each variant is fatal to the startup of a single reception handler.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum PluginInitializationError {
    /// The reception handler was already initialized.
    #[snafu(display("Reception handler '{}' is already initialized.", name))]
    AlreadyInitialized {
        /// Name of the reception handler.
        name: String,
    },

    /// A parameter group could not be resolved.
    #[snafu(display("Failed to resolve parameter group '{}'.", name))]
    UnresolvedParameters {
        /// Name of the parameter group.
        name: String,

        /// Error source.
        source: RegistryError,
    },

    /// The reception handler declares no plugin handler.
    #[snafu(display("Reception handler '{}' has no plugin handler parameters.", name))]
    MissingPluginHandler {
        /// Name of the reception handler.
        name: String,
    },

    /// The reception handler's plugin handler could not be built.
    #[snafu(display("Failed to build plugin handler for reception handler '{}'.", name))]
    PluginHandlerBuild {
        /// Name of the reception handler.
        name: String,

        /// Error source.
        #[snafu(source(from(PluginInitializationError, Box::new)))]
        source: Box<PluginInitializationError>,
    },

    /// A plugin could not be instantiated.
    #[snafu(display("Failed to instantiate plugin '{}'.", plugin))]
    PluginInstantiation {
        /// Name of the plugin being instantiated.
        plugin: String,

        /// Error source.
        source: PluginError,
    },

    /// A forwarder's configuration group could not be resolved.
    #[snafu(display(
        "Configuration group '{}' for forwarder '{}' could not be resolved.",
        configuration,
        forwarder
    ))]
    MissingForwarderConfiguration {
        /// Name of the forwarder.
        forwarder: String,

        /// Name of the configuration group.
        configuration: String,

        /// Error source.
        source: RegistryError,
    },

    /// A forwarder failed to configure itself.
    #[snafu(display("Failed to configure forwarder '{}'.", forwarder))]
    ForwarderConfiguration {
        /// Name of the forwarder.
        forwarder: String,

        /// Error source.
        source: ForwardingError,
    },

    /// The reception plugin failed its source-specific setup.
    #[snafu(display("Failed to set up reception for reception handler '{}'.", name))]
    ReceptionSetup {
        /// Name of the reception handler.
        name: String,

        /// Error source.
        source: GenericError,
    },
}

/// Receives notifications from an external source and hands them to a [`Dispatcher`].
///
/// Reception plugins typically decode notifications on their own thread and call [`Dispatcher::receive`] or
/// [`Dispatcher::input_received`] for each one.
pub trait ArtifactReception: Send {
    /// Performs source-specific setup, such as subscribing to the notification source.
    ///
    /// # Errors
    ///
    /// If the plugin's configuration is invalid or the source cannot be subscribed to, an error is returned.
    fn initialize_reception(&mut self, context: ReceptionContext) -> Result<(), GenericError>;

    /// Tears down whatever [`initialize_reception`][Self::initialize_reception] set up.
    fn destroy(&mut self) {}
}

/// Registry of reception plugins.
pub type ReceptionRegistry = PluginRegistry<dyn ArtifactReception>;

/// Context handed to a reception plugin during setup.
pub struct ReceptionContext {
    handler_name: String,
    configuration: Arc<ReceptionHandlerConfigurationParameterGroup>,
    parameters: ParameterService,
    dispatcher: Dispatcher,
}

impl ReceptionContext {
    /// Name of the reception handler being set up.
    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    /// The reception plugin's configuration group.
    pub fn configuration(&self) -> &ReceptionHandlerConfigurationParameterGroup {
        &self.configuration
    }

    /// The parameter service, for plugins that resolve further groups.
    pub fn parameters(&self) -> &ParameterService {
        &self.parameters
    }

    /// The dispatcher received notifications are handed to.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

/// Everything needed to build plugins for a reception handler.
#[derive(Clone, Copy)]
pub struct PluginContext<'a> {
    parameters: &'a ParameterService,
    forwarders: &'a ForwarderRegistry,
    statistics: &'a DistributionStatistics,
}

impl<'a> PluginContext<'a> {
    /// Creates a new `PluginContext`.
    pub fn new(
        parameters: &'a ParameterService, forwarders: &'a ForwarderRegistry, statistics: &'a DistributionStatistics,
    ) -> Self {
        Self {
            parameters,
            forwarders,
            statistics,
        }
    }

    /// The parameter service groups are resolved from.
    pub fn parameters(&self) -> &'a ParameterService {
        self.parameters
    }

    /// The registry forwarders are instantiated from.
    pub fn forwarders(&self) -> &'a ForwarderRegistry {
        self.forwarders
    }

    /// The statistics dispatch outcomes are recorded in.
    pub fn statistics(&self) -> &'a DistributionStatistics {
        self.statistics
    }
}

/// Lifecycle state of a reception handler.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReceptionState {
    /// Not yet initialized, or destroyed.
    Uninitialized,

    /// Initialization is in progress.
    Initializing,

    /// Initialized and receiving notifications.
    Receiving,
}

impl fmt::Display for ReceptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "UNINITIALIZED"),
            Self::Initializing => write!(f, "INITIALIZING"),
            Self::Receiving => write!(f, "RECEIVING"),
        }
    }
}

/// A reception handler: one reception plugin plus the plugin handler it dispatches to.
pub struct ReceptionHandler {
    name: Option<String>,
    reception: Box<dyn ArtifactReception>,
    state: ReceptionState,
    dispatcher: Option<Dispatcher>,
}

impl ReceptionHandler {
    /// Creates a new, uninitialized reception handler around the given reception plugin.
    pub fn new(reception: Box<dyn ArtifactReception>) -> Self {
        Self {
            name: None,
            reception,
            state: ReceptionState::Uninitialized,
            dispatcher: None,
        }
    }

    /// Creates a new, uninitialized reception handler, instantiating its reception plugin by type tag.
    ///
    /// # Errors
    ///
    /// If the reception plugin cannot be instantiated, an error is returned.
    pub fn create(plugin_type: &str, registry: &ReceptionRegistry) -> Result<Self, PluginInitializationError> {
        let reception = registry
            .instantiate(plugin_type)
            .context(PluginInstantiation { plugin: plugin_type })?;
        Ok(Self::new(reception))
    }

    /// Initializes the reception handler from the `ReceptionHandlerParameters` group registered under
    /// `parameter_group_name`.
    ///
    /// This builds the plugin handler and all of its forwarders, then runs the reception plugin's setup. On failure, the
    /// handler is left uninitialized and retains nothing that was built.
    ///
    /// # Errors
    ///
    /// If the handler is already initialized, or any step fails, an error describing the failed step is returned.
    pub fn initialize(
        &mut self, parameter_group_name: &str, context: &PluginContext<'_>,
    ) -> Result<(), PluginInitializationError> {
        if self.state != ReceptionState::Uninitialized {
            return Err(PluginInitializationError::AlreadyInitialized {
                name: parameter_group_name.to_string(),
            });
        }

        self.state = ReceptionState::Initializing;
        match self.try_initialize(parameter_group_name, context) {
            Ok(dispatcher) => {
                info!(
                    reception_handler = parameter_group_name,
                    forwarders = dispatcher.plugin_handler().len(),
                    "Reception handler initialized."
                );
                self.name = Some(parameter_group_name.to_string());
                self.dispatcher = Some(dispatcher);
                self.state = ReceptionState::Receiving;
                Ok(())
            }
            Err(e) => {
                error!(
                    reception_handler = parameter_group_name,
                    error = %render_error_chain(&e),
                    "Failed to initialize reception handler."
                );
                self.state = ReceptionState::Uninitialized;
                Err(e)
            }
        }
    }

    fn try_initialize(&mut self, name: &str, context: &PluginContext<'_>) -> Result<Dispatcher, PluginInitializationError> {
        let parameters = context
            .parameters()
            .get::<ReceptionHandlerParameters>(name)
            .context(UnresolvedParameters { name })?;

        let plugin_handler_parameters = parameters
            .plugin_handler_parameters()
            .ok_or_else(|| PluginInitializationError::MissingPluginHandler { name: name.to_string() })?;
        let plugin_handler =
            PluginHandler::from_parameters(plugin_handler_parameters.name(), context).context(PluginHandlerBuild { name })?;

        let configuration_name = parameters.reception_handler_configuration_name();
        let configuration = context
            .parameters()
            .get::<ReceptionHandlerConfigurationParameterGroup>(configuration_name)
            .context(UnresolvedParameters {
                name: configuration_name,
            })?;

        let dispatcher = Dispatcher::new(name, Arc::new(plugin_handler), context.statistics().clone());
        let reception_context = ReceptionContext {
            handler_name: name.to_string(),
            configuration,
            parameters: context.parameters().clone(),
            dispatcher: dispatcher.clone(),
        };

        if let Err(e) = self.reception.initialize_reception(reception_context) {
            self.reception.destroy();
            return Err(e).context(ReceptionSetup { name });
        }

        Ok(dispatcher)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ReceptionState {
        self.state
    }

    /// Name of the parameter group this handler was initialized from, if initialized.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The dispatcher of an initialized handler.
    pub fn dispatcher(&self) -> Option<&Dispatcher> {
        self.dispatcher.as_ref()
    }

    /// Tears down the reception plugin and drops the plugin handler.
    ///
    /// Destroying a handler that is not receiving does nothing.
    pub fn destroy(&mut self) {
        if self.state != ReceptionState::Receiving {
            return;
        }

        self.reception.destroy();
        self.dispatcher = None;
        self.state = ReceptionState::Uninitialized;
        if let Some(name) = self.name.take() {
            info!(reception_handler = %name, "Reception handler destroyed.");
        }
    }
}
