//! Type-tag keyed plugin constructors.
use std::{collections::HashMap, sync::Arc};

use ferry_error::GenericError;
use snafu::Snafu;

/// A plugin error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum PluginError {
    /// No plugin is registered for the requested type tag.
    #[snafu(display("Unknown {} plugin type '{}' (registered types: {}).", kind, plugin_type, known))]
    UnknownPluginType {
        /// Kind of plugin requested.
        kind: &'static str,

        /// Requested type tag.
        plugin_type: String,

        /// Comma-separated list of registered type tags.
        known: String,
    },

    /// The plugin constructor failed.
    #[snafu(display("Failed to instantiate {} plugin of type '{}'.", kind, plugin_type))]
    Instantiation {
        /// Kind of plugin requested.
        kind: &'static str,

        /// Requested type tag.
        plugin_type: String,

        /// Error source.
        source: GenericError,
    },
}

type Constructor<P> = Arc<dyn Fn() -> Result<Box<P>, GenericError> + Send + Sync>;

/// A registry of plugin constructors, keyed by type tag.
///
/// Plugins are instantiated by the type tag named in configuration, so new plugins only need to be registered to
/// become usable.
pub struct PluginRegistry<P: ?Sized> {
    kind: &'static str,
    constructors: HashMap<String, Constructor<P>>,
}

impl<P: ?Sized + 'static> PluginRegistry<P> {
    /// Creates an empty registry for the given kind of plugin.
    ///
    /// `kind` is only used to describe the plugin in errors and logs.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            constructors: HashMap::new(),
        }
    }

    /// Registers a constructor for the given type tag, replacing any existing constructor for it.
    pub fn register<T, F>(&mut self, plugin_type: T, constructor: F) -> &mut Self
    where
        T: Into<String>,
        F: Fn() -> Result<Box<P>, GenericError> + Send + Sync + 'static,
    {
        self.constructors.insert(plugin_type.into(), Arc::new(constructor));
        self
    }

    /// Instantiates a new plugin of the given type.
    ///
    /// # Errors
    ///
    /// If no constructor is registered for `plugin_type`, or the constructor fails, an error is returned.
    pub fn instantiate(&self, plugin_type: &str) -> Result<Box<P>, PluginError> {
        let constructor = self
            .constructors
            .get(plugin_type)
            .ok_or_else(|| PluginError::UnknownPluginType {
                kind: self.kind,
                plugin_type: plugin_type.to_string(),
                known: self.plugin_types().join(", "),
            })?;

        constructor().map_err(|source| PluginError::Instantiation {
            kind: self.kind,
            plugin_type: plugin_type.to_string(),
            source,
        })
    }

    /// Returns `true` if a constructor is registered for the given type tag.
    pub fn contains(&self, plugin_type: &str) -> bool {
        self.constructors.contains_key(plugin_type)
    }

    /// Registered type tags, sorted.
    pub fn plugin_types(&self) -> Vec<&str> {
        let mut plugin_types = self.constructors.keys().map(String::as_str).collect::<Vec<_>>();
        plugin_types.sort_unstable();
        plugin_types
    }
}

impl<P: ?Sized> Clone for PluginRegistry<P> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            constructors: self.constructors.clone(),
        }
    }
}
