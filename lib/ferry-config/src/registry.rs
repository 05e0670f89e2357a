//! Name-keyed registry of validated parameter groups.
use std::{
    any::{type_name, Any},
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use snafu::Snafu;
use tracing::debug;

use crate::ParameterGroup;

/// A registry error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum RegistryError {
    /// No parameter group is registered under the requested name.
    #[snafu(display("No parameter group registered under name '{}'.", name))]
    NotFound {
        /// Requested name.
        name: String,
    },

    /// A parameter group is registered under the requested name, but with a different type.
    #[snafu(display(
        "Parameter group '{}' is of type '{}', but '{}' was requested.",
        name,
        actual,
        expected
    ))]
    TypeMismatch {
        /// Requested name.
        name: String,

        /// Requested type.
        expected: &'static str,

        /// Type of the registered group.
        actual: &'static str,
    },
}

struct Entry {
    type_name: &'static str,
    group: Arc<dyn Any + Send + Sync>,
}

/// A registry of parameter groups, keyed by group name.
///
/// Cloning the service is cheap and every clone shares the same registry, so one instance can be handed to every
/// component that needs to resolve its parameters. Registering a group under a name that is already taken replaces the
/// previous group.
#[derive(Clone, Default)]
pub struct ParameterService {
    inner: Arc<RwLock<HashMap<String, Entry>>>,
}

impl ParameterService {
    /// Creates an empty parameter service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the given group under its name, returning a shared handle to it.
    pub fn register<G: ParameterGroup>(&self, group: G) -> Arc<G> {
        let group = Arc::new(group);
        self.register_shared(Arc::clone(&group));
        group
    }

    /// Registers an already-shared group under its name.
    pub fn register_shared<G: ParameterGroup>(&self, group: Arc<G>) {
        let name = group.name().to_string();
        let entry = Entry {
            type_name: type_name::<G>(),
            group,
        };

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.insert(name.clone(), entry).is_some() {
            debug!(group_name = %name, "Replaced previously registered parameter group.");
        } else {
            debug!(group_name = %name, "Registered parameter group.");
        }
    }

    /// Gets the group registered under the given name.
    ///
    /// # Errors
    ///
    /// If no group is registered under `name`, or the registered group is not a `G`, an error is returned.
    pub fn get<G: ParameterGroup>(&self, name: &str) -> Result<Arc<G>, RegistryError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let entry = inner.get(name).ok_or_else(|| RegistryError::NotFound { name: name.to_string() })?;

        Arc::clone(&entry.group)
            .downcast::<G>()
            .map_err(|_| RegistryError::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<G>(),
                actual: entry.type_name,
            })
    }

    /// Removes the group registered under the given name, if any.
    pub fn deregister(&self, name: &str) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.remove(name).is_some() {
            debug!(group_name = %name, "Deregistered parameter group.");
        }
    }

    /// Returns `true` if a group is registered under the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Names of all registered groups, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }
}
