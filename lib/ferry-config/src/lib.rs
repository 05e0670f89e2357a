//! Configuration loading, parameter validation, and the parameter registry.
//!
//! Configuration flows through three stages:
//!
//! - [`ConfigurationLoader`] merges configuration sources (files, environment) into a [`GenericConfiguration`].
//! - Typed parameter groups are extracted from it and implement [`ParameterGroup`], validating themselves into a
//!   [`ValidationResult`] tree.
//! - Validated groups are published in a [`ParameterService`] so components can look up their own parameters by name.
#![deny(missing_docs)]

use std::{borrow::Cow, collections::HashSet, path::Path, sync::Arc};

use ferry_error::GenericError;
use figment::{
    error::Kind,
    providers::{Env, Serialized},
    Figment, Provider as _,
};
use serde::Deserialize;
use snafu::{ResultExt as _, Snafu};

mod provider;
use self::provider::ResolvedProvider;

pub mod registry;
pub use self::registry::{ParameterService, RegistryError};

pub mod validation;
pub use self::validation::{ParameterGroup, ValidationResult, ValidationStatus};

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// Environment variable prefix was empty.
    #[snafu(display("Environment variable prefix must not be empty."))]
    EmptyPrefix,

    /// Requested field was missing from the configuration.
    #[snafu(display("Missing field '{}' in configuration. {}", field, help_text))]
    MissingField {
        /// Help text describing how to set the missing field.
        help_text: String,

        /// Name of the missing field.
        field: Cow<'static, str>,
    },

    /// Requested field's data type was not the expected data type.
    #[snafu(display(
        "Expected value for field '{}' to be '{}', got '{}' instead.",
        field,
        expected_ty,
        actual_ty
    ))]
    InvalidFieldType {
        /// Period-separated path to the invalid field.
        field: String,

        /// Expected data type.
        expected_ty: String,

        /// Actual data type.
        actual_ty: String,
    },

    /// Failed to read a configuration file.
    #[snafu(display("Failed to load configuration file '{}'.", path))]
    File {
        /// Path of the file.
        path: String,

        /// Error source.
        source: figment::Error,
    },

    /// Generic configuration error.
    #[snafu(display("Failed to query configuration."))]
    Generic {
        /// Error source.
        source: GenericError,
    },
}

impl From<figment::Error> for ConfigurationError {
    fn from(e: figment::Error) -> Self {
        match e.kind {
            Kind::InvalidType(actual_ty, expected_ty) => Self::InvalidFieldType {
                field: e.path.join("."),
                expected_ty,
                actual_ty: actual_ty.to_string(),
            },
            _ => Self::Generic { source: e.into() },
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
enum LookupSource {
    /// The configuration key is looked up in a form suitable for environment variables.
    Environment { prefix: String },
}

impl LookupSource {
    fn transform_key(&self, key: &str) -> String {
        match self {
            // Nested keys use a double underscore in environment variables, matching how the provider is split.
            LookupSource::Environment { prefix } => format!("{}{}", prefix, key.replace('.', "__").to_uppercase()),
        }
    }
}

struct BoxedProvider(Box<dyn figment::Provider + Send + Sync>);

impl figment::Provider for BoxedProvider {
    fn metadata(&self) -> figment::Metadata {
        self.0.metadata()
    }

    fn data(&self) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        self.0.data()
    }
}

/// A configuration loader that can pull from various sources.
///
/// Sources added later take precedence over sources added earlier. Once all sources are added, the loader is turned
/// into a [`GenericConfiguration`], from which typed values are extracted.
///
/// # Supported sources
///
/// - YAML file
/// - JSON file
/// - environment variables (must be prefixed; see [`from_environment`][Self::from_environment])
#[derive(Default)]
pub struct ConfigurationLoader {
    lookup_sources: HashSet<LookupSource>,
    providers: Vec<BoxedProvider>,
}

impl ConfigurationLoader {
    /// Loads the given YAML configuration file.
    ///
    /// # Errors
    ///
    /// If the file could not be read, or if the file is not valid YAML, an error will be returned.
    pub fn from_yaml<P>(mut self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let resolved_provider = ResolvedProvider::from_yaml(&path).context(File {
            path: path.as_ref().to_string_lossy().into_owned(),
        })?;
        self.providers.push(BoxedProvider(Box::new(resolved_provider)));
        Ok(self)
    }

    /// Loads the given JSON configuration file.
    ///
    /// # Errors
    ///
    /// If the file could not be read, or if the file is not valid JSON, an error will be returned.
    pub fn from_json<P>(mut self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let resolved_provider = ResolvedProvider::from_json(&path).context(File {
            path: path.as_ref().to_string_lossy().into_owned(),
        })?;
        self.providers.push(BoxedProvider(Box::new(resolved_provider)));
        Ok(self)
    }

    /// Loads configuration from a file, choosing the format from its extension.
    ///
    /// Files ending in `.json` are read as JSON; everything else is read as YAML.
    ///
    /// # Errors
    ///
    /// If the file could not be read or parsed, an error will be returned.
    pub fn from_file<P>(self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let is_json = path
            .as_ref()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            self.from_json(path)
        } else {
            self.from_yaml(path)
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// The prefix given will have an underscore appended to it if it does not already end with one. For example, with a
    /// prefix of `ferry`, any environment variable starting with `ferry_` would be matched. Nested keys are separated by
    /// a double underscore, so `FERRY_REST_SERVER_PARAMETERS__PORT` sets `rest_server_parameters.port`.
    ///
    /// The prefix is case-insensitive.
    ///
    /// # Errors
    ///
    /// If the prefix is empty, or the environment could not be read, an error will be returned.
    pub fn from_environment(mut self, prefix: &'static str) -> Result<Self, ConfigurationError> {
        if prefix.is_empty() {
            return Err(ConfigurationError::EmptyPrefix);
        }

        let prefix = if prefix.ends_with('_') {
            prefix.to_string()
        } else {
            format!("{}_", prefix)
        };

        // `Env` isn't `Send + Sync`, so snapshot its values into a serialized provider.
        let env = Env::prefixed(&prefix).split("__");
        let values = env.data()?;
        if let Some(default_dict) = values.get(&figment::Profile::Default) {
            self.providers
                .push(BoxedProvider(Box::new(Serialized::defaults(default_dict.clone()))));
            self.lookup_sources.insert(LookupSource::Environment { prefix });
        }
        Ok(self)
    }

    /// Consumes the configuration loader and wraps it in a generic wrapper.
    pub fn into_generic(self) -> GenericConfiguration {
        let figment = self
            .providers
            .into_iter()
            .fold(Figment::new(), |figment, provider| figment.admerge(provider));

        GenericConfiguration {
            inner: Arc::new(Inner {
                figment,
                lookup_sources: self.lookup_sources,
            }),
        }
    }
}

#[derive(Debug)]
struct Inner {
    figment: Figment,
    lookup_sources: HashSet<LookupSource>,
}

/// A generic configuration object.
///
/// This represents the merged configuration derived from [`ConfigurationLoader`] in its raw form. Values can be
/// queried by key, and can be extracted either as typed values or in their raw form.
///
/// Keys must be in the form of `a.b.c`, where periods (`.`) are used to indicate a nested value.
#[derive(Clone, Debug)]
pub struct GenericConfiguration {
    inner: Arc<Inner>,
}

impl GenericConfiguration {
    /// Gets a configuration value by key.
    ///
    /// # Errors
    ///
    /// If the key does not exist in the configuration, or if the value could not be deserialized into `T`, an error
    /// variant will be returned.
    pub fn get_typed<'a, T>(&self, key: &str) -> Result<T, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        self.inner
            .figment
            .extract_inner(key)
            .map_err(|e| from_figment_error(&self.inner.lookup_sources, e))
    }

    /// Gets a configuration value by key, if it exists.
    ///
    /// # Errors
    ///
    /// If the value exists but could not be deserialized into `T`, an error will be returned.
    pub fn try_get_typed<'a, T>(&self, key: &str) -> Result<Option<T>, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        match self.get_typed(key) {
            Ok(value) => Ok(Some(value)),
            Err(ConfigurationError::MissingField { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Attempts to deserialize the entire configuration as `T`.
    ///
    /// # Errors
    ///
    /// If the value could not be deserialized into `T`, an error will be returned.
    pub fn as_typed<'a, T>(&self) -> Result<T, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        self.inner
            .figment
            .extract()
            .map_err(|e| from_figment_error(&self.inner.lookup_sources, e))
    }
}

fn from_figment_error(lookup_sources: &HashSet<LookupSource>, e: figment::Error) -> ConfigurationError {
    match e.kind {
        Kind::MissingField(field) => {
            let mut valid_keys = lookup_sources
                .iter()
                .map(|source| source.transform_key(&field))
                .collect::<Vec<_>>();

            // Always specify the original key as a valid key to try.
            valid_keys.insert(0, field.to_string());

            let help_text = format!("Try setting `{}`.", valid_keys.join("` or `"));

            ConfigurationError::MissingField { help_text, field }
        }
        Kind::InvalidType(actual_ty, expected_ty) => ConfigurationError::InvalidFieldType {
            field: e.path.join("."),
            expected_ty,
            actual_ty: actual_ty.to_string(),
        },
        _ => ConfigurationError::Generic { source: e.into() },
    }
}
