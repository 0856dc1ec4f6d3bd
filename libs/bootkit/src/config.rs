//! Bootstrap options and typed extension configuration.
//!
//! [`BootstrapOptions`] layers, lowest to highest priority:
//! 1. built-in defaults,
//! 2. an optional YAML file,
//! 3. `BOOTKIT__*` environment variables (`BOOTKIT__EXTENSION_TIMEOUT=250ms`).
//!
//! [`ExtensionConfig`] is the raw config object handed to one extension. It offers two readers:
//! - [`ExtensionConfig::or_default`]: absent config falls back to `T::default()`
//! - [`ExtensionConfig::required`]: absent config is an error

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Extension load budget used when none is configured.
pub const DEFAULT_EXTENSION_TIMEOUT: Duration = Duration::from_millis(5000);

/// Environment variable prefix for option overrides.
pub const ENV_PREFIX: &str = "BOOTKIT__";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing config for extension '{extension}'")]
    MissingExtensionConfig { extension: String },
    #[error("invalid config for extension '{extension}': {source}")]
    InvalidExtensionConfig {
        extension: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to load bootstrap options: {0}")]
    Load(#[from] Box<figment::Error>),
}

/// Knobs of one bootstrap call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapOptions {
    /// Budget for each extension's load hook.
    #[serde(with = "humantime_duration")]
    pub extension_timeout: Duration,
    /// Shut down and exit the process on Ctrl+C / SIGTERM once bootstrap succeeded.
    pub shutdown_on_signal: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            extension_timeout: DEFAULT_EXTENSION_TIMEOUT,
            shutdown_on_signal: false,
        }
    }
}

impl BootstrapOptions {
    pub fn with_extension_timeout(mut self, timeout: Duration) -> Self {
        self.extension_timeout = timeout;
        self
    }

    pub fn with_shutdown_on_signal(mut self, enabled: bool) -> Self {
        self.shutdown_on_signal = enabled;
        self
    }

    /// Load options from defaults, an optional YAML file and `BOOTKIT__*` variables.
    ///
    /// A missing file is not an error; its layer is simply empty.
    ///
    /// # Errors
    /// Returns [`ConfigError::Load`] when the file or an override cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            tracing::debug!(path = %path.display(), "Loading bootstrap options file");
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment.extract().map_err(|e| ConfigError::Load(Box::new(e)))
    }
}

/// Config object of one extension, as declared next to it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtensionConfig {
    extension: String,
    value: serde_json::Value,
}

impl ExtensionConfig {
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            extension: String::new(),
            value,
        }
    }

    /// Serialize `config` into an extension config.
    ///
    /// # Errors
    /// Fails when `config` cannot be represented as JSON.
    pub fn from_serialize<T: Serialize>(config: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(config).map(Self::new)
    }

    pub(crate) fn bind(mut self, extension: &str) -> Self {
        extension.clone_into(&mut self.extension);
        self
    }

    /// Name of the extension this config belongs to (empty until loaded).
    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_null()
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    /// Typed config, or `T::default()` when none was declared.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidExtensionConfig`] if a declared config cannot be deserialized.
    pub fn or_default<T: DeserializeOwned + Default>(&self) -> Result<T, ConfigError> {
        if self.value.is_null() {
            return Ok(T::default());
        }
        self.parse()
    }

    /// Typed config that must have been declared.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingExtensionConfig`] when absent, or
    /// [`ConfigError::InvalidExtensionConfig`] when it cannot be deserialized.
    pub fn required<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        if self.value.is_null() {
            return Err(ConfigError::MissingExtensionConfig {
                extension: self.extension.clone(),
            });
        }
        self.parse()
    }

    fn parse<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        serde_json::from_value(self.value.clone())
            .map_err(|source| ConfigError::InvalidExtensionConfig {
                extension: self.extension.clone(),
                source,
            })
    }
}

impl From<serde_json::Value> for ExtensionConfig {
    fn from(value: serde_json::Value) -> Self {
        Self::new(value)
    }
}

/// Serde adapter for `Duration` fields written as humantime strings (`"5s"`, `"250ms"`).
///
/// Plain integers are accepted as milliseconds.
pub mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    /// # Errors
    /// Fails on strings humantime cannot parse.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(d)? {
            Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
            Raw::Text(text) => humantime::parse_duration(&text).map_err(de::Error::custom),
        }
    }

    /// # Errors
    /// Never fails for well-formed serializers.
    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&humantime::format_duration(*duration))
    }
}
