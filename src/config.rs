//! Configuration loading.
//!
//! `defaults/sieve-grammar.default.toml` is embedded into the binary. User
//! files and command line overrides are layered on top of it with [`Loader`]
//! before deserializing into [`EngineConfig`].

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, ValueKind};
use serde::Deserialize;
use std::path::Path;

use crate::registry::{Capabilities, Registry};
use crate::serializer::FormatOptions;

const DEFAULT_TOML: &str = include_str!("../defaults/sieve-grammar.default.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub capabilities: CapabilityConfig,
    pub format: FormatOptions,
}

/// Which extensions scripts may use.
#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityConfig {
    pub all: bool,
    pub enabled: Vec<String>,
}

impl EngineConfig {
    /// Resolve the configured capability names against `registry`.
    /// Names the registry does not know are kept; they simply unlock nothing.
    pub fn capabilities(&self, registry: &Registry) -> Capabilities {
        if self.capabilities.all {
            return registry.all_capabilities();
        }
        self.capabilities.enabled.iter().collect()
    }
}

/// Layers user overrides over the built-in defaults.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    pub fn new() -> Self {
        let builder = Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Self { builder }
    }

    /// Layer a configuration file. Missing files trigger an error.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(true);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer a configuration file if it exists.
    pub fn with_optional_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(false);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer TOML text, e.g. a configuration embedded by a host application.
    pub fn with_toml(mut self, text: &str) -> Self {
        self.builder = self.builder.add_source(File::from_str(text, FileFormat::Toml));
        self
    }

    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        self.builder.build()?.try_deserialize()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

pub fn load_defaults() -> Result<EngineConfig, ConfigError> {
    Loader::new().build()
}
