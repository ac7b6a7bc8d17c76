//! Shared configuration loader for the nl2code toolchain.
//!
//! `defaults/nl2code.default.toml` is embedded into every binary so that docs and
//! runtime behavior stay in sync. Applications layer user-specific files and
//! command-line overrides on top of those defaults via [`Loader`] before
//! deserializing into [`Nl2CodeConfig`].

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, ValueKind};
use nl2code::codegen::batch::RunConfig;
use nl2code::codegen::tree::TraversalOrder;
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

const DEFAULT_TOML: &str = include_str!("../defaults/nl2code.default.toml");

/// Top-level configuration consumed by nl2code applications.
#[derive(Debug, Clone, Deserialize)]
pub struct Nl2CodeConfig {
    pub decode: DecodeConfig,
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
    pub data: DataConfig,
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecodeConfig {
    pub beam_size: usize,
    pub max_time_step: usize,
    pub traversal: TraversalOrder,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    pub concurrency: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Log file; logging is disabled when unset.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    #[serde(default)]
    pub dataset: Option<PathBuf>,
    pub split: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub smoothing: f64,
    pub copy_weight: f64,
}

impl Nl2CodeConfig {
    /// Explicit batch-decoding settings; rejects a zero beam size or concurrency.
    pub fn run_config(&self) -> Result<RunConfig, ConfigError> {
        let beam_size = NonZeroUsize::new(self.decode.beam_size)
            .ok_or_else(|| invalid("decode.beam_size must be at least 1"))?;
        let concurrency = NonZeroUsize::new(self.batch.concurrency)
            .ok_or_else(|| invalid("batch.concurrency must be at least 1"))?;
        Ok(RunConfig {
            beam_size,
            max_time_step: self.decode.max_time_step,
            concurrency,
            order: self.decode.traversal,
        })
    }
}

/// Helper for layering user overrides over the built-in defaults.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    /// Start a loader seeded with the embedded defaults.
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

    /// Layer an optional configuration file (ignored if the file is absent).
    pub fn with_optional_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(false);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Apply a single key/value override (useful for CLI settings).
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Finalize the builder and deserialize the resulting configuration.
    pub fn build(self) -> Result<Nl2CodeConfig, ConfigError> {
        self.builder.build()?.try_deserialize()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for callers that only need the defaults.
pub fn load_defaults() -> Result<Nl2CodeConfig, ConfigError> {
    Loader::new().build()
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Message(message.to_string())
}
