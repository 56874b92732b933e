//! Configuration file loading for Javabox
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, File, FileFormat};

use crate::config::{Config, ConfigError};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// The file is read as TOML whatever its extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        // The builder folds a missing file into its parse error
        std::fs::metadata(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;

        let config = ConfigBuilder::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .build()?;
        Self::from_source(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;
        Self::from_source(config)
    }

    fn from_source(source: ConfigBuilder) -> Result<Self, ConfigError> {
        let config: Config = source.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.toolchain.javac.trim().is_empty() {
            return Err(ConfigError::Invalid("toolchain.javac is empty".into()));
        }
        if self.toolchain.java.trim().is_empty() {
            return Err(ConfigError::Invalid("toolchain.java is empty".into()));
        }
        if self.temp_prefix.is_empty() || self.temp_prefix.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "temp_prefix '{}' must be non-empty and contain no '/'",
                self.temp_prefix
            )));
        }
        if self.max_concurrent_runs == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_runs must be at least 1".into(),
            ));
        }

        let timeouts = [
            ("batch_timeout", self.limits.batch_timeout),
            ("compile_timeout", self.limits.compile_timeout),
            ("drain_grace", self.limits.drain_grace),
        ];
        for (name, value) in timeouts {
            if let Some(secs) = value
                && !(secs.is_finite() && secs > 0.0)
            {
                return Err(ConfigError::Invalid(format!(
                    "limits.{name} must be a positive number of seconds, got {secs}"
                )));
            }
        }
        if self.limits.output_chunk_size == Some(0) {
            return Err(ConfigError::Invalid(
                "limits.output_chunk_size must be at least 1".into(),
            ));
        }

        Ok(())
    }
}
