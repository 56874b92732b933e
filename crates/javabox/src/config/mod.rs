use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

pub use crate::config::toolchain::ToolchainConfig;
use crate::types::RunLimits;

mod loader;
pub mod toolchain;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../javabox.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for Javabox
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Parent directory for per-run working directories
    /// (system temp dir if not specified).
    #[serde(default)]
    pub work_root: Option<PathBuf>,

    /// Prefix for per-run working directory names
    #[serde(default = "default_temp_prefix")]
    pub temp_prefix: String,

    /// Maximum number of runs alive at the same time
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,

    /// Compiler and runtime settings
    #[serde(default)]
    pub toolchain: ToolchainConfig,

    /// Default limits applied to all runs.
    /// These can be overridden per request.
    #[serde(default)]
    pub limits: RunLimits,
}

impl Config {
    /// Create a new config from the embedded example
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config with built-in values only, without the embedded example
    pub fn minimal() -> Self {
        Self {
            work_root: None,
            temp_prefix: default_temp_prefix(),
            max_concurrent_runs: default_max_concurrent_runs(),
            toolchain: ToolchainConfig::default(),
            limits: RunLimits::default(),
        }
    }

    /// Get the directory under which working directories are created
    pub fn work_root(&self) -> PathBuf {
        self.work_root.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Merge limits with defaults
    pub fn effective_limits(&self, overrides: Option<&RunLimits>) -> RunLimits {
        match overrides {
            Some(limits) => self.limits.with_overrides(limits),
            None => self.limits.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).unwrap_or_else(|e| {
            warn!(error = %e, "embedded example config is invalid, using built-in defaults");
            Self::minimal()
        })
    }
}

fn default_temp_prefix() -> String {
    "javabox-".to_owned()
}

fn default_max_concurrent_runs() -> usize {
    16
}
