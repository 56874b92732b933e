use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Wall clock limits and buffer sizes for a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLimits {
    /// Wall clock limit for a batch run in seconds
    #[serde(default)]
    pub batch_timeout: Option<f64>,

    /// Wall clock limit for compilation in seconds
    #[serde(default)]
    pub compile_timeout: Option<f64>,

    /// Grace period for the output reader after exit, in seconds
    #[serde(default)]
    pub drain_grace: Option<f64>,

    /// Maximum size of a single forwarded output chunk in bytes
    #[serde(default)]
    pub output_chunk_size: Option<usize>,
}

impl RunLimits {
    const DEFAULT_BATCH_TIMEOUT: f64 = 5.0;
    const DEFAULT_COMPILE_TIMEOUT: f64 = 30.0;
    const DEFAULT_DRAIN_GRACE: f64 = 2.0;
    const DEFAULT_OUTPUT_CHUNK_SIZE: usize = 1024;

    /// Create new limits with the default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create limits with every field unset, for use as overrides
    pub fn unset() -> Self {
        Self {
            batch_timeout: None,
            compile_timeout: None,
            drain_grace: None,
            output_chunk_size: None,
        }
    }

    /// Set the batch wall clock limit in seconds
    pub fn with_batch_timeout(mut self, seconds: f64) -> Self {
        self.batch_timeout = Some(seconds);
        self
    }

    /// Set the compilation wall clock limit in seconds
    pub fn with_compile_timeout(mut self, seconds: f64) -> Self {
        self.compile_timeout = Some(seconds);
        self
    }

    /// Set the output reader grace period in seconds
    pub fn with_drain_grace(mut self, seconds: f64) -> Self {
        self.drain_grace = Some(seconds);
        self
    }

    /// Set the maximum output chunk size in bytes
    pub fn with_output_chunk_size(mut self, bytes: usize) -> Self {
        self.output_chunk_size = Some(bytes);
        self
    }

    /// Apply overrides from another RunLimits, preferring values from `overrides`
    pub fn with_overrides(&self, overrides: &RunLimits) -> RunLimits {
        RunLimits {
            batch_timeout: overrides.batch_timeout.or(self.batch_timeout),
            compile_timeout: overrides.compile_timeout.or(self.compile_timeout),
            drain_grace: overrides.drain_grace.or(self.drain_grace),
            output_chunk_size: overrides.output_chunk_size.or(self.output_chunk_size),
        }
    }

    pub fn batch_timeout(&self) -> Duration {
        seconds(self.batch_timeout, Self::DEFAULT_BATCH_TIMEOUT)
    }

    pub fn compile_timeout(&self) -> Duration {
        seconds(self.compile_timeout, Self::DEFAULT_COMPILE_TIMEOUT)
    }

    pub fn drain_grace(&self) -> Duration {
        seconds(self.drain_grace, Self::DEFAULT_DRAIN_GRACE)
    }

    pub fn output_chunk_size(&self) -> usize {
        self.output_chunk_size
            .filter(|size| *size > 0)
            .unwrap_or(Self::DEFAULT_OUTPUT_CHUNK_SIZE)
    }
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            batch_timeout: Some(Self::DEFAULT_BATCH_TIMEOUT),
            compile_timeout: Some(Self::DEFAULT_COMPILE_TIMEOUT),
            drain_grace: Some(Self::DEFAULT_DRAIN_GRACE),
            output_chunk_size: Some(Self::DEFAULT_OUTPUT_CHUNK_SIZE),
        }
    }
}

/// Negative, NaN and out-of-range values fall back to the default
fn seconds(value: Option<f64>, default: f64) -> Duration {
    value
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .unwrap_or_else(|| Duration::from_secs_f64(default))
}

/// Result of a batch run, returned exactly once to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the program compiled, ran and exited with code 0
    pub success: bool,

    /// Combined stdout and stderr of the program
    pub output: String,

    /// Failure description, absent on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    /// A run that failed before producing any program output
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }

    /// Check if the execution was successful
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Compiling,
    Running,
    /// Program exited on its own, or the run failed before starting
    Finished,
    /// Program was killed by an explicit stop or a closed channel
    Aborted,
}
