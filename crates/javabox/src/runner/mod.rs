//! Code runner for Javabox
//!
//! Provides the two entry modes on top of the source preparer and toolchain
//! driver: one-shot batch runs and long-lived interactive sessions.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use crate::runner::batch::run_batch;
pub use crate::runner::connection::Connection;
pub use crate::runner::interactive::SessionManager;
pub use crate::runner::pool::WorkerPool;
pub use crate::runner::protocol::{ClientFrame, ServerFrame};

mod batch;
mod connection;
mod interactive;
mod pool;
mod protocol;

use crate::config::Config;
use crate::toolchain::{CompilationOutcome, ToolchainError};
use crate::types::{ExecutionResult, RunLimits};
use crate::workspace::PrepareError;

/// Message shown when a batch run exceeds its wall clock limit
pub const TIMEOUT_MESSAGE: &str =
    "Execution timed out (Program waited too long for input or infinite loop)";

/// Errors that end a run attempt
///
/// Every variant is terminal: nothing is retried, and the working directory
/// and process are torn down before the error is reported.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("preparation error: {0}")]
    Prepare(#[from] PrepareError),

    #[error("toolchain error: {0}")]
    Toolchain(#[from] ToolchainError),

    #[error("compilation failed with exit code {}", .0.exit_code)]
    CompileFailed(CompilationOutcome),

    #[error("execution timed out after {0:?}")]
    ExecutionTimeout(Duration),
}

impl RunError {
    /// Error text for a batch [`ExecutionResult`]
    pub fn batch_message(&self) -> String {
        match self {
            RunError::Prepare(PrepareError::NoEntryPoint) => {
                "No public class found in code".to_string()
            }
            RunError::Toolchain(ToolchainError::Unavailable { tool }) => {
                format!("JDK required: '{tool}' not found")
            }
            RunError::Toolchain(ToolchainError::CompileTimedOut) => {
                "Compilation timed out".to_string()
            }
            RunError::CompileFailed(outcome) => {
                format!("Compilation errors:\n{}", outcome.diagnostics_text())
            }
            RunError::ExecutionTimeout(_) => TIMEOUT_MESSAGE.to_string(),
            RunError::Prepare(e) => format!("Error: {e}"),
            RunError::Toolchain(e) => format!("Error: {e}"),
        }
    }

    /// Payload of the `ERROR` frame sent to an interactive client
    pub fn client_message(&self) -> String {
        match self {
            RunError::Prepare(PrepareError::NoEntryPoint) => "No public class found".to_string(),
            RunError::Toolchain(ToolchainError::Unavailable { tool }) => {
                format!("Server JDK missing: '{tool}' not found")
            }
            RunError::Toolchain(ToolchainError::CompileTimedOut) => {
                "Compilation timed out".to_string()
            }
            RunError::CompileFailed(outcome) => {
                format!("Compilation Failed:\n{}", outcome.output)
            }
            RunError::ExecutionTimeout(_) => TIMEOUT_MESSAGE.to_string(),
            RunError::Prepare(e) => e.to_string(),
            RunError::Toolchain(e) => e.to_string(),
        }
    }
}

/// Errors from the interactive session registry
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session '{0}' is already running")]
    AlreadyActive(String),
}

/// Batch run request as received from a client
#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    /// Java source text
    pub code: String,

    /// Input fed to the program's stdin
    #[serde(default)]
    pub input: String,
}

/// High-level runner for both entry modes
///
/// Cloning is cheap; clones share the worker pool and the session registry.
#[derive(Debug, Clone)]
pub struct Runner {
    config: Config,
    pool: WorkerPool,
    sessions: SessionManager,
}

impl Runner {
    /// Create a new runner with the given configuration
    pub fn new(config: Config) -> Self {
        let pool = WorkerPool::new(config.max_concurrent_runs);
        let sessions = SessionManager::new(config.clone(), pool.clone());
        Self {
            config,
            pool,
            sessions,
        }
    }

    /// Create a new runner with default configuration
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the worker pool
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Get the interactive session registry
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Run a batch request with the configured limits
    pub async fn execute(&self, request: &BatchRequest) -> ExecutionResult {
        self.execute_with_limits(request, None).await
    }

    /// Run a batch request, overriding configured limits
    ///
    /// The run is dispatched onto the worker pool and waits for a free slot.
    pub async fn execute_with_limits(
        &self,
        request: &BatchRequest,
        limits: Option<&RunLimits>,
    ) -> ExecutionResult {
        let config = self.config.clone();
        let request = request.clone();
        let limits = limits.cloned();

        let handle = self.pool.spawn(async move {
            run_batch(&config, &request.code, &request.input, limits.as_ref()).await
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => ExecutionResult::failure(format!("Error: {e}")),
        }
    }

    /// Open a new interactive client connection
    pub fn connect(&self) -> (Connection, tokio::sync::mpsc::Receiver<ServerFrame>) {
        Connection::open(self.sessions.clone())
    }
}
