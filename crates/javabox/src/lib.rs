//! A library for compiling and running Java source on a server.
//!
//! Javabox takes a single Java source file, compiles it with the host JDK in
//! a private working directory and runs it, either in one shot with all input
//! supplied up front or as an interactive session driven by text frames.
//!
//! # Features
//!
//! - **Batch runs** with a wall clock limit and merged stdout/stderr.
//! - **Interactive sessions** that stream output and accept input line by line.
//! - **TOML configuration** for toolchain commands, limits and the working root.
//! - **Bounded concurrency** through a shared worker pool.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, ToolchainConfig};
pub use runner::{
    BatchRequest, ClientFrame, Connection, RunError, Runner, ServerFrame, SessionError,
    SessionManager, WorkerPool, run_batch,
};
pub use toolchain::{CompilationOutcome, Diagnostic, DiagnosticKind, ToolchainError};
pub use types::{ExecutionResult, RunLimits, SessionState};
pub use workspace::{PrepareError, PreparedSource, WorkDir, extract_entry_point, prepare};

pub mod config;
pub mod runner;
pub mod toolchain;
pub mod types;
pub mod workspace;
