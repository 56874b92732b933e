//! Java toolchain driver
//!
//! Runs `javac` against a prepared source file and launches the compiled
//! program as a child process whose stdout and stderr arrive as one stream.

use std::path::Path;
use std::process::ExitStatus;

use thiserror::Error;

pub use crate::toolchain::compile::{CompilationOutcome, compile};
pub use crate::toolchain::diagnostics::{Diagnostic, DiagnosticKind, parse_diagnostics};
pub use crate::toolchain::process::{MergedOutput, RunningProgram};

mod compile;
mod diagnostics;
mod process;

/// Errors from the toolchain itself, as opposed to errors in the user's program
#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("'{tool}' not found")]
    Unavailable { tool: String },

    #[error("compilation timed out")]
    CompileTimedOut,

    #[error("failed to launch program: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolve the program in a command to an absolute path using the host's PATH.
///
/// Commands that already contain a `/` are checked for existence and left
/// unchanged. A program that cannot be found is reported as
/// [`ToolchainError::Unavailable`].
pub fn resolve_command(command: &mut [String]) -> Result<(), ToolchainError> {
    let Some(first) = command.first_mut() else {
        return Ok(());
    };

    if first.contains('/') {
        if Path::new(first.as_str()).is_file() {
            return Ok(());
        }
        return Err(ToolchainError::Unavailable {
            tool: first.clone(),
        });
    }

    let path_var = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(&*first);
        if candidate.is_file() {
            *first = candidate.to_string_lossy().into_owned();
            return Ok(());
        }
    }

    Err(ToolchainError::Unavailable {
        tool: first.clone(),
    })
}

/// Exit code of a finished process
///
/// A process killed by a signal reports `128 + signal`, the shell convention.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}
