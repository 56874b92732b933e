//! Compilation step
//!
//! Runs javac inside the working directory and collects its diagnostics.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::toolchain::diagnostics::{Diagnostic, parse_diagnostics};
use crate::toolchain::{ToolchainError, exit_code, resolve_command};
use crate::types::RunLimits;
use crate::workspace::PreparedSource;

/// Result of a compilation
#[derive(Debug, Clone)]
pub struct CompilationOutcome {
    /// Whether javac exited with code 0
    pub success: bool,

    /// Exit code of javac
    pub exit_code: i32,

    /// Parsed diagnostics, in compiler order
    pub diagnostics: Vec<Diagnostic>,

    /// Raw compiler output (stdout followed by stderr)
    pub output: String,
}

impl CompilationOutcome {
    /// Check if compilation was successful
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Diagnostics as `Line <n>: <message>` lines
    ///
    /// Falls back to the raw compiler output when nothing could be parsed.
    pub fn diagnostics_text(&self) -> String {
        if self.diagnostics.is_empty() {
            return self.output.clone();
        }

        let mut text = String::new();
        for diagnostic in &self.diagnostics {
            text.push_str(&diagnostic.to_string());
            text.push('\n');
        }
        text
    }
}

/// Compile a prepared source file
///
/// A failed compilation is reported as `Ok` with `success == false`. Errors
/// are reserved for a missing compiler, a compile timeout, and I/O failures.
#[instrument(skip(config, prepared), fields(entry_point = %prepared.entry_point))]
pub async fn compile(
    config: &Config,
    prepared: &PreparedSource,
    limits: Option<&RunLimits>,
) -> Result<CompilationOutcome, ToolchainError> {
    let timeout = config.effective_limits(limits).compile_timeout();

    let mut command = config.toolchain.compile_command(&prepared.source_name);
    resolve_command(&mut command)?;

    debug!(?command, "compiling");

    let output = Command::new(&command[0])
        .args(&command[1..])
        .current_dir(prepared.work_dir.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, output).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ToolchainError::Unavailable {
                tool: command[0].clone(),
            });
        }
        Ok(Err(e)) => return Err(ToolchainError::Io(e)),
        Err(_) => return Err(ToolchainError::CompileTimedOut),
    };

    // Combine stdout and stderr for compiler output
    let mut compiler_output = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !compiler_output.is_empty() && !stderr.is_empty() && !compiler_output.ends_with('\n') {
        compiler_output.push('\n');
    }
    compiler_output.push_str(&stderr);

    let success = output.status.success();
    let diagnostics = parse_diagnostics(&compiler_output);

    debug!(
        success,
        exit_code = ?output.status.code(),
        diagnostics = diagnostics.len(),
        "compilation complete"
    );

    Ok(CompilationOutcome {
        success,
        exit_code: exit_code(output.status),
        diagnostics,
        output: compiler_output,
    })
}
