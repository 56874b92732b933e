//! Batch runs
//!
//! Compile, feed all input up front, and collect the merged output under a
//! wall clock limit.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::runner::RunError;
use crate::toolchain::{MergedOutput, RunningProgram, compile, exit_code};
use crate::types::{ExecutionResult, RunLimits};
use crate::workspace::{self, PreparedSource};

/// Output marker of a program that ran out of input
const INPUT_EXHAUSTED_MARKER: &str = "NoSuchElementException";

/// Appended to the error of a program that ran out of input
const INPUT_EXHAUSTED_HINT: &str =
    "\n\n[Hint]: You used Scanner but didn't provide enough input in the Input box.";

/// Run a source file once with the given input
///
/// Never fails: every problem is reported through the returned
/// [`ExecutionResult`]. The working directory is removed and the process is
/// gone before this returns.
#[instrument(skip(config, source, input, limits), fields(input_len = input.len()))]
pub async fn run_batch(
    config: &Config,
    source: &str,
    input: &str,
    limits: Option<&RunLimits>,
) -> ExecutionResult {
    let limits = config.effective_limits(limits);

    let prepared = match workspace::prepare(config, source).await {
        Ok(prepared) => prepared,
        Err(e) => return ExecutionResult::failure(RunError::from(e).batch_message()),
    };

    let result = execute(config, &prepared, input, &limits).await;

    if let Err(e) = prepared.work_dir.remove().await {
        warn!(error = %e, "failed to remove working directory");
    }

    match result {
        Ok(result) => {
            debug!(success = result.success, "batch run complete");
            result
        }
        Err(e) => {
            debug!(error = %e, "batch run failed");
            ExecutionResult::failure(e.batch_message())
        }
    }
}

async fn execute(
    config: &Config,
    prepared: &PreparedSource,
    input: &str,
    limits: &RunLimits,
) -> Result<ExecutionResult, RunError> {
    let outcome = compile(config, prepared, Some(limits)).await?;
    if !outcome.is_success() {
        return Err(RunError::CompileFailed(outcome));
    }

    let mut program = RunningProgram::spawn(config, prepared, limits.output_chunk_size())?;
    let result = supervise(&mut program, input, limits).await;

    // Covers the timeout and error paths; a no-op once the program exited
    if let Err(e) = program.kill().await {
        warn!(error = %e, "failed to kill program");
    }

    result
}

async fn supervise(
    program: &mut RunningProgram,
    input: &str,
    limits: &RunLimits,
) -> Result<ExecutionResult, RunError> {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let mut reader = tokio::spawn(drain(program.take_output(), Arc::clone(&buffer)));
    let writer = tokio::spawn(feed(program.take_stdin(), input.to_string()));

    let timeout = limits.batch_timeout();
    let status = match tokio::time::timeout(timeout, program.wait()).await {
        Ok(status) => status?,
        Err(_) => {
            debug!(?timeout, "program exceeded wall clock limit");
            writer.abort();
            reader.abort();
            return Err(RunError::ExecutionTimeout(timeout));
        }
    };
    writer.abort();

    if tokio::time::timeout(limits.drain_grace(), &mut reader)
        .await
        .is_err()
    {
        warn!("output still open after program exit, keeping what arrived");
        reader.abort();
    }

    let output = {
        let bytes = buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    };

    let code = exit_code(status);
    debug!(code, output_len = output.len(), "program exited");

    if code == 0 {
        return Ok(ExecutionResult {
            success: true,
            output,
            error: None,
        });
    }

    let error = annotate_error(&output);
    Ok(ExecutionResult {
        success: false,
        output,
        error: Some(error),
    })
}

/// Add the input hint to the error text of a program that ran out of input
fn annotate_error(output: &str) -> String {
    if output.contains(INPUT_EXHAUSTED_MARKER) {
        format!("{output}{INPUT_EXHAUSTED_HINT}")
    } else {
        output.to_string()
    }
}

async fn drain(output: Option<MergedOutput>, buffer: Arc<Mutex<Vec<u8>>>) {
    let Some(mut output) = output else {
        return;
    };
    while let Some(chunk) = output.recv().await {
        buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(&chunk);
    }
}

/// Write the whole input followed by a newline, then close stdin
async fn feed(stdin: Option<ChildStdin>, input: String) {
    let Some(mut stdin) = stdin else {
        return;
    };
    if !input.is_empty() {
        let write = async {
            stdin.write_all(input.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        };
        if let Err(e) = write.await {
            // The program may exit without reading everything
            debug!(error = %e, "stdin write failed");
        }
    }
}
