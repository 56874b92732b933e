//! Program launch and I/O
//!
//! Launches the compiled program with stdout and stderr both attached to
//! the write end of one OS pipe. A single task reads the other end, so
//! callers see the bytes in the order the program wrote them.

use std::io;
use std::os::fd::OwnedFd;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::unix::pipe;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::toolchain::{ToolchainError, resolve_command};
use crate::workspace::PreparedSource;

/// Capacity of the output channel, in chunks
const OUTPUT_CHANNEL_CAPACITY: usize = 64;

/// Combined stdout and stderr of a running program
///
/// The stream ends once every writer of the shared pipe has closed it.
#[derive(Debug)]
pub struct MergedOutput {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl MergedOutput {
    /// Receive the next chunk, or `None` at end of stream
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    /// Read the rest of the stream into one buffer
    pub async fn collect(mut self) -> Vec<u8> {
        let mut buffer = Vec::new();
        while let Some(chunk) = self.rx.recv().await {
            buffer.extend_from_slice(&chunk);
        }
        buffer
    }
}

async fn pump<R>(mut reader: R, tx: mpsc::Sender<Vec<u8>>, chunk_size: usize)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; chunk_size];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).await.is_err() {
                    // Receiver gone, nobody wants the rest
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "read error on program output");
                break;
            }
        }
    }
    debug!("output pipe closed");
}

/// Process handle for a launched program
#[derive(Debug)]
pub struct RunningProgram {
    child: Child,
    stdin: Option<ChildStdin>,
    output: Option<MergedOutput>,
    pid: Option<u32>,
}

impl RunningProgram {
    /// Launch `java -cp <work_dir> <EntryPoint>` for a compiled source
    ///
    /// Must be called from within a Tokio runtime. The child is killed if the
    /// handle is dropped while it is still running.
    #[instrument(skip(config, prepared), fields(entry_point = %prepared.entry_point))]
    pub fn spawn(
        config: &Config,
        prepared: &PreparedSource,
        chunk_size: usize,
    ) -> Result<Self, ToolchainError> {
        let work_dir = prepared.work_dir.path();
        let mut command = config
            .toolchain
            .run_command(work_dir, &prepared.entry_point);
        resolve_command(&mut command)?;

        Self::launch(&command, work_dir, chunk_size)
    }

    /// Launch an already resolved command line in `work_dir`
    fn launch(command: &[String], work_dir: &Path, chunk_size: usize) -> Result<Self, ToolchainError> {
        debug!(?command, "spawning program");

        let (reader, writer) = io::pipe().map_err(ToolchainError::SpawnFailed)?;
        let stderr = writer.try_clone().map_err(ToolchainError::SpawnFailed)?;

        // The command owns the parent's copies of the write end and is
        // dropped at the end of this statement, so EOF arrives once the
        // program and its descendants close theirs.
        let mut child = Command::new(&command[0])
            .args(&command[1..])
            .current_dir(work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::from(writer))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(ToolchainError::SpawnFailed)?;

        let pid = child.id();
        let stdin = child.stdin.take();

        let reader = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;
        let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        tokio::spawn(pump(reader, tx, chunk_size.max(1)));

        debug!(?pid, "program started");

        Ok(Self {
            child,
            stdin,
            output: Some(MergedOutput { rx }),
            pid,
        })
    }

    /// OS process id, if the process has not been reaped yet
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Take ownership of the stdin pipe
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// Take ownership of the merged output stream
    pub fn take_output(&mut self) -> Option<MergedOutput> {
        self.output.take()
    }

    /// Force-kill the process and reap it
    ///
    /// Killing a process that already exited is a no-op.
    pub async fn kill(&mut self) -> Result<(), ToolchainError> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        match self.child.kill().await {
            Ok(()) => {
                debug!(pid = ?self.pid, "program killed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(ToolchainError::Io(e)),
        }
    }

    /// Wait for the process to exit
    ///
    /// Does not touch stdin; close it first if the program reads until EOF.
    pub async fn wait(&mut self) -> Result<ExitStatus, ToolchainError> {
        Ok(self.child.wait().await?)
    }
}
