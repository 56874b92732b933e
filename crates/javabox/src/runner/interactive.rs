//! Interactive sessions
//!
//! Each session id owns at most one program at a time. Output is pushed to
//! the client as it is produced and client input is forwarded line by line.
//!
//! A session is driven by a single task that owns its working directory and
//! process. The registry only holds control handles, so teardown always
//! happens in one place no matter who asked for it.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::runner::pool::WorkerPool;
use crate::runner::protocol::ServerFrame;
use crate::runner::{RunError, SessionError};
use crate::toolchain::{RunningProgram, compile, exit_code};
use crate::types::SessionState;
use crate::workspace::{self, PreparedSource};

/// Pending input lines per session
const STDIN_CHANNEL_CAPACITY: usize = 32;

/// Registry entry for one session
struct SessionSlot {
    /// Distinguishes this run from earlier runs under the same id
    run_id: Uuid,
    state: SessionState,
    work_dir: Option<PathBuf>,
    pid: Option<u32>,
    stdin: Option<mpsc::Sender<Vec<u8>>>,
    cancel: watch::Sender<bool>,
    done: watch::Receiver<bool>,
}

/// How a session run ended
enum SessionEnd {
    Exited(i32),
    Failed(RunError),
    Aborted,
}

/// Registry of interactive sessions
///
/// Cloning is cheap; clones share the registry.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    pool: WorkerPool,
    sessions: DashMap<String, SessionSlot>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("active", &self.inner.sessions.len())
            .field("pool", &self.inner.pool)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create an empty registry dispatching runs onto `pool`
    pub fn new(config: Config, pool: WorkerPool) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                pool,
                sessions: DashMap::new(),
            }),
        }
    }

    /// Compile and launch `source` for session `id`
    ///
    /// Returns immediately; frames for this run arrive on `client`. A run
    /// ends with exactly one `EXIT` or `ERROR` frame unless it was stopped.
    /// The returned handle resolves to the final state once teardown is done.
    ///
    /// Must be called from within a Tokio runtime.
    #[instrument(skip(self, source, client))]
    pub fn start(
        &self,
        id: &str,
        source: String,
        client: mpsc::Sender<ServerFrame>,
    ) -> Result<JoinHandle<SessionState>, SessionError> {
        let run_id = Uuid::new_v4();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);

        match self.inner.sessions.entry(id.to_string()) {
            Entry::Occupied(_) => {
                warn!("session already running, start rejected");
                return Err(SessionError::AlreadyActive(id.to_string()));
            }
            Entry::Vacant(entry) => {
                entry.insert(SessionSlot {
                    run_id,
                    state: SessionState::Compiling,
                    work_dir: None,
                    pid: None,
                    stdin: None,
                    cancel: cancel_tx,
                    done: done_rx,
                });
            }
        }

        info!(%run_id, "session starting");

        let manager = self.clone();
        let id = id.to_string();
        Ok(tokio::spawn(async move {
            manager
                .drive(id, run_id, source, client, cancel_rx, done_tx)
                .await
        }))
    }

    /// Forward one line of input to the session's program
    ///
    /// A newline is appended. Never waits: the input is dropped if the
    /// session has no running program or the program is not keeping up.
    #[instrument(skip(self, data))]
    pub fn send_input(&self, id: &str, data: &str) {
        let stdin = self
            .inner
            .sessions
            .get(id)
            .and_then(|slot| slot.stdin.clone());
        let Some(stdin) = stdin else {
            debug!("no running program, input dropped");
            return;
        };

        let mut line = Vec::with_capacity(data.len() + 1);
        line.extend_from_slice(data.as_bytes());
        line.push(b'\n');
        match stdin.try_send(line) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("program is not reading stdin, input dropped"),
            Err(TrySendError::Closed(_)) => debug!("program stdin closed, input dropped"),
        }
    }

    /// Stop a session and wait for its teardown
    ///
    /// When this returns the program is dead, the working directory is gone
    /// and the id is free again. Stopping an unknown id is a no-op.
    #[instrument(skip(self))]
    pub async fn stop(&self, id: &str) {
        let Some((_, slot)) = self.inner.sessions.remove(id) else {
            debug!("no session to stop");
            return;
        };

        let _ = slot.cancel.send(true);
        let mut done = slot.done;
        // An error means the session task is already gone
        let _ = done.wait_for(|done| *done).await;

        info!(run_id = %slot.run_id, "session stopped");
    }

    /// Stop every registered session
    pub async fn stop_all(&self) {
        let ids: Vec<String> = self
            .inner
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for id in ids {
            self.stop(&id).await;
        }
    }

    /// Current state of a session, `Idle` if nothing is registered
    pub fn state(&self, id: &str) -> SessionState {
        self.inner
            .sessions
            .get(id)
            .map_or(SessionState::Idle, |slot| slot.state)
    }

    /// Whether the session has a live program
    pub fn is_running(&self, id: &str) -> bool {
        self.state(id) == SessionState::Running
    }

    /// Working directory of the session's current run
    pub fn work_dir(&self, id: &str) -> Option<PathBuf> {
        self.inner
            .sessions
            .get(id)
            .and_then(|slot| slot.work_dir.clone())
    }

    /// OS process id of the session's program
    pub fn pid(&self, id: &str) -> Option<u32> {
        self.inner.sessions.get(id).and_then(|slot| slot.pid)
    }

    /// Number of registered sessions
    pub fn active_sessions(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Apply `apply` to the slot if it still belongs to this run
    fn update(&self, id: &str, run_id: Uuid, apply: impl FnOnce(&mut SessionSlot)) -> bool {
        match self.inner.sessions.get_mut(id) {
            Some(mut slot) if slot.run_id == run_id => {
                apply(slot.value_mut());
                true
            }
            _ => false,
        }
    }

    #[instrument(skip(self, run_id, source, client, cancel, done), fields(%run_id))]
    async fn drive(
        self,
        id: String,
        run_id: Uuid,
        source: String,
        client: mpsc::Sender<ServerFrame>,
        mut cancel: watch::Receiver<bool>,
        done: watch::Sender<bool>,
    ) -> SessionState {
        let permit = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => None,
            permit = self.inner.pool.acquire() => Some(permit),
        };

        let end = match permit {
            Some(_permit) => self.run(&id, run_id, &source, &client, &mut cancel).await,
            None => SessionEnd::Aborted,
        };

        // Deregister unless a stop already did, then release any waiter
        self.inner
            .sessions
            .remove_if(&id, |_, slot| slot.run_id == run_id);
        let _ = done.send(true);

        let (state, frame) = match end {
            SessionEnd::Exited(code) => {
                info!(code, "program finished");
                (SessionState::Finished, Some(ServerFrame::Exit(code)))
            }
            SessionEnd::Failed(e) => {
                info!(error = %e, "session failed");
                (SessionState::Finished, Some(ServerFrame::Error(e.client_message())))
            }
            SessionEnd::Aborted => {
                debug!("session aborted");
                (SessionState::Aborted, None)
            }
        };

        if let Some(frame) = frame {
            if !client.is_closed() {
                let _ = client.send(frame).await;
            }
        }

        state
    }

    async fn run(
        &self,
        id: &str,
        run_id: Uuid,
        source: &str,
        client: &mpsc::Sender<ServerFrame>,
        cancel: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        // Runs to completion; directory creation on the blocking pool cannot be cancelled
        let prepared = match workspace::prepare(&self.inner.config, source).await {
            Ok(prepared) => prepared,
            Err(e) => return SessionEnd::Failed(e.into()),
        };

        let path = prepared.work_dir.path().to_path_buf();
        self.update(id, run_id, |slot| slot.work_dir = Some(path));

        let end = self.supervise(id, run_id, &prepared, client, cancel).await;

        if let Err(e) = prepared.work_dir.remove().await {
            warn!(error = %e, "failed to remove working directory");
        }

        end
    }

    async fn supervise(
        &self,
        id: &str,
        run_id: Uuid,
        prepared: &PreparedSource,
        client: &mpsc::Sender<ServerFrame>,
        cancel: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let config = &self.inner.config;

        // Dropping the compile future kills javac
        let outcome = tokio::select! {
            biased;
            _ = cancelled(cancel) => return SessionEnd::Aborted,
            outcome = compile(config, prepared, None) => outcome,
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => return SessionEnd::Failed(e.into()),
        };
        if !outcome.is_success() {
            return SessionEnd::Failed(RunError::CompileFailed(outcome));
        }

        let chunk_size = config.effective_limits(None).output_chunk_size();
        let mut program = match RunningProgram::spawn(config, prepared, chunk_size) {
            Ok(program) => program,
            Err(e) => return SessionEnd::Failed(e.into()),
        };

        let end = self
            .forward(id, run_id, &mut program, client, cancel)
            .await;

        if let Err(e) = program.kill().await {
            warn!(error = %e, "failed to kill program");
        }

        end
    }

    async fn forward(
        &self,
        id: &str,
        run_id: Uuid,
        program: &mut RunningProgram,
        client: &mpsc::Sender<ServerFrame>,
        cancel: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let Some(mut output) = program.take_output() else {
            return SessionEnd::Aborted;
        };

        let (stdin_tx, stdin_rx) = mpsc::channel(STDIN_CHANNEL_CAPACITY);
        let writer = tokio::spawn(feed_stdin(program.take_stdin(), stdin_rx));

        let pid = program.pid();
        let registered = self.update(id, run_id, |slot| {
            slot.state = SessionState::Running;
            slot.pid = pid;
            slot.stdin = Some(stdin_tx);
        });
        if !registered {
            writer.abort();
            return SessionEnd::Aborted;
        }
        debug!(?pid, "program running");

        let mut pending = Vec::new();
        let mut output_open = true;
        let end = loop {
            let chunk = tokio::select! {
                biased;
                _ = cancelled(cancel) => break SessionEnd::Aborted,
                chunk = output.recv(), if output_open => chunk,
                status = program.wait(), if !output_open => break match status {
                    Ok(status) => SessionEnd::Exited(exit_code(status)),
                    Err(e) => SessionEnd::Failed(e.into()),
                },
            };

            let text = match chunk {
                Some(bytes) => decode_chunk(&mut pending, &bytes),
                None => {
                    output_open = false;
                    String::from_utf8_lossy(&std::mem::take(&mut pending)).into_owned()
                }
            };
            if text.is_empty() {
                continue;
            }

            // Raced against cancellation so a full client channel cannot block a stop
            tokio::select! {
                biased;
                _ = cancelled(cancel) => break SessionEnd::Aborted,
                sent = client.send(ServerFrame::Output(text)) => if sent.is_err() {
                    debug!("client channel closed");
                    break SessionEnd::Aborted;
                },
            }
        };

        writer.abort();
        end
    }
}

/// Resolves once a stop was requested or the registry entry is gone
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}

async fn feed_stdin(stdin: Option<ChildStdin>, mut lines: mpsc::Receiver<Vec<u8>>) {
    let Some(mut stdin) = stdin else {
        return;
    };
    while let Some(line) = lines.recv().await {
        let write = async {
            stdin.write_all(&line).await?;
            stdin.flush().await
        };
        if let Err(e) = write.await {
            debug!(error = %e, "stdin write failed");
            break;
        }
    }
}

/// Decode a chunk as UTF-8, holding back a character split across chunks
fn decode_chunk(pending: &mut Vec<u8>, chunk: &[u8]) -> String {
    pending.extend_from_slice(chunk);

    let incomplete = match std::str::from_utf8(pending) {
        Err(e) if e.error_len().is_none() => pending.len() - e.valid_up_to(),
        _ => 0,
    };

    let tail = pending.split_off(pending.len() - incomplete);
    let text = String::from_utf8_lossy(pending).into_owned();
    *pending = tail;
    text
}
