//! Client connection
//!
//! Binds one client channel to one session id and routes its frames.

use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::runner::interactive::SessionManager;
use crate::runner::protocol::{ClientFrame, ServerFrame};

/// Frames buffered towards a slow client
const OUTBOUND_CAPACITY: usize = 256;

/// Message for a `RUN` frame while the previous run is still active
const ALREADY_RUNNING_MESSAGE: &str = "Session already running; stop it before starting again";

/// One interactive client
///
/// Call [`close()`](Self::close) when the client goes away. Dropping an open
/// connection stops its session in the background.
#[derive(Debug)]
pub struct Connection {
    id: String,
    manager: SessionManager,
    outbound: mpsc::Sender<ServerFrame>,
    closed: bool,
}

impl Connection {
    /// Open a connection with a fresh session id
    ///
    /// Frames for the client arrive on the returned receiver.
    pub fn open(manager: SessionManager) -> (Self, mpsc::Receiver<ServerFrame>) {
        let (outbound, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let connection = Self {
            id: Uuid::new_v4().to_string(),
            manager,
            outbound,
            closed: false,
        };
        (connection, rx)
    }

    /// Session id owned by this connection
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Handle one text frame from the client
    #[instrument(skip(self, text), fields(session = %self.id))]
    pub async fn handle_text(&self, text: &str) {
        match ClientFrame::parse(text) {
            Some(frame) => self.handle(frame).await,
            None => debug!(len = text.len(), "ignoring unrecognized frame"),
        }
    }

    /// Handle one parsed frame from the client
    pub async fn handle(&self, frame: ClientFrame) {
        match frame {
            ClientFrame::Run(source) => {
                if let Err(e) = self.manager.start(&self.id, source, self.outbound.clone()) {
                    debug!(error = %e, "run rejected");
                    let _ = self
                        .outbound
                        .send(ServerFrame::Error(ALREADY_RUNNING_MESSAGE.to_string()))
                        .await;
                }
            }
            ClientFrame::Input(line) => self.manager.send_input(&self.id, &line),
        }
    }

    /// Stop the session and release the connection
    pub async fn close(mut self) {
        self.closed = true;
        self.manager.stop(&self.id).await;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        warn!(session = %self.id, "connection dropped without close(), stopping session in background");

        let manager = self.manager.clone();
        let id = std::mem::take(&mut self.id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { manager.stop(&id).await });
            }
            Err(_) => warn!("no runtime available, session left to the registry"),
        }
    }
}
