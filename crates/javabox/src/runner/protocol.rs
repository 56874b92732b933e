//! Interactive text frame protocol
//!
//! Clients send `RUN:<source>` and `INPUT:<line>`. The server answers with
//! `OUTPUT:<text>`, `ERROR:<message>` and a final
//! `EXIT:Program finished with exit code <n>`.

use std::fmt;

const RUN_PREFIX: &str = "RUN:";
const INPUT_PREFIX: &str = "INPUT:";
const OUTPUT_PREFIX: &str = "OUTPUT:";
const ERROR_PREFIX: &str = "ERROR:";
const EXIT_PREFIX: &str = "EXIT:Program finished with exit code ";

/// Frame received from a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Start a session with the given source
    Run(String),

    /// One line of program input, without its terminator
    Input(String),
}

impl ClientFrame {
    /// Parse a text frame
    ///
    /// Frames without a known prefix yield `None` and are ignored by callers.
    pub fn parse(text: &str) -> Option<Self> {
        if let Some(source) = text.strip_prefix(RUN_PREFIX) {
            Some(ClientFrame::Run(source.to_string()))
        } else {
            text.strip_prefix(INPUT_PREFIX)
                .map(|line| ClientFrame::Input(line.to_string()))
        }
    }
}

impl fmt::Display for ClientFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientFrame::Run(source) => write!(f, "{RUN_PREFIX}{source}"),
            ClientFrame::Input(line) => write!(f, "{INPUT_PREFIX}{line}"),
        }
    }
}

/// Frame sent to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// A chunk of program output
    Output(String),

    /// Terminal failure before the program ran, or a rejected request
    Error(String),

    /// The program exited with this code
    Exit(i32),
}

impl ServerFrame {
    /// Whether this frame ends the session from the client's point of view
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ServerFrame::Output(_))
    }
}

impl fmt::Display for ServerFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerFrame::Output(text) => write!(f, "{OUTPUT_PREFIX}{text}"),
            ServerFrame::Error(message) => write!(f, "{ERROR_PREFIX}{message}"),
            ServerFrame::Exit(code) => write!(f, "{EXIT_PREFIX}{code}"),
        }
    }
}
