//! javac diagnostic parsing
//!
//! Pulls `<file>.java:<line>: <kind>: <message>` records out of compiler
//! output. Source excerpts, caret lines and summary counts are skipped.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Severity of a compiler diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Error,
    Warning,
}

impl DiagnosticKind {
    fn from_label(label: &str) -> Self {
        match label {
            "warning" => DiagnosticKind::Warning,
            _ => DiagnosticKind::Error,
        }
    }
}

/// A single compiler diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 1-indexed source line, absent for file-level errors
    pub line: Option<u32>,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "Line {line}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

static LOCATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:.*\.java):(\d+): (error|warning): (.*)$")
        .expect("diagnostic pattern should be valid")
});

static UNLOCATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(error|warning): (.*)$").expect("diagnostic pattern should be valid")
});

/// Parse javac output into diagnostics
///
/// Lenient: lines that are not diagnostic headers are ignored, so an empty
/// result means the output carried no recognizable diagnostics.
pub fn parse_diagnostics(output: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for line in output.lines() {
        let line = line.trim_end();
        if let Some(caps) = LOCATED.captures(line) {
            diagnostics.push(Diagnostic {
                line: caps[1].parse().ok(),
                kind: DiagnosticKind::from_label(&caps[2]),
                message: caps[3].to_string(),
            });
        } else if let Some(caps) = UNLOCATED.captures(line) {
            diagnostics.push(Diagnostic {
                line: None,
                kind: DiagnosticKind::from_label(&caps[1]),
                message: caps[2].to_string(),
            });
        }
    }

    diagnostics
}
