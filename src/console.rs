//! Debug console - the user-facing, append-only log of bridge activity
//!
//! Both the engine lifecycle controller and the input router write here through
//! the [`LogSink`] trait. Lines are never read back for control flow; the UI
//! only takes snapshots. Every line is mirrored to `tracing` at a level that
//! matches its [`ConsoleKind`].

use crate::ring_buffer::RingBuffer;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Category of a console line, used by the UI for colouring and by the
/// console for picking the mirrored tracing level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsoleKind {
    Success,
    Error,
    Warning,
    Info,
    Debug,
    Controller,
}

impl ConsoleKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ConsoleKind::Success => "ok",
            ConsoleKind::Error => "error",
            ConsoleKind::Warning => "warn",
            ConsoleKind::Info => "info",
            ConsoleKind::Debug => "debug",
            ConsoleKind::Controller => "pad",
        }
    }
}

/// Sink for human-readable log lines. Implementations only append.
pub trait LogSink: Send + Sync {
    fn append_log_line(&self, kind: ConsoleKind, message: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleLine {
    pub timestamp: DateTime<Local>,
    pub kind: ConsoleKind,
    pub message: String,
}

impl fmt::Display for ConsoleLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] [{}] {}",
            self.timestamp.format("%H:%M:%S"),
            self.kind.tag(),
            self.message
        )
    }
}

/// Bounded console shared between the components that log into it.
#[derive(Debug)]
pub struct DebugConsole {
    lines: Mutex<RingBuffer<ConsoleLine>>,
}

impl DebugConsole {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(RingBuffer::new(capacity)),
        }
    }

    pub fn snapshot(&self) -> Vec<ConsoleLine> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .to_vec()
    }

    pub fn len(&self) -> usize {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        debug!("Debug console cleared");
    }
}

impl LogSink for DebugConsole {
    fn append_log_line(&self, kind: ConsoleKind, message: &str) {
        match kind {
            ConsoleKind::Error => error!(target: "console", "{}", message),
            ConsoleKind::Warning => warn!(target: "console", "{}", message),
            ConsoleKind::Debug | ConsoleKind::Controller => {
                debug!(target: "console", "{}", message)
            }
            ConsoleKind::Success | ConsoleKind::Info => info!(target: "console", "{}", message),
        }

        let line = ConsoleLine {
            timestamp: Local::now(),
            kind,
            message: message.to_string(),
        };
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line);
    }
}
