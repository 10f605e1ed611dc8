//! Protocol trace sinks
//!
//! Sessions and host systems report every line they send or receive,
//! plus a few lifecycle notes, to a [`Monitor`]. Sent lines are prefixed
//! with `-> `, received lines with `<- `.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Observer of the protocol conversation.
pub trait Monitor: Send + Sync {
    fn note(&self, text: &str);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMonitor;

impl Monitor for NullMonitor {
    fn note(&self, _text: &str) {}
}

/// Forwards notes to `tracing` at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMonitor;

impl Monitor for TracingMonitor {
    fn note(&self, text: &str) {
        debug!(target: "imap_script_harness::monitor", "{}", text);
    }
}

/// A single recorded note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub at: DateTime<Utc>,
    pub text: String,
}

/// Records notes in the order they were made.
///
/// Clones share the same log, so a test can keep one clone and hand
/// another to the host system.
///
/// ```
/// use imap_script_harness::{Monitor, Transcript};
///
/// let transcript = Transcript::new();
/// transcript.note("-> a1 NOOP");
/// transcript.note("<- a1 OK NOOP completed");
/// assert_eq!(transcript.lines(), vec!["-> a1 NOOP", "<- a1 OK NOOP completed"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Arc<Mutex<Vec<TranscriptEntry>>>,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry recorded so far.
    #[must_use]
    pub fn entries(&self) -> Vec<TranscriptEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The recorded texts, without timestamps.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.text.clone())
            .collect()
    }

    /// Render the transcript as a JSON array, for attaching to a
    /// failure report.
    #[must_use]
    pub fn to_json(&self) -> String {
        // Serializing plain strings and timestamps cannot fail.
        serde_json::to_string_pretty(&self.entries()).unwrap_or_default()
    }
}

impl Monitor for Transcript {
    fn note(&self, text: &str) {
        // A test that panicked mid-note must not hide later lines.
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(TranscriptEntry {
                at: Utc::now(),
                text: text.to_string(),
            });
    }
}
