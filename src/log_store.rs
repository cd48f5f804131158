//! Paginated store of user-visible diagnostic entries.
//!
//! Entries are kept most-recent-first and never mutated after insertion; the
//! console surface pages through them with offset/count cursors. This is the
//! only path diagnostic information takes from the privileged process to the
//! console window, so callers must redact secrets before appending.

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// Severity channel of a log entry. Parsing is case-insensitive and
/// canonicalizes to the capitalized name; unrecognized values pass through
/// verbatim (the console renders them info-styled).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogChannel {
    Error,
    Warning,
    Success,
    Info,
    Debug,
    Other(String),
}

impl LogChannel {
    pub fn as_str(&self) -> &str {
        match self {
            LogChannel::Error => "Error",
            LogChannel::Warning => "Warning",
            LogChannel::Success => "Success",
            LogChannel::Info => "Info",
            LogChannel::Debug => "Debug",
            LogChannel::Other(s) => s,
        }
    }
}

impl From<String> for LogChannel {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "error" => LogChannel::Error,
            "warning" => LogChannel::Warning,
            "success" => LogChannel::Success,
            "info" => LogChannel::Info,
            "debug" => LogChannel::Debug,
            _ => LogChannel::Other(s),
        }
    }
}

impl From<&str> for LogChannel {
    fn from(s: &str) -> Self {
        LogChannel::from(s.to_string())
    }
}

impl From<LogChannel> for String {
    fn from(c: LogChannel) -> Self {
        c.as_str().to_string()
    }
}

impl std::fmt::Display for LogChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// A single diagnostic entry. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp_ms: i64,
    pub sender: String,
    pub channel: LogChannel,
    pub message: String,
}

/// One page of entries plus the full store size, so the console can build
/// pagination controls regardless of its cursor position.
#[derive(Debug, Clone, Serialize)]
pub struct LogPage {
    pub messages: Vec<LogEntry>,
    #[serde(rename = "totalCount")]
    pub total_count: usize,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

struct Inner {
    /// Most recent entry first.
    entries: Vec<LogEntry>,
    /// Insertion timestamps never go backwards, even if the wall clock does.
    last_timestamp_ms: i64,
}

/// Append-biased store of diagnostic entries, unbounded in memory and cleared
/// only by process restart.
pub struct LogStore {
    inner: Mutex<Inner>,
}

impl LogStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: Vec::new(),
                last_timestamp_ms: 0,
            }),
        }
    }

    /// Insert an entry at the front. Always succeeds; returns the stored
    /// entry so callers can forward it as a push event.
    pub fn append(
        &self,
        sender: &str,
        channel: LogChannel,
        message: impl Into<String>,
    ) -> LogEntry {
        let mut inner = self.inner.lock();
        let timestamp_ms = Utc::now().timestamp_millis().max(inner.last_timestamp_ms);
        inner.last_timestamp_ms = timestamp_ms;
        let entry = LogEntry {
            timestamp_ms,
            sender: sender.to_string(),
            channel,
            message: message.into(),
        };
        inner.entries.insert(0, entry.clone());
        entry
    }

    /// Read up to `count` entries starting at `offset`, most-recent-first.
    /// Out-of-range offsets yield an empty page, not an error.
    pub fn read(&self, offset: usize, count: usize) -> LogPage {
        let inner = self.inner.lock();
        let total_count = inner.entries.len();
        let messages = if offset >= total_count {
            Vec::new()
        } else {
            let end = offset.saturating_add(count).min(total_count);
            inner.entries[offset..end].to_vec()
        };
        LogPage {
            messages,
            total_count,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new()
    }
}
