//! Search coordinator for find-in-page requests.
//!
//! Tracks the current search term per content surface to tell "start a new
//! search" apart from "advance to the next match". The DOM half of the
//! feature lives on the presentation side; this module only decides what to
//! ask it to do and reports progress through the log channel.

use crate::log_store::{LogChannel, LogStore};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::{AsRefStr, Display, EnumString};

/// Sender identity stamped on search-related log entries.
pub const FIND_SENDER: &str = "Find";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Display, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SearchDirection {
    Forward,
    Backward,
}

/// What the presentation layer should do with its page-search API.
/// `find_next: false` restarts from the top; `true` continues from the last
/// match in the requested direction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FindDirective {
    pub text: String,
    pub forward: bool,
    pub find_next: bool,
    pub match_case: bool,
}

#[derive(Debug, Default)]
struct SearchState {
    current_text: Option<String>,
    /// Becomes true on first use; the match-count listener for the surface
    /// is attached exactly once at that point.
    armed: bool,
}

pub struct SearchCoordinator {
    log: Arc<LogStore>,
    states: DashMap<String, SearchState>,
}

impl SearchCoordinator {
    pub fn new(log: Arc<LogStore>) -> Self {
        Self {
            log,
            states: DashMap::new(),
        }
    }

    /// Decide restart-vs-advance for a search request on one surface.
    ///
    /// Identical consecutive text advances; changed text (or a first search)
    /// restarts and becomes the surface's current term. A restart is
    /// announced through the log channel.
    pub fn execute(&self, surface: &str, text: &str, direction: SearchDirection) -> FindDirective {
        let mut state = self.states.entry(surface.to_string()).or_default();
        state.armed = true;

        let restart = state.current_text.as_deref() != Some(text);
        if restart {
            state.current_text = Some(text.to_string());
            self.log.append(
                FIND_SENDER,
                LogChannel::Info,
                format!("Starting search for {text}"),
            );
        }

        FindDirective {
            text: text.to_string(),
            forward: direction == SearchDirection::Forward,
            find_next: !restart,
            match_case: true,
        }
    }

    /// Report a match count coming back from the presentation layer. The
    /// requester learns about it through the same log channel the console
    /// observes, never synchronously.
    pub fn report_matches(&self, surface: &str, matches: u64) -> Option<crate::log_store::LogEntry> {
        let state = self.states.get(surface)?;
        let text = state.current_text.clone()?;
        drop(state);
        Some(self.log.append(
            FIND_SENDER,
            LogChannel::Info,
            format!("Found {matches} for {text}"),
        ))
    }

    /// Whether a surface has had its match listener attached.
    #[cfg(test)]
    fn is_armed(&self, surface: &str) -> bool {
        self.states
            .get(surface)
            .map(|state| state.armed)
            .unwrap_or(false)
    }
}
