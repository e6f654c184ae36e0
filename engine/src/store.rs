//! In-memory session store.
//!
//! Owns the engine's current session map and the previous per-session
//! statuses used for transition detection. The map is replaced wholesale
//! each cycle so readers always observe a consistent set; the store
//! performs no I/O.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::types::{Session, SessionState};

/// Mapping of session identifier to last-known status.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, Session>,
    previous_statuses: HashMap<String, SessionState>,
}

impl SessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the session map wholesale with a freshly scanned set.
    pub fn replace(&mut self, sessions: HashMap<String, Session>) {
        self.sessions = sessions;
    }

    /// Current sessions keyed by identifier.
    #[must_use]
    pub fn sessions(&self) -> &HashMap<String, Session> {
        &self.sessions
    }

    /// Per-session statuses as of the previous cycle.
    #[must_use]
    pub fn previous_statuses(&self) -> &HashMap<String, SessionState> {
        &self.previous_statuses
    }

    /// Snapshots the current statuses as the next cycle's "previous".
    ///
    /// Called once per cycle regardless of whether a transition fired, so
    /// each transition is reported at most once.
    pub fn remember(&mut self) {
        self.previous_statuses = self
            .sessions
            .iter()
            .map(|(id, session)| (id.clone(), session.status))
            .collect();
    }

    /// Evicts sessions whose `last_seen` is older than `timeout`.
    ///
    /// Returns the number of sessions removed. The scanner already refuses
    /// stale files, so this only fires for sessions that outlived their
    /// backing file between scans.
    pub fn prune_expired(&mut self, now: DateTime<Utc>, timeout: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(timeout).unwrap_or(chrono::TimeDelta::MAX);
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| now.signed_duration_since(session.last_seen) < cutoff);
        before - self.sessions.len()
    }

    /// Number of tracked sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns whether no sessions are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
