//! Core types for VibeStatus session tracking.
//!
//! This module defines the session and aggregate status model shared by the
//! scanner, aggregator, and engine. All enums serialize to snake_case JSON.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State reported by a single worker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// The worker is actively processing.
    Working,
    /// The worker finished and is waiting for nothing.
    Idle,
    /// The worker is blocked on a human response.
    NeedsInput,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Working => write!(f, "working"),
            Self::Idle => write!(f, "idle"),
            Self::NeedsInput => write!(f, "needs_input"),
        }
    }
}

/// Overall status derived from all live sessions.
///
/// `NotRunning` holds only when the session set is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateStatus {
    Working,
    Idle,
    NeedsInput,
    NotRunning,
}

impl std::fmt::Display for AggregateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Working => write!(f, "working"),
            Self::Idle => write!(f, "idle"),
            Self::NeedsInput => write!(f, "needs_input"),
            Self::NotRunning => write!(f, "not_running"),
        }
    }
}

/// One tracked worker session.
///
/// Identity is the backing status file's name, stable across polls for as
/// long as the file exists under that name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier (the status file name).
    pub id: String,

    /// Current state reported by the session.
    pub status: SessionState,

    /// Display label for the project the session belongs to.
    pub project: String,

    /// Timestamp used for expiry.
    #[serde(rename = "lastSeen")]
    pub last_seen: DateTime<Utc>,
}

/// A published view of the engine's state after one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Overall status across all sessions.
    pub aggregate: AggregateStatus,

    /// Sessions sorted by project, ties broken by id.
    pub sessions: Vec<Session>,

    /// Number of live sessions.
    #[serde(rename = "activeSessionCount")]
    pub active_session_count: usize,
}

impl StatusSnapshot {
    /// Builds a snapshot from a session map and a precomputed aggregate.
    ///
    /// Sessions are sorted ascending by `project` (case-sensitive ordinal),
    /// ties broken by `id`, for deterministic display.
    #[must_use]
    pub fn new(aggregate: AggregateStatus, sessions: &HashMap<String, Session>) -> Self {
        let mut sorted: Vec<Session> = sessions.values().cloned().collect();
        sorted.sort_by(|a, b| a.project.cmp(&b.project).then_with(|| a.id.cmp(&b.id)));

        Self {
            aggregate,
            active_session_count: sorted.len(),
            sessions: sorted,
        }
    }
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            aggregate: AggregateStatus::NotRunning,
            sessions: Vec::new(),
            active_session_count: 0,
        }
    }
}
