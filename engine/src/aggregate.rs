//! Aggregate status reduction.
//!
//! Reduces the full session set to the single overall status shown to the
//! user. Pure and order-independent: `needs_input` outranks everything, so
//! the reduction short-circuits as soon as one is seen.

use std::collections::HashMap;

use crate::types::{AggregateStatus, Session, SessionState};

/// Computes the overall status across all sessions.
///
/// Priority order: any `needs_input` wins (a human is being asked to act),
/// then any `working`, then any `idle`. An empty session set yields
/// `not_running`.
#[must_use]
pub fn aggregate(sessions: &HashMap<String, Session>) -> AggregateStatus {
    let mut any_working = false;
    let mut any_idle = false;

    for session in sessions.values() {
        match session.status {
            SessionState::NeedsInput => return AggregateStatus::NeedsInput,
            SessionState::Working => any_working = true,
            SessionState::Idle => any_idle = true,
        }
    }

    if any_working {
        AggregateStatus::Working
    } else if any_idle {
        AggregateStatus::Idle
    } else {
        AggregateStatus::NotRunning
    }
}
