//! Per-session state transition detection.
//!
//! Compares the previous cycle's statuses against the new snapshot and
//! decides which notification sound, if any, to request. Pure: the caller
//! owns both maps and replaces the previous snapshot every cycle.

use std::collections::HashMap;

use crate::types::{Session, SessionState};

/// Which sound a cycle should request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundKind {
    /// A session finished working and went idle.
    Idle,
    /// A session finished working and is waiting on the user.
    NeedsInput,
}

/// Notification triggers produced by one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transitions {
    /// A `working -> idle` transition was observed.
    pub play_idle_sound: bool,

    /// A `working -> needs_input` transition was observed.
    pub play_needs_input_sound: bool,
}

impl Transitions {
    /// Resolves the single sound to request for this cycle.
    ///
    /// When both triggers fired from different sessions in the same cycle,
    /// `needs_input` takes priority.
    #[must_use]
    pub fn sound(&self) -> Option<SoundKind> {
        if self.play_needs_input_sound {
            Some(SoundKind::NeedsInput)
        } else if self.play_idle_sound {
            Some(SoundKind::Idle)
        } else {
            None
        }
    }
}

/// Detects notification-worthy transitions between two cycles.
///
/// A trigger fires only on a transition away from `working`. Sessions with
/// no entry in `previous` (newly appeared) never trigger, regardless of
/// their state.
#[must_use]
pub fn detect(
    previous: &HashMap<String, SessionState>,
    current: &HashMap<String, Session>,
) -> Transitions {
    let mut transitions = Transitions::default();

    for (id, session) in current {
        let Some(&prior) = previous.get(id) else {
            continue;
        };
        if prior != SessionState::Working {
            continue;
        }

        match session.status {
            SessionState::Idle => transitions.play_idle_sound = true,
            SessionState::NeedsInput => transitions.play_needs_input_sound = true,
            SessionState::Working => {}
        }
    }

    transitions
}
