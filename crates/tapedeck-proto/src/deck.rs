use serde::{Deserialize, Serialize};
use std::fmt;

use crate::tape::Tape;

/// Transient fault shown on the deck's name plate after a failed play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeckFault {
    /// The source is a DRM-restricted streaming host.
    DrmLocked,
    /// Anything else: the tape jammed.
    Snarled,
}

impl DeckFault {
    /// Classify a playback failure by the url that failed.
    pub fn classify(url: &str, drm_host_marker: &str) -> Self {
        if !drm_host_marker.is_empty() && url.contains(drm_host_marker) {
            Self::DrmLocked
        } else {
            Self::Snarled
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::DrmLocked => "DRM LOCKED",
            Self::Snarled => "SNARLED",
        }
    }
}

impl fmt::Display for DeckFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERR: {}", self.message())
    }
}

/// Mechanical state of the deck. Mutated only by the deck controller.
///
/// Invariants:
/// - `playing` implies a tape is loaded and the door is closed.
/// - an open door implies not playing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeckState {
    pub tape: Option<Tape>,
    pub door_open: bool,
    pub playing: bool,
    pub fault: Option<DeckFault>,
}

impl DeckState {
    pub fn has_tape(&self) -> bool {
        self.tape.is_some()
    }

    /// True when every deck invariant holds.
    pub fn is_consistent(&self) -> bool {
        !(self.playing && (self.door_open || self.tape.is_none()))
    }

    pub fn controls(&self) -> ControlState {
        ControlState {
            play_enabled: !self.door_open && self.tape.is_some(),
            stop_enabled: !(self.door_open && !self.playing),
            play_latched: self.playing,
            eject_latched: self.door_open,
        }
    }
}

/// Which transport buttons a surface should offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlState {
    pub play_enabled: bool,
    pub stop_enabled: bool,
    pub play_latched: bool,
    pub eject_latched: bool,
}

/// Render-ready view of the deck, published after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckSnapshot {
    pub tape: Option<Tape>,
    pub door_open: bool,
    pub playing: bool,
    pub fault: Option<String>,
    pub editor_open: bool,
    pub controls: ControlState,
}

impl DeckSnapshot {
    pub fn new(state: &DeckState, editor_open: bool) -> Self {
        Self {
            tape: state.tape.clone(),
            door_open: state.door_open,
            playing: state.playing,
            fault: state.fault.map(|f| f.to_string()),
            editor_open,
            controls: state.controls(),
        }
    }
}

impl Default for DeckSnapshot {
    fn default() -> Self {
        Self::new(&DeckState::default(), false)
    }
}

impl fmt::Display for DeckSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let door = if self.door_open { "OPEN" } else { "SHUT" };
        let transport = if self.playing { "PLAY" } else { "STOP" };
        write!(f, "[door {}] [{}] ", door, transport)?;
        match &self.tape {
            Some(tape) => write!(f, "{}", tape.title())?,
            None => write!(f, "NO TAPE INSERTED")?,
        }
        if let Some(fault) = &self.fault {
            write!(f, "  {}", fault)?;
        }
        if self.editor_open {
            write!(f, "  (editing new mixtape)")?;
        }
        Ok(())
    }
}
