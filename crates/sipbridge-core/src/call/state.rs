//! Call state machine
//!
//! ```text
//! Idle ─▶ OutgoingInit ─▶ OutgoingProgress ─▶ OutgoingRinging ─▶ Connected
//!   │          └──────────────────┴──────────────────┴──────────────▲ │
//!   └─▶ IncomingReceived ────────────────────────────────────────────┘ │
//!                                                                     ▼
//!              StreamsRunning ⇄ { Paused, PausedByRemote, Updating, UpdatedByRemote }
//!
//! any state ─▶ Error ─▶ Released ─▶ Idle        any active state ─▶ Released
//! ```
//!
//! The engine may report the same state more than once (`StreamsRunning`
//! after every re-INVITE); a repeat is accepted without changing the model.

use serde::{Deserialize, Serialize};

use crate::engine::EngineCallState;

/// State of the tracked call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    Idle,
    IncomingReceived,
    OutgoingInit,
    OutgoingProgress,
    OutgoingRinging,
    Connected,
    StreamsRunning,
    Paused,
    PausedByRemote,
    Updating,
    UpdatedByRemote,
    Error,
    Released,
}

/// Outcome of feeding one state into the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied { from: CallState, to: CallState },
    Repeated(CallState),
    Rejected { from: CallState, to: CallState },
}

impl CallState {
    /// Map an engine state onto the tracked states
    ///
    /// Transitional engine states (early media, pausing, resuming, referred,
    /// end) have no counterpart and yield `None`.
    pub fn from_engine(state: EngineCallState) -> Option<Self> {
        match state {
            EngineCallState::IncomingReceived => Some(CallState::IncomingReceived),
            EngineCallState::OutgoingInit => Some(CallState::OutgoingInit),
            EngineCallState::OutgoingProgress => Some(CallState::OutgoingProgress),
            EngineCallState::OutgoingRinging => Some(CallState::OutgoingRinging),
            EngineCallState::Connected => Some(CallState::Connected),
            EngineCallState::StreamsRunning => Some(CallState::StreamsRunning),
            EngineCallState::Paused => Some(CallState::Paused),
            EngineCallState::PausedByRemote => Some(CallState::PausedByRemote),
            EngineCallState::Updating => Some(CallState::Updating),
            EngineCallState::UpdatedByRemote => Some(CallState::UpdatedByRemote),
            EngineCallState::Error => Some(CallState::Error),
            EngineCallState::Released => Some(CallState::Released),
            EngineCallState::Idle
            | EngineCallState::IncomingEarlyMedia
            | EngineCallState::OutgoingEarlyMedia
            | EngineCallState::Pausing
            | EngineCallState::Resuming
            | EngineCallState::EarlyUpdating
            | EngineCallState::EarlyUpdatedByRemote
            | EngineCallState::Referred
            | EngineCallState::End => None,
        }
    }

    /// `Released` ends the session
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Released)
    }

    /// Connected with media set up (the only states `hasActiveCall` reports)
    pub fn is_connected(&self) -> bool {
        matches!(self, CallState::Connected | CallState::StreamsRunning)
    }

    /// Established dialog: connected, streaming, paused or updating
    pub fn is_established(&self) -> bool {
        matches!(
            self,
            CallState::Connected
                | CallState::StreamsRunning
                | CallState::Paused
                | CallState::PausedByRemote
                | CallState::Updating
                | CallState::UpdatedByRemote
        )
    }

    fn is_midcall(&self) -> bool {
        matches!(
            self,
            CallState::StreamsRunning
                | CallState::Paused
                | CallState::PausedByRemote
                | CallState::Updating
                | CallState::UpdatedByRemote
        )
    }

    /// Whether the table has an edge `self -> next`
    pub fn can_transition_to(&self, next: CallState) -> bool {
        use CallState::*;

        match (*self, next) {
            (Released, Idle) => true,
            (Idle, OutgoingInit) | (Idle, IncomingReceived) => true,
            (Error, Released) => true,
            (Released, _) | (Idle, _) => false,
            (_, Error) | (_, Released) => true,
            (OutgoingInit, OutgoingProgress | OutgoingRinging | Connected) => true,
            (OutgoingProgress, OutgoingRinging | Connected) => true,
            (OutgoingRinging, Connected) => true,
            (IncomingReceived, Connected) => true,
            (Connected, to) => to.is_midcall(),
            (from, to) => from.is_midcall() && to.is_midcall(),
        }
    }

    /// Apply the transition table to `next`
    pub fn transition(&self, next: CallState) -> Transition {
        if *self == next {
            Transition::Repeated(next)
        } else if self.can_transition_to(next) {
            Transition::Applied { from: *self, to: next }
        } else {
            Transition::Rejected { from: *self, to: next }
        }
    }
}
