//! The tracked call session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::call::state::{CallState, Transition};
use crate::engine::{EngineCallId, MediaDirection};

/// Unique identifier for a call session
pub type CallId = Uuid;

/// Direction of a call (from the local user's perspective)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

/// The single call the coordinator tracks
#[derive(Debug, Clone)]
pub struct CallSession {
    pub id: CallId,
    /// Engine handle the notifications refer to
    pub engine_call: EngineCallId,
    pub remote_uri: String,
    pub direction: CallDirection,
    state: CallState,
    /// Video flag as requested locally (the negotiated one lives in the engine)
    pub video_enabled: bool,
    pub media_direction: MediaDirection,
    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    history: Vec<CallState>,
}

impl CallSession {
    /// Session for an INVITE we just sent
    pub fn outgoing(engine_call: EngineCallId, remote_uri: impl Into<String>, video_enabled: bool) -> Self {
        Self::new(engine_call, remote_uri.into(), CallDirection::Outgoing, CallState::OutgoingInit, video_enabled)
    }

    /// Session for an INVITE the engine received
    pub fn incoming(engine_call: EngineCallId, remote_uri: impl Into<String>) -> Self {
        Self::new(engine_call, remote_uri.into(), CallDirection::Incoming, CallState::IncomingReceived, false)
    }

    fn new(
        engine_call: EngineCallId,
        remote_uri: String,
        direction: CallDirection,
        state: CallState,
        video_enabled: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            engine_call,
            remote_uri,
            direction,
            state,
            video_enabled,
            media_direction: MediaDirection::SendRecv,
            created_at: Utc::now(),
            connected_at: None,
            ended_at: None,
            history: vec![CallState::Idle, state],
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    /// States visited so far, starting with `Idle`
    pub fn history(&self) -> &[CallState] {
        &self.history
    }

    /// Feed an engine-reported state through the transition table
    pub fn apply(&mut self, next: CallState) -> Transition {
        let transition = self.state.transition(next);
        if let Transition::Applied { to, .. } = transition {
            self.state = to;
            self.history.push(to);
            match to {
                CallState::Connected if self.connected_at.is_none() => self.connected_at = Some(Utc::now()),
                CallState::Released => self.ended_at = Some(Utc::now()),
                _ => {}
            }
        }
        transition
    }

    pub fn info(&self) -> CallInfo {
        CallInfo {
            call_id: self.id,
            remote_uri: self.remote_uri.clone(),
            direction: self.direction,
            state: self.state,
            video_enabled: self.video_enabled,
            created_at: self.created_at,
            connected_at: self.connected_at,
        }
    }
}

/// Read-only view of the active session handed to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallInfo {
    pub call_id: CallId,
    pub remote_uri: String,
    pub direction: CallDirection,
    pub state: CallState,
    pub video_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outgoing_session_starts_in_outgoing_init() {
        let session = CallSession::outgoing(EngineCallId(1), "sip:bob@example.com", true);
        assert_eq!(session.state(), CallState::OutgoingInit);
        assert_eq!(session.direction, CallDirection::Outgoing);
        assert_eq!(session.history(), &[CallState::Idle, CallState::OutgoingInit]);
    }

    #[test]
    fn test_apply_records_timestamps_and_history() {
        let mut session = CallSession::incoming(EngineCallId(7), "sip:alice@example.com");
        assert!(session.connected_at.is_none());

        assert!(matches!(session.apply(CallState::Connected), Transition::Applied { .. }));
        assert!(session.connected_at.is_some());

        assert_eq!(session.apply(CallState::Connected), Transition::Repeated(CallState::Connected));
        assert!(matches!(session.apply(CallState::OutgoingRinging), Transition::Rejected { .. }));
        assert_eq!(session.state(), CallState::Connected);

        session.apply(CallState::Released);
        assert!(session.ended_at.is_some());
        assert_eq!(
            session.history(),
            &[CallState::Idle, CallState::IncomingReceived, CallState::Connected, CallState::Released]
        );
    }
}
