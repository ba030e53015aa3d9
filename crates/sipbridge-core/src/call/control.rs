//! Call Session operations
//!
//! [`CallController`] owns the optional [`CallSession`] and applies both user
//! commands and engine notifications to it. It never waits for the engine:
//! commands issue one request and return, and the resulting state changes
//! arrive later through [`on_call_state`](CallController::on_call_state).
//!
//! Engine failures are returned to the caller as-is. Nothing here retries;
//! retrying an INVITE or BYE on the user's behalf could double-invite or
//! double-terminate.

use tracing::{debug, info, warn};

use crate::call::dtmf::DtmfDigit;
use crate::call::session::{CallInfo, CallSession};
use crate::call::state::{CallState, Transition};
use crate::engine::{CallParams, DeclineReason, Engine, EngineCallId, EngineCallState, STATIC_PICTURE_CAMERA};
use crate::error::{BridgeError, BridgeResult};

/// Controller for the single tracked call
#[derive(Debug, Default)]
pub struct CallController {
    session: Option<CallSession>,
}

impl CallController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state, `Idle` when no session exists
    pub fn state(&self) -> CallState {
        self.session.as_ref().map_or(CallState::Idle, CallSession::state)
    }

    pub fn session(&self) -> Option<&CallSession> {
        self.session.as_ref()
    }

    pub fn info(&self) -> Option<CallInfo> {
        self.session.as_ref().map(CallSession::info)
    }

    /// True while the call is `Connected` or `StreamsRunning`
    pub fn has_active_call(&self) -> bool {
        self.session.as_ref().map_or(false, |s| s.state().is_connected())
    }

    /// Start an outgoing call
    ///
    /// The address is validated before the busy check; neither failure touches
    /// the engine or the existing session. Completion is reported through the
    /// notification stream.
    pub fn place_outgoing(
        &mut self,
        engine: &dyn Engine,
        uri: &str,
        params: CallParams,
        skip_static_camera: bool,
    ) -> BridgeResult<CallInfo> {
        let address = engine
            .parse_address(uri)
            .ok_or_else(|| BridgeError::invalid_address(uri))?;

        if let Some(session) = &self.session {
            return Err(BridgeError::SessionBusy { state: session.state() });
        }

        if params.video_enabled && skip_static_camera {
            select_camera(engine)?;
        }

        let engine_call = engine.invite(&address, &params)?;
        let mut session = CallSession::outgoing(engine_call, address.as_str(), params.video_enabled);
        session.media_direction = params.video_direction;

        info!(
            call_id = %session.id,
            engine_call = %engine_call,
            remote = %address,
            video = params.video_enabled,
            "Placed outgoing call"
        );
        let info = session.info();
        self.session = Some(session);
        Ok(info)
    }

    /// Accept the pending incoming call with the given parameters
    pub fn accept_incoming(&mut self, engine: &dyn Engine, params: CallParams) -> BridgeResult<()> {
        let session = match &mut self.session {
            Some(session) if session.state() == CallState::IncomingReceived => session,
            _ => return Err(BridgeError::NoIncomingCall),
        };

        engine.accept(session.engine_call, &params)?;
        session.video_enabled = params.video_enabled;
        session.media_direction = params.video_direction;

        info!(call_id = %session.id, remote = %session.remote_uri, "Accepted incoming call");
        Ok(())
    }

    /// Terminate the call; a no-op when there is none
    pub fn hangup(&mut self, engine: &dyn Engine) -> BridgeResult<()> {
        let Some(session) = &self.session else {
            debug!("Hangup requested with no call, nothing to do");
            return Ok(());
        };

        engine.terminate(session.engine_call)?;
        info!(call_id = %session.id, state = ?session.state(), "Requested call termination");
        Ok(())
    }

    /// Flip video based on the negotiated parameters and send an update
    ///
    /// Returns the video flag that was requested.
    pub fn toggle_video(&mut self, engine: &dyn Engine) -> BridgeResult<bool> {
        let session = self.session.as_mut().ok_or(BridgeError::NoActiveCall)?;
        if !session.state().is_connected() {
            return Err(BridgeError::InvalidCallState {
                expected: "Connected or StreamsRunning".to_string(),
                actual: session.state(),
            });
        }

        // The remote side may have changed what we asked for
        let negotiated = engine.negotiated_params(session.engine_call)?;
        let params = CallParams {
            video_enabled: !negotiated.video_enabled,
            ..negotiated
        };
        engine.update(session.engine_call, &params)?;
        session.video_enabled = params.video_enabled;

        info!(call_id = %session.id, video = params.video_enabled, "Requested video toggle");
        Ok(params.video_enabled)
    }

    pub fn send_dtmf(&self, engine: &dyn Engine, digit: DtmfDigit) -> BridgeResult<()> {
        let session = self.session.as_ref().ok_or(BridgeError::NoActiveCall)?;
        engine.send_dtmf(session.engine_call, digit)?;
        debug!(call_id = %session.id, digit = %digit, "Sent DTMF");
        Ok(())
    }

    /// Apply an engine call-state notification
    ///
    /// Returns the state to republish, or `None` when the notification does
    /// not concern the tracked session or breaks the transition table.
    pub fn on_call_state(
        &mut self,
        engine: &dyn Engine,
        call: EngineCallId,
        state: EngineCallState,
        remote_uri: Option<&str>,
    ) -> Option<CallState> {
        let Some(next) = CallState::from_engine(state) else {
            debug!(engine_call = %call, state = ?state, "Ignoring transitional engine call state");
            return None;
        };

        let session = match &mut self.session {
            None if next == CallState::IncomingReceived => {
                let session = CallSession::incoming(call, remote_uri.unwrap_or_default());
                info!(call_id = %session.id, remote = %session.remote_uri, "Incoming call");
                self.session = Some(session);
                return Some(next);
            }
            None => {
                debug!(engine_call = %call, state = ?next, "No tracked session, ignoring call state");
                return None;
            }
            Some(session) if session.engine_call != call => {
                if next == CallState::IncomingReceived {
                    info!(engine_call = %call, busy_with = %session.id, "Declining incoming call while busy");
                    if let Err(e) = engine.decline(call, DeclineReason::Busy) {
                        warn!(engine_call = %call, error = %e, "Failed to decline incoming call");
                    }
                } else {
                    debug!(engine_call = %call, state = ?next, "Ignoring state of untracked call");
                }
                return None;
            }
            Some(session) => session,
        };

        match session.apply(next) {
            Transition::Applied { from, to } => {
                debug!(call_id = %session.id, from = ?from, to = ?to, "Call state changed");
                if to.is_terminal() {
                    info!(call_id = %session.id, "Call released, session cleared");
                    self.session = None;
                }
                Some(to)
            }
            Transition::Repeated(state) => Some(state),
            Transition::Rejected { from, to } => {
                warn!(call_id = %session.id, from = ?from, to = ?to, "Dropping call state outside the transition table");
                None
            }
        }
    }

    /// Forget the session without touching the engine (engine teardown)
    pub fn clear(&mut self) {
        self.session = None;
    }
}

/// Pick the first real camera that is not already selected
fn select_camera(engine: &dyn Engine) -> BridgeResult<()> {
    let current = engine.video_device();
    let candidate = engine
        .video_devices()
        .into_iter()
        .find(|camera| Some(camera) != current.as_ref() && camera != STATIC_PICTURE_CAMERA);

    if let Some(camera) = candidate {
        engine.set_video_device(&camera)?;
        debug!(camera = %camera, "Selected camera");
    }
    Ok(())
}
