//! Audio Router
//!
//! Applies a named route to the engine using the representatives of the last
//! device scan. Route availability is racy (headsets come and go while the
//! user taps a button), so asking for a route that the last scan did not
//! report is a soft failure: `Ok(false)`, nothing touched.
//!
//! After a switch the registry is re-scanned and the resulting `current`
//! route is whatever the engine reports, not what was requested.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audio::device::AudioDevice;
use crate::audio::registry::{DeviceRegistry, RouteName};
use crate::audio::session::{AudioSessionConfigurator, AudioSessionProfile};
use crate::engine::Engine;
use crate::error::{BridgeError, BridgeResult};

/// Selects and applies audio routes
#[derive(Debug, Clone)]
pub struct AudioRouter {
    session: Arc<dyn AudioSessionConfigurator>,
    sample_rate: u32,
    io_buffer_ms: u32,
}

impl AudioRouter {
    pub fn new(session: Arc<dyn AudioSessionConfigurator>, sample_rate: u32, io_buffer_ms: u32) -> Self {
        Self {
            session,
            sample_rate,
            io_buffer_ms,
        }
    }

    /// Switch to `route`, returning whether the switch was applied
    ///
    /// Scans first when the registry holds no snapshot yet. Engine setter
    /// failures are surfaced as [`BridgeError::EngineRejected`].
    pub fn switch_to(
        &self,
        engine: Option<&dyn Engine>,
        registry: &mut DeviceRegistry,
        route: RouteName,
    ) -> BridgeResult<bool> {
        let engine = engine.ok_or(BridgeError::EngineUnavailable)?;

        let snapshot = match registry.snapshot() {
            Some(snapshot) => snapshot.clone(),
            None => match registry.scan(Some(engine)) {
                Ok(snapshot) => snapshot,
                Err(BridgeError::NoAudioRoute) => {
                    info!(route = %route, "No audio route available, switch ignored");
                    return Ok(false);
                }
                Err(e) => return Err(e),
            },
        };

        if !snapshot.options.is_available(route) {
            info!(route = %route, options = ?snapshot.options, "Requested audio route is not available");
            return Ok(false);
        }

        let reps = &snapshot.representatives;
        let (input, output): (Option<AudioDevice>, Option<AudioDevice>) = match route {
            RouteName::Phone => (
                reps.microphone.clone(),
                reps.earpiece.clone().or_else(|| engine.default_output_device()),
            ),
            RouteName::Bluetooth => (
                reps.bluetooth_mic.clone().or_else(|| reps.microphone.clone()),
                reps.bluetooth_speaker.clone(),
            ),
            RouteName::Loudspeaker => (
                reps.loud_mic.clone().or_else(|| reps.microphone.clone()),
                reps.loud_speaker.clone(),
            ),
        };

        if let Some(device) = &input {
            debug!(device = %device, "Setting input audio device");
            engine.set_input_device(device)?;
        }
        if let Some(device) = &output {
            debug!(device = %device, "Setting output audio device");
            engine.set_output_device(device)?;
        }

        let profile = AudioSessionProfile::for_route(route, self.sample_rate, self.io_buffer_ms);
        if let Err(e) = self.session.configure(&profile) {
            warn!(route = %route, error = %e, "Audio session configuration failed");
        }

        let after = registry.scan(Some(engine))?;
        if after.current != route {
            info!(requested = %route, current = %after.current, "Engine settled on a different route");
        } else {
            info!(route = %route, "Audio route switched");
        }
        Ok(true)
    }
}
