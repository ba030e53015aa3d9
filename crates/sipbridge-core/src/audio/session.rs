//! Platform audio-session collaborator
//!
//! Some platforms need their audio session reconfigured whenever the route
//! changes (voice-chat category, default-to-speaker, preferred sample rate and
//! IO buffer). The router calls the configurator after every successful
//! switch; failures are logged and never undo the switch.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::registry::RouteName;

/// Session mode derived from the route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioSessionMode {
    /// Play-and-record voice chat, Bluetooth allowed
    Voice,
    /// Same as `Voice`, defaulting to the loud speaker
    Speaker,
}

/// Requested platform audio-session configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSessionProfile {
    pub mode: AudioSessionMode,
    pub sample_rate: u32,
    pub io_buffer_ms: u32,
}

impl AudioSessionProfile {
    pub fn for_route(route: RouteName, sample_rate: u32, io_buffer_ms: u32) -> Self {
        let mode = match route {
            RouteName::Loudspeaker => AudioSessionMode::Speaker,
            RouteName::Phone | RouteName::Bluetooth => AudioSessionMode::Voice,
        };
        Self {
            mode,
            sample_rate,
            io_buffer_ms,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Audio session configuration failed: {0}")]
pub struct AudioSessionError(pub String);

/// Side-effecting hook invoked on route changes
pub trait AudioSessionConfigurator: Send + Sync + std::fmt::Debug {
    fn configure(&self, profile: &AudioSessionProfile) -> Result<(), AudioSessionError>;
}

/// Configurator for platforms without a separate audio session
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAudioSession;

impl AudioSessionConfigurator for NoopAudioSession {
    fn configure(&self, _profile: &AudioSessionProfile) -> Result<(), AudioSessionError> {
        Ok(())
    }
}
