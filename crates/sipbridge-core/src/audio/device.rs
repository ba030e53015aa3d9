//! Audio device description
//!
//! Devices are enumerated fresh by the engine on every scan. The identity of
//! an [`AudioDevice`] is only meaningful within the scan that produced it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Audio device category as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceCategory {
    Microphone,
    Earpiece,
    Speaker,
    Bluetooth,
    Other,
}

/// Capability set of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct AudioCapabilities {
    pub can_play: bool,
    pub can_record: bool,
}

impl AudioCapabilities {
    pub const PLAY: Self = Self { can_play: true, can_record: false };
    pub const RECORD: Self = Self { can_play: false, can_record: true };
    pub const PLAY_RECORD: Self = Self { can_play: true, can_record: true };
}

/// Audio device information
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioDevice {
    /// Engine identifier, valid for the lifetime of one scan
    pub id: String,
    /// Human-readable device name
    pub name: String,
    pub category: DeviceCategory,
    pub capabilities: AudioCapabilities,
}

impl AudioDevice {
    /// Create a new audio device
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: DeviceCategory,
        capabilities: AudioCapabilities,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            capabilities,
        }
    }

    pub fn can_play(&self) -> bool {
        self.capabilities.can_play
    }

    pub fn can_record(&self) -> bool {
        self.capabilities.can_record
    }

    pub fn is_bluetooth(&self) -> bool {
        self.category == DeviceCategory::Bluetooth
    }
}

impl fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, id {})", self.name, self.category, self.id)
    }
}
