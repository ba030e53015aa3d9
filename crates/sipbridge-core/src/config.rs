//! Bridge configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::{MediaDirection, MediaEncryption, Transport};
use crate::error::{BridgeError, BridgeResult};
use crate::logging::{self, LoggingConfig};

/// Longest accepted device-change debounce
pub const MAX_DEVICE_CHANGE_DEBOUNCE_MS: u64 = 60_000;

/// Echo cancellation policy applied at engine start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EchoCancellation {
    /// Software cancellation only when the engine has no built-in canceller
    #[default]
    Auto,
    Software,
    Disabled,
}

impl EchoCancellation {
    /// Whether to turn on the engine's software canceller
    pub fn software_enabled(&self, has_builtin: bool) -> bool {
        match self {
            EchoCancellation::Auto => !has_builtin,
            EchoCancellation::Software => true,
            EchoCancellation::Disabled => false,
        }
    }
}

/// Video preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Offer video on outgoing calls
    pub enable_on_outgoing: bool,
    /// Video direction used when accepting a call
    pub accept_direction: MediaDirection,
    pub auto_accept_remote_video: bool,
    pub keep_preview_ratio: bool,
    /// Never pick the engine's static-picture camera for a call
    pub skip_static_camera: bool,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            enable_on_outgoing: true,
            accept_direction: MediaDirection::SendRecv,
            auto_accept_remote_video: true,
            keep_preview_ratio: true,
            skip_static_camera: true,
        }
    }
}

/// Audio preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Quiet period before a burst of device-list updates triggers one rescan
    pub device_change_debounce_ms: u64,
    /// Passed to the platform audio session on route changes
    pub preferred_sample_rate: u32,
    pub io_buffer_ms: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device_change_debounce_ms: 250,
            preferred_sample_rate: 48_000,
            io_buffer_ms: 20,
        }
    }
}

impl AudioConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.device_change_debounce_ms)
    }
}

/// Configuration for the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub transport: Transport,
    pub media_encryption: MediaEncryption,
    pub echo_cancellation: EchoCancellation,
    pub video: VideoConfig,
    pub audio: AudioConfig,
    pub logging: LoggingConfig,
    /// Capacity of the command channel into the coordinator
    pub command_buffer: usize,
    /// Capacity of the broadcast event channel
    pub event_buffer: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            transport: Transport::Tcp,
            media_encryption: MediaEncryption::None,
            echo_cancellation: EchoCancellation::Auto,
            video: VideoConfig::default(),
            audio: AudioConfig::default(),
            logging: LoggingConfig::default(),
            command_buffer: 64,
            event_buffer: 256,
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> BridgeResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BridgeError::invalid_configuration("json", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_media_encryption(mut self, encryption: MediaEncryption) -> Self {
        self.media_encryption = encryption;
        self
    }

    pub fn with_echo_cancellation(mut self, policy: EchoCancellation) -> Self {
        self.echo_cancellation = policy;
        self
    }

    pub fn with_video(mut self, video: VideoConfig) -> Self {
        self.video = video;
        self
    }

    pub fn with_audio(mut self, audio: AudioConfig) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_device_change_debounce(mut self, debounce: Duration) -> Self {
        self.audio.device_change_debounce_ms = u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    pub fn with_command_buffer(mut self, capacity: usize) -> Self {
        self.command_buffer = capacity;
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.command_buffer == 0 {
            return Err(BridgeError::invalid_configuration("command_buffer", "must be greater than zero"));
        }
        if self.event_buffer == 0 {
            return Err(BridgeError::invalid_configuration("event_buffer", "must be greater than zero"));
        }
        if self.audio.preferred_sample_rate == 0 {
            return Err(BridgeError::invalid_configuration(
                "audio.preferred_sample_rate",
                "must be greater than zero",
            ));
        }
        if self.audio.device_change_debounce_ms > MAX_DEVICE_CHANGE_DEBOUNCE_MS {
            return Err(BridgeError::invalid_configuration(
                "audio.device_change_debounce_ms",
                format!("must be at most {}", MAX_DEVICE_CHANGE_DEBOUNCE_MS),
            ));
        }
        self.logging.validate()
    }

    /// Install the global tracing subscriber from the `logging` section
    pub fn init_logging(&self) -> BridgeResult<()> {
        logging::setup_logging(&self.logging)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.transport, Transport::Tcp);
        assert_eq!(config.media_encryption, MediaEncryption::None);
        assert_eq!(config.audio.debounce(), Duration::from_millis(250));
        assert!(config.video.skip_static_camera);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = BridgeConfig::from_json_str(
            r#"{"transport":"tls","audio":{"io_buffer_ms":10},"echo_cancellation":"disabled"}"#,
        )
        .unwrap();
        assert_eq!(config.transport, Transport::Tls);
        assert_eq!(config.audio.io_buffer_ms, 10);
        assert_eq!(config.audio.preferred_sample_rate, 48_000);
        assert_eq!(config.echo_cancellation, EchoCancellation::Disabled);
    }

    #[test]
    fn test_validation() {
        let err = BridgeConfig::new().with_command_buffer(0).validate().unwrap_err();
        assert!(matches!(err, BridgeError::InvalidConfiguration { ref field, .. } if field == "command_buffer"));

        assert!(BridgeConfig::from_json_str(r#"{"event_buffer":0}"#).is_err());
        assert!(BridgeConfig::from_json_str(r#"{"logging":{"level":"chatty"}}"#).is_err());
        assert!(BridgeConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_debounce_is_bounded() {
        let err = BridgeConfig::from_json_str(r#"{"audio":{"device_change_debounce_ms":18446744073709551615}}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::InvalidConfiguration { ref field, .. } if field == "audio.device_change_debounce_ms"
        ));

        let config = BridgeConfig::new().with_device_change_debounce(Duration::from_millis(MAX_DEVICE_CHANGE_DEBOUNCE_MS));
        assert!(config.validate().is_ok());
        let config = BridgeConfig::new().with_device_change_debounce(Duration::MAX);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_echo_cancellation_policy() {
        assert!(EchoCancellation::Auto.software_enabled(false));
        assert!(!EchoCancellation::Auto.software_enabled(true));
        assert!(EchoCancellation::Software.software_enabled(true));
        assert!(!EchoCancellation::Disabled.software_enabled(false));
    }
}
