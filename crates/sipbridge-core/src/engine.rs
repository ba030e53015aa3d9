//! Native SIP engine capability
//!
//! The engine (registration transport, media, codecs) is an external
//! collaborator. This module fixes the boundary the coordinator talks through:
//!
//! ```text
//! ┌──────────────────────┐   commands (sync)    ┌──────────────────────┐
//! │  Session Coordinator │ ───────────────────▶ │     dyn Engine       │
//! │   (single actor)     │                      │  (native SIP stack)  │
//! │                      │ ◀─────────────────── │                      │
//! └──────────────────────┘  NotificationSink    └──────────────────────┘
//!                           (any thread)
//! ```
//!
//! Engine calls are plain synchronous setters; completion of anything that
//! involves the network is reported later through the [`NotificationSink`] the
//! engine receives in [`Engine::start`]. Whether the native stack polls, calls
//! back, or pushes is hidden behind the sink.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

use crate::audio::device::AudioDevice;
use crate::call::dtmf::DtmfDigit;
use crate::video::{StaticImageSource, VideoSurfaceHandle};

/// Error reported by the engine for a rejected call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{detail}")]
pub struct EngineError {
    pub detail: String,
}

impl EngineError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self { detail: detail.into() }
    }
}

/// Result type for engine calls
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine-side handle of one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineCallId(pub u64);

impl fmt::Display for EngineCallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine-call-{}", self.0)
    }
}

/// Engine-side handle of one registered account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineAccountId(pub u64);

impl fmt::Display for EngineAccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine-account-{}", self.0)
    }
}

/// Raw call states as the engine reports them
///
/// This is a superset of [`CallState`](crate::call::CallState); the extra
/// transitional states are not tracked by the session model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineCallState {
    Idle,
    IncomingReceived,
    IncomingEarlyMedia,
    OutgoingInit,
    OutgoingProgress,
    OutgoingRinging,
    OutgoingEarlyMedia,
    Connected,
    StreamsRunning,
    Pausing,
    Paused,
    Resuming,
    PausedByRemote,
    Updating,
    UpdatedByRemote,
    EarlyUpdating,
    EarlyUpdatedByRemote,
    Referred,
    Error,
    End,
    Released,
}

/// Raw registration states as the engine reports them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineRegistrationState {
    None,
    Progress,
    Ok,
    Cleared,
    Failed,
}

/// Notification emitted by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineNotification {
    /// A call changed state
    CallStateChanged {
        call: EngineCallId,
        state: EngineCallState,
        /// Remote party, present at least on `IncomingReceived`
        remote_uri: Option<String>,
        message: String,
    },
    /// An account changed registration state
    RegistrationStateChanged {
        /// Handle returned by [`Engine::register`] for that account
        account: EngineAccountId,
        state: EngineRegistrationState,
        message: String,
    },
    /// The set of audio devices changed (plug events, Bluetooth)
    AudioDevicesListUpdated,
}

/// Sending half handed to the engine for its notifications
///
/// Cheap to clone and callable from any thread; notifications are queued in
/// emission order for the coordinator.
#[derive(Debug, Clone)]
pub struct NotificationSink {
    tx: mpsc::UnboundedSender<EngineNotification>,
}

impl NotificationSink {
    /// Create a sink and the receiver the coordinator drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a notification. Returns false once the coordinator has stopped.
    pub fn notify(&self, notification: EngineNotification) -> bool {
        self.tx.send(notification).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// SIP transport used for registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Udp,
    #[default]
    Tcp,
    Tls,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Udp => "udp",
            Transport::Tcp => "tcp",
            Transport::Tls => "tls",
        }
    }
}

/// Media encryption requested for a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaEncryption {
    #[default]
    None,
    Srtp,
    Zrtp,
    Dtls,
}

/// Media direction for a stream (SDP `a=` direction)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaDirection {
    #[default]
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

/// Parameters of a call, as requested or as negotiated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CallParams {
    pub video_enabled: bool,
    pub video_direction: MediaDirection,
    pub media_encryption: MediaEncryption,
}

/// Reason given when declining an incoming call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeclineReason {
    Busy,
    Declined,
}

/// A SIP address accepted by the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SipAddress {
    uri: Url,
}

impl SipAddress {
    /// Parse `sip:` / `sips:` URIs of the form `scheme:user@host[;params]`
    pub fn parse(raw: &str) -> Option<Self> {
        let uri = Url::parse(raw.trim()).ok()?;
        if uri.scheme() != "sip" && uri.scheme() != "sips" {
            return None;
        }

        // `sip:` is not a special scheme, so user@host ends up in the path
        let target = uri.path().split(';').next().unwrap_or_default();
        let (user, host) = target.split_once('@').unwrap_or(("", target));
        if host.is_empty() || host.contains('@') || user.contains(char::is_whitespace) {
            return None;
        }
        Some(Self { uri })
    }

    pub fn as_str(&self) -> &str {
        self.uri.as_str()
    }

    /// Host part (`example.com` for `sip:bob@example.com;transport=tcp`)
    pub fn host(&self) -> &str {
        let target = self.uri.path().split(';').next().unwrap_or_default();
        target.rsplit('@').next().unwrap_or(target)
    }
}

impl fmt::Display for SipAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the engine needs to create and register the account
#[derive(Clone, PartialEq, Eq)]
pub struct AccountParams {
    /// `sip:user@domain`
    pub identity: String,
    /// `sip:domain;transport=tcp`
    pub server_address: String,
    pub username: String,
    pub password: String,
    pub domain: String,
    pub transport: Transport,
    pub register_enabled: bool,
    pub keep_preview_ratio: bool,
}

impl fmt::Debug for AccountParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountParams")
            .field("identity", &self.identity)
            .field("server_address", &self.server_address)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .field("transport", &self.transport)
            .field("register_enabled", &self.register_enabled)
            .finish()
    }
}

/// Name the engine gives its static-picture pseudo camera
pub const STATIC_PICTURE_CAMERA: &str = "StaticImage: Static picture";

/// Engine capability consumed by the coordinator
///
/// Implementations wrap a native SIP/media stack. Every method is a
/// non-blocking request; outcomes that depend on the network arrive later as
/// [`EngineNotification`]s through the sink given to [`start`](Engine::start).
/// The coordinator only calls these methods from its own task, one at a time.
pub trait Engine: Send + Sync + fmt::Debug {
    // ===== LIFECYCLE =====

    /// Start the engine and attach the notification sink
    fn start(&self, sink: NotificationSink) -> EngineResult<()>;

    /// Stop the engine; no notifications are expected afterwards
    fn stop(&self) -> EngineResult<()>;

    fn has_builtin_echo_canceller(&self) -> bool;

    fn set_echo_cancellation(&self, enabled: bool) -> EngineResult<()>;

    // ===== ACCOUNTS =====

    /// Create the account and start registering it
    ///
    /// Every later registration notification for this account carries the
    /// returned handle.
    fn register(&self, params: &AccountParams) -> EngineResult<EngineAccountId>;

    /// Remove all accounts and authentication info
    fn clear_accounts(&self) -> EngineResult<()>;

    // ===== CALLS =====

    /// Parse a remote address the way the engine would
    fn parse_address(&self, raw: &str) -> Option<SipAddress> {
        SipAddress::parse(raw)
    }

    fn invite(&self, address: &SipAddress, params: &CallParams) -> EngineResult<EngineCallId>;

    fn accept(&self, call: EngineCallId, params: &CallParams) -> EngineResult<()>;

    fn decline(&self, call: EngineCallId, reason: DeclineReason) -> EngineResult<()>;

    fn terminate(&self, call: EngineCallId) -> EngineResult<()>;

    /// Send a re-INVITE with new parameters
    fn update(&self, call: EngineCallId, params: &CallParams) -> EngineResult<()>;

    /// Parameters in effect after offer/answer, which may differ from the request
    fn negotiated_params(&self, call: EngineCallId) -> EngineResult<CallParams>;

    fn send_dtmf(&self, call: EngineCallId, digit: DtmfDigit) -> EngineResult<()>;

    // ===== MICROPHONE =====

    fn mic_enabled(&self) -> bool;

    fn set_mic_enabled(&self, enabled: bool) -> EngineResult<()>;

    // ===== AUDIO DEVICES =====

    /// Enumerate devices in engine order
    fn audio_devices(&self) -> EngineResult<Vec<AudioDevice>>;

    fn input_device(&self) -> Option<AudioDevice>;

    fn output_device(&self) -> Option<AudioDevice>;

    fn default_output_device(&self) -> Option<AudioDevice>;

    fn set_input_device(&self, device: &AudioDevice) -> EngineResult<()>;

    fn set_output_device(&self, device: &AudioDevice) -> EngineResult<()>;

    // ===== VIDEO =====

    fn video_devices(&self) -> Vec<String>;

    fn video_device(&self) -> Option<String>;

    fn set_video_device(&self, device: &str) -> EngineResult<()>;

    fn set_native_video_window(&self, handle: VideoSurfaceHandle) -> EngineResult<()>;

    /// Enable capture/display and the remote-video auto-accept policy
    fn enable_video(&self, capture: bool, display: bool, auto_accept: bool) -> EngineResult<()>;

    /// Use a still picture as the video source, or go back to the camera
    fn set_static_image(&self, source: Option<&StaticImageSource>) -> EngineResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sip_address_parsing() {
        let addr = SipAddress::parse("sip:bob@example.com").expect("valid address");
        assert_eq!(addr.host(), "example.com");

        let addr = SipAddress::parse("sips:alice@pbx.example.org;transport=tls").expect("valid address");
        assert_eq!(addr.host(), "pbx.example.org");

        assert!(SipAddress::parse("sip:example.com").is_some());
        assert!(SipAddress::parse("bob@example.com").is_none());
        assert!(SipAddress::parse("http://example.com").is_none());
        assert!(SipAddress::parse("sip:").is_none());
        assert!(SipAddress::parse("not a uri").is_none());
        assert!(SipAddress::parse("sip:bob@").is_none());
    }

    #[test]
    fn test_account_params_debug_redacts_password() {
        let params = AccountParams {
            identity: "sip:alice@example.com".into(),
            server_address: "sip:example.com;transport=tcp".into(),
            username: "alice".into(),
            password: "hunter2".into(),
            domain: "example.com".into(),
            transport: Transport::Tcp,
            register_enabled: true,
            keep_preview_ratio: true,
        };
        let rendered = format!("{:?}", params);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_notification_sink_preserves_order() {
        let (sink, mut rx) = NotificationSink::channel();
        assert!(sink.notify(EngineNotification::AudioDevicesListUpdated));
        assert!(sink.notify(EngineNotification::RegistrationStateChanged {
            account: EngineAccountId(1),
            state: EngineRegistrationState::Ok,
            message: "ok".into(),
        }));

        assert_eq!(rx.recv().await, Some(EngineNotification::AudioDevicesListUpdated));
        assert!(matches!(
            rx.recv().await,
            Some(EngineNotification::RegistrationStateChanged { state: EngineRegistrationState::Ok, .. })
        ));

        drop(rx);
        assert!(!sink.notify(EngineNotification::AudioDevicesListUpdated));
        assert!(sink.is_closed());
    }
}
