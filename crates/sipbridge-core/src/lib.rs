//! sipbridge-core: call-session and audio-route core behind SIP bridges
//!
//! This crate sits between a native SIP/media engine and the platform glue
//! that exposes it to an application. It tracks a single account and a
//! single call, routes audio between the phone, loudspeaker and Bluetooth
//! devices, and republishes engine notifications under a fixed event
//! vocabulary.
//!
//! ## Layering
//! ```text
//! platform bridge ──JSON / method calls──▶ SipBridge ─▶ Coordinator task
//!                                                          │
//!                        ┌─────────────────┬───────────────┼───────────────┐
//!                        ▼                 ▼               ▼               ▼
//!                  CallController    AudioRouter    DeviceRegistry    dyn Engine
//! ```
//!
//! The crate focuses on:
//! - Serializing every command and engine notification through one task
//! - The call state machine and its transition table
//! - Device classification and soft-failing route switches
//! - A stable error code for every rejected command
//!
//! SIP signalling, media and codecs are the engine's business; see
//! [`engine::Engine`] for the boundary.

pub mod audio;
pub mod call;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod protocol;
pub mod registration;
pub mod testing;
pub mod video;

pub use audio::{AudioDevice, DeviceSnapshot, RouteName, RouteOptions};
pub use call::{CallDirection, CallId, CallInfo, CallState, DtmfDigit};
pub use config::{AudioConfig, BridgeConfig, EchoCancellation, VideoConfig};
pub use coordinator::{SipBridge, SipBridgeBuilder};
pub use engine::{Engine, EngineNotification, NotificationSink};
pub use error::{BridgeError, BridgeResult, ErrorKind};
pub use events::{BridgeEvent, BridgeEventHandler, EventName, HandlerId};
pub use logging::{setup_logging, LogFormat, LoggingConfig};
pub use protocol::{BridgeCommand, BridgeReply};
pub use registration::RegistrationState;
pub use video::{StaticImageSource, VideoSurfaceHandle, VideoSurfaceSlot};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
