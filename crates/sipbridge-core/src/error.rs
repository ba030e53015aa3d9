//! Error types for the bridge core
//!
//! Every command issued through [`SipBridge`](crate::SipBridge) resolves to a
//! [`BridgeResult`]. Errors are local to the command that produced them: the
//! coordinator never retries on the caller's behalf and no error stops it from
//! processing later engine notifications.
//!
//! # Error Kinds
//!
//! - **Validation** - bad input (malformed URI, DTMF digit outside `0-9*#`)
//! - **StateConflict** - the command does not fit the current state (accepting
//!   with no incoming call, logging in twice)
//! - **Engine** - the native engine refused the request or is not running
//! - **AsyncOutcome** - a later engine notification rejected the command
//!   (registration `Failed`)
//! - **Internal** - the coordinator task is gone
//!
//! Each error carries a stable [`code`](BridgeError::code) for the platform
//! bridges plus the human-readable `Display` text.
//!
//! ```rust
//! use sipbridge_core::{BridgeError, ErrorKind};
//!
//! let err = BridgeError::invalid_address("not a uri");
//! assert_eq!(err.code(), "INVALID_ADDRESS");
//! assert_eq!(err.kind(), ErrorKind::Validation);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::call::CallState;
use crate::engine::EngineError;

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Broad classification of a [`BridgeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    StateConflict,
    Engine,
    AsyncOutcome,
    Internal,
}

/// Errors surfaced by bridge commands
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Validation errors
    #[error("Invalid SIP address: {uri}")]
    InvalidAddress { uri: String },

    #[error("Invalid DTMF digit: {digit:?} (expected 0-9, * or #)")]
    InvalidDigit { digit: String },

    #[error("Invalid static image: {reason}")]
    InvalidStaticImage { reason: String },

    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Invalid command: {reason}")]
    InvalidCommand { reason: String },

    /// State conflicts
    #[error("A call session is already active (state {state:?})")]
    SessionBusy { state: CallState },

    #[error("No incoming call to accept")]
    NoIncomingCall,

    #[error("No active call")]
    NoActiveCall,

    #[error("Invalid call state: expected {expected}, got {actual:?}")]
    InvalidCallState { expected: String, actual: CallState },

    #[error("A registration request is already pending")]
    RegistrationInProgress,

    #[error("Account {identity} is already registered")]
    AlreadyRegistered { identity: String },

    #[error("Not registered with a SIP server")]
    NotRegistered,

    #[error("Video view is not ready")]
    ViewNotReady,

    /// Engine errors
    #[error("SIP engine is not initialised")]
    EngineUnavailable,

    #[error("SIP engine failed to start: {reason}")]
    EngineInit { reason: String },

    #[error("SIP engine rejected the request: {detail}")]
    EngineRejected { detail: String },

    #[error("No audio route is available")]
    NoAudioRoute,

    /// Asynchronous outcomes
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Registration was cleared before it completed")]
    RegistrationCleared,

    /// Internal errors
    #[error("Coordinator is not running")]
    CoordinatorUnavailable,

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BridgeError {
    /// Create an invalid address error
    pub fn invalid_address(uri: impl Into<String>) -> Self {
        Self::InvalidAddress { uri: uri.into() }
    }

    /// Create an invalid digit error
    pub fn invalid_digit(digit: impl Into<String>) -> Self {
        Self::InvalidDigit { digit: digit.into() }
    }

    /// Create an engine rejection error
    pub fn engine_rejected(detail: impl Into<String>) -> Self {
        Self::EngineRejected { detail: detail.into() }
    }

    /// Create an authentication failure
    pub fn authentication_failed(reason: impl Into<String>) -> Self {
        Self::AuthenticationFailed { reason: reason.into() }
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::InvalidAddress { .. }
            | BridgeError::InvalidDigit { .. }
            | BridgeError::InvalidStaticImage { .. }
            | BridgeError::InvalidConfiguration { .. }
            | BridgeError::InvalidCommand { .. } => ErrorKind::Validation,

            BridgeError::SessionBusy { .. }
            | BridgeError::NoIncomingCall
            | BridgeError::NoActiveCall
            | BridgeError::InvalidCallState { .. }
            | BridgeError::RegistrationInProgress
            | BridgeError::AlreadyRegistered { .. }
            | BridgeError::NotRegistered
            | BridgeError::ViewNotReady => ErrorKind::StateConflict,

            BridgeError::EngineUnavailable
            | BridgeError::EngineInit { .. }
            | BridgeError::EngineRejected { .. }
            | BridgeError::NoAudioRoute => ErrorKind::Engine,

            BridgeError::AuthenticationFailed { .. } | BridgeError::RegistrationCleared => {
                ErrorKind::AsyncOutcome
            }

            BridgeError::CoordinatorUnavailable | BridgeError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Stable error code reported to platform bridges
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::InvalidAddress { .. } => "INVALID_ADDRESS",
            BridgeError::InvalidDigit { .. } => "INVALID_DIGIT",
            BridgeError::InvalidStaticImage { .. } => "INVALID_STATIC_IMAGE",
            BridgeError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            BridgeError::InvalidCommand { .. } => "INVALID_COMMAND",
            BridgeError::SessionBusy { .. } => "SESSION_BUSY",
            BridgeError::NoIncomingCall => "NO_INCOMING_CALL",
            BridgeError::NoActiveCall => "NO_ACTIVE_CALL",
            BridgeError::InvalidCallState { .. } => "INVALID_CALL_STATE",
            BridgeError::RegistrationInProgress => "REGISTRATION_IN_PROGRESS",
            BridgeError::AlreadyRegistered { .. } => "ALREADY_REGISTERED",
            BridgeError::NotRegistered => "NOT_REGISTERED",
            BridgeError::ViewNotReady => "VIEW_NOT_READY",
            BridgeError::EngineUnavailable => "ENGINE_UNAVAILABLE",
            BridgeError::EngineInit { .. } => "ENGINE_INIT",
            BridgeError::EngineRejected { .. } => "ENGINE_REJECTED",
            BridgeError::NoAudioRoute => "NO_AUDIO_ROUTE",
            BridgeError::AuthenticationFailed { .. } => "AUTH_FAILED",
            BridgeError::RegistrationCleared => "REGISTRATION_CLEARED",
            BridgeError::CoordinatorUnavailable => "COORDINATOR_UNAVAILABLE",
            BridgeError::Internal { .. } => "INTERNAL",
        }
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            BridgeError::AlreadyRegistered { .. }
            | BridgeError::NotRegistered
            | BridgeError::RegistrationInProgress
            | BridgeError::AuthenticationFailed { .. }
            | BridgeError::RegistrationCleared => "registration",

            BridgeError::InvalidAddress { .. }
            | BridgeError::InvalidDigit { .. }
            | BridgeError::SessionBusy { .. }
            | BridgeError::NoIncomingCall
            | BridgeError::NoActiveCall
            | BridgeError::InvalidCallState { .. } => "call",

            BridgeError::NoAudioRoute => "audio",

            BridgeError::ViewNotReady | BridgeError::InvalidStaticImage { .. } => "video",

            BridgeError::InvalidConfiguration { .. } => "configuration",

            BridgeError::InvalidCommand { .. } => "protocol",

            BridgeError::EngineUnavailable
            | BridgeError::EngineInit { .. }
            | BridgeError::EngineRejected { .. } => "engine",

            BridgeError::CoordinatorUnavailable | BridgeError::Internal { .. } => "system",
        }
    }
}

impl From<EngineError> for BridgeError {
    fn from(err: EngineError) -> Self {
        BridgeError::EngineRejected { detail: err.detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(BridgeError::RegistrationInProgress.code(), "REGISTRATION_IN_PROGRESS");
        assert_eq!(BridgeError::NoActiveCall.code(), "NO_ACTIVE_CALL");
        assert_eq!(
            BridgeError::SessionBusy { state: CallState::StreamsRunning }.code(),
            "SESSION_BUSY"
        );
    }

    #[test]
    fn test_kinds() {
        assert_eq!(BridgeError::invalid_digit("x").kind(), ErrorKind::Validation);
        assert_eq!(BridgeError::NoIncomingCall.kind(), ErrorKind::StateConflict);
        assert_eq!(BridgeError::engine_rejected("boom").kind(), ErrorKind::Engine);
        assert_eq!(BridgeError::authentication_failed("401").kind(), ErrorKind::AsyncOutcome);
        assert_eq!(BridgeError::CoordinatorUnavailable.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_engine_error_conversion_keeps_detail() {
        let err: BridgeError = EngineError::new("transport closed").into();
        assert_eq!(err, BridgeError::engine_rejected("transport closed"));
        assert!(err.to_string().contains("transport closed"));
    }
}
