//! JSON command protocol for platform bridges
//!
//! Platform glue (mobile or desktop bindings) marshals calls across its
//! boundary as strings instead of binding every method:
//!
//! ```text
//! {"command":"outgoingCall","uri":"sip:bob@example.com"}
//!   → {"status":"ok","value":{"callId":"…","state":"OutgoingInit",…}}
//! {"command":"sendDtmf","digit":"x"}
//!   → {"status":"error","code":"INVALID_DIGIT","message":"Invalid DTMF digit: \"x\" …"}
//! ```
//!
//! Events travel the other way as serialized [`BridgeEvent`](crate::BridgeEvent)s.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audio::registry::RouteName;
use crate::call::dtmf::DtmfDigit;
use crate::coordinator::SipBridge;
use crate::error::{BridgeError, BridgeResult};
use crate::video::StaticImageSource;

/// A command as sent by a platform bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum BridgeCommand {
    Initialise,
    Shutdown,
    Login {
        username: String,
        password: String,
        domain: String,
    },
    Unregister,
    RegistrationState,
    OutgoingCall {
        uri: String,
    },
    AcceptCall,
    HangUp,
    ToggleVideo,
    SendDtmf {
        digit: String,
    },
    HasActiveCall,
    CallInfo,
    ToggleMute,
    MicEnabled,
    ScanAudioDevices,
    BluetoothAudio,
    LoudAudio,
    PhoneAudio,
    SetUpVideoView,
    AttachVideoSurface,
    SetStaticImage(StaticImageSource),
    ClearStaticImage,
}

/// Result of one command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BridgeReply {
    Ok {
        #[serde(default, skip_serializing_if = "Value::is_null")]
        value: Value,
    },
    Error {
        code: String,
        message: String,
    },
}

impl BridgeReply {
    pub fn ok(value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => BridgeReply::Ok { value },
            Err(e) => Self::from(BridgeError::internal(format!("failed to encode reply: {}", e))),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, BridgeReply::Ok { .. })
    }
}

impl From<BridgeError> for BridgeReply {
    fn from(err: BridgeError) -> Self {
        BridgeReply::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl<T: Serialize> From<BridgeResult<T>> for BridgeReply {
    fn from(result: BridgeResult<T>) -> Self {
        match result {
            Ok(value) => BridgeReply::ok(value),
            Err(e) => e.into(),
        }
    }
}

impl SipBridge {
    /// Run one protocol command
    pub async fn execute(&self, command: BridgeCommand) -> BridgeReply {
        match command {
            BridgeCommand::Initialise => self.initialise().await.into(),
            BridgeCommand::Shutdown => self.shutdown().await.into(),
            BridgeCommand::Login {
                username,
                password,
                domain,
            } => self.login(username, password, domain).await.into(),
            BridgeCommand::Unregister => self.unregister().await.into(),
            BridgeCommand::RegistrationState => self.registration_state().await.into(),
            BridgeCommand::OutgoingCall { uri } => self.outgoing_call(uri).await.into(),
            BridgeCommand::AcceptCall => self.accept_call().await.into(),
            BridgeCommand::HangUp => self.hang_up().await.into(),
            BridgeCommand::ToggleVideo => self.toggle_video().await.into(),
            BridgeCommand::SendDtmf { digit } => match DtmfDigit::try_from(digit.as_str()) {
                Ok(digit) => self.send_dtmf(digit.as_char()).await.into(),
                Err(e) => e.into(),
            },
            BridgeCommand::HasActiveCall => self.has_active_call().await.into(),
            BridgeCommand::CallInfo => self.call_info().await.into(),
            BridgeCommand::ToggleMute => self.toggle_mute().await.into(),
            BridgeCommand::MicEnabled => self.mic_enabled().await.into(),
            BridgeCommand::ScanAudioDevices => self.scan_audio_devices().await.into(),
            BridgeCommand::BluetoothAudio => self.switch_audio_route(RouteName::Bluetooth).await.into(),
            BridgeCommand::LoudAudio => self.switch_audio_route(RouteName::Loudspeaker).await.into(),
            BridgeCommand::PhoneAudio => self.switch_audio_route(RouteName::Phone).await.into(),
            BridgeCommand::SetUpVideoView => self.set_up_video_view().await.into(),
            BridgeCommand::AttachVideoSurface => self.attach_video_surface().await.into(),
            BridgeCommand::SetStaticImage(source) => self.set_static_image(source).await.into(),
            BridgeCommand::ClearStaticImage => self.clear_static_image().await.into(),
        }
    }

    /// Decode a JSON command, run it and encode the reply
    pub async fn execute_json(&self, request: &str) -> String {
        let reply = match serde_json::from_str::<BridgeCommand>(request) {
            Ok(command) => self.execute(command).await,
            Err(e) => BridgeError::InvalidCommand { reason: e.to_string() }.into(),
        };
        encode_reply(&reply)
    }
}

fn encode_reply(reply: &BridgeReply) -> String {
    serde_json::to_string(reply).unwrap_or_else(|e| {
        format!(
            r#"{{"status":"error","code":"INTERNAL","message":"failed to encode reply: {}"}}"#,
            e.to_string().replace('"', "'")
        )
    })
}
