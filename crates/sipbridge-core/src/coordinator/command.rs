//! Messages from [`SipBridge`](super::SipBridge) handles to the coordinator

use tokio::sync::oneshot;

use crate::audio::registry::{DeviceSnapshot, RouteName};
use crate::call::dtmf::DtmfDigit;
use crate::call::session::CallInfo;
use crate::error::BridgeResult;
use crate::registration::RegistrationState;
use crate::video::StaticImageSource;

/// Reply channel for one command
pub(crate) type Reply<T> = oneshot::Sender<BridgeResult<T>>;

/// One request to the coordinator, carrying its reply channel
pub(crate) enum Command {
    Initialise { reply: Reply<()> },
    Shutdown { reply: Reply<()> },

    Login {
        username: String,
        password: String,
        domain: String,
        reply: Reply<()>,
    },
    Unregister { reply: Reply<()> },
    RegistrationState { reply: Reply<RegistrationState> },

    OutgoingCall { uri: String, reply: Reply<CallInfo> },
    AcceptCall { reply: Reply<bool> },
    HangUp { reply: Reply<()> },
    ToggleVideo { reply: Reply<bool> },
    SendDtmf { digit: DtmfDigit, reply: Reply<()> },
    HasActiveCall { reply: Reply<bool> },
    CallInfo { reply: Reply<Option<CallInfo>> },

    ToggleMute { reply: Reply<bool> },
    MicEnabled { reply: Reply<bool> },
    ScanAudioDevices { reply: Reply<DeviceSnapshot> },
    SwitchAudioRoute { route: RouteName, reply: Reply<bool> },

    SetUpVideoView { reply: Reply<bool> },
    AttachVideoSurface { reply: Reply<bool> },
    SetStaticImage { source: StaticImageSource, reply: Reply<bool> },
    ClearStaticImage { reply: Reply<bool> },
}

impl Command {
    /// Short name for logs
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Command::Initialise { .. } => "initialise",
            Command::Shutdown { .. } => "shutdown",
            Command::Login { .. } => "login",
            Command::Unregister { .. } => "unregister",
            Command::RegistrationState { .. } => "registrationState",
            Command::OutgoingCall { .. } => "outgoingCall",
            Command::AcceptCall { .. } => "acceptCall",
            Command::HangUp { .. } => "hangUp",
            Command::ToggleVideo { .. } => "toggleVideo",
            Command::SendDtmf { .. } => "sendDtmf",
            Command::HasActiveCall { .. } => "hasActiveCall",
            Command::CallInfo { .. } => "callInfo",
            Command::ToggleMute { .. } => "toggleMute",
            Command::MicEnabled { .. } => "micEnabled",
            Command::ScanAudioDevices { .. } => "scanAudioDevices",
            Command::SwitchAudioRoute { .. } => "switchAudioRoute",
            Command::SetUpVideoView { .. } => "setUpVideoView",
            Command::AttachVideoSurface { .. } => "attachVideoSurface",
            Command::SetStaticImage { .. } => "setStaticImage",
            Command::ClearStaticImage { .. } => "clearStaticImage",
        }
    }
}
