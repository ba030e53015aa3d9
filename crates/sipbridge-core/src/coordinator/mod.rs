//! Session Coordinator
//!
//! [`SipBridge`] is a cheap, cloneable handle to a single coordinator task.
//! Each method sends one command and awaits its reply; the task owns the
//! account, the call session and the device snapshot, and is the only place
//! they change.
//!
//! ```text
//!  SipBridge ──Command──▶ ┌─────────────┐ ◀──EngineNotification── dyn Engine
//!  (clones)  ◀──Reply──── │ Coordinator │ ───────requests───────▶
//!                         └──────┬──────┘
//!                                │ BridgeEvent
//!                                ▼
//!                   EventBus (broadcast + handlers)
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use sipbridge_core::testing::TestEngine;
//! use sipbridge_core::{BridgeConfig, SipBridge};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> sipbridge_core::BridgeResult<()> {
//! let engine = TestEngine::with_phone_devices();
//! let bridge = SipBridge::builder(Arc::new(engine.clone()))
//!     .config(BridgeConfig::default())
//!     .spawn()?;
//!
//! bridge.initialise().await?;
//! assert!(!bridge.has_active_call().await?);
//! bridge.hang_up().await?;
//! bridge.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod actor;
mod command;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

use crate::audio::registry::{DeviceSnapshot, RouteName};
use crate::audio::session::{AudioSessionConfigurator, NoopAudioSession};
use crate::call::dtmf::DtmfDigit;
use crate::call::session::CallInfo;
use crate::config::BridgeConfig;
use crate::engine::Engine;
use crate::error::{BridgeError, BridgeResult};
use crate::events::{BridgeEvent, BridgeEventHandler, EventBus, HandlerId};
use crate::registration::RegistrationState;
use crate::video::{StaticImageSource, VideoSurfaceHandle, VideoSurfaceSlot};

use actor::Coordinator;
use command::{Command, Reply};

/// Builder for a [`SipBridge`]
pub struct SipBridgeBuilder {
    engine: Arc<dyn Engine>,
    config: BridgeConfig,
    audio_session: Arc<dyn AudioSessionConfigurator>,
    video_slot: VideoSurfaceSlot,
}

impl SipBridgeBuilder {
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Platform audio-session hook called on route changes
    pub fn audio_session(mut self, session: Arc<dyn AudioSessionConfigurator>) -> Self {
        self.audio_session = session;
        self
    }

    /// Share a surface slot the UI layer already holds
    pub fn video_slot(mut self, slot: VideoSurfaceSlot) -> Self {
        self.video_slot = slot;
        self
    }

    /// Validate the configuration and start the coordinator task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> BridgeResult<SipBridge> {
        self.config.validate()?;

        let (commands_tx, commands_rx) = mpsc::channel(self.config.command_buffer);
        let events = EventBus::new(self.config.event_buffer);
        let coordinator = Coordinator::new(
            self.engine,
            self.config,
            self.audio_session,
            self.video_slot.clone(),
            events.clone(),
            commands_rx,
        );
        tokio::spawn(coordinator.run());

        Ok(SipBridge {
            commands: commands_tx,
            events,
            video_slot: self.video_slot,
        })
    }
}

/// Handle to the session coordinator
#[derive(Debug, Clone)]
pub struct SipBridge {
    commands: mpsc::Sender<Command>,
    events: EventBus,
    video_slot: VideoSurfaceSlot,
}

impl SipBridge {
    pub fn builder(engine: Arc<dyn Engine>) -> SipBridgeBuilder {
        SipBridgeBuilder {
            engine,
            config: BridgeConfig::default(),
            audio_session: Arc::new(NoopAudioSession),
            video_slot: VideoSurfaceSlot::new(),
        }
    }

    /// Spawn with defaults
    pub fn spawn(engine: Arc<dyn Engine>, config: BridgeConfig) -> BridgeResult<Self> {
        Self::builder(engine).config(config).spawn()
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> BridgeResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| BridgeError::CoordinatorUnavailable)?;
        rx.await
            .map_err(|_| BridgeError::internal("coordinator dropped the request"))?
    }

    /// False once the coordinator task has stopped
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    // ===== LIFECYCLE =====

    /// Start the engine; repeated calls are no-ops
    pub async fn initialise(&self) -> BridgeResult<()> {
        self.request(|reply| Command::Initialise { reply }).await
    }

    /// Hang up, drop the account, stop the engine and end the coordinator
    pub async fn shutdown(&self) -> BridgeResult<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    // ===== REGISTRATION =====

    /// Register `username@domain`, resolving on the first final registration
    /// state the engine reports
    pub async fn login(
        &self,
        username: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
    ) -> BridgeResult<()> {
        let (username, password, domain) = (username.into(), password.into(), domain.into());
        self.request(|reply| Command::Login {
            username,
            password,
            domain,
            reply,
        })
        .await
    }

    pub async fn unregister(&self) -> BridgeResult<()> {
        self.request(|reply| Command::Unregister { reply }).await
    }

    pub async fn registration_state(&self) -> BridgeResult<RegistrationState> {
        self.request(|reply| Command::RegistrationState { reply }).await
    }

    // ===== CALLS =====

    /// Send an INVITE; progress arrives as events
    pub async fn outgoing_call(&self, uri: impl Into<String>) -> BridgeResult<CallInfo> {
        let uri = uri.into();
        self.request(|reply| Command::OutgoingCall { uri, reply }).await
    }

    pub async fn accept_call(&self) -> BridgeResult<bool> {
        self.request(|reply| Command::AcceptCall { reply }).await
    }

    /// Terminate the call; succeeds when there is none
    pub async fn hang_up(&self) -> BridgeResult<()> {
        self.request(|reply| Command::HangUp { reply }).await
    }

    /// Returns the video flag requested in the update
    pub async fn toggle_video(&self) -> BridgeResult<bool> {
        self.request(|reply| Command::ToggleVideo { reply }).await
    }

    /// The digit is checked before the call state
    pub async fn send_dtmf(&self, digit: char) -> BridgeResult<()> {
        let digit = DtmfDigit::try_from(digit)?;
        self.request(|reply| Command::SendDtmf { digit, reply }).await
    }

    pub async fn has_active_call(&self) -> BridgeResult<bool> {
        self.request(|reply| Command::HasActiveCall { reply }).await
    }

    pub async fn call_info(&self) -> BridgeResult<Option<CallInfo>> {
        self.request(|reply| Command::CallInfo { reply }).await
    }

    // ===== AUDIO =====

    /// Returns the new mic-enabled state
    pub async fn toggle_mute(&self) -> BridgeResult<bool> {
        self.request(|reply| Command::ToggleMute { reply }).await
    }

    pub async fn mic_enabled(&self) -> BridgeResult<bool> {
        self.request(|reply| Command::MicEnabled { reply }).await
    }

    pub async fn scan_audio_devices(&self) -> BridgeResult<DeviceSnapshot> {
        self.request(|reply| Command::ScanAudioDevices { reply }).await
    }

    /// `Ok(false)` when the route was not available in the last scan
    pub async fn switch_audio_route(&self, route: RouteName) -> BridgeResult<bool> {
        self.request(|reply| Command::SwitchAudioRoute { route, reply }).await
    }

    pub async fn bluetooth_audio(&self) -> BridgeResult<bool> {
        self.switch_audio_route(RouteName::Bluetooth).await
    }

    pub async fn loud_audio(&self) -> BridgeResult<bool> {
        self.switch_audio_route(RouteName::Loudspeaker).await
    }

    pub async fn phone_audio(&self) -> BridgeResult<bool> {
        self.switch_audio_route(RouteName::Phone).await
    }

    // ===== VIDEO =====

    /// Slot the UI layer fills with its drawable
    pub fn video_slot(&self) -> &VideoSurfaceSlot {
        &self.video_slot
    }

    pub fn provide_video_surface(&self, handle: VideoSurfaceHandle) {
        self.video_slot.provide(handle);
    }

    /// Attach the surface and enable video; `ViewNotReady` without a surface
    pub async fn set_up_video_view(&self) -> BridgeResult<bool> {
        self.request(|reply| Command::SetUpVideoView { reply }).await
    }

    /// Attach the surface if one was provided; `Ok(false)` means retry later
    pub async fn attach_video_surface(&self) -> BridgeResult<bool> {
        self.request(|reply| Command::AttachVideoSurface { reply }).await
    }

    pub async fn set_static_image(&self, source: StaticImageSource) -> BridgeResult<bool> {
        self.request(|reply| Command::SetStaticImage { source, reply }).await
    }

    pub async fn clear_static_image(&self) -> BridgeResult<bool> {
        self.request(|reply| Command::ClearStaticImage { reply }).await
    }

    // ===== EVENTS =====

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    /// Published events as a stream; lagged events are skipped with a warning
    pub fn events(&self) -> impl Stream<Item = BridgeEvent> + Send + 'static {
        BroadcastStream::new(self.events.subscribe()).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "Event stream lagged, events dropped");
                None
            }
        })
    }

    /// Feed published events to `handler` through its own ordered queue
    pub fn add_event_handler(&self, handler: Arc<dyn BridgeEventHandler>) -> HandlerId {
        self.events.add_handler(handler)
    }

    pub fn remove_event_handler(&self, id: HandlerId) -> bool {
        self.events.remove_handler(id)
    }
}
