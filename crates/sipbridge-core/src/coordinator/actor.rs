//! The coordinator task
//!
//! All mutable state (account, call session, device snapshot) lives here and
//! is only touched from this task. Engine notifications and user commands are
//! two queues drained by one `select!` loop; notifications win ties so a
//! state change the engine reported before a command was issued is applied
//! before that command runs.
//!
//! Every notification and command is handled inside `catch_unwind`. A panic
//! is logged and the loop moves on to the next message; for commands the
//! reply channel is dropped and the caller gets an error.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::audio::registry::{DeviceRegistry, DeviceSnapshot, RouteName};
use crate::audio::router::AudioRouter;
use crate::audio::session::AudioSessionConfigurator;
use crate::call::control::CallController;
use crate::call::dtmf::DtmfDigit;
use crate::call::session::CallInfo;
use crate::call::state::CallState;
use crate::config::BridgeConfig;
use crate::coordinator::command::{Command, Reply};
use crate::engine::{CallParams, Engine, EngineAccountId, EngineNotification, EngineRegistrationState, MediaDirection, NotificationSink};
use crate::error::{BridgeError, BridgeResult};
use crate::events::{BridgeEvent, EventBus, EventName};
use crate::registration::{Account, RegistrationState};
use crate::video::{StaticImageSource, VideoSurfaceSlot};

enum Flow {
    Continue,
    Stop,
}

pub(crate) struct Coordinator {
    engine: Arc<dyn Engine>,
    config: BridgeConfig,
    initialised: bool,
    sink: NotificationSink,
    notifications: mpsc::UnboundedReceiver<EngineNotification>,
    commands: mpsc::Receiver<Command>,
    events: EventBus,
    account: Option<Account>,
    /// The one login waiting for a final registration notification
    pending_login: Option<Reply<()>>,
    calls: CallController,
    devices: DeviceRegistry,
    router: AudioRouter,
    video_slot: VideoSurfaceSlot,
    /// Deadline of the debounced rescan after device-list updates
    device_refresh_at: Option<Instant>,
}

impl Coordinator {
    pub(crate) fn new(
        engine: Arc<dyn Engine>,
        config: BridgeConfig,
        audio_session: Arc<dyn AudioSessionConfigurator>,
        video_slot: VideoSurfaceSlot,
        events: EventBus,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        let (sink, notifications) = NotificationSink::channel();
        let router = AudioRouter::new(
            audio_session,
            config.audio.preferred_sample_rate,
            config.audio.io_buffer_ms,
        );

        Self {
            engine,
            config,
            initialised: false,
            sink,
            notifications,
            commands,
            events,
            account: None,
            pending_login: None,
            calls: CallController::new(),
            devices: DeviceRegistry::new(),
            router,
            video_slot,
            device_refresh_at: None,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("Session coordinator started");

        loop {
            tokio::select! {
                biased;

                Some(notification) = self.notifications.recv() => {
                    self.guarded("notification", |c| c.handle_notification(notification));
                }

                command = self.commands.recv() => {
                    let Some(command) = command else {
                        debug!("All bridge handles dropped");
                        break;
                    };
                    let name = command.name();
                    match catch_unwind(AssertUnwindSafe(|| self.dispatch(command))) {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Stop) => break,
                        Err(_) => error!(command = name, "Command handler panicked"),
                    }
                }

                _ = sleep_until(self.device_refresh_at), if self.device_refresh_at.is_some() => {
                    self.device_refresh_at = None;
                    self.guarded("device refresh", Coordinator::refresh_devices);
                }
            }
        }

        self.teardown();
        info!("Session coordinator stopped");
    }

    fn guarded(&mut self, what: &'static str, f: impl FnOnce(&mut Self)) {
        if catch_unwind(AssertUnwindSafe(|| f(self))).is_err() {
            error!(what, "Handler panicked, continuing with the next message");
        }
    }

    // ===== NOTIFICATIONS =====

    fn handle_notification(&mut self, notification: EngineNotification) {
        match notification {
            EngineNotification::CallStateChanged {
                call,
                state,
                remote_uri,
                message,
            } => {
                let Some(state) = self.calls.on_call_state(&*self.engine, call, state, remote_uri.as_deref()) else {
                    return;
                };
                if let Some(name) = EventName::for_call_state(state) {
                    self.events.publish(BridgeEvent::new(name).with_message(message));
                }
            }
            EngineNotification::RegistrationStateChanged { account, state, message } => {
                self.on_registration_state(account, state, &message);
            }
            EngineNotification::AudioDevicesListUpdated => self.on_devices_updated(),
        }
    }

    fn on_registration_state(&mut self, engine_account: EngineAccountId, state: EngineRegistrationState, message: &str) {
        let state = RegistrationState::from_engine(state, message);
        let Some(account) = self.account.as_mut() else {
            debug!(engine_account = %engine_account, state = ?state, "Registration update without an account, ignoring");
            return;
        };
        // Accounts removed by a re-login or unregister may still report
        if !account.is_engine_account(engine_account) {
            debug!(engine_account = %engine_account, state = ?state, "Registration update for a replaced account, ignoring");
            return;
        }

        info!(identity = %account.identity(), state = ?state, detail = message, "Registration state changed");
        account.set_state(state.clone());

        if !state.is_final() {
            return;
        }
        if let Some(reply) = self.pending_login.take() {
            let outcome = match state {
                RegistrationState::Registered => Ok(()),
                RegistrationState::Failed(reason) => Err(BridgeError::authentication_failed(reason)),
                _ => Err(BridgeError::RegistrationCleared),
            };
            respond(reply, outcome);
        }
    }

    fn on_devices_updated(&mut self) {
        if self.device_refresh_at.is_some() {
            return;
        }

        let debounce = self.config.audio.debounce();
        match Instant::now().checked_add(debounce).filter(|_| !debounce.is_zero()) {
            Some(deadline) => {
                debug!(debounce_ms = debounce.as_millis() as u64, "Audio device list changed, rescan scheduled");
                self.device_refresh_at = Some(deadline);
            }
            None => self.refresh_devices(),
        }
    }

    fn refresh_devices(&mut self) {
        let engine = self.initialised.then_some(&*self.engine);
        match self.devices.scan(engine) {
            Ok(snapshot) => debug!(current = %snapshot.current, options = ?snapshot.options, "Audio devices rescanned"),
            Err(e) => warn!(error = %e, "Audio device rescan failed"),
        }
        self.events.publish(BridgeEvent::new(EventName::AudioDevicesChanged));
    }

    // ===== COMMANDS =====

    fn dispatch(&mut self, command: Command) -> Flow {
        debug!(command = command.name(), "Handling command");

        match command {
            Command::Initialise { reply } => respond(reply, self.initialise()),
            Command::Shutdown { reply } => {
                self.teardown();
                respond(reply, Ok(()));
                return Flow::Stop;
            }
            Command::Login {
                username,
                password,
                domain,
                reply,
            } => match self.login(username, password, domain) {
                Ok(()) => self.pending_login = Some(reply),
                Err(e) => respond(reply, Err(e)),
            },
            Command::Unregister { reply } => respond(reply, self.unregister()),
            Command::RegistrationState { reply } => respond(reply, Ok(self.registration_state())),
            Command::OutgoingCall { uri, reply } => respond(reply, self.outgoing_call(&uri)),
            Command::AcceptCall { reply } => respond(reply, self.accept_call()),
            Command::HangUp { reply } => respond(reply, self.calls.hangup(&*self.engine)),
            Command::ToggleVideo { reply } => respond(reply, self.calls.toggle_video(&*self.engine)),
            Command::SendDtmf { digit, reply } => respond(reply, self.send_dtmf(digit)),
            Command::HasActiveCall { reply } => respond(reply, Ok(self.calls.has_active_call())),
            Command::CallInfo { reply } => respond(reply, Ok(self.call_info())),
            Command::ToggleMute { reply } => respond(reply, self.toggle_mute()),
            Command::MicEnabled { reply } => respond(reply, self.require_engine().map(|e| e.mic_enabled())),
            Command::ScanAudioDevices { reply } => respond(reply, self.scan_audio_devices()),
            Command::SwitchAudioRoute { route, reply } => respond(reply, self.switch_audio_route(route)),
            Command::SetUpVideoView { reply } => respond(reply, self.set_up_video_view()),
            Command::AttachVideoSurface { reply } => respond(reply, self.attach_video_surface()),
            Command::SetStaticImage { source, reply } => respond(reply, self.set_static_image(Some(source))),
            Command::ClearStaticImage { reply } => respond(reply, self.set_static_image(None)),
        }

        Flow::Continue
    }

    fn require_engine(&self) -> BridgeResult<&dyn Engine> {
        if self.initialised {
            Ok(&*self.engine)
        } else {
            Err(BridgeError::EngineUnavailable)
        }
    }

    fn initialise(&mut self) -> BridgeResult<()> {
        if self.initialised {
            debug!("SIP engine already initialised");
            return Ok(());
        }

        self.engine
            .start(self.sink.clone())
            .map_err(|e| BridgeError::EngineInit { reason: e.detail })?;
        self.initialised = true;

        let builtin = self.engine.has_builtin_echo_canceller();
        let software = self.config.echo_cancellation.software_enabled(builtin);
        if let Err(e) = self.engine.set_echo_cancellation(software) {
            warn!(error = %e, "Failed to apply echo cancellation policy");
        }

        if let Err(e) = self.devices.scan(Some(&*self.engine)) {
            debug!(error = %e, "Initial audio device scan failed");
        }

        info!(
            builtin_echo_canceller = builtin,
            software_echo_cancellation = software,
            "SIP engine initialised"
        );
        Ok(())
    }

    fn login(&mut self, username: String, password: String, domain: String) -> BridgeResult<()> {
        self.require_engine()?;
        if self.pending_login.is_some() {
            return Err(BridgeError::RegistrationInProgress);
        }
        if let Some(account) = self.account.as_ref().filter(|a| a.state.is_registered()) {
            return Err(BridgeError::AlreadyRegistered {
                identity: account.identity(),
            });
        }

        let mut account = Account::new(username, password, domain, self.config.transport)?;

        // A failed or cleared account is replaced
        if self.account.is_some() {
            self.engine.clear_accounts()?;
            self.account = None;
        }

        let engine_account = self
            .engine
            .register(&account.params(self.config.video.keep_preview_ratio))?;
        account.engine_account = Some(engine_account);
        account.set_state(RegistrationState::Registering);
        info!(identity = %account.identity(), engine_account = %engine_account, server = %account.server_address(), "Registering account");
        self.account = Some(account);
        Ok(())
    }

    fn unregister(&mut self) -> BridgeResult<()> {
        self.require_engine()?.clear_accounts()?;

        if let Some(account) = self.account.take() {
            info!(identity = %account.identity(), "Account removed");
        }
        if let Some(reply) = self.pending_login.take() {
            respond(reply, Err(BridgeError::RegistrationCleared));
        }
        Ok(())
    }

    fn registration_state(&self) -> RegistrationState {
        self.account
            .as_ref()
            .map_or(RegistrationState::Unregistered, |a| a.state.clone())
    }

    fn outgoing_call(&mut self, uri: &str) -> BridgeResult<CallInfo> {
        self.require_engine()?;
        if !self.account.as_ref().map_or(false, |a| a.state.is_registered()) {
            return Err(BridgeError::NotRegistered);
        }

        let params = CallParams {
            video_enabled: self.config.video.enable_on_outgoing,
            video_direction: MediaDirection::SendRecv,
            media_encryption: self.config.media_encryption,
        };
        self.calls
            .place_outgoing(&*self.engine, uri, params, self.config.video.skip_static_camera)
    }

    fn accept_call(&mut self) -> BridgeResult<bool> {
        if self.calls.state() != CallState::IncomingReceived {
            return Err(BridgeError::NoIncomingCall);
        }

        let direction = self.config.video.accept_direction;
        let params = CallParams {
            video_enabled: direction != MediaDirection::Inactive,
            video_direction: direction,
            media_encryption: self.config.media_encryption,
        };
        self.calls.accept_incoming(&*self.engine, params)?;
        Ok(true)
    }

    fn send_dtmf(&self, digit: DtmfDigit) -> BridgeResult<()> {
        self.calls.send_dtmf(&*self.engine, digit)
    }

    fn call_info(&self) -> Option<CallInfo> {
        self.calls.info()
    }

    fn toggle_mute(&mut self) -> BridgeResult<bool> {
        let engine = self.require_engine()?;
        let enabled = !engine.mic_enabled();
        engine.set_mic_enabled(enabled)?;
        info!(mic_enabled = enabled, "Microphone toggled");
        Ok(enabled)
    }

    fn scan_audio_devices(&mut self) -> BridgeResult<DeviceSnapshot> {
        let engine = self.initialised.then_some(&*self.engine);
        self.devices.scan(engine)
    }

    fn switch_audio_route(&mut self, route: RouteName) -> BridgeResult<bool> {
        let engine = self.initialised.then_some(&*self.engine);
        let switched = self.router.switch_to(engine, &mut self.devices, route)?;
        if switched {
            self.events.publish(BridgeEvent::new(EventName::AudioDevicesChanged));
        }
        Ok(switched)
    }

    fn set_up_video_view(&mut self) -> BridgeResult<bool> {
        let engine = self.require_engine()?;
        let handle = self.video_slot.get().ok_or(BridgeError::ViewNotReady)?;

        engine.set_native_video_window(handle)?;
        engine.enable_video(true, true, self.config.video.auto_accept_remote_video)?;
        info!(surface = %handle, "Video view set up");
        Ok(true)
    }

    /// `false` until the UI has provided a surface; callers retry
    fn attach_video_surface(&mut self) -> BridgeResult<bool> {
        let engine = self.require_engine()?;
        let Some(handle) = self.video_slot.get() else {
            debug!("No video surface provided yet");
            return Ok(false);
        };

        engine.set_native_video_window(handle)?;
        debug!(surface = %handle, "Video surface attached");
        Ok(true)
    }

    fn set_static_image(&mut self, source: Option<StaticImageSource>) -> BridgeResult<bool> {
        if let Some(source) = &source {
            source.validate()?;
        }
        self.require_engine()?.set_static_image(source.as_ref())?;
        match &source {
            Some(source) => info!(path = %source.image_path, fps = ?source.fps, "Static image video source set"),
            None => info!("Static image video source cleared"),
        }
        Ok(true)
    }

    /// Hang up, drop the account and stop the engine; safe to call twice
    fn teardown(&mut self) {
        if let Some(reply) = self.pending_login.take() {
            respond(reply, Err(BridgeError::RegistrationCleared));
        }

        if self.initialised {
            if let Err(e) = self.calls.hangup(&*self.engine) {
                warn!(error = %e, "Failed to hang up during shutdown");
            }
            if let Err(e) = self.engine.clear_accounts() {
                warn!(error = %e, "Failed to clear accounts during shutdown");
            }
            if let Err(e) = self.engine.stop() {
                warn!(error = %e, "Failed to stop SIP engine");
            }
            self.initialised = false;
            info!("SIP engine stopped");
        }

        self.calls.clear();
        self.account = None;
        self.devices.clear();
        self.device_refresh_at = None;
        self.events.close();
    }
}

fn respond<T>(reply: Reply<T>, result: BridgeResult<T>) {
    if let Err(e) = &result {
        debug!(code = e.code(), error = %e, "Command failed");
    }
    if reply.send(result).is_err() {
        debug!("Caller went away before the reply");
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
