//! Memory-backed engine for tests
//!
//! [`TestEngine`] implements [`Engine`] without any native stack. It records
//! every request, lets a test inject notifications as if the network had
//! answered, and can be told to reject specific requests.
//!
//! ```rust
//! use sipbridge_core::testing::{EngineOp, TestEngine};
//! use sipbridge_core::engine::{Engine, NotificationSink};
//!
//! let engine = TestEngine::with_phone_devices();
//! let (sink, _rx) = NotificationSink::channel();
//! engine.start(sink).unwrap();
//! assert_eq!(engine.ops(), vec![EngineOp::Start]);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::device::{AudioCapabilities, AudioDevice, DeviceCategory};
use crate::audio::session::{AudioSessionConfigurator, AudioSessionError, AudioSessionProfile};
use crate::call::dtmf::DtmfDigit;
use crate::engine::{
    AccountParams, CallParams, DeclineReason, Engine, EngineAccountId, EngineCallId, EngineCallState, EngineError,
    EngineNotification, EngineRegistrationState, EngineResult, NotificationSink, SipAddress,
    STATIC_PICTURE_CAMERA,
};
use crate::video::{StaticImageSource, VideoSurfaceHandle};

/// A request the engine received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOp {
    Start,
    Stop,
    SetEchoCancellation(bool),
    Register { identity: String, server_address: String },
    ClearAccounts,
    Invite { uri: String, params: CallParams },
    Accept { call: EngineCallId, params: CallParams },
    Decline { call: EngineCallId, reason: DeclineReason },
    Terminate(EngineCallId),
    Update { call: EngineCallId, params: CallParams },
    SendDtmf { call: EngineCallId, digit: char },
    SetMicEnabled(bool),
    SetInputDevice(String),
    SetOutputDevice(String),
    SetVideoDevice(String),
    SetNativeVideoWindow(VideoSurfaceHandle),
    EnableVideo { capture: bool, display: bool, auto_accept: bool },
    SetStaticImage(Option<String>),
}

#[derive(Debug)]
struct State {
    sink: Option<NotificationSink>,
    builtin_echo_canceller: bool,
    mic_enabled: bool,
    devices: Vec<AudioDevice>,
    input: Option<AudioDevice>,
    output: Option<AudioDevice>,
    default_output: Option<AudioDevice>,
    cameras: Vec<String>,
    camera: Option<String>,
    next_call: u64,
    next_account: u64,
    negotiated: HashMap<EngineCallId, CallParams>,
    failing: HashMap<&'static str, String>,
    panicking: HashSet<&'static str>,
    registration_reply: Option<(EngineRegistrationState, String)>,
    ops: Vec<EngineOp>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            sink: None,
            builtin_echo_canceller: false,
            mic_enabled: true,
            devices: Vec::new(),
            input: None,
            output: None,
            default_output: None,
            cameras: Vec::new(),
            camera: None,
            next_call: 1,
            next_account: 1,
            negotiated: HashMap::new(),
            failing: HashMap::new(),
            panicking: HashSet::new(),
            registration_reply: None,
            ops: Vec::new(),
        }
    }
}

/// Engine double shared between the coordinator and the test body
#[derive(Debug, Clone, Default)]
pub struct TestEngine {
    state: Arc<Mutex<State>>,
}

impl TestEngine {
    /// Engine with no devices and no cameras
    pub fn new() -> Self {
        Self::default()
    }

    /// Handset layout: microphone, earpiece and a loud speaker, routed to
    /// the earpiece; front/back cameras plus the static-picture camera
    pub fn with_phone_devices() -> Self {
        let engine = Self::new();
        let mic = Self::microphone();
        let earpiece = Self::earpiece();
        engine.set_devices(vec![mic.clone(), earpiece.clone(), Self::loud_speaker()]);
        {
            let mut state = engine.state.lock();
            state.input = Some(mic);
            state.output = Some(earpiece.clone());
            state.default_output = Some(earpiece);
            state.cameras = vec![
                STATIC_PICTURE_CAMERA.to_string(),
                "Front camera".to_string(),
                "Back camera".to_string(),
            ];
            state.camera = Some("Front camera".to_string());
        }
        engine
    }

    pub fn microphone() -> AudioDevice {
        AudioDevice::new("mic", "Built-in Microphone", DeviceCategory::Microphone, AudioCapabilities::RECORD)
    }

    pub fn earpiece() -> AudioDevice {
        AudioDevice::new("earpiece", "Receiver", DeviceCategory::Earpiece, AudioCapabilities::PLAY)
    }

    pub fn loud_speaker() -> AudioDevice {
        AudioDevice::new("speaker", "Speaker", DeviceCategory::Speaker, AudioCapabilities::PLAY)
    }

    pub fn bluetooth_headset() -> AudioDevice {
        AudioDevice::new("bt-headset", "Headset", DeviceCategory::Bluetooth, AudioCapabilities::PLAY_RECORD)
    }

    // ===== SETUP =====

    /// Replace the enumeration; active devices that disappeared are dropped
    pub fn set_devices(&self, devices: Vec<AudioDevice>) {
        let mut state = self.state.lock();
        let contains = |d: &Option<AudioDevice>| d.as_ref().map_or(true, |d| devices.contains(d));
        if !contains(&state.input) {
            state.input = None;
        }
        if !contains(&state.output) {
            state.output = state.default_output.clone().filter(|d| devices.contains(d));
        }
        state.devices = devices;
    }

    pub fn add_device(&self, device: AudioDevice) {
        self.state.lock().devices.push(device);
    }

    pub fn set_active_devices(&self, input: Option<AudioDevice>, output: Option<AudioDevice>) {
        let mut state = self.state.lock();
        state.input = input;
        state.output = output;
    }

    pub fn set_default_output(&self, device: Option<AudioDevice>) {
        self.state.lock().default_output = device;
    }

    pub fn set_builtin_echo_canceller(&self, present: bool) {
        self.state.lock().builtin_echo_canceller = present;
    }

    pub fn set_cameras(&self, cameras: Vec<String>, current: Option<String>) {
        let mut state = self.state.lock();
        state.cameras = cameras;
        state.camera = current;
    }

    /// Override what the remote side agreed to for `call`
    pub fn set_negotiated(&self, call: EngineCallId, params: CallParams) {
        self.state.lock().negotiated.insert(call, params);
    }

    /// Reject every later call to `method` (e.g. `"invite"`) with `detail`
    pub fn fail_on(&self, method: &'static str, detail: impl Into<String>) {
        self.state.lock().failing.insert(method, detail.into());
    }

    /// Answer every later `register` with `Progress` followed by `state`
    pub fn reply_to_register(&self, state: EngineRegistrationState, message: impl Into<String>) {
        self.state.lock().registration_reply = Some((state, message.into()));
    }

    /// Panic inside every later call to `method`
    pub fn panic_on(&self, method: &'static str) {
        self.state.lock().panicking.insert(method);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failing.clear();
        state.panicking.clear();
    }

    // ===== INSPECTION =====

    pub fn ops(&self) -> Vec<EngineOp> {
        self.state.lock().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.lock().ops.clear();
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().sink.is_some()
    }

    /// Handle of the most recently created call, incoming or outgoing
    pub fn last_call(&self) -> Option<EngineCallId> {
        let state = self.state.lock();
        (state.next_call > 1).then(|| EngineCallId(state.next_call - 1))
    }

    /// Handle of the most recently registered account
    pub fn last_account(&self) -> Option<EngineAccountId> {
        let state = self.state.lock();
        (state.next_account > 1).then(|| EngineAccountId(state.next_account - 1))
    }

    pub fn current_camera(&self) -> Option<String> {
        self.state.lock().camera.clone()
    }

    pub fn active_output(&self) -> Option<AudioDevice> {
        self.state.lock().output.clone()
    }

    pub fn active_input(&self) -> Option<AudioDevice> {
        self.state.lock().input.clone()
    }

    // ===== NOTIFICATIONS =====

    /// Deliver a notification through the sink attached at start
    pub fn emit(&self, notification: EngineNotification) -> bool {
        let sink = self.state.lock().sink.clone();
        sink.map_or(false, |sink| sink.notify(notification))
    }

    pub fn emit_call_state(&self, call: EngineCallId, state: EngineCallState) -> bool {
        self.emit(EngineNotification::CallStateChanged {
            call,
            state,
            remote_uri: None,
            message: format!("{:?}", state),
        })
    }

    /// Simulate an INVITE from `remote_uri`; returns the new call handle
    pub fn emit_incoming(&self, remote_uri: &str) -> EngineCallId {
        let call = self.allocate_call();
        self.emit(EngineNotification::CallStateChanged {
            call,
            state: EngineCallState::IncomingReceived,
            remote_uri: Some(remote_uri.to_string()),
            message: "Incoming call".to_string(),
        });
        call
    }

    /// Registration update for the most recently registered account
    pub fn emit_registration(&self, state: EngineRegistrationState, message: &str) -> bool {
        match self.last_account() {
            Some(account) => self.emit_registration_for(account, state, message),
            None => false,
        }
    }

    pub fn emit_registration_for(&self, account: EngineAccountId, state: EngineRegistrationState, message: &str) -> bool {
        self.emit(EngineNotification::RegistrationStateChanged {
            account,
            state,
            message: message.to_string(),
        })
    }

    pub fn emit_devices_changed(&self) -> bool {
        self.emit(EngineNotification::AudioDevicesListUpdated)
    }

    fn allocate_call(&self) -> EngineCallId {
        let mut state = self.state.lock();
        let call = EngineCallId(state.next_call);
        state.next_call += 1;
        call
    }

    fn maybe_panic(&self, method: &'static str) {
        // Lock released before unwinding
        let panics = self.state.lock().panicking.contains(method);
        if panics {
            panic!("test engine: {} panicked", method);
        }
    }

    /// Record `op`, failing instead when `method` is marked as failing
    fn record(&self, method: &'static str, op: EngineOp) -> EngineResult<()> {
        self.maybe_panic(method);
        let mut state = self.state.lock();
        if let Some(detail) = state.failing.get(method) {
            return Err(EngineError::new(detail.clone()));
        }
        state.ops.push(op);
        Ok(())
    }
}

impl Engine for TestEngine {
    fn start(&self, sink: NotificationSink) -> EngineResult<()> {
        self.record("start", EngineOp::Start)?;
        self.state.lock().sink = Some(sink);
        Ok(())
    }

    fn stop(&self) -> EngineResult<()> {
        self.record("stop", EngineOp::Stop)?;
        self.state.lock().sink = None;
        Ok(())
    }

    fn has_builtin_echo_canceller(&self) -> bool {
        self.state.lock().builtin_echo_canceller
    }

    fn set_echo_cancellation(&self, enabled: bool) -> EngineResult<()> {
        self.record("set_echo_cancellation", EngineOp::SetEchoCancellation(enabled))
    }

    fn register(&self, params: &AccountParams) -> EngineResult<EngineAccountId> {
        self.record(
            "register",
            EngineOp::Register {
                identity: params.identity.clone(),
                server_address: params.server_address.clone(),
            },
        )?;

        let (account, reply) = {
            let mut state = self.state.lock();
            let account = EngineAccountId(state.next_account);
            state.next_account += 1;
            (account, state.registration_reply.clone())
        };
        if let Some((state, message)) = reply {
            self.emit_registration_for(account, EngineRegistrationState::Progress, "Registration in progress");
            self.emit_registration_for(account, state, &message);
        }
        Ok(account)
    }

    fn clear_accounts(&self) -> EngineResult<()> {
        self.record("clear_accounts", EngineOp::ClearAccounts)
    }

    fn invite(&self, address: &SipAddress, params: &CallParams) -> EngineResult<EngineCallId> {
        self.record(
            "invite",
            EngineOp::Invite {
                uri: address.to_string(),
                params: params.clone(),
            },
        )?;
        let call = self.allocate_call();
        self.state.lock().negotiated.insert(call, params.clone());
        Ok(call)
    }

    fn accept(&self, call: EngineCallId, params: &CallParams) -> EngineResult<()> {
        self.record("accept", EngineOp::Accept { call, params: params.clone() })?;
        self.state.lock().negotiated.insert(call, params.clone());
        Ok(())
    }

    fn decline(&self, call: EngineCallId, reason: DeclineReason) -> EngineResult<()> {
        self.record("decline", EngineOp::Decline { call, reason })
    }

    fn terminate(&self, call: EngineCallId) -> EngineResult<()> {
        self.record("terminate", EngineOp::Terminate(call))
    }

    fn update(&self, call: EngineCallId, params: &CallParams) -> EngineResult<()> {
        self.record("update", EngineOp::Update { call, params: params.clone() })?;
        self.state.lock().negotiated.insert(call, params.clone());
        Ok(())
    }

    fn negotiated_params(&self, call: EngineCallId) -> EngineResult<CallParams> {
        self.state
            .lock()
            .negotiated
            .get(&call)
            .cloned()
            .ok_or_else(|| EngineError::new(format!("unknown call {}", call)))
    }

    fn send_dtmf(&self, call: EngineCallId, digit: DtmfDigit) -> EngineResult<()> {
        self.record("send_dtmf", EngineOp::SendDtmf { call, digit: digit.as_char() })
    }

    fn mic_enabled(&self) -> bool {
        self.state.lock().mic_enabled
    }

    fn set_mic_enabled(&self, enabled: bool) -> EngineResult<()> {
        self.record("set_mic_enabled", EngineOp::SetMicEnabled(enabled))?;
        self.state.lock().mic_enabled = enabled;
        Ok(())
    }

    fn audio_devices(&self) -> EngineResult<Vec<AudioDevice>> {
        self.maybe_panic("audio_devices");
        let state = self.state.lock();
        if let Some(detail) = state.failing.get("audio_devices") {
            return Err(EngineError::new(detail.clone()));
        }
        Ok(state.devices.clone())
    }

    fn input_device(&self) -> Option<AudioDevice> {
        self.state.lock().input.clone()
    }

    fn output_device(&self) -> Option<AudioDevice> {
        self.state.lock().output.clone()
    }

    fn default_output_device(&self) -> Option<AudioDevice> {
        self.state.lock().default_output.clone()
    }

    fn set_input_device(&self, device: &AudioDevice) -> EngineResult<()> {
        self.record("set_input_device", EngineOp::SetInputDevice(device.id.clone()))?;
        self.state.lock().input = Some(device.clone());
        Ok(())
    }

    fn set_output_device(&self, device: &AudioDevice) -> EngineResult<()> {
        self.record("set_output_device", EngineOp::SetOutputDevice(device.id.clone()))?;
        self.state.lock().output = Some(device.clone());
        Ok(())
    }

    fn video_devices(&self) -> Vec<String> {
        self.state.lock().cameras.clone()
    }

    fn video_device(&self) -> Option<String> {
        self.state.lock().camera.clone()
    }

    fn set_video_device(&self, device: &str) -> EngineResult<()> {
        self.record("set_video_device", EngineOp::SetVideoDevice(device.to_string()))?;
        self.state.lock().camera = Some(device.to_string());
        Ok(())
    }

    fn set_native_video_window(&self, handle: VideoSurfaceHandle) -> EngineResult<()> {
        self.record("set_native_video_window", EngineOp::SetNativeVideoWindow(handle))
    }

    fn enable_video(&self, capture: bool, display: bool, auto_accept: bool) -> EngineResult<()> {
        self.record(
            "enable_video",
            EngineOp::EnableVideo {
                capture,
                display,
                auto_accept,
            },
        )
    }

    fn set_static_image(&self, source: Option<&StaticImageSource>) -> EngineResult<()> {
        self.record(
            "set_static_image",
            EngineOp::SetStaticImage(source.map(|s| s.image_path.clone())),
        )
    }
}

/// Audio session double recording every profile it is asked to apply
#[derive(Debug, Clone, Default)]
pub struct RecordingAudioSession {
    profiles: Arc<Mutex<Vec<AudioSessionProfile>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingAudioSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `configure` fail
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn profiles(&self) -> Vec<AudioSessionProfile> {
        self.profiles.lock().clone()
    }
}

impl AudioSessionConfigurator for RecordingAudioSession {
    fn configure(&self, profile: &AudioSessionProfile) -> Result<(), AudioSessionError> {
        self.profiles.lock().push(*profile);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AudioSessionError("session busy".to_string()));
        }
        Ok(())
    }
}
