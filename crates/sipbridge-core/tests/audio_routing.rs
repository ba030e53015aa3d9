mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sipbridge_core::audio::AudioSessionMode;
use sipbridge_core::testing::{EngineOp, RecordingAudioSession, TestEngine};
use sipbridge_core::{BridgeConfig, BridgeError, EventName, RouteName, SipBridge};
use tokio::sync::broadcast::error::TryRecvError;

use common::*;

fn quick_debounce() -> BridgeConfig {
    BridgeConfig::default().with_device_change_debounce(Duration::from_millis(20))
}

#[tokio::test]
async fn test_scan_reports_current_route_and_options() {
    let engine = TestEngine::with_phone_devices();
    let bridge = started_bridge(&engine, BridgeConfig::default()).await;

    let snapshot = bridge.scan_audio_devices().await.unwrap();
    assert_eq!(snapshot.current, RouteName::Phone);
    assert_eq!(
        serde_json::to_value(&snapshot).unwrap(),
        json!({
            "current": "phone",
            "options": {"phone": true, "bluetooth": false, "loudspeaker": true}
        })
    );
}

#[tokio::test]
async fn test_scan_before_initialise() {
    let engine = TestEngine::with_phone_devices();
    let bridge = SipBridge::spawn(Arc::new(engine), BridgeConfig::default()).unwrap();

    assert_eq!(bridge.scan_audio_devices().await, Err(BridgeError::EngineUnavailable));
    assert_eq!(bridge.loud_audio().await, Err(BridgeError::EngineUnavailable));
}

#[tokio::test]
async fn test_no_devices_means_no_route() {
    let engine = TestEngine::new();
    let bridge = started_bridge(&engine, BridgeConfig::default()).await;

    assert_eq!(bridge.scan_audio_devices().await, Err(BridgeError::NoAudioRoute));
    assert!(!bridge.loud_audio().await.unwrap());
}

#[tokio::test]
async fn test_route_switching_publishes_only_on_success() {
    init_tracing();
    let engine = TestEngine::with_phone_devices();
    let bridge = started_bridge(&engine, BridgeConfig::default()).await;
    let mut rx = bridge.subscribe();

    assert!(bridge.loud_audio().await.unwrap());
    assert_eq!(next_event(&mut rx).await.name, EventName::AudioDevicesChanged);
    assert_eq!(engine.active_output(), Some(TestEngine::loud_speaker()));
    assert_eq!(bridge.scan_audio_devices().await.unwrap().current, RouteName::Loudspeaker);

    assert!(!bridge.bluetooth_audio().await.unwrap());
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    assert!(bridge.phone_audio().await.unwrap());
    assert_eq!(next_event(&mut rx).await.name, EventName::AudioDevicesChanged);
    assert_eq!(engine.active_output(), Some(TestEngine::earpiece()));
    assert_eq!(engine.active_input(), Some(TestEngine::microphone()));
}

#[tokio::test]
async fn test_device_change_burst_is_coalesced() {
    let engine = TestEngine::with_phone_devices();
    let config = BridgeConfig::default().with_device_change_debounce(Duration::from_millis(50));
    let bridge = started_bridge(&engine, config).await;
    let mut rx = bridge.subscribe();

    for _ in 0..5 {
        engine.emit_devices_changed();
    }

    assert_eq!(next_event(&mut rx).await.name, EventName::AudioDevicesChanged);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_zero_debounce_rescans_every_update() {
    let engine = TestEngine::with_phone_devices();
    let config = BridgeConfig::default().with_device_change_debounce(Duration::ZERO);
    let bridge = started_bridge(&engine, config).await;
    let mut rx = bridge.subscribe();

    engine.emit_devices_changed();
    engine.emit_devices_changed();

    expect_events(&mut rx, &[EventName::AudioDevicesChanged, EventName::AudioDevicesChanged]).await;
}

#[tokio::test]
async fn test_bluetooth_headset_arrives_and_leaves() {
    let engine = TestEngine::with_phone_devices();
    let bridge = started_bridge(&engine, quick_debounce()).await;
    let mut rx = bridge.subscribe();

    engine.add_device(TestEngine::bluetooth_headset());
    engine.emit_devices_changed();
    assert_eq!(next_event(&mut rx).await.name, EventName::AudioDevicesChanged);

    let snapshot = bridge.scan_audio_devices().await.unwrap();
    assert!(snapshot.options.bluetooth);
    assert_eq!(snapshot.current, RouteName::Phone);

    engine.clear_ops();
    assert!(bridge.bluetooth_audio().await.unwrap());
    // The headset has no separate capture entry, so the built-in mic is kept
    assert_eq!(
        engine.ops(),
        vec![
            EngineOp::SetInputDevice("mic".into()),
            EngineOp::SetOutputDevice("bt-headset".into()),
        ]
    );
    assert_eq!(next_event(&mut rx).await.name, EventName::AudioDevicesChanged);
    assert_eq!(bridge.scan_audio_devices().await.unwrap().current, RouteName::Bluetooth);

    engine.set_devices(vec![
        TestEngine::microphone(),
        TestEngine::earpiece(),
        TestEngine::loud_speaker(),
    ]);
    engine.emit_devices_changed();
    assert_eq!(next_event(&mut rx).await.name, EventName::AudioDevicesChanged);

    let snapshot = bridge.scan_audio_devices().await.unwrap();
    assert!(!snapshot.options.bluetooth);
    assert_eq!(snapshot.current, RouteName::Phone);
}

#[tokio::test]
async fn test_failed_rescan_still_notifies() {
    let engine = TestEngine::with_phone_devices();
    let bridge = started_bridge(&engine, quick_debounce()).await;
    let mut rx = bridge.subscribe();

    engine.fail_on("audio_devices", "device enumeration failed");
    engine.emit_devices_changed();
    assert_eq!(next_event(&mut rx).await.name, EventName::AudioDevicesChanged);

    assert_eq!(
        bridge.scan_audio_devices().await,
        Err(BridgeError::engine_rejected("device enumeration failed"))
    );
}

#[tokio::test]
async fn test_toggle_mute() {
    let engine = TestEngine::with_phone_devices();
    let bridge = started_bridge(&engine, BridgeConfig::default()).await;

    assert!(bridge.mic_enabled().await.unwrap());
    assert!(!bridge.toggle_mute().await.unwrap());
    assert!(!bridge.mic_enabled().await.unwrap());
    assert!(bridge.toggle_mute().await.unwrap());

    let toggles: Vec<_> = engine
        .ops()
        .into_iter()
        .filter(|op| matches!(op, EngineOp::SetMicEnabled(_)))
        .collect();
    assert_eq!(toggles, vec![EngineOp::SetMicEnabled(false), EngineOp::SetMicEnabled(true)]);
}

#[tokio::test]
async fn test_audio_session_follows_route() {
    let engine = TestEngine::with_phone_devices();
    let session = RecordingAudioSession::new();
    let bridge = SipBridge::builder(Arc::new(engine.clone()))
        .audio_session(Arc::new(session.clone()))
        .spawn()
        .unwrap();
    bridge.initialise().await.unwrap();

    bridge.loud_audio().await.unwrap();
    bridge.phone_audio().await.unwrap();

    let profiles = session.profiles();
    let modes: Vec<_> = profiles.iter().map(|p| p.mode).collect();
    assert_eq!(modes, vec![AudioSessionMode::Speaker, AudioSessionMode::Voice]);
    assert!(profiles.iter().all(|p| p.sample_rate == 48_000 && p.io_buffer_ms == 20));

    // A failing session never undoes the switch
    session.fail();
    assert!(bridge.loud_audio().await.unwrap());
    assert_eq!(engine.active_output(), Some(TestEngine::loud_speaker()));
}
