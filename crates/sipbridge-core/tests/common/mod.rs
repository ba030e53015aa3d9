#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use sipbridge_core::engine::EngineRegistrationState;
use sipbridge_core::testing::{EngineOp, TestEngine};
use sipbridge_core::{BridgeConfig, BridgeEvent, EventName, SipBridge};
use tokio::sync::broadcast;
use tokio::time::timeout;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sipbridge_core=debug")
        .with_test_writer()
        .try_init();
}

/// Spawned and initialised bridge over `engine`
pub async fn started_bridge(engine: &TestEngine, config: BridgeConfig) -> SipBridge {
    let bridge = SipBridge::spawn(Arc::new(engine.clone()), config).expect("valid config");
    bridge.initialise().await.expect("engine starts");
    bridge
}

/// Started bridge with `alice@example.com` registered
pub async fn registered_bridge(engine: &TestEngine) -> SipBridge {
    engine.reply_to_register(EngineRegistrationState::Ok, "Registration successful");
    let bridge = started_bridge(engine, BridgeConfig::default()).await;
    bridge
        .login("alice", "secret", "example.com")
        .await
        .expect("registration succeeds");
    bridge
}

pub async fn next_event(rx: &mut broadcast::Receiver<BridgeEvent>) -> BridgeEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

pub async fn expect_events(rx: &mut broadcast::Receiver<BridgeEvent>, expected: &[EventName]) {
    for name in expected {
        assert_eq!(next_event(rx).await.name, *name);
    }
}

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_until(condition: impl Fn() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub async fn wait_for_op(engine: &TestEngine, matches: impl Fn(&EngineOp) -> bool) {
    wait_until(|| engine.ops().iter().any(&matches)).await;
}
