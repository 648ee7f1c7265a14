//! Shared fixtures for the engine's unit tests

use std::sync::Arc;
use std::time::Duration;

use hapsync_types::{DeviceRoles, PatternKind};
use tokio::task::JoinHandle;

use crate::gateway::{ChannelLocks, DotGateway, MemoryTransport, Rgb, WriteRecord};
use crate::patterns::{
    CancelHandle, PatternContext, PatternEnv, StepResult, SwellCoordinator, cancel_pair, run_pattern,
};
use crate::signals::SignalBus;

pub(crate) const DEVICES: [u8; 2] = [1, 2];

/// Environment over a started gateway backed by a recording transport
pub(crate) async fn make_env() -> (Arc<MemoryTransport>, PatternEnv) {
    let transport = Arc::new(MemoryTransport::new(&DEVICES));
    let gateway = Arc::new(DotGateway::new(
        transport.clone(),
        &DEVICES,
        Duration::from_millis(500),
    ));
    gateway.start().await.unwrap();
    let env = PatternEnv {
        gateway,
        locks: Arc::new(ChannelLocks::new(&DEVICES)),
        swells: Arc::new(SwellCoordinator::default()),
        signals: SignalBus::new(),
        roles: DeviceRoles::default(),
    };
    (transport, env)
}

pub(crate) fn spawn_pattern(
    env: &PatternEnv,
    kind: PatternKind,
    terminal: bool,
    duration: Duration,
) -> (CancelHandle, JoinHandle<StepResult>) {
    let (handle, token) = cancel_pair();
    let ctx = PatternContext::new(env.clone(), token);
    let task = tokio::spawn(async move { run_pattern(&ctx, kind, terminal, duration).await });
    (handle, task)
}

/// LED values written to one device, in order
pub(crate) fn led_writes(writes: &[WriteRecord], address: u8) -> Vec<Rgb> {
    writes
        .iter()
        .filter(|w| w.address == address)
        .filter_map(|w| w.update.led)
        .collect()
}
