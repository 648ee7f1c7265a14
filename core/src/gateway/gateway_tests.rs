//! Tests for DotGateway against the recording transport

use std::sync::Arc;
use std::time::Duration;

use super::*;

fn make_gateway(addresses: &[u8]) -> (Arc<MemoryTransport>, DotGateway) {
    let transport = Arc::new(MemoryTransport::new(addresses));
    let gateway = DotGateway::new(transport.clone(), addresses, Duration::from_millis(500));
    (transport, gateway)
}

#[tokio::test(start_paused = true)]
async fn test_write_before_start_is_noop() {
    let (transport, gateway) = make_gateway(&[1, 2]);

    let result = gateway.set_led(1, Rgb::RED).await;
    assert!(matches!(result, Err(GatewayError::NotStarted)));
    assert_eq!(transport.write_count(), 0);
    assert_eq!(gateway.reset_all().await, ResetReport::default());
}

#[tokio::test(start_paused = true)]
async fn test_write_updates_mirror() {
    let (transport, gateway) = make_gateway(&[1, 2]);
    gateway.start().await.unwrap();

    gateway.set_led(1, Rgb::RED).await.unwrap();
    gateway
        .set_vibration(1, Vibration::on(30.0, 0.3))
        .await
        .unwrap();

    let state = gateway.device_state(1).await.unwrap();
    assert_eq!(state.led, Rgb::RED);
    assert!(state.vibration.enable);
    assert_eq!(transport.writes_to(1).len(), 2);
    assert!(transport.writes_to(2).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_device_rejected() {
    let (transport, gateway) = make_gateway(&[1]);
    gateway.start().await.unwrap();

    let result = gateway.set_thermal(9, 0.5).await;
    assert!(matches!(result, Err(GatewayError::UnknownDevice(9))));
    assert_eq!(transport.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_write_leaves_mirror_untouched() {
    let (transport, gateway) = make_gateway(&[1]);
    gateway.start().await.unwrap();
    gateway.set_led(1, Rgb::WHITE).await.unwrap();

    transport.fail_device(1);
    let result = gateway.set_led(1, Rgb::RED).await;
    assert!(matches!(result, Err(GatewayError::Transport { address: 1, .. })));
    assert_eq!(gateway.device_state(1).await.unwrap().led, Rgb::WHITE);
    assert_eq!(transport.rejected_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_write_timeout_is_bounded() {
    let (transport, gateway) = make_gateway(&[1]);
    gateway.start().await.unwrap();
    transport.set_latency(Duration::from_secs(5));

    let started = tokio::time::Instant::now();
    let result = gateway.set_led(1, Rgb::RED).await;
    assert!(matches!(result, Err(GatewayError::Timeout { address: 1 })));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(gateway.device_state(1).await.unwrap().led, Rgb::OFF);
}

#[tokio::test(start_paused = true)]
async fn test_reset_all_order_per_device() {
    let (transport, gateway) = make_gateway(&[1, 2]);
    gateway.start().await.unwrap();

    let report = gateway.reset_all().await;
    assert!(report.is_clean());
    assert_eq!(report.devices, 2);

    for address in [1, 2] {
        let order: Vec<_> = transport
            .writes_to(address)
            .iter()
            .map(|w| w.update.channels().in_reset_order().next().unwrap())
            .collect();
        assert_eq!(order, vec![Channel::Thermal, Channel::Led, Channel::Vibration]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_reset_all_tolerates_failing_device() {
    let (transport, gateway) = make_gateway(&[1, 2]);
    gateway.start().await.unwrap();
    gateway.set_led(2, Rgb::RED).await.unwrap();
    transport.fail_device(1);

    let report = gateway.reset_all().await;
    assert_eq!(report.devices, 2);
    assert_eq!(report.failures.len(), 3);
    assert!(report.failures.iter().all(|(a, _)| *a == 1));
    assert!(gateway.device_state(2).await.unwrap().is_at_rest());
}

#[tokio::test(start_paused = true)]
async fn test_reset_leds_only_touches_led() {
    let (transport, gateway) = make_gateway(&[1, 2]);
    gateway.start().await.unwrap();
    gateway
        .write(1, ChannelUpdate::led(Rgb::RED).with_thermal(0.4))
        .await
        .unwrap();
    transport.clear();

    gateway.reset_leds().await;

    let writes = transport.writes();
    assert_eq!(writes.len(), 2);
    assert!(writes.iter().all(|w| w.update == ChannelUpdate::led(Rgb::OFF)));
    assert_eq!(gateway.device_state(1).await.unwrap().thermal, 0.4);
}

#[tokio::test(start_paused = true)]
async fn test_refused_connect_leaves_gateway_disabled() {
    let (transport, gateway) = make_gateway(&[1]);
    transport.refuse_connect();

    assert!(gateway.start().await.is_err());
    assert!(!gateway.is_started());
    assert!(gateway.set_led(1, Rgb::RED).await.is_err());
    assert_eq!(transport.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_gateway() {
    let gateway = DotGateway::disabled(&[1, 2]);
    assert!(gateway.start().await.is_err());
    assert!(!gateway.is_connected());
    assert_eq!(gateway.addresses(), vec![1, 2]);
    assert!(matches!(
        gateway.set_led(1, Rgb::RED).await,
        Err(GatewayError::NotStarted)
    ));
}

// ─────────────────────────────────────────────────────────────────────────────
// Channel locks
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_try_hold_fails_while_held() {
    let locks = ChannelLocks::new(&[1, 2]);
    let guard = locks.hold(2, Channel::Led).await;

    assert!(locks.is_held(2, Channel::Led));
    assert!(locks.try_hold(2, Channel::Led).is_none());
    assert!(locks.try_hold(2, Channel::Vibration).is_some());
    assert!(locks.try_hold(1, Channel::Led).is_some());

    drop(guard);
    assert!(!locks.is_held(2, Channel::Led));
    assert!(locks.try_hold(2, Channel::Led).is_some());
}

#[tokio::test]
async fn test_unknown_channel_is_never_contended() {
    let locks = ChannelLocks::new(&[1]);
    let _a = locks.hold(7, Channel::Led).await;
    assert!(locks.try_hold(7, Channel::Led).is_some());
}
