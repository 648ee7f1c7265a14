//! Tests for the pattern library on virtual time

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use hapsync_types::PatternKind;
use tokio::time::{Instant, sleep};

use super::*;
use crate::gateway::{Rgb, Vibration, WriteRecord};
use crate::signals::HapticSignal;
use crate::testing::{led_writes, make_env, spawn_pattern};

fn is_blue(w: &WriteRecord) -> bool {
    w.update
        .led
        .is_some_and(|c| c.r == 0 && c.g == 0 && c.b > 0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Cancellation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_pre_cancelled_patterns_write_nothing() {
    for kind in [
        PatternKind::AlternatingFlash,
        PatternKind::RhythmicPulse,
        PatternKind::GraySwell,
        PatternKind::BlueSwell,
        PatternKind::Wait,
    ] {
        let (transport, env) = make_env().await;
        let (handle, token) = cancel_pair();
        handle.cancel();
        let ctx = PatternContext::new(env, token);

        let result = run_pattern(&ctx, kind, false, Duration::from_secs(5)).await;
        assert_eq!(result, Err(Cancelled), "{kind:?}");
        assert_eq!(transport.write_count(), 0, "{kind:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_flash_between_writes() {
    let (transport, env) = make_env().await;
    let (handle, task) = spawn_pattern(&env, PatternKind::AlternatingFlash, false, Duration::from_secs(10));

    sleep(Duration::from_millis(600)).await;
    handle.cancel();
    assert_eq!(task.await.unwrap(), Err(Cancelled));

    let written = transport.write_count();
    assert_eq!(written, 3);
    sleep(Duration::from_secs(2)).await;
    assert_eq!(transport.write_count(), written);
}

#[tokio::test(start_paused = true)]
async fn test_reset_touched_restores_written_channels() {
    let (transport, env) = make_env().await;
    let (_handle, token) = cancel_pair();
    let ctx = PatternContext::new(env.clone(), token);

    ctx.write(2, ChannelUpdate::vibration(Vibration::on(30.0, 0.3)).with_thermal(0.5))
        .await
        .unwrap();
    ctx.write(1, ChannelUpdate::led(Rgb::RED)).await.unwrap();
    transport.clear();

    let report = ctx.reset_touched().await;
    assert!(report.is_clean());

    let writes = transport.writes();
    assert_eq!(writes.len(), 3);
    assert_eq!(writes[0].update, ChannelUpdate::reset(Channel::Led));
    assert_eq!(writes[1].update, ChannelUpdate::reset(Channel::Thermal));
    assert_eq!(writes[2].update, ChannelUpdate::reset(Channel::Vibration));
    assert!(env.gateway.device_state(2).await.unwrap().is_at_rest());
    assert!(ctx.touched().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_led_switch_drops_visual_writes_mid_run() {
    let (transport, env) = make_env().await;
    let (_handle, token) = cancel_pair();
    let switch = Arc::new(AtomicBool::new(false));
    let ctx = PatternContext::new(env, token).with_led_suppression(switch.clone());

    ctx.write(1, ChannelUpdate::led(Rgb::RED)).await.unwrap();
    switch.store(true, Ordering::Release);
    assert!(ctx.is_led_suppressed());
    ctx.write(1, ChannelUpdate::led(Rgb::WHITE)).await.unwrap();
    ctx.write(2, ChannelUpdate::led(Rgb::WHITE).with_thermal(0.3)).await.unwrap();

    let writes = transport.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].update, ChannelUpdate::led(Rgb::RED));
    assert_eq!(writes[1].update, ChannelUpdate::thermal(0.3));
    assert!(!ctx.touched()[&2].contains(Channel::Led));
}

#[tokio::test(start_paused = true)]
async fn test_forget_channel_keeps_the_rest() {
    let (transport, env) = make_env().await;
    let (_handle, token) = cancel_pair();
    let ctx = PatternContext::new(env, token);

    ctx.write(1, ChannelUpdate::led(Rgb::RED).with_thermal(-0.2)).await.unwrap();
    ctx.write(2, ChannelUpdate::led(Rgb::RED)).await.unwrap();
    ctx.forget_channel(Channel::Led);
    assert_eq!(ctx.touched().len(), 1);
    transport.clear();

    ctx.reset_touched().await;
    let writes = transport.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].address, 1);
    assert_eq!(writes[0].update, ChannelUpdate::reset(Channel::Thermal));
}

// ─────────────────────────────────────────────────────────────────────────────
// Alternating flash
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_flash_alternates_every_250ms() {
    let (transport, env) = make_env().await;
    let mut signals = env.signals.subscribe();
    let start = Instant::now();

    let (_handle, task) = spawn_pattern(&env, PatternKind::AlternatingFlash, false, Duration::from_secs(1));
    assert_eq!(task.await.unwrap(), Ok(()));

    let writes = transport.writes();
    let colours = led_writes(&writes, 1);
    assert_eq!(colours, vec![Rgb::RED, Rgb::WHITE, Rgb::RED, Rgb::WHITE]);
    let offsets: Vec<u64> = writes
        .iter()
        .map(|w| (w.at - start).as_millis() as u64)
        .collect();
    assert_eq!(offsets, vec![0, 250, 500, 750]);
    assert!(transport.writes_to(2).is_empty());

    assert_eq!(
        signals.recv().await.unwrap(),
        HapticSignal::ContinuousEffectTick {
            effect: "AmbulanceSiren",
            phase: "Red"
        }
    );
    assert_eq!(
        signals.recv().await.unwrap(),
        HapticSignal::ContinuousEffectTick {
            effect: "AmbulanceSiren",
            phase: "White"
        }
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Rhythmic pulse
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_pulse_beat_shape() {
    let (transport, env) = make_env().await;
    let (_handle, task) = spawn_pattern(&env, PatternKind::RhythmicPulse, false, Duration::from_millis(400));
    assert_eq!(task.await.unwrap(), Ok(()));

    let writes = transport.writes_to(2);
    assert_eq!(writes.len(), 13);
    assert!(transport.writes_to(1).is_empty());

    let first = writes[0].update;
    assert_eq!(first.led, Some(Rgb::red(241)));
    assert_eq!(first.vibration.map(|v| v.enable), Some(false));

    let levels: Vec<u8> = led_writes(&writes, 2).iter().map(|c| c.r).collect();
    assert!(levels.windows(2).all(|w| w[0] > w[1]));
    assert_eq!(levels.last(), Some(&21));

    let beat = writes[12].update;
    assert!(beat.led.is_none());
    assert_eq!(beat.vibration.map(|v| v.enable), Some(true));
}

#[tokio::test(start_paused = true)]
async fn test_pulse_skips_locked_channels() {
    let (transport, env) = make_env().await;
    let _led = env.locks.hold(2, Channel::Led).await;

    let (_handle, task) = spawn_pattern(&env, PatternKind::RhythmicPulse, false, Duration::from_millis(400));
    assert_eq!(task.await.unwrap(), Ok(()));

    let writes = transport.writes_to(2);
    assert_eq!(writes.len(), 1);
    assert!(writes[0].update.led.is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// Counting flash
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_counting_flash_holds_one_second() {
    let (transport, env) = make_env().await;
    let start = Instant::now();

    let (_handle, task) = spawn_pattern(&env, PatternKind::CountingFlash, false, Duration::ZERO);
    assert_eq!(task.await.unwrap(), Ok(()));

    let writes = transport.writes();
    assert_eq!(writes.len(), 2);
    assert!(writes.iter().all(|w| w.address == 1));
    assert_eq!(writes[0].update.led, Some(Rgb::RED));
    assert_eq!(writes[0].update.vibration.map(|v| v.enable), Some(true));
    assert_eq!(writes[1].at - start, Duration::from_secs(1));
    assert!(writes[1].state.led.is_off());
    assert!(!writes[1].state.vibration.enable);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_count_takes_secondary() {
    let (transport, env) = make_env().await;
    let start = Instant::now();

    let (_handle, task) = spawn_pattern(&env, PatternKind::CountingFlash, true, Duration::ZERO);
    sleep(Duration::from_secs(1)).await;
    assert!(env.locks.is_held(2, Channel::Led));
    assert!(env.locks.is_held(2, Channel::Vibration));
    let secondary = env.gateway.device_state(2).await.unwrap();
    assert_eq!(secondary.led, Rgb::RED);
    assert!(!secondary.vibration.enable);

    assert_eq!(task.await.unwrap(), Ok(()));
    assert!(!env.locks.is_held(2, Channel::Led));

    let restore = transport.writes_to(2);
    let last = restore.last().unwrap();
    assert_eq!(last.update, ChannelUpdate::led(Rgb::OFF));
    assert_eq!(last.at - start, Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_terminal_count_restores_when_cancelled() {
    let (transport, env) = make_env().await;

    let (handle, task) = spawn_pattern(&env, PatternKind::CountingFlash, true, Duration::ZERO);
    sleep(Duration::from_millis(500)).await;
    handle.cancel();
    assert_eq!(task.await.unwrap(), Err(Cancelled));

    assert!(env.gateway.device_state(1).await.unwrap().led.is_off());
    assert!(env.gateway.device_state(2).await.unwrap().led.is_off());
    assert!(!env.locks.is_held(2, Channel::Led));
    assert!(!env.locks.is_held(2, Channel::Vibration));
    assert_eq!(transport.rejected_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_waits_out_terminal_count() {
    let (transport, env) = make_env().await;

    let (_count, count_task) = spawn_pattern(&env, PatternKind::CountingFlash, true, Duration::ZERO);
    let (_pulse, pulse_task) = spawn_pattern(&env, PatternKind::RhythmicPulse, false, Duration::from_millis(1500));
    assert_eq!(count_task.await.unwrap(), Ok(()));
    assert_eq!(pulse_task.await.unwrap(), Ok(()));

    // Nothing but the counting effect touched the secondary LED while it held it
    let secondary_leds = led_writes(&transport.writes_to(2), 2);
    assert_eq!(secondary_leds, vec![Rgb::RED, Rgb::OFF]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Swells
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_gray_swell_cycle() {
    let (transport, env) = make_env().await;

    let (_handle, task) = spawn_pattern(&env, PatternKind::GraySwell, false, Duration::from_millis(4050));
    assert_eq!(task.await.unwrap(), Ok(()));

    let writes = transport.writes();
    assert_eq!(writes[0].update, ChannelUpdate::vibration(Vibration::on(30.0, 0.3)));
    let tail: Vec<_> = writes[writes.len() - 2..].iter().map(|w| w.update).collect();
    assert!(tail.iter().all(|u| u.vibration.is_some_and(|v| !v.enable)));

    for address in [1, 2] {
        let levels: Vec<u8> = led_writes(&writes, address)
            .iter()
            .inspect(|c| assert!(c.r == c.g && c.g == c.b))
            .map(|c| c.r)
            .collect();
        assert_eq!(levels.first(), Some(&20));
        assert_eq!(levels.iter().max(), Some(&100));
        assert_eq!(levels.last(), Some(&21));
    }
    assert!(!env.swells.in_flight(Swell::Gray));
}

#[tokio::test(start_paused = true)]
async fn test_blue_waits_for_gray() {
    let (transport, env) = make_env().await;

    let (_gray_handle, gray) = spawn_pattern(&env, PatternKind::GraySwell, false, Duration::from_secs(60));
    sleep(Duration::from_millis(500)).await;
    let (_blue_handle, blue) = spawn_pattern(&env, PatternKind::BlueSwell, false, Duration::from_secs(60));
    sleep(Duration::from_secs(1)).await;

    assert!(gray.is_finished());
    assert_eq!(gray.await.unwrap(), Ok(()));
    assert!(!env.swells.in_flight(Swell::Gray));
    assert!(env.swells.in_flight(Swell::Blue));

    let writes = transport.writes();
    let first_blue = writes.iter().position(is_blue).unwrap();
    assert!(first_blue > 0);
    assert!(writes[first_blue..].iter().all(is_blue));
    // Gray switched its vibration off before handing over
    assert!(writes[..first_blue]
        .iter()
        .rev()
        .take(2)
        .all(|w| w.update.vibration.is_some_and(|v| !v.enable)));

    blue.abort();
}

#[tokio::test(start_paused = true)]
async fn test_gray_does_not_wait_for_blue() {
    let (transport, env) = make_env().await;

    let (_blue_handle, blue) = spawn_pattern(&env, PatternKind::BlueSwell, false, Duration::from_secs(60));
    sleep(Duration::from_millis(500)).await;
    let gray_started = Instant::now();
    let (_gray_handle, gray) = spawn_pattern(&env, PatternKind::GraySwell, false, Duration::from_secs(60));
    sleep(Duration::from_millis(10)).await;

    let first_gray = transport
        .writes()
        .into_iter()
        .find(|w| w.update.vibration.is_some())
        .unwrap();
    assert_eq!(first_gray.at, gray_started);

    sleep(Duration::from_millis(200)).await;
    assert!(blue.is_finished());
    assert_eq!(blue.await.unwrap(), Ok(()));
    assert!(env.swells.in_flight(Swell::Gray));

    gray.abort();
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_gray_cleans_up_before_blue() {
    let (transport, env) = make_env().await;

    let (gray_handle, gray) = spawn_pattern(&env, PatternKind::GraySwell, false, Duration::from_secs(60));
    sleep(Duration::from_millis(300)).await;
    gray_handle.cancel();
    assert_eq!(gray.await.unwrap(), Err(Cancelled));

    for address in [1, 2] {
        assert!(env.gateway.device_state(address).await.unwrap().is_at_rest());
    }
    assert!(!env.swells.in_flight(Swell::Gray));
    assert!(transport.write_count() > 0);
}
