use hapsync_core::service::PlaybackState;
use hapsync_core::{DotGateway, HapticSignal, PlaybackHandle};
use hapsync_types::clock::{format_clock, parse_clock};
use tokio::sync::broadcast;

pub async fn play(handle: &PlaybackHandle) {
    report(handle.play().await);
}

pub async fn pause(handle: &PlaybackHandle) {
    report(handle.pause().await);
}

pub async fn seek(handle: &PlaybackHandle, to: &str) {
    match parse_clock(to) {
        Some(position) => report(handle.seek(position).await),
        None => println!("Invalid position \"{to}\" (expected m:ss)"),
    }
}

pub async fn stop(handle: &PlaybackHandle) {
    report(handle.stop().await);
}

pub async fn reset(handle: &PlaybackHandle) {
    report(handle.reset().await);
}

pub async fn status(handle: &PlaybackHandle) {
    let status = match handle.status().await {
        Ok(status) => status,
        Err(e) => {
            println!("Playback service unavailable: {e}");
            return;
        }
    };
    let state = match status.state {
        PlaybackState::Stopped => "stopped",
        PlaybackState::Playing => "playing",
        PlaybackState::Paused => "paused",
        PlaybackState::Ended => "ended",
    };
    println!("{} ({state})", format_clock(status.position));
    if !status.loaded {
        println!("  no sequence loaded");
    }
    for name in &status.active_sessions {
        println!("  session: {name}");
    }
    for name in &status.one_shots {
        println!("  one-shot: {name}");
    }
}

pub async fn devices(gateway: &DotGateway) {
    if !gateway.is_ready() {
        println!("Gateway not ready");
    }
    for address in gateway.addresses() {
        let Some(state) = gateway.device_state(address).await else {
            continue;
        };
        println!(
            "  dot {address}: led ({}, {}, {})  vibration {:.1} Hz @ {:.2}{}  thermal {:+.2}",
            state.led.r,
            state.led.g,
            state.led.b,
            state.vibration.frequency,
            state.vibration.intensity,
            if state.vibration.enable { "" } else { " (off)" },
            state.thermal,
        );
    }
}

/// Print signals as they arrive until the bus closes
pub async fn print_signals(mut rx: broadcast::Receiver<HapticSignal>) {
    loop {
        match rx.recv().await {
            Ok(HapticSignal::EventTriggered { event, position }) => {
                println!("[{}] {event}", format_clock(position));
            }
            Ok(HapticSignal::PageShouldChange { page }) => println!("-> page {page}"),
            Ok(HapticSignal::ContinuousEffectTick { .. }) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!(skipped = n, "Signal printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn report(result: Result<(), String>) {
    if let Err(e) = result {
        println!("Playback service unavailable: {e}");
    }
}
