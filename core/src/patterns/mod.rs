//! Effect pattern library.
//!
//! Every routine takes a [`PatternContext`] and a duration and drives the
//! gateway until the duration elapses or the context is cancelled. Routines
//! return `Err(Cancelled)` from the first check point after cancellation, so
//! `?` unwinds them between any two hardware writes.

pub mod cancel;
mod counting;
mod entry;
mod flash;
mod pulse;
mod swell;

#[cfg(test)]
mod pattern_tests;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use hapsync_types::{DeviceRoles, PatternKind};
use tokio::time::Instant;

use crate::gateway::{Channel, ChannelSet, ChannelUpdate, DotGateway, ResetReport};
use crate::gateway::ChannelLocks;
use crate::signals::SignalBus;
use crate::timeline::EntrySetpoint;

pub use cancel::{CancelHandle, CancelToken, cancel_pair};
pub use entry::apply_entry_setpoints;
pub use swell::{Swell, SwellCoordinator, SwellTicket};

/// The routine observed cancellation and stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

pub type StepResult = Result<(), Cancelled>;

/// Shared collaborators every pattern may use
#[derive(Debug, Clone)]
pub struct PatternEnv {
    pub gateway: Arc<DotGateway>,
    pub locks: Arc<ChannelLocks>,
    pub swells: Arc<SwellCoordinator>,
    pub signals: SignalBus,
    pub roles: DeviceRoles,
}

/// Per-run state: the shared environment plus this run's cancellation token
/// and the ledger of channels it wrote.
#[derive(Debug)]
pub struct PatternContext {
    env: PatternEnv,
    cancel: CancelToken,
    touched: Mutex<BTreeMap<u8, ChannelSet>>,
    /// While set, the LED part of every write is dropped
    led_suppressed: Arc<AtomicBool>,
}

impl PatternContext {
    pub fn new(env: PatternEnv, cancel: CancelToken) -> Self {
        Self {
            env,
            cancel,
            touched: Mutex::new(BTreeMap::new()),
            led_suppressed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an LED suppression switch the owner can flip mid-run
    pub fn with_led_suppression(mut self, switch: Arc<AtomicBool>) -> Self {
        self.led_suppressed = switch;
        self
    }

    pub fn is_led_suppressed(&self) -> bool {
        self.led_suppressed.load(Ordering::Acquire)
    }

    pub fn env(&self) -> &PatternEnv {
        &self.env
    }

    pub fn gateway(&self) -> &DotGateway {
        &self.env.gateway
    }

    pub fn roles(&self) -> DeviceRoles {
        self.env.roles
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn check(&self) -> StepResult {
        if self.cancel.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    fn record(&self, address: u8, channels: ChannelSet) {
        let mut touched = self.touched.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = touched.entry(address).or_default();
        *entry = entry.union(channels);
    }

    /// Cancellable write. Hardware failures are logged by the gateway and
    /// otherwise ignored; the routine carries on as if the write applied.
    pub async fn write(&self, address: u8, update: ChannelUpdate) -> StepResult {
        self.check()?;
        let update = if self.is_led_suppressed() {
            update.without_led()
        } else {
            update
        };
        if !update.is_empty() {
            self.record(address, update.channels());
            let _ = self.env.gateway.write(address, update).await;
        }
        self.check()
    }

    /// Same update to every managed device, in address order
    pub async fn write_all(&self, update: ChannelUpdate) -> StepResult {
        for address in self.env.gateway.addresses() {
            self.write(address, update).await?;
        }
        Ok(())
    }

    /// Write only if none of the update's channels is locked by another
    /// routine. Returns whether the write was attempted.
    pub async fn write_unless_locked(&self, address: u8, update: ChannelUpdate) -> Result<bool, Cancelled> {
        self.check()?;
        let mut guards = Vec::new();
        for channel in update.channels().in_reset_order() {
            match self.env.locks.try_hold(address, channel) {
                Some(guard) => guards.push(guard),
                None => {
                    tracing::trace!(address, ?channel, "Channel locked; write skipped");
                    return Ok(false);
                }
            }
        }
        self.write(address, update).await?;
        drop(guards);
        Ok(true)
    }

    /// Non-cancellable write used for restoring state after a routine
    pub async fn restore(&self, address: u8, update: ChannelUpdate) {
        let _ = self.env.gateway.write(address, update).await;
    }

    /// Cancellable delay
    pub async fn sleep(&self, duration: Duration) -> StepResult {
        self.check()?;
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancel.cancelled() => Err(Cancelled),
        }
    }

    /// Sleep for `step`, but never past `deadline`
    pub async fn sleep_within(&self, step: Duration, deadline: Instant) -> StepResult {
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.sleep(step.min(remaining)).await
    }

    /// Park until cancelled
    pub async fn hold(&self) {
        self.cancel.cancelled().await;
    }

    pub fn tick(&self, effect: &'static str, phase: &'static str) {
        self.env.signals.effect_tick(effect, phase);
    }

    /// Channels written so far, per device
    pub fn touched(&self) -> BTreeMap<u8, ChannelSet> {
        self.touched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Hand one channel over to whoever writes it next: it is no longer
    /// reset by this run.
    pub fn forget_channel(&self, channel: Channel) {
        let mut touched = self.touched.lock().unwrap_or_else(PoisonError::into_inner);
        for channels in touched.values_mut() {
            channels.remove(channel);
        }
        touched.retain(|_, channels| !channels.is_empty());
    }

    /// Return every touched channel to rest, per device thermal then LED
    /// then vibration.
    pub async fn reset_touched(&self) -> ResetReport {
        let mut report = ResetReport::default();
        let touched = std::mem::take(
            &mut *self.touched.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for (address, channels) in touched {
            let order: Vec<Channel> = channels.in_reset_order().collect();
            self.env
                .gateway
                .reset_device(address, &order, &mut report)
                .await;
        }
        report
    }
}

/// Run one pattern for `duration`
pub async fn run_pattern(
    ctx: &PatternContext,
    kind: PatternKind,
    terminal: bool,
    duration: Duration,
) -> StepResult {
    match kind {
        PatternKind::AlternatingFlash => flash::alternating_flash(ctx, duration).await,
        PatternKind::RhythmicPulse => pulse::rhythmic_pulse(ctx, duration).await,
        PatternKind::CountingFlash => counting::counting_flash(ctx, terminal).await,
        PatternKind::GraySwell => swell::swell(ctx, Swell::Gray, &[], duration).await,
        PatternKind::BlueSwell => swell::swell(ctx, Swell::Blue, &[], duration).await,
        PatternKind::Wait => ctx.sleep(duration).await,
    }
}

/// Apply an event's entry setpoints, then run its pattern.
///
/// A swell claims its slot before the setpoints go out, so nothing is written
/// while a swell it has to wait for is still running.
pub async fn run_with_entry(
    ctx: &PatternContext,
    kind: PatternKind,
    entry: &[EntrySetpoint],
    duration: Duration,
) -> StepResult {
    match kind {
        PatternKind::GraySwell => swell::swell(ctx, Swell::Gray, entry, duration).await,
        PatternKind::BlueSwell => swell::swell(ctx, Swell::Blue, entry, duration).await,
        _ => {
            apply_entry_setpoints(ctx, entry).await?;
            run_pattern(ctx, kind, false, duration).await
        }
    }
}
