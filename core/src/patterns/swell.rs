//! Brightness swells and their mutual exclusion.
//!
//! Only one swell runs at a time. A blue swell asks a running gray swell to
//! end early and waits until it has finished before writing anything. A gray
//! swell asks a running blue swell to end early but does not wait: the river
//! scene supersedes the grey faces, never the other way round.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use super::cancel::{CancelHandle, CancelToken, cancel_pair};
use super::entry::apply_entry_setpoints;
use super::{Cancelled, PatternContext, StepResult};
use crate::gateway::{Channel, ChannelUpdate, Rgb, Vibration};
use crate::timeline::EntrySetpoint;

const SWELL_LOW: u8 = 20;
const SWELL_HIGH: u8 = 100;
const SWELL_UP_STEP: u8 = 2;
const SWELL_FLOOR: u8 = 21;
const STEP_DELAY: Duration = Duration::from_millis(50);
const BLUE_SETTLE: Duration = Duration::from_millis(80);
const GRAY_VIBRATION: Vibration = Vibration::on(30.0, 0.3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Swell {
    Gray,
    Blue,
}

impl Swell {
    fn effect(self) -> &'static str {
        match self {
            Swell::Gray => "HarshGray",
            Swell::Blue => "BlueShades",
        }
    }

    fn colour(self, level: u8) -> Rgb {
        match self {
            Swell::Gray => Rgb::gray(level),
            Swell::Blue => Rgb::blue(level),
        }
    }

    fn down_step(self) -> u8 {
        match self {
            Swell::Gray => 2,
            Swell::Blue => 1,
        }
    }
}

#[derive(Debug)]
struct SwellRun {
    id: u64,
    end_early: CancelHandle,
    done: watch::Receiver<()>,
}

#[derive(Debug, Default)]
struct Slots {
    gray: Option<SwellRun>,
    blue: Option<SwellRun>,
}

impl Slots {
    fn get_mut(&mut self, variant: Swell) -> &mut Option<SwellRun> {
        match variant {
            Swell::Gray => &mut self.gray,
            Swell::Blue => &mut self.blue,
        }
    }
}

#[derive(Debug, Default)]
pub struct SwellCoordinator {
    slots: Mutex<Slots>,
    next_id: AtomicU64,
}

/// Registration of a running swell. Dropping it signals completion.
#[derive(Debug)]
pub struct SwellTicket {
    coordinator: Arc<SwellCoordinator>,
    variant: Swell,
    id: u64,
    end_early: CancelToken,
    _done: watch::Sender<()>,
}

impl SwellTicket {
    pub fn ended_early(&self) -> bool {
        self.end_early.is_cancelled()
    }
}

impl Drop for SwellTicket {
    fn drop(&mut self) {
        let mut slots = self.coordinator.slots();
        let slot = slots.get_mut(self.variant);
        if slot.as_ref().is_some_and(|run| run.id == self.id) {
            *slot = None;
        }
    }
}

impl SwellCoordinator {
    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn in_flight(&self, variant: Swell) -> bool {
        self.slots().get_mut(variant).is_some()
    }

    /// Register a swell, resolving any conflict with the other variant first.
    /// Fails only if `cancel` fires while waiting.
    pub async fn begin(
        self: &Arc<Self>,
        variant: Swell,
        cancel: &CancelToken,
    ) -> Result<SwellTicket, Cancelled> {
        match variant {
            Swell::Blue => {
                let gray_done = self.slots().gray.as_ref().map(|run| {
                    run.end_early.cancel();
                    run.done.clone()
                });
                if let Some(mut done) = gray_done {
                    tracing::debug!("Blue swell waiting for gray swell to finish");
                    tokio::select! {
                        _ = async { while done.changed().await.is_ok() {} } => {}
                        _ = cancel.cancelled() => return Err(Cancelled),
                    }
                }
            }
            Swell::Gray => {
                if let Some(run) = self.slots().blue.as_ref() {
                    tracing::debug!("Gray swell ending blue swell early");
                    run.end_early.cancel();
                }
            }
        }

        let (end_handle, end_early) = cancel_pair();
        let (done_tx, done_rx) = watch::channel(());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let previous = self.slots().get_mut(variant).replace(SwellRun {
            id,
            end_early: end_handle,
            done: done_rx,
        });
        if let Some(previous) = previous {
            previous.end_early.cancel();
        }

        Ok(SwellTicket {
            coordinator: Arc::clone(self),
            variant,
            id,
            end_early,
            _done: done_tx,
        })
    }
}

/// Claim the swell slot, apply `entry`, then repeat swell cycles until the
/// duration elapses or another swell asks this one to end early.
pub(super) async fn swell(
    ctx: &PatternContext,
    variant: Swell,
    entry: &[EntrySetpoint],
    duration: Duration,
) -> StepResult {
    let ticket = ctx
        .env()
        .swells
        .begin(variant, ctx.cancel_token())
        .await?;
    let deadline = Instant::now() + duration;

    let outcome = async {
        apply_entry_setpoints(ctx, entry).await?;
        while !ticket.ended_early() && Instant::now() < deadline {
            swell_cycle(ctx, variant, &ticket, deadline).await?;
        }
        Ok(())
    }
    .await;

    // Clean up before the ticket signals completion to a waiting swell.
    // An ended-early swell leaves the LEDs to its successor.
    if outcome.is_ok() && ticket.ended_early() {
        tracing::debug!(effect = variant.effect(), "Swell ended early");
        ctx.forget_channel(Channel::Led);
        ctx.reset_touched().await;
    } else if outcome.is_err() {
        ctx.reset_touched().await;
    }
    drop(ticket);
    outcome
}

async fn swell_cycle(
    ctx: &PatternContext,
    variant: Swell,
    ticket: &SwellTicket,
    deadline: Instant,
) -> StepResult {
    let interrupted = || ticket.ended_early() || Instant::now() >= deadline;

    if variant == Swell::Gray {
        ctx.write_all(ChannelUpdate::vibration(GRAY_VIBRATION))
            .await?;
    }

    ctx.tick(variant.effect(), "PulseUp");
    let mut level = SWELL_LOW;
    while level <= SWELL_HIGH && !interrupted() {
        ctx.write_all(ChannelUpdate::led(variant.colour(level)))
            .await?;
        ctx.sleep(STEP_DELAY).await?;
        level += SWELL_UP_STEP;
    }

    ctx.tick(variant.effect(), "PulseDown");
    let mut level = SWELL_HIGH;
    while level > SWELL_LOW && !interrupted() {
        ctx.write_all(ChannelUpdate::led(variant.colour(level)))
            .await?;
        ctx.sleep(STEP_DELAY).await?;
        level -= variant.down_step();
    }

    if !ticket.ended_early() {
        ctx.write_all(ChannelUpdate::led(variant.colour(SWELL_FLOOR)))
            .await?;
    }
    if variant == Swell::Gray {
        ctx.write_all(ChannelUpdate::vibration(GRAY_VIBRATION.halted()))
            .await?;
    }
    if variant == Swell::Blue && !interrupted() {
        ctx.sleep(BLUE_SETTLE).await?;
    }
    Ok(())
}
