//! Continuous effect supervisor.
//!
//! Tracks one live task per event name plus in-flight one-shots. Stopping is
//! cooperative: the supervisor cancels a task's token and keeps its handle so
//! the next session of the same name (and tests) can wait for its cleanup.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Local};
use hapsync_types::PatternKind;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::patterns::{
    CancelHandle, Cancelled, PatternContext, PatternEnv, cancel_pair, run_pattern, run_with_entry,
};
use crate::timeline::{EntrySetpoint, HapticEvent};


/// Everything needed to start one continuous session
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub name: String,
    pub pattern: PatternKind,
    /// How long the pattern runs; the session then holds until stopped
    pub duration: Duration,
    pub entry: Vec<EntrySetpoint>,
    /// Start with the LED channel suppressed (visual-only events past the
    /// cutoff). Other channels are driven as usual.
    pub suppress_led: bool,
}

impl SessionRequest {
    /// Session for `event` entered at position `t`, running for the rest of
    /// its window
    pub fn for_event(event: &HapticEvent, t: Duration, suppress_led: bool) -> Self {
        Self {
            name: event.name.clone(),
            pattern: event.pattern,
            duration: event.end.saturating_sub(t),
            entry: event.entry.clone(),
            suppress_led,
        }
    }
}

/// Snapshot of a live session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub name: String,
    pub pattern: PatternKind,
    pub started_at: DateTime<Local>,
    pub suppressed: bool,
}

#[derive(Debug)]
struct Session {
    info: SessionInfo,
    cancel: CancelHandle,
    led_suppressed: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

#[derive(Debug)]
struct OneShotTask {
    name: String,
    cancel: CancelHandle,
    task: JoinHandle<()>,
}

/// Upper bound on waiting for stopped tasks before a reset-all
const MAX_CLEANUP_GRACE: Duration = Duration::from_secs(60);

/// Set to `true` once a reset-all has finished
type ResetBarrier = watch::Receiver<bool>;

#[derive(Debug)]
pub struct EffectSupervisor {
    env: PatternEnv,
    sessions: BTreeMap<String, Session>,
    /// Stopped sessions whose cleanup may still be running
    stopping: HashMap<String, JoinHandle<()>>,
    one_shots: Vec<OneShotTask>,
    /// Background gateway work (reset barrier, LED cutoff)
    housekeeping: Vec<JoinHandle<()>>,
    barrier: Option<ResetBarrier>,
}

impl EffectSupervisor {
    pub fn new(env: PatternEnv) -> Self {
        Self {
            env,
            sessions: BTreeMap::new(),
            stopping: HashMap::new(),
            one_shots: Vec::new(),
            housekeeping: Vec::new(),
            barrier: None,
        }
    }

    pub fn env(&self) -> &PatternEnv {
        &self.env
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.sessions.contains_key(name)
    }

    pub fn is_suppressed(&self, name: &str) -> bool {
        self.sessions.get(name).is_some_and(|s| s.info.suppressed)
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions.values().map(|s| s.info.clone()).collect()
    }

    /// One-shots that have not finished yet
    pub fn one_shots_in_flight(&self) -> Vec<String> {
        self.one_shots
            .iter()
            .filter(|o| !o.task.is_finished())
            .map(|o| o.name.clone())
            .collect()
    }

    fn current_barrier(&mut self) -> Option<ResetBarrier> {
        if self.barrier.as_ref().is_some_and(|b| *b.borrow()) {
            self.barrier = None;
        }
        self.barrier.clone()
    }

    /// Cancel the live session (if any) and hand back whatever task must
    /// finish before a new session of this name may write.
    fn take_previous(&mut self, name: &str) -> Option<JoinHandle<()>> {
        if let Some(session) = self.sessions.remove(name) {
            session.cancel.cancel();
            tracing::debug!(session = name, "Pre-empting running session");
            return Some(session.task);
        }
        self.stopping.remove(name)
    }

    /// Launch a session, replacing any session with the same name.
    /// Returns immediately; the pattern runs on its own task.
    pub fn start(&mut self, request: SessionRequest) {
        let previous = self.take_previous(&request.name);
        let barrier = self.current_barrier();
        let (cancel, token) = cancel_pair();
        let led_suppressed = Arc::new(AtomicBool::new(request.suppress_led));
        let ctx = PatternContext::new(self.env.clone(), token).with_led_suppression(led_suppressed.clone());

        let info = SessionInfo {
            name: request.name.clone(),
            pattern: request.pattern,
            started_at: Local::now(),
            suppressed: request.suppress_led,
        };
        tracing::info!(
            session = %request.name,
            pattern = request.pattern.label(),
            duration_ms = request.duration.as_millis() as u64,
            suppressed = request.suppress_led,
            "Starting haptic session"
        );

        let name = request.name.clone();
        let task = tokio::spawn(run_session(ctx, request, previous, barrier));
        self.sessions.insert(
            name,
            Session {
                info,
                cancel,
                led_suppressed,
                task,
            },
        );
    }

    /// Stop a live session from driving LEDs without restarting it.
    /// Returns false if no such session is running.
    pub fn suppress_led(&mut self, name: &str) -> bool {
        let Some(session) = self.sessions.get_mut(name) else {
            return false;
        };
        if !session.info.suppressed {
            session.led_suppressed.store(true, Ordering::Release);
            session.info.suppressed = true;
            tracing::info!(session = name, "LED output suppressed");
        }
        true
    }

    /// Signal the session to stop. Does not wait for its cleanup.
    pub fn stop(&mut self, name: &str) -> bool {
        let Some(session) = self.sessions.remove(name) else {
            return false;
        };
        session.cancel.cancel();
        tracing::info!(session = name, "Stopping haptic session");
        self.stopping.insert(name.to_string(), session.task);
        true
    }

    /// Fire a one-shot pattern on its own task
    pub fn fire_one_shot(&mut self, name: &str, pattern: PatternKind, terminal: bool, duration: Duration) {
        self.one_shots.retain(|o| !o.task.is_finished());

        let barrier = self.current_barrier();
        let (cancel, token) = cancel_pair();
        let ctx = PatternContext::new(self.env.clone(), token);
        tracing::info!(event = name, pattern = pattern.label(), terminal, "Firing one-shot effect");

        let task = tokio::spawn(run_one_shot(ctx, name.to_string(), pattern, terminal, duration, barrier));
        self.one_shots.push(OneShotTask {
            name: name.to_string(),
            cancel,
            task,
        });
    }

    /// Force every LED off in the background
    pub fn spawn_reset_leds(&mut self) {
        self.housekeeping.retain(|t| !t.is_finished());
        let gateway = self.env.gateway.clone();
        self.housekeeping.push(tokio::spawn(async move {
            let report = gateway.reset_leds().await;
            tracing::info!(devices = report.devices, failures = report.failures.len(), "LEDs forced off");
        }));
    }

    /// Cancel every session and one-shot, then reset all hardware once their
    /// cleanup has finished. Sessions started afterwards wait for that reset
    /// before their first write.
    pub fn stop_all(&mut self) {
        let mut pending: Vec<JoinHandle<()>> = Vec::new();

        for (_, session) in std::mem::take(&mut self.sessions) {
            session.cancel.cancel();
            pending.push(session.task);
        }
        pending.extend(self.stopping.drain().map(|(_, task)| task));
        for one_shot in self.one_shots.drain(..) {
            one_shot.cancel.cancel();
            pending.push(one_shot.task);
        }
        pending.append(&mut self.housekeeping);

        tracing::info!(tasks = pending.len(), "Stopping all haptics");

        let (done_tx, done_rx) = watch::channel(false);
        self.barrier = Some(done_rx);

        let gateway = self.env.gateway.clone();
        // Each task's cleanup is a handful of bounded writes
        let grace = gateway.write_timeout().saturating_mul(4).min(MAX_CLEANUP_GRACE);
        self.housekeeping.push(tokio::spawn(async move {
            let deadline = tokio::time::Instant::now() + grace;
            for task in pending {
                if tokio::time::timeout_at(deadline, task).await.is_err() {
                    tracing::warn!("Haptic task still cleaning up; resetting anyway");
                    break;
                }
            }
            let report = gateway.reset_all().await;
            if !report.is_clean() {
                tracing::warn!(failures = ?report.failures, "Reset all finished with failures");
            }
            let _ = done_tx.send(true);
        }));
    }

    /// Wait for every stopped session, one-shot and background reset.
    /// Live sessions keep running.
    pub async fn settle(&mut self) {
        let mut tasks: Vec<JoinHandle<()>> = self.stopping.drain().map(|(_, t)| t).collect();
        tasks.extend(self.one_shots.drain(..).map(|o| o.task));
        tasks.append(&mut self.housekeeping);
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Haptic task panicked");
            }
        }
        if self.barrier.as_ref().is_some_and(|b| *b.borrow()) {
            self.barrier = None;
        }
    }

    /// Stop everything and wait for it
    pub async fn shutdown(&mut self) {
        self.stop_all();
        self.settle().await;
    }
}

async fn wait_for_barrier(barrier: Option<ResetBarrier>) {
    if let Some(mut barrier) = barrier {
        let _ = barrier.wait_for(|done| *done).await;
    }
}

async fn run_session(
    ctx: PatternContext,
    request: SessionRequest,
    previous: Option<JoinHandle<()>>,
    barrier: Option<ResetBarrier>,
) {
    let name = request.name.as_str();

    let ready = async {
        if let Some(previous) = previous {
            let _ = previous.await;
        }
        wait_for_barrier(barrier).await;
    };
    tokio::select! {
        _ = ready => {}
        _ = ctx.cancel_token().cancelled() => {
            tracing::debug!(session = name, "Session cancelled before it started");
            return;
        }
    }

    if !ctx.gateway().is_ready() {
        tracing::debug!(session = name, "Gateway not started; session idles");
        ctx.hold().await;
        return;
    }

    let outcome: Result<(), Cancelled> = async {
        run_with_entry(&ctx, request.pattern, &request.entry, request.duration).await?;
        tracing::debug!(session = name, "Pattern finished; holding until stopped");
        ctx.hold().await;
        Ok(())
    }
    .await;

    let report = ctx.reset_touched().await;
    tracing::debug!(
        session = name,
        mid_pattern = outcome.is_err(),
        devices = report.devices,
        failures = report.failures.len(),
        "Session cleaned up"
    );
}

async fn run_one_shot(
    ctx: PatternContext,
    name: String,
    pattern: PatternKind,
    terminal: bool,
    duration: Duration,
    barrier: Option<ResetBarrier>,
) {
    tokio::select! {
        _ = wait_for_barrier(barrier) => {}
        _ = ctx.cancel_token().cancelled() => return,
    }
    if !ctx.gateway().is_ready() {
        tracing::debug!(event = %name, "Gateway not started; one-shot skipped");
        return;
    }
    if run_pattern(&ctx, pattern, terminal, duration).await.is_err() {
        tracing::debug!(event = %name, "One-shot cancelled");
        ctx.reset_touched().await;
    }
}
