//! Playback sampling service.
//!
//! A background task that samples the playback position on a fixed tick and
//! feeds it to the engine, driven by commands sent through a
//! [`PlaybackHandle`].

mod playback;


use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::HapticEngine;

pub use playback::{PlaybackSample, PlaybackState, PlaybackTransport, SimulatedPlayback};

/// Commands sent to the playback service
#[derive(Debug)]
pub enum PlaybackCommand {
    Play,
    Pause,
    Seek(Duration),
    /// Stop playback (back to 0:00) and stop all haptics
    Stop,
    /// Stop, then forget every triggered event
    Reset,
    Status(oneshot::Sender<PlaybackStatus>),
    Shutdown(oneshot::Sender<()>),
}

/// Snapshot returned by [`PlaybackHandle::status`]
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackStatus {
    pub position: Duration,
    pub state: PlaybackState,
    pub loaded: bool,
    pub active_sessions: Vec<String>,
    pub one_shots: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to communicate with the playback service
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    cmd_tx: mpsc::Sender<PlaybackCommand>,
}

impl PlaybackHandle {
    async fn send(&self, cmd: PlaybackCommand) -> Result<(), String> {
        self.cmd_tx.send(cmd).await.map_err(|e| e.to_string())
    }

    pub async fn play(&self) -> Result<(), String> {
        self.send(PlaybackCommand::Play).await
    }

    pub async fn pause(&self) -> Result<(), String> {
        self.send(PlaybackCommand::Pause).await
    }

    pub async fn seek(&self, position: Duration) -> Result<(), String> {
        self.send(PlaybackCommand::Seek(position)).await
    }

    pub async fn stop(&self) -> Result<(), String> {
        self.send(PlaybackCommand::Stop).await
    }

    pub async fn reset(&self) -> Result<(), String> {
        self.send(PlaybackCommand::Reset).await
    }

    pub async fn status(&self) -> Result<PlaybackStatus, String> {
        let (tx, rx) = oneshot::channel();
        self.send(PlaybackCommand::Status(tx)).await?;
        rx.await.map_err(|e| e.to_string())
    }

    /// Stop everything and wait until the service has exited
    pub async fn shutdown(&self) -> Result<(), String> {
        let (tx, rx) = oneshot::channel();
        self.send(PlaybackCommand::Shutdown(tx)).await?;
        rx.await.map_err(|e| e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Service loop
// ─────────────────────────────────────────────────────────────────────────────

struct PlaybackService<P> {
    engine: HapticEngine,
    transport: P,
    cmd_rx: mpsc::Receiver<PlaybackCommand>,
    end_handled: bool,
}

pub fn spawn_playback_service<P>(
    engine: HapticEngine,
    transport: P,
    tick: Duration,
) -> (PlaybackHandle, JoinHandle<()>)
where
    P: PlaybackTransport + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let service = PlaybackService {
        engine,
        transport,
        cmd_rx,
        end_handled: false,
    };
    let task = tokio::spawn(service.run(tick));
    (PlaybackHandle { cmd_tx }, task)
}

impl<P: PlaybackTransport> PlaybackService<P> {
    async fn run(mut self, tick: Duration) {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => self.on_tick(),
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(PlaybackCommand::Shutdown(reply)) => {
                        self.engine.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(cmd) => self.handle(cmd),
                    None => {
                        self.engine.shutdown().await;
                        break;
                    }
                },
            }
        }
        tracing::debug!("Playback service exited");
    }

    fn on_tick(&mut self) {
        let sample = self.transport.sample();
        match sample.state {
            PlaybackState::Playing => {
                self.engine.process_position(sample.position);
            }
            PlaybackState::Ended if !self.end_handled => {
                self.end_handled = true;
                tracing::info!("Playback reached the end; stopping haptics");
                self.engine.stop_all_haptics();
            }
            _ => {}
        }
    }

    fn handle(&mut self, cmd: PlaybackCommand) {
        match cmd {
            PlaybackCommand::Play => {
                let sample = self.transport.sample();
                if sample.state == PlaybackState::Playing {
                    return;
                }
                if sample.position.is_zero() || sample.state == PlaybackState::Ended {
                    self.engine.reset_triggered_events();
                }
                self.transport.play();
                self.end_handled = false;
                tracing::info!("Playback started");
            }
            PlaybackCommand::Pause => {
                self.transport.pause();
                tracing::info!("Playback paused");
            }
            PlaybackCommand::Seek(position) => {
                self.transport.seek(position);
                self.engine.notify_seek();
                self.end_handled = false;
                tracing::info!(position_ms = position.as_millis() as u64, "Playback seeked");
            }
            PlaybackCommand::Stop => self.stop(),
            PlaybackCommand::Reset => {
                self.stop();
                self.engine.reset_triggered_events();
            }
            PlaybackCommand::Status(reply) => {
                let sample = self.transport.sample();
                let _ = reply.send(PlaybackStatus {
                    position: sample.position,
                    state: sample.state,
                    loaded: self.engine.is_loaded(),
                    active_sessions: self
                        .engine
                        .active_sessions()
                        .into_iter()
                        .map(|s| s.name)
                        .collect(),
                    one_shots: self.engine.one_shots_in_flight(),
                });
            }
            // Handled in the loop
            PlaybackCommand::Shutdown(_) => {}
        }
    }

    fn stop(&mut self) {
        self.transport.stop();
        self.engine.stop_all_haptics();
        tracing::info!("Playback stopped");
    }
}
