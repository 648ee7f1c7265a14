use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
    /// Reached the total duration
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSample {
    pub position: Duration,
    pub state: PlaybackState,
}

/// External playback subsystem (audio decoding lives behind this)
pub trait PlaybackTransport: Send {
    fn sample(&mut self) -> PlaybackSample;
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, position: Duration);
    /// Stop and rewind to zero
    fn stop(&mut self);
}

/// Playback clock on tokio time, with no audio
#[derive(Debug, Clone)]
pub struct SimulatedPlayback {
    state: PlaybackState,
    /// Position at `anchor` (or the frozen position when not playing)
    offset: Duration,
    anchor: Option<Instant>,
    total: Option<Duration>,
}

impl SimulatedPlayback {
    pub fn new(total: Option<Duration>) -> Self {
        Self {
            state: PlaybackState::Stopped,
            offset: Duration::ZERO,
            anchor: None,
            total,
        }
    }

    fn clamp(&self, position: Duration) -> Duration {
        match self.total {
            Some(total) => position.min(total),
            None => position,
        }
    }

    fn position(&self) -> Duration {
        let running = match self.anchor {
            Some(anchor) => self.offset + anchor.elapsed(),
            None => self.offset,
        };
        self.clamp(running)
    }
}

impl PlaybackTransport for SimulatedPlayback {
    fn sample(&mut self) -> PlaybackSample {
        let position = self.position();
        if self.state == PlaybackState::Playing && self.total.is_some_and(|total| position >= total) {
            self.state = PlaybackState::Ended;
            self.offset = position;
            self.anchor = None;
        }
        PlaybackSample {
            position,
            state: self.state,
        }
    }

    fn play(&mut self) {
        match self.state {
            PlaybackState::Playing => {}
            PlaybackState::Ended => {
                self.offset = Duration::ZERO;
                self.anchor = Some(Instant::now());
                self.state = PlaybackState::Playing;
            }
            PlaybackState::Stopped | PlaybackState::Paused => {
                self.anchor = Some(Instant::now());
                self.state = PlaybackState::Playing;
            }
        }
    }

    fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.offset = self.position();
            self.anchor = None;
            self.state = PlaybackState::Paused;
        }
    }

    fn seek(&mut self, position: Duration) {
        self.offset = self.clamp(position);
        match self.state {
            PlaybackState::Playing => self.anchor = Some(Instant::now()),
            PlaybackState::Ended => self.state = PlaybackState::Paused,
            PlaybackState::Stopped | PlaybackState::Paused => {}
        }
    }

    fn stop(&mut self) {
        self.offset = Duration::ZERO;
        self.anchor = None;
        self.state = PlaybackState::Stopped;
    }
}
