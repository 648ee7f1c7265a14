//! Outbound notifications.
//!
//! Signals are fire-and-forget: nobody acknowledges them and a send with no
//! subscribers (or a lagging one) is not an error.

use std::time::Duration;

use tokio::sync::broadcast;

/// Something observable happened on the timeline
#[derive(Debug, Clone, PartialEq)]
pub enum HapticSignal {
    /// An event's window was entered (session started or one-shot fired)
    EventTriggered { event: String, position: Duration },
    /// The reading view should move to this page
    PageShouldChange { page: u32 },
    /// A pattern reached a named phase
    ContinuousEffectTick {
        effect: &'static str,
        phase: &'static str,
    },
}

const SIGNAL_CAPACITY: usize = 256;

/// Cloneable broadcast sender for [`HapticSignal`]s
#[derive(Debug, Clone)]
pub struct SignalBus {
    tx: broadcast::Sender<HapticSignal>,
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HapticSignal> {
        self.tx.subscribe()
    }

    pub fn emit(&self, signal: HapticSignal) {
        let _ = self.tx.send(signal);
    }

    pub fn event_triggered(&self, event: &str, position: Duration) {
        self.emit(HapticSignal::EventTriggered {
            event: event.to_string(),
            position,
        });
    }

    pub fn page_should_change(&self, page: u32) {
        self.emit(HapticSignal::PageShouldChange { page });
    }

    pub fn effect_tick(&self, effect: &'static str, phase: &'static str) {
        self.emit(HapticSignal::ContinuousEffectTick { effect, phase });
    }
}
