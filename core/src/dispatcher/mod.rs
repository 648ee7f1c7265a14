//! Position dispatcher.
//!
//! Turns successive timeline positions into session starts and stops,
//! one-shot firings, page changes and the LED cutoff. Every method is
//! synchronous and returns immediately; hardware work happens on tasks owned
//! by the [`EffectSupervisor`].

use std::collections::HashMap;
use std::time::Duration;

use hapsync_types::EngineConfig;

use crate::signals::SignalBus;
use crate::supervisor::{EffectSupervisor, SessionRequest};
use crate::timeline::{EventStore, HapticEvent};


/// What one position sample changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub position: Duration,
    pub started: Vec<String>,
    pub stopped: Vec<String>,
    /// Live sessions that lost their LED output at the cutoff
    pub suppressed: Vec<String>,
    /// One-shots fired
    pub fired: Vec<String>,
    pub page: Option<u32>,
    pub cutoff_crossed: bool,
    pub seek_detected: bool,
}

impl TickReport {
    pub fn is_quiet(&self) -> bool {
        self.started.is_empty()
            && self.stopped.is_empty()
            && self.suppressed.is_empty()
            && self.fired.is_empty()
            && self.page.is_none()
            && !self.cutoff_crossed
    }
}

#[derive(Debug)]
pub struct Dispatcher {
    store: EventStore,
    config: EngineConfig,
    signals: SignalBus,
    /// One-shot name to the position it fired at
    triggered: HashMap<String, Duration>,
    /// Per page boundary: fired since the position was last below it
    pages_fired: Vec<bool>,
    cutoff_fired: bool,
    last_position: Option<Duration>,
}

impl Dispatcher {
    pub fn new(store: EventStore, config: EngineConfig, signals: SignalBus) -> Self {
        let pages_fired = vec![false; store.page_boundaries().len()];
        Self {
            store,
            config,
            signals,
            triggered: HashMap::new(),
            pages_fired,
            cutoff_fired: false,
            last_position: None,
        }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn cutoff_fired(&self) -> bool {
        self.cutoff_fired
    }

    pub fn last_position(&self) -> Option<Duration> {
        self.last_position
    }

    pub fn is_recorded(&self, name: &str) -> bool {
        self.triggered.contains_key(name)
    }

    pub fn process_position(&mut self, t: Duration, supervisor: &mut EffectSupervisor) -> TickReport {
        let mut report = TickReport {
            position: t,
            ..TickReport::default()
        };

        self.detect_seek(t, &mut report);
        self.last_position = Some(t);

        self.check_cutoff(t, supervisor, &mut report);

        let tolerance = self.config.dedupe_tolerance();
        for event in self.store.events() {
            if event.is_one_shot() {
                if Self::one_shot_transition(&mut self.triggered, tolerance, event, t) {
                    supervisor.fire_one_shot(&event.name, event.pattern, event.terminal, event.window());
                    self.signals.event_triggered(&event.name, t);
                    report.fired.push(event.name.clone());
                }
            } else {
                let suppress =
                    self.cutoff_fired && self.config.led_cutoff.is_visual_only(&event.name);
                Self::continuous_transition(event, t, suppress, supervisor, &self.signals, &mut report);
            }
        }

        self.check_pages(t, &mut report);
        report
    }

    fn detect_seek(&mut self, t: Duration, report: &mut TickReport) {
        let Some(last) = self.last_position else {
            return;
        };
        let backward = last > t && last - t > self.config.dedupe_tolerance();
        let forward = t > last && t - last > self.config.seek_jump();
        if !backward && !forward {
            return;
        }
        tracing::debug!(
            from_ms = last.as_millis() as u64,
            to_ms = t.as_millis() as u64,
            backward,
            "Seek detected"
        );
        report.seek_detected = true;
        // Forward jumps keep dedupe records; passed one-shots expire through
        // the usual distance rule.
        if backward {
            self.triggered.clear();
        }
    }

    fn check_cutoff(&mut self, t: Duration, supervisor: &mut EffectSupervisor, report: &mut TickReport) {
        let cutoff = &self.config.led_cutoff;
        if !cutoff.enabled {
            return;
        }
        let at = cutoff.at();

        if self.cutoff_fired && cutoff.rearm_on_backward_seek && t < at {
            tracing::info!("LED cutoff re-armed");
            self.cutoff_fired = false;
        }
        if self.cutoff_fired || t < at {
            return;
        }

        tracing::info!(at_ms = at.as_millis() as u64, "LED cutoff crossed; forcing LEDs off");
        self.cutoff_fired = true;
        report.cutoff_crossed = true;
        supervisor.spawn_reset_leds();

        for event in self.store.events() {
            if event.is_one_shot()
                || !cutoff.is_visual_only(&event.name)
                || supervisor.is_suppressed(&event.name)
            {
                continue;
            }
            if supervisor.suppress_led(&event.name) {
                report.suppressed.push(event.name.clone());
            }
        }
    }

    fn continuous_transition(
        event: &HapticEvent,
        t: Duration,
        suppress: bool,
        supervisor: &mut EffectSupervisor,
        signals: &SignalBus,
        report: &mut TickReport,
    ) {
        let active = supervisor.is_active(&event.name);
        let inside = event.contains(t);

        if inside && !active {
            supervisor.start(SessionRequest::for_event(event, t, suppress));
            signals.event_triggered(&event.name, t);
            report.started.push(event.name.clone());
        } else if !inside && active {
            supervisor.stop(&event.name);
            report.stopped.push(event.name.clone());
        }
    }

    /// Update the dedupe record and decide whether the one-shot fires now
    fn one_shot_transition(
        triggered: &mut HashMap<String, Duration>,
        tolerance: Duration,
        event: &HapticEvent,
        t: Duration,
    ) -> bool {
        let eligible_end = event.end.max(event.start + tolerance);
        let eligible = event.start <= t && t <= eligible_end;

        if let Some(&fired_at) = triggered.get(&event.name)
            && !eligible
            && t.abs_diff(fired_at) > tolerance
        {
            triggered.remove(&event.name);
        }

        if eligible && !triggered.contains_key(&event.name) {
            triggered.insert(event.name.clone(), t);
            return true;
        }
        false
    }

    fn check_pages(&mut self, t: Duration, report: &mut TickReport) {
        let window = self.config.page_window();
        for (boundary, fired) in self
            .store
            .page_boundaries()
            .iter()
            .zip(self.pages_fired.iter_mut())
        {
            if t < boundary.at {
                *fired = false;
            } else if t < boundary.at + window && !*fired {
                *fired = true;
                tracing::info!(page = boundary.page, "Page should change");
                self.signals.page_should_change(boundary.page);
                report.page = Some(boundary.page);
            }
        }
    }

    /// The playback position was moved on purpose: forget one-shot records
    /// so events around the new position may fire again.
    pub fn notify_seek(&mut self) {
        self.triggered.clear();
        tracing::debug!("Explicit seek; one-shot records cleared");
    }

    /// Forget one-shot records, page state, the cutoff and the last position
    /// so the whole sequence can fire again.
    pub fn reset_triggered_events(&mut self) {
        self.triggered.clear();
        self.pages_fired.iter_mut().for_each(|f| *f = false);
        self.cutoff_fired = false;
        self.last_position = None;
        tracing::debug!("Triggered events reset");
    }

    /// Panic button: stop every session and forget one-shot and page state
    pub fn stop_all_haptics(&mut self, supervisor: &mut EffectSupervisor) {
        supervisor.stop_all();
        self.triggered.clear();
        self.pages_fired.iter_mut().for_each(|f| *f = false);
        self.last_position = None;
    }
}
