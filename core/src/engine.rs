//! Engine facade: the only inbound surface of the haptic core.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hapsync_types::EngineConfig;
use tokio::sync::broadcast;

use crate::dispatcher::{Dispatcher, TickReport};
use crate::gateway::{ChannelLocks, DotGateway};
use crate::patterns::{PatternEnv, SwellCoordinator};
use crate::signals::{HapticSignal, SignalBus};
use crate::supervisor::{EffectSupervisor, SessionInfo};
use crate::timeline::{EventStore, SequenceError};

/// Haptic timeline engine.
///
/// Until a sequence is loaded every inbound call is a no-op returning an
/// empty report.
#[derive(Debug)]
pub struct HapticEngine {
    config: EngineConfig,
    gateway: Arc<DotGateway>,
    signals: SignalBus,
    supervisor: EffectSupervisor,
    dispatcher: Option<Dispatcher>,
}

impl HapticEngine {
    pub fn new(config: EngineConfig, gateway: Arc<DotGateway>) -> Self {
        let config = crate::config::sanitize(config);
        let signals = SignalBus::new();
        let env = PatternEnv {
            gateway: gateway.clone(),
            locks: Arc::new(ChannelLocks::new(&gateway.addresses())),
            swells: Arc::new(SwellCoordinator::default()),
            signals: signals.clone(),
            roles: config.roles,
        };
        Self {
            config,
            gateway,
            signals,
            supervisor: EffectSupervisor::new(env),
            dispatcher: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<DotGateway> {
        &self.gateway
    }

    /// Load a sequence file. On failure the dispatcher is disabled and
    /// `false` is returned.
    pub fn load_sequence(&mut self, path: &Path) -> bool {
        let result = EventStore::load(path, &self.config);
        self.install(result)
    }

    pub fn load_sequence_str(&mut self, json: &str) -> bool {
        let result = EventStore::from_json(json, &self.config);
        self.install(result)
    }

    fn install(&mut self, result: Result<EventStore, SequenceError>) -> bool {
        if let Some(mut previous) = self.dispatcher.take() {
            previous.stop_all_haptics(&mut self.supervisor);
        }
        match result {
            Ok(store) => {
                self.dispatcher = Some(Dispatcher::new(
                    store,
                    self.config.clone(),
                    self.signals.clone(),
                ));
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sequence not loaded; dispatcher disabled");
                false
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.dispatcher.is_some()
    }

    pub fn store(&self) -> Option<&EventStore> {
        self.dispatcher.as_ref().map(Dispatcher::store)
    }

    pub fn process_position(&mut self, t: Duration) -> TickReport {
        match &mut self.dispatcher {
            Some(dispatcher) => dispatcher.process_position(t, &mut self.supervisor),
            None => TickReport {
                position: t,
                ..TickReport::default()
            },
        }
    }

    pub fn reset_triggered_events(&mut self) {
        if let Some(dispatcher) = &mut self.dispatcher {
            dispatcher.reset_triggered_events();
        }
    }

    /// Tell the dispatcher the position is about to jump on purpose
    pub fn notify_seek(&mut self) {
        if let Some(dispatcher) = &mut self.dispatcher {
            dispatcher.notify_seek();
        }
    }

    pub fn stop_all_haptics(&mut self) {
        if let Some(dispatcher) = &mut self.dispatcher {
            dispatcher.stop_all_haptics(&mut self.supervisor);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HapticSignal> {
        self.signals.subscribe()
    }

    pub fn signals(&self) -> &SignalBus {
        &self.signals
    }

    pub fn active_sessions(&self) -> Vec<SessionInfo> {
        self.supervisor.sessions()
    }

    pub fn one_shots_in_flight(&self) -> Vec<String> {
        self.supervisor.one_shots_in_flight()
    }

    /// Wait for stopped sessions, one-shots and background resets
    pub async fn settle(&mut self) {
        self.supervisor.settle().await;
    }

    /// Stop everything and wait until the hardware is back at rest
    pub async fn shutdown(&mut self) {
        self.supervisor.shutdown().await;
        tracing::info!("Haptic engine shut down");
    }
}
