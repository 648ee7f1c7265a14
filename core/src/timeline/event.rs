use std::collections::HashMap;
use std::time::Duration;

use hapsync_types::clock::parse_clock;
use hapsync_types::{EngineConfig, EventKind, PatternKind};

use super::definition::{EventDefinition, SetpointDefinition};
use crate::gateway::{ChannelUpdate, Rgb, Vibration};

/// Setpoints written to one device when a continuous session starts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntrySetpoint {
    pub address: u8,
    pub update: ChannelUpdate,
}

/// Immutable, resolved timeline event
#[derive(Debug, Clone)]
pub struct HapticEvent {
    /// Unique key
    pub name: String,
    pub start: Duration,
    pub end: Duration,
    pub duration_hint: i64,
    pub text_section: String,
    /// `HapticEffects` block exactly as written
    pub effects: serde_json::Value,
    pub entry: Vec<EntrySetpoint>,
    pub kind: EventKind,
    /// Kind came from the legacy name prefix rather than an explicit tag
    pub kind_inferred: bool,
    pub pattern: PatternKind,
    /// Terminal count: also takes over the secondary device
    pub terminal: bool,
}

impl HapticEvent {
    pub fn is_one_shot(&self) -> bool {
        self.kind.is_one_shot()
    }

    /// `start <= t <= end`
    pub fn contains(&self, t: Duration) -> bool {
        self.start <= t && t <= self.end
    }

    pub fn window(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }

    pub(super) fn from_definition(
        def: EventDefinition,
        config: &EngineConfig,
        roles: &RoleTable,
    ) -> Self {
        let start = clock_or_zero(&def.event_name, "StartTime", &def.start_time);
        let mut end = clock_or_zero(&def.event_name, "EndTime", &def.end_time);
        if end < start {
            tracing::warn!(
                event = %def.event_name,
                start = %def.start_time,
                end = %def.end_time,
                "Event ends before it starts; window clamped to zero length"
            );
            end = start;
        }

        let (kind, kind_inferred) = match def.kind {
            Some(kind) => (kind, false),
            None if def.event_name.starts_with(&config.one_shot_prefix) => (EventKind::OneShot, true),
            None => (EventKind::Continuous, true),
        };

        let pattern = def
            .pattern
            .or_else(|| config.patterns.get(&def.event_name).copied())
            .unwrap_or(if kind.is_one_shot() {
                PatternKind::CountingFlash
            } else {
                PatternKind::Wait
            });

        let terminal = def
            .terminal
            .unwrap_or(def.event_name == config.terminal_count_event);

        let entry = parse_entry_setpoints(&def.event_name, &def.haptic_effects, roles, config);

        Self {
            name: def.event_name,
            start,
            end,
            duration_hint: def.duration,
            text_section: def.text_section,
            effects: def.haptic_effects,
            entry,
            kind,
            kind_inferred,
            pattern,
            terminal,
        }
    }
}

fn clock_or_zero(event: &str, field: &'static str, text: &str) -> Duration {
    match parse_clock(text) {
        Some(d) => d,
        None => {
            tracing::warn!(event, field, value = text, "Malformed clock string; using 0:00");
            Duration::ZERO
        }
    }
}

/// Role name / address lookup for keys inside `HapticEffects`
#[derive(Debug, Clone, Default)]
pub(super) struct RoleTable {
    by_name: HashMap<String, u8>,
}

impl RoleTable {
    pub(super) fn new(config: &EngineConfig, mapping: &[(u8, String)]) -> Self {
        let mut by_name = HashMap::new();
        by_name.insert("primary".to_string(), config.roles.primary);
        by_name.insert("secondary".to_string(), config.roles.secondary);
        for (address, role) in mapping {
            by_name.insert(role.to_lowercase(), *address);
        }
        Self { by_name }
    }

    pub(super) fn resolve(&self, key: &str) -> Option<u8> {
        parse_address(key).or_else(|| self.by_name.get(&key.to_lowercase()).copied())
    }
}

/// `"2"` or `"Dot2"`
pub(super) fn parse_address(key: &str) -> Option<u8> {
    let digits = key
        .strip_prefix("Dot")
        .or_else(|| key.strip_prefix("dot"))
        .unwrap_or(key);
    digits.trim().parse().ok()
}

fn parse_entry_setpoints(
    event: &str,
    effects: &serde_json::Value,
    roles: &RoleTable,
    config: &EngineConfig,
) -> Vec<EntrySetpoint> {
    let Some(map) = effects.as_object() else {
        return Vec::new();
    };

    let mut setpoints = Vec::new();
    for (key, value) in map {
        let Some(address) = roles.resolve(key) else {
            tracing::debug!(event, key = %key, "Effect key is not a device or role; ignored");
            continue;
        };
        if !config.devices.contains(&address) {
            tracing::debug!(event, address, "Effect targets an unmanaged device; ignored");
            continue;
        }
        let def: SetpointDefinition = match serde_json::from_value(value.clone()) {
            Ok(def) => def,
            Err(e) => {
                tracing::debug!(event, key = %key, error = %e, "Unrecognised effect block; ignored");
                continue;
            }
        };

        let mut update = ChannelUpdate::default();
        if let Some([r, g, b]) = def.led {
            update = update.with_led(Rgb::new(r, g, b));
        }
        if let Some(v) = def.vibration {
            update = update.with_vibration(Vibration {
                frequency: v.frequency,
                intensity: v.intensity,
                enable: v.enable,
            });
        }
        if let Some(thermal) = def.thermal {
            update = update.with_thermal(thermal);
        }
        if !update.is_empty() {
            setpoints.push(EntrySetpoint { address, update });
        }
    }
    setpoints
}
