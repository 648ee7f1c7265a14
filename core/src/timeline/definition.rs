//! Serde shapes of the JSON sequence document.
//!
//! These mirror the file as written; [`EventStore`](super::EventStore) turns
//! them into resolved [`HapticEvent`](super::HapticEvent)s.

use std::collections::BTreeMap;

use hapsync_types::{EventKind, PatternKind};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SequenceDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Device address (optionally `Dot`-prefixed) to role name
    #[serde(default)]
    pub device_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub audio_file: String,
    #[serde(default)]
    pub total_duration: Option<ClockValue>,
    #[serde(default)]
    pub haptic_sequence: Vec<EventDefinition>,
    #[serde(default)]
    pub page_transitions: Vec<PageTransitionDefinition>,
    /// Opaque; only logged
    #[serde(default)]
    pub reset_sequence: Option<serde_json::Value>,
}

/// A time written either as a clock string or as plain seconds
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ClockValue {
    Text(String),
    Seconds(f64),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventDefinition {
    pub event_name: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    /// Integer duration hint, informational only
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub text_section: String,
    #[serde(default)]
    pub haptic_effects: serde_json::Value,
    #[serde(default)]
    pub kind: Option<EventKind>,
    #[serde(default)]
    pub pattern: Option<PatternKind>,
    #[serde(default)]
    pub terminal: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PageTransitionDefinition {
    pub time: String,
    pub page: u32,
}

/// One device's entry setpoints inside `HapticEffects`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct SetpointDefinition {
    #[serde(default)]
    pub led: Option<[u8; 3]>,
    #[serde(default)]
    pub vibration: Option<VibrationDefinition>,
    #[serde(default)]
    pub thermal: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct VibrationDefinition {
    #[serde(default)]
    pub frequency: f32,
    #[serde(default)]
    pub intensity: f32,
    #[serde(default = "enabled")]
    pub enable: bool,
}

fn enabled() -> bool {
    true
}
