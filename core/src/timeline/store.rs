//! Timeline event store.
//!
//! Loads a sequence definition into an ordered list of events plus the page
//! boundaries derived from it. Loading is all-or-nothing: any I/O or parse
//! error yields a [`SequenceError`] and the caller treats the dispatcher as
//! disabled.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hapsync_types::EngineConfig;
use hapsync_types::clock::parse_clock;

use super::definition::{ClockValue, SequenceDefinition};
use super::event::{HapticEvent, RoleTable, parse_address};

#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    #[error("failed to read sequence file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid sequence definition: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sequence defines no events")]
    Empty,
}

/// Position at which the reading view turns to `page`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PageBoundary {
    pub at: Duration,
    pub page: u32,
}

/// Descriptive fields of a sequence
#[derive(Debug, Clone, Default)]
pub struct SequenceInfo {
    pub name: String,
    pub description: String,
    pub audio_file: String,
    pub total_duration: Option<Duration>,
    /// Address to role name
    pub device_roles: BTreeMap<u8, String>,
}

#[derive(Debug, Clone, Default)]
pub struct EventStore {
    info: SequenceInfo,
    events: Vec<HapticEvent>,
    pages: Vec<PageBoundary>,
}

impl EventStore {
    pub fn load(path: &Path, config: &EngineConfig) -> Result<Self, SequenceError> {
        let text = fs::read_to_string(path).map_err(|source| SequenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text, config)
    }

    pub fn from_json(text: &str, config: &EngineConfig) -> Result<Self, SequenceError> {
        let def: SequenceDefinition = serde_json::from_str(text)?;
        Self::from_definition(def, config)
    }

    pub fn from_definition(def: SequenceDefinition, config: &EngineConfig) -> Result<Self, SequenceError> {
        if def.haptic_sequence.is_empty() {
            return Err(SequenceError::Empty);
        }

        let mut device_roles = BTreeMap::new();
        for (key, role) in &def.device_mapping {
            match parse_address(key) {
                Some(address) => {
                    device_roles.insert(address, role.clone());
                }
                None => tracing::warn!(key = %key, role = %role, "Unrecognised device mapping key"),
            }
        }
        let mapping: Vec<(u8, String)> = device_roles
            .iter()
            .map(|(a, r)| (*a, r.clone()))
            .collect();
        let roles = RoleTable::new(config, &mapping);

        let mut seen = HashSet::new();
        let mut events = Vec::with_capacity(def.haptic_sequence.len());
        for event_def in def.haptic_sequence {
            if !seen.insert(event_def.event_name.clone()) {
                tracing::warn!(event = %event_def.event_name, "Duplicate event name; later definition ignored");
                continue;
            }
            events.push(HapticEvent::from_definition(event_def, config, &roles));
        }

        let inferred: Vec<&str> = events
            .iter()
            .filter(|e| e.kind_inferred)
            .map(|e| e.name.as_str())
            .collect();
        if !inferred.is_empty() {
            tracing::warn!(
                events = ?inferred,
                prefix = %config.one_shot_prefix,
                "Event kind inferred from name prefix; tag events with an explicit Kind"
            );
        }

        let mut pages = Vec::with_capacity(def.page_transitions.len());
        for transition in &def.page_transitions {
            match parse_clock(&transition.time) {
                Some(at) => pages.push(PageBoundary {
                    at,
                    page: transition.page,
                }),
                None => tracing::warn!(
                    value = %transition.time,
                    page = transition.page,
                    "Malformed page transition time; transition ignored"
                ),
            }
        }
        pages.sort();

        if let Some(reset) = &def.reset_sequence {
            tracing::debug!(reset = %reset, "Sequence carries a reset block");
        }

        let total_duration = match &def.total_duration {
            Some(ClockValue::Text(text)) => parse_clock(text),
            Some(ClockValue::Seconds(secs)) => {
                let total = Duration::try_from_secs_f64(*secs).ok();
                if total.is_none() {
                    tracing::warn!(value = secs, "Unusable total duration; ignored");
                }
                total
            }
            None => None,
        };

        let store = Self {
            info: SequenceInfo {
                name: def.name,
                description: def.description,
                audio_file: def.audio_file,
                total_duration,
                device_roles,
            },
            events,
            pages,
        };
        tracing::info!(
            name = %store.info.name,
            events = store.events.len(),
            pages = store.pages.len(),
            "Loaded haptic sequence"
        );
        Ok(store)
    }

    pub fn info(&self) -> &SequenceInfo {
        &self.info
    }

    /// Events in definition order
    pub fn events(&self) -> &[HapticEvent] {
        &self.events
    }

    pub fn get(&self, name: &str) -> Option<&HapticEvent> {
        self.events.iter().find(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Boundaries sorted by position
    pub fn page_boundaries(&self) -> &[PageBoundary] {
        &self.pages
    }

    /// Page whose boundary is the last one at or before `t`
    pub fn page_at(&self, t: Duration) -> Option<u32> {
        self.pages
            .iter()
            .take_while(|b| b.at <= t)
            .last()
            .map(|b| b.page)
    }
}
