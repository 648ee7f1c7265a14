//! Shared configuration types for hapsync.
//!
//! These types are serialized to and from TOML (engine configuration) and
//! JSON (sequence definitions) and are shared by the engine and front-ends.

pub mod clock;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════
// Event classification
// ═══════════════════════════════════════════════════════════════════════════

/// How an event behaves once its window is entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Fires once on entering the window; no ongoing session
    #[serde(alias = "one_shot")]
    OneShot,
    /// Runs a pattern for as long as the window is active
    #[serde(alias = "continuous")]
    Continuous,
}

impl EventKind {
    pub fn is_one_shot(self) -> bool {
        matches!(self, Self::OneShot)
    }
}

/// Named effect routine run against the hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Two-colour alternation on the primary device (siren)
    AlternatingFlash,
    /// Brightness fade plus vibration beat on the secondary device (heartbeat)
    RhythmicPulse,
    /// Single bright flash and strong vibration tick (count-down numbers)
    CountingFlash,
    /// Gray brightness swell with vibration on every device
    GraySwell,
    /// Blue brightness swell on every device
    BlueSwell,
    /// Hold for the duration without writing anything
    Wait,
}

impl PatternKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::AlternatingFlash => "alternating_flash",
            Self::RhythmicPulse => "rhythmic_pulse",
            Self::CountingFlash => "counting_flash",
            Self::GraySwell => "gray_swell",
            Self::BlueSwell => "blue_swell",
            Self::Wait => "wait",
        }
    }

    /// Swells are mutually exclusive with each other
    pub fn is_swell(self) -> bool {
        matches!(self, Self::GraySwell | Self::BlueSwell)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Engine configuration
// ═══════════════════════════════════════════════════════════════════════════

/// Addresses of the devices patterns target by role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceRoles {
    /// Wrist-worn device: siren, counting flashes, thermal cues
    pub primary: u8,
    /// Chest-worn device: heartbeat, unease vibration
    pub secondary: u8,
}

impl Default for DeviceRoles {
    fn default() -> Self {
        Self {
            primary: 1,
            secondary: 2,
        }
    }
}

/// Position after which all LEDs are forced off once and visual-only events
/// stop driving LEDs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedCutoffConfig {
    pub enabled: bool,
    /// Absolute timeline position in seconds
    pub at_secs: f64,
    /// Continuous events that lose their visual channel past the cutoff
    pub visual_only_events: Vec<String>,
    /// Re-arm the cutoff when the position moves back below it.
    /// When false only an explicit restart re-arms it.
    pub rearm_on_backward_seek: bool,
}

impl Default for LedCutoffConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            at_secs: 114.0,
            visual_only_events: vec!["Event5_GreyFaces".to_string(), "Event6_River".to_string()],
            rearm_on_backward_seek: false,
        }
    }
}

impl LedCutoffConfig {
    /// Cutoff position. Non-positive and NaN values mean the very start;
    /// values too large for a `Duration` mean the cutoff is never reached.
    pub fn at(&self) -> Duration {
        if self.at_secs.is_nan() || self.at_secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.at_secs).unwrap_or(Duration::MAX)
    }

    pub fn is_visual_only(&self, event_name: &str) -> bool {
        self.visual_only_events.iter().any(|e| e == event_name)
    }
}

/// Engine configuration (loaded from TOML)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sampling loop period
    pub tick_ms: u64,
    /// Upper bound on a single hardware write
    pub write_timeout_ms: u64,
    /// One-shot events are not re-fired for positions closer than this
    pub dedupe_tolerance_ms: u64,
    /// Width of the window after a page boundary in which the page change fires
    pub page_window_ms: u64,
    /// Forward jumps larger than this between two samples count as a seek
    pub seek_jump_ms: u64,
    /// Device addresses managed by the gateway
    pub devices: Vec<u8>,
    pub roles: DeviceRoles,
    /// Legacy naming convention marking one-shot events (used only when an
    /// event carries no explicit kind)
    pub one_shot_prefix: String,
    /// One-shot event that also takes over the secondary device
    pub terminal_count_event: String,
    /// Pattern for events that do not name one themselves
    pub patterns: BTreeMap<String, PatternKind>,
    pub led_cutoff: LedCutoffConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let patterns = BTreeMap::from([
            ("Event1_PoliceAnnouncement".to_string(), PatternKind::AlternatingFlash),
            ("Event2_Realization".to_string(), PatternKind::RhythmicPulse),
            ("Event5_GreyFaces".to_string(), PatternKind::GraySwell),
            ("Event6_River".to_string(), PatternKind::BlueSwell),
        ]);
        Self {
            tick_ms: 100,
            write_timeout_ms: 2000,
            dedupe_tolerance_ms: 150,
            page_window_ms: 1000,
            seek_jump_ms: 1000,
            devices: vec![1, 2],
            roles: DeviceRoles::default(),
            one_shot_prefix: "EventCounting_".to_string(),
            terminal_count_event: "EventCounting_Ten".to_string(),
            patterns,
            led_cutoff: LedCutoffConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms.max(1))
    }

    pub fn dedupe_tolerance(&self) -> Duration {
        Duration::from_millis(self.dedupe_tolerance_ms)
    }

    pub fn page_window(&self) -> Duration {
        Duration::from_millis(self.page_window_ms)
    }

    pub fn seek_jump(&self) -> Duration {
        Duration::from_millis(self.seek_jump_ms)
    }
}
