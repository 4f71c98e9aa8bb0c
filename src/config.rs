// Sequencer configuration - timing constants of the scheduler loops
// Stored as RON, like project files

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Timing and editing defaults for a [`StepSequencer`](crate::StepSequencer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Interval of the fixed scheduler poll (8 ms = 125 Hz)
    pub poll_interval_ms: u64,
    /// Interval of the auxiliary frame tick
    pub frame_interval_ms: u64,
    /// A step edge counts as arrived this early, absorbing poll jitter
    pub jitter_tolerance_ms: f64,
    /// Maximum step transitions replayed in one poll; older edges are skipped
    pub max_catch_up_steps: u32,
    /// Rate limit for notifications that only move the fractional playhead
    pub playhead_notify_hz: f64,
    /// Lifetime of the trigger flash
    pub flash_duration_ms: f64,
    /// Note inserted by ensure-note-if-empty
    pub default_note_pitch: i32,
    pub default_note_velocity: f32,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 8,
            frame_interval_ms: 16,
            jitter_tolerance_ms: 2.0,
            max_catch_up_steps: 4,
            playhead_notify_hz: 30.0,
            flash_duration_ms: 80.0,
            default_note_pitch: 60,
            default_note_velocity: 0.8,
        }
    }
}

impl SequencerConfig {
    /// Parse RON text; missing fields take their defaults
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text)?;
        Ok(config.sanitized())
    }

    /// Read a RON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    /// Serialize to pretty RON
    pub fn to_ron_string(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    /// Clamp every field into a usable range
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        self.poll_interval_ms = self.poll_interval_ms.clamp(1, 100);
        self.frame_interval_ms = self.frame_interval_ms.clamp(1, 1000);
        if !self.jitter_tolerance_ms.is_finite() {
            self.jitter_tolerance_ms = defaults.jitter_tolerance_ms;
        }
        self.jitter_tolerance_ms = self.jitter_tolerance_ms.clamp(0.0, 20.0);
        self.max_catch_up_steps = self.max_catch_up_steps.max(1);
        if !self.playhead_notify_hz.is_finite() || self.playhead_notify_hz <= 0.0 {
            self.playhead_notify_hz = defaults.playhead_notify_hz;
        }
        if !self.flash_duration_ms.is_finite() {
            self.flash_duration_ms = defaults.flash_duration_ms;
        }
        self.flash_duration_ms = self.flash_duration_ms.max(0.0);
        self.default_note_pitch = self.default_note_pitch.clamp(0, 127);
        if !self.default_note_velocity.is_finite() {
            self.default_note_velocity = defaults.default_note_velocity;
        }
        self.default_note_velocity = self.default_note_velocity.clamp(0.0, 1.0);
        self
    }

    /// Minimum spacing of playhead-only notifications
    pub fn playhead_notify_interval_ms(&self) -> f64 {
        1000.0 / self.playhead_notify_hz
    }
}
