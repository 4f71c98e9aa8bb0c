// Timeline - Tempo and step resolution
// Converts a musical tempo and subdivision into wall-clock step durations

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest tempo accepted anywhere in the sequencer
pub const MIN_BPM: f64 = 20.0;
/// Highest tempo accepted anywhere in the sequencer
pub const MAX_BPM: f64 = 240.0;
/// Default tempo for new sequences and the global transport
pub const DEFAULT_BPM: f64 = 120.0;

/// Rhythmic subdivision of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "1/4")]
    Quarter,
    #[serde(rename = "1/8")]
    Eighth,
    #[serde(rename = "1/8T")]
    EighthTriplet,
    #[default]
    #[serde(rename = "1/16")]
    Sixteenth,
    #[serde(rename = "1/16T")]
    SixteenthTriplet,
    #[serde(rename = "1/32")]
    ThirtySecond,
}

impl Resolution {
    /// All resolutions, ordered by increasing step rate.
    /// This order also defines the normalized proxy used by knobs.
    pub const ALL: [Resolution; 6] = [
        Resolution::Quarter,
        Resolution::Eighth,
        Resolution::EighthTriplet,
        Resolution::Sixteenth,
        Resolution::SixteenthTriplet,
        Resolution::ThirtySecond,
    ];

    /// Number of steps per quarter note
    pub fn steps_per_beat(&self) -> f64 {
        match self {
            Resolution::Quarter => 1.0,
            Resolution::Eighth => 2.0,
            Resolution::EighthTriplet => 3.0,
            Resolution::Sixteenth => 4.0,
            Resolution::SixteenthTriplet => 6.0,
            Resolution::ThirtySecond => 8.0,
        }
    }

    /// Duration of one step in milliseconds at the given tempo
    pub fn step_duration_ms(&self, tempo: Tempo) -> f64 {
        tempo.beat_duration_ms() / self.steps_per_beat()
    }

    /// Position of this resolution on the 0..=1 proxy scale
    pub fn to_norm(&self) -> f32 {
        let index = Self::ALL.iter().position(|r| r == self).unwrap_or(0);
        index as f32 / (Self::ALL.len() - 1) as f32
    }

    /// Nearest resolution for a proxy value; out-of-range input is clamped
    pub fn from_norm(norm: f32) -> Self {
        let norm = if norm.is_finite() { norm.clamp(0.0, 1.0) } else { 0.0 };
        let index = (norm * (Self::ALL.len() - 1) as f32).round() as usize;
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }

    /// Label as stored in persisted records ("1/16", "1/8T", ...)
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Quarter => "1/4",
            Resolution::Eighth => "1/8",
            Resolution::EighthTriplet => "1/8T",
            Resolution::Sixteenth => "1/16",
            Resolution::SixteenthTriplet => "1/16T",
            Resolution::ThirtySecond => "1/32",
        }
    }

    /// Parse a stored label
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.label() == label)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Tempo in BPM, always within [`MIN_BPM`, `MAX_BPM`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    /// Creates a new tempo, clamping into the supported range.
    /// Non-finite input falls back to the default tempo.
    pub fn new(bpm: f64) -> Self {
        Self { bpm: clamp_bpm(bpm) }
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one quarter note in milliseconds
    pub fn beat_duration_ms(&self) -> f64 {
        60_000.0 / self.bpm
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(DEFAULT_BPM)
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Clamp a raw BPM value into the supported range
pub fn clamp_bpm(bpm: f64) -> f64 {
    if bpm.is_finite() {
        bpm.clamp(MIN_BPM, MAX_BPM)
    } else {
        DEFAULT_BPM
    }
}
