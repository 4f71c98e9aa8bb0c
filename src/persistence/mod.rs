// Sequence persistence - durable subset of a sequence in a keyed store
// Records are flat JSON; loading validates field by field and never fails hard

pub mod store;

use crate::sequencer::note::{Note, Step, clamp_pitch, clamp_velocity};
use crate::sequencer::sequence::{DEFAULT_LENGTH, MAX_STEPS, PlayMode, Sequence, SequenceKey};
use crate::sequencer::timeline::{DEFAULT_BPM, Resolution, clamp_bpm};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use store::{FileStore, MemoryStore, SequenceStore};

/// Persistence error types
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No data directory available")]
    NoDataDir,
}

/// Durable fields of a sequence, as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceRecord {
    pub steps: Vec<Step>,
    pub length: usize,
    pub resolution: Resolution,
    pub resolution_norm: f32,
    pub mode: PlayMode,
    pub local_bpm: f64,
}

impl Default for SequenceRecord {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            length: DEFAULT_LENGTH,
            resolution: Resolution::default(),
            resolution_norm: Resolution::default().to_norm(),
            mode: PlayMode::default(),
            local_bpm: DEFAULT_BPM,
        }
    }
}

impl SequenceRecord {
    /// Capture the durable subset of a sequence. Empty steps are omitted.
    pub fn from_sequence(seq: &Sequence) -> Self {
        Self {
            steps: seq.steps.iter().filter(|s| !s.is_empty()).cloned().collect(),
            length: seq.length,
            resolution: seq.resolution,
            resolution_norm: seq.resolution_norm,
            mode: seq.mode,
            local_bpm: seq.local_bpm,
        }
    }

    /// Overwrite the durable fields of `seq` with this record
    pub fn apply_to(&self, seq: &mut Sequence) {
        seq.set_steps(self.steps.clone());
        seq.set_length(self.length as i32);
        seq.resolution = self.resolution;
        seq.resolution_norm = agreeing_norm(self.resolution, Some(self.resolution_norm));
        seq.set_mode(self.mode);
        seq.set_local_bpm(self.local_bpm);
    }

    pub fn to_json(&self) -> Result<String, PersistenceError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode stored text leniently.
    ///
    /// Returns `None` when the text is not a JSON object at all. Otherwise every
    /// field is checked on its own: wrong types fall back to the default,
    /// numbers are clamped, malformed steps and notes are dropped one by one.
    pub fn decode(text: &str) -> Option<Self> {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                log::warn!(target: "persistence", "discarding unreadable record: {}", e);
                return None;
            }
        };
        let Value::Object(map) = value else {
            log::warn!(target: "persistence", "discarding record that is not an object");
            return None;
        };

        let defaults = Self::default();
        let label = map
            .get("resolution")
            .and_then(Value::as_str)
            .and_then(Resolution::from_label);
        let norm = map
            .get("resolutionNorm")
            .and_then(Value::as_f64)
            .filter(|n| n.is_finite())
            .map(|n| n.clamp(0.0, 1.0) as f32);
        // The subdivision wins; the proxy only fills in when the label is gone
        let resolution = label
            .or_else(|| norm.map(Resolution::from_norm))
            .unwrap_or(defaults.resolution);

        Some(Self {
            steps: map
                .get("steps")
                .and_then(Value::as_array)
                .map(|steps| decode_steps(steps))
                .unwrap_or(defaults.steps),
            length: map
                .get("length")
                .and_then(Value::as_i64)
                .map(|n| n.clamp(1, MAX_STEPS as i64) as usize)
                .unwrap_or(defaults.length),
            resolution,
            resolution_norm: agreeing_norm(resolution, norm),
            mode: map
                .get("mode")
                .and_then(|v| PlayMode::deserialize(v).ok())
                .unwrap_or(defaults.mode),
            local_bpm: map
                .get("localBpm")
                .and_then(Value::as_f64)
                .map(clamp_bpm)
                .unwrap_or(defaults.local_bpm),
        })
    }
}

fn decode_steps(values: &[Value]) -> Vec<Step> {
    let mut steps: Vec<Step> = Vec::new();
    for value in values {
        let Some(map) = value.as_object() else {
            continue;
        };
        let Some(index) = map
            .get("index")
            .and_then(Value::as_u64)
            .filter(|i| (*i as usize) < MAX_STEPS)
        else {
            continue;
        };
        let mut step = Step::new(index as usize);
        if let Some(notes) = map.get("notes").and_then(Value::as_array) {
            for note in notes.iter().filter_map(|n| n.as_object().and_then(decode_note)) {
                step.upsert(note);
            }
        }
        steps.retain(|s| s.index != step.index);
        steps.push(step);
    }
    steps.sort_by_key(|s| s.index);
    steps
}

fn decode_note(map: &Map<String, Value>) -> Option<Note> {
    let pitch = map.get("pitch").and_then(Value::as_i64)?;
    let velocity = map.get("velocity").and_then(Value::as_f64)?;
    let legato = map.get("legato").and_then(Value::as_bool).unwrap_or(false);
    Some(Note {
        pitch: clamp_pitch(pitch.clamp(i32::MIN as i64, i32::MAX as i64) as i32),
        velocity: clamp_velocity(velocity as f32),
        legato,
    })
}

/// Load and decode the record for `key`; every failure reads as "no saved data"
/// Keep a stored proxy only while it still selects `resolution`
fn agreeing_norm(resolution: Resolution, norm: Option<f32>) -> f32 {
    norm.filter(|n| Resolution::from_norm(*n) == resolution)
        .unwrap_or_else(|| resolution.to_norm())
}

pub fn load_record(store: &dyn SequenceStore, key: &SequenceKey) -> Option<SequenceRecord> {
    match store.load(key) {
        Ok(Some(text)) => SequenceRecord::decode(&text),
        Ok(None) => None,
        Err(e) => {
            log::warn!(target: "persistence", "failed to read {}: {}", key, e);
            None
        }
    }
}

/// Encode and store the durable subset of `seq`; failures are logged
pub fn save_record(store: &mut dyn SequenceStore, seq: &Sequence) {
    let result = SequenceRecord::from_sequence(seq)
        .to_json()
        .and_then(|text| store.save(&seq.key, &text));
    if let Err(e) = result {
        log::warn!(target: "persistence", "failed to save {}: {}", seq.key, e);
    }
}
