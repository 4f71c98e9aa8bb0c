// Note representation for the step grid
// A step holds zero or more notes sounding together (a chord)

use serde::{Deserialize, Serialize};

/// Highest MIDI note number
pub const MAX_PITCH: u8 = 127;

/// A pitched event inside a step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// MIDI note number (0-127, where 60 = C4)
    pub pitch: u8,

    /// Velocity (0.0-1.0)
    pub velocity: f32,

    /// Continue sounding from the previous step when it holds the same pitch
    #[serde(default)]
    pub legato: bool,
}

impl Note {
    /// Creates a new note, clamping pitch and velocity into range
    pub fn new(pitch: i32, velocity: f32, legato: bool) -> Self {
        Self {
            pitch: clamp_pitch(pitch),
            velocity: clamp_velocity(velocity),
            legato,
        }
    }
}

/// One rhythmic slot of a sequence
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Step {
    pub index: usize,
    pub notes: Vec<Note>,
}

impl Step {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            notes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Check whether the step holds the given pitch
    pub fn contains_pitch(&self, pitch: u8) -> bool {
        self.notes.iter().any(|n| n.pitch == pitch)
    }

    /// Insert a note, merging with an existing note of the same pitch.
    /// Returns the index the note ended up at.
    pub fn upsert(&mut self, note: Note) -> usize {
        if let Some(index) = self.notes.iter().position(|n| n.pitch == note.pitch) {
            self.notes[index] = note;
            index
        } else {
            self.notes.push(note);
            self.notes.len() - 1
        }
    }
}

/// Clamp an arbitrary integer into the MIDI pitch range
pub fn clamp_pitch(pitch: i32) -> u8 {
    pitch.clamp(0, MAX_PITCH as i32) as u8
}

/// Clamp a velocity into 0.0..=1.0 (NaN becomes silent)
pub fn clamp_velocity(velocity: f32) -> f32 {
    if velocity.is_nan() {
        0.0
    } else {
        velocity.clamp(0.0, 1.0)
    }
}
