// Sequence - Per-(pattern, instrument) step grid and its playback state
// Only the registry hands out mutable access; editing goes through the typed commands below

use crate::sequencer::note::{Note, Step, clamp_pitch, clamp_velocity};
use crate::sequencer::timeline::{DEFAULT_BPM, Resolution, Tempo, clamp_bpm};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Unique identifier for patterns
pub type PatternId = u64;

/// Unique identifier for instruments
pub type InstrumentId = u64;

/// Number of step slots allocated per sequence
pub const MAX_STEPS: usize = 64;
/// Default active step count
pub const DEFAULT_LENGTH: usize = 16;
/// Highest routing index of the sound engine
pub const MAX_PART: u8 = 5;

/// Two-part identity of a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SequenceKey {
    pub pattern: PatternId,
    pub instrument: InstrumentId,
}

impl SequenceKey {
    pub fn new(pattern: PatternId, instrument: InstrumentId) -> Self {
        Self {
            pattern,
            instrument,
        }
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pattern {} / instrument {}", self.pattern, self.instrument)
    }
}

/// Category of sound-producing module, governs note-off semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModuleKind {
    /// Tracked voices with explicit note-off and legato
    #[default]
    Synth,
    /// One-shot triggers
    Sampler,
    /// One-shot triggers
    Drum,
}

/// Which clock a sequence follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlayMode {
    /// Runs at the global tempo
    #[default]
    #[serde(rename = "tempo")]
    TempoLocked,
    /// Runs at its own local tempo
    #[serde(rename = "poly")]
    Polyrhythmic,
}

/// Editing cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    pub step: usize,
    pub note: usize,
}

/// Transient playhead, never persisted
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Playhead {
    pub step: usize,
    pub frac: f32,
    pub last_triggered: bool,
}

/// Partial edit of the selected note
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NoteEdit {
    pub pitch: Option<i32>,
    pub velocity: Option<f32>,
    pub legato: Option<bool>,
}

/// Internal scheduling state
#[derive(Debug, Clone, Default)]
pub(crate) struct ScheduleState {
    /// Pitches currently sounding because of this sequence
    pub held: BTreeSet<u8>,
    /// `None` means the next poll performs the initial trigger
    pub next_step_due: Option<f64>,
    pub last_fired: Option<usize>,
    /// Start of this sequence's step grid; step edges and the loop
    /// fraction are both measured from here
    pub origin: Option<f64>,
    pub last_frac_notify: Option<f64>,
    pub flash_until: Option<f64>,
}

/// The unit of playable state
#[derive(Debug, Clone)]
pub struct Sequence {
    pub(crate) key: SequenceKey,
    pub(crate) part: u8,
    pub(crate) kind: ModuleKind,
    pub(crate) steps: Vec<Step>,
    pub(crate) length: usize,
    pub(crate) resolution: Resolution,
    pub(crate) resolution_norm: f32,
    pub(crate) mode: PlayMode,
    pub(crate) local_bpm: f64,
    pub(crate) selection: Selection,
    pub(crate) playing_local: bool,
    pub(crate) playing_global: bool,
    pub(crate) playhead: Playhead,
    pub(crate) schedule: ScheduleState,
}

impl Sequence {
    /// Create a sequence with default content
    pub fn new(key: SequenceKey) -> Self {
        Self {
            key,
            part: 0,
            kind: ModuleKind::default(),
            steps: empty_steps(),
            length: DEFAULT_LENGTH,
            resolution: Resolution::default(),
            resolution_norm: Resolution::default().to_norm(),
            mode: PlayMode::default(),
            local_bpm: DEFAULT_BPM,
            selection: Selection::default(),
            playing_local: false,
            playing_global: false,
            playhead: Playhead::default(),
            schedule: ScheduleState::default(),
        }
    }

    pub fn key(&self) -> SequenceKey {
        self.key
    }

    pub fn part(&self) -> u8 {
        self.part
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Notes at a step index (empty for out-of-range indices)
    pub fn notes_at(&self, index: usize) -> &[Note] {
        self.steps
            .get(index)
            .map(|s| s.notes.as_slice())
            .unwrap_or(&[])
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn resolution_norm(&self) -> f32 {
        self.resolution_norm
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    pub fn local_bpm(&self) -> f64 {
        self.local_bpm
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn is_playing_local(&self) -> bool {
        self.playing_local
    }

    pub fn is_playing_global(&self) -> bool {
        self.playing_global
    }

    pub fn playhead(&self) -> Playhead {
        self.playhead
    }

    /// Pitches currently held by this sequence, ascending
    pub fn held_notes(&self) -> Vec<u8> {
        self.schedule.held.iter().copied().collect()
    }

    /// Tempo this sequence runs at, given the global tempo
    pub fn effective_tempo(&self, global: Tempo) -> Tempo {
        match self.mode {
            PlayMode::TempoLocked => global,
            PlayMode::Polyrhythmic => Tempo::new(self.local_bpm),
        }
    }

    /// Duration of one step in milliseconds, given the global tempo
    pub fn step_duration_ms(&self, global: Tempo) -> f64 {
        self.resolution.step_duration_ms(self.effective_tempo(global))
    }

    pub(crate) fn set_part(&mut self, part: i32) {
        self.part = part.clamp(0, MAX_PART as i32) as u8;
    }

    pub(crate) fn set_kind(&mut self, kind: ModuleKind) {
        self.kind = kind;
    }

    /// Move the cursor; both indices are clamped
    pub(crate) fn select(&mut self, step: i32, note: i32) {
        let step = step.clamp(0, self.length as i32 - 1) as usize;
        let note_count = self.steps[step].notes.len();
        self.selection = Selection {
            step,
            note: (note.max(0) as usize).min(note_count.saturating_sub(1)),
        };
    }

    /// Add a note to the selected step and select it
    pub(crate) fn add_note(&mut self, pitch: i32, velocity: f32, legato: bool) {
        let step = &mut self.steps[self.selection.step];
        self.selection.note = step.upsert(Note::new(pitch, velocity, legato));
    }

    /// Remove the selected note; no-op on an empty step
    pub(crate) fn remove_note(&mut self) -> Option<Note> {
        let step = &mut self.steps[self.selection.step];
        if self.selection.note >= step.notes.len() {
            return None;
        }
        let removed = step.notes.remove(self.selection.note);
        self.selection.note = self.selection.note.min(step.notes.len().saturating_sub(1));
        Some(removed)
    }

    /// Edit the selected note; no-op on an empty step
    pub(crate) fn update_note(&mut self, edit: NoteEdit) -> bool {
        let step = &mut self.steps[self.selection.step];
        let Some(note) = step.notes.get_mut(self.selection.note) else {
            return false;
        };

        if let Some(velocity) = edit.velocity {
            note.velocity = clamp_velocity(velocity);
        }
        if let Some(legato) = edit.legato {
            note.legato = legato;
        }
        if let Some(pitch) = edit.pitch {
            let pitch = clamp_pitch(pitch);
            if pitch != note.pitch {
                let mut moved = step.notes.remove(self.selection.note);
                moved.pitch = pitch;
                self.selection.note = step.upsert(moved);
            }
        }
        true
    }

    /// Add a default note when the selected step is empty.
    /// Returns true when a note was added.
    pub(crate) fn ensure_note(&mut self, pitch: i32, velocity: f32) -> bool {
        if self.steps[self.selection.step].is_empty() {
            self.add_note(pitch, velocity, false);
            true
        } else {
            false
        }
    }

    pub(crate) fn toggle_legato(&mut self) -> bool {
        let step = &mut self.steps[self.selection.step];
        match step.notes.get_mut(self.selection.note) {
            Some(note) => {
                note.legato = !note.legato;
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_resolution(&mut self, resolution: Resolution) {
        self.resolution = resolution;
        self.resolution_norm = resolution.to_norm();
    }

    /// Set the knob proxy; the resolution snaps to the nearest subdivision
    pub(crate) fn set_resolution_norm(&mut self, norm: f32) {
        let norm = if norm.is_finite() { norm.clamp(0.0, 1.0) } else { 0.0 };
        self.resolution_norm = norm;
        self.resolution = Resolution::from_norm(norm);
    }

    pub(crate) fn set_length(&mut self, length: i32) {
        self.length = length.clamp(1, MAX_STEPS as i32) as usize;
        if self.selection.step >= self.length {
            self.select(self.length as i32 - 1, self.selection.note as i32);
        }
    }

    pub(crate) fn set_mode(&mut self, mode: PlayMode) {
        self.mode = mode;
    }

    pub(crate) fn set_local_bpm(&mut self, bpm: f64) {
        self.local_bpm = clamp_bpm(bpm);
    }

    /// Replace the grid, padding to `MAX_STEPS` slots with consistent indices
    pub(crate) fn set_steps(&mut self, steps: Vec<Step>) {
        let mut grid = empty_steps();
        for step in steps {
            if step.index < MAX_STEPS {
                grid[step.index].notes = step.notes;
            }
        }
        self.steps = grid;
        self.select(self.selection.step as i32, self.selection.note as i32);
    }

    /// Reset playhead and scheduling state.
    /// Held notes must already have been released.
    pub(crate) fn reset_playback(&mut self) {
        debug_assert!(self.schedule.held.is_empty());
        self.playhead = Playhead::default();
        self.schedule = ScheduleState::default();
    }
}

fn empty_steps() -> Vec<Step> {
    (0..MAX_STEPS).map(Step::new).collect()
}
