// Command types - UI → sequencer control thread

use crate::sequencer::sequence::{
    InstrumentId, ModuleKind, NoteEdit, PatternId, PlayMode, SequenceKey,
};
use crate::sequencer::timeline::Resolution;

/// Mutation request, applied by `StepSequencer::execute`
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Configure {
        key: SequenceKey,
        part: i32,
        kind: ModuleKind,
    },
    SetPart(SequenceKey, i32),
    SetModuleKind(SequenceKey, ModuleKind),
    Select {
        key: SequenceKey,
        step: i32,
        note: i32,
    },
    AddNote {
        key: SequenceKey,
        pitch: i32,
        velocity: f32,
        legato: bool,
    },
    RemoveNote(SequenceKey),
    UpdateNote(SequenceKey, NoteEdit),
    EnsureNote(SequenceKey),
    ToggleLegato(SequenceKey),
    SetResolution(SequenceKey, Resolution),
    SetResolutionNorm(SequenceKey, f32),
    SetLength(SequenceKey, i32),
    SetMode(SequenceKey, PlayMode),
    SetLocalBpm(SequenceKey, f64),
    ToggleLocalPlayback(SequenceKey),
    ToggleGlobalPlayback,
    StopAll,
    SetCurrentPattern(PatternId),
    SetInstrumentFilter(Option<Vec<InstrumentId>>),
    DeleteForInstrument(InstrumentId),
    DeleteForPattern(PatternId),
    /// Tempo broadcast from the host
    SetGlobalBpm(f64),
}
