// Sequencer module - step grids, step timing and note dispatch
// The StepSequencer facade is the entry point for the control thread

pub mod dispatcher;
pub mod note;
pub mod playback;
pub mod scheduler;
pub mod sequence;
pub mod step_sequencer;
pub mod timeline;
pub mod transport;

pub use note::{Note, Step};
pub use scheduler::{Advance, StepScheduler};
pub use sequence::{
    InstrumentId, ModuleKind, NoteEdit, PatternId, PlayMode, Playhead, Selection, Sequence,
    SequenceKey,
};
pub use step_sequencer::StepSequencer;
pub use timeline::{Resolution, Tempo};
pub use transport::{SharedTransport, TransportState};
