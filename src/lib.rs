// stepseq - Step-sequencer scheduling engine, library exports

pub mod clock;
pub mod config;
pub mod driver;
pub mod engine;
pub mod messaging;
pub mod persistence;
pub mod registry;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, SequencerConfig};
pub use driver::Driver;
pub use engine::{ChannelEngine, EngineCommand, EngineError, SoundEngine};
pub use messaging::channels::{create_command_channel, create_engine_channel};
pub use messaging::command::Command;
pub use persistence::{FileStore, MemoryStore, PersistenceError, SequenceRecord, SequenceStore};
pub use registry::{SequenceRegistry, SequenceSnapshot, Subscription};
pub use sequencer::{
    ModuleKind, Note, NoteEdit, PlayMode, Resolution, SequenceKey, SharedTransport, Step,
    StepSequencer, Tempo, TransportState,
};
