// Sound engine boundary - note-on/note-off calls leave the sequencer here
// Calls are fire-and-forget: callers log failures and carry on

use crate::messaging::channels::EngineProducer;
use ringbuf::traits::Producer;

/// Errors reported by a sound engine adapter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("engine queue is full")]
    QueueFull,

    #[error("engine not started")]
    NotStarted,

    #[error("engine backend error: {0}")]
    Backend(String),
}

/// Message sent to the sound-producing engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineCommand {
    Start,
    NoteOn { part: u8, pitch: u8, velocity: f32 },
    NoteOff { part: u8, pitch: u8 },
}

/// External sound-producing engine
///
/// Implementations must not block: the scheduler calls these from its poll
/// callback. Repeated calls (double note-off, start while started) must be
/// tolerated.
pub trait SoundEngine {
    /// Bring the engine up; called before the first playback starts
    fn start(&mut self) -> Result<(), EngineError>;

    fn note_on(&mut self, part: u8, pitch: u8, velocity: f32) -> Result<(), EngineError>;

    fn note_off(&mut self, part: u8, pitch: u8) -> Result<(), EngineError>;
}

/// Engine adapter that forwards commands through a lock-free ringbuffer
/// to whatever thread drives the real engine
pub struct ChannelEngine {
    producer: EngineProducer,
}

impl ChannelEngine {
    pub fn new(producer: EngineProducer) -> Self {
        Self { producer }
    }

    fn push(&mut self, command: EngineCommand) -> Result<(), EngineError> {
        self.producer
            .try_push(command)
            .map_err(|_| EngineError::QueueFull)
    }
}

impl SoundEngine for ChannelEngine {
    fn start(&mut self) -> Result<(), EngineError> {
        self.push(EngineCommand::Start)
    }

    fn note_on(&mut self, part: u8, pitch: u8, velocity: f32) -> Result<(), EngineError> {
        self.push(EngineCommand::NoteOn {
            part,
            pitch,
            velocity,
        })
    }

    fn note_off(&mut self, part: u8, pitch: u8) -> Result<(), EngineError> {
        self.push(EngineCommand::NoteOff { part, pitch })
    }
}

/// Send a note-on, logging instead of propagating failures
pub(crate) fn send_note_on(engine: &mut dyn SoundEngine, part: u8, pitch: u8, velocity: f32) {
    if let Err(e) = engine.note_on(part, pitch, velocity) {
        log::warn!(target: "engine", "note-on part={} pitch={} failed: {}", part, pitch, e);
    }
}

/// Send a note-off, logging instead of propagating failures
pub(crate) fn send_note_off(engine: &mut dyn SoundEngine, part: u8, pitch: u8) {
    if let Err(e) = engine.note_off(part, pitch) {
        log::warn!(target: "engine", "note-off part={} pitch={} failed: {}", part, pitch, e);
    }
}
