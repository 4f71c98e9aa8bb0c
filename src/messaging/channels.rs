// Lock-free communication channels

use crate::engine::EngineCommand;
use crate::messaging::command::Command;
use ringbuf::{HeapRb, traits::Split};

pub type CommandProducer = ringbuf::HeapProd<Command>;
pub type CommandConsumer = ringbuf::HeapCons<Command>;

/// UI thread -> sequencer control thread
pub fn create_command_channel(capacity: usize) -> (CommandProducer, CommandConsumer) {
    let rb = HeapRb::<Command>::new(capacity);
    rb.split()
}

pub type EngineProducer = ringbuf::HeapProd<EngineCommand>;
pub type EngineConsumer = ringbuf::HeapCons<EngineCommand>;

/// Sequencer -> sound engine thread
pub fn create_engine_channel(capacity: usize) -> (EngineProducer, EngineConsumer) {
    let rb = HeapRb::<EngineCommand>::new(capacity);
    rb.split()
}
