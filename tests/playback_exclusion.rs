// Integration test: Playback mode exclusion
//
// Global and local playback never overlap, at most one sequence plays locally,
// and every stop path leaves no note sounding.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ringbuf::traits::Consumer;
use stepseq::messaging::channels::EngineConsumer;
use stepseq::{
    ChannelEngine, EngineCommand, ManualClock, MemoryStore, SequenceKey, SequencerConfig,
    StepSequencer, TransportState, create_engine_channel,
};
use std::collections::BTreeSet;

fn sequencer() -> (StepSequencer, ManualClock, EngineConsumer) {
    let (producer, consumer) = create_engine_channel(4096);
    let clock = ManualClock::new(0.0);
    let mut sequencer = StepSequencer::new(
        SequencerConfig::default(),
        Box::new(MemoryStore::new()),
        Box::new(ChannelEngine::new(producer)),
        Box::new(clock.clone()),
    );
    sequencer.set_current_pattern(1);
    (sequencer, clock, consumer)
}

/// Every step of every sequence gets a note, so anything playing holds one
fn fill(sequencer: &mut StepSequencer, key: SequenceKey, pitch: i32) {
    sequencer.set_length(key, 4);
    for step in 0..4 {
        sequencer.select(key, step, 0);
        sequencer.add_note(key, pitch, 0.9, false);
    }
}

/// Tracks which (part, pitch) pairs the engine would be sounding
#[derive(Default)]
struct Voices {
    sounding: BTreeSet<(u8, u8)>,
}

impl Voices {
    fn apply(&mut self, rx: &mut EngineConsumer) {
        for command in rx.pop_iter() {
            match command {
                EngineCommand::NoteOn { part, pitch, .. } => {
                    self.sounding.insert((part, pitch));
                }
                EngineCommand::NoteOff { part, pitch } => {
                    self.sounding.remove(&(part, pitch));
                }
                EngineCommand::Start => {}
            }
        }
    }
}

#[test]
fn test_local_start_stops_global_and_releases() {
    let (mut sequencer, clock, mut rx) = sequencer();
    let a = SequenceKey::new(1, 1);
    let b = SequenceKey::new(1, 2);
    fill(&mut sequencer, a, 60);
    fill(&mut sequencer, b, 64);
    sequencer.configure(b, 1, stepseq::ModuleKind::Synth);

    let mut voices = Voices::default();
    sequencer.toggle_global_playback();
    sequencer.tick();
    voices.apply(&mut rx);
    assert_eq!(voices.sounding.len(), 2);

    clock.advance(40.0);
    sequencer.toggle_local_playback(b);
    voices.apply(&mut rx);
    assert!(voices.sounding.is_empty());
    assert_eq!(sequencer.transport_state(), TransportState::PlayingLocal(b));
    assert!(!sequencer.sequence(a).is_playing_global());

    sequencer.tick();
    voices.apply(&mut rx);
    assert_eq!(voices.sounding, BTreeSet::from([(1, 64)]));
}

#[test]
fn test_global_start_stops_local_and_releases() {
    let (mut sequencer, _clock, mut rx) = sequencer();
    let a = SequenceKey::new(1, 1);
    let b = SequenceKey::new(1, 2);
    fill(&mut sequencer, a, 60);
    fill(&mut sequencer, b, 60);

    let mut voices = Voices::default();
    sequencer.toggle_local_playback(a);
    sequencer.tick();
    voices.apply(&mut rx);
    assert_eq!(voices.sounding.len(), 1);

    sequencer.toggle_global_playback();
    assert!(!sequencer.sequence(a).is_playing_local());
    voices.apply(&mut rx);
    assert!(voices.sounding.is_empty());

    sequencer.tick();
    assert!(sequencer.sequence(a).is_playing_global());
    assert!(sequencer.sequence(b).is_playing_global());
}

#[test]
fn test_random_toggles_keep_modes_exclusive() {
    let (mut sequencer, clock, mut rx) = sequencer();
    let keys: Vec<SequenceKey> = (1..=4).map(|i| SequenceKey::new(1, i)).collect();
    for (i, key) in keys.iter().enumerate() {
        fill(&mut sequencer, *key, 48 + i as i32);
        sequencer.configure(*key, i as i32, stepseq::ModuleKind::Synth);
    }

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut voices = Voices::default();

    for _ in 0..500 {
        match rng.gen_range(0..10) {
            0..=4 => {
                let key = keys[rng.gen_range(0..keys.len())];
                sequencer.toggle_local_playback(key);
            }
            5..=7 => sequencer.toggle_global_playback(),
            8 => sequencer.stop_all(),
            _ => sequencer.on_tempo_broadcast(rng.gen_range(20.0..240.0)),
        }
        clock.advance(rng.gen_range(1.0..200.0));
        sequencer.tick();
        voices.apply(&mut rx);

        let local: Vec<SequenceKey> = keys
            .iter()
            .copied()
            .filter(|k| sequencer.sequence(*k).is_playing_local())
            .collect();
        let global = sequencer.transport().is_playing();
        assert!(local.len() <= 1);
        assert!(!(global && !local.is_empty()));

        // Only sequences that are playing may leave a voice sounding
        if !global && local.is_empty() {
            assert!(voices.sounding.is_empty());
        }
        if let Some(key) = local.first() {
            let part = sequencer.sequence(*key).part();
            assert!(voices.sounding.iter().all(|(p, _)| *p == part));
        }
    }

    sequencer.stop_all();
    voices.apply(&mut rx);
    assert!(voices.sounding.is_empty());
    assert_eq!(sequencer.transport_state(), TransportState::Stopped);
}
