// Integration test: Scheduling scenarios
//
// Drives a StepSequencer through a ManualClock at the real poll cadence and
// checks the note stream the sound engine receives.

use ringbuf::traits::Consumer;
use stepseq::messaging::channels::EngineConsumer;
use stepseq::{
    ChannelEngine, Clock, EngineCommand, EngineError, ManualClock, MemoryStore, ModuleKind,
    SequenceKey, SequencerConfig, SoundEngine, StepSequencer, create_engine_channel,
};
use std::cell::RefCell;
use std::rc::Rc;

const POLL_MS: f64 = 8.0;
const STEP_MS: f64 = 125.0;
const ORIGIN: f64 = 1000.0;

fn sequencer() -> (StepSequencer, ManualClock, EngineConsumer) {
    let (producer, consumer) = create_engine_channel(1024);
    let clock = ManualClock::new(ORIGIN);
    let mut sequencer = StepSequencer::new(
        SequencerConfig::default(),
        Box::new(MemoryStore::new()),
        Box::new(ChannelEngine::new(producer)),
        Box::new(clock.clone()),
    );
    sequencer.set_current_pattern(1);
    (sequencer, clock, consumer)
}

/// Poll every 8 ms until `until` (relative to the origin), collecting
/// everything sent to the engine with its timestamp
fn run(
    sequencer: &mut StepSequencer,
    clock: &ManualClock,
    rx: &mut EngineConsumer,
    until: f64,
) -> Vec<(f64, EngineCommand)> {
    let mut events = Vec::new();
    while clock.now_ms() - ORIGIN < until {
        clock.advance(POLL_MS);
        sequencer.tick();
        let at = clock.now_ms() - ORIGIN;
        events.extend(rx.pop_iter().map(|c| (at, c)));
    }
    events
}

#[test]
fn test_single_note_scenario() {
    let (mut sequencer, clock, mut rx) = sequencer();
    let key = SequenceKey::new(1, 1);
    sequencer.configure(key, 2, ModuleKind::Synth);
    sequencer.add_note(key, 60, 0.7, false);

    sequencer.toggle_local_playback(key);
    sequencer.tick();
    assert_eq!(rx.try_pop(), Some(EngineCommand::Start));
    assert_eq!(
        rx.try_pop(),
        Some(EngineCommand::NoteOn {
            part: 2,
            pitch: 60,
            velocity: 0.7
        })
    );
    assert_eq!(rx.try_pop(), None);

    let events = run(&mut sequencer, &clock, &mut rx, 200.0);
    assert_eq!(events.len(), 1);
    let (at, command) = events[0];
    assert_eq!(command, EngineCommand::NoteOff { part: 2, pitch: 60 });
    assert!(
        (STEP_MS - 2.0..=STEP_MS + POLL_MS).contains(&at),
        "note-off arrived at {} ms",
        at
    );
    assert_eq!(sequencer.sequence(key).playhead().step, 1);
}

#[test]
fn test_legato_tie_across_steps() {
    let (mut sequencer, clock, mut rx) = sequencer();
    let key = SequenceKey::new(1, 1);
    sequencer.set_length(key, 3);
    sequencer.add_note(key, 60, 0.7, false);
    sequencer.select(key, 1, 0);
    sequencer.add_note(key, 60, 0.7, true);

    sequencer.toggle_local_playback(key);
    sequencer.tick();
    rx.pop_iter().count();

    // Step 0 -> 1 is a tie: nothing is sent and 60 stays held
    let tie = run(&mut sequencer, &clock, &mut rx, STEP_MS + POLL_MS);
    assert!(tie.is_empty());
    assert_eq!(sequencer.sequence(key).held_notes(), vec![60]);

    // Step 1 -> 2 releases, 2 -> 0 re-triggers
    let rest: Vec<EngineCommand> = run(&mut sequencer, &clock, &mut rx, 3.0 * STEP_MS + POLL_MS)
        .into_iter()
        .map(|(_, c)| c)
        .collect();
    assert_eq!(
        rest,
        vec![
            EngineCommand::NoteOff { part: 0, pitch: 60 },
            EngineCommand::NoteOn {
                part: 0,
                pitch: 60,
                velocity: 0.7
            },
        ]
    );
}

#[test]
fn test_catch_up_after_stall() {
    let (mut sequencer, clock, mut rx) = sequencer();
    let key = SequenceKey::new(1, 1);
    sequencer.set_length(key, 4);
    for step in 0..4 {
        sequencer.select(key, step, 0);
        sequencer.add_note(key, 60 + step, 1.0, false);
    }

    sequencer.toggle_local_playback(key);
    sequencer.tick();
    rx.pop_iter().count();

    // One poll arrives 3.5 steps late
    clock.advance(3.5 * STEP_MS);
    sequencer.tick();
    let burst: Vec<EngineCommand> = rx.pop_iter().collect();
    let on = |pitch| EngineCommand::NoteOn {
        part: 0,
        pitch,
        velocity: 1.0,
    };
    let off = |pitch| EngineCommand::NoteOff { part: 0, pitch };
    assert_eq!(
        burst,
        vec![off(60), on(61), off(61), on(62), off(62), on(63)]
    );
    assert_eq!(sequencer.sequence(key).playhead().step, 3);

    // The loop continues on the original grid
    clock.set(ORIGIN + 4.0 * STEP_MS);
    sequencer.tick();
    assert_eq!(rx.pop_iter().collect::<Vec<_>>(), vec![off(63), on(60)]);
}

#[test]
fn test_catch_up_bound_after_long_stall() {
    let (mut sequencer, clock, mut rx) = sequencer();
    let key = SequenceKey::new(1, 1);
    sequencer.set_length(key, 4);
    for step in 0..4 {
        sequencer.select(key, step, 0);
        sequencer.add_note(key, 60 + step, 1.0, false);
    }
    sequencer.toggle_local_playback(key);
    sequencer.tick();
    rx.pop_iter().count();

    clock.advance(10.5 * STEP_MS);
    sequencer.tick();
    let note_ons = rx
        .pop_iter()
        .filter(|c| matches!(c, EngineCommand::NoteOn { .. }))
        .count();
    assert_eq!(note_ons, 4);
    assert_eq!(sequencer.sequence(key).playhead().step, 2);
    assert_eq!(sequencer.sequence(key).held_notes(), vec![60]);

    // Next edge picks up from the jumped playhead and releases the stale voice
    clock.set(ORIGIN + 11.0 * STEP_MS);
    sequencer.tick();
    assert_eq!(
        rx.pop_iter().collect::<Vec<_>>(),
        vec![
            EngineCommand::NoteOff { part: 0, pitch: 60 },
            EngineCommand::NoteOn {
                part: 0,
                pitch: 63,
                velocity: 1.0
            },
        ]
    );
}

#[test]
fn test_drum_steps_are_one_shots() {
    let (mut sequencer, clock, mut rx) = sequencer();
    let key = SequenceKey::new(1, 9);
    sequencer.configure(key, 5, ModuleKind::Drum);
    sequencer.set_length(key, 2);
    sequencer.add_note(key, 36, 1.0, false);
    sequencer.select(key, 1, 0);
    sequencer.add_note(key, 36, 1.0, true);

    sequencer.toggle_global_playback();
    sequencer.tick();
    let events = run(&mut sequencer, &clock, &mut rx, 2.0 * STEP_MS + POLL_MS);

    assert!(
        events
            .iter()
            .all(|(_, c)| !matches!(c, EngineCommand::NoteOff { .. }))
    );
    let hits = events
        .iter()
        .filter(|(_, c)| matches!(c, EngineCommand::NoteOn { part: 5, pitch: 36, .. }))
        .count();
    assert_eq!(hits, 3);
}

/// Engine that refuses to start once and rejects every note
#[derive(Clone, Default)]
struct FlakyEngine {
    starts: Rc<RefCell<u32>>,
    rejected: Rc<RefCell<u32>>,
}

impl SoundEngine for FlakyEngine {
    fn start(&mut self) -> Result<(), EngineError> {
        let mut starts = self.starts.borrow_mut();
        *starts += 1;
        if *starts == 1 {
            Err(EngineError::Backend("device busy".into()))
        } else {
            Ok(())
        }
    }

    fn note_on(&mut self, _part: u8, _pitch: u8, _velocity: f32) -> Result<(), EngineError> {
        *self.rejected.borrow_mut() += 1;
        Err(EngineError::NotStarted)
    }

    fn note_off(&mut self, _part: u8, _pitch: u8) -> Result<(), EngineError> {
        *self.rejected.borrow_mut() += 1;
        Err(EngineError::NotStarted)
    }
}

#[test]
fn test_engine_failures_do_not_disturb_scheduling() {
    let _ = simplelog::TestLogger::init(log::LevelFilter::Debug, simplelog::Config::default());

    let engine = FlakyEngine::default();
    let clock = ManualClock::new(0.0);
    let mut sequencer = StepSequencer::new(
        SequencerConfig::default(),
        Box::new(MemoryStore::new()),
        Box::new(engine.clone()),
        Box::new(clock.clone()),
    );
    sequencer.set_current_pattern(1);
    let key = SequenceKey::new(1, 1);
    sequencer.add_note(key, 60, 0.7, false);

    sequencer.toggle_local_playback(key);
    for _ in 0..40 {
        sequencer.tick();
        clock.advance(POLL_MS);
    }
    let seq = sequencer.sequence(key);
    assert!(seq.is_playing_local());
    assert_eq!(seq.playhead().step, 2);
    assert_eq!(*engine.rejected.borrow(), 2);

    // Start is retried on the next playback start
    sequencer.toggle_local_playback(key);
    sequencer.toggle_local_playback(key);
    assert_eq!(*engine.starts.borrow(), 2);
}
