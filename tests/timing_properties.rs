// Integration test: Step timing properties
//
// Step durations follow the tempo formula, and irregular polling never skips
// or double-fires a step edge.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ringbuf::traits::Consumer;
use stepseq::{
    ChannelEngine, Clock, EngineCommand, ManualClock, MemoryStore, ModuleKind, PlayMode,
    Resolution, SequenceKey, SequencerConfig, StepSequencer, Tempo, create_engine_channel,
};

#[test]
fn test_step_duration_formula() {
    let divisors = [
        (Resolution::Quarter, 1.0),
        (Resolution::Eighth, 2.0),
        (Resolution::EighthTriplet, 3.0),
        (Resolution::Sixteenth, 4.0),
        (Resolution::SixteenthTriplet, 6.0),
        (Resolution::ThirtySecond, 8.0),
    ];
    for bpm in (20..=240).step_by(5) {
        let tempo = Tempo::new(bpm as f64);
        for (resolution, divisor) in divisors {
            let expected = 60000.0 / bpm as f64 / divisor;
            assert!((resolution.step_duration_ms(tempo) - expected).abs() < 1e-9);
        }
    }

    let tempo = Tempo::new(120.0);
    assert_eq!(Resolution::Sixteenth.step_duration_ms(tempo), 125.0);
    assert!((Resolution::EighthTriplet.step_duration_ms(tempo) - 166.67).abs() < 0.01);
}

#[test]
fn test_jittery_polls_fire_every_edge_once() {
    let mut rng = StdRng::seed_from_u64(42);

    for round in 0..12 {
        let resolution = Resolution::ALL[round % Resolution::ALL.len()];
        let bpm = rng.gen_range(60.0..240.0);
        let max_gap = 20.0;

        let (producer, mut rx) = create_engine_channel(4096);
        let clock = ManualClock::new(rng.gen_range(0.0..10_000.0));
        let mut sequencer = StepSequencer::new(
            SequencerConfig::default(),
            Box::new(MemoryStore::new()),
            Box::new(ChannelEngine::new(producer)),
            Box::new(clock.clone()),
        );
        sequencer.set_current_pattern(1);

        let key = SequenceKey::new(1, 1);
        sequencer.configure(key, 0, ModuleKind::Drum);
        sequencer.set_length(key, 8);
        sequencer.set_resolution(key, resolution);
        sequencer.set_mode(key, PlayMode::Polyrhythmic);
        sequencer.set_local_bpm(key, bpm);
        for step in 0..8 {
            sequencer.select(key, step, 0);
            sequencer.add_note(key, 60 + step, 1.0, false);
        }

        let step_ms = resolution.step_duration_ms(Tempo::new(bpm));
        let origin = clock.now_ms();
        sequencer.toggle_local_playback(key);

        let mut hits: Vec<(f64, u8)> = Vec::new();
        let mut last_at = 0.0;
        while clock.now_ms() - origin < 4_000.0 {
            sequencer.tick();
            let at = clock.now_ms() - origin;
            last_at = at;
            hits.extend(rx.pop_iter().filter_map(|c| match c {
                EngineCommand::NoteOn { pitch, .. } => Some((at, pitch)),
                _ => None,
            }));
            clock.advance(rng.gen_range(1.0..max_gap));
        }

        // Every edge that came due before the last poll has fired
        let due = ((last_at + 2.0) / step_ms).floor() as usize + 1;
        assert!(hits.len() + 1 >= due, "round {}: {} of {} edges", round, hits.len(), due);
        for (k, (at, pitch)) in hits.iter().enumerate() {
            let edge = k as f64 * step_ms;
            assert_eq!(*pitch, 60 + (k % 8) as u8, "round {}: edge {} out of order", round, k);
            assert!(
                *at >= edge - 2.0 - 1e-6 && *at < edge + max_gap + 1e-6,
                "round {}: edge {} due at {:.2} fired at {:.2}",
                round,
                k,
                edge,
                at
            );
        }
    }
}
