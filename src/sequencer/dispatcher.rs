// Note dispatcher - Turns step transitions into note-on/note-off calls
// Synth voices are tracked in the sequence's held set; samplers and drums are one-shots

use crate::engine::{SoundEngine, send_note_off, send_note_on};
use crate::sequencer::note::Note;
use crate::sequencer::sequence::{ModuleKind, Sequence};

/// Apply the transition `from -> to` to the sound engine.
///
/// `from` is `None` for the initial trigger, in which case nothing can
/// continue. Sets the trigger flash, which expires at `flash_until_ms`.
pub fn dispatch_transition(
    seq: &mut Sequence,
    from: Option<usize>,
    to: usize,
    engine: &mut dyn SoundEngine,
    flash_until_ms: f64,
) {
    let part = seq.part;
    let curr: Vec<Note> = seq.notes_at(to).to_vec();

    match seq.kind {
        ModuleKind::Synth => {
            let prev = from.and_then(|i| seq.steps.get(i));
            // A skipped catch-up can leave the previous step unsounded, so the
            // pitch must also still be held to continue
            let continued: Vec<u8> = curr
                .iter()
                .filter(|n| {
                    n.legato
                        && prev.is_some_and(|step| step.contains_pitch(n.pitch))
                        && seq.schedule.held.contains(&n.pitch)
                })
                .map(|n| n.pitch)
                .collect();

            let released: Vec<u8> = seq
                .schedule
                .held
                .iter()
                .copied()
                .filter(|pitch| !continued.contains(pitch))
                .collect();
            for pitch in released {
                send_note_off(engine, part, pitch);
                seq.schedule.held.remove(&pitch);
            }

            for note in curr.iter().filter(|n| !continued.contains(&n.pitch)) {
                send_note_on(engine, part, note.pitch, note.velocity);
                seq.schedule.held.insert(note.pitch);
            }
        }
        ModuleKind::Sampler | ModuleKind::Drum => {
            for note in &curr {
                send_note_on(engine, part, note.pitch, note.velocity);
            }
        }
    }

    seq.playhead.last_triggered = true;
    seq.schedule.flash_until = Some(flash_until_ms);
}

/// Send note-off for every pitch the sequence holds and forget them
pub fn release_held(seq: &mut Sequence, engine: &mut dyn SoundEngine) {
    let part = seq.part;
    for pitch in std::mem::take(&mut seq.schedule.held) {
        send_note_off(engine, part, pitch);
    }
}
