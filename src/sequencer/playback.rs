// Playback mode coordination - one global transport or at most one local transport
// Every stop path releases held notes before returning

use crate::engine::SoundEngine;
use crate::registry::SequenceRegistry;
use crate::sequencer::dispatcher::release_held;
use crate::sequencer::sequence::{Sequence, SequenceKey};
use crate::sequencer::transport::TransportState;

/// Derive the current playback mode from the registry
pub fn transport_state(registry: &SequenceRegistry) -> TransportState {
    if registry.transport().is_playing() {
        return TransportState::PlayingGlobal;
    }
    registry
        .keys()
        .into_iter()
        .find(|k| registry.peek(k).is_some_and(Sequence::is_playing_local))
        .map(TransportState::PlayingLocal)
        .unwrap_or(TransportState::Stopped)
}

/// Start `key` on its own clock, stopping global playback and any other
/// local sequence first
pub fn start_local(
    registry: &mut SequenceRegistry,
    key: SequenceKey,
    engine: &mut dyn SoundEngine,
    now_ms: f64,
) {
    if registry.transport().is_playing() {
        stop_global(registry, engine);
    }
    for other in registry.keys() {
        if registry.peek(&other).is_some_and(Sequence::is_playing_local) {
            stop_local(registry, other, engine);
        }
    }

    registry.get(key);
    if let Some(seq) = registry.get_mut(&key) {
        release_held(seq, engine);
        seq.reset_playback();
        seq.schedule.origin = Some(now_ms);
        seq.playing_local = true;
    }
    registry.touch(&key);
    log::info!(target: "playback", "local playback started on {}", key);
}

/// Stop local playback of `key`; no-op if it is not playing locally
pub fn stop_local(registry: &mut SequenceRegistry, key: SequenceKey, engine: &mut dyn SoundEngine) {
    let Some(seq) = registry.get_mut(&key) else {
        return;
    };
    if !seq.playing_local {
        return;
    }
    release_held(seq, engine);
    seq.reset_playback();
    seq.playing_local = false;
    registry.touch(&key);
    log::info!(target: "playback", "local playback stopped on {}", key);
}

/// Start the global transport for every in-scope sequence
pub fn start_global(registry: &mut SequenceRegistry, engine: &mut dyn SoundEngine, now_ms: f64) {
    for key in registry.keys() {
        if registry.peek(&key).is_some_and(Sequence::is_playing_local) {
            stop_local(registry, key, engine);
        }
    }

    registry.transport().start(now_ms);
    let origin = registry.transport().start_ms();
    for key in registry.scoped_keys() {
        if let Some(seq) = registry.get_mut(&key) {
            release_held(seq, engine);
            seq.reset_playback();
            seq.schedule.origin = Some(origin);
            seq.playing_global = true;
        }
        registry.touch(&key);
    }
    log::info!(
        target: "playback",
        "global playback started at {:.1} BPM",
        registry.transport().bpm()
    );
}

/// Stop the global transport and every sequence following it
pub fn stop_global(registry: &mut SequenceRegistry, engine: &mut dyn SoundEngine) {
    for key in registry.keys() {
        let Some(seq) = registry.get_mut(&key) else {
            continue;
        };
        if !seq.playing_global {
            continue;
        }
        release_held(seq, engine);
        seq.reset_playback();
        seq.playing_global = false;
        registry.touch(&key);
    }
    registry.transport().stop();
    log::info!(target: "playback", "global playback stopped");
}

/// Reconcile playback flags after the scheduling scope changed.
/// Sequences that left the scope are stopped; sequences that entered it
/// join a running global transport.
pub fn sync_scope(registry: &mut SequenceRegistry, engine: &mut dyn SoundEngine) {
    let global = registry.transport().is_playing();
    for key in registry.keys() {
        let in_scope = registry.in_scope(&key);
        let Some(seq) = registry.get_mut(&key) else {
            continue;
        };
        if !in_scope {
            if !(seq.playing_local || seq.playing_global || !seq.schedule.held.is_empty()) {
                continue;
            }
            release_held(seq, engine);
            seq.reset_playback();
            seq.playing_local = false;
            seq.playing_global = false;
            log::debug!(target: "playback", "{} left the scope, stopped", key);
        } else if global && !seq.playing_global {
            release_held(seq, engine);
            seq.reset_playback();
            seq.playing_global = true;
            log::debug!(target: "playback", "{} joined global playback", key);
        } else {
            continue;
        }
        registry.touch(&key);
    }
}

/// Force-stop every sequence in every scope
pub fn stop_all(registry: &mut SequenceRegistry, engine: &mut dyn SoundEngine) {
    for key in registry.keys() {
        let Some(seq) = registry.get_mut(&key) else {
            continue;
        };
        let was_active = seq.playing_local || seq.playing_global || !seq.schedule.held.is_empty();
        release_held(seq, engine);
        seq.reset_playback();
        seq.playing_local = false;
        seq.playing_global = false;
        if was_active {
            registry.touch(&key);
        }
    }
    registry.transport().stop();
    log::debug!(target: "playback", "all playback stopped");
}
