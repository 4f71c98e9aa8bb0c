// Observation layer - change notification and version-cached snapshots

use crate::sequencer::note::Step;
use crate::sequencer::sequence::{
    ModuleKind, PlayMode, Playhead, Selection, Sequence, SequenceKey,
};
use crate::sequencer::timeline::Resolution;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Callback invoked with the changed key and its new version
pub type Listener = Box<dyn FnMut(&SequenceKey, u64)>;

/// Handle returned by `subscribe`, pass it back to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// Registered change listeners
#[derive(Default)]
pub struct Observers {
    next_id: u64,
    listeners: Vec<(Subscription, Listener)>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&SequenceKey, u64) + 'static) -> Subscription {
        let subscription = Subscription(self.next_id);
        self.next_id += 1;
        self.listeners.push((subscription, Box::new(listener)));
        subscription
    }

    /// Returns false if the subscription was already gone
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(s, _)| *s != subscription);
        self.listeners.len() != before
    }

    pub fn notify(&mut self, key: &SequenceKey, version: u64) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(key, version);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Immutable view of a sequence at one version
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceSnapshot {
    pub key: SequenceKey,
    pub version: u64,
    pub part: u8,
    pub kind: ModuleKind,
    pub steps: Vec<Step>,
    pub length: usize,
    pub resolution: Resolution,
    pub resolution_norm: f32,
    pub mode: PlayMode,
    pub local_bpm: f64,
    pub selection: Selection,
    pub playing_local: bool,
    pub playing_global: bool,
    pub playhead: Playhead,
    pub held_notes: Vec<u8>,
}

impl SequenceSnapshot {
    pub fn capture(seq: &Sequence, version: u64) -> Self {
        Self {
            key: seq.key(),
            version,
            part: seq.part(),
            kind: seq.kind(),
            steps: seq.steps().to_vec(),
            length: seq.length(),
            resolution: seq.resolution(),
            resolution_norm: seq.resolution_norm(),
            mode: seq.mode(),
            local_bpm: seq.local_bpm(),
            selection: seq.selection(),
            playing_local: seq.is_playing_local(),
            playing_global: seq.is_playing_global(),
            playhead: seq.playhead(),
            held_notes: seq.held_notes(),
        }
    }
}

/// Snapshots keyed by sequence, rebuilt only when the version moves
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: HashMap<SequenceKey, Arc<SequenceSnapshot>>,
}

impl SnapshotCache {
    pub fn get_or_capture(&mut self, seq: &Sequence, version: u64) -> Arc<SequenceSnapshot> {
        match self.entries.get(&seq.key()) {
            Some(cached) if cached.version == version => Arc::clone(cached),
            _ => {
                let snapshot = Arc::new(SequenceSnapshot::capture(seq, version));
                self.entries.insert(seq.key(), Arc::clone(&snapshot));
                snapshot
            }
        }
    }

    pub fn remove(&mut self, key: &SequenceKey) {
        self.entries.remove(key);
    }
}
