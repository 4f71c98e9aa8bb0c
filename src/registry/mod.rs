// Sequence registry - exactly one Sequence per (pattern, instrument)
// Owns persistence, versioning and change notification for every sequence

pub mod observe;

use crate::engine::SoundEngine;
use crate::persistence::{SequenceStore, load_record, save_record};
use crate::sequencer::dispatcher::release_held;
use crate::sequencer::sequence::{InstrumentId, PatternId, Sequence, SequenceKey};
use crate::sequencer::transport::SharedTransport;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

pub use observe::{Observers, SequenceSnapshot, SnapshotCache, Subscription};

pub struct SequenceRegistry {
    sequences: BTreeMap<SequenceKey, Sequence>,
    /// Survives deletion so versions never repeat for a key
    versions: HashMap<SequenceKey, u64>,
    store: Box<dyn SequenceStore>,
    transport: Arc<SharedTransport>,
    current_pattern: Option<PatternId>,
    instrument_filter: Option<HashSet<InstrumentId>>,
    observers: Observers,
    snapshots: SnapshotCache,
}

impl SequenceRegistry {
    pub fn new(store: Box<dyn SequenceStore>, transport: Arc<SharedTransport>) -> Self {
        Self {
            sequences: BTreeMap::new(),
            versions: HashMap::new(),
            store,
            transport,
            current_pattern: None,
            instrument_filter: None,
            observers: Observers::new(),
            snapshots: SnapshotCache::default(),
        }
    }

    pub fn transport(&self) -> &Arc<SharedTransport> {
        &self.transport
    }

    /// Get the sequence for `key`, creating it on first access.
    /// A new sequence is overlaid with saved data when the store has any.
    pub fn get(&mut self, key: SequenceKey) -> &Sequence {
        self.ensure(key)
    }

    /// Look up a sequence without creating it
    pub fn peek(&self, key: &SequenceKey) -> Option<&Sequence> {
        self.sequences.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &SequenceKey) -> Option<&mut Sequence> {
        self.sequences.get_mut(key)
    }

    fn ensure(&mut self, key: SequenceKey) -> &mut Sequence {
        // Joins a running global transport like every other in-scope sequence
        let joins = self.transport.is_playing() && self.in_scope(&key);
        let store = self.store.as_ref();
        self.sequences
            .entry(key)
            .or_insert_with(|| Self::create(store, key, joins))
    }

    fn create(store: &dyn SequenceStore, key: SequenceKey, joins: bool) -> Sequence {
        let mut seq = Sequence::new(key);
        if let Some(record) = load_record(store, &key) {
            log::debug!(target: "registry", "loaded saved {}", key);
            record.apply_to(&mut seq);
        }
        seq.playing_global = joins;
        seq
    }

    /// Apply a mutation, bump the version, persist the durable subset and notify
    pub fn commit<R>(&mut self, key: SequenceKey, apply: impl FnOnce(&mut Sequence) -> R) -> R {
        let result = apply(self.ensure(key));
        if let Some(seq) = self.sequences.get(&key) {
            save_record(self.store.as_mut(), seq);
        }
        self.bump(&key);
        result
    }

    /// Bump the version and notify without persisting
    pub fn touch(&mut self, key: &SequenceKey) {
        if self.sequences.contains_key(key) {
            self.bump(key);
        }
    }

    fn bump(&mut self, key: &SequenceKey) {
        let version = self.versions.entry(*key).or_insert(0);
        *version += 1;
        let version = *version;
        self.observers.notify(key, version);
    }

    /// Current version of `key` (0 if never touched)
    pub fn version(&self, key: &SequenceKey) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    /// Immutable snapshot, rebuilt only when the version changed
    pub fn snapshot(&mut self, key: &SequenceKey) -> Option<Arc<SequenceSnapshot>> {
        let version = self.version(key);
        let seq = self.sequences.get(key)?;
        Some(self.snapshots.get_or_capture(seq, version))
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&SequenceKey, u64) + 'static) -> Subscription {
        self.observers.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.observers.unsubscribe(subscription)
    }

    /// Drop the in-memory sequence only; saved data stays in the store
    pub fn evict(&mut self, key: &SequenceKey, engine: &mut dyn SoundEngine) -> bool {
        match self.sequences.remove(key) {
            Some(mut seq) => {
                release_held(&mut seq, engine);
                self.snapshots.remove(key);
                self.bump(key);
                true
            }
            None => false,
        }
    }

    /// Remove every sequence of an instrument, in memory and in the store
    pub fn delete_for_instrument(&mut self, instrument: InstrumentId, engine: &mut dyn SoundEngine) -> usize {
        self.delete_where(|key| key.instrument == instrument, engine)
    }

    /// Remove every sequence of a pattern, in memory and in the store
    pub fn delete_for_pattern(&mut self, pattern: PatternId, engine: &mut dyn SoundEngine) -> usize {
        self.delete_where(|key| key.pattern == pattern, engine)
    }

    fn delete_where(
        &mut self,
        matches: impl Fn(&SequenceKey) -> bool,
        engine: &mut dyn SoundEngine,
    ) -> usize {
        let keys: Vec<SequenceKey> = self.sequences.keys().copied().filter(|k| matches(k)).collect();
        for key in &keys {
            self.evict(key, engine);
            if let Err(e) = self.store.remove(key) {
                log::warn!(target: "registry", "failed to remove saved {}: {}", key, e);
            }
        }
        if !keys.is_empty() {
            log::debug!(target: "registry", "deleted {} sequences", keys.len());
        }
        keys.len()
    }

    pub fn current_pattern(&self) -> Option<PatternId> {
        self.current_pattern
    }

    /// Change the scope the scheduler ticks; playback flags are left alone
    pub fn set_current_pattern(&mut self, pattern: PatternId) {
        self.current_pattern = Some(pattern);
    }

    /// Restrict scheduling to these instruments; `None` lifts the restriction
    pub fn set_instrument_filter(&mut self, instruments: Option<Vec<InstrumentId>>) {
        self.instrument_filter = instruments.map(|ids| ids.into_iter().collect());
    }

    /// True when the sequence takes part in scheduling polls
    pub fn in_scope(&self, key: &SequenceKey) -> bool {
        self.current_pattern == Some(key.pattern)
            && self
                .instrument_filter
                .as_ref()
                .is_none_or(|ids| ids.contains(&key.instrument))
    }

    /// Keys of existing sequences in scope, in key order
    pub fn scoped_keys(&self) -> Vec<SequenceKey> {
        self.sequences
            .keys()
            .copied()
            .filter(|k| self.in_scope(k))
            .collect()
    }

    /// Keys of all existing sequences, in key order
    pub fn keys(&self) -> Vec<SequenceKey> {
        self.sequences.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}
