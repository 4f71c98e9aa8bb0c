// Step sequencer - Control-thread facade over registry, scheduler and playback
// Every mutation from the UI layer enters here, directly or as a queued Command

use crate::clock::Clock;
use crate::config::SequencerConfig;
use crate::engine::SoundEngine;
use crate::messaging::channels::CommandConsumer;
use crate::messaging::command::Command;
use crate::persistence::SequenceStore;
use crate::registry::{SequenceRegistry, SequenceSnapshot, Subscription};
use crate::sequencer::dispatcher::release_held;
use crate::sequencer::note::Note;
use crate::sequencer::playback;
use crate::sequencer::scheduler::StepScheduler;
use crate::sequencer::sequence::{
    InstrumentId, ModuleKind, NoteEdit, PatternId, PlayMode, Sequence, SequenceKey,
};
use crate::sequencer::timeline::Resolution;
use crate::sequencer::transport::{SharedTransport, TransportState};
use ringbuf::traits::Consumer;
use std::sync::Arc;

pub struct StepSequencer {
    registry: SequenceRegistry,
    scheduler: StepScheduler,
    config: SequencerConfig,
    engine: Box<dyn SoundEngine>,
    clock: Box<dyn Clock>,
    engine_started: bool,
}

impl StepSequencer {
    pub fn new(
        config: SequencerConfig,
        store: Box<dyn SequenceStore>,
        engine: Box<dyn SoundEngine>,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self::with_transport(config, store, engine, clock, SharedTransport::new())
    }

    /// Build around an existing transport handle, e.g. one the host also reads
    pub fn with_transport(
        config: SequencerConfig,
        store: Box<dyn SequenceStore>,
        engine: Box<dyn SoundEngine>,
        clock: Box<dyn Clock>,
        transport: Arc<SharedTransport>,
    ) -> Self {
        let config = config.sanitized();
        Self {
            registry: SequenceRegistry::new(store, transport),
            scheduler: StepScheduler::new(&config),
            config,
            engine,
            clock,
            engine_started: false,
        }
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn registry(&self) -> &SequenceRegistry {
        &self.registry
    }

    pub fn transport(&self) -> Arc<SharedTransport> {
        Arc::clone(self.registry.transport())
    }

    pub fn transport_state(&self) -> TransportState {
        playback::transport_state(&self.registry)
    }

    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    // ---------------------------------------------------------------------
    // Periodic callbacks
    // ---------------------------------------------------------------------

    /// Fixed-interval scheduler poll
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();
        self.scheduler
            .tick(now, &mut self.registry, self.engine.as_mut());
    }

    /// Auxiliary frame tick: playhead smoothing only
    pub fn frame(&mut self) {
        let now = self.clock.now_ms();
        self.scheduler.frame(now, &mut self.registry);
    }

    // ---------------------------------------------------------------------
    // Observation
    // ---------------------------------------------------------------------

    /// The sequence for `key`, created (and loaded) on first access
    pub fn sequence(&mut self, key: SequenceKey) -> &Sequence {
        self.registry.get(key)
    }

    pub fn version(&self, key: &SequenceKey) -> u64 {
        self.registry.version(key)
    }

    /// Snapshot of `key` at its current version, creating the sequence if needed
    pub fn snapshot(&mut self, key: SequenceKey) -> Option<Arc<SequenceSnapshot>> {
        self.registry.get(key);
        self.registry.snapshot(&key)
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&SequenceKey, u64) + 'static) -> Subscription {
        self.registry.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.registry.unsubscribe(subscription)
    }

    // ---------------------------------------------------------------------
    // Per-sequence commands
    // ---------------------------------------------------------------------

    /// Set the routing part; notes held on the old part are released first
    pub fn set_part(&mut self, key: SequenceKey, part: i32) {
        let kind = self.registry.get(key).kind();
        self.configure(key, part, kind);
    }

    /// Set the module kind; notes held under the old kind are released first
    pub fn set_module_kind(&mut self, key: SequenceKey, kind: ModuleKind) {
        let part = self.registry.get(key).part() as i32;
        self.configure(key, part, kind);
    }

    pub fn select(&mut self, key: SequenceKey, step: i32, note: i32) {
        self.registry.commit(key, |seq| seq.select(step, note));
    }

    pub fn add_note(&mut self, key: SequenceKey, pitch: i32, velocity: f32, legato: bool) {
        self.registry
            .commit(key, |seq| seq.add_note(pitch, velocity, legato));
    }

    pub fn remove_note(&mut self, key: SequenceKey) -> Option<Note> {
        self.registry.commit(key, Sequence::remove_note)
    }

    pub fn update_note(&mut self, key: SequenceKey, edit: NoteEdit) -> bool {
        self.registry.commit(key, |seq| seq.update_note(edit))
    }

    /// Add the default note at the selection if that step is empty
    pub fn ensure_note(&mut self, key: SequenceKey) -> bool {
        let pitch = self.config.default_note_pitch;
        let velocity = self.config.default_note_velocity;
        self.registry
            .commit(key, |seq| seq.ensure_note(pitch, velocity))
    }

    pub fn toggle_legato(&mut self, key: SequenceKey) -> bool {
        self.registry.commit(key, Sequence::toggle_legato)
    }

    pub fn set_resolution(&mut self, key: SequenceKey, resolution: Resolution) {
        self.registry
            .commit(key, |seq| seq.set_resolution(resolution));
    }

    pub fn set_resolution_norm(&mut self, key: SequenceKey, norm: f32) {
        self.registry
            .commit(key, |seq| seq.set_resolution_norm(norm));
    }

    pub fn set_length(&mut self, key: SequenceKey, length: i32) {
        self.registry.commit(key, |seq| seq.set_length(length));
    }

    pub fn set_mode(&mut self, key: SequenceKey, mode: PlayMode) {
        self.registry.commit(key, |seq| seq.set_mode(mode));
    }

    pub fn set_local_bpm(&mut self, key: SequenceKey, bpm: f64) {
        self.registry.commit(key, |seq| seq.set_local_bpm(bpm));
    }

    /// Start or stop the local transport of `key`
    pub fn toggle_local_playback(&mut self, key: SequenceKey) {
        if self.registry.get(key).is_playing_local() {
            playback::stop_local(&mut self.registry, key, self.engine.as_mut());
        } else {
            self.ensure_engine_started();
            let now = self.clock.now_ms();
            playback::start_local(&mut self.registry, key, self.engine.as_mut(), now);
        }
    }

    /// Start or stop the global transport
    pub fn toggle_global_playback(&mut self) {
        if self.registry.transport().is_playing() {
            playback::stop_global(&mut self.registry, self.engine.as_mut());
        } else {
            self.ensure_engine_started();
            let now = self.clock.now_ms();
            playback::start_global(&mut self.registry, self.engine.as_mut(), now);
        }
    }

    // ---------------------------------------------------------------------
    // Scope commands
    // ---------------------------------------------------------------------

    /// Switch the pattern being scheduled. Switching to another pattern
    /// stops everything first; re-selecting the current one does nothing.
    pub fn set_current_pattern(&mut self, pattern: PatternId) {
        if self.registry.current_pattern() == Some(pattern) {
            return;
        }
        self.stop_all();
        self.registry.set_current_pattern(pattern);
        log::debug!(target: "playback", "current pattern is now {}", pattern);
    }

    /// Set routing part and module kind without going through the UI
    pub fn configure(&mut self, key: SequenceKey, part: i32, kind: ModuleKind) {
        let engine = self.engine.as_mut();
        self.registry.get(key);
        if let Some(seq) = self.registry.get_mut(&key) {
            let reroutes = seq.part() as i32 != part || seq.kind() != kind;
            if reroutes {
                release_held(seq, engine);
            }
        }
        self.registry.commit(key, |seq| {
            seq.set_part(part);
            seq.set_kind(kind);
        });
    }

    /// Restrict scheduling to these instruments; `None` schedules all of them
    pub fn set_instrument_filter(&mut self, instruments: Option<Vec<InstrumentId>>) {
        self.registry.set_instrument_filter(instruments);
        playback::sync_scope(&mut self.registry, self.engine.as_mut());
    }

    pub fn delete_for_instrument(&mut self, instrument: InstrumentId) -> usize {
        self.registry
            .delete_for_instrument(instrument, self.engine.as_mut())
    }

    pub fn delete_for_pattern(&mut self, pattern: PatternId) -> usize {
        self.registry
            .delete_for_pattern(pattern, self.engine.as_mut())
    }

    /// Drop the in-memory copy of `key`; the next access reloads it from the store
    pub fn evict(&mut self, key: &SequenceKey) -> bool {
        self.registry.evict(key, self.engine.as_mut())
    }

    pub fn stop_all(&mut self) {
        playback::stop_all(&mut self.registry, self.engine.as_mut());
    }

    // ---------------------------------------------------------------------
    // Tempo broadcast and command queue
    // ---------------------------------------------------------------------

    /// Host tempo changed; clamped to the supported range
    pub fn on_tempo_broadcast(&mut self, bpm: f64) {
        self.registry.transport().set_bpm(bpm);
    }

    /// Apply one queued command
    pub fn execute(&mut self, command: Command) {
        match command {
            Command::Configure { key, part, kind } => self.configure(key, part, kind),
            Command::SetPart(key, part) => self.set_part(key, part),
            Command::SetModuleKind(key, kind) => self.set_module_kind(key, kind),
            Command::Select { key, step, note } => self.select(key, step, note),
            Command::AddNote {
                key,
                pitch,
                velocity,
                legato,
            } => self.add_note(key, pitch, velocity, legato),
            Command::RemoveNote(key) => {
                self.remove_note(key);
            }
            Command::UpdateNote(key, edit) => {
                self.update_note(key, edit);
            }
            Command::EnsureNote(key) => {
                self.ensure_note(key);
            }
            Command::ToggleLegato(key) => {
                self.toggle_legato(key);
            }
            Command::SetResolution(key, resolution) => self.set_resolution(key, resolution),
            Command::SetResolutionNorm(key, norm) => self.set_resolution_norm(key, norm),
            Command::SetLength(key, length) => self.set_length(key, length),
            Command::SetMode(key, mode) => self.set_mode(key, mode),
            Command::SetLocalBpm(key, bpm) => self.set_local_bpm(key, bpm),
            Command::ToggleLocalPlayback(key) => self.toggle_local_playback(key),
            Command::ToggleGlobalPlayback => self.toggle_global_playback(),
            Command::StopAll => self.stop_all(),
            Command::SetCurrentPattern(pattern) => self.set_current_pattern(pattern),
            Command::SetInstrumentFilter(ids) => self.set_instrument_filter(ids),
            Command::DeleteForInstrument(id) => {
                self.delete_for_instrument(id);
            }
            Command::DeleteForPattern(id) => {
                self.delete_for_pattern(id);
            }
            Command::SetGlobalBpm(bpm) => self.on_tempo_broadcast(bpm),
        }
    }

    /// Apply every command waiting in the queue, returns how many were applied
    pub fn drain_commands(&mut self, commands: &mut CommandConsumer) -> usize {
        let mut applied = 0;
        while let Some(command) = commands.try_pop() {
            self.execute(command);
            applied += 1;
        }
        applied
    }

    fn ensure_engine_started(&mut self) {
        if self.engine_started {
            return;
        }
        match self.engine.start() {
            Ok(()) => self.engine_started = true,
            Err(e) => {
                log::warn!(target: "engine", "failed to start sound engine, will retry: {}", e)
            }
        }
    }
}
