// Transport - Global playback clock and playback mode state
// One shared timing origin/tempo for every sequence in the active pattern

use super::sequence::SequenceKey;
use super::timeline::{DEFAULT_BPM, Tempo, clamp_bpm};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Which playback mode currently owns the sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    /// Exactly one sequence is running on its own clock
    PlayingLocal(SequenceKey),
    /// Every in-scope sequence follows the global clock
    PlayingGlobal,
}

/// Shared global transport
/// Readable from any thread via atomics; only the playback coordinator writes
/// the playing flag and origin, tempo broadcasts write the bpm
#[derive(Debug)]
pub struct SharedTransport {
    playing: AtomicBool,
    bpm_bits: AtomicU64,
    start_ms_bits: AtomicU64,
}

impl SharedTransport {
    /// Create new shared transport at the default tempo
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Check if global playback is running
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    /// Current global tempo
    pub fn tempo(&self) -> Tempo {
        Tempo::new(self.bpm())
    }

    /// Current global bpm
    pub fn bpm(&self) -> f64 {
        f64::from_bits(self.bpm_bits.load(Ordering::Relaxed))
    }

    /// Set global bpm, clamped to the supported range
    pub fn set_bpm(&self, bpm: f64) {
        self.bpm_bits
            .store(clamp_bpm(bpm).to_bits(), Ordering::Relaxed);
    }

    /// Timestamp (ms) at which global playback started
    pub fn start_ms(&self) -> f64 {
        f64::from_bits(self.start_ms_bits.load(Ordering::Relaxed))
    }

    /// Mark the global transport as playing from `now_ms`
    pub(crate) fn start(&self, now_ms: f64) {
        self.start_ms_bits.store(now_ms.to_bits(), Ordering::Relaxed);
        self.playing.store(true, Ordering::Relaxed);
    }

    /// Clear the playing flag
    pub(crate) fn stop(&self) {
        self.playing.store(false, Ordering::Relaxed);
    }
}

impl Default for SharedTransport {
    fn default() -> Self {
        Self {
            playing: AtomicBool::new(false),
            bpm_bits: AtomicU64::new(DEFAULT_BPM.to_bits()),
            start_ms_bits: AtomicU64::new(0f64.to_bits()),
        }
    }
}
