// Step scheduler - Detects step edges on every poll and drives the dispatcher
// Runs on the fixed-interval poll; `frame` is the lower-precision smoothing pass

use crate::config::SequencerConfig;
use crate::engine::SoundEngine;
use crate::registry::SequenceRegistry;
use crate::sequencer::dispatcher::dispatch_transition;
use crate::sequencer::sequence::Sequence;
use crate::sequencer::timeline::Tempo;
use crate::sequencer::transport::SharedTransport;

/// Result of advancing one sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Advance {
    /// Step transitions dispatched, including the initial trigger
    pub fired: u32,
    /// Step edges dropped by the catch-up bound
    pub skipped: u64,
    /// Consumers should be notified
    pub notify: bool,
}

/// Fixed-interval step-edge detector
#[derive(Debug, Clone)]
pub struct StepScheduler {
    tolerance_ms: f64,
    max_catch_up: u32,
    notify_interval_ms: f64,
    flash_ms: f64,
}

impl StepScheduler {
    pub fn new(config: &SequencerConfig) -> Self {
        Self {
            tolerance_ms: config.jitter_tolerance_ms,
            max_catch_up: config.max_catch_up_steps,
            notify_interval_ms: config.playhead_notify_interval_ms(),
            flash_ms: config.flash_duration_ms,
        }
    }

    /// Poll every in-scope sequence; fires due step edges in order
    pub fn tick(
        &mut self,
        now_ms: f64,
        registry: &mut SequenceRegistry,
        engine: &mut dyn SoundEngine,
    ) {
        let transport = registry.transport().clone();
        for key in registry.scoped_keys() {
            let Some(seq) = registry.get_mut(&key) else {
                continue;
            };
            let mut notify = false;
            if is_ticking(seq, &transport) {
                notify |= self.advance(seq, now_ms, transport.tempo(), engine).notify;
            }
            notify |= expire_flash(seq, now_ms);
            if notify {
                registry.touch(&key);
            }
        }
    }

    /// Auxiliary pass: refresh the fractional playhead and expire flashes
    /// without firing any step
    pub fn frame(&mut self, now_ms: f64, registry: &mut SequenceRegistry) {
        let transport = registry.transport().clone();
        for key in registry.scoped_keys() {
            let Some(seq) = registry.get_mut(&key) else {
                continue;
            };
            let mut notify = false;
            if is_ticking(seq, &transport) && seq.schedule.next_step_due.is_some() {
                let step_ms = seq.step_duration_ms(transport.tempo());
                notify |= self.refresh_playhead(seq, now_ms, step_ms, false);
            }
            notify |= expire_flash(seq, now_ms);
            if notify {
                registry.touch(&key);
            }
        }
    }

    /// Advance one playing sequence to `now_ms`
    pub fn advance(
        &self,
        seq: &mut Sequence,
        now_ms: f64,
        global: Tempo,
        engine: &mut dyn SoundEngine,
    ) -> Advance {
        let step_ms = seq.step_duration_ms(global);
        let length = seq.length.max(1);
        let flash_until = now_ms + self.flash_ms;
        let mut result = Advance::default();

        let mut next_due = match seq.schedule.next_step_due {
            Some(due) => due,
            None => {
                // A sequence that joined a running transport starts its grid here
                let origin = *seq.schedule.origin.get_or_insert(now_ms);
                // First sound right away, not one step later
                dispatch_transition(seq, None, 0, engine, flash_until);
                seq.schedule.last_fired = Some(0);
                result.fired += 1;
                origin + step_ms
            }
        };

        while now_ms >= next_due - self.tolerance_ms && result.fired < self.max_catch_up {
            let from = seq.schedule.last_fired.unwrap_or(0);
            let to = (from + 1) % length;
            dispatch_transition(seq, Some(from), to, engine, flash_until);
            seq.schedule.last_fired = Some(to);
            next_due += step_ms;
            result.fired += 1;
        }

        if now_ms >= next_due - self.tolerance_ms {
            // Still behind after the bound: jump over the missed edges
            let behind = now_ms + self.tolerance_ms - next_due;
            let missed = (behind / step_ms).floor() as u64 + 1;
            next_due += missed as f64 * step_ms;
            let from = seq.schedule.last_fired.unwrap_or(0) as u64;
            seq.schedule.last_fired = Some(((from + missed) % length as u64) as usize);
            result.skipped = missed;
            log::debug!(
                target: "scheduler",
                "{} fell behind, skipped {} step(s)",
                seq.key,
                missed
            );
        }

        seq.schedule.next_step_due = Some(next_due);
        let edge = result.fired > 0 || result.skipped > 0;
        if edge {
            seq.playhead.step = seq.schedule.last_fired.unwrap_or(0);
        }
        result.notify = self.refresh_playhead(seq, now_ms, step_ms, edge);
        result
    }

    /// Recompute the fractional loop position from the grid origin. Returns
    /// true when consumers should hear about it: always on a step edge,
    /// otherwise throttled.
    fn refresh_playhead(&self, seq: &mut Sequence, now_ms: f64, step_ms: f64, edge: bool) -> bool {
        let loop_ms = step_ms * seq.length.max(1) as f64;
        if let Some(origin) = seq.schedule.origin.filter(|_| loop_ms > 0.0) {
            let elapsed = (now_ms - origin).max(0.0);
            seq.playhead.frac = (elapsed.rem_euclid(loop_ms) / loop_ms) as f32;
        }

        let throttle_open = seq
            .schedule
            .last_frac_notify
            .is_none_or(|last| now_ms - last >= self.notify_interval_ms);
        if edge || throttle_open {
            seq.schedule.last_frac_notify = Some(now_ms);
            true
        } else {
            false
        }
    }
}

/// Whether `seq` follows a running clock, its own or the global one
fn is_ticking(seq: &Sequence, transport: &SharedTransport) -> bool {
    seq.playing_local || (seq.playing_global && transport.is_playing())
}

fn expire_flash(seq: &mut Sequence, now_ms: f64) -> bool {
    match seq.schedule.flash_until {
        Some(until) if now_ms >= until => {
            seq.schedule.flash_until = None;
            seq.playhead.last_triggered = false;
            true
        }
        _ => false,
    }
}
