// Driver - Runs the two periodic callbacks of a StepSequencer
// Fixed-interval scheduler poll plus the lower-rate frame tick

use crate::config::SequencerConfig;
use crate::messaging::channels::CommandConsumer;
use crate::sequencer::StepSequencer;
use std::thread;
use std::time::Duration;

/// What a single `Driver::poll` did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverTick {
    pub polled: bool,
    pub framed: bool,
    /// Time until the next callback is due
    pub wait_ms: f64,
}

#[derive(Debug, Clone)]
pub struct Driver {
    poll_interval_ms: f64,
    frame_interval_ms: f64,
    next_poll: Option<f64>,
    next_frame: Option<f64>,
}

impl Driver {
    pub fn new(config: &SequencerConfig) -> Self {
        Self {
            poll_interval_ms: config.poll_interval_ms.max(1) as f64,
            frame_interval_ms: config.frame_interval_ms.max(1) as f64,
            next_poll: None,
            next_frame: None,
        }
    }

    /// Run whichever callbacks are due on the sequencer's clock
    pub fn poll(&mut self, sequencer: &mut StepSequencer) -> DriverTick {
        let now = sequencer.now_ms();

        let polled = due(&mut self.next_poll, now, self.poll_interval_ms);
        if polled {
            sequencer.tick();
        }
        let framed = due(&mut self.next_frame, now, self.frame_interval_ms);
        if framed {
            sequencer.frame();
        }

        let next = self
            .next_poll
            .unwrap_or(now)
            .min(self.next_frame.unwrap_or(now));
        DriverTick {
            polled,
            framed,
            wait_ms: (next - now).max(0.0),
        }
    }

    /// Blocking loop: apply queued commands, run due callbacks, sleep until
    /// the next one. Returns once `stop` reports true.
    pub fn run_until(
        &mut self,
        sequencer: &mut StepSequencer,
        commands: &mut CommandConsumer,
        stop: impl Fn() -> bool,
    ) {
        log::debug!(target: "scheduler", "driver loop started");
        while !stop() {
            sequencer.drain_commands(commands);
            let tick = self.poll(sequencer);
            if tick.wait_ms > 0.0 {
                thread::sleep(Duration::from_secs_f64(tick.wait_ms / 1000.0));
            }
        }
        sequencer.stop_all();
        log::debug!(target: "scheduler", "driver loop stopped");
    }
}

/// Advance a fixed-interval deadline. A late callback resynchronizes to
/// `now` instead of firing back-to-back.
fn due(next: &mut Option<f64>, now: f64, interval: f64) -> bool {
    match *next {
        Some(at) if now < at => false,
        Some(at) => {
            let following = at + interval;
            *next = Some(if following <= now { now + interval } else { following });
            true
        }
        None => {
            *next = Some(now + interval);
            true
        }
    }
}
