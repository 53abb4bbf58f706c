// Countdown timer for a protocol
// Maps elapsed seconds to the active step and to due audio cues

use crate::protocol::model::{AudioGuide, Protocol};

/// Index of the step active at `elapsed` seconds.
///
/// The first step whose cumulative end lies past `elapsed`. When no step
/// qualifies (at or past the total, or no steps at all) the index is 0.
pub fn step_index_for(durations: impl IntoIterator<Item = u32>, elapsed: u32) -> usize {
    let mut end = 0u32;
    for (i, duration) in durations.into_iter().enumerate() {
        end = end.saturating_add(duration);
        if elapsed < end {
            return i;
        }
    }
    0
}

/// What happened on one evaluation of the timer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerEvent {
    pub elapsed: u32,
    /// New step index, when the step changed
    pub step_changed: Option<usize>,
    /// Cue due at this second
    pub cue: Option<AudioGuide>,
    pub completed: bool,
}

pub struct ProtocolTimer {
    protocol: Protocol,
    time_left: u32,
    active: bool,
    current_step: usize,
    muted: bool,
}

impl ProtocolTimer {
    pub fn new(protocol: Protocol, muted: bool) -> Self {
        let time_left = protocol.duration;
        Self {
            protocol,
            time_left,
            active: false,
            current_step: 0,
            muted,
        }
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    pub fn elapsed(&self) -> u32 {
        self.protocol.duration.saturating_sub(self.time_left)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Percent of the protocol done, 0..=100
    pub fn progress(&self) -> f32 {
        if self.protocol.duration == 0 {
            return 100.0;
        }
        self.elapsed() as f32 / self.protocol.duration as f32 * 100.0
    }

    /// Start (or resume) counting down. The cue for the current second is
    /// evaluated right away, so a cue at 0 plays on start.
    pub fn start(&mut self) -> TimerEvent {
        if self.time_left == 0 {
            return TimerEvent {
                elapsed: self.elapsed(),
                ..TimerEvent::default()
            };
        }
        self.active = true;
        self.evaluate()
    }

    pub fn pause(&mut self) {
        self.active = false;
    }

    pub fn toggle(&mut self) -> Option<TimerEvent> {
        if self.active {
            self.pause();
            None
        } else {
            Some(self.start())
        }
    }

    pub fn reset(&mut self) {
        self.active = false;
        self.time_left = self.protocol.duration;
        self.current_step = 0;
    }

    /// Muting only stops new cues; sounds already playing are untouched
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Advance one second. Does nothing while paused or finished.
    pub fn tick(&mut self) -> TimerEvent {
        if !self.active || self.time_left == 0 {
            return TimerEvent {
                elapsed: self.elapsed(),
                ..TimerEvent::default()
            };
        }

        self.time_left -= 1;
        let mut event = self.evaluate();
        if self.time_left == 0 {
            self.active = false;
            event.completed = true;
        }
        event
    }

    fn evaluate(&mut self) -> TimerEvent {
        let elapsed = self.elapsed();
        let step = step_index_for(self.protocol.step_durations(), elapsed);

        let step_changed = if step != self.current_step {
            self.current_step = step;
            Some(step)
        } else {
            None
        };

        let cue = if !self.muted && self.active {
            self.protocol.cue_at(elapsed).cloned()
        } else {
            None
        };

        TimerEvent {
            elapsed,
            step_changed,
            cue,
            completed: false,
        }
    }
}
