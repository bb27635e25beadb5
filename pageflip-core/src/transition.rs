//! Page-turn state machine.
//!
//! The controller never owns a timer. It exposes the instant of its next
//! deadline and advances when [`TransitionController::tick`] is called with a
//! time at or past it, so dropping the controller is all it takes to abandon
//! a transition.

use std::time::{Duration, Instant};

use crate::render::{Surface, SurfaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn between(from_page: usize, to_page: usize) -> Self {
        if to_page > from_page {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRecord {
    pub from_page: usize,
    pub to_page: usize,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Animating,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionTimings {
    /// Delay before the flip starts moving, so the unflipped frame shows first.
    pub settle: Duration,
    /// Time from entering `Start` until the transition completes.
    pub total: Duration,
}

impl Default for TransitionTimings {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(30),
            total: Duration::from_millis(700),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionSignal {
    Animating,
    Done(TransitionRecord),
}

#[derive(Debug)]
pub struct TransitionController {
    record: TransitionRecord,
    timings: TransitionTimings,
    started_at: Instant,
    phase: Phase,
    outgoing: Surface,
    incoming: Surface,
}

impl TransitionController {
    pub fn new(record: TransitionRecord, timings: TransitionTimings, now: Instant) -> Self {
        Self {
            record,
            timings,
            started_at: now,
            phase: Phase::Start,
            outgoing: Surface::new(SurfaceId::Outgoing),
            incoming: Surface::new(SurfaceId::Incoming),
        }
    }

    pub fn record(&self) -> TransitionRecord {
        self.record
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn direction(&self) -> Direction {
        self.record.direction
    }

    pub fn outgoing(&self) -> &Surface {
        &self.outgoing
    }

    pub fn incoming(&self) -> &Surface {
        &self.incoming
    }

    pub(crate) fn incoming_mut(&mut self) -> &mut Surface {
        &mut self.incoming
    }

    pub(crate) fn surface_mut(&mut self, id: SurfaceId) -> Option<&mut Surface> {
        match id {
            SurfaceId::Outgoing => Some(&mut self.outgoing),
            SurfaceId::Incoming => Some(&mut self.incoming),
            _ => None,
        }
    }

    fn settle_at(&self) -> Instant {
        self.started_at + self.timings.settle
    }

    fn done_at(&self) -> Instant {
        self.started_at + self.timings.total
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Start => Some(self.settle_at()),
            Phase::Animating => Some(self.done_at()),
            Phase::Done => None,
        }
    }

    /// Advances the state machine to `now`. `Done` is reported exactly once.
    pub fn tick(&mut self, now: Instant) -> Option<TransitionSignal> {
        let mut signal = None;
        if self.phase == Phase::Start && now >= self.settle_at() {
            self.phase = Phase::Animating;
            signal = Some(TransitionSignal::Animating);
        }
        if self.phase == Phase::Animating && now >= self.done_at() {
            self.phase = Phase::Done;
            signal = Some(TransitionSignal::Done(self.record));
        }
        signal
    }

    /// Eased flip progress in `[0, 1]`; zero until the settle delay passes.
    pub fn flip_progress(&self, now: Instant) -> f32 {
        match self.phase {
            Phase::Start => 0.0,
            Phase::Done => 1.0,
            Phase::Animating => {
                let span = self.timings.total.saturating_sub(self.timings.settle);
                if span.is_zero() {
                    return 1.0;
                }
                let elapsed = now.saturating_duration_since(self.settle_at());
                let linear = (elapsed.as_secs_f32() / span.as_secs_f32()).clamp(0.0, 1.0);
                ease_in_out(linear)
            }
        }
    }
}

fn ease_in_out(t: f32) -> f32 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}
