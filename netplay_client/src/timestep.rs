//! Fixed timestep accumulator.
//!
//! Frames arrive at whatever rate the host loop runs; simulation ticks run at
//! a constant 60 Hz. Time is kept as an integer [`Duration`] so the leftover
//! after each frame is exact.

use std::time::Duration;

/// Length of one fixed tick (1/60 s, rounded to the nanosecond).
pub const FIXED_TIME_STEP: Duration = Duration::from_nanos(16_666_667);

#[derive(Debug, Clone, Default)]
pub struct FixedStepAccumulator {
    elapsed: Duration,
    current_tick: u32,
}

impl FixedStepAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a frame's worth of time.
    pub fn accumulate(&mut self, delta: Duration) {
        self.elapsed += delta;
    }

    /// Consumes one step if enough time has built up, returning its tick.
    pub fn next_tick(&mut self) -> Option<u32> {
        if self.elapsed < FIXED_TIME_STEP {
            return None;
        }
        self.elapsed -= FIXED_TIME_STEP;
        self.current_tick = self.current_tick.wrapping_add(1);
        Some(self.current_tick)
    }

    /// Time carried over to the next frame.
    pub fn remainder(&self) -> Duration {
        self.elapsed
    }

    /// Number of the last tick handed out.
    pub fn current_tick(&self) -> u32 {
        self.current_tick
    }
}
