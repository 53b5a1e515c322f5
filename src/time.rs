//! Step timing for the host loop.
//!
//! The stages themselves never read a clock; the host decides each step's
//! `delta_time` and seed and hands them over in [`SimParams`]. [`StepClock`]
//! is that host-side bookkeeping.
//!
//! # Example
//!
//! ```ignore
//! let mut clock = StepClock::new().with_fixed_delta(Some(1.0 / 60.0));
//! loop {
//!     let params = clock.advance(base_params);
//!     backend.step(spawn, &params)?;
//! }
//! ```

use std::time::{Duration, Instant};

use crate::shader_utils::hash;
use crate::uniforms::SimParams;

/// Wall-clock or fixed-step time source.
#[derive(Debug)]
pub struct StepClock {
    start: Instant,
    last_step: Instant,
    delta_secs: f32,
    step_count: u64,
    /// Steps per second, refreshed every `rate_interval`.
    rate: f32,
    rate_step_count: u64,
    rate_update_time: Instant,
    rate_interval: Duration,
    /// Fixed delta time for deterministic runs.
    fixed_delta: Option<f32>,
    /// Upper bound on wall-clock deltas, so a stall does not launch every
    /// particle through the floor in one step.
    max_delta: f32,
}

impl StepClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_step: now,
            delta_secs: 0.0,
            step_count: 0,
            rate: 0.0,
            rate_step_count: 0,
            rate_update_time: now,
            rate_interval: Duration::from_millis(500),
            fixed_delta: None,
            max_delta: 0.1,
        }
    }

    /// Use a constant delta instead of measured time. `None` restores
    /// wall-clock timing.
    pub fn with_fixed_delta(mut self, delta: Option<f32>) -> Self {
        self.fixed_delta = delta;
        self
    }

    pub fn with_max_delta(mut self, max_delta: f32) -> Self {
        self.max_delta = max_delta.max(0.0);
        self
    }

    /// Start the next step. Returns `base` with this step's delta time and
    /// seed filled in.
    pub fn advance(&mut self, base: SimParams) -> SimParams {
        let now = Instant::now();

        let measured = now.duration_since(self.last_step).as_secs_f32();
        self.delta_secs = self
            .fixed_delta
            .unwrap_or_else(|| measured.min(self.max_delta));
        self.last_step = now;
        self.step_count += 1;

        let since = now.duration_since(self.rate_update_time);
        if since >= self.rate_interval {
            let steps = self.step_count - self.rate_step_count;
            self.rate = steps as f32 / since.as_secs_f32();
            self.rate_step_count = self.step_count;
            self.rate_update_time = now;
        }

        base.with_delta_time(self.delta_secs)
            .with_seed(self.step_seed(base.seed))
    }

    /// Seed for the current step: the configured seed mixed with the step
    /// number, so respawned slots draw fresh values every step.
    pub fn step_seed(&self, base_seed: u32) -> u32 {
        hash(base_seed ^ hash(self.step_count as u32))
    }

    /// Delta time of the last step.
    #[inline]
    pub fn delta(&self) -> f32 {
        self.delta_secs
    }

    /// Steps taken so far.
    #[inline]
    pub fn step(&self) -> u64 {
        self.step_count
    }

    /// Measured steps per second.
    #[inline]
    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Wall-clock time since the clock was created.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for StepClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_clock_new() {
        let clock = StepClock::new();
        assert_eq!(clock.step(), 0);
        assert_eq!(clock.delta(), 0.0);
    }

    #[test]
    fn test_wall_clock_delta() {
        let mut clock = StepClock::new();
        thread::sleep(Duration::from_millis(10));
        let params = clock.advance(SimParams::default());

        assert!(params.delta_time > 0.0);
        assert!(params.delta_time <= 0.1);
        assert_eq!(clock.step(), 1);
    }

    #[test]
    fn test_wall_clock_delta_is_capped() {
        let mut clock = StepClock::new().with_max_delta(0.005);
        thread::sleep(Duration::from_millis(20));
        let params = clock.advance(SimParams::default());
        assert_eq!(params.delta_time, 0.005);
    }

    #[test]
    fn test_fixed_delta() {
        let mut clock = StepClock::new().with_fixed_delta(Some(1.0 / 60.0));
        thread::sleep(Duration::from_millis(50));
        let params = clock.advance(SimParams::default());

        // Should use fixed delta regardless of actual time
        assert!((params.delta_time - 1.0 / 60.0).abs() < 0.0001);
    }

    #[test]
    fn test_seed_changes_every_step() {
        let mut clock = StepClock::new().with_fixed_delta(Some(0.01));
        let base = SimParams::default().with_seed(3);
        let a = clock.advance(base);
        let b = clock.advance(base);
        assert_ne!(a.seed, b.seed);

        // Same step number, same seed
        let mut again = StepClock::new().with_fixed_delta(Some(0.01));
        assert_eq!(again.advance(base).seed, a.seed);
    }
}
