//! Coarse wall-clock accounting for the three phases of a worker's life.

use std::time::{Duration, Instant};

/// Accumulating stopwatch.  Start and stop may be paired any number of
/// times; stopping while idle is a no-op.
#[derive(Debug, Clone)]
pub struct Timer {
    accumulated: Duration,
    started_at: Option<Instant>,
}

impl Timer {
    /// A stopped timer at zero.
    pub fn new() -> Self {
        Self { accumulated: Duration::ZERO, started_at: None }
    }

    /// Begin a measurement interval.
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Close the current interval and add it to the total.
    pub fn stop(&mut self) {
        if let Some(started_at) = self.started_at.take() {
            self.accumulated += started_at.elapsed();
        }
    }

    /// Total accumulated time in seconds.
    pub fn seconds(&self) -> f64 {
        self.accumulated.as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-worker phase timings, all in seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepTimings {
    /// Setup: seeding, topology build, initial placement.
    pub init: f64,
    /// Displacement work inside the step loop.
    pub step: f64,
    /// Exchange work inside the step loop.
    pub comm: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn accumulates_across_intervals() {
        let mut timer = Timer::new();
        timer.start();
        thread::sleep(Duration::from_millis(5));
        timer.stop();
        let first = timer.seconds();
        assert!(first >= 0.005);

        timer.start();
        thread::sleep(Duration::from_millis(5));
        timer.stop();
        assert!(timer.seconds() >= first + 0.005);
    }

    #[test]
    fn stop_without_start_is_harmless() {
        let mut timer = Timer::new();
        timer.stop();
        assert_eq!(timer.seconds(), 0.0);
    }
}
