//! Sender-side bandwidth pacing.
//!
//! Pacing is applied to each chunk on its own: a chunk that goes out faster than
//! the limit is padded with a sleep, a slow one is not compensated by later chunks.

use std::{
    thread,
    time::{Duration, Instant},
};

pub struct Pacer {
    bandwidth: u64,
}

impl Pacer {
    /// Pacer for `bandwidth` bytes per second. Zero disables pacing.
    pub fn new(bandwidth: u64) -> Self {
        Self { bandwidth }
    }

    /// Minimum time `len` bytes may take at the configured bandwidth.
    pub fn budget(&self, len: usize) -> Duration {
        if self.bandwidth == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(len as f64 / self.bandwidth as f64)
    }

    /// Sleeps for what is left of the budget of a `len`-byte chunk sent since `started`.
    /// Returns the time slept.
    pub fn pace(&self, started: Instant, len: usize) -> Duration {
        let budget = self.budget(len);
        let elapsed = started.elapsed();
        if elapsed >= budget {
            return Duration::ZERO;
        }
        let remaining = budget - elapsed;
        thread::sleep(remaining);
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget() {
        assert_eq!(Pacer::new(1000).budget(500), Duration::from_millis(500));
        assert_eq!(Pacer::new(1000).budget(0), Duration::ZERO);
        assert_eq!(Pacer::new(0).budget(1 << 20), Duration::ZERO);
    }

    #[test]
    fn sleeps_remaining_budget() {
        let pacer = Pacer::new(10_000);
        let started = Instant::now();
        let slept = pacer.pace(started, 200);
        assert!(slept > Duration::ZERO);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn slow_chunk_is_not_compensated() {
        let pacer = Pacer::new(1_000_000);
        let started = Instant::now();
        thread::sleep(Duration::from_millis(10));
        assert_eq!(pacer.pace(started, 1000), Duration::ZERO);
    }
}
