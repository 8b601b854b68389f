//! Latency tracking for real-time tasks
//!
//! Records how late timers fire relative to their due date, in clock
//! ticks. Updated from the tick handler outside the nucleus lock.

use core::sync::atomic::{AtomicU64, Ordering};

/// Latency tracker
pub struct LatencyTracker {
    /// Smallest observed lateness (ticks), `u64::MAX` before any sample
    min_ticks: AtomicU64,
    /// Largest observed lateness (ticks)
    max_ticks: AtomicU64,
    total_ticks: AtomicU64,
    samples: AtomicU64,
}

/// Point-in-time copy of the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LatencySnapshot {
    pub min: u64,
    pub max: u64,
    pub average: u64,
    pub samples: u64,
}

impl LatencyTracker {
    pub const fn new() -> Self {
        Self {
            min_ticks: AtomicU64::new(u64::MAX),
            max_ticks: AtomicU64::new(0),
            total_ticks: AtomicU64::new(0),
            samples: AtomicU64::new(0),
        }
    }

    /// Record a timer that was due at `due` and fired at `now`
    pub fn record(&self, due: u64, now: u64) {
        let late = now.saturating_sub(due);
        self.total_ticks.fetch_add(late, Ordering::Relaxed);
        self.samples.fetch_add(1, Ordering::Relaxed);
        self.min_ticks.fetch_min(late, Ordering::Relaxed);
        self.max_ticks.fetch_max(late, Ordering::Relaxed);
    }

    pub fn max_latency(&self) -> u64 {
        self.max_ticks.load(Ordering::Relaxed)
    }

    pub fn average_latency(&self) -> u64 {
        let total = self.total_ticks.load(Ordering::Relaxed);
        match self.samples.load(Ordering::Relaxed) {
            0 => 0,
            count => total / count,
        }
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        let samples = self.samples.load(Ordering::Relaxed);
        if samples == 0 {
            return LatencySnapshot::default();
        }
        LatencySnapshot {
            min: self.min_ticks.load(Ordering::Relaxed),
            max: self.max_latency(),
            average: self.average_latency(),
            samples,
        }
    }

    /// Reset statistics
    pub fn reset(&self) {
        self.min_ticks.store(u64::MAX, Ordering::Relaxed);
        self.max_ticks.store(0, Ordering::Relaxed);
        self.total_ticks.store(0, Ordering::Relaxed);
        self.samples.store(0, Ordering::Relaxed);
    }
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lateness() {
        let tracker = LatencyTracker::new();
        assert_eq!(tracker.snapshot(), LatencySnapshot::default());
        tracker.record(100, 100);
        tracker.record(100, 104);
        tracker.record(50, 52);
        let snap = tracker.snapshot();
        assert_eq!(snap.min, 0);
        assert_eq!(snap.max, 4);
        assert_eq!(snap.average, 2);
        assert_eq!(snap.samples, 3);
        tracker.reset();
        assert_eq!(tracker.max_latency(), 0);
    }
}
