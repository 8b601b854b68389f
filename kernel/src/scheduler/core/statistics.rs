//! Statistics - Nucleus activity tracking
//!
//! Global counters are atomics readable without the nucleus lock;
//! per-CPU counters live in `Sched` and are updated under it.

use core::sync::atomic::{AtomicU64, Ordering};

/// Global nucleus statistics
pub struct NucleusStats {
    /// Total context switches
    pub total_switches: AtomicU64,

    /// Total threads created
    pub total_threads: AtomicU64,

    /// Total threads reclaimed
    pub total_destroyed: AtomicU64,

    /// Domain switches (relax + harden)
    pub mode_switches: AtomicU64,

    /// Faults seen by the trap handler
    pub faults: AtomicU64,
}

impl NucleusStats {
    pub const fn new() -> Self {
        Self {
            total_switches: AtomicU64::new(0),
            total_threads: AtomicU64::new(0),
            total_destroyed: AtomicU64::new(0),
            mode_switches: AtomicU64::new(0),
            faults: AtomicU64::new(0),
        }
    }

    /// Record context switch
    pub fn record_switch(&self) {
        self.total_switches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_create(&self) {
        self.total_threads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_destroy(&self, count: usize) {
        self.total_destroyed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_mode_switch(&self) {
        self.mode_switches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    /// Threads created and not reclaimed yet
    pub fn live_threads(&self) -> u64 {
        self.total_threads
            .load(Ordering::Relaxed)
            .saturating_sub(self.total_destroyed.load(Ordering::Relaxed))
    }

    pub fn switches(&self) -> u64 {
        self.total_switches.load(Ordering::Relaxed)
    }
}

impl Default for NucleusStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-CPU counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedStats {
    /// Switches performed by this CPU
    pub switches: u64,
    /// Switches away from a still-runnable thread
    pub preemptions: u64,
    /// Timer interrupts handled
    pub ticks: u64,
    /// Timers fired
    pub timer_fires: u64,
}
