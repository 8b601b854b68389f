//! Nucleus configuration
//!
//! Static parameters fixed at `Nucleus::new`; there is no runtime
//! reconfiguration.

use crate::scheduler::core::error::{NucleusError, NucleusResult};
use crate::scheduler::queue::MLQ_LEVELS;

/// Maximum number of CPUs (one bit each in a `CpuMask`)
pub const MAX_CPUS: usize = 64;

/// How the clock source drives `tick_handler`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// The platform calls `tick_handler` every `tick_period` ticks
    Periodic,
    /// The nucleus programs each shot through `ClockSource::program_next_tick`
    OneShot,
}

/// Nucleus parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NucleusConfig {
    /// Online CPUs, numbered `0..nr_cpus`
    pub nr_cpus: usize,
    /// Lowest internal RT priority
    pub rt_prio_min: i32,
    /// Highest internal RT priority
    pub rt_prio_max: i32,
    /// Quantum given by `activate_rr` callers that pass none
    pub default_quantum: u64,
    pub timer_mode: TimerMode,
    /// Clock ticks per scheduler tick (round-robin accounting unit)
    pub tick_period: u64,
    /// Longest priority inheritance chain walked before reporting
    pub pi_chain_depth: usize,
    /// Reject thread names already present in the registry
    pub unique_names: bool,
}

impl Default for NucleusConfig {
    fn default() -> Self {
        Self {
            nr_cpus: 1,
            rt_prio_min: 0,
            rt_prio_max: 257,
            default_quantum: 10,
            timer_mode: TimerMode::Periodic,
            tick_period: 1,
            pi_chain_depth: 8,
            unique_names: false,
        }
    }
}

impl NucleusConfig {
    /// Default configuration with `nr_cpus` CPUs
    pub fn smp(nr_cpus: usize) -> Self {
        Self {
            nr_cpus,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> NucleusResult<()> {
        if self.nr_cpus == 0 || self.nr_cpus > MAX_CPUS {
            return Err(NucleusError::InvalidState { reason: "CPU count out of range" });
        }
        if self.rt_prio_min > self.rt_prio_max || self.rt_prio_min < 0 {
            return Err(NucleusError::InvalidState { reason: "empty RT priority range" });
        }
        if (self.rt_prio_max - self.rt_prio_min + 1) as usize > MLQ_LEVELS {
            return Err(NucleusError::InvalidState {
                reason: "RT priority range wider than the ready queue",
            });
        }
        if self.pi_chain_depth == 0 {
            return Err(NucleusError::InvalidState { reason: "zero inheritance chain depth" });
        }
        if self.tick_period == 0 {
            return Err(NucleusError::InvalidState { reason: "zero tick period" });
        }
        Ok(())
    }
}
