//! User-visible real-time priorities
//!
//! Clients speak in the POSIX range `1..=99`; the RT class works on the
//! wider internal range (`0..=257` by default) shared with the levels
//! reserved for emulated personalities. A user priority maps onto the
//! internal level of the same value.

use crate::config::NucleusConfig;
use crate::scheduler::core::error::{NucleusError, NucleusResult};

/// Highest user-visible priority
pub const RT_PRIORITY_MAX: u8 = 99;

/// Lowest user-visible priority
pub const RT_PRIORITY_MIN: u8 = 1;

/// Real-time priority as seen by clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RealtimePriority(u8);

impl RealtimePriority {
    pub fn new(priority: u8) -> NucleusResult<Self> {
        if (RT_PRIORITY_MIN..=RT_PRIORITY_MAX).contains(&priority) {
            Ok(Self(priority))
        } else {
            Err(NucleusError::InvalidPriority {
                value: i32::from(priority),
                min: i32::from(RT_PRIORITY_MIN),
                max: i32::from(RT_PRIORITY_MAX),
            })
        }
    }

    pub const fn max() -> Self {
        Self(RT_PRIORITY_MAX)
    }

    pub const fn min() -> Self {
        Self(RT_PRIORITY_MIN)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Internal level, checked against the configured RT range
    pub fn to_internal(self, config: &NucleusConfig) -> NucleusResult<i32> {
        let prio = i32::from(self.0);
        if prio < config.rt_prio_min || prio > config.rt_prio_max {
            return Err(NucleusError::InvalidPriority {
                value: prio,
                min: config.rt_prio_min,
                max: config.rt_prio_max,
            });
        }
        Ok(prio)
    }

    /// User priority of an internal level; levels above 99 are
    /// reported as 99, the RT class floor as 1.
    pub fn from_internal(prio: i32) -> Self {
        let clamped = prio.clamp(i32::from(RT_PRIORITY_MIN), i32::from(RT_PRIORITY_MAX));
        Self(clamped as u8)
    }
}

impl From<RealtimePriority> for i32 {
    fn from(prio: RealtimePriority) -> i32 {
        i32::from(prio.0)
    }
}

impl Default for RealtimePriority {
    fn default() -> Self {
        Self::min()
    }
}
