//! Scheduling Classes
//!
//! The class set is closed: a fixed-priority RT class and the idle class
//! holding each CPU's root thread. Classes are scanned by descending
//! weight on every pick, so the idle class only wins when the RT ready
//! queue is empty.

use crate::config::NucleusConfig;
use crate::scheduler::core::error::{NucleusError, NucleusResult};

/// Priority of the root thread, below every RT level
pub const IDLE_PRIO: i32 = -1;

/// Scheduling class tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedClass {
    /// Fixed priority, FIFO within a level, optional round-robin
    Rt,
    /// Per-CPU root thread only
    Idle,
}

impl SchedClass {
    /// Classes in pick order, heaviest first
    pub const BY_WEIGHT: [SchedClass; 2] = [SchedClass::Rt, SchedClass::Idle];

    /// Declared priority range
    pub fn range(self, config: &NucleusConfig) -> (i32, i32) {
        match self {
            Self::Rt => (config.rt_prio_min, config.rt_prio_max),
            Self::Idle => (IDLE_PRIO, IDLE_PRIO),
        }
    }

    /// Reject priorities outside the class range
    pub fn check_priority(self, config: &NucleusConfig, prio: i32) -> NucleusResult<()> {
        let (min, max) = self.range(config);
        if prio < min || prio > max {
            return Err(NucleusError::InvalidPriority { value: prio, min, max });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_class_picked_last() {
        assert_eq!(SchedClass::BY_WEIGHT.first(), Some(&SchedClass::Rt));
        assert_eq!(SchedClass::BY_WEIGHT.last(), Some(&SchedClass::Idle));
    }

    #[test]
    fn test_rt_range() {
        let cfg = NucleusConfig::default();
        assert!(SchedClass::Rt.check_priority(&cfg, 0).is_ok());
        assert!(SchedClass::Rt.check_priority(&cfg, 257).is_ok());
        assert_eq!(
            SchedClass::Rt.check_priority(&cfg, 258),
            Err(NucleusError::InvalidPriority { value: 258, min: 0, max: 257 })
        );
        assert!(SchedClass::Idle.check_priority(&cfg, 0).is_err());
    }
}
