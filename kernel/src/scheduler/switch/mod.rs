//! Context switch bookkeeping
//!
//! The register save/restore itself belongs to the platform
//! (`Hal::switch_context`). This module does the accounting on either
//! side of it: electing the next thread before the lock is dropped, and
//! reclaiming a deleted predecessor once the switch has happened.

use crate::scheduler::core::state::NucleusState;
use crate::scheduler::thread::{ThreadId, ThreadState};

/// A switch decided under the lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchPlan {
    pub cpu: usize,
    pub prev: ThreadId,
    pub next: ThreadId,
}

impl NucleusState {
    /// Consume a pending reschedule on `cpu` and elect the next thread
    pub(crate) fn prepare_switch(&mut self, cpu: usize) -> Option<SwitchPlan> {
        let sched = self.scheds.get_mut(cpu)?;
        if !sched.resched {
            return None;
        }
        sched.resched = false;
        sched.ipi_sent = false;
        let prev = sched.curr;

        let next = self.pick_next(cpu);
        crate::sched_assert!(
            self.threads
                .get(next)
                .map_or(false, |th| th.is_root() || th.state.is_runnable()),
            "elected a thread that cannot run"
        );
        if next == prev {
            return None;
        }

        let preempted = self
            .threads
            .get(prev)
            .map(|th| th.state.is_runnable())
            .unwrap_or(false);
        let sched = &mut self.scheds[cpu];
        sched.last = Some(prev);
        sched.curr = next;
        sched.stats.switches += 1;
        if preempted && sched.root != prev {
            sched.stats.preemptions += 1;
        }
        if let Some(th) = self.threads.get_mut(next) {
            th.stats.csw += 1;
        }
        Some(SwitchPlan { cpu, prev, next })
    }

    /// Runs after the switch: reclaim the previous thread if it was
    /// deleted while current.
    pub(crate) fn finish_switch(&mut self, cpu: usize) {
        let Some(sched) = self.scheds.get_mut(cpu) else { return };
        let Some(last) = sched.last.take() else { return };
        if last == sched.curr {
            return;
        }
        let zombie = self
            .threads
            .checked(last)
            .map(|th| th.state.contains(ThreadState::ZOMBIE))
            .unwrap_or(false);
        if zombie {
            self.reclaim(last);
        }
    }
}
