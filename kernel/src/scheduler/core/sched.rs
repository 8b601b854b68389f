//! Per-CPU scheduler slot
//!
//! Owns the RT ready queue of one CPU, its current thread, the pending
//! reschedule flag and the CPU's timer queue. The root thread is never
//! queued; it is what the idle class picks when the ready queue is empty.

use crate::config::NucleusConfig;
use crate::scheduler::core::policy::SchedClass;
use crate::scheduler::core::statistics::SchedStats;
use crate::scheduler::queue::{PrioQueue, QueuePolicy};
use crate::scheduler::thread::ThreadId;
use crate::time::timer::TimerQueue;

#[cfg(feature = "scalable-sched")]
pub type ReadyQueue = crate::scheduler::queue::MultiLevelQueue<ThreadId>;

#[cfg(not(feature = "scalable-sched"))]
pub type ReadyQueue = crate::scheduler::queue::PList<ThreadId>;

/// Scheduler state of one CPU
pub struct Sched {
    pub(crate) cpu: usize,
    /// Thread owning the CPU (root when idle)
    pub(crate) curr: ThreadId,
    /// Idle/host placeholder
    pub(crate) root: ThreadId,
    /// Previous `curr`, reclaimed after the switch if it was deleted
    pub(crate) last: Option<ThreadId>,
    pub(crate) readyq: ReadyQueue,
    /// Reschedule pending
    pub(crate) resched: bool,
    /// Reschedule IPI already requested
    pub(crate) ipi_sent: bool,
    pub(crate) timers: TimerQueue,
    /// Timer queue changed since the last one-shot programming
    pub(crate) timers_dirty: bool,
    /// Date up to which round-robin ticks were accounted
    pub(crate) rr_stamp: u64,
    pub(crate) stats: SchedStats,
}

impl Sched {
    pub(crate) fn new(cpu: usize, root: ThreadId, config: &NucleusConfig) -> Self {
        Self {
            cpu,
            curr: root,
            root,
            last: None,
            readyq: ReadyQueue::new(config.rt_prio_min, config.rt_prio_max),
            resched: false,
            ipi_sent: false,
            timers: TimerQueue::new(),
            timers_dirty: false,
            rr_stamp: 0,
            stats: SchedStats::default(),
        }
    }

    pub fn cpu(&self) -> usize {
        self.cpu
    }

    pub fn current(&self) -> ThreadId {
        self.curr
    }

    pub fn root(&self) -> ThreadId {
        self.root
    }

    pub fn is_idle(&self) -> bool {
        self.curr == self.root
    }

    pub fn resched_pending(&self) -> bool {
        self.resched
    }

    /// Ready threads in pick order
    pub fn ready(&self) -> alloc::vec::Vec<ThreadId> {
        self.readyq.to_vec().into_iter().map(|(_, tid)| tid).collect()
    }

    pub fn stats(&self) -> SchedStats {
        self.stats
    }

    pub(crate) fn queue(&mut self, tid: ThreadId, prio: i32, policy: QueuePolicy) -> bool {
        self.readyq.insert(tid, prio, policy).is_ok()
    }

    /// Take the best candidate `class` offers on this CPU
    pub(crate) fn class_pick(&mut self, class: SchedClass) -> Option<ThreadId> {
        match class {
            SchedClass::Rt => self.readyq.pop_highest(),
            SchedClass::Idle => Some(self.root),
        }
    }
}
