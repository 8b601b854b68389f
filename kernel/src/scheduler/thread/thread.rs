//! Thread Control Block
//!
//! The schedulable entity. TCBs live in the nucleus arena and are only
//! ever referenced by [`ThreadId`]; every queue stores ids, and `link`
//! records which single queue currently holds the thread.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use super::state::{ThreadState, WakeInfo};
use crate::libutils::collections::ArenaKey;
use crate::scheduler::core::affinity::CpuMask;
use crate::scheduler::core::error::invariant_violation;
use crate::scheduler::core::policy::SchedClass;
use crate::scheduler::queue::{PList, PrioQueue};
use crate::shadow::host::RelaxReason;
use crate::sync::event::EventMode;
use crate::sync::synch::SynchId;
use crate::time::timer::TimerKey;

/// Longest symbolic name kept for a thread
pub const THREAD_NAME_MAX: usize = 32;

/// Thread handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub(crate) ArenaKey);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Per-thread finalizer, run once the TCB has been reclaimed
pub type Finalizer = Box<dyn FnOnce(ThreadId) + Send>;

/// Creation attributes
#[derive(Debug, Clone)]
pub struct ThreadAttr {
    pub name: String,
    /// Internal RT priority
    pub priority: i32,
    /// Round-robin quantum in ticks, `None` for no time slicing
    pub quantum: Option<u64>,
    pub affinity: CpuMask,
    /// Initial mode bits (subset of `ThreadState::MODE_BITS`)
    pub mode: ThreadState,
}

impl ThreadAttr {
    pub fn new(name: &str, priority: i32) -> Self {
        Self {
            name: String::from(name),
            priority,
            quantum: None,
            affinity: CpuMask::all(),
            mode: ThreadState::empty(),
        }
    }

    pub fn with_quantum(mut self, quantum: u64) -> Self {
        self.quantum = Some(quantum);
        self
    }

    pub fn with_affinity(mut self, affinity: CpuMask) -> Self {
        self.affinity = affinity;
        self
    }

    pub fn with_mode(mut self, mode: ThreadState) -> Self {
        self.mode = mode & ThreadState::MODE_BITS;
        self
    }
}

/// Payload handed to a waiter by whoever satisfied its wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Done,
    Value(u32),
    Message(Vec<u8>),
}

/// Queue currently holding the thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueLink {
    /// Ready queue of the given CPU
    Ready(usize),
    /// Pend queue of a synchronization object
    Pend(SynchId),
}

/// What a pending thread expects from its wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WaitData {
    None,
    Sleep,
    Event { mask: u32, mode: EventMode },
    Receive,
    Send(Vec<u8>),
    Period,
}

/// Release point of a periodic thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PeriodicTimer {
    pub period: u64,
    pub key: TimerKey,
    /// Release points passed without a thread waiting for them
    pub pending: u64,
}

/// Per-thread counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadStats {
    /// Context switches into this thread
    pub csw: u64,
    /// Domain switches (relax + harden)
    pub ssw: u64,
    /// Faults taken while current
    pub faults: u64,
}

/// Thread Control Block
pub struct Thread {
    pub(crate) id: ThreadId,
    pub(crate) name: String,
    pub(crate) host_pid: Option<u32>,
    pub(crate) class: SchedClass,
    /// Base priority
    pub(crate) bprio: i32,
    /// Current (possibly boosted) priority
    pub(crate) cprio: i32,
    pub(crate) state: ThreadState,
    pub(crate) info: WakeInfo,
    /// CPU whose scheduler owns the thread
    pub(crate) cpu: usize,
    pub(crate) affinity: CpuMask,
    pub(crate) rrperiod: Option<u64>,
    pub(crate) rrcredit: u64,
    /// Object the thread pends on
    pub(crate) wchan: Option<SynchId>,
    pub(crate) link: Option<QueueLink>,
    /// Mutex-like objects currently owned
    pub(crate) owned: Vec<SynchId>,
    /// Owned PI objects with waiters, keyed by their top waiter priority
    pub(crate) claims: PList<SynchId>,
    pub(crate) rtimer: Option<TimerKey>,
    pub(crate) ptimer: Option<PeriodicTimer>,
    /// Scheduler lock nesting
    pub(crate) lock_depth: u32,
    pub(crate) relax_reason: Option<RelaxReason>,
    pub(crate) wait: WaitData,
    pub(crate) completion: Option<Completion>,
    pub(crate) stats: ThreadStats,
    pub(crate) finalizer: Option<Finalizer>,
}

impl Thread {
    pub(crate) fn new(id: ThreadId, attr: &ThreadAttr, class: SchedClass, cpu: usize) -> Self {
        let mut name = attr.name.clone();
        if name.len() > THREAD_NAME_MAX {
            let mut cut = THREAD_NAME_MAX;
            while !name.is_char_boundary(cut) {
                cut -= 1;
            }
            name.truncate(cut);
        }
        Self {
            id,
            name,
            host_pid: None,
            class,
            bprio: attr.priority,
            cprio: attr.priority,
            state: ThreadState::DORMANT,
            info: WakeInfo::empty(),
            cpu,
            affinity: attr.affinity,
            rrperiod: attr.quantum,
            rrcredit: attr.quantum.unwrap_or(0),
            wchan: None,
            link: None,
            owned: Vec::new(),
            claims: PList::new(i32::MIN, i32::MAX),
            rtimer: None,
            ptimer: None,
            lock_depth: 0,
            relax_reason: None,
            wait: WaitData::None,
            completion: None,
            stats: ThreadStats::default(),
            finalizer: None,
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_priority(&self) -> i32 {
        self.bprio
    }

    pub fn current_priority(&self) -> i32 {
        self.cprio
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    pub fn cpu(&self) -> usize {
        self.cpu
    }

    pub fn is_shadow(&self) -> bool {
        self.state.contains(ThreadState::SHADOW)
    }

    pub fn is_root(&self) -> bool {
        self.state.contains(ThreadState::ROOT)
    }

    /// Priority the thread deserves given its base and pending claims
    pub(crate) fn inherited_priority(&self) -> i32 {
        match self.claims.head_prio() {
            Some(claim) => claim.max(self.bprio),
            None => self.bprio,
        }
    }

    /// Record that a queue now holds the thread
    pub(crate) fn link_to(&mut self, link: QueueLink) {
        if self.link.is_some() {
            invariant_violation("thread linked in two queues");
        }
        self.link = Some(link);
    }

    /// Record that `link` released the thread
    pub(crate) fn unlink(&mut self, link: QueueLink) {
        if self.link != Some(link) {
            invariant_violation("thread unlinked from a queue not holding it");
        }
        self.link = None;
    }

    pub(crate) fn snapshot(&self, running: bool) -> ThreadSnapshot {
        ThreadSnapshot {
            id: self.id,
            name: self.name.clone(),
            cpu: self.cpu,
            base_priority: self.bprio,
            current_priority: self.cprio,
            state: self.state,
            labels: self.state.labels(),
            running,
            rr_credit: self.rrperiod.map(|_| self.rrcredit),
            wchan: self.wchan,
            owned: self.owned.clone(),
            host_pid: self.host_pid,
            relax_reason: self.relax_reason,
            stats: self.stats,
        }
    }
}

/// Point-in-time copy of a TCB, for clients and diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSnapshot {
    pub id: ThreadId,
    pub name: String,
    pub cpu: usize,
    pub base_priority: i32,
    pub current_priority: i32,
    pub state: ThreadState,
    pub labels: String,
    pub running: bool,
    pub rr_credit: Option<u64>,
    pub wchan: Option<SynchId>,
    pub owned: Vec<SynchId>,
    pub host_pid: Option<u32>,
    pub relax_reason: Option<RelaxReason>,
    pub stats: ThreadStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libutils::collections::Arena;
    use crate::scheduler::queue::QueuePolicy;

    fn make(attr: &ThreadAttr) -> Thread {
        let mut arena: Arena<()> = Arena::new();
        let id = ThreadId(arena.insert(()));
        Thread::new(id, attr, SchedClass::Rt, 0)
    }

    #[test]
    fn test_new_thread_is_dormant() {
        let t = make(&ThreadAttr::new("worker", 10).with_quantum(3));
        assert_eq!(t.state(), ThreadState::DORMANT);
        assert_eq!(t.current_priority(), t.base_priority());
        assert_eq!(t.rrcredit, 3);
    }

    #[test]
    fn test_name_truncated() {
        let long = "x".repeat(40);
        let t = make(&ThreadAttr::new(&long, 1));
        assert_eq!(t.name().len(), THREAD_NAME_MAX);
    }

    #[test]
    fn test_inherited_priority_follows_claims() {
        let mut t = make(&ThreadAttr::new("owner", 10));
        let mut synchs: Arena<()> = Arena::new();
        let s = SynchId(synchs.insert(()));
        assert_eq!(t.inherited_priority(), 10);
        t.claims.insert(s, 90, QueuePolicy::Enqueue).unwrap();
        assert_eq!(t.inherited_priority(), 90);
        t.bprio = 95;
        assert_eq!(t.inherited_priority(), 95);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "linked in two queues")]
    fn test_double_link_is_fatal() {
        let mut t = make(&ThreadAttr::new("t", 1));
        t.link_to(QueueLink::Ready(0));
        t.link_to(QueueLink::Ready(0));
    }
}
