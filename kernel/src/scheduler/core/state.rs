//! Nucleus state
//!
//! Everything guarded by the global nucleus lock: the TCB and synch
//! arenas, the per-CPU schedulers and the registry. All methods here run
//! with the lock held and never call out to the platform; side effects
//! the platform must see (IPIs, host requests, hooks) are queued and
//! handed back by `take_deferred` once the caller is ready to drop the
//! lock.

use alloc::format;
use alloc::vec::Vec;
use core::marker::PhantomData;

use crate::config::{NucleusConfig, TimerMode};
use crate::libutils::collections::{Arena, ArenaKey};
use crate::registry::Registry;
use crate::scheduler::core::error::{invariant_violation, NucleusError, NucleusResult};
use crate::scheduler::core::policy::SchedClass;
use crate::scheduler::core::sched::Sched;
use crate::scheduler::idle;
use crate::scheduler::queue::{PrioQueue, QueuePolicy};
use crate::scheduler::thread::{
    Finalizer, QueueLink, Thread, ThreadId, ThreadState, WakeInfo,
};
use crate::shadow::host::{HostRequest, HostSignal};
use crate::sync::synch::{Synch, SynchId};
use crate::time::clock::Deadline;
use crate::time::timer::TimerEvent;

/// Handle types resolving through a [`Table`]
pub(crate) trait Handle: Copy {
    fn key(self) -> ArenaKey;
    fn wrap(key: ArenaKey) -> Self;
    /// Error returned for a handle whose object is gone
    fn stale() -> NucleusError;
}

impl Handle for ThreadId {
    fn key(self) -> ArenaKey {
        self.0
    }

    fn wrap(key: ArenaKey) -> Self {
        ThreadId(key)
    }

    fn stale() -> NucleusError {
        NucleusError::InvalidState { reason: "stale thread handle" }
    }
}

impl Handle for SynchId {
    fn key(self) -> ArenaKey {
        self.0
    }

    fn wrap(key: ArenaKey) -> Self {
        SynchId(key)
    }

    fn stale() -> NucleusError {
        NucleusError::Deleted
    }
}

/// Arena addressed by a typed handle
pub(crate) struct Table<H, T> {
    arena: Arena<T>,
    _handle: PhantomData<H>,
}

impl<H: Handle, T> Table<H, T> {
    pub(crate) const fn new() -> Self {
        Self {
            arena: Arena::new(),
            _handle: PhantomData,
        }
    }

    pub(crate) fn insert_with(&mut self, build: impl FnOnce(H) -> T) -> H {
        H::wrap(self.arena.insert_with(|key| build(H::wrap(key))))
    }

    pub(crate) fn remove(&mut self, handle: H) -> Option<T> {
        self.arena.remove(handle.key())
    }

    /// Resolve a handle the nucleus itself holds; a miss means a
    /// dangling internal reference.
    #[track_caller]
    pub(crate) fn get(&self, handle: H) -> Option<&T> {
        let found = self.arena.get(handle.key());
        if found.is_none() {
            invariant_violation("dangling internal reference");
        }
        found
    }

    #[track_caller]
    pub(crate) fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        let found = self.arena.get_mut(handle.key());
        if found.is_none() {
            invariant_violation("dangling internal reference");
        }
        found
    }

    /// Resolve a handle supplied by a client
    pub(crate) fn checked(&self, handle: H) -> NucleusResult<&T> {
        self.arena.get(handle.key()).ok_or_else(H::stale)
    }

    pub(crate) fn checked_mut(&mut self, handle: H) -> NucleusResult<&mut T> {
        self.arena.get_mut(handle.key()).ok_or_else(H::stale)
    }

    pub(crate) fn handles(&self) -> Vec<H> {
        self.arena.keys().into_iter().map(H::wrap).collect()
    }
}

/// A TCB removed from the arena, its finalizer still to run
pub(crate) struct Reclaimed {
    pub thread: ThreadId,
    pub finalizer: Option<Finalizer>,
}

/// Work to perform once the nucleus lock is released
#[derive(Default)]
pub(crate) struct Deferred {
    pub ipis: Vec<usize>,
    pub programs: Vec<(usize, u64)>,
    pub host: Vec<HostRequest>,
    pub started: Vec<ThreadId>,
    pub reclaimed: Vec<Reclaimed>,
}

/// State guarded by the nucleus lock
pub struct NucleusState {
    pub(crate) config: NucleusConfig,
    pub(crate) threads: Table<ThreadId, Thread>,
    pub(crate) synchs: Table<SynchId, Synch>,
    pub(crate) scheds: Vec<Sched>,
    pub(crate) registry: Registry,
    pub(crate) host_requests: Vec<HostRequest>,
    pub(crate) started: Vec<ThreadId>,
    pub(crate) reclaimed: Vec<Reclaimed>,
}

impl NucleusState {
    pub(crate) fn new(config: &NucleusConfig) -> Self {
        let mut threads = Table::new();
        let mut scheds = Vec::with_capacity(config.nr_cpus);
        for cpu in 0..config.nr_cpus {
            let root = threads.insert_with(|tid| idle::root_thread(tid, cpu));
            scheds.push(Sched::new(cpu, root, config));
        }
        Self {
            config: config.clone(),
            threads,
            synchs: Table::new(),
            scheds,
            registry: Registry::new(),
            host_requests: Vec::new(),
            started: Vec::new(),
            reclaimed: Vec::new(),
        }
    }

    pub fn sched(&self, cpu: usize) -> NucleusResult<&Sched> {
        self.scheds.get(cpu).ok_or(NucleusError::InvalidCpu { cpu })
    }

    pub fn thread(&self, tid: ThreadId) -> NucleusResult<&Thread> {
        self.threads.checked(tid)
    }

    /// Thread running on `cpu`, if it may block
    pub(crate) fn current_blockable(&self, cpu: usize) -> NucleusResult<ThreadId> {
        let sched = self.sched(cpu)?;
        if sched.is_idle() {
            return Err(NucleusError::InvalidState {
                reason: "blocking call from the root context",
            });
        }
        Ok(sched.curr)
    }

    /// Client-supplied thread that is live and not a root thread
    pub(crate) fn live_thread(&self, tid: ThreadId) -> NucleusResult<&Thread> {
        let th = self.threads.checked(tid)?;
        if th.state.contains(ThreadState::ZOMBIE) {
            return Err(NucleusError::InvalidState { reason: "thread deleted" });
        }
        if th.is_root() {
            return Err(NucleusError::InvalidState { reason: "operation on a root thread" });
        }
        Ok(th)
    }

    pub(crate) fn is_current(&self, tid: ThreadId) -> bool {
        self.threads
            .checked(tid)
            .map(|th| self.scheds[th.cpu].curr == tid)
            .unwrap_or(false)
    }

    // ─── Ready queue ────────────────────────────────────────────────

    pub(crate) fn set_resched(&mut self, cpu: usize) {
        self.scheds[cpu].resched = true;
    }

    /// Link a runnable thread into its CPU's ready queue
    pub(crate) fn enqueue(&mut self, tid: ThreadId, policy: QueuePolicy) {
        let Some(th) = self.threads.get_mut(tid) else { return };
        if th.is_root() {
            return;
        }
        let (cpu, prio) = (th.cpu, th.cprio);
        th.state.insert(ThreadState::READY);
        th.link_to(QueueLink::Ready(cpu));
        if !self.scheds[cpu].queue(tid, prio, policy) {
            invariant_violation("ready queue rejected a validated priority");
        }
    }

    /// Unlink a thread from its ready queue
    pub(crate) fn dequeue(&mut self, tid: ThreadId) {
        let Some(th) = self.threads.get_mut(tid) else { return };
        let cpu = th.cpu;
        th.state.remove(ThreadState::READY);
        th.unlink(QueueLink::Ready(cpu));
        self.scheds[cpu].readyq.remove(tid);
    }

    /// Move a runnable thread to the tail of its priority band
    pub(crate) fn putback(&mut self, tid: ThreadId) {
        let Some(th) = self.threads.get(tid) else { return };
        let (cpu, ready) = (th.cpu, th.state.contains(ThreadState::READY));
        if ready {
            self.dequeue(tid);
        }
        self.enqueue(tid, QueuePolicy::Enqueue);
        self.set_resched(cpu);
    }

    /// Pick the thread to run next on `cpu`.
    ///
    /// A runnable current thread goes back to the head of its band (it
    /// was preempted, not yielding) unless it already sits in the queue.
    /// With preemption locked the current thread is kept and the
    /// reschedule stays pending.
    pub(crate) fn pick_next(&mut self, cpu: usize) -> ThreadId {
        let curr = self.scheds[cpu].curr;
        if let Some(ct) = self.threads.get(curr) {
            // A thread migrated away is requeued by its new CPU only
            if ct.state.is_runnable() && !ct.is_root() && ct.cpu == cpu {
                if ct.state.contains(ThreadState::LOCK) {
                    if ct.state.contains(ThreadState::READY) {
                        self.dequeue(curr);
                    }
                    self.scheds[cpu].resched = true;
                    return curr;
                }
                if !ct.state.contains(ThreadState::READY) {
                    self.enqueue(curr, QueuePolicy::Requeue);
                }
            }
        }

        let sched = &mut self.scheds[cpu];
        let root = sched.root;
        let next = SchedClass::BY_WEIGHT
            .iter()
            .find_map(|&class| sched.class_pick(class))
            .unwrap_or(root);
        if let Some(th) = self.threads.get_mut(next) {
            if th.class == SchedClass::Rt {
                th.state.remove(ThreadState::READY);
                th.unlink(QueueLink::Ready(cpu));
            }
        }
        next
    }

    // ─── Blocking and wakeup ────────────────────────────────────────

    /// Clear stale wake-up information before a new wait. A pending
    /// kick aborts the wait before it starts.
    pub(crate) fn begin_wait(&mut self, tid: ThreadId) -> NucleusResult<()> {
        let th = self.threads.checked_mut(tid)?;
        let kicked = th.info.contains(WakeInfo::KICKED);
        th.info = WakeInfo::empty();
        th.completion = None;
        if kicked {
            return Err(NucleusError::Interrupted);
        }
        Ok(())
    }

    /// Add blocking bits to a thread, arming its timeout
    pub(crate) fn suspend_thread(&mut self, tid: ThreadId, mask: ThreadState, deadline: Deadline) {
        let Some(th) = self.threads.get(tid) else { return };
        if th.state.contains(ThreadState::ZOMBIE) || th.is_root() {
            invariant_violation("suspending a root or deleted thread");
            return;
        }
        let cpu = th.cpu;
        let ready = th.state.contains(ThreadState::READY);
        let remote_relaxed = th.is_shadow()
            && th.state.contains(ThreadState::RELAX)
            && mask.intersects(ThreadState::SUSP | ThreadState::DELAY);
        let is_curr = self.scheds[cpu].curr == tid;

        if ready {
            self.dequeue(tid);
        }
        if let Deadline::At(date) = deadline {
            let key = self.scheds[cpu].timers.arm(date, TimerEvent::Timeout(tid));
            self.scheds[cpu].timers_dirty = true;
            if let Some(th) = self.threads.get_mut(tid) {
                th.rtimer = Some(key);
                th.state.insert(ThreadState::DELAY);
            }
        }
        let Some(th) = self.threads.get_mut(tid) else { return };
        th.state.insert(mask);

        if is_curr {
            self.scheds[cpu].resched = true;
        } else if remote_relaxed {
            // The host must bring the task back to primary mode for the
            // suspension to take effect.
            if let Some(pid) = th.host_pid {
                self.host_requests.push(HostRequest::Signal {
                    thread: tid,
                    pid,
                    signal: HostSignal::Harden,
                });
            }
        }
    }

    /// Clear blocking bits; the thread is queued once none remain.
    ///
    /// Clearing either DELAY or PEND ends the whole wait: the timeout is
    /// disarmed and the thread leaves the pend queue it may still be on.
    pub(crate) fn resume_thread(&mut self, tid: ThreadId, mask: ThreadState) {
        let Some(th) = self.threads.get_mut(tid) else { return };
        if !th.state.intersects(ThreadState::BLOCK_BITS) {
            return;
        }
        let was = th.state;
        let cpu = th.cpu;
        th.state.remove(mask);

        if mask.intersects(ThreadState::DELAY | ThreadState::PEND) {
            th.state.remove(ThreadState::DELAY | ThreadState::PEND);
            if let Some(key) = th.rtimer.take() {
                self.scheds[cpu].timers.cancel(key);
                self.scheds[cpu].timers_dirty = true;
            }
            if was.contains(ThreadState::PEND) {
                self.forget_sleeper(tid);
            }
        }

        let Some(th) = self.threads.get(tid) else { return };
        if th.state.intersects(ThreadState::BLOCK_BITS) {
            return;
        }
        self.enqueue(tid, QueuePolicy::Enqueue);
        self.set_resched(cpu);
    }

    // ─── Round robin ────────────────────────────────────────────────

    /// Consume `ticks` of the current thread's time slice
    pub(crate) fn rr_tick(&mut self, cpu: usize, ticks: u64) {
        let curr = self.scheds[cpu].curr;
        let Some(th) = self.threads.get_mut(curr) else { return };
        let gate = ThreadState::BLOCK_BITS | ThreadState::ZOMBIE | ThreadState::LOCK | ThreadState::RRB;
        if th.is_root() || (th.state & gate) != ThreadState::RRB {
            return;
        }
        let Some(period) = th.rrperiod else { return };

        let mut expired = false;
        for _ in 0..ticks.min(period.max(1)) {
            if th.rrcredit > 1 {
                th.rrcredit -= 1;
            } else {
                th.rrcredit = period;
                expired = true;
            }
        }
        if expired {
            self.putback(curr);
        }
    }

    /// Does `cpu` need periodic ticks for time slicing?
    pub(crate) fn rr_wanted(&self, cpu: usize) -> bool {
        let curr = self.scheds[cpu].curr;
        self.threads
            .checked(curr)
            .map(|th| th.state.contains(ThreadState::RRB) && th.rrperiod.is_some())
            .unwrap_or(false)
    }

    // ─── Migration ──────────────────────────────────────────────────

    /// Move a thread (and its timers) to another CPU's scheduler
    pub(crate) fn move_thread(&mut self, tid: ThreadId, to: usize) {
        let Some(th) = self.threads.get(tid) else { return };
        let from = th.cpu;
        if from == to {
            return;
        }
        let ready = th.state.contains(ThreadState::READY);
        let runnable = th.state.is_runnable();
        let (rtimer, ptimer) = (th.rtimer, th.ptimer);
        if ready {
            self.dequeue(tid);
        }

        let rtimer = rtimer.and_then(|key| {
            let event = self.scheds[from].timers.cancel(key)?;
            Some(self.scheds[to].timers.arm(key.date(), event))
        });
        let ptimer = ptimer.map(|mut p| {
            if let Some(event) = self.scheds[from].timers.cancel(p.key) {
                p.key = self.scheds[to].timers.arm(p.key.date(), event);
            }
            p
        });
        self.scheds[from].timers_dirty = true;
        self.scheds[to].timers_dirty = true;

        let Some(th) = self.threads.get_mut(tid) else { return };
        th.cpu = to;
        th.rtimer = rtimer;
        th.ptimer = ptimer;

        let was_curr = self.scheds[from].curr == tid;
        if runnable && (ready || was_curr) {
            self.enqueue(tid, QueuePolicy::Enqueue);
            self.set_resched(to);
        }
        if was_curr {
            self.set_resched(from);
        }
    }

    // ─── Lifecycle ──────────────────────────────────────────────────

    /// Remove a deleted TCB from the arena
    pub(crate) fn reclaim(&mut self, tid: ThreadId) {
        if let Some(mut th) = self.threads.remove(tid) {
            self.registry.unregister(&th.name, tid);
            self.reclaimed.push(Reclaimed {
                thread: tid,
                finalizer: th.finalizer.take(),
            });
        }
    }

    /// Collect everything to do after the lock is dropped. `cpu` is the
    /// local CPU, whose reschedule is handled by the caller.
    pub(crate) fn take_deferred(&mut self, cpu: usize, now: u64) -> Deferred {
        let mut deferred = Deferred::default();
        let one_shot = self.config.timer_mode == TimerMode::OneShot;
        let tick = self.config.tick_period;
        for idx in 0..self.scheds.len() {
            let sched = &mut self.scheds[idx];
            if sched.cpu != cpu && sched.resched && !sched.ipi_sent {
                sched.ipi_sent = true;
                deferred.ipis.push(sched.cpu);
            }
            if one_shot && sched.timers_dirty {
                sched.timers_dirty = false;
                let rr = self.rr_wanted(idx);
                let sched = &self.scheds[idx];
                let mut next = sched.timers.next_date();
                if rr {
                    let slice = sched.rr_stamp.saturating_add(tick);
                    next = Some(next.map_or(slice, |d| d.min(slice)));
                }
                if let Some(date) = next {
                    deferred.programs.push((idx, date.saturating_sub(now).max(1)));
                }
            }
        }
        deferred.host = core::mem::take(&mut self.host_requests);
        deferred.started = core::mem::take(&mut self.started);
        deferred.reclaimed = core::mem::take(&mut self.reclaimed);
        deferred
    }

    pub(crate) fn describe(&self, tid: ThreadId) -> alloc::string::String {
        match self.threads.checked(tid) {
            Ok(th) => format!("{}({})", th.name, tid),
            Err(_) => format!("{}", tid),
        }
    }
}
