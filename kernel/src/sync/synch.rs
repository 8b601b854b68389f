//! Generic synchronization object
//!
//! A pend queue of blocked threads with an ordering policy and, for
//! mutex-like objects, an owner. Every blocking primitive of the
//! nucleus (mutex, semaphore, event, message queue, wait queue) is a
//! `Synch` with a specific [`SynchKind`].
//!
//! # Priority inheritance
//! An owner of PIP objects keeps a `claims` queue: one entry per owned
//! PIP object with waiters, keyed by the priority of its top waiter.
//! The owner runs at `max(base, top claim)`. Whenever a pend queue or
//! a waiter priority changes, [`NucleusState::adjust_chain`] walks the
//! owner/wait-channel chain and re-derives each current priority,
//! stopping as soon as one is unchanged. The walk is a bounded loop.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::fmt;

use bitflags::bitflags;

use crate::libutils::collections::ArenaKey;
use crate::logger;
use crate::scheduler::core::error::{invariant_violation, NucleusError, NucleusResult};
use crate::scheduler::core::nucleus::{NkGuard, Nucleus};
use crate::scheduler::core::state::NucleusState;
use crate::scheduler::queue::{PList, PrioQueue, QueuePolicy};
use crate::scheduler::thread::thread::WaitData;
use crate::scheduler::thread::{Completion, QueueLink, ThreadId, ThreadState, WakeInfo};
use crate::shadow::host::HostRequest;
use crate::time::clock::{Deadline, Timeout};

/// Synchronization object handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SynchId(pub(crate) ArenaKey);

impl fmt::Display for SynchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

bitflags! {
    /// Synch object behaviour
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SynchFlags: u32 {
        /// Waiters ordered by priority (FIFO otherwise)
        const PRIO   = 1 << 0;
        /// Priority inheritance; implies PRIO and OWNER
        const PIP    = 1 << 1;
        /// The object has an owner (mutex semantics)
        const OWNER  = 1 << 2;
        /// Keep the pend queue order when a waiter is reniced explicitly
        const DREORD = 1 << 3;
    }
}

impl SynchFlags {
    fn normalized(self) -> Self {
        if self.contains(Self::PIP) {
            self | Self::PRIO | Self::OWNER
        } else {
            self
        }
    }
}

/// Primitive-specific state
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SynchKind {
    Raw,
    Mutex { lock_count: u32, recursive: bool },
    Semaphore { count: u32 },
    Event { value: u32 },
    Queue { messages: VecDeque<Vec<u8>>, capacity: usize },
}

/// Synchronization object
pub struct Synch {
    pub(crate) flags: SynchFlags,
    pub(crate) pendq: PList<ThreadId>,
    pub(crate) owner: Option<ThreadId>,
    /// Present in the owner's claim queue
    pub(crate) claimed: bool,
    pub(crate) kind: SynchKind,
}

impl Synch {
    pub(crate) fn new(flags: SynchFlags, kind: SynchKind) -> Self {
        Self {
            flags: flags.normalized(),
            pendq: PList::new(i32::MIN, i32::MAX),
            owner: None,
            claimed: false,
            kind,
        }
    }

    pub fn flags(&self) -> SynchFlags {
        self.flags
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.owner
    }

    /// Waiters in wake-up order
    pub fn waiters(&self) -> Vec<ThreadId> {
        self.pendq.items()
    }
}

impl NucleusState {
    pub(crate) fn synch_new(&mut self, flags: SynchFlags, kind: SynchKind) -> SynchId {
        self.synchs.insert_with(|_| Synch::new(flags, kind))
    }

    /// Bare object reached through the generic services. Typed
    /// primitives are only driven by their own services.
    pub(crate) fn raw_synch(&self, sid: SynchId) -> NucleusResult<&Synch> {
        let synch = self.synchs.checked(sid)?;
        if synch.kind != SynchKind::Raw {
            return Err(NucleusError::InvalidState { reason: "typed object behind the generic API" });
        }
        Ok(synch)
    }

    /// Re-derive priorities along the chain starting at `start`.
    ///
    /// `explicit` is set when `start` was reniced by a client call, in
    /// which case a DREORD object keeps its pend queue order.
    pub(crate) fn adjust_chain(&mut self, start: ThreadId, explicit: bool) {
        let limit = self.config.pi_chain_depth;
        let mut tid = start;
        let mut depth = 0;
        loop {
            depth += 1;
            if depth > limit {
                logger::error("[SYNCH] priority inheritance chain exceeds the depth bound");
                invariant_violation("priority inheritance chain too deep");
                return;
            }

            let Some(th) = self.threads.get_mut(tid) else { return };
            let prio = th.inherited_priority();
            th.state.set(ThreadState::BOOST, prio > th.bprio);
            if prio == th.cprio {
                break;
            }
            th.cprio = prio;
            let (cpu, state, wchan) = (th.cpu, th.state, th.wchan);
            if th.is_shadow() {
                if let Some(pid) = th.host_pid {
                    self.host_requests.push(HostRequest::Renice { pid, prio });
                }
            }

            if state.contains(ThreadState::READY) {
                self.dequeue(tid);
                self.enqueue(tid, QueuePolicy::Enqueue);
                self.set_resched(cpu);
            } else if self.scheds[cpu].curr == tid {
                self.set_resched(cpu);
            }

            if !state.contains(ThreadState::PEND) {
                break;
            }
            let Some(sid) = wchan else { break };
            let Some(synch) = self.synchs.get_mut(sid) else { break };
            let keep_order = explicit && depth == 1 && synch.flags.contains(SynchFlags::DREORD);
            if synch.flags.contains(SynchFlags::PRIO) && !keep_order {
                synch.pendq.remove(tid);
                if synch.pendq.insert(tid, prio, QueuePolicy::Enqueue).is_err() {
                    invariant_violation("pend queue rejected a thread priority");
                }
            }
            if !synch.flags.contains(SynchFlags::PIP) {
                break;
            }
            let Some(owner) = synch.owner else { break };
            self.refresh_claim(sid);
            tid = owner;
        }
    }

    /// Bring the owner's claim entry for `sid` in line with its pend queue
    pub(crate) fn refresh_claim(&mut self, sid: SynchId) {
        let Some(synch) = self.synchs.get_mut(sid) else { return };
        if !synch.flags.contains(SynchFlags::PIP) {
            return;
        }
        let Some(owner) = synch.owner else { return };
        let top = synch
            .pendq
            .pick_highest()
            .and_then(|w| self.threads.get(w))
            .map(|w| w.cprio);
        let Some(owner_th) = self.threads.get_mut(owner) else { return };
        if synch.claimed {
            owner_th.claims.remove(sid);
            synch.claimed = false;
        }
        if let Some(prio) = top {
            if owner_th.claims.insert(sid, prio, QueuePolicy::Enqueue).is_err() {
                invariant_violation("claim queue rejected a priority");
                return;
            }
            synch.claimed = true;
        }
    }

    /// Block `tid` on `sid`. The caller resolved the timeout already.
    pub(crate) fn sleep_on(
        &mut self,
        sid: SynchId,
        tid: ThreadId,
        deadline: Deadline,
        wait: WaitData,
    ) -> NucleusResult<()> {
        let synch = self.synchs.checked(sid)?;
        let (flags, owner) = (synch.flags, synch.owner);

        self.suspend_thread(tid, ThreadState::PEND, deadline);
        let Some(th) = self.threads.get_mut(tid) else { return Ok(()) };
        let key = if flags.contains(SynchFlags::PRIO) { th.cprio } else { 0 };
        th.link_to(QueueLink::Pend(sid));
        th.wchan = Some(sid);
        th.wait = wait;
        if let Some(synch) = self.synchs.get_mut(sid) {
            if synch.pendq.insert(tid, key, QueuePolicy::Enqueue).is_err() {
                invariant_violation("pend queue rejected a thread priority");
            }
        }

        if flags.contains(SynchFlags::PIP) {
            if let Some(owner) = owner {
                self.refresh_claim(sid);
                self.adjust_chain(owner, false);
            }
        }
        Ok(())
    }

    /// Take `tid` off the pend queue it sleeps on, undoing any boost
    /// its wait caused. Idempotent.
    pub(crate) fn forget_sleeper(&mut self, tid: ThreadId) {
        let Some(th) = self.threads.get_mut(tid) else { return };
        let Some(sid) = th.wchan.take() else { return };
        let linked = th.link == Some(QueueLink::Pend(sid));
        if linked {
            th.unlink(QueueLink::Pend(sid));
        }
        let Some(synch) = self.synchs.get_mut(sid) else { return };
        if linked {
            synch.pendq.remove(tid);
        }
        let owner = synch.owner.filter(|_| synch.flags.contains(SynchFlags::PIP));
        if let Some(owner) = owner {
            self.refresh_claim(sid);
            self.adjust_chain(owner, false);
        }
    }

    /// Wake a specific waiter of `sid`
    pub(crate) fn wakeup_this(&mut self, sid: SynchId, tid: ThreadId) -> NucleusResult<()> {
        let th = self.threads.checked_mut(tid)?;
        if th.wchan != Some(sid) || !th.state.contains(ThreadState::PEND) {
            return Err(NucleusError::InvalidState {
                reason: "thread is not pending on this object",
            });
        }
        th.info.insert(WakeInfo::WAKEN);
        self.resume_thread(tid, ThreadState::PEND);
        Ok(())
    }

    /// Wake the head waiter of `sid`, handing it `completion`
    pub(crate) fn wakeup_one(&mut self, sid: SynchId, completion: Completion) -> Option<ThreadId> {
        let next = self.synchs.get(sid)?.pendq.pick_highest()?;
        if let Some(th) = self.threads.get_mut(next) {
            th.completion = Some(completion);
        }
        if self.wakeup_this(sid, next).is_err() {
            invariant_violation("pend queue head is not pending");
        }
        Some(next)
    }

    /// Wake every waiter of `sid` with `reason`
    pub(crate) fn flush(&mut self, sid: SynchId, reason: WakeInfo) -> bool {
        let waiters = match self.synchs.get(sid) {
            Some(synch) => synch.pendq.items(),
            None => return false,
        };
        for &waiter in &waiters {
            if let Some(th) = self.threads.get_mut(waiter) {
                th.info.insert(reason);
            }
            self.resume_thread(waiter, ThreadState::PEND);
        }
        !waiters.is_empty()
    }

    /// Make `tid` the owner of `sid`
    pub(crate) fn grant(&mut self, sid: SynchId, tid: ThreadId) {
        let Some(synch) = self.synchs.get_mut(sid) else { return };
        synch.owner = Some(tid);
        if let Some(th) = self.threads.get_mut(tid) {
            th.owned.push(sid);
        }
        self.refresh_claim(sid);
        self.adjust_chain(tid, false);
    }

    /// Drop `from`'s ownership of `sid`, handing it to the next waiter.
    /// Returns the new owner.
    pub(crate) fn release_ownership(&mut self, sid: SynchId, from: ThreadId) -> Option<ThreadId> {
        let synch = self.synchs.get_mut(sid)?;
        if synch.owner != Some(from) {
            invariant_violation("releasing an object owned by another thread");
            return None;
        }
        synch.owner = None;
        let claimed = core::mem::replace(&mut synch.claimed, false);
        let next = synch.pendq.pick_highest();
        if let Some(th) = self.threads.get_mut(from) {
            th.owned.retain(|&s| s != sid);
            if claimed {
                th.claims.remove(sid);
            }
        }

        if let Some(next) = next {
            if let Some(th) = self.threads.get_mut(next) {
                th.completion = Some(Completion::Done);
            }
            if self.wakeup_this(sid, next).is_err() {
                invariant_violation("pend queue head is not pending");
            }
            self.grant(sid, next);
        }
        if let Some(Synch { kind: SynchKind::Mutex { lock_count, .. }, .. }) = self.synchs.get_mut(sid) {
            *lock_count = u32::from(next.is_some());
        }
        self.adjust_chain(from, false);
        next
    }

    /// Release everything `tid` owns
    pub(crate) fn release_all_ownerships(&mut self, tid: ThreadId) {
        let owned = match self.threads.get(tid) {
            Some(th) => th.owned.clone(),
            None => return,
        };
        for sid in owned {
            self.release_ownership(sid, tid);
        }
    }

    /// Wake all waiters with RMID and drop the object
    pub(crate) fn destroy(&mut self, sid: SynchId) -> NucleusResult<bool> {
        self.synchs.checked(sid)?;
        let woke = self.flush(sid, WakeInfo::RMID);
        let Some(synch) = self.synchs.remove(sid) else { return Ok(woke) };
        if let Some(owner) = synch.owner {
            if let Some(th) = self.threads.get_mut(owner) {
                th.owned.retain(|&s| s != sid);
                if synch.claimed {
                    th.claims.remove(sid);
                }
            }
            self.adjust_chain(owner, false);
        }
        Ok(woke)
    }
}

impl Nucleus {
    /// Block the current thread on `sid` and switch away
    pub(crate) fn sleep_current(
        &self,
        mut nk: NkGuard<'_>,
        sid: SynchId,
        timeout: Timeout,
        wait: WaitData,
    ) -> NucleusResult<Completion> {
        let tid = nk.current_blockable(self.local_cpu())?;
        match timeout.resolve(self.now()) {
            Deadline::Poll => return Err(NucleusError::WouldBlock),
            Deadline::Expired => return Err(NucleusError::TimedOut),
            deadline => {
                nk.begin_wait(tid)?;
                nk.sleep_on(sid, tid, deadline, wait)?;
            }
        }
        self.block(nk, tid)
    }

    /// Create a bare synchronization object
    pub fn synch_create(&self, flags: SynchFlags) -> SynchId {
        self.lock().synch_new(flags, SynchKind::Raw)
    }

    /// Destroy `sid`; waiters resume with `Deleted`
    pub fn synch_destroy(&self, sid: SynchId) -> NucleusResult<()> {
        let mut nk = self.lock();
        if nk.destroy(sid)? {
            self.schedule(nk);
        }
        Ok(())
    }

    /// Wait on `sid`. An OWNER object is acquired when free.
    pub fn pend(&self, sid: SynchId, timeout: Timeout) -> NucleusResult<Completion> {
        let mut nk = self.lock();
        let (flags, owner) = {
            let synch = nk.raw_synch(sid)?;
            (synch.flags, synch.owner)
        };
        if flags.contains(SynchFlags::OWNER) {
            let tid = nk.current_blockable(self.local_cpu())?;
            match owner {
                None => {
                    nk.grant(sid, tid);
                    return Ok(Completion::Done);
                }
                Some(owner) if owner == tid => {
                    return Err(NucleusError::InvalidState { reason: "object already owned by caller" });
                }
                Some(_) => {}
            }
        }
        self.sleep_current(nk, sid, timeout, WaitData::None)
    }

    /// Wake the head waiter of a non-owner object
    pub fn signal(&self, sid: SynchId) -> NucleusResult<Option<ThreadId>> {
        let mut nk = self.lock();
        if nk.raw_synch(sid)?.flags.contains(SynchFlags::OWNER) {
            return Err(NucleusError::InvalidState { reason: "signal on an owned object" });
        }
        let woken = nk.wakeup_one(sid, Completion::Done);
        self.schedule(nk);
        Ok(woken)
    }

    /// Release an OWNER object held by the current thread
    pub fn synch_release(&self, sid: SynchId) -> NucleusResult<Option<ThreadId>> {
        let mut nk = self.lock();
        let owner = nk.raw_synch(sid)?.owner;
        let curr = nk.sched(self.local_cpu())?.current();
        if owner != Some(curr) {
            return Err(NucleusError::NotOwner);
        }
        let next = nk.release_ownership(sid, curr);
        self.schedule(nk);
        Ok(next)
    }

    /// Wake `tid`, which must be pending on non-owner object `sid`
    pub fn wakeup_this(&self, sid: SynchId, tid: ThreadId) -> NucleusResult<()> {
        let mut nk = self.lock();
        if nk.raw_synch(sid)?.flags.contains(SynchFlags::OWNER) {
            return Err(NucleusError::InvalidState { reason: "wakeup on an owned object" });
        }
        nk.wakeup_this(sid, tid)?;
        if let Some(th) = nk.threads.get_mut(tid) {
            th.completion = Some(Completion::Done);
        }
        self.schedule(nk);
        Ok(())
    }

    /// Wake every waiter of `sid`; they resume with `Interrupted`.
    /// Works on typed objects too since no payload is handed over.
    pub fn flush(&self, sid: SynchId) -> NucleusResult<bool> {
        let mut nk = self.lock();
        nk.synchs.checked(sid)?;
        let woke = nk.flush(sid, WakeInfo::BREAK);
        self.schedule(nk);
        Ok(woke)
    }

    /// Next thread `signal` would wake
    pub fn peek_pendq(&self, sid: SynchId) -> NucleusResult<Option<ThreadId>> {
        Ok(self.lock().synchs.checked(sid)?.pendq.pick_highest())
    }

    pub fn synch_owner(&self, sid: SynchId) -> NucleusResult<Option<ThreadId>> {
        Ok(self.lock().synchs.checked(sid)?.owner)
    }

    pub fn synch_waiters(&self, sid: SynchId) -> NucleusResult<Vec<ThreadId>> {
        Ok(self.lock().synchs.checked(sid)?.waiters())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NucleusConfig;
    use crate::scheduler::core::policy::SchedClass;
    use crate::scheduler::thread::{Thread, ThreadAttr};

    fn spawn(st: &mut NucleusState, prio: i32) -> ThreadId {
        let attr = ThreadAttr::new("t", prio);
        let tid = st
            .threads
            .insert_with(|tid| Thread::new(tid, &attr, SchedClass::Rt, 0));
        st.threads.get_mut(tid).unwrap().state = ThreadState::STARTED;
        st.enqueue(tid, QueuePolicy::Enqueue);
        tid
    }

    fn pi_mutex(st: &mut NucleusState, owner: ThreadId) -> SynchId {
        let sid = st.synch_new(SynchFlags::PIP, SynchKind::Raw);
        st.grant(sid, owner);
        sid
    }

    fn cprio(st: &NucleusState, tid: ThreadId) -> i32 {
        st.thread(tid).unwrap().current_priority()
    }

    #[test]
    fn test_pip_implies_prio_and_owner() {
        let synch = Synch::new(SynchFlags::PIP, SynchKind::Raw);
        assert!(synch.flags().contains(SynchFlags::PRIO | SynchFlags::OWNER));
    }

    #[test]
    fn test_boost_and_unboost() {
        let mut st = NucleusState::new(&NucleusConfig::default());
        let low = spawn(&mut st, 10);
        let high = spawn(&mut st, 90);
        let m = pi_mutex(&mut st, low);

        st.sleep_on(m, high, Deadline::Never, WaitData::None).unwrap();
        assert_eq!(cprio(&st, low), 90);
        assert!(st.thread(low).unwrap().state().contains(ThreadState::BOOST));

        let next = st.release_ownership(m, low);
        assert_eq!(next, Some(high));
        assert_eq!(st.synchs.get(m).unwrap().owner(), Some(high));
        assert_eq!(cprio(&st, low), 10);
        assert!(!st.thread(low).unwrap().state().contains(ThreadState::BOOST));
        assert!(st.thread(high).unwrap().state().contains(ThreadState::READY));
    }

    #[test]
    fn test_transitive_boost() {
        let mut st = NucleusState::new(&NucleusConfig::default());
        let t1 = spawn(&mut st, 10);
        let t2 = spawn(&mut st, 20);
        let t3 = spawn(&mut st, 30);
        let m1 = pi_mutex(&mut st, t1);
        let m2 = pi_mutex(&mut st, t2);

        st.sleep_on(m1, t2, Deadline::Never, WaitData::None).unwrap();
        assert_eq!(cprio(&st, t1), 20);
        st.sleep_on(m2, t3, Deadline::Never, WaitData::None).unwrap();
        assert_eq!(cprio(&st, t2), 30);
        assert_eq!(cprio(&st, t1), 30);

        // the top waiter of m2 gives up: both owners fall back
        st.resume_thread(t3, ThreadState::PEND);
        assert_eq!(cprio(&st, t2), 20);
        assert_eq!(cprio(&st, t1), 20);
    }

    #[test]
    fn test_fifo_object_keeps_arrival_order() {
        let mut st = NucleusState::new(&NucleusConfig::default());
        let a = spawn(&mut st, 5);
        let b = spawn(&mut st, 50);
        let sid = st.synch_new(SynchFlags::empty(), SynchKind::Raw);
        st.sleep_on(sid, a, Deadline::Never, WaitData::None).unwrap();
        st.sleep_on(sid, b, Deadline::Never, WaitData::None).unwrap();
        assert_eq!(st.wakeup_one(sid, Completion::Done), Some(a));
        assert_eq!(st.wakeup_one(sid, Completion::Done), Some(b));
        assert_eq!(st.wakeup_one(sid, Completion::Done), None);
    }

    #[test]
    fn test_dreord_keeps_order_on_explicit_renice() {
        let mut st = NucleusState::new(&NucleusConfig::default());
        let a = spawn(&mut st, 10);
        let b = spawn(&mut st, 20);
        let sid = st.synch_new(SynchFlags::PRIO | SynchFlags::DREORD, SynchKind::Raw);
        st.sleep_on(sid, a, Deadline::Never, WaitData::None).unwrap();
        st.sleep_on(sid, b, Deadline::Never, WaitData::None).unwrap();
        st.threads.get_mut(a).unwrap().bprio = 30;
        st.adjust_chain(a, true);
        assert_eq!(cprio(&st, a), 30);
        assert_eq!(st.synchs.get(sid).unwrap().waiters(), alloc::vec![b, a]);
    }

    #[test]
    fn test_destroy_wakes_with_rmid() {
        let mut st = NucleusState::new(&NucleusConfig::default());
        let owner = spawn(&mut st, 1);
        let waiter = spawn(&mut st, 60);
        let m = pi_mutex(&mut st, owner);
        st.sleep_on(m, waiter, Deadline::Never, WaitData::None).unwrap();
        assert!(st.destroy(m).unwrap());
        let w = st.thread(waiter).unwrap();
        assert!(w.info.contains(WakeInfo::RMID));
        assert!(w.state().contains(ThreadState::READY));
        assert_eq!(cprio(&st, owner), 1);
        assert!(st.thread(owner).unwrap().owned.is_empty());
        assert_eq!(st.destroy(m), Err(NucleusError::Deleted));
    }

    #[test]
    fn test_owner_object_through_nucleus() {
        use crate::hal::sim::fixture::{boot, run};

        let (_sim, nucleus) = boot(1);
        let obj = nucleus.synch_create(SynchFlags::PIP);
        let low = run(&nucleus, "low", 10);
        assert_eq!(nucleus.pend(obj, Timeout::Infinite), Ok(Completion::Done));
        assert!(matches!(nucleus.signal(obj), Err(NucleusError::InvalidState { .. })));

        let high = run(&nucleus, "high", 40);
        assert_eq!(
            nucleus.pend(obj, Timeout::Infinite),
            Err(NucleusError::Suspended { thread: high })
        );
        assert_eq!(nucleus.current(0).unwrap(), low);
        assert_eq!(nucleus.synch_owner(obj).unwrap(), Some(low));

        assert_eq!(nucleus.synch_release(obj), Ok(Some(high)));
        assert_eq!(nucleus.current(0).unwrap(), high);
        assert_eq!(nucleus.wait_result(high), Ok(Completion::Done));
        assert_eq!(nucleus.synch_owner(obj).unwrap(), Some(high));
        assert_eq!(nucleus.synch_release(obj), Ok(None));
        assert_eq!(nucleus.synch_release(obj), Err(NucleusError::NotOwner));
    }

    #[test]
    fn test_generic_wakeup_cannot_bypass_mutex() {
        use crate::hal::sim::fixture::{boot, run};

        let (_sim, nucleus) = boot(1);
        let m = nucleus.mutex_create(false, true);
        let a = run(&nucleus, "A", 10);
        nucleus.acquire(m, Timeout::Infinite).unwrap();
        let b = run(&nucleus, "B", 90);
        assert_eq!(
            nucleus.acquire(m, Timeout::Infinite),
            Err(NucleusError::Suspended { thread: b })
        );

        assert!(matches!(nucleus.wakeup_this(m, b), Err(NucleusError::InvalidState { .. })));
        assert!(matches!(nucleus.signal(m), Err(NucleusError::InvalidState { .. })));
        assert!(matches!(nucleus.synch_release(m), Err(NucleusError::InvalidState { .. })));
        assert_eq!(nucleus.wait_result(b), Err(NucleusError::Suspended { thread: b }));
        assert_eq!(nucleus.mutex_owner(m).unwrap(), Some(a));
        assert_eq!(nucleus.synch_waiters(m).unwrap(), alloc::vec![b]);
        assert_eq!(nucleus.current(0).unwrap(), a);

        // a bare owner object refuses a targeted wakeup as well
        let obj = nucleus.synch_create(SynchFlags::PIP);
        nucleus.pend(obj, Timeout::Infinite).unwrap();
        assert!(matches!(nucleus.wakeup_this(obj, b), Err(NucleusError::InvalidState { .. })));
    }

    #[test]
    fn test_typed_waiters_need_their_payload() {
        use crate::hal::sim::fixture::{boot, run};
        use crate::sync::event::EventMode;

        let (_sim, nucleus) = boot(1);
        let ev = nucleus.event_create(0, false);
        let q = nucleus.msgq_create(1, false).unwrap();
        let t = run(&nucleus, "T", 10);

        assert_eq!(
            nucleus.event_wait(ev, 0b1, EventMode::All, Timeout::Infinite),
            Err(NucleusError::Suspended { thread: t })
        );
        assert!(matches!(nucleus.signal(ev), Err(NucleusError::InvalidState { .. })));
        assert!(matches!(nucleus.wakeup_this(ev, t), Err(NucleusError::InvalidState { .. })));
        assert_eq!(nucleus.wait_result(t), Err(NucleusError::Suspended { thread: t }));
        assert_eq!(nucleus.event_signal(ev, 0b1), Ok(1));
        assert_eq!(nucleus.wait_result(t), Ok(Completion::Value(0b1)));

        assert_eq!(
            nucleus.receive(q, Timeout::Infinite),
            Err(NucleusError::Suspended { thread: t })
        );
        assert!(matches!(nucleus.signal(q), Err(NucleusError::InvalidState { .. })));
        assert_eq!(nucleus.flush(q), Ok(true));
        assert_eq!(nucleus.wait_result(t), Err(NucleusError::Interrupted));
        assert_eq!(nucleus.msgq_len(q).unwrap(), 0);
    }

    #[test]
    fn test_wakeup_this_targets_one_waiter() {
        use crate::hal::sim::fixture::{boot, run};

        let (_sim, nucleus) = boot(1);
        let obj = nucleus.synch_create(SynchFlags::PRIO);
        let a = run(&nucleus, "A", 10);
        assert!(nucleus.pend(obj, Timeout::Infinite).is_err());
        let b = run(&nucleus, "B", 20);
        assert!(matches!(nucleus.wakeup_this(obj, b), Err(NucleusError::InvalidState { .. })));
        assert!(nucleus.pend(obj, Timeout::Infinite).is_err());

        nucleus.wakeup_this(obj, a).unwrap();
        assert_eq!(nucleus.wait_result(a), Ok(Completion::Done));
        assert_eq!(nucleus.synch_waiters(obj).unwrap(), alloc::vec![b]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "Invariant violated")]
    fn test_chain_depth_bound() {
        let mut config = NucleusConfig::default();
        config.pi_chain_depth = 2;
        let mut st = NucleusState::new(&config);
        let threads: Vec<ThreadId> = (1..=4).map(|p| spawn(&mut st, p)).collect();
        let mutexes: Vec<SynchId> = threads.iter().map(|&t| pi_mutex(&mut st, t)).collect();
        for i in 1..threads.len() {
            st.sleep_on(mutexes[i - 1], threads[i], Deadline::Never, WaitData::None)
                .unwrap();
        }
    }
}
