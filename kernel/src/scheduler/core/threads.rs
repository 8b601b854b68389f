//! Thread services
//!
//! Lifecycle (create, start, delete), blocking-state control (suspend,
//! resume, unblock), priority and mode changes, and the scheduler
//! controls clients reach through the nucleus. Each service that may
//! change the runnable set ends with a reschedule.

use alloc::format;
use alloc::vec::Vec;

use crate::logger;
use crate::scheduler::core::affinity::CpuMask;
use crate::scheduler::core::error::{NucleusError, NucleusResult};
use crate::scheduler::core::nucleus::Nucleus;
use crate::scheduler::core::policy::SchedClass;
use crate::scheduler::core::state::NucleusState;
use crate::scheduler::queue::PrioQueue;
use crate::scheduler::thread::{
    Finalizer, Thread, ThreadAttr, ThreadId, ThreadSnapshot, ThreadState, WakeInfo,
};
use crate::shadow::host::{HostRequest, HostSignal};
use crate::time::clock::Deadline;

impl NucleusState {
    /// Allocate a DORMANT thread
    pub(crate) fn spawn(&mut self, attr: &ThreadAttr, local_cpu: usize) -> NucleusResult<ThreadId> {
        SchedClass::Rt.check_priority(&self.config, attr.priority)?;
        if attr.quantum == Some(0) {
            return Err(NucleusError::InvalidState { reason: "zero round-robin quantum" });
        }
        let affinity = attr.affinity.intersect(&CpuMask::online(self.config.nr_cpus));
        let cpu = if affinity.is_set(local_cpu) {
            local_cpu
        } else {
            affinity.first().ok_or(NucleusError::InvalidCpu {
                cpu: attr.affinity.first().unwrap_or(self.config.nr_cpus),
            })?
        };

        let tid = self
            .threads
            .insert_with(|tid| Thread::new(tid, attr, SchedClass::Rt, cpu));
        let name = match self.threads.get(tid) {
            Some(th) => th.name.clone(),
            None => return Err(NucleusError::InvalidState { reason: "thread vanished" }),
        };
        if let Err(err) = self.registry.register(&name, tid, self.config.unique_names) {
            self.threads.remove(tid);
            return Err(err);
        }

        let default_quantum = self.config.default_quantum;
        if let Some(th) = self.threads.get_mut(tid) {
            th.affinity = affinity;
            th.state.insert(attr.mode);
            if attr.mode.contains(ThreadState::LOCK) {
                th.lock_depth = 1;
            }
            if attr.quantum.is_some() {
                th.state.insert(ThreadState::RRB);
            } else if attr.mode.contains(ThreadState::RRB) {
                th.rrperiod = Some(default_quantum);
                th.rrcredit = default_quantum;
            }
        }
        Ok(tid)
    }

    pub(crate) fn start_thread(&mut self, tid: ThreadId) -> NucleusResult<()> {
        let th = self.live_thread(tid)?;
        if !th.state.contains(ThreadState::DORMANT) {
            return Err(NucleusError::InvalidState { reason: "thread already started" });
        }
        if let Some(th) = self.threads.get_mut(tid) {
            th.state.insert(ThreadState::STARTED);
            if th.is_shadow() {
                th.state.insert(ThreadState::RELAX);
            }
        }
        self.resume_thread(tid, ThreadState::DORMANT);
        self.started.push(tid);
        logger::debug(&format!("[SCHED] started {}", self.describe(tid)));
        Ok(())
    }

    /// Mark `tid` deleted and unlink it from everything.
    ///
    /// The TCB is reclaimed at once unless it is running, in which case
    /// its CPU reschedules and reclaims it after switching away.
    pub(crate) fn delete_thread(&mut self, tid: ThreadId, kill_host: bool) {
        let Some(th) = self.threads.get(tid) else { return };
        let cpu = th.cpu;
        let state = th.state;
        if state.contains(ThreadState::READY) {
            self.dequeue(tid);
        }
        if state.contains(ThreadState::PEND) {
            self.forget_sleeper(tid);
        }
        if let Some(th) = self.threads.get_mut(tid) {
            let rtimer = th.rtimer.take();
            let ptimer = th.ptimer.take();
            for key in rtimer.into_iter().chain(ptimer.map(|p| p.key)) {
                self.scheds[cpu].timers.cancel(key);
                self.scheds[cpu].timers_dirty = true;
            }
        }
        self.release_all_ownerships(tid);

        let Some(th) = self.threads.get_mut(tid) else { return };
        th.state.remove(ThreadState::READY | ThreadState::PEND | ThreadState::DELAY);
        th.state.insert(ThreadState::ZOMBIE);
        th.wchan = None;
        if kill_host && th.is_shadow() {
            if let Some(pid) = th.host_pid {
                self.host_requests.push(HostRequest::Signal {
                    thread: tid,
                    pid,
                    signal: HostSignal::Kill,
                });
            }
        }

        if self.scheds[cpu].curr == tid {
            self.set_resched(cpu);
        } else {
            self.reclaim(tid);
        }
    }
}

impl Nucleus {
    /// Create a DORMANT RT thread
    pub fn create(&self, attr: ThreadAttr) -> NucleusResult<ThreadId> {
        let mut nk = self.lock();
        let tid = nk.spawn(&attr, self.local_cpu())?;
        self.stats.record_create();
        logger::debug(&format!("[SCHED] created {} prio {}", nk.describe(tid), attr.priority));
        Ok(tid)
    }

    /// Make a DORMANT thread runnable. Shadow threads start relaxed.
    pub fn start(&self, tid: ThreadId) -> NucleusResult<()> {
        let mut nk = self.lock();
        nk.start_thread(tid)?;
        self.schedule(nk);
        Ok(())
    }

    /// Delete a thread, releasing what it owns
    pub fn delete(&self, tid: ThreadId) -> NucleusResult<()> {
        let mut nk = self.lock();
        nk.live_thread(tid)?;
        logger::debug(&format!("[SCHED] deleting {}", nk.describe(tid)));
        nk.delete_thread(tid, true);
        self.schedule(nk);
        Ok(())
    }

    /// Hold a thread; it stays off the CPU until `resume`
    pub fn suspend(&self, tid: ThreadId) -> NucleusResult<()> {
        let mut nk = self.lock();
        nk.live_thread(tid)?;
        nk.suspend_thread(tid, ThreadState::SUSP, Deadline::Never);
        self.schedule(nk);
        Ok(())
    }

    /// Lift a hold placed by `suspend`
    pub fn resume(&self, tid: ThreadId) -> NucleusResult<()> {
        let mut nk = self.lock();
        nk.live_thread(tid)?;
        nk.resume_thread(tid, ThreadState::SUSP);
        self.schedule(nk);
        Ok(())
    }

    /// Abort a PEND or DELAY wait; the thread resumes with `Interrupted`.
    /// Returns false when it was not waiting.
    pub fn unblock(&self, tid: ThreadId) -> NucleusResult<bool> {
        let mut nk = self.lock();
        let th = nk.live_thread(tid)?;
        if !th.state.intersects(ThreadState::PEND | ThreadState::DELAY) {
            return Ok(false);
        }
        if let Some(th) = nk.threads.get_mut(tid) {
            th.info.insert(WakeInfo::BREAK);
        }
        nk.resume_thread(tid, ThreadState::PEND | ThreadState::DELAY);
        self.schedule(nk);
        Ok(true)
    }

    /// Change the base priority; a boost in effect is preserved
    pub fn set_priority(&self, tid: ThreadId, prio: i32) -> NucleusResult<()> {
        let mut nk = self.lock();
        let th = nk.live_thread(tid)?;
        if th.state.contains(ThreadState::DORMANT) {
            return Err(NucleusError::InvalidState { reason: "thread not started" });
        }
        SchedClass::Rt.check_priority(&nk.config, prio)?;
        if let Some(th) = nk.threads.get_mut(tid) {
            th.bprio = prio;
        }
        nk.adjust_chain(tid, true);
        self.schedule(nk);
        Ok(())
    }

    /// Clear then set mode bits (LOCK, RRB, WARNSW). Returns the
    /// previous mode.
    pub fn set_mode(
        &self,
        tid: ThreadId,
        clear: ThreadState,
        set: ThreadState,
    ) -> NucleusResult<ThreadState> {
        let mut nk = self.lock();
        nk.live_thread(tid)?;
        let default_quantum = nk.config.default_quantum;
        let Some(th) = nk.threads.get_mut(tid) else {
            return Err(NucleusError::InvalidState { reason: "thread vanished" });
        };
        let old = th.state & ThreadState::MODE_BITS;
        th.state.remove(clear & ThreadState::MODE_BITS);
        th.state.insert(set & ThreadState::MODE_BITS);

        if th.state.contains(ThreadState::LOCK) {
            th.lock_depth = th.lock_depth.max(1);
        } else {
            th.lock_depth = 0;
        }
        if th.state.contains(ThreadState::RRB) && !old.contains(ThreadState::RRB) {
            let period = *th.rrperiod.get_or_insert(default_quantum);
            th.rrcredit = period;
        }
        self.schedule(nk);
        Ok(old)
    }

    /// Move the current thread to the tail of its priority band
    pub fn yield_now(&self) -> NucleusResult<()> {
        let mut nk = self.lock();
        let curr = nk.sched(self.local_cpu())?.current();
        if !nk.threads.checked(curr)?.is_root() {
            nk.putback(curr);
        }
        self.schedule(nk);
        Ok(())
    }

    /// Disable preemption of the current thread (nests)
    pub fn lock_sched(&self) -> NucleusResult<()> {
        let mut nk = self.lock();
        let curr = nk.current_blockable(self.local_cpu())?;
        if let Some(th) = nk.threads.get_mut(curr) {
            th.lock_depth += 1;
            th.state.insert(ThreadState::LOCK);
        }
        Ok(())
    }

    /// Re-enable preemption once the outermost lock is dropped; a
    /// reschedule deferred meanwhile happens here.
    pub fn unlock_sched(&self) -> NucleusResult<()> {
        let mut nk = self.lock();
        let curr = nk.current_blockable(self.local_cpu())?;
        let Some(th) = nk.threads.get_mut(curr) else {
            return Err(NucleusError::InvalidState { reason: "thread vanished" });
        };
        if th.lock_depth == 0 {
            return Err(NucleusError::InvalidState { reason: "scheduler not locked" });
        }
        th.lock_depth -= 1;
        if th.lock_depth == 0 {
            th.state.remove(ThreadState::LOCK);
            self.schedule(nk);
        }
        Ok(())
    }

    /// Round-robin the threads of band `prio` on the local CPU
    pub fn rotate_readyq(&self, prio: i32) -> NucleusResult<()> {
        let cpu = self.local_cpu();
        let mut nk = self.lock();
        SchedClass::Rt.check_priority(&nk.config, prio)?;
        let curr = nk.sched(cpu)?.current();
        let th = nk.threads.checked(curr)?;
        let target = if !th.is_root() && th.cprio == prio && th.state.is_runnable() {
            Some(curr)
        } else {
            nk.scheds[cpu].readyq.first_at(prio)
        };
        if let Some(tid) = target {
            nk.putback(tid);
        }
        self.schedule(nk);
        Ok(())
    }

    /// Enable time slicing with `quantum` ticks for every RT thread
    pub fn activate_rr(&self, quantum: u64) -> NucleusResult<()> {
        if quantum == 0 {
            return Err(NucleusError::InvalidState { reason: "zero round-robin quantum" });
        }
        let mut nk = self.lock();
        for tid in nk.threads.handles() {
            if let Some(th) = nk.threads.get_mut(tid) {
                if th.is_root() || th.state.contains(ThreadState::ZOMBIE) {
                    continue;
                }
                th.rrperiod = Some(quantum);
                th.rrcredit = quantum;
                th.state.insert(ThreadState::RRB);
            }
        }
        let cpus = nk.scheds.len();
        for cpu in 0..cpus {
            nk.scheds[cpu].timers_dirty = true;
        }
        self.unlock(nk);
        Ok(())
    }

    /// Disable time slicing for every RT thread
    pub fn deactivate_rr(&self) {
        let mut nk = self.lock();
        for tid in nk.threads.handles() {
            if let Some(th) = nk.threads.get_mut(tid) {
                th.state.remove(ThreadState::RRB);
            }
        }
        self.unlock(nk);
    }

    /// Restrict the CPUs `tid` may run on, moving it if needed
    pub fn set_affinity(&self, tid: ThreadId, mask: CpuMask) -> NucleusResult<()> {
        let local = self.local_cpu();
        let mut nk = self.lock();
        let th = nk.live_thread(tid)?;
        let online = mask.intersect(&CpuMask::online(nk.config.nr_cpus));
        let Some(target) = online.first() else {
            return Err(NucleusError::InvalidCpu {
                cpu: mask.first().unwrap_or(nk.config.nr_cpus),
            });
        };
        let cpu = th.cpu;
        if !online.is_set(cpu) && nk.scheds[cpu].curr == tid && cpu != local {
            return Err(NucleusError::InvalidState { reason: "thread running on another CPU" });
        }
        if let Some(th) = nk.threads.get_mut(tid) {
            th.affinity = online;
        }
        if !online.is_set(cpu) {
            nk.move_thread(tid, target);
        }
        self.schedule(nk);
        Ok(())
    }

    /// Move the current thread to `cpu`
    pub fn migrate(&self, cpu: usize) -> NucleusResult<()> {
        let local = self.local_cpu();
        let mut nk = self.lock();
        let curr = nk.current_blockable(local)?;
        nk.sched(cpu)?;
        let th = nk.threads.checked(curr)?;
        if th.state.contains(ThreadState::LOCK) {
            return Err(NucleusError::InvalidState { reason: "migration with the scheduler locked" });
        }
        if !th.affinity.is_set(cpu) {
            return Err(NucleusError::InvalidCpu { cpu });
        }
        nk.move_thread(curr, cpu);
        self.schedule(nk);
        Ok(())
    }

    /// Snapshot of a thread's control block
    pub fn info(&self, tid: ThreadId) -> NucleusResult<ThreadSnapshot> {
        let nk = self.lock();
        let running = nk.is_current(tid);
        Ok(nk.threads.checked(tid)?.snapshot(running))
    }

    /// Snapshots of every thread, root threads included
    pub fn threads(&self) -> Vec<ThreadSnapshot> {
        let nk = self.lock();
        nk.threads
            .handles()
            .into_iter()
            .filter_map(|tid| {
                let running = nk.is_current(tid);
                nk.threads.checked(tid).ok().map(|th| th.snapshot(running))
            })
            .collect()
    }

    /// Thread running on `cpu`
    pub fn current(&self, cpu: usize) -> NucleusResult<ThreadId> {
        Ok(self.lock().sched(cpu)?.current())
    }

    /// Thread registered under `name`
    pub fn lookup(&self, name: &str) -> Option<ThreadId> {
        self.lock().registry.lookup(name)
    }

    /// Run `finalizer` once the TCB of `tid` is reclaimed
    pub fn set_finalizer(&self, tid: ThreadId, finalizer: Finalizer) -> NucleusResult<()> {
        let mut nk = self.lock();
        nk.live_thread(tid)?;
        if let Some(th) = nk.threads.get_mut(tid) {
            th.finalizer = Some(finalizer);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicUsize, Ordering};

    use crate::hal::sim::fixture::{boot, run};

    #[test]
    fn test_start_preempts_lower_priority() {
        let (_sim, nucleus) = boot(1);
        let a = run(&nucleus, "a", 10);
        assert_eq!(nucleus.current(0).unwrap(), a);
        let b = run(&nucleus, "b", 20);
        assert_eq!(nucleus.current(0).unwrap(), b);
        // a was preempted: it heads its band again
        assert_eq!(nucleus.inspect(|st| st.sched(0).unwrap().ready()), alloc::vec![a]);
    }

    #[test]
    fn test_create_rejects_bad_priority() {
        let (_sim, nucleus) = boot(1);
        let err = nucleus.create(ThreadAttr::new("x", 300)).unwrap_err();
        assert_eq!(err, NucleusError::InvalidPriority { value: 300, min: 0, max: 257 });
        let err = nucleus
            .create(ThreadAttr::new("y", 1).with_affinity(CpuMask::single(5)))
            .unwrap_err();
        assert_eq!(err, NucleusError::InvalidCpu { cpu: 5 });
    }

    #[test]
    fn test_set_priority_on_dormant_fails() {
        let (_sim, nucleus) = boot(1);
        let t = nucleus.create(ThreadAttr::new("t", 5)).unwrap();
        assert!(matches!(
            nucleus.set_priority(t, 7),
            Err(NucleusError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_suspend_and_pend_are_independent() {
        let (_sim, nucleus) = boot(1);
        let t = run(&nucleus, "t", 5);
        nucleus.suspend(t).unwrap();
        assert!(nucleus.current(0).unwrap() != t);
        nucleus.suspend(t).unwrap();
        nucleus.resume(t).unwrap();
        assert_eq!(nucleus.current(0).unwrap(), t);
    }

    #[test]
    fn test_delete_runs_finalizer_and_hooks() {
        let (_sim, nucleus) = boot(1);
        let finalized = Arc::new(AtomicUsize::new(0));
        let hooked = Arc::new(AtomicUsize::new(0));
        let h = hooked.clone();
        nucleus.add_delete_hook(alloc::boxed::Box::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));

        let low = run(&nucleus, "low", 1);
        let high = run(&nucleus, "high", 2);
        let f = finalized.clone();
        nucleus
            .set_finalizer(low, alloc::boxed::Box::new(move |_| {
                f.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        nucleus.delete(low).unwrap();
        assert_eq!(finalized.load(Ordering::SeqCst), 1);

        // a running thread is reclaimed after the switch away from it
        nucleus.delete(high).unwrap();
        assert_eq!(hooked.load(Ordering::SeqCst), 2);
        assert!(nucleus.info(high).is_err());
        assert!(nucleus.inspect(|st| st.sched(0).unwrap().is_idle()));
        assert_eq!(nucleus.stats().live_threads(), 0);
    }

    #[test]
    fn test_lock_defers_preemption() {
        let (_sim, nucleus) = boot(1);
        let low = run(&nucleus, "low", 1);
        nucleus.lock_sched().unwrap();
        nucleus.lock_sched().unwrap();
        let high = run(&nucleus, "high", 50);
        assert_eq!(nucleus.current(0).unwrap(), low);
        nucleus.unlock_sched().unwrap();
        assert_eq!(nucleus.current(0).unwrap(), low);
        nucleus.unlock_sched().unwrap();
        assert_eq!(nucleus.current(0).unwrap(), high);
        assert!(nucleus.unlock_sched().is_err());
    }

    #[test]
    fn test_yield_rotates_band() {
        let (_sim, nucleus) = boot(1);
        let a = run(&nucleus, "a", 10);
        let b = run(&nucleus, "b", 10);
        assert_eq!(nucleus.current(0).unwrap(), a);
        nucleus.yield_now().unwrap();
        assert_eq!(nucleus.current(0).unwrap(), b);
        nucleus.rotate_readyq(10).unwrap();
        assert_eq!(nucleus.current(0).unwrap(), a);
    }

    #[test]
    fn test_migrate_current() {
        let (sim, nucleus) = boot(2);
        let t = run(&nucleus, "t", 10);
        assert_eq!(nucleus.current(0).unwrap(), t);
        nucleus.migrate(1).unwrap();
        assert!(sim.ipis().contains(&1));
        sim.set_cpu(1);
        nucleus.handle_ipi();
        assert_eq!(nucleus.current(1).unwrap(), t);
        assert_eq!(nucleus.info(t).unwrap().cpu, 1);
        assert!(nucleus.inspect(|st| st.sched(0).unwrap().is_idle()));
    }

    #[test]
    fn test_start_and_switch_hooks() {
        let (_sim, nucleus) = boot(1);
        let started = Arc::new(spin::Mutex::new(Vec::new()));
        let switched = Arc::new(spin::Mutex::new(Vec::new()));
        let s = started.clone();
        nucleus.add_start_hook(alloc::boxed::Box::new(move |tid| s.lock().push(tid)));
        let w = switched.clone();
        nucleus.add_switch_hook(alloc::boxed::Box::new(move |prev, next| {
            w.lock().push((prev, next));
        }));

        let root = nucleus.inspect(|st| st.sched(0).unwrap().root());
        let t = run(&nucleus, "t", 10);
        assert_eq!(*started.lock(), alloc::vec![t]);
        assert_eq!(*switched.lock(), alloc::vec![(root, t)]);
    }

    #[test]
    fn test_delete_hook_may_reenter() {
        let (_sim, nucleus) = boot(1);
        let nucleus = Arc::new(nucleus);
        let victim = run(&nucleus, "victim", 10);
        let buddy = run(&nucleus, "buddy", 5);
        let seen = Arc::new(spin::Mutex::new(Vec::new()));

        let weak = Arc::downgrade(&nucleus);
        let s = seen.clone();
        nucleus.add_delete_hook(alloc::boxed::Box::new(move |tid| {
            s.lock().push(tid);
            if tid == victim {
                if let Some(n) = weak.upgrade() {
                    assert_eq!(n.delete(buddy), Ok(()));
                }
            }
        }));

        nucleus.delete(victim).unwrap();
        assert_eq!(*seen.lock(), alloc::vec![victim, buddy]);
        assert!(nucleus.info(buddy).is_err());
        assert_eq!(nucleus.stats().live_threads(), 0);
    }

    #[test]
    fn test_round_robin_switch_off() {
        let (sim, nucleus) = boot(1);
        assert!(nucleus.activate_rr(0).is_err());
        let a = run(&nucleus, "a", 50);
        let b = run(&nucleus, "b", 50);
        nucleus.activate_rr(2).unwrap();
        assert!(nucleus.info(b).unwrap().state.contains(ThreadState::RRB));
        for _ in 0..2 {
            sim.advance(1);
            nucleus.tick_handler();
        }
        assert_eq!(nucleus.current(0).unwrap(), b);

        nucleus.deactivate_rr();
        assert!(!nucleus.info(a).unwrap().state.contains(ThreadState::RRB));
        for _ in 0..4 {
            sim.advance(1);
            nucleus.tick_handler();
        }
        assert_eq!(nucleus.current(0).unwrap(), b);
    }

    #[test]
    fn test_set_affinity_moves_ready_thread() {
        let (sim, nucleus) = boot(2);
        let _high = run(&nucleus, "high", 20);
        let low = run(&nucleus, "low", 10);
        assert_eq!(
            nucleus.set_affinity(low, CpuMask::single(5)),
            Err(NucleusError::InvalidCpu { cpu: 5 })
        );

        nucleus.set_affinity(low, CpuMask::single(1)).unwrap();
        assert_eq!(nucleus.info(low).unwrap().cpu, 1);
        assert!(nucleus.inspect(|st| st.sched(1).unwrap().resched_pending()));
        assert!(sim.ipis().contains(&1));

        sim.set_cpu(1);
        nucleus.handle_ipi();
        assert_eq!(nucleus.current(1).unwrap(), low);
        assert!(!nucleus.inspect(|st| st.sched(1).unwrap().resched_pending()));
    }

    #[test]
    fn test_registry_lookup() {
        let (_sim, nucleus) = boot(1);
        let t = nucleus.create(ThreadAttr::new("rx-task", 3)).unwrap();
        assert_eq!(nucleus.lookup("rx-task"), Some(t));
        nucleus.delete(t).unwrap();
        assert_eq!(nucleus.lookup("rx-task"), None);
    }
}
