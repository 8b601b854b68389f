//! Shadow threads and domain migration
//!
//! A shadow thread is an RT thread mirrored by a host task. It runs in
//! the primary domain, where this nucleus schedules it, or relaxed in
//! the secondary domain, where the host scheduler does. A relaxed thread
//! carries the RELAX blocking bit so it is never picked here, while its
//! priority and the mutexes it owns keep being tracked by its TCB.
//!
//! `relax` is issued by the thread itself while current. `harden` is
//! issued by the host task on its way back, so it names the thread
//! explicitly.

pub mod host;

pub use host::{HostBridge, HostSignal, RelaxReason};

use alloc::format;

use crate::hal::trap::{TrapFrame, TrapHandler, TrapVerdict};
use crate::logger;
use crate::scheduler::core::error::{NucleusError, NucleusResult};
use crate::scheduler::core::nucleus::Nucleus;
use crate::scheduler::core::state::NucleusState;
use crate::scheduler::thread::{ThreadAttr, ThreadId, ThreadState, WakeInfo};
use crate::time::clock::Deadline;
use host::HostRequest;

impl NucleusState {
    /// Move shadow `tid` to the secondary domain and hand it to the host
    pub(crate) fn relax_thread(&mut self, tid: ThreadId, reason: RelaxReason) -> NucleusResult<()> {
        let th = self.threads.checked_mut(tid)?;
        if !th.is_shadow() {
            return Err(NucleusError::InvalidState { reason: "relax from a non-shadow thread" });
        }
        let reported = if th.state.contains(ThreadState::BOOST) {
            logger::warn(&format!(
                "[SHADOW] {}({}) relaxes while boosted to {} (base {})",
                th.name, tid, th.cprio, th.bprio
            ));
            RelaxReason::PrioInversion
        } else {
            reason
        };
        th.relax_reason = Some(reason);
        th.info.remove(WakeInfo::KICKED);
        th.stats.ssw += 1;
        let (pid, prio) = (th.host_pid, th.cprio);
        let warnsw = th.state.contains(ThreadState::WARNSW);

        self.suspend_thread(tid, ThreadState::RELAX, Deadline::Never);
        if let Some(pid) = pid {
            self.host_requests.push(HostRequest::Renice { pid, prio });
            self.host_requests.push(HostRequest::Wake { thread: tid, pid });
            if warnsw {
                self.host_requests.push(HostRequest::Signal {
                    thread: tid,
                    pid,
                    signal: HostSignal::Debug(reported),
                });
            }
        }
        Ok(())
    }
}

impl Nucleus {
    /// Create and start a shadow thread for host task `pid`. The thread
    /// starts relaxed; the host task hardens it when it first needs the
    /// primary domain.
    pub fn map_shadow(&self, attr: ThreadAttr, pid: u32) -> NucleusResult<ThreadId> {
        let mut nk = self.lock();
        let tid = nk.spawn(&attr, self.local_cpu())?;
        if let Some(th) = nk.threads.get_mut(tid) {
            th.state.insert(ThreadState::SHADOW);
            th.host_pid = Some(pid);
        }
        self.stats.record_create();
        nk.start_thread(tid)?;
        logger::debug(&format!("[SHADOW] mapped {} to host pid {}", nk.describe(tid), pid));
        self.unlock(nk);
        Ok(tid)
    }

    /// Drop the current shadow thread to the secondary domain
    pub fn relax(&self, reason: RelaxReason) -> NucleusResult<()> {
        let mut nk = self.lock();
        let tid = nk.current_blockable(self.local_cpu())?;
        nk.relax_thread(tid, reason)?;
        self.stats.record_mode_switch();
        logger::debug(&format!("[SHADOW] {} relaxed ({})", nk.describe(tid), reason));
        self.schedule(nk);
        Ok(())
    }

    /// Bring relaxed shadow `tid` back to the primary domain.
    ///
    /// A no-op for a thread already in primary mode. The thread competes
    /// for its CPU like any other; until it is picked the call returns
    /// `Suspended`.
    pub fn harden(&self, tid: ThreadId) -> NucleusResult<()> {
        let mut nk = self.lock();
        let th = nk.live_thread(tid)?;
        if !th.is_shadow() {
            return Err(NucleusError::InvalidState { reason: "harden from a non-shadow context" });
        }
        if !th.state.contains(ThreadState::RELAX) {
            return Ok(());
        }
        if let Some(th) = nk.threads.get_mut(tid) {
            th.relax_reason = None;
            th.stats.ssw += 1;
        }
        nk.resume_thread(tid, ThreadState::RELAX);
        // Claims may have changed while the thread ran unboosted
        nk.adjust_chain(tid, false);
        self.stats.record_mode_switch();
        logger::debug(&format!("[SHADOW] {} hardening", nk.describe(tid)));
        self.schedule(nk);

        if self.inspect(|st| st.is_current(tid)) {
            Ok(())
        } else {
            Err(NucleusError::Suspended { thread: tid })
        }
    }

    /// The host task of shadow `tid` exited: drop the TCB
    pub fn host_exit(&self, tid: ThreadId) -> NucleusResult<()> {
        let mut nk = self.lock();
        if !nk.live_thread(tid)?.is_shadow() {
            return Err(NucleusError::InvalidState { reason: "not a shadow thread" });
        }
        logger::debug(&format!("[SHADOW] host task of {} exited", nk.describe(tid)));
        nk.delete_thread(tid, false);
        self.schedule(nk);
        Ok(())
    }

    /// Host signal pending for a primary shadow: abort its wait, if any,
    /// and make its next wait attempt fail with `Interrupted` so it
    /// reaches a relax point. Returns false when already relaxed.
    pub fn kick(&self, tid: ThreadId) -> NucleusResult<bool> {
        let mut nk = self.lock();
        let th = nk.live_thread(tid)?;
        if !th.is_shadow() {
            return Err(NucleusError::InvalidState { reason: "not a shadow thread" });
        }
        if th.state.contains(ThreadState::RELAX) {
            return Ok(false);
        }
        let waiting = th.state.intersects(ThreadState::PEND | ThreadState::DELAY);
        let cpu = th.cpu;
        if let Some(th) = nk.threads.get_mut(tid) {
            th.info.insert(WakeInfo::KICKED);
            if waiting {
                th.info.insert(WakeInfo::BREAK);
            }
        }
        if waiting {
            nk.resume_thread(tid, ThreadState::PEND | ThreadState::DELAY);
        } else if nk.is_current(tid) {
            nk.set_resched(cpu);
        }
        self.schedule(nk);
        Ok(true)
    }

    /// Install (or remove) the handler of `trap`, returning the previous one
    pub fn catch_exception(
        &self,
        trap: u32,
        handler: Option<TrapHandler>,
    ) -> NucleusResult<Option<TrapHandler>> {
        self.traps.lock().catch_exception(trap, handler)
    }

    /// Fault entry point for the local CPU.
    ///
    /// A registered handler decides first. Otherwise a primary shadow is
    /// relaxed so the host handles the fault, a kernel RT thread is
    /// suspended, and a fault in the root context goes to the host.
    pub fn handle_trap(&self, trap: u32, frame: &TrapFrame) -> TrapVerdict {
        self.stats.record_fault();
        let handler = self.traps.lock().handler(trap);
        if let Some(handler) = handler {
            return handler(trap, frame);
        }

        let cpu = self.local_cpu();
        let mut nk = self.lock();
        let Ok(curr) = nk.sched(cpu).map(|s| s.current()) else {
            return TrapVerdict::Propagate;
        };
        let Some(th) = nk.threads.get_mut(curr) else {
            return TrapVerdict::Propagate;
        };
        if th.is_root() {
            return TrapVerdict::Propagate;
        }
        th.stats.faults += 1;
        let shadow = th.is_shadow();
        logger::warn(&format!(
            "[TRAP] {}({}) trap {} at pc {:#x}, addr {:#x}",
            th.name, curr, trap, frame.pc, frame.fault_addr
        ));

        if shadow {
            if nk.relax_thread(curr, RelaxReason::Fault).is_ok() {
                self.stats.record_mode_switch();
            }
            self.schedule(nk);
            TrapVerdict::Propagate
        } else {
            nk.suspend_thread(curr, ThreadState::SUSP, Deadline::Never);
            self.schedule(nk);
            TrapVerdict::Stop
        }
    }
}
