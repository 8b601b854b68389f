//! Nucleus - the scheduler service object
//!
//! Owns the global state behind a single lock taken with interrupts
//! disabled (`NkGuard`), plus the platform handles. Every service that
//! may change which thread should run ends in [`Nucleus::schedule`],
//! which decides the switch under the lock, drops the lock, performs
//! the switch through the platform and then finishes the bookkeeping.
//!
//! # Blocking calls
//! A blocking service returns once `switch_context` returns. On a real
//! platform that means the caller has been switched back in; on a
//! platform where the switch returns at once the caller is still
//! blocked and gets `NucleusError::Suspended`, the outcome being
//! available later through [`Nucleus::wait_result`].

use alloc::boxed::Box;
use alloc::format;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::ops::{Deref, DerefMut};

use spin::{Mutex, MutexGuard};

use crate::config::NucleusConfig;
use crate::hal::{IrqFlags, Platform, TrapTable};
use crate::logger;
use crate::scheduler::core::error::{NucleusError, NucleusResult};
use crate::scheduler::core::state::{Deferred, NucleusState};
use crate::scheduler::core::statistics::NucleusStats;
use crate::scheduler::realtime::latency::LatencyTracker;
use crate::scheduler::thread::{Completion, ThreadId, ThreadState, WakeInfo};
use crate::scheduler::thread::thread::WaitData;

/// Hook run with a thread handle (start, delete)
pub type ThreadHook = Box<dyn Fn(ThreadId) + Send + Sync>;

/// Hook run on every context switch, with `(prev, next)`
pub type SwitchHook = Box<dyn Fn(ThreadId, ThreadId) + Send + Sync>;

/// Registered hooks. Callers copy a list out before running it, so a
/// hook may re-enter the nucleus or register further hooks.
#[derive(Default)]
struct Hooks {
    start: Vec<Arc<dyn Fn(ThreadId) + Send + Sync>>,
    switch: Vec<Arc<dyn Fn(ThreadId, ThreadId) + Send + Sync>>,
    delete: Vec<Arc<dyn Fn(ThreadId) + Send + Sync>>,
}

/// Puts back the interrupt state saved by `Nucleus::lock`
struct IrqRestore<'a> {
    platform: &'a Platform,
    flags: IrqFlags,
}

impl Drop for IrqRestore<'_> {
    fn drop(&mut self) {
        self.platform.hal.irq_restore(self.flags);
    }
}

/// Nucleus lock guard: interrupts stay disabled while it is held.
pub(crate) struct NkGuard<'a> {
    // Fields drop in declaration order: unlock, then restore interrupts
    guard: MutexGuard<'a, NucleusState>,
    _irq: IrqRestore<'a>,
}

impl Deref for NkGuard<'_> {
    type Target = NucleusState;

    fn deref(&self) -> &NucleusState {
        &self.guard
    }
}

impl DerefMut for NkGuard<'_> {
    fn deref_mut(&mut self) -> &mut NucleusState {
        &mut self.guard
    }
}

/// Real-time nucleus
pub struct Nucleus {
    config: NucleusConfig,
    platform: Platform,
    state: Mutex<NucleusState>,
    hooks: Mutex<Hooks>,
    pub(crate) traps: Mutex<TrapTable>,
    pub(crate) latency: LatencyTracker,
    pub(crate) stats: NucleusStats,
}

impl Nucleus {
    /// Build a nucleus with one scheduler and root thread per CPU
    pub fn new(config: NucleusConfig, platform: Platform) -> NucleusResult<Self> {
        config.validate()?;
        let state = NucleusState::new(&config);
        logger::info(&format!(
            "[NUCLEUS] {} CPU(s), RT priorities {}..={}, {:?} timer",
            config.nr_cpus, config.rt_prio_min, config.rt_prio_max, config.timer_mode
        ));
        Ok(Self {
            config,
            platform,
            state: Mutex::new(state),
            hooks: Mutex::new(Hooks::default()),
            traps: Mutex::new(TrapTable::new()),
            latency: LatencyTracker::new(),
            stats: NucleusStats::new(),
        })
    }

    pub fn config(&self) -> &NucleusConfig {
        &self.config
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn stats(&self) -> &NucleusStats {
        &self.stats
    }

    pub fn latency(&self) -> &LatencyTracker {
        &self.latency
    }

    /// Take the nucleus lock with interrupts off
    pub(crate) fn lock(&self) -> NkGuard<'_> {
        let flags = self.platform.hal.irq_save();
        NkGuard {
            guard: self.state.lock(),
            _irq: IrqRestore { platform: &self.platform, flags },
        }
    }

    /// Run `f` on a consistent view of the state
    pub fn inspect<R>(&self, f: impl FnOnce(&NucleusState) -> R) -> R {
        let nk = self.lock();
        f(&nk)
    }

    pub(crate) fn local_cpu(&self) -> usize {
        self.platform.hal.current_cpu()
    }

    pub(crate) fn now(&self) -> u64 {
        self.platform.clock.read_ticks()
    }

    /// Drop the lock without rescheduling, then flush deferred work
    pub(crate) fn unlock(&self, mut nk: NkGuard<'_>) {
        let deferred = nk.take_deferred(self.local_cpu(), self.now());
        drop(nk);
        self.run_deferred(deferred);
    }

    /// Reschedule the local CPU if needed and kick remote ones.
    pub(crate) fn schedule(&self, mut nk: NkGuard<'_>) {
        let cpu = self.local_cpu();
        let now = self.now();
        let plan = nk.prepare_switch(cpu);
        let deferred = nk.take_deferred(cpu, now);
        drop(nk);
        self.run_deferred(deferred);

        let Some(plan) = plan else { return };
        self.stats.record_switch();
        self.platform.hal.switch_context(plan.cpu, plan.prev, plan.next);

        let mut nk = self.lock();
        nk.finish_switch(cpu);
        let deferred = nk.take_deferred(cpu, self.now());
        drop(nk);
        let switch_hooks = self.hooks.lock().switch.clone();
        for hook in switch_hooks.iter() {
            hook(plan.prev, plan.next);
        }
        self.run_deferred(deferred);
    }

    fn run_deferred(&self, deferred: Deferred) {
        for cpu in deferred.ipis {
            self.platform.hal.request_reschedule(cpu);
        }
        for (cpu, delay) in deferred.programs {
            self.platform.clock.program_next_tick(cpu, delay);
        }
        for request in deferred.host {
            request.deliver(self.platform.host.as_ref());
        }
        if !deferred.started.is_empty() {
            let start_hooks = self.hooks.lock().start.clone();
            for tid in deferred.started {
                for hook in start_hooks.iter() {
                    hook(tid);
                }
            }
        }
        if !deferred.reclaimed.is_empty() {
            self.stats.record_destroy(deferred.reclaimed.len());
            let delete_hooks = self.hooks.lock().delete.clone();
            for reclaimed in deferred.reclaimed {
                for hook in delete_hooks.iter() {
                    hook(reclaimed.thread);
                }
                if let Some(finalizer) = reclaimed.finalizer {
                    finalizer(reclaimed.thread);
                }
            }
        }
    }

    /// Reschedule IPI entry point, called on the target CPU
    pub fn handle_ipi(&self) {
        let nk = self.lock();
        self.schedule(nk);
    }

    /// Block the caller: switch away, then decode why it woke up
    pub(crate) fn block(&self, nk: NkGuard<'_>, tid: ThreadId) -> NucleusResult<Completion> {
        self.schedule(nk);
        self.wait_result(tid)
    }

    /// Outcome of the last wait of `tid`.
    ///
    /// `Suspended` while the thread is still blocked. Otherwise the wake
    /// reason: `Deleted`, `TimedOut`, `Interrupted`, or the completion
    /// left by whoever satisfied the wait.
    pub fn wait_result(&self, tid: ThreadId) -> NucleusResult<Completion> {
        let mut nk = self.lock();
        let th = nk.threads.checked_mut(tid)?;
        if th.state.intersects(ThreadState::BLOCK_BITS) {
            return Err(NucleusError::Suspended { thread: tid });
        }
        let info = th.info;
        if th.wait == WaitData::Sleep {
            // Timing out is how a sleep normally ends
            if info.contains(WakeInfo::BREAK) {
                return Err(NucleusError::Interrupted);
            }
            return Ok(Completion::Done);
        }
        if info.contains(WakeInfo::RMID) {
            return Err(NucleusError::Deleted);
        }
        if info.contains(WakeInfo::TIMEO) {
            return Err(NucleusError::TimedOut);
        }
        if info.contains(WakeInfo::BREAK) {
            return Err(NucleusError::Interrupted);
        }
        Ok(th.completion.clone().unwrap_or(Completion::Done))
    }

    // ─── Hooks ──────────────────────────────────────────────────────

    /// Run `hook` each time a thread is started
    pub fn add_start_hook(&self, hook: ThreadHook) {
        self.hooks.lock().start.push(Arc::from(hook));
    }

    /// Run `hook` after each context switch
    pub fn add_switch_hook(&self, hook: SwitchHook) {
        self.hooks.lock().switch.push(Arc::from(hook));
    }

    /// Run `hook` when a deleted thread is reclaimed
    pub fn add_delete_hook(&self, hook: ThreadHook) {
        self.hooks.lock().delete.push(Arc::from(hook));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use crate::hal::sim::SimPlatform;
    use static_assertions::assert_impl_all;

    assert_impl_all!(Nucleus: Send, Sync);

    #[test]
    fn test_lock_disables_interrupts() {
        let sim = Arc::new(SimPlatform::new());
        let nucleus = Nucleus::new(NucleusConfig::default(), Platform::from_shared(sim.clone())).unwrap();
        {
            let _nk = nucleus.lock();
            assert!(!sim.irqs_enabled());
            assert!(nucleus.state.try_lock().is_none());
        }
        assert!(sim.irqs_enabled());
        assert!(nucleus.state.try_lock().is_some());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let sim = Arc::new(SimPlatform::new());
        let res = Nucleus::new(NucleusConfig::smp(0), Platform::from_shared(sim));
        assert!(res.is_err());
    }

    #[test]
    fn test_idle_cpu_has_nothing_to_switch() {
        let sim = Arc::new(SimPlatform::new());
        let nucleus = Nucleus::new(NucleusConfig::smp(2), Platform::from_shared(sim.clone())).unwrap();
        nucleus.handle_ipi();
        assert!(sim.switches().is_empty());
        let root = nucleus.inspect(|st| st.sched(1).map(|s| s.current()));
        assert!(root.is_ok());
    }
}
