//! Time management subsystem
//!
//! Timed sleeps, periodic threads and the tick handler. Each CPU owns a
//! timer queue holding the wait timeouts and release points of the
//! threads it schedules; the clock source calls `tick_handler` on that
//! CPU either periodically or at the date programmed for the next shot.

pub mod clock;
pub mod timer;

pub use clock::{ClockSource, Timeout};
pub use timer::{TimerEvent, TimerKey, TimerQueue};

use alloc::vec::Vec;

use crate::scheduler::core::error::{NucleusError, NucleusResult};
use crate::scheduler::core::nucleus::Nucleus;
use crate::scheduler::core::state::NucleusState;
use crate::scheduler::thread::thread::{PeriodicTimer, WaitData};
use crate::scheduler::thread::{Completion, ThreadId, ThreadState, WakeInfo};
use clock::Deadline;

impl NucleusState {
    /// Fire every timer of `cpu` due at `now`. Returns the due dates of
    /// the fired timers.
    pub(crate) fn fire_timers(&mut self, cpu: usize, now: u64) -> Vec<u64> {
        let mut fired = Vec::new();
        while let Some((key, event)) = self.scheds[cpu].timers.pop_expired(now) {
            fired.push(key.date());
            self.scheds[cpu].timers_dirty = true;
            self.scheds[cpu].stats.timer_fires += 1;
            match event {
                TimerEvent::Timeout(tid) => self.timeout_expired(tid, key),
                TimerEvent::Periodic(tid) => self.release_point(cpu, tid, key, now),
            }
        }
        fired
    }

    fn timeout_expired(&mut self, tid: ThreadId, key: TimerKey) {
        let Some(th) = self.threads.get_mut(tid) else { return };
        if th.rtimer != Some(key) {
            return;
        }
        th.rtimer = None;
        th.info.insert(WakeInfo::TIMEO);
        self.resume_thread(tid, ThreadState::DELAY);
    }

    fn release_point(&mut self, cpu: usize, tid: ThreadId, key: TimerKey, now: u64) {
        let Some(th) = self.threads.get_mut(tid) else { return };
        let Some(mut ptimer) = th.ptimer.filter(|p| p.key == key) else { return };

        // Skip the release points already behind us in one step
        let missed = (now - key.date()) / ptimer.period;
        let next = key.date() + (missed + 1) * ptimer.period;
        ptimer.key = self.scheds[cpu].timers.arm(next, TimerEvent::Periodic(tid));

        let waiting = th.state.contains(ThreadState::DELAY) && th.wait == WaitData::Period;
        if waiting {
            ptimer.pending = 0;
            th.completion = Some(Completion::Value(missed as u32));
        } else {
            ptimer.pending += missed + 1;
        }
        th.ptimer = Some(ptimer);
        if waiting {
            self.resume_thread(tid, ThreadState::DELAY);
        }
    }
}

impl Nucleus {
    /// Put the current thread to sleep for `timeout`.
    ///
    /// Reaching the deadline is the normal outcome; `unblock` cuts the
    /// sleep short with `Interrupted`.
    pub fn sleep(&self, timeout: Timeout) -> NucleusResult<()> {
        let mut nk = self.lock();
        let tid = nk.current_blockable(self.local_cpu())?;
        let deadline = match timeout.resolve(self.now()) {
            Deadline::Poll | Deadline::Expired => return Ok(()),
            deadline => deadline,
        };
        nk.begin_wait(tid)?;
        if let Some(th) = nk.threads.get_mut(tid) {
            th.wait = WaitData::Sleep;
        }
        nk.suspend_thread(tid, ThreadState::DELAY, deadline);
        self.block(nk, tid).map(|_| ())
    }

    /// Make `tid` periodic: first release at `idate` (one period from
    /// now if `None`), then every `period` ticks. A zero period stops
    /// periodic mode.
    pub fn set_periodic(&self, tid: ThreadId, idate: Option<u64>, period: u64) -> NucleusResult<()> {
        let now = self.now();
        let mut nk = self.lock();
        let cpu = nk.live_thread(tid)?.cpu;
        let old = match nk.threads.get_mut(tid) {
            Some(th) => th.ptimer.take(),
            None => None,
        };
        if let Some(old) = old {
            nk.scheds[cpu].timers.cancel(old.key);
        }
        nk.scheds[cpu].timers_dirty = true;

        if period > 0 {
            let date = idate.unwrap_or_else(|| now.saturating_add(period));
            let key = nk.scheds[cpu].timers.arm(date, TimerEvent::Periodic(tid));
            if let Some(th) = nk.threads.get_mut(tid) {
                th.ptimer = Some(PeriodicTimer { period, key, pending: 0 });
            }
        }
        self.unlock(nk);
        Ok(())
    }

    /// Wait for the next release point of the current thread. Returns
    /// the number of release points missed since the previous call.
    pub fn wait_period(&self) -> NucleusResult<u64> {
        let mut nk = self.lock();
        let tid = nk.current_blockable(self.local_cpu())?;
        let Some(th) = nk.threads.get_mut(tid) else {
            return Err(NucleusError::InvalidState { reason: "thread vanished" });
        };
        let Some(ptimer) = th.ptimer.as_mut() else {
            return Err(NucleusError::InvalidState { reason: "thread is not periodic" });
        };
        if ptimer.pending > 0 {
            let overruns = ptimer.pending - 1;
            ptimer.pending = 0;
            return Ok(overruns);
        }

        nk.begin_wait(tid)?;
        if let Some(th) = nk.threads.get_mut(tid) {
            th.wait = WaitData::Period;
        }
        nk.suspend_thread(tid, ThreadState::DELAY, Deadline::Never);
        match self.block(nk, tid)? {
            Completion::Value(overruns) => Ok(u64::from(overruns)),
            _ => Ok(0),
        }
    }

    /// Clock interrupt entry point for the local CPU: fire due timers,
    /// account round-robin time, then reschedule.
    pub fn tick_handler(&self) {
        let cpu = self.local_cpu();
        let now = self.now();
        let mut nk = self.lock();
        let fired = nk.fire_timers(cpu, now);

        let tick = nk.config.tick_period;
        let sched = &mut nk.scheds[cpu];
        let elapsed = now.saturating_sub(sched.rr_stamp) / tick;
        sched.rr_stamp += elapsed * tick;
        sched.stats.ticks += 1;
        sched.timers_dirty = true;
        if elapsed > 0 {
            nk.rr_tick(cpu, elapsed);
        }

        self.schedule(nk);
        for due in fired {
            self.latency.record(due, now);
        }
    }
}
