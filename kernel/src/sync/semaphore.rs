//! Counting semaphore

use crate::scheduler::core::error::{NucleusError, NucleusResult};
use crate::scheduler::core::nucleus::Nucleus;
use crate::scheduler::queue::PrioQueue;
use crate::scheduler::thread::thread::WaitData;
use crate::scheduler::thread::Completion;
use crate::sync::synch::{SynchFlags, SynchId, SynchKind};
use crate::time::clock::Timeout;

impl Nucleus {
    /// Create a semaphore holding `initial` units. Waiters queue by
    /// priority when `prio` is set, FIFO otherwise.
    pub fn sem_create(&self, initial: u32, prio: bool) -> SynchId {
        let flags = if prio { SynchFlags::PRIO } else { SynchFlags::empty() };
        self.lock()
            .synch_new(flags, SynchKind::Semaphore { count: initial })
    }

    /// Take one unit, blocking up to `timeout` while none is left
    pub fn sem_pend(&self, sid: SynchId, timeout: Timeout) -> NucleusResult<()> {
        let mut nk = self.lock();
        let SynchKind::Semaphore { count } = &mut nk.synchs.checked_mut(sid)?.kind else {
            return Err(NucleusError::InvalidState { reason: "not a semaphore" });
        };
        if *count > 0 {
            *count -= 1;
            return Ok(());
        }
        self.sleep_current(nk, sid, timeout, WaitData::None).map(|_| ())
    }

    /// Give one unit; a waiter gets it directly
    pub fn sem_post(&self, sid: SynchId) -> NucleusResult<()> {
        let mut nk = self.lock();
        let synch = nk.synchs.checked_mut(sid)?;
        let waiting = !synch.pendq.is_empty();
        let SynchKind::Semaphore { count } = &mut synch.kind else {
            return Err(NucleusError::InvalidState { reason: "not a semaphore" });
        };
        if !waiting {
            *count = count
                .checked_add(1)
                .ok_or(NucleusError::InvalidState { reason: "semaphore count overflow" })?;
            return Ok(());
        }
        nk.wakeup_one(sid, Completion::Done);
        self.schedule(nk);
        Ok(())
    }

    /// Satisfy every waiter at once. Returns how many were released.
    pub fn sem_broadcast(&self, sid: SynchId) -> NucleusResult<usize> {
        let mut nk = self.lock();
        if !matches!(nk.synchs.checked(sid)?.kind, SynchKind::Semaphore { .. }) {
            return Err(NucleusError::InvalidState { reason: "not a semaphore" });
        }
        let mut released = 0;
        while nk.wakeup_one(sid, Completion::Done).is_some() {
            released += 1;
        }
        self.schedule(nk);
        Ok(released)
    }

    pub fn sem_count(&self, sid: SynchId) -> NucleusResult<u32> {
        match self.lock().synchs.checked(sid)?.kind {
            SynchKind::Semaphore { count } => Ok(count),
            _ => Err(NucleusError::InvalidState { reason: "not a semaphore" }),
        }
    }
}
