//! Wait Queue
//!
//! A mechanism for threads to sleep until an event occurs. Thin handle
//! over a FIFO synch object; notifications are not remembered, a
//! notify with nobody waiting is lost.

use crate::scheduler::core::error::{NucleusError, NucleusResult};
use crate::scheduler::core::nucleus::Nucleus;
use crate::scheduler::thread::Completion;
use crate::sync::synch::{SynchFlags, SynchId};
use crate::time::clock::Timeout;

/// A queue of waiting threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitQueue {
    synch: SynchId,
}

impl WaitQueue {
    /// Create a new wait queue
    pub fn new(nucleus: &Nucleus) -> Self {
        Self {
            synch: nucleus.synch_create(SynchFlags::empty()),
        }
    }

    pub fn id(&self) -> SynchId {
        self.synch
    }

    /// Block the current thread until notified
    pub fn wait(&self, nucleus: &Nucleus) -> NucleusResult<()> {
        nucleus.pend(self.synch, Timeout::Infinite).map(|_| ())
    }

    /// Block the current thread with timeout.
    /// Returns true if notified, false if timed out
    pub fn wait_timeout(&self, nucleus: &Nucleus, ticks: u64) -> NucleusResult<bool> {
        match nucleus.pend(self.synch, Timeout::Relative(ticks)) {
            Ok(_) => Ok(true),
            Err(NucleusError::TimedOut) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Wake up one waiting thread
    pub fn notify_one(&self, nucleus: &Nucleus) -> NucleusResult<bool> {
        Ok(nucleus.signal(self.synch)?.is_some())
    }

    /// Wake up all waiting threads
    pub fn notify_all(&self, nucleus: &Nucleus) -> NucleusResult<usize> {
        let mut nk = nucleus.lock();
        nk.synchs.checked(self.synch)?;
        let mut woken = 0;
        while nk.wakeup_one(self.synch, Completion::Done).is_some() {
            woken += 1;
        }
        nucleus.schedule(nk);
        Ok(woken)
    }

    /// Destroy the queue; waiters resume with `Deleted`
    pub fn destroy(self, nucleus: &Nucleus) -> NucleusResult<()> {
        nucleus.synch_destroy(self.synch)
    }
}
