//! Mutex
//!
//! Owner-tracking lock on top of the generic synch object, optionally
//! recursive and optionally with priority inheritance. Release hands
//! the lock straight to the top waiter; there is no ownership
//! stealing.

use crate::scheduler::core::error::{NucleusError, NucleusResult};
use crate::scheduler::core::nucleus::Nucleus;
use crate::scheduler::thread::thread::WaitData;
use crate::scheduler::thread::ThreadId;
use crate::sched_error;
use crate::sync::synch::{SynchFlags, SynchId, SynchKind};
use crate::time::clock::Timeout;

impl Nucleus {
    /// Create a mutex. `inherit` enables priority inheritance; waiters
    /// are priority-ordered either way.
    pub fn mutex_create(&self, recursive: bool, inherit: bool) -> SynchId {
        let flags = if inherit {
            SynchFlags::PIP
        } else {
            SynchFlags::PRIO | SynchFlags::OWNER
        };
        self.lock()
            .synch_new(flags, SynchKind::Mutex { lock_count: 0, recursive })
    }

    /// Lock `sid`, blocking up to `timeout`
    pub fn acquire(&self, sid: SynchId, timeout: Timeout) -> NucleusResult<()> {
        let mut nk = self.lock();
        let tid = nk.current_blockable(self.local_cpu())?;
        let synch = nk.synchs.checked_mut(sid)?;
        let owner = synch.owner;
        let SynchKind::Mutex { lock_count, recursive } = &mut synch.kind else {
            return Err(NucleusError::InvalidState { reason: "not a mutex" });
        };
        match owner {
            None => {
                *lock_count = 1;
                nk.grant(sid, tid);
                return Ok(());
            }
            Some(owner) if owner == tid => {
                if !*recursive {
                    return Err(NucleusError::InvalidState { reason: "mutex already held by caller" });
                }
                *lock_count = lock_count.checked_add(1).ok_or(NucleusError::InvalidState {
                    reason: "mutex lock count overflow",
                })?;
                return Ok(());
            }
            Some(_) => {}
        }
        self.sleep_current(nk, sid, timeout, WaitData::None).map(|_| ())
    }

    /// Lock `sid` only if it is free (or recursively held by the caller)
    pub fn try_acquire(&self, sid: SynchId) -> NucleusResult<()> {
        self.acquire(sid, Timeout::NonBlocking)
    }

    /// Unlock `sid`. The last unlock passes ownership to the top waiter
    /// and drops any boost the caller inherited through it.
    pub fn release(&self, sid: SynchId) -> NucleusResult<()> {
        let mut nk = self.lock();
        let curr = nk.sched(self.local_cpu())?.current();
        let synch = nk.synchs.checked_mut(sid)?;
        let owner = synch.owner;
        let SynchKind::Mutex { lock_count, .. } = &mut synch.kind else {
            return Err(NucleusError::InvalidState { reason: "not a mutex" });
        };
        if owner != Some(curr) {
            return Err(sched_error!(NucleusError::NotOwner));
        }
        if *lock_count > 1 {
            *lock_count -= 1;
            return Ok(());
        }
        nk.release_ownership(sid, curr);
        self.schedule(nk);
        Ok(())
    }

    pub fn mutex_owner(&self, sid: SynchId) -> NucleusResult<Option<ThreadId>> {
        self.synch_owner(sid)
    }

    /// Nesting depth of the current hold, 0 when free
    pub fn mutex_lock_count(&self, sid: SynchId) -> NucleusResult<u32> {
        match self.lock().synchs.checked(sid)?.kind {
            SynchKind::Mutex { lock_count, .. } => Ok(lock_count),
            _ => Err(NucleusError::InvalidState { reason: "not a mutex" }),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::hal::sim::fixture::{boot, run};
    use crate::scheduler::core::error::NucleusError;
    use crate::scheduler::thread::{Completion, ThreadState};
    use crate::time::clock::Timeout;

    #[test]
    fn test_recursive_counting() {
        let (_sim, nucleus) = boot(1);
        let _t = run(&nucleus, "t", 10);
        let m = nucleus.mutex_create(true, false);
        nucleus.acquire(m, Timeout::Infinite).unwrap();
        nucleus.acquire(m, Timeout::Infinite).unwrap();
        assert_eq!(nucleus.mutex_lock_count(m).unwrap(), 2);
        nucleus.release(m).unwrap();
        assert_eq!(nucleus.mutex_lock_count(m).unwrap(), 1);
        nucleus.release(m).unwrap();
        assert_eq!(nucleus.mutex_owner(m).unwrap(), None);
        assert_eq!(nucleus.mutex_lock_count(m).unwrap(), 0);
    }

    #[test]
    fn test_non_recursive_relock_fails() {
        let (_sim, nucleus) = boot(1);
        let _t = run(&nucleus, "t", 10);
        let m = nucleus.mutex_create(false, true);
        nucleus.acquire(m, Timeout::Infinite).unwrap();
        assert!(matches!(
            nucleus.try_acquire(m),
            Err(NucleusError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_release_by_non_owner() {
        let (_sim, nucleus) = boot(1);
        let a = run(&nucleus, "a", 10);
        let m = nucleus.mutex_create(false, true);
        nucleus.acquire(m, Timeout::Infinite).unwrap();
        nucleus.suspend(a).unwrap();
        let _b = run(&nucleus, "b", 5);
        assert_eq!(nucleus.release(m), Err(NucleusError::NotOwner));
        assert_eq!(nucleus.try_acquire(m), Err(NucleusError::WouldBlock));
    }

    #[test]
    fn test_handoff_with_inheritance() {
        let (_sim, nucleus) = boot(1);
        let low = run(&nucleus, "low", 10);
        let m = nucleus.mutex_create(false, true);
        nucleus.acquire(m, Timeout::Infinite).unwrap();

        let high = run(&nucleus, "high", 90);
        assert_eq!(nucleus.current(0).unwrap(), high);
        let err = nucleus.acquire(m, Timeout::Infinite).unwrap_err();
        assert_eq!(err, NucleusError::Suspended { thread: high });
        assert_eq!(nucleus.current(0).unwrap(), low);
        let info = nucleus.info(low).unwrap();
        assert_eq!(info.current_priority, 90);
        assert!(info.state.contains(ThreadState::BOOST));

        nucleus.release(m).unwrap();
        assert_eq!(nucleus.mutex_owner(m).unwrap(), Some(high));
        assert_eq!(nucleus.mutex_lock_count(m).unwrap(), 1);
        assert_eq!(nucleus.current(0).unwrap(), high);
        assert_eq!(nucleus.info(low).unwrap().current_priority, 10);
        assert_eq!(nucleus.wait_result(high), Ok(Completion::Done));
    }

    #[test]
    fn test_owner_deletion_hands_over() {
        let (_sim, nucleus) = boot(1);
        let low = run(&nucleus, "low", 10);
        let m = nucleus.mutex_create(false, true);
        nucleus.acquire(m, Timeout::Infinite).unwrap();
        let high = run(&nucleus, "high", 90);
        assert!(nucleus.acquire(m, Timeout::Infinite).is_err());

        nucleus.delete(low).unwrap();
        assert_eq!(nucleus.mutex_owner(m).unwrap(), Some(high));
        assert_eq!(nucleus.current(0).unwrap(), high);
    }
}
