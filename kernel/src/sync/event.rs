//! Event flag group
//!
//! A 32-bit value of event bits. Waiters block until their mask is
//! satisfied in `Any` or `All` mode; signalling wakes every waiter
//! whose condition now holds. Bits stay set until cleared explicitly.

use alloc::vec::Vec;

use crate::scheduler::core::error::{invariant_violation, NucleusError, NucleusResult};
use crate::scheduler::core::nucleus::Nucleus;
use crate::scheduler::thread::thread::WaitData;
use crate::scheduler::thread::{Completion, ThreadId};
use crate::sync::synch::{SynchFlags, SynchId, SynchKind};
use crate::time::clock::Timeout;

/// How a wait mask is matched against the event value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventMode {
    /// At least one bit of the mask is set
    Any,
    /// Every bit of the mask is set
    All,
}

impl EventMode {
    pub fn satisfied(self, value: u32, mask: u32) -> bool {
        match self {
            Self::Any => value & mask != 0,
            Self::All => value & mask == mask,
        }
    }
}

impl Nucleus {
    pub fn event_create(&self, initial: u32, prio: bool) -> SynchId {
        let flags = if prio { SynchFlags::PRIO } else { SynchFlags::empty() };
        self.lock().synch_new(flags, SynchKind::Event { value: initial })
    }

    /// Wait for `mask` bits; returns the event value that satisfied it
    pub fn event_wait(
        &self,
        sid: SynchId,
        mask: u32,
        mode: EventMode,
        timeout: Timeout,
    ) -> NucleusResult<u32> {
        if mask == 0 {
            return Err(NucleusError::InvalidState { reason: "empty event mask" });
        }
        let nk = self.lock();
        let SynchKind::Event { value } = nk.synchs.checked(sid)?.kind else {
            return Err(NucleusError::InvalidState { reason: "not an event" });
        };
        if mode.satisfied(value, mask) {
            return Ok(value);
        }
        match self.sleep_current(nk, sid, timeout, WaitData::Event { mask, mode })? {
            Completion::Value(value) => Ok(value),
            _ => {
                invariant_violation("event waiter woken without a value");
                self.event_value(sid)
            }
        }
    }

    /// Set `bits` and release the waiters they satisfy
    pub fn event_signal(&self, sid: SynchId, bits: u32) -> NucleusResult<usize> {
        let mut nk = self.lock();
        let synch = nk.synchs.checked_mut(sid)?;
        let SynchKind::Event { value } = &mut synch.kind else {
            return Err(NucleusError::InvalidState { reason: "not an event" });
        };
        *value |= bits;
        let value = *value;
        let waiters = synch.pendq.items();

        let ready: Vec<ThreadId> = waiters
            .into_iter()
            .filter(|&w| match nk.threads.get(w).map(|th| &th.wait) {
                Some(WaitData::Event { mask, mode }) => mode.satisfied(value, *mask),
                _ => false,
            })
            .collect();
        for &w in &ready {
            if let Some(th) = nk.threads.get_mut(w) {
                th.completion = Some(Completion::Value(value));
            }
            nk.wakeup_this(sid, w)?;
        }
        self.schedule(nk);
        Ok(ready.len())
    }

    /// Clear `bits`, returning the previous value
    pub fn event_clear(&self, sid: SynchId, bits: u32) -> NucleusResult<u32> {
        let mut nk = self.lock();
        let SynchKind::Event { value } = &mut nk.synchs.checked_mut(sid)?.kind else {
            return Err(NucleusError::InvalidState { reason: "not an event" });
        };
        let old = *value;
        *value &= !bits;
        Ok(old)
    }

    pub fn event_value(&self, sid: SynchId) -> NucleusResult<u32> {
        match self.lock().synchs.checked(sid)?.kind {
            SynchKind::Event { value } => Ok(value),
            _ => Err(NucleusError::InvalidState { reason: "not an event" }),
        }
    }
}
