//! Bounded message queue
//!
//! Messages are byte vectors passed by value. A sender finding a
//! receiver already waiting hands the message over directly; a
//! receiver freeing a slot pulls in the message of the first blocked
//! sender. Senders and receivers share the pend queue since both can
//! never be waiting at the same time.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::scheduler::core::error::{invariant_violation, NucleusError, NucleusResult};
use crate::scheduler::core::nucleus::Nucleus;
use crate::scheduler::queue::PrioQueue;
use crate::scheduler::thread::thread::WaitData;
use crate::scheduler::thread::Completion;
use crate::sync::synch::{SynchFlags, SynchId, SynchKind};
use crate::time::clock::Timeout;

impl Nucleus {
    /// Create a queue holding up to `capacity` messages
    pub fn msgq_create(&self, capacity: usize, prio: bool) -> NucleusResult<SynchId> {
        if capacity == 0 {
            return Err(NucleusError::InvalidState { reason: "zero queue capacity" });
        }
        let flags = if prio { SynchFlags::PRIO } else { SynchFlags::empty() };
        let kind = SynchKind::Queue {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        };
        Ok(self.lock().synch_new(flags, kind))
    }

    /// Post `msg`, blocking up to `timeout` while the queue is full
    pub fn send(&self, sid: SynchId, msg: Vec<u8>, timeout: Timeout) -> NucleusResult<()> {
        let mut nk = self.lock();
        let synch = nk.synchs.checked_mut(sid)?;
        let receiver = synch.pendq.pick_highest();
        let SynchKind::Queue { messages, capacity } = &mut synch.kind else {
            return Err(NucleusError::InvalidState { reason: "not a message queue" });
        };

        if let Some(receiver) = receiver.filter(|_| messages.is_empty()) {
            if let Some(th) = nk.threads.get_mut(receiver) {
                th.completion = Some(Completion::Message(msg));
            }
            nk.wakeup_this(sid, receiver)?;
            self.schedule(nk);
            return Ok(());
        }
        if messages.len() < *capacity {
            messages.push_back(msg);
            return Ok(());
        }
        self.sleep_current(nk, sid, timeout, WaitData::Send(msg)).map(|_| ())
    }

    /// Take the oldest message, blocking up to `timeout` while empty
    pub fn receive(&self, sid: SynchId, timeout: Timeout) -> NucleusResult<Vec<u8>> {
        let mut nk = self.lock();
        let synch = nk.synchs.checked_mut(sid)?;
        let sender = synch.pendq.pick_highest();
        let SynchKind::Queue { messages, .. } = &mut synch.kind else {
            return Err(NucleusError::InvalidState { reason: "not a message queue" });
        };

        if let Some(msg) = messages.pop_front() {
            if let Some(sender) = sender {
                let pending = nk
                    .threads
                    .get_mut(sender)
                    .map(|th| core::mem::replace(&mut th.wait, WaitData::None));
                if let Some(WaitData::Send(queued)) = pending {
                    if let Some(SynchKind::Queue { messages, .. }) =
                        nk.synchs.get_mut(sid).map(|s| &mut s.kind)
                    {
                        messages.push_back(queued);
                    }
                }
                if let Some(th) = nk.threads.get_mut(sender) {
                    th.completion = Some(Completion::Done);
                }
                nk.wakeup_this(sid, sender)?;
                self.schedule(nk);
            }
            return Ok(msg);
        }

        match self.sleep_current(nk, sid, timeout, WaitData::Receive)? {
            Completion::Message(msg) => Ok(msg),
            _ => {
                invariant_violation("receiver woken without a message");
                Err(NucleusError::Interrupted)
            }
        }
    }

    /// Messages currently queued
    pub fn msgq_len(&self, sid: SynchId) -> NucleusResult<usize> {
        match &self.lock().synchs.checked(sid)?.kind {
            SynchKind::Queue { messages, .. } => Ok(messages.len()),
            _ => Err(NucleusError::InvalidState { reason: "not a message queue" }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::fixture::{boot, run};

    #[test]
    fn test_zero_capacity_rejected() {
        let (_sim, nucleus) = boot(1);
        assert!(nucleus.msgq_create(0, false).is_err());
    }

    #[test]
    fn test_direct_handoff_to_receiver() {
        let (_sim, nucleus) = boot(1);
        let q = nucleus.msgq_create(2, false).unwrap();
        let rx = run(&nucleus, "rx", 20);
        assert_eq!(
            nucleus.receive(q, Timeout::Infinite),
            Err(NucleusError::Suspended { thread: rx })
        );
        let _tx = run(&nucleus, "tx", 10);
        nucleus.send(q, b"ping".to_vec(), Timeout::Infinite).unwrap();
        assert_eq!(nucleus.msgq_len(q).unwrap(), 0);
        assert_eq!(nucleus.current(0).unwrap(), rx);
        assert_eq!(nucleus.wait_result(rx), Ok(Completion::Message(b"ping".to_vec())));
    }

    #[test]
    fn test_full_queue_blocks_sender() {
        let (_sim, nucleus) = boot(1);
        let q = nucleus.msgq_create(1, false).unwrap();
        let tx = run(&nucleus, "tx", 10);
        nucleus.send(q, alloc::vec![1], Timeout::Infinite).unwrap();
        assert_eq!(nucleus.send(q, alloc::vec![2], Timeout::NonBlocking), Err(NucleusError::WouldBlock));
        assert!(nucleus.send(q, alloc::vec![2], Timeout::Infinite).is_err());

        let _rx = run(&nucleus, "rx", 5);
        assert_eq!(nucleus.receive(q, Timeout::Infinite).unwrap(), alloc::vec![1]);
        assert_eq!(nucleus.current(0).unwrap(), tx);
        assert_eq!(nucleus.wait_result(tx), Ok(Completion::Done));
        assert_eq!(nucleus.msgq_len(q).unwrap(), 1);
        assert_eq!(nucleus.receive(q, Timeout::NonBlocking).unwrap(), alloc::vec![2]);
    }
}
