//! Per-CPU timer queue
//!
//! Thread timeouts and periodic release points, ordered by date. Entries
//! with the same date fire in arming order.

use alloc::collections::BTreeMap;

use crate::scheduler::thread::ThreadId;

/// Handle of an armed timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerKey {
    date: u64,
    seq: u64,
}

impl TimerKey {
    /// Expiry date
    pub fn date(&self) -> u64 {
        self.date
    }
}

/// What to do when a timer fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// End a timed wait or sleep of the thread
    Timeout(ThreadId),
    /// Release point of a periodic thread
    Periodic(ThreadId),
}

/// Timer queue of one CPU
#[derive(Debug, Default)]
pub struct TimerQueue {
    entries: BTreeMap<TimerKey, TimerEvent>,
    next_seq: u64,
}

impl TimerQueue {
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Arm a one-shot timer at `date`
    pub fn arm(&mut self, date: u64, event: TimerEvent) -> TimerKey {
        let key = TimerKey {
            date,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.entries.insert(key, event);
        key
    }

    /// Disarm; returns the event if the timer was still pending
    pub fn cancel(&mut self, key: TimerKey) -> Option<TimerEvent> {
        self.entries.remove(&key)
    }

    /// Earliest pending date
    pub fn next_date(&self) -> Option<u64> {
        self.entries.keys().next().map(|k| k.date)
    }

    /// Remove and return the earliest timer due at `now`
    pub fn pop_expired(&mut self, now: u64) -> Option<(TimerKey, TimerEvent)> {
        let (&key, _) = self.entries.iter().next()?;
        if key.date > now {
            return None;
        }
        self.entries.remove(&key).map(|event| (key, event))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libutils::collections::Arena;

    fn tid() -> ThreadId {
        let mut arena: Arena<()> = Arena::new();
        ThreadId(arena.insert(()))
    }

    #[test]
    fn test_fires_in_date_then_arming_order() {
        let t = tid();
        let mut q = TimerQueue::new();
        let late = q.arm(20, TimerEvent::Timeout(t));
        let a = q.arm(10, TimerEvent::Timeout(t));
        let b = q.arm(10, TimerEvent::Periodic(t));
        assert_eq!(q.next_date(), Some(10));
        assert_eq!(q.pop_expired(9), None);
        assert_eq!(q.pop_expired(15).map(|(k, _)| k), Some(a));
        assert_eq!(q.pop_expired(15).map(|(k, _)| k), Some(b));
        assert_eq!(q.pop_expired(15), None);
        assert_eq!(q.cancel(late), Some(TimerEvent::Timeout(t)));
        assert!(q.is_empty());
    }

    #[test]
    fn test_cancel_fired_timer() {
        let t = tid();
        let mut q = TimerQueue::new();
        let k = q.arm(5, TimerEvent::Timeout(t));
        assert!(q.pop_expired(5).is_some());
        assert_eq!(q.cancel(k), None);
    }
}
