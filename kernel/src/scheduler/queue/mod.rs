//! Priority queues
//!
//! Two interchangeable implementations order threads (or any small key)
//! by priority, numerically highest first:
//! - `plist`: sorted linked list, adequate for sparse priority spaces
//!   and used for every pend queue and claim list
//! - `mlq`: bitmap-indexed multi-level queue with O(1) insert, remove and
//!   pick, used for the per-CPU RT ready queue when `scalable-sched` is on
//!
//! Ties are broken by the insertion policy: `Enqueue` appends at the tail
//! of the priority band (FIFO), `Requeue` prepends at its head (LIFO).

pub mod mlq;
pub mod plist;

use alloc::vec::Vec;

use crate::scheduler::core::error::{NucleusError, NucleusResult};

pub use mlq::{MultiLevelQueue, MLQ_LEVELS};
pub use plist::PList;

/// Tie-break policy among equal priorities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePolicy {
    /// Tail of the priority band (yield, quantum expiry, wakeup)
    Enqueue,
    /// Head of the priority band (involuntary preemption)
    Requeue,
}

/// Bounded-range priority queue contract
pub trait PrioQueue<T: Copy + Eq> {
    /// Lowest accepted priority
    fn min_prio(&self) -> i32;

    /// Highest accepted priority
    fn max_prio(&self) -> i32;

    /// Insert `item` at `prio`; fails with `InvalidPriority` out of range
    fn insert(&mut self, item: T, prio: i32, policy: QueuePolicy) -> NucleusResult<()>;

    /// Remove `item`. Removing an absent item is an invariant violation;
    /// in release builds it is reported and ignored (returns false).
    fn remove(&mut self, item: T) -> bool;

    /// Highest priority item, earliest under FIFO ties
    fn pick_highest(&self) -> Option<T>;

    /// Remove and return the highest priority item
    fn pop_highest(&mut self) -> Option<T>;

    /// Priority of the head item
    fn head_prio(&self) -> Option<i32>;

    /// First item of the band at `prio`
    fn first_at(&self, prio: i32) -> Option<T>;

    /// Priority `item` was queued at
    fn prio_of(&self, item: T) -> Option<i32>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items in pick order with their priorities
    fn to_vec(&self) -> Vec<(i32, T)>;

    /// True when no residual index state is left behind
    fn is_pristine(&self) -> bool;

    fn check_range(&self, prio: i32) -> NucleusResult<()> {
        if prio < self.min_prio() || prio > self.max_prio() {
            return Err(NucleusError::InvalidPriority {
                value: prio,
                min: self.min_prio(),
                max: self.max_prio(),
            });
        }
        Ok(())
    }
}
