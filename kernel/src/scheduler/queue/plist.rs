//! Sorted priority list
//!
//! Entries are kept in pick order (descending priority), so the head is
//! found in O(1) and insertion walks at most the whole list.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use super::{PrioQueue, QueuePolicy};
use crate::scheduler::core::error::{invariant_violation, NucleusResult};

/// Priority-ordered list
#[derive(Debug, Clone)]
pub struct PList<T> {
    entries: VecDeque<(i32, T)>,
    min: i32,
    max: i32,
}

impl<T: Copy + Eq> PList<T> {
    pub fn new(min: i32, max: i32) -> Self {
        Self {
            entries: VecDeque::new(),
            min,
            max,
        }
    }

    /// Iterate in pick order
    pub fn iter(&self) -> impl Iterator<Item = &(i32, T)> {
        self.entries.iter()
    }

    /// Items in pick order, without priorities
    pub fn items(&self) -> Vec<T> {
        self.entries.iter().map(|&(_, item)| item).collect()
    }

    pub fn contains(&self, item: T) -> bool {
        self.entries.iter().any(|&(_, i)| i == item)
    }
}

impl<T: Copy + Eq> PrioQueue<T> for PList<T> {
    fn min_prio(&self) -> i32 {
        self.min
    }

    fn max_prio(&self) -> i32 {
        self.max
    }

    fn insert(&mut self, item: T, prio: i32, policy: QueuePolicy) -> NucleusResult<()> {
        self.check_range(prio)?;
        let pos = match policy {
            // After the last entry of equal or higher priority
            QueuePolicy::Enqueue => self.entries.iter().position(|&(p, _)| p < prio),
            // Before the first entry of equal or lower priority
            QueuePolicy::Requeue => self.entries.iter().position(|&(p, _)| p <= prio),
        };
        match pos {
            Some(pos) => self.entries.insert(pos, (prio, item)),
            None => self.entries.push_back((prio, item)),
        }
        Ok(())
    }

    fn remove(&mut self, item: T) -> bool {
        match self.entries.iter().position(|&(_, i)| i == item) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => {
                invariant_violation("removing an item absent from its priority list");
                false
            }
        }
    }

    fn pick_highest(&self) -> Option<T> {
        self.entries.front().map(|&(_, item)| item)
    }

    fn pop_highest(&mut self) -> Option<T> {
        self.entries.pop_front().map(|(_, item)| item)
    }

    fn head_prio(&self) -> Option<i32> {
        self.entries.front().map(|&(prio, _)| prio)
    }

    fn first_at(&self, prio: i32) -> Option<T> {
        self.entries
            .iter()
            .find(|&&(p, _)| p == prio)
            .map(|&(_, item)| item)
    }

    fn prio_of(&self, item: T) -> Option<i32> {
        self.entries
            .iter()
            .find(|&&(_, i)| i == item)
            .map(|&(prio, _)| prio)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn to_vec(&self) -> Vec<(i32, T)> {
        self.entries.iter().copied().collect()
    }

    fn is_pristine(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::core::error::NucleusError;

    #[test]
    fn test_fifo_and_lifo_ties() {
        let mut q = PList::new(0, 99);
        q.insert('a', 10, QueuePolicy::Enqueue).unwrap();
        q.insert('b', 10, QueuePolicy::Enqueue).unwrap();
        q.insert('c', 10, QueuePolicy::Requeue).unwrap();
        q.insert('d', 20, QueuePolicy::Enqueue).unwrap();
        assert_eq!(q.items(), ['d', 'c', 'a', 'b']);
        assert_eq!(q.first_at(10), Some('c'));
        assert_eq!(q.head_prio(), Some(20));
    }

    #[test]
    fn test_out_of_range_insert() {
        let mut q = PList::new(0, 99);
        assert_eq!(
            q.insert(1u32, 100, QueuePolicy::Enqueue),
            Err(NucleusError::InvalidPriority { value: 100, min: 0, max: 99 })
        );
        assert!(q.is_empty());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "absent from its priority list")]
    fn test_remove_absent_is_fatal_in_debug() {
        let mut q: PList<u32> = PList::new(0, 99);
        q.remove(7);
    }
}
