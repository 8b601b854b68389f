//! Multi-level queue
//!
//! One FIFO band per priority level plus a two-level bitmap: `himap` has
//! one bit per 64-level word of `lomap`, `lomap` one bit per non-empty
//! band. Levels are indexed from the top (`max - prio`) so the lowest set
//! bit is always the highest priority and lookup is two `trailing_zeros`.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::hash::Hash;

use hashbrown::HashMap;

use super::{PrioQueue, QueuePolicy};
use crate::scheduler::core::error::{invariant_violation, NucleusResult};

/// Maximum number of priority levels
pub const MLQ_LEVELS: usize = 264;

const BITS_PER_WORD: usize = 64;
const MLQ_WORDS: usize = (MLQ_LEVELS + BITS_PER_WORD - 1) / BITS_PER_WORD;

/// Bitmap-indexed multi-level queue
pub struct MultiLevelQueue<T> {
    bands: Vec<VecDeque<T>>,
    himap: u64,
    lomap: [u64; MLQ_WORDS],
    /// Priority each member was queued at, for O(1) removal
    members: HashMap<T, i32>,
    min: i32,
    max: i32,
}

impl<T: Copy + Eq + Hash> MultiLevelQueue<T> {
    /// Create a queue covering `[min, max]`. Ranges wider than
    /// `MLQ_LEVELS` are clamped from below.
    pub fn new(min: i32, max: i32) -> Self {
        let min = min.max(max - (MLQ_LEVELS as i32 - 1));
        let levels = (max - min + 1).max(0) as usize;
        let mut bands = Vec::with_capacity(levels);
        bands.resize_with(levels, VecDeque::new);
        Self {
            bands,
            himap: 0,
            lomap: [0; MLQ_WORDS],
            members: HashMap::new(),
            min,
            max,
        }
    }

    #[inline]
    fn index_of(&self, prio: i32) -> usize {
        (self.max - prio) as usize
    }

    #[inline]
    fn prio_at(&self, idx: usize) -> i32 {
        self.max - idx as i32
    }

    fn mark(&mut self, idx: usize) {
        let (word, bit) = (idx / BITS_PER_WORD, idx % BITS_PER_WORD);
        self.lomap[word] |= 1 << bit;
        self.himap |= 1 << word;
    }

    fn unmark(&mut self, idx: usize) {
        let (word, bit) = (idx / BITS_PER_WORD, idx % BITS_PER_WORD);
        self.lomap[word] &= !(1 << bit);
        if self.lomap[word] == 0 {
            self.himap &= !(1 << word);
        }
    }

    /// Index of the highest non-empty band
    fn first_index(&self) -> Option<usize> {
        if self.himap == 0 {
            return None;
        }
        let word = self.himap.trailing_zeros() as usize;
        let bit = self.lomap[word].trailing_zeros() as usize;
        Some(word * BITS_PER_WORD + bit)
    }
}

impl<T: Copy + Eq + Hash> PrioQueue<T> for MultiLevelQueue<T> {
    fn min_prio(&self) -> i32 {
        self.min
    }

    fn max_prio(&self) -> i32 {
        self.max
    }

    fn insert(&mut self, item: T, prio: i32, policy: QueuePolicy) -> NucleusResult<()> {
        self.check_range(prio)?;
        let idx = self.index_of(prio);
        match policy {
            QueuePolicy::Enqueue => self.bands[idx].push_back(item),
            QueuePolicy::Requeue => self.bands[idx].push_front(item),
        }
        self.members.insert(item, prio);
        self.mark(idx);
        Ok(())
    }

    fn remove(&mut self, item: T) -> bool {
        let Some(prio) = self.members.remove(&item) else {
            invariant_violation("removing an item absent from its multi-level queue");
            return false;
        };
        let idx = self.index_of(prio);
        let band = &mut self.bands[idx];
        if let Some(pos) = band.iter().position(|&i| i == item) {
            band.remove(pos);
        }
        if band.is_empty() {
            self.unmark(idx);
        }
        true
    }

    fn pick_highest(&self) -> Option<T> {
        let idx = self.first_index()?;
        self.bands[idx].front().copied()
    }

    fn pop_highest(&mut self) -> Option<T> {
        let idx = self.first_index()?;
        let item = self.bands[idx].pop_front()?;
        if self.bands[idx].is_empty() {
            self.unmark(idx);
        }
        self.members.remove(&item);
        Some(item)
    }

    fn head_prio(&self) -> Option<i32> {
        self.first_index().map(|idx| self.prio_at(idx))
    }

    fn first_at(&self, prio: i32) -> Option<T> {
        if prio < self.min || prio > self.max {
            return None;
        }
        self.bands[self.index_of(prio)].front().copied()
    }

    fn prio_of(&self, item: T) -> Option<i32> {
        self.members.get(&item).copied()
    }

    fn len(&self) -> usize {
        self.members.len()
    }

    fn to_vec(&self) -> Vec<(i32, T)> {
        self.bands
            .iter()
            .enumerate()
            .flat_map(|(idx, band)| {
                let prio = self.prio_at(idx);
                band.iter().map(move |&item| (prio, item))
            })
            .collect()
    }

    fn is_pristine(&self) -> bool {
        self.himap == 0
            && self.lomap.iter().all(|&w| w == 0)
            && self.members.is_empty()
            && self.bands.iter().all(VecDeque::is_empty)
    }
}
