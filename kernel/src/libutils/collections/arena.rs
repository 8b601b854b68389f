//! Generational arena
//!
//! Slots are recycled through a free list; each reuse bumps the slot
//! generation so keys handed out earlier stop resolving.

use alloc::vec::Vec;
use core::fmt;

/// Stable handle into an [`Arena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArenaKey {
    index: u32,
    generation: u32,
}

impl ArenaKey {
    /// Slot index (stable while the key is live)
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation the slot had when this key was issued
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ArenaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.index, self.generation)
    }
}

enum Slot<T> {
    Occupied { generation: u32, value: T },
    Free { generation: u32, next_free: Option<u32> },
}

/// Slot storage with generational keys
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Arena<T> {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    /// Store a value and return its key
    pub fn insert(&mut self, value: T) -> ArenaKey {
        self.insert_with(|_| value)
    }

    /// Store a value built from its own key
    pub fn insert_with(&mut self, build: impl FnOnce(ArenaKey) -> T) -> ArenaKey {
        self.len += 1;
        if let Some(index) = self.free_head {
            if let Some(Slot::Free { generation, next_free }) = self.slots.get(index as usize) {
                let key = ArenaKey {
                    index,
                    generation: generation.wrapping_add(1),
                };
                self.free_head = *next_free;
                self.slots[index as usize] = Slot::Occupied {
                    generation: key.generation,
                    value: build(key),
                };
                return key;
            }
            // Free list corrupted: stop reusing slots.
            self.free_head = None;
        }

        let key = ArenaKey {
            index: self.slots.len() as u32,
            generation: 0,
        };
        self.slots.push(Slot::Occupied { generation: 0, value: build(key) });
        key
    }

    /// Remove a value, returning it if the key was still live
    pub fn remove(&mut self, key: ArenaKey) -> Option<T> {
        let slot = self.slots.get_mut(key.index as usize)?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == key.generation => {}
            _ => return None,
        }
        let old = core::mem::replace(
            slot,
            Slot::Free {
                generation: key.generation,
                next_free: self.free_head,
            },
        );
        self.free_head = Some(key.index);
        self.len -= 1;
        match old {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Free { .. } => None,
        }
    }

    pub fn get(&self, key: ArenaKey) -> Option<&T> {
        match self.slots.get(key.index as usize)? {
            Slot::Occupied { generation, value } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: ArenaKey) -> Option<&mut T> {
        match self.slots.get_mut(key.index as usize)? {
            Slot::Occupied { generation, value } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, key: ArenaKey) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over live entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = (ArenaKey, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Occupied { generation, value } => Some((
                ArenaKey {
                    index: index as u32,
                    generation: *generation,
                },
                value,
            )),
            Slot::Free { .. } => None,
        })
    }

    /// Keys of live entries in slot order
    pub fn keys(&self) -> Vec<ArenaKey> {
        self.iter().map(|(key, _)| key).collect()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}
