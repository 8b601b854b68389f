//! Thread registry
//!
//! Maps symbolic thread names to handles. Names are optional keys: with
//! `unique_names` off a second thread may reuse a name, in which case
//! the registry keeps pointing at the first one.

use alloc::string::String;

use hashbrown::HashMap;

use crate::scheduler::core::error::{NucleusError, NucleusResult};
use crate::scheduler::thread::ThreadId;

pub struct Registry {
    names: HashMap<String, ThreadId>,
}

impl Registry {
    pub fn new() -> Self {
        Self { names: HashMap::new() }
    }

    /// Record `name` for `tid`. With `unique` set a name already taken
    /// is an error, otherwise the existing binding wins.
    pub fn register(&mut self, name: &str, tid: ThreadId, unique: bool) -> NucleusResult<()> {
        if name.is_empty() {
            return Ok(());
        }
        match self.names.get(name) {
            Some(_) if unique => Err(NucleusError::InvalidState { reason: "name already registered" }),
            Some(_) => Ok(()),
            None => {
                self.names.insert(String::from(name), tid);
                Ok(())
            }
        }
    }

    /// Drop `name` if it still designates `tid`
    pub fn unregister(&mut self, name: &str, tid: ThreadId) {
        if self.names.get(name) == Some(&tid) {
            self.names.remove(name);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<ThreadId> {
        self.names.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libutils::collections::Arena;

    fn ids(n: usize) -> alloc::vec::Vec<ThreadId> {
        let mut arena: Arena<()> = Arena::new();
        (0..n).map(|_| ThreadId(arena.insert(()))).collect()
    }

    #[test]
    fn test_first_binding_wins() {
        let t = ids(2);
        let mut reg = Registry::new();
        reg.register("worker", t[0], false).unwrap();
        reg.register("worker", t[1], false).unwrap();
        assert_eq!(reg.lookup("worker"), Some(t[0]));
        reg.unregister("worker", t[1]);
        assert_eq!(reg.lookup("worker"), Some(t[0]));
        reg.unregister("worker", t[0]);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_unique_names() {
        let t = ids(2);
        let mut reg = Registry::new();
        reg.register("rx", t[0], true).unwrap();
        assert!(reg.register("rx", t[1], true).is_err());
        reg.register("", t[1], true).unwrap();
        assert_eq!(reg.len(), 1);
    }
}
