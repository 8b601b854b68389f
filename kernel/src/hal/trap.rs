//! Trap (CPU exception) handler table
//!
//! Handlers see the trap number and the raw frame, and decide whether the
//! fault is propagated to the next domain down the pipeline.

use core::fmt;

use crate::scheduler::core::error::{NucleusError, NucleusResult};

/// Number of trap vectors
pub const NR_TRAPS: usize = 32;

/// Raw context of the faulting code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub pc: u64,
    pub sp: u64,
    pub fault_addr: u64,
    pub error_code: u64,
}

/// Outcome of a trap handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapVerdict {
    /// Pass the trap on to the host kernel
    Propagate,
    /// The trap was handled
    Stop,
}

pub type TrapHandler = fn(u32, &TrapFrame) -> TrapVerdict;

/// Registered handlers, one slot per vector
pub struct TrapTable {
    handlers: [Option<TrapHandler>; NR_TRAPS],
}

impl TrapTable {
    pub const fn new() -> Self {
        Self {
            handlers: [None; NR_TRAPS],
        }
    }

    /// Install (or with `None` remove) the handler of `trap`, returning
    /// the previous one
    pub fn catch_exception(
        &mut self,
        trap: u32,
        handler: Option<TrapHandler>,
    ) -> NucleusResult<Option<TrapHandler>> {
        let slot = self
            .handlers
            .get_mut(trap as usize)
            .ok_or(NucleusError::InvalidState { reason: "trap number out of range" })?;
        Ok(core::mem::replace(slot, handler))
    }

    /// Handler installed for `trap`, if any
    pub fn handler(&self, trap: u32) -> Option<TrapHandler> {
        self.handlers.get(trap as usize).copied().flatten()
    }
}

impl Default for TrapTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TrapTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let installed = self.handlers.iter().filter(|h| h.is_some()).count();
        f.debug_struct("TrapTable").field("installed", &installed).finish()
    }
}
