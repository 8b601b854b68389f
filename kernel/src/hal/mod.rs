//! Hardware abstraction seam
//!
//! The nucleus never touches the CPU directly. The embedding platform
//! supplies interrupt masking, the context switch primitive and the
//! reschedule IPI through [`Hal`], the time base through
//! [`ClockSource`], and the host kernel side through [`HostBridge`].

pub mod sim;
pub mod trap;

use alloc::sync::Arc;

use crate::scheduler::thread::ThreadId;
use crate::shadow::host::HostBridge;
use crate::time::clock::ClockSource;

pub use trap::{TrapFrame, TrapHandler, TrapTable, TrapVerdict, NR_TRAPS};

/// Saved interrupt state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqFlags(pub u64);

/// CPU-level services consumed by the scheduler
pub trait Hal: Send + Sync {
    /// CPU the caller executes on
    fn current_cpu(&self) -> usize;

    /// Save the state of `out` and resume `incoming` on `cpu`. Returns
    /// when something later switches back to `out`.
    fn switch_context(&self, cpu: usize, out: ThreadId, incoming: ThreadId);

    /// Ask `cpu` to run the reschedule procedure at its next safe point
    fn request_reschedule(&self, cpu: usize);

    /// Disable interrupts on the local CPU, returning the previous state
    fn irq_save(&self) -> IrqFlags;

    /// Restore a state returned by `irq_save`
    fn irq_restore(&self, flags: IrqFlags);
}

/// Everything the nucleus needs from its embedding
#[derive(Clone)]
pub struct Platform {
    pub hal: Arc<dyn Hal>,
    pub clock: Arc<dyn ClockSource>,
    pub host: Arc<dyn HostBridge>,
}

impl Platform {
    /// Use one object for all three interfaces
    pub fn from_shared<P>(platform: Arc<P>) -> Self
    where
        P: Hal + ClockSource + HostBridge + 'static,
    {
        Self {
            hal: platform.clone(),
            clock: platform.clone(),
            host: platform,
        }
    }
}
