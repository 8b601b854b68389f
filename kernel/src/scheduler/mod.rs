//! Scheduler subsystem
//!
//! Per-CPU RT scheduling with an idle class underneath: priority queues,
//! the thread control block and its state machine, the nucleus service
//! object and the context switch bookkeeping.

pub mod core;
pub mod idle;
pub mod queue;
pub mod realtime;
pub mod switch;
pub mod thread;

// Re-exports
pub use self::core::{CpuMask, Nucleus, NucleusError, NucleusResult, NucleusState, SchedClass};
pub use queue::{MultiLevelQueue, PList, PrioQueue, QueuePolicy};
pub use thread::{Completion, Thread, ThreadAttr, ThreadId, ThreadSnapshot, ThreadState};
