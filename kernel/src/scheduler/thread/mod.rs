//! Thread module

pub mod thread;
pub mod state;

pub use thread::{
    Completion, Finalizer, QueueLink, Thread, ThreadAttr, ThreadId, ThreadSnapshot, ThreadStats,
    THREAD_NAME_MAX,
};
pub use state::{Domain, ThreadState, WakeInfo};
