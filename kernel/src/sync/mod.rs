//! Synchronization primitives
//!
//! Everything here is a `Synch` object with a primitive-specific kind;
//! the generic pend/wake and priority inheritance logic lives in
//! `synch`.

pub mod event;
pub mod msgq;
pub mod mutex;
pub mod semaphore;
pub mod synch;
pub mod wait_queue;

pub use event::EventMode;
pub use synch::{Synch, SynchFlags, SynchId};
pub use wait_queue::WaitQueue;
