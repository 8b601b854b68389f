//! Scheduler core module
//!
//! - `state`: everything behind the global nucleus lock
//! - `nucleus`: the lock itself, the reschedule procedure and hooks
//! - `threads`: thread services built on both
//! - `sched`: one scheduler slot per CPU

pub mod affinity;
pub mod error;
pub mod nucleus;
pub mod policy;
pub mod sched;
pub mod state;
pub mod statistics;
pub mod threads;

pub use affinity::CpuMask;
pub use error::{NucleusError, NucleusResult};
pub use nucleus::{Nucleus, SwitchHook, ThreadHook};
pub use policy::SchedClass;
pub use sched::Sched;
pub use state::NucleusState;
pub use statistics::{NucleusStats, SchedStats};
