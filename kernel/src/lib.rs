// src/lib.rs
// Point d'entrée de la bibliothèque du nucleus temps réel
//! Dual-kernel real-time nucleus
//!
//! A deterministic, priority-based thread scheduler meant to run ahead
//! of a general-purpose host kernel, with the synchronization objects
//! built on it (mutexes with priority inheritance, semaphores, event
//! flags, message queues, wait queues) and the relax/harden protocol
//! moving shadow threads between the two kernels.
//!
//! The embedding platform plugs in through three traits: [`hal::Hal`]
//! (context switch, IPIs, interrupt masking), [`time::ClockSource`] and
//! [`shadow::HostBridge`]. [`hal::sim::SimPlatform`] implements all of
//! them in memory.
//!
//! ```ignore
//! let sim = Arc::new(SimPlatform::new());
//! let nucleus = Nucleus::new(NucleusConfig::default(), Platform::from_shared(sim))?;
//! let t = nucleus.create(ThreadAttr::new("worker", 50))?;
//! nucleus.start(t)?;
//! ```
#![no_std] // Pas de bibliothèque standard

// Import de alloc pour les allocations dynamiques
extern crate alloc;

// Les tests tournent sur l'hôte
#[cfg(test)]
extern crate std;

// Modules du nucleus
pub mod config;
pub mod hal;
pub mod libutils; // Bibliothèque de modules réutilisables
pub mod logger;
pub mod registry;
pub mod scheduler;
pub mod shadow;
pub mod sync;
pub mod time;

pub use config::{NucleusConfig, TimerMode};
pub use hal::{Hal, Platform};
pub use scheduler::core::{CpuMask, Nucleus, NucleusError, NucleusResult};
pub use scheduler::realtime::RealtimePriority;
pub use scheduler::thread::{Completion, ThreadAttr, ThreadId, ThreadSnapshot, ThreadState};
pub use shadow::{HostBridge, HostSignal, RelaxReason};
pub use sync::{EventMode, SynchFlags, SynchId, WaitQueue};
pub use time::{ClockSource, Timeout};
