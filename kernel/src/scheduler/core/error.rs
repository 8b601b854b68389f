//! Nucleus Error Handling
//!
//! Typed errors for every nucleus service, plus the fatal channel used
//! when internal scheduler state is found inconsistent.

use core::fmt;

use crate::scheduler::thread::ThreadId;

/// Nucleus error types with detailed context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NucleusError {
    // ═══════════════════════════════════════════════════════════════
    // API Errors (returned synchronously)
    // ═══════════════════════════════════════════════════════════════

    /// Operation forbidden in the current state of the thread or object
    InvalidState { reason: &'static str },

    /// Priority outside the scheduling class range
    InvalidPriority { value: i32, min: i32, max: i32 },

    /// CPU outside the online set, or empty affinity
    InvalidCpu { cpu: usize },

    /// Mutex released by a thread that does not own it
    NotOwner,

    /// Non-blocking attempt on an unavailable resource
    WouldBlock,

    // ═══════════════════════════════════════════════════════════════
    // Wait Outcomes (returned once the waiter resumes)
    // ═══════════════════════════════════════════════════════════════

    /// The timed wait elapsed before being satisfied
    TimedOut,

    /// The wait was forcibly aborted (unblock, deletion, kick)
    Interrupted,

    /// The object waited upon was destroyed
    Deleted,

    /// The caller was switched out and has not run again yet.
    /// Collect the outcome later with `Nucleus::wait_result`.
    Suspended { thread: ThreadId },

    // ═══════════════════════════════════════════════════════════════
    // Internal Errors (should never happen)
    // ═══════════════════════════════════════════════════════════════

    /// Internal scheduler invariant violated
    InvariantViolation { reason: &'static str },
}

impl fmt::Display for NucleusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidState { reason } => write!(f, "Invalid state: {}", reason),
            Self::InvalidPriority { value, min, max } => {
                write!(f, "Priority {} outside [{}, {}]", value, min, max)
            }
            Self::InvalidCpu { cpu } => write!(f, "CPU {} not available", cpu),
            Self::NotOwner => write!(f, "Caller does not own the mutex"),
            Self::WouldBlock => write!(f, "Resource unavailable"),
            Self::TimedOut => write!(f, "Wait timed out"),
            Self::Interrupted => write!(f, "Wait interrupted"),
            Self::Deleted => write!(f, "Object deleted"),
            Self::Suspended { thread } => write!(f, "Thread {} suspended", thread),
            Self::InvariantViolation { reason } => {
                write!(f, "Invariant violated: {}", reason)
            }
        }
    }
}

impl NucleusError {
    /// Get recovery hint for this error
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            Self::InvalidState { .. } => "Check thread lifecycle management",
            Self::InvalidPriority { .. } => "Use a priority inside the class range",
            Self::InvalidCpu { .. } => "Restrict affinity to online CPUs",
            Self::NotOwner => "Only the owner may release a mutex",
            Self::WouldBlock => "Retry or wait with a timeout",
            Self::TimedOut => "Increase timeout or check the signaller",
            Self::Suspended { .. } => "Collect the outcome with wait_result",
            Self::InvariantViolation { .. } => "Scheduler state is corrupted",
            _ => "Check the waker side",
        }
    }

    /// Is this a recoverable error?
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvariantViolation { .. })
    }

    /// Wait outcomes are the normal end of a blocking call
    pub fn is_wait_outcome(&self) -> bool {
        matches!(
            self,
            Self::TimedOut | Self::Interrupted | Self::Deleted | Self::Suspended { .. }
        )
    }

    /// Should this error be logged?
    pub fn should_log(&self) -> bool {
        !self.is_wait_outcome() && !matches!(self, Self::WouldBlock)
    }

    /// Get error severity (0-3)
    pub fn severity(&self) -> u8 {
        match self {
            Self::InvariantViolation { .. } => 3, // Critical
            Self::NotOwner => 2,                  // Severe
            Self::InvalidState { .. } => 1,       // Warning
            Self::InvalidPriority { .. } => 1,
            Self::InvalidCpu { .. } => 1,
            _ => 0,                               // Info
        }
    }
}

/// Result type for nucleus operations
pub type NucleusResult<T> = Result<T, NucleusError>;

/// Report a broken internal invariant.
///
/// Debug builds halt with a diagnostic. Release builds log at error
/// level and let the caller continue with its best-effort recovery.
#[track_caller]
pub fn invariant_violation(reason: &'static str) {
    let loc = core::panic::Location::caller();
    if cfg!(debug_assertions) {
        panic!("[SCHED CRITICAL] Invariant violated: {} ({})", reason, loc);
    }
    log::error!("[SCHED CRITICAL] Invariant violated: {} ({})", reason, loc);
}

/// Macro to log nucleus errors with context
#[macro_export]
macro_rules! sched_error {
    ($err:expr) => {{
        let err = $err;
        if err.should_log() {
            $crate::logger::error(&alloc::format!(
                "[SCHED] Error: {} (hint: {})",
                err,
                err.recovery_hint()
            ));
        }
        err
    }};
}

/// Macro for critical scheduler assertions
#[macro_export]
macro_rules! sched_assert {
    ($cond:expr, $reason:expr) => {
        if !$cond {
            $crate::scheduler::core::error::invariant_violation($reason);
        }
    };
}
