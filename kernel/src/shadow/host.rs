//! Host kernel bridge
//!
//! Requests the nucleus sends to the general-purpose kernel about the
//! host task mirroring a shadow thread. Only delivery is requested here;
//! how the host forces its task back into the nucleus is its business.

use core::fmt;

use crate::scheduler::thread::ThreadId;

/// Why a shadow thread left the primary domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelaxReason {
    /// Issued a host system call
    Syscall,
    /// Received a host signal
    Signal,
    /// Took a fault the host must handle
    Fault,
    /// Relaxed while holding a priority boost
    PrioInversion,
    /// Asked for it
    Explicit,
}

impl fmt::Display for RelaxReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Syscall => "syscall",
            Self::Signal => "signal",
            Self::Fault => "fault",
            Self::PrioInversion => "priority inversion",
            Self::Explicit => "explicit",
        };
        f.write_str(s)
    }
}

/// Notification delivered to a host task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    /// Trap back into the nucleus soon (harden)
    Harden,
    /// Domain switch notification for threads with WARNSW set
    Debug(RelaxReason),
    /// The TCB is gone, the host task must exit
    Kill,
}

/// Host side services
pub trait HostBridge: Send + Sync {
    /// Let the host scheduler run the relaxed task
    fn wake_host(&self, thread: ThreadId, pid: u32);

    /// Deliver a notification to the host task
    fn send_signal(&self, thread: ThreadId, pid: u32, signal: HostSignal);

    /// Mirror the nucleus priority onto the host task
    fn renice_host(&self, pid: u32, prio: i32);
}

/// Host requests queued under the global lock, delivered after release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HostRequest {
    Wake { thread: ThreadId, pid: u32 },
    Signal { thread: ThreadId, pid: u32, signal: HostSignal },
    Renice { pid: u32, prio: i32 },
}

impl HostRequest {
    pub(crate) fn deliver(self, host: &dyn HostBridge) {
        match self {
            Self::Wake { thread, pid } => host.wake_host(thread, pid),
            Self::Signal { thread, pid, signal } => host.send_signal(thread, pid, signal),
            Self::Renice { pid, prio } => host.renice_host(pid, prio),
        }
    }
}
