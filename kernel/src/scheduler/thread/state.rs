//! State - Thread state machine
//!
//! A thread's condition is a set of compatible bits rather than a single
//! enum value: a thread may be pending on an object *and* explicitly
//! suspended, and only becomes runnable once every blocking bit clears.

use alloc::string::String;
use bitflags::bitflags;

bitflags! {
    /// Scheduling state bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ThreadState: u32 {
        /// Explicitly suspended
        const SUSP    = 1 << 0;
        /// Pending on a synchronization object
        const PEND    = 1 << 1;
        /// Timed sleep or timed wait
        const DELAY   = 1 << 2;
        /// Linked in a ready queue
        const READY   = 1 << 3;
        /// Created, not started yet
        const DORMANT = 1 << 4;
        /// Deleted, awaiting reclamation
        const ZOMBIE  = 1 << 5;
        /// Has been started at least once
        const STARTED = 1 << 6;
        /// Running in the secondary (host) domain
        const RELAX   = 1 << 7;
        /// Priority raised by inheritance
        const BOOST   = 1 << 8;
        /// Preemption disabled
        const LOCK    = 1 << 9;
        /// Round-robin enabled
        const RRB     = 1 << 10;
        /// Notify the host on domain switches
        const WARNSW  = 1 << 11;
        /// Mirrored by a host task
        const SHADOW  = 1 << 12;
        /// Per-CPU root (idle/host placeholder) thread
        const ROOT    = 1 << 13;
    }
}

bitflags! {
    /// Wake-up information bits, set by whoever ends a wait
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WakeInfo: u32 {
        /// Timeout elapsed
        const TIMEO  = 1 << 0;
        /// Object deleted while pending
        const RMID   = 1 << 1;
        /// Forcibly unblocked
        const BREAK  = 1 << 2;
        /// Kicked out of primary mode by the host
        const KICKED = 1 << 3;
        /// Woken by a normal signal path
        const WAKEN  = 1 << 4;
    }
}

impl ThreadState {
    /// Any of these keeps a thread off its ready queue
    pub const BLOCK_BITS: Self = Self::SUSP
        .union(Self::PEND)
        .union(Self::DELAY)
        .union(Self::DORMANT)
        .union(Self::RELAX);

    /// Bits a client may change through `set_mode`
    pub const MODE_BITS: Self = Self::LOCK.union(Self::RRB).union(Self::WARNSW);

    /// Can the scheduler pick this thread?
    pub fn is_runnable(self) -> bool {
        !self.intersects(Self::BLOCK_BITS | Self::ZOMBIE)
    }

    pub fn domain(self) -> Domain {
        if self.contains(Self::RELAX) {
            Domain::Secondary
        } else {
            Domain::Primary
        }
    }

    /// One letter per set bit, in bit order, '.' padding for clear bits
    /// up to the last set one.
    pub fn labels(self) -> String {
        const LABELS: [(ThreadState, char); 14] = [
            (ThreadState::SUSP, 'S'),
            (ThreadState::PEND, 'W'),
            (ThreadState::DELAY, 'D'),
            (ThreadState::READY, 'R'),
            (ThreadState::DORMANT, 'U'),
            (ThreadState::ZOMBIE, 'Z'),
            (ThreadState::STARTED, '.'),
            (ThreadState::RELAX, 'X'),
            (ThreadState::BOOST, 'b'),
            (ThreadState::LOCK, 'l'),
            (ThreadState::RRB, 'r'),
            (ThreadState::WARNSW, 'T'),
            (ThreadState::SHADOW, 'o'),
            (ThreadState::ROOT, 'f'),
        ];
        let mut out = String::new();
        let mut pending_dots = 0;
        for (bit, label) in LABELS {
            if self.contains(bit) && label != '.' {
                out.extend(core::iter::repeat('.').take(pending_dots));
                out.push(label);
                pending_dots = 0;
            } else {
                pending_dots += 1;
            }
        }
        out
    }
}

/// Domain a thread currently executes in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// Deterministic, scheduled by the nucleus
    Primary,
    /// Relaxed, scheduled by the host kernel
    Secondary,
}
