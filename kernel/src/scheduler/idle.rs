//! Root threads
//!
//! One placeholder TCB per CPU stands for "no RT thread running": the
//! idle loop, or the host kernel when it owns the CPU. It belongs to the
//! idle class, sits below every RT priority, is never queued and can be
//! neither blocked nor deleted.

use alloc::format;

use super::core::affinity::CpuMask;
use super::core::policy::{SchedClass, IDLE_PRIO};
use super::thread::{Thread, ThreadAttr, ThreadId, ThreadState};

/// Build the root thread of `cpu`
pub(crate) fn root_thread(tid: ThreadId, cpu: usize) -> Thread {
    let attr = ThreadAttr::new(&format!("ROOT/{}", cpu), IDLE_PRIO)
        .with_affinity(CpuMask::single(cpu));
    let mut th = Thread::new(tid, &attr, SchedClass::Idle, cpu);
    th.state = ThreadState::ROOT | ThreadState::STARTED;
    th
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libutils::collections::Arena;

    #[test]
    fn test_root_thread_is_runnable_idle() {
        let mut arena: Arena<()> = Arena::new();
        let th = root_thread(ThreadId(arena.insert(())), 3);
        assert!(th.is_root());
        assert!(th.state().is_runnable());
        assert_eq!(th.current_priority(), IDLE_PRIO);
        assert_eq!(th.name(), "ROOT/3");
        assert_eq!(th.cpu(), 3);
    }
}
