//! Deterministic platform
//!
//! Implements every platform interface in memory: the clock only moves
//! when told to, the current CPU is settable, and each request is
//! recorded in order. `switch_context` returns immediately, so a thread
//! that blocks gets `Suspended` and its outcome is collected later with
//! `Nucleus::wait_result`.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use spin::Mutex;

use super::{Hal, IrqFlags};
use crate::scheduler::thread::ThreadId;
use crate::shadow::host::{HostBridge, HostSignal};
use crate::time::clock::ClockSource;

/// One recorded platform request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    Switch { cpu: usize, from: ThreadId, to: ThreadId },
    Ipi { cpu: usize },
    Program { cpu: usize, delay: u64 },
    WakeHost { thread: ThreadId, pid: u32 },
    Signal { thread: ThreadId, pid: u32, signal: HostSignal },
    Renice { pid: u32, prio: i32 },
}

/// In-memory platform
pub struct SimPlatform {
    cpu: AtomicUsize,
    now: AtomicU64,
    irqs_on: AtomicBool,
    events: Mutex<Vec<SimEvent>>,
}

impl SimPlatform {
    pub const fn new() -> Self {
        Self {
            cpu: AtomicUsize::new(0),
            now: AtomicU64::new(0),
            irqs_on: AtomicBool::new(true),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Make subsequent calls execute on `cpu`
    pub fn set_cpu(&self, cpu: usize) {
        self.cpu.store(cpu, Ordering::Relaxed);
    }

    pub fn set_time(&self, now: u64) {
        self.now.store(now, Ordering::Relaxed);
    }

    /// Move the clock forward, returning the new date
    pub fn advance(&self, ticks: u64) -> u64 {
        self.now.fetch_add(ticks, Ordering::Relaxed) + ticks
    }

    pub fn irqs_enabled(&self) -> bool {
        self.irqs_on.load(Ordering::Relaxed)
    }

    fn record(&self, event: SimEvent) {
        self.events.lock().push(event);
    }

    /// All requests recorded so far
    pub fn events(&self) -> Vec<SimEvent> {
        self.events.lock().clone()
    }

    /// Drain the recorded requests
    pub fn take_events(&self) -> Vec<SimEvent> {
        core::mem::take(&mut *self.events.lock())
    }

    /// Context switches as `(cpu, from, to)`
    pub fn switches(&self) -> Vec<(usize, ThreadId, ThreadId)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match *e {
                SimEvent::Switch { cpu, from, to } => Some((cpu, from, to)),
                _ => None,
            })
            .collect()
    }

    /// CPUs that received a reschedule IPI
    pub fn ipis(&self) -> Vec<usize> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match *e {
                SimEvent::Ipi { cpu } => Some(cpu),
                _ => None,
            })
            .collect()
    }

    /// Host notifications as `(thread, signal)`
    pub fn signals(&self) -> Vec<(ThreadId, HostSignal)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match *e {
                SimEvent::Signal { thread, signal, .. } => Some((thread, signal)),
                _ => None,
            })
            .collect()
    }

    /// Delay of the last one-shot programmed on `cpu`
    pub fn last_program(&self, cpu: usize) -> Option<u64> {
        self.events.lock().iter().rev().find_map(|e| match *e {
            SimEvent::Program { cpu: c, delay } if c == cpu => Some(delay),
            _ => None,
        })
    }
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Hal for SimPlatform {
    fn current_cpu(&self) -> usize {
        self.cpu.load(Ordering::Relaxed)
    }

    fn switch_context(&self, cpu: usize, out: ThreadId, incoming: ThreadId) {
        self.record(SimEvent::Switch { cpu, from: out, to: incoming });
    }

    fn request_reschedule(&self, cpu: usize) {
        self.record(SimEvent::Ipi { cpu });
    }

    fn irq_save(&self) -> IrqFlags {
        IrqFlags(self.irqs_on.swap(false, Ordering::Relaxed) as u64)
    }

    fn irq_restore(&self, flags: IrqFlags) {
        self.irqs_on.store(flags.0 != 0, Ordering::Relaxed);
    }
}

impl ClockSource for SimPlatform {
    fn read_ticks(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }

    fn program_next_tick(&self, cpu: usize, delay: u64) {
        self.record(SimEvent::Program { cpu, delay });
    }
}

impl HostBridge for SimPlatform {
    fn wake_host(&self, thread: ThreadId, pid: u32) {
        self.record(SimEvent::WakeHost { thread, pid });
    }

    fn send_signal(&self, thread: ThreadId, pid: u32, signal: HostSignal) {
        self.record(SimEvent::Signal { thread, pid, signal });
    }

    fn renice_host(&self, pid: u32, prio: i32) {
        self.record(SimEvent::Renice { pid, prio });
    }
}
