//! Clock source and timeouts
//!
//! Dates are raw clock ticks as returned by `ClockSource::read_ticks`.

/// Monotonic time base driving timed waits
pub trait ClockSource: Send + Sync {
    /// Monotonic tick counter
    fn read_ticks(&self) -> u64;

    /// Request a one-shot `tick_handler` call on `cpu` after `delay` ticks
    fn program_next_tick(&self, cpu: usize, delay: u64);
}

/// Timeout of a blocking call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Wait until satisfied or aborted
    Infinite,
    /// Never wait, fail with `WouldBlock`
    NonBlocking,
    /// Ticks from now
    Relative(u64),
    /// Absolute clock date
    Absolute(u64),
}

/// A timeout resolved against the current date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Deadline {
    Never,
    At(u64),
    /// Deadline already reached
    Expired,
    /// Caller refuses to wait
    Poll,
}

impl Timeout {
    pub(crate) fn resolve(self, now: u64) -> Deadline {
        match self {
            Self::Infinite => Deadline::Never,
            Self::NonBlocking => Deadline::Poll,
            Self::Relative(0) => Deadline::Expired,
            Self::Relative(delay) => Deadline::At(now.saturating_add(delay)),
            Self::Absolute(date) if date <= now => Deadline::Expired,
            Self::Absolute(date) => Deadline::At(date),
        }
    }
}
