//! Real-time scheduling support

pub mod latency;
pub mod priorities;

pub use latency::{LatencySnapshot, LatencyTracker};
pub use priorities::{RealtimePriority, RT_PRIORITY_MAX, RT_PRIORITY_MIN};
