//! Atomic counters for interceptor observability.
//!
//! Counters use relaxed ordering; they are read for reporting only and never
//! synchronize anything.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Process-wide interceptor counters.
#[derive(Debug)]
pub struct Metrics {
    /// Native calls forwarded, nested ones included.
    pub forwarded_calls: AtomicU64,
    /// Forwarded calls that held the serialization lock.
    pub serialized_calls: AtomicU64,
    /// Blocking calls replaced by a poll loop.
    pub polled_waits: AtomicU64,
    /// Probes issued by poll loops.
    pub poll_probes: AtomicU64,
    /// Overlapping calls detected at entry.
    pub violations: AtomicU64,
    /// Calls that left while another call was still in flight.
    pub overlapped_exits: AtomicU64,
    /// Calls refused because no native implementation was found.
    pub unavailable_calls: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new zeroed metrics instance.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            forwarded_calls: AtomicU64::new(0),
            serialized_calls: AtomicU64::new(0),
            polled_waits: AtomicU64::new(0),
            poll_probes: AtomicU64::new(0),
            violations: AtomicU64::new(0),
            overlapped_exits: AtomicU64::new(0),
            unavailable_calls: AtomicU64::new(0),
        }
    }

    /// Increment a counter by 1.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Read a counter value.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            forwarded_calls: Self::get(&self.forwarded_calls),
            serialized_calls: Self::get(&self.serialized_calls),
            polled_waits: Self::get(&self.polled_waits),
            poll_probes: Self::get(&self.poll_probes),
            violations: Self::get(&self.violations),
            overlapped_exits: Self::get(&self.overlapped_exits),
            unavailable_calls: Self::get(&self.unavailable_calls),
        }
    }
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub forwarded_calls: u64,
    pub serialized_calls: u64,
    pub polled_waits: u64,
    pub poll_probes: u64,
    pub violations: u64,
    pub overlapped_exits: u64,
    pub unavailable_calls: u64,
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "forwarded={} serialized={} polled_waits={} poll_probes={} violations={} overlapped_exits={} unavailable={}",
            self.forwarded_calls,
            self.serialized_calls,
            self.polled_waits,
            self.poll_probes,
            self.violations,
            self.overlapped_exits,
            self.unavailable_calls,
        )
    }
}
