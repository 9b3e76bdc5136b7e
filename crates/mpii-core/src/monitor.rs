//! Single-flight concurrency monitor.
//!
//! Counts threads inside intercepted calls with a lock-free counter. Entering
//! when the counter was already non-zero is a violation; leaving while it
//! stays non-zero is reported as the exit side of that same overlap. The
//! holder record (thread, operation) is written without synchronization and
//! only feeds diagnostics: this is a detector, not a lock.

use std::cell::Cell;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};

use crate::dispatch::OpId;

const NO_OP: u32 = u32::MAX;
const NO_THREAD: u64 = 0;

static NEXT_THREAD_TAG: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TAG: Cell<u64> = const { Cell::new(NO_THREAD) };
}

/// Small, stable, non-zero identity for the calling thread.
#[must_use]
pub fn thread_tag() -> u64 {
    THREAD_TAG.with(|slot| {
        let existing = slot.get();
        if existing != NO_THREAD {
            return existing;
        }
        let tag = NEXT_THREAD_TAG.fetch_add(1, Ordering::Relaxed);
        slot.set(tag);
        tag
    })
}

/// What the monitor saw on an entry or exit that broke single-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEvent {
    /// `thread` entered `op` while `other_thread` was inside `other_op`.
    Overlap {
        thread: u64,
        op: OpId,
        other_thread: u64,
        other_op: Option<OpId>,
        active: i32,
    },
    /// `thread` left `op` while `other_thread` was still inside `other_op`.
    OverlappedExit {
        thread: u64,
        op: OpId,
        other_thread: u64,
        other_op: Option<OpId>,
        active: i32,
    },
}

impl MonitorEvent {
    /// Entry-side events open a new violation; exit-side events describe
    /// the tail of one already counted.
    #[must_use]
    pub const fn is_new_violation(&self) -> bool {
        matches!(self, Self::Overlap { .. })
    }
}

/// Process-wide in-flight record.
#[derive(Debug)]
pub struct ConcurrencyMonitor {
    active: AtomicI32,
    holder_thread: AtomicU64,
    holder_op: AtomicU32,
    violations: AtomicU64,
    overlapped_exits: AtomicU64,
}

impl Default for ConcurrencyMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConcurrencyMonitor {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            active: AtomicI32::new(0),
            holder_thread: AtomicU64::new(NO_THREAD),
            holder_op: AtomicU32::new(NO_OP),
            violations: AtomicU64::new(0),
            overlapped_exits: AtomicU64::new(0),
        }
    }

    fn holder(&self) -> (u64, Option<OpId>) {
        let thread = self.holder_thread.load(Ordering::Relaxed);
        let op = self.holder_op.load(Ordering::Relaxed);
        let op = u16::try_from(op).ok().map(OpId);
        (thread, op)
    }

    fn set_holder(&self, thread: u64, op: Option<OpId>) {
        self.holder_thread.store(thread, Ordering::Relaxed);
        self.holder_op
            .store(op.map_or(NO_OP, |op| u32::from(op.0)), Ordering::Relaxed);
    }

    /// Record that the calling thread entered `op`.
    pub fn enter(&self, op: OpId) -> Option<MonitorEvent> {
        let thread = thread_tag();
        let active = self.active.fetch_add(1, Ordering::AcqRel) + 1;
        let event = if active == 1 {
            None
        } else {
            self.violations.fetch_add(1, Ordering::Relaxed);
            let (other_thread, other_op) = self.holder();
            Some(MonitorEvent::Overlap {
                thread,
                op,
                other_thread,
                other_op,
                active,
            })
        };
        self.set_holder(thread, Some(op));
        event
    }

    /// Record that the calling thread left `op`.
    pub fn leave(&self, op: OpId) -> Option<MonitorEvent> {
        let thread = thread_tag();
        let active = self.active.fetch_sub(1, Ordering::AcqRel) - 1;
        if active == 0 {
            self.set_holder(NO_THREAD, None);
            return None;
        }
        self.overlapped_exits.fetch_add(1, Ordering::Relaxed);
        let (other_thread, other_op) = self.holder();
        Some(MonitorEvent::OverlappedExit {
            thread,
            op,
            other_thread,
            other_op,
            active,
        })
    }

    /// Calls currently in flight.
    #[must_use]
    pub fn active(&self) -> i32 {
        self.active.load(Ordering::Acquire)
    }

    /// Overlaps detected at entry.
    #[must_use]
    pub fn violations(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn overlapped_exits(&self) -> u64 {
        self.overlapped_exits.load(Ordering::Relaxed)
    }
}
