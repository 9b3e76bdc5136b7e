//! Process context and MPI lifecycle.
//!
//! One [`ProcessContext`] exists per instrumented process. It owns the
//! dispatch table, the concurrency monitor, the serialization lock, metrics
//! and diagnostics, and caches rank, size and the predefined MPI values once
//! initialization has run. Wrappers receive it by reference.
//!
//! The monitor counts a thread as inside the library where the library can
//! actually be entered concurrently. Without the serialization lock that is
//! the whole outermost call. With the lock engaged it is each forwarded call,
//! counted inside the critical section, so only forwards that bypass the lock
//! can overlap.
//!
//! Lifecycle: `Uninitialized -> Initializing -> Active -> Finalizing ->
//! Finalized`. Initialization and finalization drive the transitions; every
//! other operation expects `Active` but is still forwarded otherwise, so the
//! native library reports its own usage error.

use std::cell::Cell;
use std::num::NonZeroUsize;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::task::Poll;

use crate::config::Settings;
use crate::diag::{DiagEvent, Diagnostics};
use crate::dispatch::{DispatchTable, OpId, SymbolSource};
use crate::error::{MpiiError, MpiiResult};
use crate::flavor::{MpiConstants, MpiFlavor, ThreadLevel};
use crate::guard::CallScope;
use crate::lock::SerializationLock;
use crate::metrics::Metrics;
use crate::monitor::{ConcurrencyMonitor, MonitorEvent};
use crate::poll::poll_until_ready;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Phase {
    Uninitialized = 0,
    Initializing = 1,
    Active = 2,
    Finalizing = 3,
    Finalized = 4,
}

impl Phase {
    const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Initializing,
            2 => Self::Active,
            3 => Self::Finalizing,
            4 => Self::Finalized,
            _ => Self::Uninitialized,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Active => "active",
            Self::Finalizing => "finalizing",
            Self::Finalized => "finalized",
        }
    }
}

/// What the native initialization reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitReport {
    pub rank: i32,
    pub size: i32,
    pub provided: ThreadLevel,
    /// Level the application asked for (`MPI_Init_thread` only).
    pub required: Option<ThreadLevel>,
}

pub struct ProcessContext {
    settings: Settings,
    diag: Diagnostics,
    table: DispatchTable,
    source: Box<dyn SymbolSource + Send + Sync>,
    constants: OnceLock<MpiConstants>,
    monitor: ConcurrencyMonitor,
    lock: SerializationLock,
    metrics: Metrics,
    phase: AtomicU8,
    rank: AtomicI32,
    size: AtomicI32,
    thread_level: AtomicI32,
}

impl std::fmt::Debug for ProcessContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessContext")
            .field("settings", &self.settings)
            .field("phase", &self.phase())
            .field("rank", &self.rank())
            .field("size", &self.size())
            .field("serialize", &self.lock.is_engaged())
            .finish_non_exhaustive()
    }
}

thread_local! {
    static OUTERMOST_OP: Cell<Option<OpId>> = const { Cell::new(None) };
    static COUNTED: Cell<bool> = const { Cell::new(false) };
}

/// Exit-side bookkeeping of an outermost call; runs on every exit path.
struct InFlight<'a> {
    ctx: &'a ProcessContext,
    op: OpId,
    counted: Option<Counted<'a>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        drop(self.counted.take());
        self.ctx.leave_outermost(self.op);
    }
}

/// The calling thread's membership in the monitor. At most one per thread.
struct Counted<'a> {
    ctx: &'a ProcessContext,
    op: OpId,
}

impl Drop for Counted<'_> {
    fn drop(&mut self) {
        COUNTED.with(|c| c.set(false));
        if let Some(event) = self.ctx.monitor.leave(self.op) {
            self.ctx.report(event);
        }
    }
}

impl ProcessContext {
    /// Build the context with diagnostics on stderr.
    pub fn new<S>(settings: Settings, operations: &[&'static str], source: S) -> Self
    where
        S: SymbolSource + Send + Sync + 'static,
    {
        let diag = Diagnostics::stderr(settings.verbose, settings.log_format);
        Self::with_diagnostics(settings, operations, source, diag)
    }

    pub fn with_diagnostics<S>(
        settings: Settings,
        operations: &[&'static str],
        source: S,
        diag: Diagnostics,
    ) -> Self
    where
        S: SymbolSource + Send + Sync + 'static,
    {
        Self {
            settings: settings.normalized(),
            diag,
            table: DispatchTable::new(operations),
            source: Box::new(source),
            constants: OnceLock::new(),
            monitor: ConcurrencyMonitor::new(),
            lock: SerializationLock::new(),
            metrics: Metrics::new(),
            phase: AtomicU8::new(Phase::Uninitialized as u8),
            rank: AtomicI32::new(-1),
            size: AtomicI32::new(-1),
            thread_level: AtomicI32::new(-1),
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub const fn table(&self) -> &DispatchTable {
        &self.table
    }

    #[must_use]
    pub const fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    #[must_use]
    pub const fn monitor(&self) -> &ConcurrencyMonitor {
        &self.monitor
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn rank(&self) -> i32 {
        self.rank.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn size(&self) -> i32 {
        self.size.load(Ordering::Relaxed)
    }

    /// Thread level reported to the application by initialization.
    #[must_use]
    pub fn reported_thread_level(&self) -> Option<ThreadLevel> {
        match self.thread_level.load(Ordering::Acquire) {
            raw if raw < 0 => None,
            raw => Some(ThreadLevel::from_raw(raw)),
        }
    }

    #[must_use]
    pub fn should_serialize(&self) -> bool {
        self.lock.is_engaged()
    }

    /// Predefined MPI values; the flavor is probed on first use.
    pub fn constants(&self) -> &MpiConstants {
        self.constants.get_or_init(|| {
            let flavor = MpiFlavor::detect(self.settings.abi, &*self.source);
            MpiConstants::for_flavor(flavor, &*self.source)
        })
    }

    /// Raw lookup through the context's symbol source, bypassing the table.
    #[must_use]
    pub fn lookup_symbol(&self, name: &str) -> Option<NonZeroUsize> {
        self.source.lookup(name)
    }

    pub fn emit(&self, event: &DiagEvent) {
        self.diag.emit(self.rank(), self.size(), event);
    }

    pub fn op(&self, name: &str) -> MpiiResult<OpId> {
        self.table.op(name)
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Native address of `op`, binding it on first use.
    pub fn resolve(&self, op: OpId) -> MpiiResult<NonZeroUsize> {
        let entry = self.table.entry(op);
        if !entry.is_settled() {
            self.emit(&DiagEvent::Instrumenting {
                function: entry.name(),
            });
        }
        entry.resolve(&*self.source).inspect_err(|err| {
            if err.is_unavailable() {
                Metrics::inc(&self.metrics.unavailable_calls);
                self.emit(&DiagEvent::Unavailable {
                    function: entry.name(),
                });
            }
        })
    }

    /// Bind every operation in one pass; returns how many were found.
    pub fn instrument_all(&self) -> usize {
        self.table
            .iter()
            .filter(|entry| {
                if !entry.is_settled() {
                    self.emit(&DiagEvent::Instrumenting {
                        function: entry.name(),
                    });
                }
                entry.resolve(&*self.source).is_ok()
            })
            .count()
    }

    // -----------------------------------------------------------------------
    // Call protocol
    // -----------------------------------------------------------------------

    /// Run a wrapper body for `op` under the recursion guard and monitor.
    pub fn intercept<R>(&self, op: OpId, body: impl FnOnce() -> R) -> R {
        self.intercept_inner(op, true, body)
    }

    /// Same as [`Self::intercept`] for initialization and finalization,
    /// which run outside the `Active` phase by definition.
    pub fn intercept_lifecycle<R>(&self, op: OpId, body: impl FnOnce() -> R) -> R {
        self.intercept_inner(op, false, body)
    }

    fn intercept_inner<R>(&self, op: OpId, expect_active: bool, body: impl FnOnce() -> R) -> R {
        let scope = CallScope::enter();
        let _in_flight = scope.is_outermost().then(|| InFlight {
            ctx: self,
            op,
            counted: self.enter_outermost(op, expect_active),
        });
        body()
    }

    /// Enter the monitor for the calling thread unless it is already inside.
    fn count(&self, op: Option<OpId>) -> Option<Counted<'_>> {
        if !self.settings.check_concurrency || COUNTED.with(Cell::get) {
            return None;
        }
        let op = op?;
        COUNTED.with(|c| c.set(true));
        let counted = Counted { ctx: self, op };
        if let Some(event) = self.monitor.enter(op) {
            self.report(event);
        }
        Some(counted)
    }

    fn enter_outermost(&self, op: OpId, expect_active: bool) -> Option<Counted<'_>> {
        OUTERMOST_OP.with(|c| c.set(Some(op)));
        // With the lock engaged, forwards are counted inside it instead.
        let counted = if self.lock.is_engaged() {
            None
        } else {
            self.count(Some(op))
        };
        let function = self.table.name(op);
        self.emit(&DiagEvent::Entering { function });
        if expect_active {
            let phase = self.phase();
            if phase != Phase::Active {
                self.emit(&DiagEvent::OutsideActivePhase {
                    function,
                    phase: phase.as_str(),
                });
            }
        }
        counted
    }

    fn leave_outermost(&self, op: OpId) {
        OUTERMOST_OP.with(|c| c.set(None));
        self.emit(&DiagEvent::Leaving {
            function: self.table.name(op),
        });
    }

    fn report(&self, event: MonitorEvent) {
        let name = |op: OpId| self.table.name(op);
        let diag = match event {
            MonitorEvent::Overlap {
                thread,
                op,
                other_thread,
                other_op,
                active,
            } => {
                Metrics::inc(&self.metrics.violations);
                DiagEvent::Overlap {
                    thread,
                    function: name(op),
                    other_thread,
                    other_function: other_op.map(name),
                    active,
                }
            }
            MonitorEvent::OverlappedExit {
                thread,
                op,
                other_thread,
                other_op,
                active,
            } => {
                Metrics::inc(&self.metrics.overlapped_exits);
                DiagEvent::OverlappedExit {
                    thread,
                    function: name(op),
                    other_thread,
                    other_function: other_op.map(name),
                    active,
                }
            }
        };
        self.emit(&diag);
        if self.settings.abort_on_violation {
            std::process::abort();
        }
    }

    /// Forward one native call, inside the serialization lock if engaged.
    pub fn forward<R>(&self, call: impl FnOnce() -> R) -> R {
        Metrics::inc(&self.metrics.forwarded_calls);
        let guard = self.lock.acquire();
        if guard.is_held() {
            Metrics::inc(&self.metrics.serialized_calls);
        }
        let _counted = self.count(OUTERMOST_OP.with(Cell::get));
        call()
    }

    /// Forward one native call without the lock (initialization and abort).
    /// With the lock engaged it can still overlap a locked call, and the
    /// monitor reports that.
    pub fn forward_unlocked<R>(&self, call: impl FnOnce() -> R) -> R {
        Metrics::inc(&self.metrics.forwarded_calls);
        let _counted = self.count(OUTERMOST_OP.with(Cell::get));
        call()
    }

    /// Replace a blocking call by polling its non-blocking probe; each probe
    /// is one forwarded call. The lock is never held between probes.
    pub fn poll<T>(&self, mut probe: impl FnMut() -> Poll<T>) -> T {
        Metrics::inc(&self.metrics.polled_waits);
        let outcome = poll_until_ready(|| self.forward(&mut probe));
        Metrics::add(&self.metrics.poll_probes, outcome.probes);
        outcome.value
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    fn transition(&self, from: Phase, to: Phase) -> MpiiResult<()> {
        self.phase
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| MpiiError::InvalidTransition {
                from: Phase::from_u8(actual),
                to,
            })
    }

    fn note_misuse(&self, op: OpId, err: &MpiiError) {
        self.emit(&DiagEvent::LifecycleMisuse {
            function: self.table.name(op),
            detail: err.to_string(),
        });
    }

    /// Enter `Initializing`. On misuse the caller still forwards.
    pub fn begin_init(&self, op: OpId) -> MpiiResult<()> {
        self.transition(Phase::Uninitialized, Phase::Initializing)
            .inspect_err(|err| self.note_misuse(op, err))
    }

    /// Native initialization failed: go back to `Uninitialized`.
    pub fn abort_init(&self) {
        let _ = self.transition(Phase::Initializing, Phase::Uninitialized);
    }

    /// Record what initialization found, take the serialization decision and
    /// enter `Active`. Returns the thread level to report to the application.
    pub fn complete_init(&self, report: InitReport) -> ThreadLevel {
        let serialize = self
            .settings
            .serialization_policy()
            .should_serialize(report.provided == ThreadLevel::Multiple);
        self.lock.engage(serialize);
        self.rank.store(report.rank, Ordering::Relaxed);
        self.size.store(report.size, Ordering::Relaxed);

        let reported = match report.required {
            Some(required) if serialize => report.provided.max(required),
            _ => report.provided,
        };
        self.thread_level.store(reported.as_raw(), Ordering::Release);
        let _ = self.transition(Phase::Initializing, Phase::Active);
        self.emit(&DiagEvent::Initialized {
            flavor: self.constants().flavor.as_str(),
            provided: report.provided.as_str(),
            reported: reported.as_str(),
            serialize,
        });
        reported
    }

    /// Enter `Finalizing`. On misuse the caller still forwards.
    pub fn begin_finalize(&self, op: OpId) -> MpiiResult<()> {
        self.transition(Phase::Active, Phase::Finalizing)
            .inspect_err(|err| self.note_misuse(op, err))
    }

    /// Leave `Finalizing`: `Finalized` on success, back to `Active` otherwise.
    pub fn complete_finalize(&self, succeeded: bool) {
        let to = if succeeded {
            Phase::Finalized
        } else {
            Phase::Active
        };
        if self.transition(Phase::Finalizing, to).is_ok() && succeeded {
            self.emit(&DiagEvent::Summary {
                metrics: self.metrics.snapshot(),
            });
        }
    }
}
