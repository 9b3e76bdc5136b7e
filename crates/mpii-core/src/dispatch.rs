//! Dispatch table and symbol resolver.
//!
//! Every intercepted operation owns one [`Entry`]: its symbol name, a
//! diagnostic id and the address of the genuine implementation once bound.
//! Binding happens at most once per entry. A pre-bound entry (static linkage,
//! an earlier instrumentation pass) is never looked up; otherwise the first
//! resolution asks the [`SymbolSource`] and caches the answer, including a
//! negative one.

use std::cell::Cell;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use crate::error::{MpiiError, MpiiResult};

// Entry binding states.
const STATE_UNBOUND: u8 = 0;
const STATE_RESOLVING: u8 = 1;
const STATE_BOUND: u8 = 2;
const STATE_MISSING: u8 = 3;

thread_local! {
    static RESOLUTION_DEPTH: Cell<u32> = const { Cell::new(0) };
}

struct ResolutionShield;

impl Drop for ResolutionShield {
    fn drop(&mut self) {
        RESOLUTION_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

fn enter_resolution_shield() -> Option<ResolutionShield> {
    RESOLUTION_DEPTH.with(|depth| {
        if depth.get() > 0 {
            None
        } else {
            depth.set(1);
            Some(ResolutionShield)
        }
    })
}

/// Where genuine implementations are looked up.
///
/// The production source is `dlsym(RTLD_NEXT, name)`, which skips the
/// interposition layer itself.
pub trait SymbolSource {
    fn lookup(&self, name: &str) -> Option<NonZeroUsize>;
}

impl<F> SymbolSource for F
where
    F: Fn(&str) -> Option<NonZeroUsize>,
{
    fn lookup(&self, name: &str) -> Option<NonZeroUsize> {
        self(name)
    }
}

/// Index of an operation in its dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub u16);

impl OpId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// One instrumented function.
#[derive(Debug)]
pub struct Entry {
    name: &'static str,
    event_id: i32,
    state: AtomicU8,
    callback: AtomicUsize,
}

impl Entry {
    #[must_use]
    pub const fn new(name: &'static str, event_id: i32) -> Self {
        Self {
            name,
            event_id,
            state: AtomicU8::new(STATE_UNBOUND),
            callback: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub const fn event_id(&self) -> i32 {
        self.event_id
    }

    /// True once the entry is bound or known to be missing.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(
            self.state.load(Ordering::Acquire),
            STATE_BOUND | STATE_MISSING
        )
    }

    /// The bound address, if any, without triggering resolution.
    #[must_use]
    pub fn callback(&self) -> Option<NonZeroUsize> {
        if self.state.load(Ordering::Acquire) == STATE_BOUND {
            NonZeroUsize::new(self.callback.load(Ordering::Acquire))
        } else {
            None
        }
    }

    /// Pre-bind an address found by some other means. Returns false if the
    /// entry was already settled or is being resolved.
    pub fn bind(&self, addr: NonZeroUsize) -> bool {
        if self
            .state
            .compare_exchange(
                STATE_UNBOUND,
                STATE_RESOLVING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }
        self.callback.store(addr.get(), Ordering::Release);
        self.state.store(STATE_BOUND, Ordering::Release);
        true
    }

    /// Resolve the entry, looking it up through `source` at most once.
    pub fn resolve(&self, source: &dyn SymbolSource) -> MpiiResult<NonZeroUsize> {
        loop {
            match self.state.load(Ordering::Acquire) {
                STATE_BOUND => {
                    if let Some(addr) = NonZeroUsize::new(self.callback.load(Ordering::Acquire)) {
                        return Ok(addr);
                    }
                }
                STATE_MISSING => {
                    return Err(MpiiError::Unavailable {
                        operation: self.name,
                    });
                }
                STATE_RESOLVING => {
                    if RESOLUTION_DEPTH.with(Cell::get) > 0 {
                        return Err(MpiiError::ResolutionInProgress {
                            operation: self.name,
                        });
                    }
                    std::thread::yield_now();
                }
                _ => {
                    let Some(_shield) = enter_resolution_shield() else {
                        return Err(MpiiError::ResolutionInProgress {
                            operation: self.name,
                        });
                    };
                    if self
                        .state
                        .compare_exchange(
                            STATE_UNBOUND,
                            STATE_RESOLVING,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_err()
                    {
                        continue;
                    }
                    return match source.lookup(self.name) {
                        Some(addr) => {
                            self.callback.store(addr.get(), Ordering::Release);
                            self.state.store(STATE_BOUND, Ordering::Release);
                            Ok(addr)
                        }
                        None => {
                            self.state.store(STATE_MISSING, Ordering::Release);
                            Err(MpiiError::Unavailable {
                                operation: self.name,
                            })
                        }
                    };
                }
            }
        }
    }
}

/// Process-wide table of instrumented functions.
#[derive(Debug)]
pub struct DispatchTable {
    entries: Box<[Entry]>,
}

impl DispatchTable {
    /// Build a table; diagnostic ids follow the order of `names`.
    ///
    /// # Panics
    ///
    /// Panics if `names` holds more operations than an [`OpId`] can index.
    #[must_use]
    pub fn new(names: &[&'static str]) -> Self {
        assert!(
            names.len() <= usize::from(u16::MAX),
            "dispatch table too large"
        );
        let entries = names
            .iter()
            .copied()
            .enumerate()
            .map(|(idx, name)| Entry::new(name, idx as i32))
            .collect();
        Self { entries }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn entry(&self, op: OpId) -> &Entry {
        &self.entries[op.index()]
    }

    #[must_use]
    pub fn name(&self, op: OpId) -> &'static str {
        self.entry(op).name
    }

    /// Linear scan by symbol name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn op(&self, name: &str) -> MpiiResult<OpId> {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .map(|idx| OpId(idx as u16))
            .ok_or_else(|| MpiiError::unknown_operation(name))
    }

    pub fn resolve(&self, op: OpId, source: &dyn SymbolSource) -> MpiiResult<NonZeroUsize> {
        self.entry(op).resolve(source)
    }

    /// Bind a single named operation.
    pub fn instrument_function(
        &self,
        name: &str,
        source: &dyn SymbolSource,
    ) -> MpiiResult<NonZeroUsize> {
        let entry = self
            .find(name)
            .ok_or_else(|| MpiiError::unknown_operation(name))?;
        entry.resolve(source)
    }

    /// Bind every entry; returns how many ended up bound.
    pub fn instrument_functions(&self, source: &dyn SymbolSource) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.resolve(source).is_ok())
            .count()
    }
}
