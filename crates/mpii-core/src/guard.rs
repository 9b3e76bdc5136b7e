//! Per-thread recursion guard.
//!
//! Wrappers open a [`CallScope`] for their whole body. Only the outermost
//! scope of a thread runs entry/exit bookkeeping, so an operation implemented
//! on top of other intercepted operations counts as one logical call. The
//! depth is restored on drop, on every exit path.

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static CALL_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Current nesting depth of intercepted calls on this thread.
#[must_use]
pub fn depth() -> u32 {
    CALL_DEPTH.with(Cell::get)
}

/// RAII nesting marker. Not `Send`: it must be dropped on the thread that
/// opened it.
#[derive(Debug)]
pub struct CallScope {
    outermost: bool,
    _not_send: PhantomData<*const ()>,
}

impl CallScope {
    /// Increment this thread's depth.
    #[must_use]
    pub fn enter() -> Self {
        let outermost = CALL_DEPTH.with(|d| {
            let current = d.get();
            d.set(current + 1);
            current == 0
        });
        Self {
            outermost,
            _not_send: PhantomData,
        }
    }

    /// True when this scope took the depth from 0 to 1.
    #[must_use]
    pub const fn is_outermost(&self) -> bool {
        self.outermost
    }
}

impl Drop for CallScope {
    fn drop(&mut self) {
        CALL_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}
