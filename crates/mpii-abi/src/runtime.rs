//! Process-wide context cell and native symbol lookup.

use std::ffi::{CString, c_int};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

use mpii_core::{ProcessContext, Settings, SymbolSource};

use crate::ops::Operation;

// Context lifecycle states.
const STATE_UNINIT: u8 = 0;
const STATE_INITIALIZING: u8 = 1;
const STATE_READY: u8 = 2;

// Same shape as a lazily built runtime kernel: UNINIT -> INITIALIZING -> READY.
// Building the context never calls into MPI, so a thread that sees
// INITIALIZING only has to wait for another thread to publish.
static CONTEXT_STATE: AtomicU8 = AtomicU8::new(STATE_UNINIT);
static CONTEXT_PTR: AtomicPtr<ProcessContext> = AtomicPtr::new(std::ptr::null_mut());

/// Symbols of the objects loaded after this one (`dlsym(RTLD_NEXT, ...)`).
#[derive(Debug, Clone, Copy, Default)]
pub struct NextObjectSymbols;

impl SymbolSource for NextObjectSymbols {
    fn lookup(&self, name: &str) -> Option<NonZeroUsize> {
        let symbol = CString::new(name).ok()?;
        // SAFETY: `symbol` is a valid NUL-terminated string for the call.
        let ptr = unsafe { libc::dlsym(libc::RTLD_NEXT, symbol.as_ptr()) };
        NonZeroUsize::new(ptr as usize)
    }
}

fn publish(ctx: ProcessContext) -> &'static ProcessContext {
    // Leaked: lives for the rest of the process.
    let ptr = Box::into_raw(Box::new(ctx));
    CONTEXT_PTR.store(ptr, Ordering::Release);
    CONTEXT_STATE.store(STATE_READY, Ordering::Release);
    // SAFETY: just allocated and never freed.
    unsafe { &*ptr }
}

/// Install `ctx` as the process context. Fails (handing `ctx` back) if a
/// context already exists.
pub fn install(ctx: ProcessContext) -> Result<&'static ProcessContext, ProcessContext> {
    if CONTEXT_STATE
        .compare_exchange(
            STATE_UNINIT,
            STATE_INITIALIZING,
            Ordering::SeqCst,
            Ordering::Relaxed,
        )
        .is_err()
    {
        return Err(ctx);
    }
    Ok(publish(ctx))
}

/// The process context, built from the environment on first use.
pub fn context() -> &'static ProcessContext {
    loop {
        match CONTEXT_STATE.load(Ordering::Acquire) {
            STATE_READY => {
                // SAFETY: once READY, CONTEXT_PTR is valid and never changes.
                return unsafe { &*CONTEXT_PTR.load(Ordering::Acquire) };
            }
            STATE_UNINIT => {
                if CONTEXT_STATE
                    .compare_exchange(
                        STATE_UNINIT,
                        STATE_INITIALIZING,
                        Ordering::SeqCst,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    return publish(ProcessContext::new(
                        Settings::from_env(),
                        Operation::NAMES,
                        NextObjectSymbols,
                    ));
                }
            }
            _ => std::thread::yield_now(),
        }
    }
}

/// Typed native entry point for `op`, or the code to return when it is
/// missing.
///
/// # Safety
///
/// `F` must be the `unsafe extern "C" fn` type matching the native symbol
/// bound to `op`.
pub(crate) unsafe fn native<F: Copy>(ctx: &ProcessContext, op: Operation) -> Result<F, c_int> {
    const { assert!(size_of::<F>() == size_of::<usize>()) };
    match ctx.resolve(op.id()) {
        // SAFETY: same size checked above; the signature is the caller's contract.
        Ok(addr) => Ok(unsafe { std::mem::transmute_copy::<usize, F>(&addr.get()) }),
        Err(_) => Err(ctx.constants().err_unsupported_operation),
    }
}
