//! Initialization, finalization and process queries.
//!
//! Initialization calls the native library directly, outside the
//! serialization lock: no other thread can be inside MPI yet. It then reads
//! rank, size and thread level, which settle the serialization decision.

#![allow(non_snake_case)]

use std::ffi::{c_char, c_int};

use mpii_core::{InitReport, ProcessContext, ThreadLevel};

use crate::ffi::{Comm, CommQueryFn, FinalizeFn, FlagFn, InitFn, InitThreadFn};
use crate::ops::Operation;
use crate::runtime::{self, native};

/// Rank and size on `MPI_COMM_WORLD`; `-1` where the query is unavailable.
fn query_world(ctx: &ProcessContext) -> (c_int, c_int) {
    let world = ctx.constants().comm_world;
    let ask = |op: Operation| {
        let mut value: c_int = -1;
        // SAFETY: Comm_rank/Comm_size share `CommQueryFn`.
        if let Ok(query) = unsafe { native::<CommQueryFn>(ctx, op) } {
            // SAFETY: `value` outlives the call.
            ctx.forward_unlocked(|| unsafe { query(world, &raw mut value) });
        }
        value
    };
    (ask(Operation::CommRank), ask(Operation::CommSize))
}

/// Thread level the library grants after plain `MPI_Init`.
fn query_provided(ctx: &ProcessContext) -> ThreadLevel {
    let mut provided = ThreadLevel::Single.as_raw();
    // SAFETY: MPI_Query_thread has signature `FlagFn`.
    if let Ok(query) = unsafe { native::<FlagFn>(ctx, Operation::QueryThread) } {
        // SAFETY: `provided` outlives the call.
        ctx.forward_unlocked(|| unsafe { query(&raw mut provided) });
    }
    ThreadLevel::from_raw(provided)
}

/// Finish an initialization that this call started. Returns the level to
/// report, or `None` when the native call failed.
fn settle_init(
    ctx: &ProcessContext,
    ret: c_int,
    provided: Option<ThreadLevel>,
    required: Option<ThreadLevel>,
) -> Option<ThreadLevel> {
    if ret != ctx.constants().success {
        ctx.abort_init();
        return None;
    }
    let provided = provided.unwrap_or_else(|| query_provided(ctx));
    let (rank, size) = query_world(ctx);
    Some(ctx.complete_init(InitReport {
        rank,
        size,
        provided,
        required,
    }))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn MPI_Init(argc: *mut c_int, argv: *mut *mut *mut c_char) -> c_int {
    let ctx = runtime::context();
    let op = Operation::Init;
    ctx.intercept_lifecycle(op.id(), || {
        let fresh = ctx.begin_init(op.id()).is_ok();
        if fresh {
            ctx.instrument_all();
        }
        // SAFETY: MPI_Init has signature `InitFn`.
        let init = match unsafe { native::<InitFn>(ctx, op) } {
            Ok(init) => init,
            Err(code) => {
                if fresh {
                    ctx.abort_init();
                }
                return code;
            }
        };
        // SAFETY: arguments are forwarded verbatim.
        let ret = ctx.forward_unlocked(|| unsafe { init(argc, argv) });
        if fresh {
            settle_init(ctx, ret, None, None);
        }
        ret
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn MPI_Init_thread(
    argc: *mut c_int,
    argv: *mut *mut *mut c_char,
    required: c_int,
    provided: *mut c_int,
) -> c_int {
    let ctx = runtime::context();
    let op = Operation::InitThread;
    ctx.intercept_lifecycle(op.id(), || {
        let fresh = ctx.begin_init(op.id()).is_ok();
        if fresh {
            ctx.instrument_all();
        }
        // SAFETY: MPI_Init_thread has signature `InitThreadFn`.
        let init = match unsafe { native::<InitThreadFn>(ctx, op) } {
            Ok(init) => init,
            Err(code) => {
                if fresh {
                    ctx.abort_init();
                }
                return code;
            }
        };
        let mut granted = ThreadLevel::Single.as_raw();
        // SAFETY: arguments are forwarded verbatim; `granted` outlives the call.
        let ret = ctx.forward_unlocked(|| unsafe { init(argc, argv, required, &raw mut granted) });
        let reported = if fresh {
            settle_init(
                ctx,
                ret,
                Some(ThreadLevel::from_raw(granted)),
                Some(ThreadLevel::from_raw(required)),
            )
            .map_or(granted, ThreadLevel::as_raw)
        } else {
            granted
        };
        if !provided.is_null() {
            // SAFETY: caller passed a writable `int *`.
            unsafe { *provided = reported };
        }
        ret
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn MPI_Initialized(flag: *mut c_int) -> c_int {
    let ctx = runtime::context();
    let op = Operation::Initialized;
    ctx.intercept_lifecycle(op.id(), || {
        // SAFETY: MPI_Initialized has signature `FlagFn`.
        match unsafe { native::<FlagFn>(ctx, op) } {
            // SAFETY: argument is forwarded verbatim.
            Ok(initialized) => ctx.forward(|| unsafe { initialized(flag) }),
            Err(code) => code,
        }
    })
}

/// Reports the level granted at initialization, which is higher than the
/// native one while calls are serialized.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn MPI_Query_thread(provided: *mut c_int) -> c_int {
    let ctx = runtime::context();
    let op = Operation::QueryThread;
    ctx.intercept_lifecycle(op.id(), || {
        // SAFETY: MPI_Query_thread has signature `FlagFn`.
        let query = match unsafe { native::<FlagFn>(ctx, op) } {
            Ok(query) => query,
            Err(code) => return code,
        };
        // SAFETY: argument is forwarded verbatim.
        let ret = ctx.forward(|| unsafe { query(provided) });
        if ret == ctx.constants().success && !provided.is_null() {
            if let Some(reported) = ctx.reported_thread_level() {
                // SAFETY: the native call just wrote through `provided`.
                unsafe { *provided = (*provided).max(reported.as_raw()) };
            }
        }
        ret
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn MPI_Finalize() -> c_int {
    let ctx = runtime::context();
    let op = Operation::Finalize;
    ctx.intercept_lifecycle(op.id(), || {
        let fresh = ctx.begin_finalize(op.id()).is_ok();
        // SAFETY: MPI_Finalize has signature `FinalizeFn`.
        let ret = match unsafe { native::<FinalizeFn>(ctx, op) } {
            Ok(finalize) => ctx.forward(|| unsafe { finalize() }),
            Err(code) => code,
        };
        if fresh {
            ctx.complete_finalize(ret == ctx.constants().success);
        }
        ret
    })
}

/// Forwarded without the lock: another thread may be blocked in a native
/// call while holding it.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn MPI_Abort(comm: Comm, errorcode: c_int) -> c_int {
    type AbortFn = unsafe extern "C" fn(Comm, c_int) -> c_int;
    let ctx = runtime::context();
    let op = Operation::Abort;
    ctx.intercept_lifecycle(op.id(), || {
        // SAFETY: MPI_Abort has signature `AbortFn`.
        match unsafe { native::<AbortFn>(ctx, op) } {
            // SAFETY: arguments are forwarded verbatim.
            Ok(abort) => ctx.forward_unlocked(|| unsafe { abort(comm, errorcode) }),
            Err(code) => code,
        }
    })
}

mpi_fn! {
    fn MPI_Comm_rank(comm: Comm, rank: *mut c_int) => Operation::CommRank;
}

mpi_fn! {
    fn MPI_Comm_size(comm: Comm, size: *mut c_int) => Operation::CommSize;
}
