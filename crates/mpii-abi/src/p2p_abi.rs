//! Point-to-point wrappers.
//!
//! Non-blocking calls are forwarded inside the lock. While calls are
//! serialized, the blocking ones are rebuilt from their non-blocking
//! counterparts so the lock is never held across an indefinite wait.

#![allow(non_snake_case)]

use std::ffi::{c_int, c_void};
use std::task::Poll;

use mpii_core::ProcessContext;

use crate::ffi::{
    Comm, Datatype, IprobeFn, IrecvFn, IsendFn, ProbeFn, RecvFn, RequestPtr, SendFn, StatusPtr,
    TestFn, TestallFn, WaitFn, WaitallFn,
};
use crate::ops::Operation;
use crate::runtime::{self, native};

/// `MPI_STATUS_IGNORE` of the running flavor.
pub(crate) fn status_ignore(ctx: &ProcessContext) -> StatusPtr {
    ctx.constants().status_ignore as StatusPtr
}

/// Probe result for the adapter: ready on success with the flag set, or on
/// any error code.
fn probe_result(ctx: &ProcessContext, ret: c_int, flag: c_int) -> Poll<c_int> {
    if ret != ctx.constants().success || flag != 0 {
        Poll::Ready(ret)
    } else {
        Poll::Pending
    }
}

/// Start a non-blocking operation inside the lock, then complete it through
/// the (nested) `MPI_Wait` wrapper.
pub(crate) fn start_then_wait(
    ctx: &ProcessContext,
    status: StatusPtr,
    start: impl FnOnce(RequestPtr) -> c_int,
) -> c_int {
    // Large enough for either flavor's request handle.
    let mut request: usize = ctx.constants().request_null;
    let request_ptr: RequestPtr = (&raw mut request).cast();
    let ret = ctx.forward(|| start(request_ptr));
    if ret != ctx.constants().success {
        return ret;
    }
    // SAFETY: `request` was filled in by the native start call.
    unsafe { MPI_Wait(request_ptr, status) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn MPI_Send(
    buf: *const c_void,
    count: c_int,
    datatype: Datatype,
    dest: c_int,
    tag: c_int,
    comm: Comm,
) -> c_int {
    let ctx = runtime::context();
    ctx.intercept(Operation::Send.id(), || {
        if !ctx.should_serialize() {
            // SAFETY: MPI_Send has signature `SendFn`.
            return match unsafe { native::<SendFn>(ctx, Operation::Send) } {
                // SAFETY: arguments are forwarded verbatim.
                Ok(send) => ctx.forward(|| unsafe { send(buf, count, datatype, dest, tag, comm) }),
                Err(code) => code,
            };
        }
        // SAFETY: MPI_Isend has signature `IsendFn`.
        let isend = match unsafe { native::<IsendFn>(ctx, Operation::Isend) } {
            Ok(isend) => isend,
            Err(code) => return code,
        };
        start_then_wait(ctx, status_ignore(ctx), |request| {
            // SAFETY: arguments are forwarded verbatim.
            unsafe { isend(buf, count, datatype, dest, tag, comm, request) }
        })
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn MPI_Recv(
    buf: *mut c_void,
    count: c_int,
    datatype: Datatype,
    source: c_int,
    tag: c_int,
    comm: Comm,
    status: StatusPtr,
) -> c_int {
    let ctx = runtime::context();
    ctx.intercept(Operation::Recv.id(), || {
        if !ctx.should_serialize() {
            // SAFETY: MPI_Recv has signature `RecvFn`.
            return match unsafe { native::<RecvFn>(ctx, Operation::Recv) } {
                Ok(recv) => ctx.forward(|| {
                    // SAFETY: arguments are forwarded verbatim.
                    unsafe { recv(buf, count, datatype, source, tag, comm, status) }
                }),
                Err(code) => code,
            };
        }
        // SAFETY: MPI_Irecv has signature `IrecvFn`.
        let irecv = match unsafe { native::<IrecvFn>(ctx, Operation::Irecv) } {
            Ok(irecv) => irecv,
            Err(code) => return code,
        };
        start_then_wait(ctx, status, |request| {
            // SAFETY: arguments are forwarded verbatim.
            unsafe { irecv(buf, count, datatype, source, tag, comm, request) }
        })
    })
}

mpi_fn! {
    fn MPI_Isend(
        buf: *const c_void,
        count: c_int,
        datatype: Datatype,
        dest: c_int,
        tag: c_int,
        comm: Comm,
        request: RequestPtr,
    ) => Operation::Isend;
}

mpi_fn! {
    fn MPI_Issend(
        buf: *const c_void,
        count: c_int,
        datatype: Datatype,
        dest: c_int,
        tag: c_int,
        comm: Comm,
        request: RequestPtr,
    ) => Operation::Issend;
}

mpi_fn! {
    fn MPI_Irecv(
        buf: *mut c_void,
        count: c_int,
        datatype: Datatype,
        source: c_int,
        tag: c_int,
        comm: Comm,
        request: RequestPtr,
    ) => Operation::Irecv;
}

mpi_fn! {
    fn MPI_Send_init(
        buf: *const c_void,
        count: c_int,
        datatype: Datatype,
        dest: c_int,
        tag: c_int,
        comm: Comm,
        request: RequestPtr,
    ) => Operation::SendInit;
}

mpi_fn! {
    fn MPI_Rsend_init(
        buf: *const c_void,
        count: c_int,
        datatype: Datatype,
        dest: c_int,
        tag: c_int,
        comm: Comm,
        request: RequestPtr,
    ) => Operation::RsendInit;
}

mpi_fn! {
    fn MPI_Recv_init(
        buf: *mut c_void,
        count: c_int,
        datatype: Datatype,
        source: c_int,
        tag: c_int,
        comm: Comm,
        request: RequestPtr,
    ) => Operation::RecvInit;
}

mpi_fn! {
    fn MPI_Start(request: RequestPtr) => Operation::Start;
}

mpi_fn! {
    fn MPI_Test(request: RequestPtr, flag: *mut c_int, status: StatusPtr) => Operation::Test;
}

mpi_fn! {
    fn MPI_Testall(
        count: c_int,
        requests: RequestPtr,
        flag: *mut c_int,
        statuses: StatusPtr,
    ) => Operation::Testall;
}

mpi_fn! {
    fn MPI_Iprobe(
        source: c_int,
        tag: c_int,
        comm: Comm,
        flag: *mut c_int,
        status: StatusPtr,
    ) => Operation::Iprobe;
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn MPI_Wait(request: RequestPtr, status: StatusPtr) -> c_int {
    let ctx = runtime::context();
    ctx.intercept(Operation::Wait.id(), || {
        if !ctx.should_serialize() {
            // SAFETY: MPI_Wait has signature `WaitFn`.
            return match unsafe { native::<WaitFn>(ctx, Operation::Wait) } {
                // SAFETY: arguments are forwarded verbatim.
                Ok(wait) => ctx.forward(|| unsafe { wait(request, status) }),
                Err(code) => code,
            };
        }
        // SAFETY: MPI_Test has signature `TestFn`.
        let test = match unsafe { native::<TestFn>(ctx, Operation::Test) } {
            Ok(test) => test,
            Err(code) => return code,
        };
        ctx.poll(|| {
            let mut flag: c_int = 0;
            // SAFETY: arguments are forwarded verbatim; `flag` outlives the call.
            let ret = unsafe { test(request, &raw mut flag, status) };
            probe_result(ctx, ret, flag)
        })
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn MPI_Waitall(
    count: c_int,
    requests: RequestPtr,
    statuses: StatusPtr,
) -> c_int {
    let ctx = runtime::context();
    ctx.intercept(Operation::Waitall.id(), || {
        if !ctx.should_serialize() {
            // SAFETY: MPI_Waitall has signature `WaitallFn`.
            return match unsafe { native::<WaitallFn>(ctx, Operation::Waitall) } {
                // SAFETY: arguments are forwarded verbatim.
                Ok(waitall) => ctx.forward(|| unsafe { waitall(count, requests, statuses) }),
                Err(code) => code,
            };
        }
        // SAFETY: MPI_Testall has signature `TestallFn`.
        let testall = match unsafe { native::<TestallFn>(ctx, Operation::Testall) } {
            Ok(testall) => testall,
            Err(code) => return code,
        };
        ctx.poll(|| {
            let mut flag: c_int = 0;
            // SAFETY: arguments are forwarded verbatim; `flag` outlives the call.
            let ret = unsafe { testall(count, requests, &raw mut flag, statuses) };
            probe_result(ctx, ret, flag)
        })
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn MPI_Probe(source: c_int, tag: c_int, comm: Comm, status: StatusPtr) -> c_int {
    let ctx = runtime::context();
    ctx.intercept(Operation::Probe.id(), || {
        if !ctx.should_serialize() {
            // SAFETY: MPI_Probe has signature `ProbeFn`.
            return match unsafe { native::<ProbeFn>(ctx, Operation::Probe) } {
                // SAFETY: arguments are forwarded verbatim.
                Ok(probe) => ctx.forward(|| unsafe { probe(source, tag, comm, status) }),
                Err(code) => code,
            };
        }
        // SAFETY: MPI_Iprobe has signature `IprobeFn`.
        let iprobe = match unsafe { native::<IprobeFn>(ctx, Operation::Iprobe) } {
            Ok(iprobe) => iprobe,
            Err(code) => return code,
        };
        ctx.poll(|| {
            let mut flag: c_int = 0;
            // SAFETY: arguments are forwarded verbatim; `flag` outlives the call.
            let ret = unsafe { iprobe(source, tag, comm, &raw mut flag, status) };
            probe_result(ctx, ret, flag)
        })
    })
}
