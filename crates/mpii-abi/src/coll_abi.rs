//! Collective wrappers.
//!
//! While calls are serialized a blocking collective becomes its `I...`
//! variant under the lock followed by a polled `MPI_Wait`.

#![allow(non_snake_case)]

use std::ffi::{c_int, c_void};

use crate::ffi::{
    AllgatherFn, BarrierFn, BcastFn, Comm, Datatype, GatherFn, IallgatherFn, IbarrierFn, IbcastFn,
    IgatherFn, RequestPtr,
};
use crate::ops::Operation;
use crate::p2p_abi::{start_then_wait, status_ignore};
use crate::runtime::{self, native};

#[unsafe(no_mangle)]
pub unsafe extern "C" fn MPI_Barrier(comm: Comm) -> c_int {
    let ctx = runtime::context();
    ctx.intercept(Operation::Barrier.id(), || {
        if !ctx.should_serialize() {
            // SAFETY: MPI_Barrier has signature `BarrierFn`.
            return match unsafe { native::<BarrierFn>(ctx, Operation::Barrier) } {
                // SAFETY: argument is forwarded verbatim.
                Ok(barrier) => ctx.forward(|| unsafe { barrier(comm) }),
                Err(code) => code,
            };
        }
        // SAFETY: MPI_Ibarrier has signature `IbarrierFn`.
        let ibarrier = match unsafe { native::<IbarrierFn>(ctx, Operation::Ibarrier) } {
            Ok(ibarrier) => ibarrier,
            Err(code) => return code,
        };
        // SAFETY: arguments are forwarded verbatim.
        start_then_wait(ctx, status_ignore(ctx), |request| unsafe {
            ibarrier(comm, request)
        })
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn MPI_Bcast(
    buffer: *mut c_void,
    count: c_int,
    datatype: Datatype,
    root: c_int,
    comm: Comm,
) -> c_int {
    let ctx = runtime::context();
    ctx.intercept(Operation::Bcast.id(), || {
        if !ctx.should_serialize() {
            // SAFETY: MPI_Bcast has signature `BcastFn`.
            return match unsafe { native::<BcastFn>(ctx, Operation::Bcast) } {
                // SAFETY: arguments are forwarded verbatim.
                Ok(bcast) => ctx.forward(|| unsafe { bcast(buffer, count, datatype, root, comm) }),
                Err(code) => code,
            };
        }
        // SAFETY: MPI_Ibcast has signature `IbcastFn`.
        let ibcast = match unsafe { native::<IbcastFn>(ctx, Operation::Ibcast) } {
            Ok(ibcast) => ibcast,
            Err(code) => return code,
        };
        // SAFETY: arguments are forwarded verbatim.
        start_then_wait(ctx, status_ignore(ctx), |request| unsafe {
            ibcast(buffer, count, datatype, root, comm, request)
        })
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn MPI_Gather(
    sendbuf: *const c_void,
    sendcount: c_int,
    sendtype: Datatype,
    recvbuf: *mut c_void,
    recvcount: c_int,
    recvtype: Datatype,
    root: c_int,
    comm: Comm,
) -> c_int {
    let ctx = runtime::context();
    ctx.intercept(Operation::Gather.id(), || {
        if !ctx.should_serialize() {
            // SAFETY: MPI_Gather has signature `GatherFn`.
            return match unsafe { native::<GatherFn>(ctx, Operation::Gather) } {
                Ok(gather) => ctx.forward(|| {
                    // SAFETY: arguments are forwarded verbatim.
                    unsafe {
                        gather(
                            sendbuf, sendcount, sendtype, recvbuf, recvcount, recvtype, root, comm,
                        )
                    }
                }),
                Err(code) => code,
            };
        }
        // SAFETY: MPI_Igather has signature `IgatherFn`.
        let igather = match unsafe { native::<IgatherFn>(ctx, Operation::Igather) } {
            Ok(igather) => igather,
            Err(code) => return code,
        };
        // SAFETY: arguments are forwarded verbatim.
        start_then_wait(ctx, status_ignore(ctx), |request| unsafe {
            igather(
                sendbuf, sendcount, sendtype, recvbuf, recvcount, recvtype, root, comm, request,
            )
        })
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn MPI_Allgather(
    sendbuf: *const c_void,
    sendcount: c_int,
    sendtype: Datatype,
    recvbuf: *mut c_void,
    recvcount: c_int,
    recvtype: Datatype,
    comm: Comm,
) -> c_int {
    let ctx = runtime::context();
    ctx.intercept(Operation::Allgather.id(), || {
        if !ctx.should_serialize() {
            // SAFETY: MPI_Allgather has signature `AllgatherFn`.
            return match unsafe { native::<AllgatherFn>(ctx, Operation::Allgather) } {
                Ok(allgather) => ctx.forward(|| {
                    // SAFETY: arguments are forwarded verbatim.
                    unsafe {
                        allgather(sendbuf, sendcount, sendtype, recvbuf, recvcount, recvtype, comm)
                    }
                }),
                Err(code) => code,
            };
        }
        // SAFETY: MPI_Iallgather has signature `IallgatherFn`.
        let iallgather = match unsafe { native::<IallgatherFn>(ctx, Operation::Iallgather) } {
            Ok(iallgather) => iallgather,
            Err(code) => return code,
        };
        // SAFETY: arguments are forwarded verbatim.
        start_then_wait(ctx, status_ignore(ctx), |request| unsafe {
            iallgather(
                sendbuf, sendcount, sendtype, recvbuf, recvcount, recvtype, comm, request,
            )
        })
    })
}

mpi_fn! {
    fn MPI_Ibarrier(comm: Comm, request: RequestPtr) => Operation::Ibarrier;
}

mpi_fn! {
    fn MPI_Ibcast(
        buffer: *mut c_void,
        count: c_int,
        datatype: Datatype,
        root: c_int,
        comm: Comm,
        request: RequestPtr,
    ) => Operation::Ibcast;
}

mpi_fn! {
    fn MPI_Igather(
        sendbuf: *const c_void,
        sendcount: c_int,
        sendtype: Datatype,
        recvbuf: *mut c_void,
        recvcount: c_int,
        recvtype: Datatype,
        root: c_int,
        comm: Comm,
        request: RequestPtr,
    ) => Operation::Igather;
}

mpi_fn! {
    fn MPI_Iallgather(
        sendbuf: *const c_void,
        sendcount: c_int,
        sendtype: Datatype,
        recvbuf: *mut c_void,
        recvcount: c_int,
        recvtype: Datatype,
        comm: Comm,
        request: RequestPtr,
    ) => Operation::Iallgather;
}
