//! One-sided communication wrappers.
//!
//! `MPI_Put` and `MPI_Get` may block in some implementations and have no
//! probe to poll, so they are forwarded inside the lock like any other call.

#![allow(non_snake_case)]

use std::ffi::{c_int, c_void};

use crate::ffi::{Aint, Datatype, Win};
use crate::ops::Operation;

mpi_fn! {
    fn MPI_Put(
        origin_addr: *const c_void,
        origin_count: c_int,
        origin_datatype: Datatype,
        target_rank: c_int,
        target_disp: Aint,
        target_count: c_int,
        target_datatype: Datatype,
        win: Win,
    ) => Operation::Put;
}

mpi_fn! {
    fn MPI_Get(
        origin_addr: *mut c_void,
        origin_count: c_int,
        origin_datatype: Datatype,
        target_rank: c_int,
        target_disp: Aint,
        target_count: c_int,
        target_datatype: Datatype,
        win: Win,
    ) => Operation::Get;
}
