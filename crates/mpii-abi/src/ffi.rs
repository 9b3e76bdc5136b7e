//! C-level MPI types and native function signatures.
//!
//! MPICH passes handles as `int`, Open MPI as pointers. Both fit a
//! pointer-sized word on LP64, and a callee that reads an `int` only looks at
//! the low half, so handles are declared as [`Handle`] and forwarded as-is.
//! Request and status arguments are only ever passed through, never read.

use std::ffi::{c_char, c_int, c_void};

/// Opaque MPI handle (`MPI_Comm`, `MPI_Datatype`, `MPI_Win`, ...).
pub type Handle = usize;
pub type Comm = Handle;
pub type Datatype = Handle;
pub type Win = Handle;
/// `MPI_Aint`.
pub type Aint = isize;
/// `MPI_Request *`.
pub type RequestPtr = *mut c_void;
/// `MPI_Status *` (also `MPI_STATUS_IGNORE`).
pub type StatusPtr = *mut c_void;

pub type InitFn = unsafe extern "C" fn(*mut c_int, *mut *mut *mut c_char) -> c_int;
pub type InitThreadFn =
    unsafe extern "C" fn(*mut c_int, *mut *mut *mut c_char, c_int, *mut c_int) -> c_int;
pub type FlagFn = unsafe extern "C" fn(*mut c_int) -> c_int;
pub type FinalizeFn = unsafe extern "C" fn() -> c_int;
pub type CommQueryFn = unsafe extern "C" fn(Comm, *mut c_int) -> c_int;

pub type SendFn =
    unsafe extern "C" fn(*const c_void, c_int, Datatype, c_int, c_int, Comm) -> c_int;
pub type RecvFn =
    unsafe extern "C" fn(*mut c_void, c_int, Datatype, c_int, c_int, Comm, StatusPtr) -> c_int;
pub type IsendFn = unsafe extern "C" fn(
    *const c_void,
    c_int,
    Datatype,
    c_int,
    c_int,
    Comm,
    RequestPtr,
) -> c_int;
pub type IrecvFn =
    unsafe extern "C" fn(*mut c_void, c_int, Datatype, c_int, c_int, Comm, RequestPtr) -> c_int;
pub type WaitFn = unsafe extern "C" fn(RequestPtr, StatusPtr) -> c_int;
pub type TestFn = unsafe extern "C" fn(RequestPtr, *mut c_int, StatusPtr) -> c_int;
pub type WaitallFn = unsafe extern "C" fn(c_int, RequestPtr, StatusPtr) -> c_int;
pub type TestallFn = unsafe extern "C" fn(c_int, RequestPtr, *mut c_int, StatusPtr) -> c_int;
pub type ProbeFn = unsafe extern "C" fn(c_int, c_int, Comm, StatusPtr) -> c_int;
pub type IprobeFn = unsafe extern "C" fn(c_int, c_int, Comm, *mut c_int, StatusPtr) -> c_int;

pub type BarrierFn = unsafe extern "C" fn(Comm) -> c_int;
pub type IbarrierFn = unsafe extern "C" fn(Comm, RequestPtr) -> c_int;
pub type BcastFn = unsafe extern "C" fn(*mut c_void, c_int, Datatype, c_int, Comm) -> c_int;
pub type IbcastFn =
    unsafe extern "C" fn(*mut c_void, c_int, Datatype, c_int, Comm, RequestPtr) -> c_int;
pub type GatherFn = unsafe extern "C" fn(
    *const c_void,
    c_int,
    Datatype,
    *mut c_void,
    c_int,
    Datatype,
    c_int,
    Comm,
) -> c_int;
pub type IgatherFn = unsafe extern "C" fn(
    *const c_void,
    c_int,
    Datatype,
    *mut c_void,
    c_int,
    Datatype,
    c_int,
    Comm,
    RequestPtr,
) -> c_int;
pub type AllgatherFn = unsafe extern "C" fn(
    *const c_void,
    c_int,
    Datatype,
    *mut c_void,
    c_int,
    Datatype,
    Comm,
) -> c_int;
pub type IallgatherFn = unsafe extern "C" fn(
    *const c_void,
    c_int,
    Datatype,
    *mut c_void,
    c_int,
    Datatype,
    Comm,
    RequestPtr,
) -> c_int;
