//! Fake native MPI (MPICH handle layout) for wrapper tests.
//!
//! Blocking entry points only count their calls; non-blocking ones complete
//! on every third test. Any two fake calls running at once are recorded in
//! [`NATIVE_OVERLAPS`].

#![allow(dead_code)]

use std::ffi::{c_char, c_int, c_void};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, OnceLock};

use mpi_interceptor::Operation;
use mpi_interceptor::ffi::{Aint, Comm, Datatype, RequestPtr, StatusPtr, Win};
use mpii_core::{AbiSelection, Diagnostics, LogFormat, ProcessContext, Settings};

pub const COMM_WORLD: Comm = 0x4400_0000;
pub const BYTE: Datatype = 0x4c00_010d;
pub const REQUEST: i32 = 0x2c00_0007;
pub const FAKE_RANK: c_int = 3;
pub const FAKE_SIZE: c_int = 8;
/// Native thread level granted by the fake library.
pub const FAKE_PROVIDED: c_int = 2;
/// Source rank for which the fake probe fails with [`PROBE_ERROR`].
pub const FAILING_SOURCE: c_int = -99;
pub const PROBE_ERROR: c_int = 17;

pub static NATIVE_INSIDE: AtomicI32 = AtomicI32::new(0);
pub static NATIVE_OVERLAPS: AtomicUsize = AtomicUsize::new(0);
pub static BLOCKING_CALLS: AtomicUsize = AtomicUsize::new(0);
pub static STARTS: AtomicUsize = AtomicUsize::new(0);
pub static TESTS: AtomicUsize = AtomicUsize::new(0);
pub static INITS: AtomicUsize = AtomicUsize::new(0);
pub static FINALIZED: AtomicBool = AtomicBool::new(false);

/// When set, the fake blocking barrier waits here for a second caller.
pub static RENDEZVOUS: OnceLock<Barrier> = OnceLock::new();

pub type Captured = Arc<parking_lot::Mutex<Vec<u8>>>;

pub fn captured(buffer: &Captured) -> String {
    String::from_utf8(buffer.lock().clone()).unwrap()
}

/// Install a context backed by the fake library. Panics if a context
/// already exists in this test binary.
pub fn install_fake(settings: Settings) -> (&'static ProcessContext, Captured) {
    let settings = Settings {
        abi: AbiSelection::Mpich,
        ..settings
    };
    let (diag, buffer) = Diagnostics::capture(settings.verbose, LogFormat::Text);
    let ctx = ProcessContext::with_diagnostics(settings, Operation::NAMES, fake_mpi, diag);
    let installed = mpi_interceptor::install(ctx)
        .unwrap_or_else(|_| panic!("process context installed twice"));
    (installed, buffer)
}

struct NativeSection;

impl NativeSection {
    fn enter() -> Self {
        if NATIVE_INSIDE.fetch_add(1, Ordering::SeqCst) != 0 {
            NATIVE_OVERLAPS.fetch_add(1, Ordering::SeqCst);
        }
        std::thread::yield_now();
        Self
    }
}

impl Drop for NativeSection {
    fn drop(&mut self) {
        NATIVE_INSIDE.fetch_sub(1, Ordering::SeqCst);
    }
}

unsafe fn set_request(request: RequestPtr) -> c_int {
    STARTS.fetch_add(1, Ordering::SeqCst);
    // SAFETY: wrappers pass a writable request slot.
    unsafe { *request.cast::<i32>() = REQUEST };
    0
}

unsafe fn set_flag(flag: *mut c_int) -> c_int {
    let ready = TESTS.fetch_add(1, Ordering::SeqCst) % 3 == 2;
    // SAFETY: wrappers pass a writable flag.
    unsafe { *flag = c_int::from(ready) };
    0
}

fn blocking() -> c_int {
    BLOCKING_CALLS.fetch_add(1, Ordering::SeqCst);
    0
}

unsafe extern "C" fn fake_init(_argc: *mut c_int, _argv: *mut *mut *mut c_char) -> c_int {
    INITS.fetch_add(1, Ordering::SeqCst);
    0
}

unsafe extern "C" fn fake_init_thread(
    _argc: *mut c_int,
    _argv: *mut *mut *mut c_char,
    _required: c_int,
    provided: *mut c_int,
) -> c_int {
    INITS.fetch_add(1, Ordering::SeqCst);
    // SAFETY: the wrapper passes its own out-parameter.
    unsafe { *provided = FAKE_PROVIDED };
    0
}

unsafe extern "C" fn fake_initialized(flag: *mut c_int) -> c_int {
    let _native = NativeSection::enter();
    // SAFETY: caller passes a writable flag.
    unsafe { *flag = c_int::from(INITS.load(Ordering::SeqCst) > 0) };
    0
}

unsafe extern "C" fn fake_query_thread(provided: *mut c_int) -> c_int {
    // SAFETY: caller passes a writable level.
    unsafe { *provided = FAKE_PROVIDED };
    0
}

unsafe extern "C" fn fake_finalize() -> c_int {
    let _native = NativeSection::enter();
    FINALIZED.store(true, Ordering::SeqCst);
    0
}

unsafe extern "C" fn fake_comm_rank(comm: Comm, rank: *mut c_int) -> c_int {
    let _native = NativeSection::enter();
    // SAFETY: caller passes a writable int.
    unsafe { *rank = if comm == COMM_WORLD { FAKE_RANK } else { -1 } };
    0
}

unsafe extern "C" fn fake_comm_size(_comm: Comm, size: *mut c_int) -> c_int {
    let _native = NativeSection::enter();
    // SAFETY: caller passes a writable int.
    unsafe { *size = FAKE_SIZE };
    0
}

unsafe extern "C" fn fake_send(
    _buf: *const c_void,
    _count: c_int,
    _datatype: Datatype,
    _dest: c_int,
    _tag: c_int,
    _comm: Comm,
) -> c_int {
    let _native = NativeSection::enter();
    blocking()
}

unsafe extern "C" fn fake_recv(
    _buf: *mut c_void,
    _count: c_int,
    _datatype: Datatype,
    _source: c_int,
    _tag: c_int,
    _comm: Comm,
    _status: StatusPtr,
) -> c_int {
    let _native = NativeSection::enter();
    blocking()
}

unsafe extern "C" fn fake_isend(
    _buf: *const c_void,
    _count: c_int,
    _datatype: Datatype,
    _dest: c_int,
    _tag: c_int,
    _comm: Comm,
    request: RequestPtr,
) -> c_int {
    let _native = NativeSection::enter();
    // SAFETY: forwarded from the wrapper.
    unsafe { set_request(request) }
}

unsafe extern "C" fn fake_irecv(
    _buf: *mut c_void,
    _count: c_int,
    _datatype: Datatype,
    _source: c_int,
    _tag: c_int,
    _comm: Comm,
    request: RequestPtr,
) -> c_int {
    let _native = NativeSection::enter();
    // SAFETY: forwarded from the wrapper.
    unsafe { set_request(request) }
}

unsafe extern "C" fn fake_wait(_request: RequestPtr, _status: StatusPtr) -> c_int {
    let _native = NativeSection::enter();
    blocking()
}

unsafe extern "C" fn fake_test(_request: RequestPtr, flag: *mut c_int, _status: StatusPtr) -> c_int {
    let _native = NativeSection::enter();
    // SAFETY: forwarded from the wrapper.
    unsafe { set_flag(flag) }
}

unsafe extern "C" fn fake_waitall(_count: c_int, _requests: RequestPtr, _statuses: StatusPtr) -> c_int {
    let _native = NativeSection::enter();
    blocking()
}

unsafe extern "C" fn fake_testall(
    _count: c_int,
    _requests: RequestPtr,
    flag: *mut c_int,
    _statuses: StatusPtr,
) -> c_int {
    let _native = NativeSection::enter();
    // SAFETY: forwarded from the wrapper.
    unsafe { set_flag(flag) }
}

unsafe extern "C" fn fake_probe(_source: c_int, _tag: c_int, _comm: Comm, _status: StatusPtr) -> c_int {
    let _native = NativeSection::enter();
    blocking()
}

unsafe extern "C" fn fake_iprobe(
    source: c_int,
    _tag: c_int,
    _comm: Comm,
    flag: *mut c_int,
    _status: StatusPtr,
) -> c_int {
    let _native = NativeSection::enter();
    if source == FAILING_SOURCE {
        return PROBE_ERROR;
    }
    // SAFETY: forwarded from the wrapper.
    unsafe { set_flag(flag) }
}

unsafe extern "C" fn fake_barrier(_comm: Comm) -> c_int {
    // No NativeSection: the rendezvous holds two callers inside at once.
    if let Some(rendezvous) = RENDEZVOUS.get() {
        rendezvous.wait();
    }
    blocking()
}

unsafe extern "C" fn fake_ibarrier(_comm: Comm, request: RequestPtr) -> c_int {
    let _native = NativeSection::enter();
    // SAFETY: forwarded from the wrapper.
    unsafe { set_request(request) }
}

unsafe extern "C" fn fake_bcast(
    _buffer: *mut c_void,
    _count: c_int,
    _datatype: Datatype,
    _root: c_int,
    _comm: Comm,
) -> c_int {
    let _native = NativeSection::enter();
    blocking()
}

unsafe extern "C" fn fake_ibcast(
    _buffer: *mut c_void,
    _count: c_int,
    _datatype: Datatype,
    _root: c_int,
    _comm: Comm,
    request: RequestPtr,
) -> c_int {
    let _native = NativeSection::enter();
    // SAFETY: forwarded from the wrapper.
    unsafe { set_request(request) }
}

unsafe extern "C" fn fake_gather(
    _sendbuf: *const c_void,
    _sendcount: c_int,
    _sendtype: Datatype,
    _recvbuf: *mut c_void,
    _recvcount: c_int,
    _recvtype: Datatype,
    _root: c_int,
    _comm: Comm,
) -> c_int {
    let _native = NativeSection::enter();
    blocking()
}

unsafe extern "C" fn fake_igather(
    _sendbuf: *const c_void,
    _sendcount: c_int,
    _sendtype: Datatype,
    _recvbuf: *mut c_void,
    _recvcount: c_int,
    _recvtype: Datatype,
    _root: c_int,
    _comm: Comm,
    request: RequestPtr,
) -> c_int {
    let _native = NativeSection::enter();
    // SAFETY: forwarded from the wrapper.
    unsafe { set_request(request) }
}

unsafe extern "C" fn fake_allgather(
    _sendbuf: *const c_void,
    _sendcount: c_int,
    _sendtype: Datatype,
    _recvbuf: *mut c_void,
    _recvcount: c_int,
    _recvtype: Datatype,
    _comm: Comm,
) -> c_int {
    let _native = NativeSection::enter();
    blocking()
}

unsafe extern "C" fn fake_iallgather(
    _sendbuf: *const c_void,
    _sendcount: c_int,
    _sendtype: Datatype,
    _recvbuf: *mut c_void,
    _recvcount: c_int,
    _recvtype: Datatype,
    _comm: Comm,
    request: RequestPtr,
) -> c_int {
    let _native = NativeSection::enter();
    // SAFETY: forwarded from the wrapper.
    unsafe { set_request(request) }
}

unsafe extern "C" fn fake_put(
    _origin_addr: *const c_void,
    _origin_count: c_int,
    _origin_datatype: Datatype,
    _target_rank: c_int,
    _target_disp: Aint,
    _target_count: c_int,
    _target_datatype: Datatype,
    _win: Win,
) -> c_int {
    let _native = NativeSection::enter();
    0
}

fn addr(f: *const ()) -> Option<NonZeroUsize> {
    NonZeroUsize::new(f as usize)
}

/// Symbol table of the fake library. `MPI_Start` and `MPI_Get` are missing.
pub fn fake_mpi(name: &str) -> Option<NonZeroUsize> {
    match name {
        "MPI_Init" => addr(fake_init as *const ()),
        "MPI_Init_thread" => addr(fake_init_thread as *const ()),
        "MPI_Initialized" => addr(fake_initialized as *const ()),
        "MPI_Query_thread" => addr(fake_query_thread as *const ()),
        "MPI_Finalize" => addr(fake_finalize as *const ()),
        "MPI_Comm_rank" => addr(fake_comm_rank as *const ()),
        "MPI_Comm_size" => addr(fake_comm_size as *const ()),
        "MPI_Send" => addr(fake_send as *const ()),
        "MPI_Recv" => addr(fake_recv as *const ()),
        "MPI_Isend" | "MPI_Issend" | "MPI_Send_init" | "MPI_Rsend_init" => {
            addr(fake_isend as *const ())
        }
        "MPI_Irecv" | "MPI_Recv_init" => addr(fake_irecv as *const ()),
        "MPI_Wait" => addr(fake_wait as *const ()),
        "MPI_Test" => addr(fake_test as *const ()),
        "MPI_Waitall" => addr(fake_waitall as *const ()),
        "MPI_Testall" => addr(fake_testall as *const ()),
        "MPI_Probe" => addr(fake_probe as *const ()),
        "MPI_Iprobe" => addr(fake_iprobe as *const ()),
        "MPI_Barrier" => addr(fake_barrier as *const ()),
        "MPI_Ibarrier" => addr(fake_ibarrier as *const ()),
        "MPI_Bcast" => addr(fake_bcast as *const ()),
        "MPI_Ibcast" => addr(fake_ibcast as *const ()),
        "MPI_Gather" => addr(fake_gather as *const ()),
        "MPI_Igather" => addr(fake_igather as *const ()),
        "MPI_Allgather" => addr(fake_allgather as *const ()),
        "MPI_Iallgather" => addr(fake_iallgather as *const ()),
        "MPI_Put" => addr(fake_put as *const ()),
        _ => None,
    }
}
