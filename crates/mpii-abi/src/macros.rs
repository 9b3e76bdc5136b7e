//! Helper macros for wrapper generation.
//!
//! `mpi_fn!` generates a `#[unsafe(no_mangle)] pub unsafe extern "C" fn`
//! whose body is the plain call protocol: guard, monitor and logging via
//! `ProcessContext::intercept`, then one forwarded native call inside the
//! serialization lock.

/// Generate a forwarding wrapper for a non-blocking (or lock-safe) operation.
///
/// ```ignore
/// mpi_fn! {
///     /// Doc comment for the function.
///     fn MPI_Isend(buf: *const c_void, ..., request: RequestPtr) => Operation::Isend;
/// }
/// ```
///
/// The native signature is derived from the argument list, so the wrapper
/// and the forwarded symbol always agree.
macro_rules! mpi_fn {
    (
        $(#[$meta:meta])*
        fn $name:ident( $($arg:ident : $argty:ty),* $(,)? ) => $op:expr;
    ) => {
        $(#[$meta])*
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $name( $($arg : $argty),* ) -> ::std::ffi::c_int {
            type Native = unsafe extern "C" fn($($argty),*) -> ::std::ffi::c_int;
            let op: $crate::ops::Operation = $op;
            let ctx = $crate::runtime::context();
            ctx.intercept(op.id(), || {
                // SAFETY: `Native` is built from this wrapper's own signature.
                match unsafe { $crate::runtime::native::<Native>(ctx, op) } {
                    // SAFETY: arguments are forwarded verbatim.
                    Ok(native) => ctx.forward(|| unsafe { native($($arg),*) }),
                    Err(code) => code,
                }
            })
        }
    };
}

#[allow(unused_imports)]
pub(crate) use mpi_fn;
