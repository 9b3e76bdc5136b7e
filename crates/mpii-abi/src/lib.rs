// All extern "C" exports take raw pointers from MPI callers and hand them to
// the native library untouched, so per-function safety docs would repeat the
// MPI standard.
#![allow(clippy::missing_safety_doc)]
// Wrapper signatures mirror the MPI C bindings.
#![allow(clippy::too_many_arguments)]
//! # mpii-abi
//!
//! Interposed MPI entry points.
//!
//! This crate produces a `cdylib` (`libmpi_interceptor.so`) meant to be
//! preloaded ahead of the native MPI library. Each exported `MPI_*` symbol runs
//! the call protocol of `mpii-core` and forwards to the genuine implementation
//! found with `dlsym(RTLD_NEXT, ...)`.
//!
//! # Architecture
//!
//! ```text
//! MPI caller -> ABI entry (this crate) -> ProcessContext::intercept
//!     -> resolve native -> forward (lock) | poll (adapter) -> return code
//! ```
//!
//! Native return codes pass through unchanged. An entry point whose native
//! symbol cannot be found returns `MPI_ERR_UNSUPPORTED_OPERATION`.

#[macro_use]
mod macros;

pub mod ffi;
pub mod ops;
pub mod runtime;

pub mod coll_abi;
pub mod init_abi;
pub mod p2p_abi;
pub mod rma_abi;

pub use ops::Operation;
pub use runtime::{NextObjectSymbols, context, install};
