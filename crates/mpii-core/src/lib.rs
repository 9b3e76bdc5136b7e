//! Call-interposition core for the MPI interceptor.
//!
//! This crate holds everything between an intercepted MPI entry point and the
//! genuine implementation it forwards to. It contains no `unsafe` code: the
//! `extern "C"` boundary, `dlsym` and function-pointer casts live in
//! `mpii-abi`, which drives the pieces defined here.
//!
//! # Architecture
//!
//! ```text
//! app -> wrapper (mpii-abi) -> CallScope -> DispatchTable::resolve
//!     -> SerializationLock | poll_until_ready -> ConcurrencyMonitor
//!     -> native MPI -> monitor leave -> release -> scope leave
//! ```
//!
//! Without the lock the monitor covers the whole outermost call instead.
//!
//! - **Dispatch table** (`dispatch`): operation name to resolved native address
//! - **Recursion guard** (`guard`): per-thread nesting depth with scoped leave
//! - **Concurrency monitor** (`monitor`): lock-free single-flight detector
//! - **Serialization lock** (`lock`): conditional process-wide mutex
//! - **Blocking-call adapter** (`poll`): spin/yield/sleep polling state machine
//! - **Process context** (`context`): lifecycle, rank/size and sentinel cache
//! - **Configuration** (`config`): environment-derived settings
//! - **Diagnostics** (`diag`) and **metrics** (`metrics`)

#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod diag;
pub mod dispatch;
pub mod error;
pub mod flavor;
pub mod guard;
pub mod lock;
pub mod metrics;
pub mod monitor;
pub mod poll;

pub use config::{AbiSelection, LogFormat, SerializationPolicy, Settings};
pub use context::{InitReport, Phase, ProcessContext};
pub use diag::{DiagEvent, Diagnostics};
pub use dispatch::{DispatchTable, Entry, OpId, SymbolSource};
pub use error::{MpiiError, MpiiResult};
pub use flavor::{MpiConstants, MpiFlavor, ThreadLevel};
pub use guard::CallScope;
pub use lock::SerializationLock;
pub use metrics::{Metrics, MetricsSnapshot};
pub use monitor::{ConcurrencyMonitor, MonitorEvent};
pub use poll::{Backoff, BackoffTier, PollOutcome, poll_until_ready};
