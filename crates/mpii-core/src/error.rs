//! Error types for the interposition layer.
//!
//! Native MPI return codes are never represented here: they are forwarded to
//! the application untouched as plain `c_int` values.

use thiserror::Error;

use crate::context::Phase;

/// Failures originating in the interceptor itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MpiiError {
    /// The real implementation of an operation could not be found.
    #[error("operation '{operation}' is unavailable: no native implementation was found")]
    Unavailable { operation: &'static str },

    /// The calling thread re-entered resolution of the entry it is resolving.
    #[error("operation '{operation}' is being resolved by this thread")]
    ResolutionInProgress { operation: &'static str },

    /// The name does not belong to the dispatch table.
    #[error("unknown operation '{name}'")]
    UnknownOperation { name: String },

    /// A lifecycle transition was attempted from the wrong phase.
    #[error("invalid lifecycle transition from {from:?} to {to:?}")]
    InvalidTransition { from: Phase, to: Phase },
}

impl MpiiError {
    pub fn unknown_operation(name: impl Into<String>) -> Self {
        Self::UnknownOperation { name: name.into() }
    }

    /// Whether the error means the wrapper has nothing to forward to.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::ResolutionInProgress { .. }
        )
    }
}

/// Result type for interceptor operations.
pub type MpiiResult<T> = Result<T, MpiiError>;
