//! MPI ABI flavors and the predefined values the interceptor needs.
//!
//! MPI does not fix a binary interface. MPICH-derived libraries encode handles
//! as 32-bit integers with well-known values; Open MPI uses addresses of
//! exported predefined objects. Handles are carried as pointer-sized opaque
//! words, which covers both on LP64 targets.

use std::num::NonZeroUsize;

use crate::config::AbiSelection;
use crate::dispatch::SymbolSource;

/// Symbol whose presence identifies Open MPI.
pub const OPENMPI_PROBE_SYMBOL: &str = "ompi_mpi_comm_world";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MpiFlavor {
    Mpich,
    OpenMpi,
}

impl MpiFlavor {
    /// Pick the flavor: an explicit selection wins, otherwise probe for an
    /// Open MPI predefined object.
    #[must_use]
    pub fn detect(selection: AbiSelection, source: &dyn SymbolSource) -> Self {
        match selection {
            AbiSelection::Mpich => Self::Mpich,
            AbiSelection::OpenMpi => Self::OpenMpi,
            AbiSelection::Auto => {
                if source.lookup(OPENMPI_PROBE_SYMBOL).is_some() {
                    Self::OpenMpi
                } else {
                    Self::Mpich
                }
            }
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mpich => "mpich",
            Self::OpenMpi => "openmpi",
        }
    }
}

/// `MPI_THREAD_*` levels. Both supported ABIs number them 0..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ThreadLevel {
    Single = 0,
    Funneled = 1,
    Serialized = 2,
    Multiple = 3,
}

impl ThreadLevel {
    /// Map a raw level; out-of-range values clamp to the nearest level.
    #[must_use]
    pub const fn from_raw(raw: i32) -> Self {
        match raw {
            i32::MIN..=0 => Self::Single,
            1 => Self::Funneled,
            2 => Self::Serialized,
            _ => Self::Multiple,
        }
    }

    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "MPI_THREAD_SINGLE",
            Self::Funneled => "MPI_THREAD_FUNNELED",
            Self::Serialized => "MPI_THREAD_SERIALIZED",
            Self::Multiple => "MPI_THREAD_MULTIPLE",
        }
    }
}

/// Predefined MPI values for one flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpiConstants {
    pub flavor: MpiFlavor,
    pub success: i32,
    pub err_unsupported_operation: i32,
    pub any_source: i32,
    pub any_tag: i32,
    pub proc_null: i32,
    pub comm_world: usize,
    pub comm_self: usize,
    pub request_null: usize,
    pub status_ignore: usize,
    pub statuses_ignore: usize,
}

impl MpiConstants {
    /// MPICH ABI values (`mpi.h` of MPICH 3.x/4.x).
    #[must_use]
    pub const fn mpich() -> Self {
        Self {
            flavor: MpiFlavor::Mpich,
            success: 0,
            err_unsupported_operation: 52,
            any_source: -2,
            any_tag: -1,
            proc_null: -1,
            comm_world: 0x4400_0000,
            comm_self: 0x4400_0001,
            request_null: 0x2c00_0000,
            status_ignore: 1,
            statuses_ignore: 1,
        }
    }

    /// Open MPI values. Handles are addresses of exported objects, so they
    /// are looked up through `source`; missing objects leave a zero handle.
    #[must_use]
    pub fn openmpi(source: &dyn SymbolSource) -> Self {
        let addr = |name: &str| source.lookup(name).map_or(0, NonZeroUsize::get);
        Self {
            flavor: MpiFlavor::OpenMpi,
            success: 0,
            err_unsupported_operation: 52,
            any_source: -1,
            any_tag: -1,
            proc_null: -2,
            comm_world: addr("ompi_mpi_comm_world"),
            comm_self: addr("ompi_mpi_comm_self"),
            request_null: addr("ompi_request_null"),
            status_ignore: 0,
            statuses_ignore: 0,
        }
    }

    #[must_use]
    pub fn for_flavor(flavor: MpiFlavor, source: &dyn SymbolSource) -> Self {
        match flavor {
            MpiFlavor::Mpich => Self::mpich(),
            MpiFlavor::OpenMpi => Self::openmpi(source),
        }
    }
}
