//! Interposed operations and their dispatch-table slots.

use mpii_core::OpId;

macro_rules! operations {
    ($($variant:ident => $symbol:literal),* $(,)?) => {
        /// Every MPI entry point exported by this crate.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum Operation {
            $($variant),*
        }

        impl Operation {
            pub const ALL: &'static [Operation] = &[$(Self::$variant),*];

            /// Native symbol names, indexed by dispatch slot.
            pub const NAMES: &'static [&'static str] = &[$($symbol),*];

            #[must_use]
            pub const fn symbol(self) -> &'static str {
                Self::NAMES[self as usize]
            }

            #[must_use]
            pub const fn id(self) -> OpId {
                OpId(self as u16)
            }
        }
    };
}

operations! {
    Init => "MPI_Init",
    InitThread => "MPI_Init_thread",
    Initialized => "MPI_Initialized",
    QueryThread => "MPI_Query_thread",
    Finalize => "MPI_Finalize",
    Abort => "MPI_Abort",
    CommRank => "MPI_Comm_rank",
    CommSize => "MPI_Comm_size",
    Send => "MPI_Send",
    Recv => "MPI_Recv",
    Isend => "MPI_Isend",
    Issend => "MPI_Issend",
    Irecv => "MPI_Irecv",
    SendInit => "MPI_Send_init",
    RsendInit => "MPI_Rsend_init",
    RecvInit => "MPI_Recv_init",
    Start => "MPI_Start",
    Wait => "MPI_Wait",
    Test => "MPI_Test",
    Waitall => "MPI_Waitall",
    Testall => "MPI_Testall",
    Probe => "MPI_Probe",
    Iprobe => "MPI_Iprobe",
    Barrier => "MPI_Barrier",
    Ibarrier => "MPI_Ibarrier",
    Bcast => "MPI_Bcast",
    Ibcast => "MPI_Ibcast",
    Gather => "MPI_Gather",
    Igather => "MPI_Igather",
    Allgather => "MPI_Allgather",
    Iallgather => "MPI_Iallgather",
    Put => "MPI_Put",
    Get => "MPI_Get",
}
