use risu_proto::{HeaderDecodeError, RisuOp};
use risu_wire::WireError;

/// Every way a checkpoint can end other than "resume the image"
/// (spec.md §7's error kind table). `End` sits in this enum rather than
/// in a separate `RisuOutcome` split, mirroring how the original's
/// `RisuResult` switches over a single result code that happens to
/// include the non-error "clean termination" case.
#[derive(Debug, thiserror::Error)]
pub enum RisuError {
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Covers both `BadMagic` and `BadOp` from spec.md §7: both are
    /// already distinct variants of [`HeaderDecodeError`] at the wire
    /// layer, so there is nothing left for this crate to add.
    #[error(transparent)]
    Header(#[from] HeaderDecodeError),

    #[error("register payload of {got} bytes exceeds reginfo capacity of {capacity} bytes")]
    BadSizeHeader { got: u32, capacity: u32 },

    #[error("register payload size {got} disagrees with reginfo's self-declared size {want}")]
    BadSizeReginfo { got: u32, want: u32 },

    #[error("COMPAREMEM payload of {got} bytes does not match the memblock length of {want} bytes")]
    BadSizeMemblock { got: u32, want: u32 },

    #[error("control op {op:?} carried a non-zero payload of {got} bytes")]
    BadSizeZero { op: RisuOp, got: u32 },

    #[error("register state mismatch")]
    MismatchReg,

    #[error("memblock contents differ at byte offset {offset}")]
    MismatchMem { offset: usize },

    #[error("peer op {peer:?} disagrees with local op {local:?}")]
    MismatchOp { local: RisuOp, peer: RisuOp },

    #[error("bus error trap")]
    SigBus,

    #[error("end of test reached")]
    End,
}

impl RisuError {
    /// The one-byte `RisuResult` the apprentice sends back to the master
    /// (spec.md §6). Per SPEC_FULL.md's recorded resolution of the
    /// response-byte Open Question, every failure collapses to the same
    /// nonzero code: the master only ever learns "keep going" or "stop",
    /// never which of the error kinds fired.
    pub const RES_OK: u8 = 0;
    pub const RES_END: u8 = 1;

    pub fn response_byte(result: &Result<(), RisuError>) -> u8 {
        match result {
            Ok(()) => Self::RES_OK,
            Err(_) => Self::RES_END,
        }
    }
}
