//! The signal/trap driver and checkpoint protocol state machines that sit
//! between a running image and the wire (spec.md §4.1–§4.3, §4.8–§4.10,
//! §5). `risu-cli` wires a concrete `risu_reginfo::Arch` and
//! `risu_wire::Transport` through this crate; nothing here is
//! architecture- or transport-specific.

mod error;
mod protocol;
pub mod setjmp;
pub mod signal;

pub use error::RisuError;
pub use protocol::{ApprenticeDriver, MasterDriver};

/// Size in bytes of the shared data page an image hands the harness via
/// SETMEMBLOCK (spec.md §4.8). Not pinned to a literal anywhere in the
/// retrieved reference material; a single page is the natural size for
/// an embedded scratch block and is what this workspace settles on.
pub const MEMBLOCKLEN: usize = 4096;
