//! Capture, serialize, and compare per-architecture CPU state snapshots
//! taken at a checkpoint trap.
//!
//! The core types are capability traits, not a single concrete struct:
//! [`Reginfo`] is whatever shape a given ISA needs, and [`Arch`] is the
//! per-ISA module the driver depends on instead of any concrete register
//! layout (spec.md §9, "architecture polymorphism").

pub mod arch;
mod mask;

pub use mask::{FpOpts, RegMask};
pub use risu_proto::{Endian, RisuOp};

use std::fmt;

/// A per-architecture snapshot of CPU state at a trap.
///
/// `encode`/`decode` fold the capability set's `reginfo_host_to_arch`/
/// `reginfo_arch_to_host` into the byte-order parameter rather than
/// exposing them as separate no-op-except-cross-endian steps: a `Reginfo`
/// that has not been encoded is always in host logical values, so there is
/// nothing left for a standalone "convert to arch order in place" step to
/// do once encode/decode already take the target endianness.
pub trait Reginfo: Clone + fmt::Debug + PartialEq {
    fn risu_op(&self) -> RisuOp;
    fn pc(&self) -> u64;

    /// Size in bytes of this reginfo's wire encoding — the apprentice
    /// checks the header's declared `size` against this (spec.md §4.3).
    fn encoded_len(&self) -> usize;

    /// The designated parameter register used by SETMEMBLOCK/GETMEMBLOCK
    /// to exchange the memblock address (spec.md §4.8).
    fn param_reg(&self) -> u64;
    fn set_param_reg(&mut self, value: u64);

    fn encode(&self, endian: Endian, out: &mut Vec<u8>);
    fn decode(bytes: &[u8], endian: Endian) -> Option<Self>
    where
        Self: Sized;

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result;
}

/// One ISA module. `risu-driver` is generic over `A: Arch` and never
/// touches a concrete register layout (spec.md §6's capability set, §9's
/// "implement as a trait/interface with one concrete implementation per
/// ISA module").
pub trait Arch: 'static {
    type Reginfo: Reginfo;

    /// Whatever raw pieces the driver's signal-context reader hands in;
    /// opaque to this crate, filled in by `risu-driver` from the OS
    /// `ucontext_t` (spec.md §4.5's "convert raw OS signal context").
    type RawCapture;

    /// Per-architecture equality configuration (masks, tolerance flags).
    type EqConfig: Default + Clone;

    const NAME: &'static str;
    const BIG_ENDIAN: bool;

    /// Fixed non-op bits that mark a checkpoint instruction word as a
    /// harness instruction (spec.md §6, "risu key").
    const RISU_KEY_MASK: u32;
    const RISU_KEY: u32;

    /// Bytes to advance the trapped PC by after handling a checkpoint
    /// (spec.md invariant 5). Fixed-width ISAs use their instruction
    /// width; this workspace's x86_64 module uses the length of its
    /// synthetic checkpoint sequence rather than a decoded instruction
    /// length, since general x86 disassembly is out of scope (§1).
    const CHECKPOINT_LEN: u32;

    fn capture(raw: &Self::RawCapture) -> Self::Reginfo;

    /// Compares `master` against `apprentice`, patching `apprentice`
    /// in place wherever a mask or tolerance excuse allows the two to
    /// differ, so a later [`Reginfo::dump`] of `apprentice` shows only
    /// genuine disagreements (spec.md §4.6).
    fn is_eq(config: &Self::EqConfig, master: &Self::Reginfo, apprentice: &mut Self::Reginfo) -> bool;

    fn dump_mismatch(
        master: &Self::Reginfo,
        apprentice: &Self::Reginfo,
        out: &mut dyn fmt::Write,
    ) -> fmt::Result;
}
