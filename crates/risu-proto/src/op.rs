/// One of the eight checkpoint operations encoded in the low four bits of
/// a checkpoint instruction word.
///
/// `Sigill` is synthetic: it never appears as a genuine 4-bit encoding
/// inside a risu-key instruction, it is what [`op_from_checkpoint_word`]
/// returns for a real illegal instruction that carries no risu key at
/// all (spec.md §3, RisuOp table).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum RisuOp {
    Compare = 0,
    TestEnd = 1,
    SetMemblock = 2,
    GetMemblock = 3,
    CompareMem = 4,
    SetupBegin = 5,
    SetupEnd = 6,
    Sigill = 7,
}

/// Highest defined 4-bit op value (`Sigill`). Kept separate from the enum
/// so `TryFrom<i32>` below has one place to update if the table grows.
pub const RISU_OP_MAX: i32 = RisuOp::Sigill as i32;

impl RisuOp {
    pub fn name(self) -> &'static str {
        match self {
            RisuOp::Compare => "COMPARE",
            RisuOp::TestEnd => "TESTEND",
            RisuOp::SetMemblock => "SETMEMBLOCK",
            RisuOp::GetMemblock => "GETMEMBLOCK",
            RisuOp::CompareMem => "COMPAREMEM",
            RisuOp::SetupBegin => "SETUPBEGIN",
            RisuOp::SetupEnd => "SETUPEND",
            RisuOp::Sigill => "SIGILL",
        }
    }

    /// Register ops are the ones that exchange a `Reginfo` payload rather
    /// than a control signal or a memory block (spec.md invariant 3).
    pub fn is_register_op(self) -> bool {
        matches!(self, RisuOp::Compare | RisuOp::TestEnd | RisuOp::Sigill)
    }

    pub fn is_control_op(self) -> bool {
        matches!(
            self,
            RisuOp::SetMemblock | RisuOp::GetMemblock | RisuOp::SetupBegin | RisuOp::SetupEnd
        )
    }
}

impl TryFrom<i32> for RisuOp {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, i32> {
        match value {
            0 => Ok(RisuOp::Compare),
            1 => Ok(RisuOp::TestEnd),
            2 => Ok(RisuOp::SetMemblock),
            3 => Ok(RisuOp::GetMemblock),
            4 => Ok(RisuOp::CompareMem),
            5 => Ok(RisuOp::SetupBegin),
            6 => Ok(RisuOp::SetupEnd),
            7 => Ok(RisuOp::Sigill),
            other => Err(other),
        }
    }
}

/// Decodes the `RisuOp` embedded in a checkpoint instruction word, given
/// the architecture's risu key: the fixed non-op bits that identify the
/// word as a harness instruction rather than a genuine illegal opcode.
///
/// Mirrors `get_risuop()` in `risu_ppc64.c` / `risu_aarch64.c`: mask off
/// the low 4 bits, compare the remainder against `risu_key`, and fall
/// back to `Sigill` both when the key doesn't match and (defensively,
/// unlike the C original which trusts the generator never emits them)
/// when the low bits encode a value the table doesn't define.
pub fn op_from_checkpoint_word(word: u32, risu_key_mask: u32, risu_key: u32) -> RisuOp {
    let op_bits = (word & 0xf) as i32;
    let key = word & risu_key_mask;
    if key != risu_key {
        return RisuOp::Sigill;
    }
    RisuOp::try_from(op_bits).unwrap_or(RisuOp::Sigill)
}
