/// A per-register comparison mask, one bit per register. Bit `i` set means
/// "include register `i` in the equality check"; clearing a bit can only
/// turn a previously-unequal comparison into an equal one (spec.md §8,
/// "masking monotonicity").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegMask(pub u32);

impl RegMask {
    pub const ALL: RegMask = RegMask(0xFFFF_FFFF);
    pub const NONE: RegMask = RegMask(0);

    pub fn get(self, bit: u32) -> bool {
        debug_assert!(bit < 32);
        (self.0 >> bit) & 1 != 0
    }

    pub fn clear(&mut self, bit: u32) {
        debug_assert!(bit < 32);
        self.0 &= !(1 << bit);
    }

    /// Narrows the mask to only the bits also set in `narrowing` — used by
    /// the `fcmpo`/`fcmpu`/`mcrfs` CCR special cases, which only define one
    /// CR field out of eight (spec.md §4.7).
    pub fn narrow(self, narrowing: RegMask) -> RegMask {
        RegMask(self.0 & narrowing.0)
    }
}

impl Default for RegMask {
    fn default() -> Self {
        RegMask::ALL
    }
}

bitflags::bitflags! {
    /// Individually-enabled PPC floating-point tolerance excuses
    /// (spec.md §4.7). Defaults to all excuses enabled, matching the
    /// harness's purpose of not drowning the user in implementation-variance
    /// false positives; a strict run clears the bits it cares about via
    /// CLI flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FpOpts: u32 {
        const IGNORE_QNAN_SIGN       = 1 << 0;
        const IGNORE_QNAN_VALUE      = 1 << 1;
        const IGNORE_QNAN_DIFF       = 1 << 2;
        const IGNORE_OPERAND_NAN_INF = 1 << 3;
        const IGNORE_INVALID         = 1 << 4;
        const IGNORE_DIV_ZERO        = 1 << 5;
        const IGNORE_UNDERFLOW       = 1 << 6;
        const IGNORE_OVERFLOW        = 1 << 7;
        const IGNORE_ROUNDING        = 1 << 8;
        const IGNORE_ZERO_SIGN       = 1 << 9;
        const IGNORE_RSQRTE_EDGE     = 1 << 10;
        const IGNORE_QNAN_FROM_INF   = 1 << 11;
    }
}

impl Default for FpOpts {
    fn default() -> Self {
        FpOpts::all()
    }
}
