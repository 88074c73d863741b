//! x86_64 reginfo module — the host-native reference architecture for this
//! workspace (the teacher workspace is itself an x86 emulator).
//!
//! x86 has no spare bits in a real instruction to carry a risu key, so the
//! checkpoint encoding is synthetic: a guaranteed-`#UD` `0f 0b` (`ud2`)
//! followed by one key byte whose high nibble is [`RISU_KEY`] and whose low
//! nibble is the [`RisuOp`]. `get_risuop` reads that byte, not the `ud2`
//! itself.

use crate::{Arch, RegMask, Reginfo};
use risu_proto::{op_from_checkpoint_word, Endian, RisuOp};
use std::fmt;

pub const RISU_KEY_MASK: u32 = 0xF0;
pub const RISU_KEY: u32 = 0x50;

/// Longest x86-64 instruction encoding; used to size the captured
/// faulting-instruction window (mirrors `MAX_INSTR_LEN` in the corpus's
/// ptrace-based tracer).
pub const MAX_INSTR_LEN: usize = 15;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Gprs {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub rsp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
}

impl Gprs {
    const COUNT: usize = 16;

    fn get(&self, i: usize) -> u64 {
        match i {
            0 => self.rax,
            1 => self.rbx,
            2 => self.rcx,
            3 => self.rdx,
            4 => self.rsi,
            5 => self.rdi,
            6 => self.rbp,
            7 => self.rsp,
            8 => self.r8,
            9 => self.r9,
            10 => self.r10,
            11 => self.r11,
            12 => self.r12,
            13 => self.r13,
            14 => self.r14,
            15 => self.r15,
            _ => unreachable!(),
        }
    }

    fn set(&mut self, i: usize, v: u64) {
        match i {
            0 => self.rax = v,
            1 => self.rbx = v,
            2 => self.rcx = v,
            3 => self.rdx = v,
            4 => self.rsi = v,
            5 => self.rdi = v,
            6 => self.rbp = v,
            7 => self.rsp = v,
            8 => self.r8 = v,
            9 => self.r9 = v,
            10 => self.r10 = v,
            11 => self.r11 = v,
            12 => self.r12 = v,
            13 => self.r13 = v,
            14 => self.r14 = v,
            15 => self.r15 = v,
            _ => unreachable!(),
        }
    }

    const NAMES: [&'static str; 16] = [
        "rax", "rbx", "rcx", "rdx", "rsi", "rdi", "rbp", "rsp", "r8", "r9", "r10", "r11", "r12",
        "r13", "r14", "r15",
    ];
}

/// Raw pieces `risu-driver` reads out of the x86_64 `ucontext_t` /
/// `mcontext_t` when an illegal-instruction trap fires.
#[derive(Clone, Debug, Default)]
pub struct RawCapture {
    pub gprs: Gprs,
    pub rip: u64,
    pub rflags: u64,
    /// Bytes at `rip` at the moment of the trap, zero-padded past the
    /// checkpoint sequence's actual length.
    pub insn_bytes: [u8; MAX_INSTR_LEN],
    pub insn_len: u8,
}

#[derive(Clone, Debug, PartialEq)]
pub struct X86Reginfo {
    pub gprs: Gprs,
    pub rip: u64,
    pub rflags: u64,
    pub insn_bytes: [u8; MAX_INSTR_LEN],
    pub insn_len: u8,
}

/// RFLAGS bits a differential comparison can meaningfully assert on:
/// reserved/undefined bits and bit 1 (always-1) are excluded by the mask
/// default rather than compared bit-for-bit.
const RFLAGS_MASK: u64 = 0x0000_0000_0000_08D5; // CF, PF, AF, ZF, SF, OF

impl Reginfo for X86Reginfo {
    fn risu_op(&self) -> RisuOp {
        checkpoint_op(&self.insn_bytes, self.insn_len)
    }

    fn pc(&self) -> u64 {
        self.rip
    }

    fn encoded_len(&self) -> usize {
        // 16 gprs + rip + rflags, 8 bytes each, plus the instruction window
        // (1 length byte + MAX_INSTR_LEN bytes).
        (Gprs::COUNT + 2) * 8 + 1 + MAX_INSTR_LEN
    }

    fn param_reg(&self) -> u64 {
        self.gprs.rdi
    }

    fn set_param_reg(&mut self, value: u64) {
        self.gprs.rdi = value;
    }

    fn encode(&self, endian: Endian, out: &mut Vec<u8>) {
        for i in 0..Gprs::COUNT {
            write_u64(out, self.gprs.get(i), endian);
        }
        write_u64(out, self.rip, endian);
        write_u64(out, self.rflags, endian);
        out.push(self.insn_len);
        out.extend_from_slice(&self.insn_bytes);
    }

    fn decode(bytes: &[u8], endian: Endian) -> Option<Self> {
        let fixed_len = (Gprs::COUNT + 2) * 8 + 1 + MAX_INSTR_LEN;
        if bytes.len() < fixed_len {
            return None;
        }
        let mut off = 0;
        let mut gprs = Gprs::default();
        for i in 0..Gprs::COUNT {
            gprs.set(i, read_u64(bytes, &mut off, endian));
        }
        let rip = read_u64(bytes, &mut off, endian);
        let rflags = read_u64(bytes, &mut off, endian);
        let insn_len = bytes[off];
        off += 1;
        let mut insn_bytes = [0u8; MAX_INSTR_LEN];
        insn_bytes.copy_from_slice(&bytes[off..off + MAX_INSTR_LEN]);
        Some(X86Reginfo {
            gprs,
            rip,
            rflags,
            insn_bytes,
            insn_len,
        })
    }

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        for i in 0..Gprs::COUNT {
            writeln!(out, "{}: {:#018x}", Gprs::NAMES[i], self.gprs.get(i))?;
        }
        writeln!(out, "rip: {:#018x}", self.rip)?;
        writeln!(out, "rflags: {:#018x}", self.rflags & RFLAGS_MASK)
    }
}

fn checkpoint_op(insn_bytes: &[u8; MAX_INSTR_LEN], insn_len: u8) -> RisuOp {
    if insn_len < 3 || insn_bytes[0] != 0x0f || insn_bytes[1] != 0x0b {
        return RisuOp::Sigill;
    }
    op_from_checkpoint_word(insn_bytes[2] as u32, RISU_KEY_MASK, RISU_KEY)
}

fn write_u64(out: &mut Vec<u8>, v: u64, endian: Endian) {
    out.extend_from_slice(&match endian {
        Endian::Little => v.to_le_bytes(),
        Endian::Big => v.to_be_bytes(),
    });
}

fn read_u64(bytes: &[u8], off: &mut usize, endian: Endian) -> u64 {
    let arr: [u8; 8] = bytes[*off..*off + 8].try_into().unwrap();
    *off += 8;
    match endian {
        Endian::Little => u64::from_le_bytes(arr),
        Endian::Big => u64::from_be_bytes(arr),
    }
}

/// GPRs masked out of comparison by default: none on x86_64 — unlike PPC's
/// stack/TLS registers, RSP/RBP legitimately participate in most test
/// sequences the image constructs, and the image itself is responsible for
/// not depending on an absolute stack address across runs.
#[derive(Clone, Debug)]
pub struct X86EqConfig {
    pub gpr_mask: RegMask,
    pub rflags_mask: u64,
}

impl Default for X86EqConfig {
    fn default() -> Self {
        X86EqConfig {
            gpr_mask: RegMask::ALL,
            rflags_mask: RFLAGS_MASK,
        }
    }
}

pub struct X86_64;

impl Arch for X86_64 {
    type Reginfo = X86Reginfo;
    type RawCapture = RawCapture;
    type EqConfig = X86EqConfig;

    const NAME: &'static str = "x86_64";
    const BIG_ENDIAN: bool = false;
    const RISU_KEY_MASK: u32 = RISU_KEY_MASK;
    const RISU_KEY: u32 = RISU_KEY;
    const CHECKPOINT_LEN: u32 = 3;

    fn capture(raw: &RawCapture) -> X86Reginfo {
        X86Reginfo {
            gprs: raw.gprs,
            rip: raw.rip,
            rflags: raw.rflags,
            insn_bytes: raw.insn_bytes,
            insn_len: raw.insn_len,
        }
    }

    fn is_eq(config: &X86EqConfig, master: &X86Reginfo, apprentice: &mut X86Reginfo) -> bool {
        let mut eq = true;
        for i in 0..Gprs::COUNT {
            if config.gpr_mask.get(i as u32) {
                if master.gprs.get(i) != apprentice.gprs.get(i) {
                    eq = false;
                }
            } else {
                apprentice.gprs.set(i, master.gprs.get(i));
            }
        }
        let m_flags = master.rflags & config.rflags_mask;
        let a_flags = apprentice.rflags & config.rflags_mask;
        if m_flags != a_flags {
            eq = false;
        } else {
            apprentice.rflags = master.rflags;
        }
        eq
    }

    fn dump_mismatch(
        master: &X86Reginfo,
        apprentice: &X86Reginfo,
        out: &mut dyn fmt::Write,
    ) -> fmt::Result {
        for i in 0..Gprs::COUNT {
            let (m, a) = (master.gprs.get(i), apprentice.gprs.get(i));
            if m != a {
                writeln!(out, "{}: master={:#018x} apprentice={:#018x}", Gprs::NAMES[i], m, a)?;
            }
        }
        let (m, a) = (master.rflags & RFLAGS_MASK, apprentice.rflags & RFLAGS_MASK);
        if m != a {
            writeln!(out, "rflags: master={:#018x} apprentice={:#018x}", m, a)?;
        }
        Ok(())
    }
}
