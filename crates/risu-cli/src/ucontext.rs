//! x86_64 Linux `ucontext_t` glue: turns the raw context a SIGILL/SIGBUS
//! handler receives into `risu_reginfo::arch::x86_64::RawCapture`, and
//! writes the checkpoint's side effects (advanced PC, translated
//! GETMEMBLOCK parameter register) back into it before the image resumes.
//!
//! glibc's `gregs` indices for this context are fixed ABI constants
//! (`REG_RAX` etc., from `<sys/ucontext.h>`), reused here via the `libc`
//! crate's own bindings rather than redeclared.
//!
//! This binary targets x86_64 hosts only, matching the scope of
//! `risu_driver::setjmp`'s escape point.

use risu_reginfo::arch::x86_64::{Gprs, RawCapture, MAX_INSTR_LEN};

/// # Safety
/// `context` must point at a live `ucontext_t` for the trap currently
/// being handled.
pub unsafe fn capture(context: *mut libc::c_void) -> RawCapture {
    let uc = &*(context as *const libc::ucontext_t);
    let g = &uc.uc_mcontext.gregs;

    let gprs = Gprs {
        rax: g[libc::REG_RAX as usize] as u64,
        rbx: g[libc::REG_RBX as usize] as u64,
        rcx: g[libc::REG_RCX as usize] as u64,
        rdx: g[libc::REG_RDX as usize] as u64,
        rsi: g[libc::REG_RSI as usize] as u64,
        rdi: g[libc::REG_RDI as usize] as u64,
        rbp: g[libc::REG_RBP as usize] as u64,
        rsp: g[libc::REG_RSP as usize] as u64,
        r8: g[libc::REG_R8 as usize] as u64,
        r9: g[libc::REG_R9 as usize] as u64,
        r10: g[libc::REG_R10 as usize] as u64,
        r11: g[libc::REG_R11 as usize] as u64,
        r12: g[libc::REG_R12 as usize] as u64,
        r13: g[libc::REG_R13 as usize] as u64,
        r14: g[libc::REG_R14 as usize] as u64,
        r15: g[libc::REG_R15 as usize] as u64,
    };
    let rip = g[libc::REG_RIP as usize] as u64;
    let rflags = g[libc::REG_EFL as usize] as u64;

    let mut insn_bytes = [0u8; MAX_INSTR_LEN];
    let src = rip as *const u8;
    for (i, b) in insn_bytes.iter_mut().enumerate() {
        *b = *src.add(i);
    }

    RawCapture {
        gprs,
        rip,
        rflags,
        insn_bytes,
        insn_len: MAX_INSTR_LEN as u8,
    }
}

/// Writes the checkpoint instruction's byte length onto the trapped PC so
/// the image resumes just past it (spec.md invariant 5).
///
/// # Safety
/// Same preconditions as [`capture`].
pub unsafe fn advance_pc(context: *mut libc::c_void, checkpoint_len: u32) {
    let uc = &mut *(context as *mut libc::ucontext_t);
    uc.uc_mcontext.gregs[libc::REG_RIP as usize] += checkpoint_len as i64;
}

/// Writes a GETMEMBLOCK-translated value back into the parameter register
/// (`rdi`) so the resumed image actually observes it.
///
/// # Safety
/// Same preconditions as [`capture`].
pub unsafe fn set_param_reg(context: *mut libc::c_void, value: u64) {
    let uc = &mut *(context as *mut libc::ucontext_t);
    uc.uc_mcontext.gregs[libc::REG_RDI as usize] = value as i64;
}
