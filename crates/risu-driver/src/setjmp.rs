//! Minimal `sigsetjmp`/`siglongjmp` substitute for the checkpoint signal
//! handler (spec.md §9, "cross-process, non-returning control flow").
//! glibc's `sigsetjmp` is a macro, not a linkable symbol, so it can't be
//! called through FFI; this reimplements the x86_64 System V subset
//! `original_source/risu.c` relies on — the callee-saved registers, the
//! stack pointer, and the signal mask.
//!
//! x86_64 only. The real signal-driven harness this module supports is
//! out of scope on other host architectures even though `risu-reginfo`'s
//! PPC module is fully modeled for differential comparison (§1).

#[repr(C, align(16))]
pub struct SigJmpBuf {
    /// rbx, rbp, r12, r13, r14, r15, rsp, return address.
    regs: [u64; 8],
    mask: libc::sigset_t,
}

#[cfg(target_arch = "x86_64")]
mod arch {
    use super::SigJmpBuf;
    use std::arch::naked_asm;

    #[unsafe(naked)]
    pub unsafe extern "C" fn raw_setjmp(_buf: *mut SigJmpBuf) -> i32 {
        naked_asm!(
            "mov [rdi], rbx",
            "mov [rdi + 8], rbp",
            "mov [rdi + 16], r12",
            "mov [rdi + 24], r13",
            "mov [rdi + 32], r14",
            "mov [rdi + 40], r15",
            "lea rax, [rsp + 8]",
            "mov [rdi + 48], rax",
            "mov rax, [rsp]",
            "mov [rdi + 56], rax",
            "xor eax, eax",
            "ret",
        )
    }

    #[unsafe(naked)]
    pub unsafe extern "C" fn raw_longjmp(_buf: *mut SigJmpBuf, _val: i32) -> ! {
        naked_asm!(
            "mov rbx, [rdi]",
            "mov rbp, [rdi + 8]",
            "mov r12, [rdi + 16]",
            "mov r13, [rdi + 24]",
            "mov r14, [rdi + 32]",
            "mov r15, [rdi + 40]",
            "mov rsp, [rdi + 48]",
            "mov rcx, [rdi + 56]",
            "mov eax, esi",
            "test eax, eax",
            "jnz 2f",
            "mov eax, 1",
            "2:",
            "jmp rcx",
        )
    }
}

#[cfg(not(target_arch = "x86_64"))]
mod arch {
    use super::SigJmpBuf;

    pub unsafe extern "C" fn raw_setjmp(_buf: *mut SigJmpBuf) -> i32 {
        unimplemented!("sigsetjmp is only implemented for x86_64 in this workspace")
    }

    pub unsafe extern "C" fn raw_longjmp(_buf: *mut SigJmpBuf, _val: i32) -> ! {
        unimplemented!("siglongjmp is only implemented for x86_64 in this workspace")
    }
}

/// Saves the signal mask and the current register/stack state. Returns
/// `0` on the initial call, and the value passed to [`siglongjmp`] on the
/// jumped-to return.
pub unsafe fn sigsetjmp(buf: *mut SigJmpBuf) -> i32 {
    libc::pthread_sigmask(0, std::ptr::null(), std::ptr::addr_of_mut!((*buf).mask));
    arch::raw_setjmp(buf)
}

/// Restores the signal mask saved by the matching [`sigsetjmp`] and jumps
/// back to its call site, which returns `val` (or `1` if `val` is `0`,
/// matching glibc's `longjmp` convention of never returning zero).
pub unsafe fn siglongjmp(buf: *mut SigJmpBuf, val: i32) -> ! {
    libc::pthread_sigmask(
        libc::SIG_SETMASK,
        std::ptr::addr_of!((*buf).mask),
        std::ptr::null_mut(),
    );
    arch::raw_longjmp(buf, val)
}
