//! Installs the SIGILL/SIGBUS handler on a dedicated alternate stack and
//! the non-local-jump escape point out of it (spec.md §4.1,
//! `original_source/risu.c`'s `set_sigill_handler`/`master_sigill`/
//! `apprentice_sigill`).
//!
//! The handler runs with none of Rust's usual guarantees: no panicking
//! across the FFI boundary, no allocation, no `tracing` calls (spec.md §5
//! ambient note — logging happens only after control returns to driver
//! scope via the escape point). It touches only plain `Copy` process-wide
//! state and the raw `ucontext_t`, following the same discipline as the
//! corpus's own trap handler (`other_examples`' k23 `signals.rs`).

use crate::error::RisuError;
use crate::setjmp::SigJmpBuf;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, Ordering};

/// Runs the role's checkpoint routine against the raw signal context and
/// returns whether the image should resume.
///
/// # Safety
/// Called only from async-signal context with `context` pointing at a
/// live `ucontext_t` for the current trap.
pub type CheckpointFn = unsafe fn(*mut libc::c_void) -> Result<(), RisuError>;

/// Advances the trapped PC past the checkpoint instruction so the image
/// resumes at the next one (spec.md invariant 5, ISA-specific delta).
pub type AdvancePcFn = unsafe fn(*mut libc::c_void);

struct HandlerState {
    jmp_buf: UnsafeCell<MaybeUninit<SigJmpBuf>>,
    checkpoint: UnsafeCell<Option<CheckpointFn>>,
    advance_pc: UnsafeCell<Option<AdvancePcFn>>,
    result: UnsafeCell<Option<RisuError>>,
    installed: AtomicBool,
}

// Safety: exactly one thread ever touches these cells at a time — the
// main thread before/after image execution, the handler during it
// (spec.md §5, "execution and handling are strictly non-overlapping").
unsafe impl Sync for HandlerState {}

static STATE: HandlerState = HandlerState {
    jmp_buf: UnsafeCell::new(MaybeUninit::uninit()),
    checkpoint: UnsafeCell::new(None),
    advance_pc: UnsafeCell::new(None),
    result: UnsafeCell::new(None),
    installed: AtomicBool::new(false),
};

/// Value `siglongjmp` carries across the escape; this workspace only
/// needs to distinguish "resume" from "stop" (the actual outcome travels
/// separately in `STATE.result`), so every jump uses the same nonzero
/// value.
const ESCAPE: i32 = 1;

/// Installs the trap handler on `stack` (expected to be at least
/// `libc::SIGSTKSZ` bytes, owned by the caller for the process lifetime)
/// and records the role's checkpoint/advance-pc callbacks.
///
/// # Safety
/// Must be called once, before entering the image, from the same thread
/// that will later call [`set_escape_point`].
pub unsafe fn install(stack: &mut [u8], checkpoint: CheckpointFn, advance_pc: AdvancePcFn) {
    *STATE.checkpoint.get() = Some(checkpoint);
    *STATE.advance_pc.get() = Some(advance_pc);

    let mut ss: libc::stack_t = std::mem::zeroed();
    ss.ss_sp = stack.as_mut_ptr().cast();
    ss.ss_size = stack.len();
    ss.ss_flags = 0;
    if libc::sigaltstack(&ss, std::ptr::null_mut()) != 0 {
        panic!("sigaltstack: {}", std::io::Error::last_os_error());
    }

    let mut sa: libc::sigaction = std::mem::zeroed();
    sa.sa_sigaction = trap_handler as usize;
    sa.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK;
    libc::sigemptyset(&mut sa.sa_mask);
    for sig in [libc::SIGILL, libc::SIGBUS] {
        if libc::sigaction(sig, &sa, std::ptr::null_mut()) != 0 {
            panic!("sigaction({sig}): {}", std::io::Error::last_os_error());
        }
    }

    STATE.installed.store(true, Ordering::SeqCst);
}

/// Sets the escape point. Returns `0` on the initial call, made right
/// before jumping into the image; returns nonzero on the return made by
/// [`siglongjmp`](crate::setjmp::siglongjmp) from inside the handler, at
/// which point [`take_result`] holds the terminal outcome.
///
/// # Safety
/// Must be called after [`install`], on the thread that installed it.
pub unsafe fn set_escape_point() -> i32 {
    debug_assert!(STATE.installed.load(Ordering::SeqCst));
    crate::setjmp::sigsetjmp(STATE.jmp_buf.get().cast())
}

/// Takes the terminal result left by the handler after a jump back to
/// [`set_escape_point`]'s nonzero return. `None` only if called without
/// such a jump having occurred.
///
/// # Safety
/// Must only be called from driver scope, never from signal context.
pub unsafe fn take_result() -> Option<RisuError> {
    (*STATE.result.get()).take()
}

unsafe extern "C" fn trap_handler(
    signum: libc::c_int,
    _siginfo: *mut libc::siginfo_t,
    context: *mut libc::c_void,
) {
    if signum == libc::SIGBUS {
        *STATE.result.get() = Some(RisuError::SigBus);
        crate::setjmp::siglongjmp(STATE.jmp_buf.get().cast(), ESCAPE);
    }

    let checkpoint = (*STATE.checkpoint.get()).expect("trap_handler fired before install()");
    match checkpoint(context) {
        Ok(()) => {
            if let Some(advance) = *STATE.advance_pc.get() {
                advance(context);
            }
        }
        Err(err) => {
            *STATE.result.get() = Some(err);
            crate::setjmp::siglongjmp(STATE.jmp_buf.get().cast(), ESCAPE);
        }
    }
}
