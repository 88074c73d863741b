//! Top-level `master()`/`apprentice()` wiring: installs the trap handler,
//! jumps into the image, and maps the terminal `RisuError` to a process
//! exit code and a diagnostic (`original_source/risu.c`'s `master()`/
//! `apprentice()` `switch` over `RisuResult`).
//!
//! x86_64 only. `risu_driver::setjmp`'s hand-rolled escape point and this
//! module's `ucontext_t` glue are both scoped to the host's native
//! architecture (SPEC_FULL.md §1); ppc64 stays a differential-comparison
//! module without a live signal-driven harness here.

use crate::cli::Cli;
use crate::image::{run_image, Image};
use crate::net;
use crate::ucontext;
use risu_driver::signal::{install, set_escape_point, take_result};
use risu_driver::{ApprenticeDriver, MasterDriver, RisuError, MEMBLOCKLEN};
use risu_reginfo::arch::x86_64::{X86EqConfig, X86Reginfo, X86_64};
use risu_reginfo::{Arch, Reginfo};
use risu_wire::Transport;
use std::cell::UnsafeCell;
use std::fmt::Write as _;
use std::process::ExitCode;

struct RunState {
    transport: UnsafeCell<Option<Box<dyn Transport>>>,
    master: UnsafeCell<Option<MasterDriver<X86_64>>>,
    apprentice: UnsafeCell<Option<ApprenticeDriver<X86_64>>>,
    memblock: UnsafeCell<[u8; MEMBLOCKLEN]>,
    /// The apprentice's own reginfo at its most recent checkpoint, kept
    /// only for the post-mortem mismatch dump (the original's `ri[APPRENTICE]`
    /// file-scope global serves the same purpose).
    last_apprentice_reginfo: UnsafeCell<Option<X86Reginfo>>,
}

// Safety: the handler and the driver-scope code that reads these cells
// never run concurrently (spec.md §5, "strictly non-overlapping").
unsafe impl Sync for RunState {}

static STATE: RunState = RunState {
    transport: UnsafeCell::new(None),
    master: UnsafeCell::new(None),
    apprentice: UnsafeCell::new(None),
    memblock: UnsafeCell::new([0u8; MEMBLOCKLEN]),
    last_apprentice_reginfo: UnsafeCell::new(None),
};

const ALT_STACK_LEN: usize = 1 << 16;

/// COMPAREMEM differentially compares the image's own scratch data page,
/// whose address SETMEMBLOCK recorded — not an out-of-image buffer. Falls
/// back to the static scratch block only before any SETMEMBLOCK has run,
/// when the op can't be COMPAREMEM anyway.
unsafe fn memblock_ptr(base: Option<u64>, scratch: *mut [u8; MEMBLOCKLEN]) -> *mut u8 {
    match base {
        Some(addr) if addr != 0 => addr as *mut u8,
        _ => scratch.cast(),
    }
}

unsafe fn master_checkpoint(context: *mut libc::c_void) -> Result<(), RisuError> {
    let raw = ucontext::capture(context);
    let mut reginfo = X86_64::capture(&raw);
    let driver = (*STATE.master.get()).as_mut().expect("master driver installed");
    let transport: &mut dyn Transport = &mut **(*STATE.transport.get()).as_mut().expect("transport installed");
    let memblock = std::slice::from_raw_parts(
        memblock_ptr(driver.memblock_base, STATE.memblock.get()),
        MEMBLOCKLEN,
    );
    let result = driver.checkpoint(transport, &mut reginfo, memblock);
    ucontext::set_param_reg(context, reginfo.param_reg());
    result
}

unsafe fn apprentice_checkpoint(context: *mut libc::c_void) -> Result<(), RisuError> {
    let raw = ucontext::capture(context);
    let mut reginfo = X86_64::capture(&raw);
    let driver = (*STATE.apprentice.get())
        .as_mut()
        .expect("apprentice driver installed");
    let transport: &mut dyn Transport = &mut **(*STATE.transport.get()).as_mut().expect("transport installed");
    let memblock = std::slice::from_raw_parts_mut(
        memblock_ptr(driver.memblock_base, STATE.memblock.get()),
        MEMBLOCKLEN,
    );
    let result = driver.checkpoint(transport, &mut reginfo, memblock);
    ucontext::set_param_reg(context, reginfo.param_reg());
    *STATE.last_apprentice_reginfo.get() = Some(reginfo);
    result
}

unsafe fn advance_pc(context: *mut libc::c_void) {
    ucontext::advance_pc(context, X86_64::CHECKPOINT_LEN);
}

pub fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    net::validate_trace_mode(cli)?;
    let image = Image::load(&cli.image)?;
    let transport = net::open_transport(cli)?;
    let mut alt_stack = vec![0u8; ALT_STACK_LEN];

    unsafe {
        *STATE.transport.get() = Some(transport);
        if cli.master {
            *STATE.master.get() = Some(MasterDriver::<X86_64>::new());
            install(&mut alt_stack, master_checkpoint, advance_pc);
            Ok(run_master(&image))
        } else {
            // The ppc-specific masks on `cli` have no effect here: the
            // live signal-driven harness only runs the x86_64 arch module
            // (see module doc comment). They still parse and validate for
            // CLI surface parity with `original_source/risu.c`.
            let eq_config = X86EqConfig::default();
            *STATE.apprentice.get() = Some(ApprenticeDriver::<X86_64>::new(eq_config));
            install(&mut alt_stack, apprentice_checkpoint, advance_pc);
            Ok(run_apprentice(&image))
        }
    }
}

unsafe fn run_master(image: &Image) -> ExitCode {
    let jumped = set_escape_point();
    if jumped == 0 {
        tracing::info!(entry = format_args!("{:#x}", image.start_address()), "starting image");
        run_image(image);
        tracing::error!("image returned unexpectedly");
        return ExitCode::FAILURE;
    }

    let driver = (*STATE.master.get()).as_ref().expect("master driver installed");
    match take_result() {
        Some(RisuError::End) => {
            tracing::info!(checkpoints = driver.signal_count, "done");
            ExitCode::SUCCESS
        }
        Some(RisuError::SigBus) => {
            tracing::error!(checkpoints = driver.signal_count, "bus error");
            ExitCode::FAILURE
        }
        Some(err) => {
            tracing::error!(checkpoints = driver.signal_count, error = %err, "i/o error");
            ExitCode::FAILURE
        }
        None => {
            tracing::error!("handler returned without recording a result");
            ExitCode::FAILURE
        }
    }
}

unsafe fn run_apprentice(image: &Image) -> ExitCode {
    let jumped = set_escape_point();
    if jumped == 0 {
        tracing::info!(entry = format_args!("{:#x}", image.start_address()), "starting image");
        run_image(image);
        tracing::error!("image returned unexpectedly");
        return ExitCode::FAILURE;
    }

    let driver = (*STATE.apprentice.get())
        .as_ref()
        .expect("apprentice driver installed");
    match take_result() {
        Some(RisuError::End) => {
            tracing::info!(checkpoints = driver.signal_count, "done");
            ExitCode::SUCCESS
        }
        Some(RisuError::MismatchReg) => {
            let mut dump = String::new();
            if let (Some(master), Some(apprentice)) =
                (&driver.last_master_reginfo, &*STATE.last_apprentice_reginfo.get())
            {
                let _ = master.dump(&mut dump);
                let _ = writeln!(dump, "---");
                let _ = apprentice.dump(&mut dump);
                let _ = writeln!(dump, "---");
                let _ = X86_64::dump_mismatch(master, apprentice, &mut dump);
            }
            tracing::error!(checkpoints = driver.signal_count, "register mismatch\n{dump}");
            ExitCode::FAILURE
        }
        Some(err @ RisuError::MismatchMem { .. }) => {
            tracing::error!(checkpoints = driver.signal_count, error = %err, "memblock mismatch");
            ExitCode::FAILURE
        }
        Some(err @ RisuError::MismatchOp { .. }) => {
            tracing::error!(checkpoints = driver.signal_count, error = %err, "out of sync");
            ExitCode::FAILURE
        }
        Some(RisuError::SigBus) => {
            tracing::error!(checkpoints = driver.signal_count, "bus error");
            ExitCode::FAILURE
        }
        Some(err) => {
            tracing::error!(checkpoints = driver.signal_count, error = %err, "checkpoint failed");
            ExitCode::FAILURE
        }
        None => {
            tracing::error!("handler returned without recording a result");
            ExitCode::FAILURE
        }
    }
}
