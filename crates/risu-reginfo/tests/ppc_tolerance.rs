use risu_reginfo::arch::ppc64::{PpcEqConfig, PpcReginfo, Ppc64, RISU_KEY};
use risu_reginfo::{Arch, FpOpts};

fn blank(prev_insn: u32) -> PpcReginfo {
    PpcReginfo {
        gprs: [0; 32],
        nip: 0x1000,
        msr: 0,
        ctr: 0,
        lnk: 0,
        xer: 0,
        ccr: 0,
        mq: 0,
        dar: 0,
        dsisr: 0,
        fpregs: [0; 32],
        fpscr: 0,
        second_prev_insn: 0,
        prev_insn,
        faulting_insn: RISU_KEY,
        next_insn: 0,
    }
}

fn fmuls(frd: usize, fra: usize, frc: usize) -> u32 {
    (59 << 26) | ((frd as u32) << 21) | ((fra as u32) << 16) | ((frc as u32) << 6) | (25 << 1)
}

fn fdiv(frd: usize, fra: usize, frb: usize) -> u32 {
    (63 << 26) | ((frd as u32) << 21) | ((fra as u32) << 16) | ((frb as u32) << 11) | (18 << 1)
}

/// For every excuse family named in spec.md §4.7, there exists a pair of
/// reginfo snapshots differing only in the way that excuse describes, for
/// which equality holds with the excuse enabled and fails with it disabled
/// (spec.md §8, testable property).

#[test]
fn underflow_excuse_is_on_off_sensitive() {
    let mut master = blank(fmuls(1, 2, 3));
    master.fpregs[1] = 0x0008_0000_0000_0000;
    let mut apprentice = master.clone();
    apprentice.fpregs[1] = 0;

    let mut config = PpcEqConfig::default();
    assert!(Ppc64::is_eq(&config, &master, &mut apprentice.clone()));

    config.fp_opts.remove(FpOpts::IGNORE_UNDERFLOW);
    assert!(!Ppc64::is_eq(&config, &master, &mut apprentice));
}

#[test]
fn div_zero_excuse_is_on_off_sensitive() {
    let mut master = blank(fdiv(1, 2, 3));
    master.fpregs[2] = 0x3ff0_0000_0000_0000; // dividend 1.0
    master.fpregs[3] = 0; // divisor zero
    master.fpregs[1] = 0x7ff0_0000_0000_0000; // +inf
    let mut apprentice = master.clone();
    apprentice.fpregs[1] = 0x7ff8_0000_0000_0001; // qnan

    let mut config = PpcEqConfig::default();
    assert!(Ppc64::is_eq(&config, &master, &mut apprentice.clone()));

    config.fp_opts.remove(FpOpts::IGNORE_DIV_ZERO);
    assert!(!Ppc64::is_eq(&config, &master, &mut apprentice));
}

#[test]
fn qnan_payload_excuse_is_on_off_sensitive() {
    let mut master = blank(fmuls(1, 2, 3));
    master.fpregs[1] = 0x7ff8_0000_0000_0001;
    let mut apprentice = master.clone();
    apprentice.fpregs[1] = 0x7ff8_0000_0000_00ff;

    let mut config = PpcEqConfig::default();
    assert!(Ppc64::is_eq(&config, &master, &mut apprentice.clone()));

    config.fp_opts = FpOpts::empty();
    assert!(!Ppc64::is_eq(&config, &master, &mut apprentice));
}

#[test]
fn rounding_excuse_tolerates_one_ulp_double() {
    let mut master = blank(fdiv(1, 2, 3));
    master.fpregs[2] = 0x3ff0_0000_0000_0000; // 1.0
    master.fpregs[3] = 0x4008_0000_0000_0000; // 3.0
    master.fpregs[1] = 0x3fd5_5555_5555_5555; // 1/3 rounded one way
    let mut apprentice = master.clone();
    apprentice.fpregs[1] = 0x3fd5_5555_5555_5556; // one ULP off

    let mut config = PpcEqConfig::default();
    assert!(Ppc64::is_eq(&config, &master, &mut apprentice.clone()));

    config.fp_opts.remove(FpOpts::IGNORE_ROUNDING);
    assert!(!Ppc64::is_eq(&config, &master, &mut apprentice));
}

#[test]
fn masking_monotonicity_clearing_a_bit_never_turns_equal_into_unequal() {
    let master = blank(0);
    let mut apprentice = blank(0);
    apprentice.gprs[5] = 42;

    let mut config = PpcEqConfig::default();
    let was_eq = Ppc64::is_eq(&config, &master, &mut apprentice.clone());
    assert!(!was_eq);

    config.gpr_mask.clear(5);
    let now_eq = Ppc64::is_eq(&config, &master, &mut apprentice);
    assert!(now_eq);
}
