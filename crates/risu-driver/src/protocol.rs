//! Checkpoint protocol state machines, independent of real signal
//! delivery (spec.md §4.2, §4.3). `MasterDriver`/`ApprenticeDriver` are
//! driven by `risu-cli`'s signal handler in production and directly by
//! tests through a `FakeArch` test double (SPEC_FULL.md §8's ambient test
//! placement note).

use crate::error::RisuError;
use crate::MEMBLOCKLEN;
use risu_proto::{Endian, PtrWidth, RisuOp, TraceHeader};
use risu_reginfo::{Arch, Reginfo};
use risu_wire::{read_frame, write_frame, Transport};
use std::marker::PhantomData;

/// Both modeled architectures (x86_64, ppc64) are 64-bit; 32-bit ISAs are
/// out of this workspace's scope (spec.md §1).
const PTR_WIDTH: PtrWidth = PtrWidth::Bits64;

fn arch_endian<A: Arch>() -> Endian {
    if A::BIG_ENDIAN {
        Endian::Big
    } else {
        Endian::Little
    }
}

/// Master-side checkpoint state machine (spec.md §4.2).
pub struct MasterDriver<A: Arch> {
    pub memblock_base: Option<u64>,
    pub is_setup: bool,
    pub signal_count: u64,
    _arch: PhantomData<A>,
}

impl<A: Arch> Default for MasterDriver<A> {
    fn default() -> Self {
        MasterDriver {
            memblock_base: None,
            is_setup: false,
            signal_count: 0,
            _arch: PhantomData,
        }
    }
}

impl<A: Arch> MasterDriver<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one checkpoint. `reginfo` is captured by the caller from the
    /// signal context before calling this (spec.md §4.1: the handler
    /// "invokes the role-appropriate checkpoint routine"); `memblock` is
    /// the current contents of the shared data page, needed for
    /// COMPAREMEM.
    ///
    /// `Ok(())` means the image should resume. `Err(RisuError::End)`
    /// covers both TESTEND and a non-OK response byte (SPEC_FULL.md's
    /// recorded resolution of the response-byte Open Question); any
    /// other `Err` is a genuine protocol failure.
    pub fn checkpoint(
        &mut self,
        transport: &mut dyn Transport,
        reginfo: &mut A::Reginfo,
        memblock: &[u8],
    ) -> Result<(), RisuError> {
        self.signal_count += 1;
        let op = reginfo.risu_op();
        if self.is_setup && op == RisuOp::Sigill {
            return Ok(());
        }

        let endian = arch_endian::<A>();
        let mut payload = Vec::new();
        match op {
            RisuOp::Compare | RisuOp::TestEnd | RisuOp::Sigill => reginfo.encode(endian, &mut payload),
            RisuOp::CompareMem => payload.extend_from_slice(memblock),
            RisuOp::SetMemblock | RisuOp::GetMemblock | RisuOp::SetupBegin | RisuOp::SetupEnd => {}
        }
        let header = TraceHeader::new(reginfo.pc(), op, payload.len() as u32);
        write_frame(transport, &header, &payload, endian, PTR_WIDTH)?;

        match op {
            RisuOp::TestEnd => {
                tracing::debug!(signal_count = self.signal_count, "master reached end of test");
                return Err(RisuError::End);
            }
            RisuOp::SetMemblock => self.memblock_base = Some(reginfo.param_reg()),
            RisuOp::GetMemblock => {
                let base = self.memblock_base.unwrap_or(0);
                let translated = reginfo.param_reg().wrapping_add(base);
                reginfo.set_param_reg(translated);
            }
            RisuOp::SetupBegin => self.is_setup = true,
            RisuOp::SetupEnd => self.is_setup = false,
            _ => {}
        }

        let response = transport.recv_response()?;
        if response != RisuError::RES_OK {
            return Err(RisuError::End);
        }
        Ok(())
    }
}

/// Apprentice-side checkpoint state machine (spec.md §4.3).
pub struct ApprenticeDriver<A: Arch> {
    pub memblock_base: Option<u64>,
    pub is_setup: bool,
    pub signal_count: u64,
    pub eq_config: A::EqConfig,
    /// Last master reginfo received, kept for `dump_mismatch` diagnostics.
    pub last_master_reginfo: Option<A::Reginfo>,
    _arch: PhantomData<A>,
}

impl<A: Arch> ApprenticeDriver<A> {
    pub fn new(eq_config: A::EqConfig) -> Self {
        ApprenticeDriver {
            memblock_base: None,
            is_setup: false,
            signal_count: 0,
            eq_config,
            last_master_reginfo: None,
            _arch: PhantomData,
        }
    }

    /// Runs one checkpoint, always sending exactly one response byte
    /// before returning (spec.md §4.3 step 6), regardless of verdict.
    pub fn checkpoint(
        &mut self,
        transport: &mut dyn Transport,
        reginfo: &mut A::Reginfo,
        memblock: &mut [u8],
    ) -> Result<(), RisuError> {
        self.signal_count += 1;
        let op = reginfo.risu_op();
        if self.is_setup && op == RisuOp::Sigill {
            return Ok(());
        }

        let result = self.recv_and_compare(transport, op, reginfo, memblock);
        transport.send_response(RisuError::response_byte(&result))?;
        result
    }

    fn recv_and_compare(
        &mut self,
        transport: &mut dyn Transport,
        op: RisuOp,
        reginfo: &mut A::Reginfo,
        memblock: &mut [u8],
    ) -> Result<(), RisuError> {
        let (header, payload, endian) = read_frame(transport, PTR_WIDTH)?;
        let peer_op = header.risu_op;

        // Validate, driven by the peer's declared op (spec.md §4.3 step 4).
        let master_reginfo = if peer_op.is_register_op() {
            let capacity = reginfo.encoded_len() as u32;
            if header.size > capacity {
                return Err(RisuError::BadSizeHeader {
                    got: header.size,
                    capacity,
                });
            }
            let decoded = A::Reginfo::decode(&payload, endian).filter(|r| r.encoded_len() as u32 == header.size);
            let decoded = decoded.ok_or(RisuError::BadSizeReginfo {
                got: header.size,
                want: capacity,
            })?;
            Some(decoded)
        } else if peer_op == RisuOp::CompareMem {
            if header.size as usize != MEMBLOCKLEN {
                return Err(RisuError::BadSizeMemblock {
                    got: header.size,
                    want: MEMBLOCKLEN as u32,
                });
            }
            None
        } else {
            if header.size != 0 {
                return Err(RisuError::BadSizeZero {
                    op: peer_op,
                    got: header.size,
                });
            }
            None
        };

        // Decide the verdict, driven by the local op (spec.md §4.3 step 5).
        match op {
            RisuOp::Compare | RisuOp::TestEnd | RisuOp::Sigill => {
                if !peer_op.is_register_op() {
                    return Err(RisuError::MismatchOp { local: op, peer: peer_op });
                }
                let master = master_reginfo.expect("register op validated above");
                if !self.is_setup && !A::is_eq(&self.eq_config, &master, reginfo) {
                    tracing::warn!(signal_count = self.signal_count, "register state mismatch");
                    return Err(RisuError::MismatchReg);
                }
                if op != peer_op {
                    return Err(RisuError::MismatchOp { local: op, peer: peer_op });
                }
                self.last_master_reginfo = Some(master);
                if op == RisuOp::TestEnd {
                    tracing::debug!(signal_count = self.signal_count, "apprentice reached end of test");
                    return Err(RisuError::End);
                }
                Ok(())
            }
            RisuOp::SetMemblock => {
                if op != peer_op {
                    return Err(RisuError::MismatchOp { local: op, peer: peer_op });
                }
                self.memblock_base = Some(reginfo.param_reg());
                Ok(())
            }
            RisuOp::GetMemblock => {
                if op != peer_op {
                    return Err(RisuError::MismatchOp { local: op, peer: peer_op });
                }
                let base = self.memblock_base.unwrap_or(0);
                let translated = reginfo.param_reg().wrapping_add(base);
                reginfo.set_param_reg(translated);
                Ok(())
            }
            RisuOp::CompareMem => {
                if op != peer_op {
                    return Err(RisuError::MismatchOp { local: op, peer: peer_op });
                }
                for (offset, (mine, theirs)) in memblock.iter().zip(payload.iter()).enumerate() {
                    if mine != theirs {
                        tracing::warn!(signal_count = self.signal_count, offset, "memblock mismatch");
                        return Err(RisuError::MismatchMem { offset });
                    }
                }
                Ok(())
            }
            RisuOp::SetupBegin | RisuOp::SetupEnd => {
                if op != peer_op {
                    return Err(RisuError::MismatchOp { local: op, peer: peer_op });
                }
                self.is_setup = op == RisuOp::SetupBegin;
                Ok(())
            }
        }
    }
}
