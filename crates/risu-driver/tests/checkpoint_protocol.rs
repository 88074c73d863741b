use risu_driver::{ApprenticeDriver, RisuError};
use risu_proto::{Endian, PtrWidth, RisuOp, TraceHeader};
use risu_reginfo::arch::x86_64::{Gprs, RawCapture, X86EqConfig, X86Reginfo, X86_64};
use risu_reginfo::{Arch, Reginfo};
use risu_wire::{Transport, WireError};
use std::collections::VecDeque;

/// Feeds one pre-built frame to an `ApprenticeDriver` and records the
/// response byte it sends back.
struct ScriptedTransport {
    inbound: VecDeque<u8>,
    responses: Vec<u8>,
}

impl ScriptedTransport {
    fn new(frame: Vec<u8>) -> Self {
        ScriptedTransport {
            inbound: frame.into_iter().collect(),
            responses: Vec::new(),
        }
    }
}

impl Transport for ScriptedTransport {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), WireError> {
        if self.inbound.len() < buf.len() {
            return Err(WireError::Io(std::io::Error::from(std::io::ErrorKind::UnexpectedEof)));
        }
        for b in buf {
            *b = self.inbound.pop_front().unwrap();
        }
        Ok(())
    }
    fn write_all(&mut self, _buf: &[u8]) -> Result<(), WireError> {
        unreachable!("apprentice never writes frames")
    }
    fn send_response(&mut self, code: u8) -> Result<(), WireError> {
        self.responses.push(code);
        Ok(())
    }
    fn recv_response(&mut self) -> Result<u8, WireError> {
        unreachable!("apprentice never reads responses")
    }
}

fn local_reginfo(op: RisuOp) -> X86Reginfo {
    let raw = RawCapture {
        gprs: Gprs::default(),
        rip: 0x401000,
        rflags: 0,
        insn_bytes: {
            let mut b = [0u8; 15];
            b[0] = 0x0f;
            b[1] = 0x0b;
            b[2] = X86_64::RISU_KEY as u8 | op as u8;
            b
        },
        insn_len: 3,
    };
    X86_64::capture(&raw)
}

fn frame_bytes(header: &TraceHeader, payload: &[u8], endian: Endian) -> Vec<u8> {
    let mut buf = Vec::new();
    header.encode(endian, PtrWidth::Bits64, &mut buf);
    buf.extend_from_slice(payload);
    buf
}

#[test]
fn bad_size_header_rejected_when_payload_exceeds_capacity() {
    let mut local = local_reginfo(RisuOp::Compare);
    let capacity = local.encoded_len() as u32;
    let header = TraceHeader::new(0x401000, RisuOp::Compare, capacity + 8);
    let payload = vec![0u8; (capacity + 8) as usize];
    let mut transport = ScriptedTransport::new(frame_bytes(&header, &payload, Endian::Little));

    let mut driver = ApprenticeDriver::<X86_64>::new(X86EqConfig::default());
    let err = driver
        .checkpoint(&mut transport, &mut local, &mut [])
        .unwrap_err();
    assert!(matches!(err, RisuError::BadSizeHeader { .. }));
    assert_eq!(transport.responses, vec![RisuError::RES_END]);
}

#[test]
fn bad_size_zero_rejected_for_control_op_with_nonzero_payload() {
    let mut local = local_reginfo(RisuOp::SetMemblock);
    let header = TraceHeader::new(0x401000, RisuOp::SetMemblock, 4);
    let mut transport = ScriptedTransport::new(frame_bytes(&header, &[1, 2, 3, 4], Endian::Little));

    let mut driver = ApprenticeDriver::<X86_64>::new(X86EqConfig::default());
    let err = driver
        .checkpoint(&mut transport, &mut local, &mut [])
        .unwrap_err();
    assert!(matches!(err, RisuError::BadSizeZero { op: RisuOp::SetMemblock, got: 4 }));
}

#[test]
fn bad_size_memblock_rejected_for_wrong_length() {
    let mut local = local_reginfo(RisuOp::CompareMem);
    let header = TraceHeader::new(0x401000, RisuOp::CompareMem, 4);
    let mut transport = ScriptedTransport::new(frame_bytes(&header, &[1, 2, 3, 4], Endian::Little));

    let mut driver = ApprenticeDriver::<X86_64>::new(X86EqConfig::default());
    let err = driver
        .checkpoint(&mut transport, &mut local, &mut [0u8; risu_driver::MEMBLOCKLEN])
        .unwrap_err();
    assert!(matches!(
        err,
        RisuError::BadSizeMemblock { got: 4, want } if want == risu_driver::MEMBLOCKLEN as u32
    ));
}

#[test]
fn magic_endian_flip_is_transparently_handled() {
    // The peer recorded its trace on a big-endian producer; the header's
    // magic bytes come out byte-swapped relative to this host (spec.md
    // §8 scenario 4).
    let mut master = local_reginfo(RisuOp::Compare);
    master.gprs.rax = 0x1122_3344_5566_7788;
    let mut payload = Vec::new();
    master.encode(Endian::Big, &mut payload);
    let header = TraceHeader::new(master.pc(), RisuOp::Compare, payload.len() as u32);
    let mut transport = ScriptedTransport::new(frame_bytes(&header, &payload, Endian::Big));

    let mut local = local_reginfo(RisuOp::Compare);
    local.gprs.rax = master.gprs.rax;
    let mut driver = ApprenticeDriver::<X86_64>::new(X86EqConfig::default());
    driver.checkpoint(&mut transport, &mut local, &mut []).unwrap();
    assert_eq!(transport.responses, vec![RisuError::RES_OK]);
}
