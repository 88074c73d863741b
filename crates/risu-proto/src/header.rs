use crate::{Endian, RisuOp, RISU_MAGIC};

/// Architectural pointer width. Only the `pc` field of [`TraceHeader`]
/// varies with this — `risu_op` and `size` are always 32 bits (spec.md
/// §6, "Wire frame").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PtrWidth {
    Bits32,
    Bits64,
}

impl PtrWidth {
    pub fn byte_len(self) -> usize {
        match self {
            PtrWidth::Bits32 => 4,
            PtrWidth::Bits64 => 8,
        }
    }
}

pub fn header_len(ptr_width: PtrWidth) -> usize {
    4 /* magic */ + ptr_width.byte_len() /* pc */ + 4 /* risu_op */ + 4 /* size */
}

/// `[magic:u32][pc:uptr][risu_op:i32][size:u32]`, all fields in
/// architecture byte order (spec.md §3, §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceHeader {
    pub magic: u32,
    pub pc: u64,
    pub risu_op: RisuOp,
    pub size: u32,
}

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum HeaderDecodeError {
    #[error("header truncated: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },
    #[error("bad magic {0:#010x}: matches neither native nor byte-swapped RISU_MAGIC")]
    BadMagic(u32),
    #[error("unknown risu op value {0}")]
    UnknownOp(i32),
}

impl TraceHeader {
    pub fn new(pc: u64, risu_op: RisuOp, size: u32) -> Self {
        Self {
            magic: RISU_MAGIC,
            pc,
            risu_op,
            size,
        }
    }

    pub fn encode(&self, endian: Endian, ptr_width: PtrWidth, out: &mut Vec<u8>) {
        write_u32(out, self.magic, endian);
        write_uint(out, self.pc, ptr_width, endian);
        write_i32(out, self.risu_op as i32, endian);
        write_u32(out, self.size, endian);
    }

    /// Reads a header, detecting the producer's endianness from whether
    /// `magic` matches `RISU_MAGIC` directly or byte-swapped (spec.md
    /// §4.4's "detection by magic" trick). Returns the header in host
    /// logical values (the caller never has to swap anything again) and
    /// the detected `Endian` for decoding any payload that follows.
    pub fn decode(bytes: &[u8], ptr_width: PtrWidth) -> Result<(Self, Endian), HeaderDecodeError> {
        let need = header_len(ptr_width);
        if bytes.len() < need {
            return Err(HeaderDecodeError::Truncated {
                need,
                got: bytes.len(),
            });
        }

        let magic_le = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let endian = if magic_le == RISU_MAGIC {
            Endian::Little
        } else if magic_le.swap_bytes() == RISU_MAGIC {
            Endian::Big
        } else {
            return Err(HeaderDecodeError::BadMagic(magic_le));
        };

        let mut off = 4;
        let pc = read_uint(bytes, &mut off, ptr_width, endian);
        let risu_op_raw = read_i32(bytes, &mut off, endian);
        let size = read_u32(bytes, &mut off, endian);
        let risu_op = RisuOp::try_from(risu_op_raw).map_err(HeaderDecodeError::UnknownOp)?;

        Ok((
            TraceHeader {
                magic: RISU_MAGIC,
                pc,
                risu_op,
                size,
            },
            endian,
        ))
    }
}

fn write_u32(out: &mut Vec<u8>, v: u32, endian: Endian) {
    out.extend_from_slice(&match endian {
        Endian::Little => v.to_le_bytes(),
        Endian::Big => v.to_be_bytes(),
    });
}

fn write_i32(out: &mut Vec<u8>, v: i32, endian: Endian) {
    out.extend_from_slice(&match endian {
        Endian::Little => v.to_le_bytes(),
        Endian::Big => v.to_be_bytes(),
    });
}

fn write_uint(out: &mut Vec<u8>, v: u64, ptr_width: PtrWidth, endian: Endian) {
    match ptr_width {
        PtrWidth::Bits32 => write_u32(out, v as u32, endian),
        PtrWidth::Bits64 => out.extend_from_slice(&match endian {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        }),
    }
}

fn read_u32(bytes: &[u8], off: &mut usize, endian: Endian) -> u32 {
    let arr: [u8; 4] = bytes[*off..*off + 4].try_into().unwrap();
    *off += 4;
    match endian {
        Endian::Little => u32::from_le_bytes(arr),
        Endian::Big => u32::from_be_bytes(arr),
    }
}

fn read_i32(bytes: &[u8], off: &mut usize, endian: Endian) -> i32 {
    read_u32(bytes, off, endian) as i32
}

fn read_uint(bytes: &[u8], off: &mut usize, ptr_width: PtrWidth, endian: Endian) -> u64 {
    match ptr_width {
        PtrWidth::Bits32 => read_u32(bytes, off, endian) as u64,
        PtrWidth::Bits64 => {
            let arr: [u8; 8] = bytes[*off..*off + 8].try_into().unwrap();
            *off += 8;
            match endian {
                Endian::Little => u64::from_le_bytes(arr),
                Endian::Big => u64::from_be_bytes(arr),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_native_endian() {
        let h = TraceHeader::new(0x1000, RisuOp::Compare, 256);
        let mut buf = Vec::new();
        h.encode(Endian::host(), PtrWidth::Bits64, &mut buf);
        let (decoded, endian) = TraceHeader::decode(&buf, PtrWidth::Bits64).unwrap();
        assert_eq!(decoded, h);
        assert_eq!(endian, Endian::host());
    }

    #[test]
    fn detects_swapped_producer_endian() {
        let h = TraceHeader::new(0x2000, RisuOp::TestEnd, 0);
        let mut buf = Vec::new();
        h.encode(Endian::host().swapped(), PtrWidth::Bits64, &mut buf);
        let (decoded, endian) = TraceHeader::decode(&buf, PtrWidth::Bits64).unwrap();
        assert_eq!(decoded, h);
        assert_eq!(endian, Endian::host().swapped());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = vec![0u8; header_len(PtrWidth::Bits64)];
        buf[0..4].copy_from_slice(&0xdead_beefu32.to_le_bytes());
        let err = TraceHeader::decode(&buf, PtrWidth::Bits64).unwrap_err();
        assert!(matches!(err, HeaderDecodeError::BadMagic(0xdead_beef)));
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let buf = vec![0u8; 3];
        let err = TraceHeader::decode(&buf, PtrWidth::Bits64).unwrap_err();
        assert_eq!(
            err,
            HeaderDecodeError::Truncated {
                need: header_len(PtrWidth::Bits64),
                got: 3
            }
        );
    }

    #[test]
    fn bits32_pc_round_trips() {
        let h = TraceHeader::new(0xabcd_1234, RisuOp::SetMemblock, 0);
        let mut buf = Vec::new();
        h.encode(Endian::Little, PtrWidth::Bits32, &mut buf);
        assert_eq!(buf.len(), header_len(PtrWidth::Bits32));
        let (decoded, _) = TraceHeader::decode(&buf, PtrWidth::Bits32).unwrap();
        assert_eq!(decoded, h);
    }
}
