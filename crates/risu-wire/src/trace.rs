use crate::{Transport, WireError};
use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use std::io::{Read, Write};

/// Trace mode, write direction (the role recording a trace writes only;
/// spec.md §4.4: "the transport is unidirectional").
pub struct TraceWriter<W> {
    inner: W,
}

impl<W: Write> TraceWriter<W> {
    pub fn new(inner: W) -> Self {
        TraceWriter { inner }
    }
}

impl<W: Write> Transport for TraceWriter<W> {
    fn read_exact(&mut self, _buf: &mut [u8]) -> Result<(), WireError> {
        Err(WireError::UnsupportedDirection)
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), WireError> {
        self.inner.write_all(buf).map_err(WireError::Io)
    }

    fn send_response(&mut self, _code: u8) -> Result<(), WireError> {
        Ok(())
    }

    fn recv_response(&mut self) -> Result<u8, WireError> {
        Ok(0)
    }
}

pub struct TraceReader<R> {
    inner: R,
}

impl<R: Read> TraceReader<R> {
    pub fn new(inner: R) -> Self {
        TraceReader { inner }
    }
}

impl<R: Read> Transport for TraceReader<R> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), WireError> {
        self.inner.read_exact(buf).map_err(WireError::Io)
    }

    fn write_all(&mut self, _buf: &[u8]) -> Result<(), WireError> {
        Err(WireError::UnsupportedDirection)
    }

    fn send_response(&mut self, _code: u8) -> Result<(), WireError> {
        Ok(())
    }

    fn recv_response(&mut self) -> Result<u8, WireError> {
        Ok(0)
    }
}

/// lz4-compressed trace, write direction. Substitutes for the original's
/// `HAVE_ZLIB` / `gzFile` branch — this workspace follows the teacher's
/// choice of `lz4_flex` over zlib for the same "optional compressed
/// stream" role (`aero-snapshot`).
pub struct Lz4TraceWriter<W: Write> {
    inner: FrameEncoder<W>,
}

impl<W: Write> Lz4TraceWriter<W> {
    pub fn new(inner: W) -> Self {
        Lz4TraceWriter {
            inner: FrameEncoder::new(inner),
        }
    }

    /// Flushes and finalizes the lz4 frame. Must be called before the
    /// underlying writer is dropped for the trace file to be valid.
    pub fn finish(self) -> Result<W, WireError> {
        self.inner
            .finish()
            .map_err(|e| WireError::Io(std::io::Error::from(e)))
    }
}

impl<W: Write> Transport for Lz4TraceWriter<W> {
    fn read_exact(&mut self, _buf: &mut [u8]) -> Result<(), WireError> {
        Err(WireError::UnsupportedDirection)
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), WireError> {
        self.inner.write_all(buf).map_err(WireError::Io)
    }

    fn send_response(&mut self, _code: u8) -> Result<(), WireError> {
        Ok(())
    }

    fn recv_response(&mut self) -> Result<u8, WireError> {
        Ok(0)
    }
}

pub struct Lz4TraceReader<R: Read> {
    inner: FrameDecoder<R>,
}

impl<R: Read> Lz4TraceReader<R> {
    pub fn new(inner: R) -> Self {
        Lz4TraceReader {
            inner: FrameDecoder::new(inner),
        }
    }
}

impl<R: Read> Transport for Lz4TraceReader<R> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), WireError> {
        self.inner.read_exact(buf).map_err(WireError::Io)
    }

    fn write_all(&mut self, _buf: &[u8]) -> Result<(), WireError> {
        Err(WireError::UnsupportedDirection)
    }

    fn send_response(&mut self, _code: u8) -> Result<(), WireError> {
        Ok(())
    }

    fn recv_response(&mut self) -> Result<u8, WireError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{read_frame, write_frame};
    use risu_proto::{Endian, PtrWidth, RisuOp, TraceHeader};
    use std::io::Cursor;

    #[test]
    fn plain_trace_round_trips() {
        let header = TraceHeader::new(0x2000, RisuOp::TestEnd, 0);
        let mut buf = Vec::new();
        {
            let mut w = TraceWriter::new(&mut buf);
            write_frame(&mut w, &header, &[], Endian::Little, PtrWidth::Bits64).unwrap();
        }
        let mut r = TraceReader::new(Cursor::new(buf));
        let (decoded, payload, _) = read_frame(&mut r, PtrWidth::Bits64).unwrap();
        assert_eq!(decoded, header);
        assert!(payload.is_empty());
    }

    #[test]
    fn lz4_compressed_trace_round_trips() {
        let header = TraceHeader::new(0x3000, RisuOp::CompareMem, 4);
        let payload = vec![9, 8, 7, 6];
        let mut compressed = Vec::new();
        {
            let mut w = Lz4TraceWriter::new(&mut compressed);
            write_frame(&mut w, &header, &payload, Endian::Little, PtrWidth::Bits64).unwrap();
            w.finish().unwrap();
        }
        let mut r = Lz4TraceReader::new(Cursor::new(compressed));
        let (decoded, decoded_payload, _) = read_frame(&mut r, PtrWidth::Bits64).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded_payload, payload);
    }

    #[test]
    fn trace_writer_rejects_reads() {
        let mut buf = Vec::new();
        let mut w = TraceWriter::new(&mut buf);
        let mut scratch = [0u8; 4];
        assert!(matches!(
            w.read_exact(&mut scratch),
            Err(WireError::UnsupportedDirection)
        ));
    }
}
