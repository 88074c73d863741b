//! Framed I/O over whatever byte stream the two roles are using: a TCP
//! socket in the normal case, or a (optionally lz4-compressed) file in
//! trace mode. Nothing in this crate knows about reginfo or checkpoint
//! semantics — it only moves `TraceHeader` + payload frames and the
//! one-byte response protocol (spec.md §4.4).

mod tcp;
mod trace;

pub use tcp::TcpTransport;
pub use trace::{Lz4TraceReader, Lz4TraceWriter, TraceReader, TraceWriter};

use risu_proto::{header_len, Endian, HeaderDecodeError, PtrWidth, TraceHeader};

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport does not support this direction")]
    UnsupportedDirection,
    #[error(transparent)]
    Header(#[from] HeaderDecodeError),
}

/// A byte stream carrying framed RISU traffic plus the response-byte
/// side channel. `TcpTransport` implements all four methods for real;
/// the trace-mode transports implement only the direction they're opened
/// for and no-op the response methods (spec.md §4.4: "In trace mode,
/// response bytes are suppressed because the transport is unidirectional").
pub trait Transport {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), WireError>;
    fn write_all(&mut self, buf: &[u8]) -> Result<(), WireError>;
    fn send_response(&mut self, code: u8) -> Result<(), WireError>;
    fn recv_response(&mut self) -> Result<u8, WireError>;
}

/// Writes a header followed by `payload`, both in `endian` byte order
/// (spec.md §4.2 step 5: "byte-swap header to architecture order and
/// write it").
pub fn write_frame(
    transport: &mut dyn Transport,
    header: &TraceHeader,
    payload: &[u8],
    endian: Endian,
    ptr_width: PtrWidth,
) -> Result<(), WireError> {
    let mut buf = Vec::with_capacity(header_len(ptr_width) + payload.len());
    header.encode(endian, ptr_width, &mut buf);
    buf.extend_from_slice(payload);
    transport.write_all(&buf)
}

/// Reads a header (detecting endian from the magic) and then exactly
/// `header.size` bytes of payload (spec.md §4.3 step 3). Does not perform
/// any of §4.3's size validation against reginfo capacity — that needs
/// the RisuOp-specific knowledge `risu-driver` owns.
pub fn read_frame(
    transport: &mut dyn Transport,
    ptr_width: PtrWidth,
) -> Result<(TraceHeader, Vec<u8>, Endian), WireError> {
    let mut header_bytes = vec![0u8; header_len(ptr_width)];
    transport.read_exact(&mut header_bytes)?;
    let (header, endian) = TraceHeader::decode(&header_bytes, ptr_width)?;
    let mut payload = vec![0u8; header.size as usize];
    if header.size > 0 {
        transport.read_exact(&mut payload)?;
    }
    Ok((header, payload, endian))
}
