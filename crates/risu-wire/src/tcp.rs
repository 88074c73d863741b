use crate::{Transport, WireError};
use std::io::{Read, Write};
use std::net::TcpStream;

/// The normal (non-trace) transport: a connected TCP socket, grounded on
/// `original_source/risu.c`'s `recv_data_pkt`/`send_data_pkt`/
/// `send_response_byte`. Connection setup (`master_connect`/
/// `apprentice_connect`) lives in `risu-cli`, not here (spec.md §1, "TCP
/// socket accept/connect helpers" are an external collaborator).
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        TcpTransport { stream }
    }
}

impl Transport for TcpTransport {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), WireError> {
        self.stream.read_exact(buf).map_err(WireError::Io)
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), WireError> {
        self.stream.write_all(buf).map_err(WireError::Io)
    }

    fn send_response(&mut self, code: u8) -> Result<(), WireError> {
        self.stream.write_all(&[code]).map_err(WireError::Io)
    }

    fn recv_response(&mut self) -> Result<u8, WireError> {
        let mut b = [0u8; 1];
        self.stream.read_exact(&mut b).map_err(WireError::Io)?;
        Ok(b[0])
    }
}
