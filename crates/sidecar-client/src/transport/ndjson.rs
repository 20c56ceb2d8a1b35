//! Newline-delimited JSON over any async byte stream.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{trace, warn};

use sidecar_core::ndjson::{encode_client_line, parse_server_line};
use sidecar_proto::{ClientEnvelope, ServerEnvelope};

use super::{EnvelopeSink, EnvelopeSource};
use crate::error::TransportError;

/// Writes one JSON envelope per line.
#[derive(Debug)]
pub struct NdjsonSink<W> {
    writer: W,
}

/// Reads one JSON envelope per line.
///
/// Blank lines are skipped. Lines that are not UTF-8 or fail to decode are
/// logged and skipped; only I/O failures end the stream with an error.
#[derive(Debug)]
pub struct NdjsonSource<R> {
    reader: BufReader<R>,
    line: Vec<u8>,
    skipped: u64,
}

/// Build both halves of an NDJSON transport.
pub fn ndjson<R, W>(reader: R, writer: W) -> (NdjsonSink<W>, NdjsonSource<R>)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    (
        NdjsonSink { writer },
        NdjsonSource {
            reader: BufReader::new(reader),
            line: Vec::new(),
            skipped: 0,
        },
    )
}

impl<R> NdjsonSource<R> {
    /// Number of undecodable lines skipped so far.
    pub const fn skipped(&self) -> u64 {
        self.skipped
    }
}

#[async_trait]
impl<W> EnvelopeSink for NdjsonSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, envelope: &ClientEnvelope) -> Result<(), TransportError> {
        let line = encode_client_line(envelope)?;
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        trace!(event = envelope.event.name(), "Envelope written");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl<R> EnvelopeSource for NdjsonSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn recv(&mut self) -> Result<Option<ServerEnvelope>, TransportError> {
        loop {
            self.line.clear();
            if self.reader.read_until(b'\n', &mut self.line).await? == 0 {
                return Ok(None);
            }
            let line = match std::str::from_utf8(&self.line) {
                Ok(line) => line,
                Err(e) => {
                    self.skipped += 1;
                    warn!(error = %e, bytes = self.line.len(), "Skipping non-UTF-8 line");
                    continue;
                }
            };
            match parse_server_line(line.trim_end_matches(['\n', '\r'])) {
                Ok(Some(envelope)) => return Ok(Some(envelope)),
                Ok(None) => {}
                Err(e) => {
                    self.skipped += 1;
                    warn!(error = %e, "Skipping undecodable line");
                }
            }
        }
    }
}
