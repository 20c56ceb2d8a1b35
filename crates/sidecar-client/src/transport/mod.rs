//! Envelope transports.
//!
//! A session writes through an [`EnvelopeSink`] and reads through an
//! [`EnvelopeSource`]. The session serializes writes, so a sink never sees
//! concurrent calls.

mod memory;
mod ndjson;

use async_trait::async_trait;
use sidecar_proto::{ClientEnvelope, ServerEnvelope};

use crate::error::TransportError;

pub use memory::{MemorySink, MemorySource, RemoteEnd, pair};
pub use ndjson::{NdjsonSink, NdjsonSource, ndjson};

/// Outbound half of a transport.
#[async_trait]
pub trait EnvelopeSink: Send + 'static {
    /// Write one envelope.
    async fn send(&mut self, envelope: &ClientEnvelope) -> Result<(), TransportError>;

    /// Flush and release the outbound side.
    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Inbound half of a transport.
#[async_trait]
pub trait EnvelopeSource: Send + 'static {
    /// Next inbound envelope, or `None` at end of stream.
    async fn recv(&mut self) -> Result<Option<ServerEnvelope>, TransportError>;
}
