//! In-process transport, used to drive a session without a real service.

use async_trait::async_trait;
use tokio::sync::mpsc;

use sidecar_proto::{ClientEnvelope, ServerEnvelope};

use super::{EnvelopeSink, EnvelopeSource};
use crate::error::TransportError;

#[derive(Debug)]
pub struct MemorySink {
    tx: mpsc::UnboundedSender<ClientEnvelope>,
}

#[derive(Debug)]
pub struct MemorySource {
    rx: mpsc::Receiver<ServerEnvelope>,
}

/// The service side of an in-memory transport.
#[derive(Debug)]
pub struct RemoteEnd {
    inbound: Option<mpsc::Sender<ServerEnvelope>>,
    outbound: mpsc::UnboundedReceiver<ClientEnvelope>,
}

/// Create a connected sink/source pair and the remote end driving it.
pub fn pair(buffer: usize) -> (MemorySink, MemorySource, RemoteEnd) {
    let (in_tx, in_rx) = mpsc::channel(buffer.max(1));
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    (
        MemorySink { tx: out_tx },
        MemorySource { rx: in_rx },
        RemoteEnd {
            inbound: Some(in_tx),
            outbound: out_rx,
        },
    )
}

impl RemoteEnd {
    /// Deliver an envelope to the client.
    pub async fn push(&self, envelope: ServerEnvelope) -> Result<(), TransportError> {
        let tx = self.inbound.as_ref().ok_or(TransportError::Closed)?;
        tx.send(envelope).await.map_err(|_| TransportError::Closed)
    }

    /// End the inbound stream; the client observes end-of-stream.
    pub fn close_inbound(&mut self) {
        self.inbound = None;
    }

    /// Refuse further client writes; the client's sends fail.
    pub fn close_outbound(&mut self) {
        self.outbound.close();
    }

    /// Next envelope written by the client.
    pub async fn next_outbound(&mut self) -> Option<ClientEnvelope> {
        self.outbound.recv().await
    }

    /// Next envelope written by the client, if one is already queued.
    pub fn try_next_outbound(&mut self) -> Option<ClientEnvelope> {
        self.outbound.try_recv().ok()
    }
}

#[async_trait]
impl EnvelopeSink for MemorySink {
    async fn send(&mut self, envelope: &ClientEnvelope) -> Result<(), TransportError> {
        self.tx
            .send(envelope.clone())
            .map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl EnvelopeSource for MemorySource {
    async fn recv(&mut self) -> Result<Option<ServerEnvelope>, TransportError> {
        Ok(self.rx.recv().await)
    }
}
