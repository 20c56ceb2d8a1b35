//! Subscriptions: a private event queue pumped into a bounded channel.
//!
//! The multiplexer only ever pushes into the queue, so a slow consumer
//! backs up its own queue and never stalls publishing.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::trace;

use super::queue::{EventQueue, QueueReceiver, event_queue};
use super::Event;

/// Identifier of a subscription within one multiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Consumer end of a subscription.
///
/// Yields events in publication order. Ends after the subscription is
/// closed and every already-enqueued event has been delivered. Dropping it
/// closes the subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    request_id: Option<String>,
    rx: mpsc::Receiver<Event>,
    queue: Arc<EventQueue<Event>>,
}

/// Multiplexer-side handle used to enqueue into and close a subscription.
#[derive(Debug, Clone)]
pub(crate) struct SubscriptionHandle {
    id: SubscriptionId,
    queue: Arc<EventQueue<Event>>,
}

impl SubscriptionHandle {
    pub(crate) const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Non-blocking enqueue. `false` means the consumer is gone.
    pub(crate) fn enqueue(&self, event: &Event) -> bool {
        self.queue.push(Arc::clone(event))
    }

    pub(crate) fn close(&self) {
        self.queue.close();
    }
}

impl Subscription {
    /// Open a subscription and start its pump. Must be called inside a
    /// tokio runtime.
    pub(crate) fn open(
        id: SubscriptionId,
        request_id: Option<String>,
        buffer: usize,
    ) -> (Self, SubscriptionHandle) {
        let (queue, queue_rx) = event_queue();
        let queue = Arc::new(queue);
        let (tx, rx) = mpsc::channel(buffer.max(1));

        tokio::spawn(pump(id, queue_rx, tx));

        let handle = SubscriptionHandle {
            id,
            queue: Arc::clone(&queue),
        };
        let subscription = Self {
            id,
            request_id,
            rx,
            queue,
        };
        (subscription, handle)
    }

    /// Open a subscription that is already closed and delivers nothing.
    pub(crate) fn closed(id: SubscriptionId, request_id: Option<String>) -> Self {
        let (subscription, handle) = Self::open(id, request_id, 1);
        handle.close();
        subscription
    }

    /// Registry id of this subscription.
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Request id for request-scoped subscriptions, `None` for global ones.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Receive the next event, or `None` once the subscription has ended.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Close the subscription. Events already enqueued are still delivered.
    pub fn close(&self) {
        self.queue.close();
    }
}

impl Stream for Subscription {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.queue.close();
    }
}

/// Move events from the queue into the bounded output channel.
///
/// Stops when the queue ends or the consumer drops its receiver.
async fn pump(id: SubscriptionId, mut queue: QueueReceiver<Event>, out: mpsc::Sender<Event>) {
    while let Some(event) = queue.pop().await {
        if out.send(event).await.is_err() {
            trace!(subscription = %id, "Subscription consumer gone, stopping pump");
            return;
        }
    }
    trace!(subscription = %id, "Subscription queue drained");
}
