//! Closable unbounded FIFO with a single consumer.
//!
//! Producers never block. Closing wakes the consumer, which still drains
//! everything pushed before the close and then observes end-of-queue.

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Producer side of an event queue. Shared by reference between producers.
#[derive(Debug)]
pub struct EventQueue<T> {
    tx: Mutex<Option<mpsc::UnboundedSender<T>>>,
}

/// Consumer side of an event queue.
#[derive(Debug)]
pub struct QueueReceiver<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

/// Create a new open queue.
pub fn event_queue<T>() -> (EventQueue<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        EventQueue {
            tx: Mutex::new(Some(tx)),
        },
        QueueReceiver { rx },
    )
}

impl<T> EventQueue<T> {
    /// Append an item. Returns `false` if the queue is closed or its
    /// consumer is gone.
    pub fn push(&self, item: T) -> bool {
        self.tx
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(item).is_ok())
    }

    /// Close the queue. Idempotent.
    pub fn close(&self) {
        drop(self.tx.lock().take());
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.tx.lock().as_ref().is_none_or(mpsc::UnboundedSender::is_closed)
    }
}

impl<T> QueueReceiver<T> {
    /// Wait for the next item.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn pop(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}
