//! Streaming a single request's turn.
//!
//! A materializer task folds the request's events into one [`Turn`],
//! mirrors partial messages to the caller as they arrive, and reports the
//! outcome exactly once.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use sidecar_proto::{MessageEvent, ServerEvent};

use crate::error::SessionError;
use crate::mux::{EventMultiplexer, Subscription};
use crate::turn::{RunResult, Turn};

type Outcome = Result<RunResult, SessionError>;

/// Live view of one request's turn.
///
/// Dropping the stream cancels its materializer.
#[derive(Debug)]
pub struct Stream {
    request_id: String,
    partials: Option<mpsc::Receiver<MessageEvent>>,
    outcome: Option<oneshot::Receiver<Outcome>>,
    cancel: CancellationToken,
}

impl Stream {
    pub(crate) fn spawn(
        request_id: String,
        subscription: Subscription,
        mux: Arc<EventMultiplexer>,
        partial_buffer: usize,
        cancel: CancellationToken,
    ) -> Self {
        let (partial_tx, partial_rx) = mpsc::channel(partial_buffer.max(1));
        let (outcome_tx, outcome_rx) = oneshot::channel();

        tokio::spawn(materialize(
            request_id.clone(),
            subscription,
            mux,
            partial_tx,
            outcome_tx,
            cancel.clone(),
        ));

        Self {
            request_id,
            partials: Some(partial_rx),
            outcome: Some(outcome_rx),
            cancel,
        }
    }

    /// Request this stream follows.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Next partial message, in arrival order. `None` once the turn is
    /// done or the partials were taken.
    pub async fn next_partial(&mut self) -> Option<MessageEvent> {
        self.partials.as_mut()?.recv().await
    }

    /// Take the partial-message receiver to consume it elsewhere.
    pub fn take_partials(&mut self) -> Option<mpsc::Receiver<MessageEvent>> {
        self.partials.take()
    }

    /// Stop materializing. A pending [`Stream::result`] reports
    /// [`SessionError::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that stops the materializer when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the turn to complete.
    ///
    /// Partial messages not yet consumed are discarded; the materializer
    /// stops mirroring once nobody reads them.
    pub async fn result(mut self) -> Result<RunResult, SessionError> {
        self.partials = None;
        let Some(outcome) = self.outcome.take() else {
            return Err(SessionError::Cancelled);
        };
        outcome.await.unwrap_or(Err(SessionError::Cancelled))
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn materialize(
    request_id: String,
    mut subscription: Subscription,
    mux: Arc<EventMultiplexer>,
    partials: mpsc::Sender<MessageEvent>,
    outcome: oneshot::Sender<Outcome>,
    cancel: CancellationToken,
) {
    let folded = fold_turn(&request_id, &mut subscription, partials, &cancel).await;
    mux.unsubscribe_request(&request_id, subscription.id());

    match folded {
        Some(Ok(turn)) => {
            debug!(request_id, turn_id = %turn.turn_id, "Stream turn complete");
            let _ = outcome.send(Ok(RunResult::new(turn)));
        }
        Some(Err(e)) => {
            debug!(request_id, error = %e, "Stream ended without a result");
            let _ = outcome.send(Err(e));
        }
        None => debug!(request_id, "Stream cancelled"),
    }
}

/// Fold events until the turn ends. `None` means cancelled.
async fn fold_turn(
    request_id: &str,
    subscription: &mut Subscription,
    partials: mpsc::Sender<MessageEvent>,
    cancel: &CancellationToken,
) -> Option<Result<Turn, SessionError>> {
    let mut partials = Some(partials);
    let mut turn: Option<Turn> = None;

    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            event = subscription.recv() => event,
        };
        let Some(event) = event else {
            return Some(Err(SessionError::StreamEndedEarly {
                request_id: request_id.to_string(),
            }));
        };

        if turn.is_none() {
            let Some(turn_id) = event.turn_id() else {
                continue;
            };
            turn = Some(Turn::new(turn_id));
        }

        if let ServerEvent::Message(message) = &event.event
            && message.is_partial
            && let Some(tx) = &partials
        {
            let sent = tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                sent = tx.send(message.clone()) => sent,
            };
            if sent.is_err() {
                partials = None;
            }
        }

        if let Some(current) = turn.as_mut()
            && current.apply(event)
        {
            return turn.take().map(Ok);
        }
    }
}
