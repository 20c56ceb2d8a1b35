//! Groups a subscription's events by turn id and emits completed turns.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::turn::Turn;
use crate::mux::Subscription;

/// Receiving end of a turn collector.
///
/// Dropping it cancels the collector.
#[derive(Debug)]
pub struct TurnFeed {
    rx: mpsc::Receiver<Turn>,
    cancel: CancellationToken,
}

impl TurnFeed {
    /// Next turn. Ended turns arrive as their turn-end is seen; turns still
    /// open when the source ends are flushed afterwards.
    pub async fn recv(&mut self) -> Option<Turn> {
        self.rx.recv().await
    }

    /// Stop collecting. Open turns are flushed without waiting for room.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for TurnFeed {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawn a collector over `subscription`.
///
/// Events without a turn id are ignored. A turn is emitted when its
/// turn-end is folded. When the subscription ends, every still-open turn
/// is emitted; on cancellation they are emitted best-effort.
pub fn collect_turns(
    subscription: Subscription,
    buffer: usize,
    cancel: CancellationToken,
) -> TurnFeed {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    tokio::spawn(run_collector(subscription, tx, cancel.clone()));
    TurnFeed { rx, cancel }
}

async fn run_collector(
    mut subscription: Subscription,
    out: mpsc::Sender<Turn>,
    cancel: CancellationToken,
) {
    let mut open: HashMap<String, Turn> = HashMap::new();

    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                flush_now(&out, open);
                return;
            }
            event = subscription.recv() => event,
        };

        let Some(event) = event else {
            debug!(open = open.len(), "Turn source ended, flushing open turns");
            flush(&out, open).await;
            return;
        };

        let Some(turn_id) = event.turn_id().map(str::to_owned) else {
            continue;
        };
        let turn = open
            .entry(turn_id.clone())
            .or_insert_with(|| Turn::new(turn_id.as_str()));
        if !turn.apply(event) {
            continue;
        }

        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                flush_now(&out, open);
                return;
            }
            permit = out.reserve() => permit,
        };
        let Ok(permit) = permit else {
            debug!("Turn consumer gone, stopping collector");
            return;
        };
        if let Some(turn) = open.remove(&turn_id) {
            permit.send(turn);
        }
    }
}

async fn flush(out: &mpsc::Sender<Turn>, open: HashMap<String, Turn>) {
    for turn in open.into_values() {
        if out.send(turn).await.is_err() {
            return;
        }
    }
}

fn flush_now(out: &mpsc::Sender<Turn>, open: HashMap<String, Turn>) {
    for turn in open.into_values() {
        if out.try_send(turn).is_err() {
            return;
        }
    }
}
