//! Inbound event fan-out.

mod multiplexer;
mod queue;
mod subscription;

use std::sync::Arc;

use sidecar_proto::ServerEnvelope;

pub use multiplexer::{DEFAULT_ENDED_CAPACITY, EventMultiplexer, MultiplexerStats};
pub use queue::{EventQueue, QueueReceiver, event_queue};
pub use subscription::{Subscription, SubscriptionId};

/// Inbound event as shared between subscribers.
pub type Event = Arc<ServerEnvelope>;
