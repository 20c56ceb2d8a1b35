//! Sidecar Client Library
//!
//! Client side of a sidecar session:
//! - Event multiplexing to global and request-scoped subscriptions
//! - Asynchronous callback dispatch for tools, hooks and permissions
//! - Turn aggregation and multi-turn collection
//! - Single-request streaming with partial-message mirroring
//! - NDJSON and in-memory transports

pub mod error;
pub mod handlers;
pub mod init;
pub mod input;
pub mod mux;
pub mod session;
pub mod stream;
pub mod transport;
pub mod turn;

pub use error::{SessionError, TransportError};
pub use handlers::{
    AskConfirm, ConfirmHandler, Confirmation, ConsoleConfirm, Handlers, HookHandler,
    InvocationContext, PermissionHandler, ToolHandler,
};
pub use mux::{Event, EventMultiplexer, Subscription, SubscriptionId};
pub use session::{Session, SessionConfig};
pub use stream::Stream;
pub use turn::{RunResult, Turn, TurnFeed};
