//! Version 1 of the sidecar session protocol.
//!
//! Every message on the wire is a JSON object tagged by `"type"`. Inbound
//! envelopes may carry `request_id` / `turn_id` correlation keys; outbound
//! envelopes carry the session id they belong to.

mod callback;
mod envelope;
mod hook_specific;
mod message;
mod permission_update;

pub use callback::*;
pub use envelope::*;
pub use hook_specific::*;
pub use message::*;
pub use permission_update::*;
