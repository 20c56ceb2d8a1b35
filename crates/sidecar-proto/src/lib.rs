//! Sidecar Protocol Types
//!
//! Wire types exchanged over a sidecar session stream.
//!
//! This crate contains:
//! - Outbound `ClientEnvelope` / `ClientEvent` (hello, queries, control, callback responses)
//! - Inbound `ServerEnvelope` / `ServerEvent` (messages, turn boundaries, callbacks)
//! - Message, content block and callback payload types
//! - Canonical constructors for tool results, hook outputs and permission decisions

#![allow(clippy::derive_partial_eq_without_eq)]

/// Sidecar v1 protocol definitions.
pub mod v1;

// Re-export v1 as the default protocol version for convenience
pub use v1::*;
