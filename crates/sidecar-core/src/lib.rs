//! Sidecar Core Library
//!
//! Shared functionality for sidecar clients:
//! - NDJSON codec for session envelopes
//! - Configuration resolution and hierarchy
//! - Tracing initialisation
//! - Id minting
//! - Common error types

pub mod config;
pub mod error;
pub mod ids;
pub mod ndjson;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
