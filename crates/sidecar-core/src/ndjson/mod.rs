//! NDJSON codec for sidecar session envelopes.
//!
//! One JSON object per line. Readers skip blank lines; anything else that
//! fails to parse is an error.

mod codec;

pub use codec::{encode_client_line, encode_server_line, parse_client_line, parse_server_line};
