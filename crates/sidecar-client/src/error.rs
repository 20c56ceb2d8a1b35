//! Client error types.

/// Failure of the envelope transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] sidecar_core::Error),

    #[error("Transport closed")]
    Closed,
}

/// Errors returned by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Session closed: {session_id}")]
    Closed { session_id: String },

    #[error("Stream for request {request_id} ended before its turn completed")]
    StreamEndedEarly { request_id: String },

    #[error("Stream cancelled")]
    Cancelled,

    #[error("Invalid input event: {0}")]
    Input(String),
}

impl SessionError {
    /// Whether the session can no longer send anything.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Closed { .. })
    }
}

