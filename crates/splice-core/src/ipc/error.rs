//! # Splice Core Channel Errors
//!
//! Failures of the controller/worker and client/daemon transports. Cancellation
//! is reported here too: a retry loop interrupted by the banished flag returns
//! [`ChannelError::Cancelled`].
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode or decode message: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Channel closed by peer")]
    Closed,

    #[error("Frame of {len} bytes exceeds the limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Channel {operation} cancelled: owner was banished")]
    Cancelled { operation: String },

    #[error("Unexpected message: expected {expected}, got {actual}")]
    UnexpectedMessage { expected: String, actual: String },
}

impl ChannelError {
    pub fn cancelled(operation: impl Into<String>) -> Self {
        ChannelError::Cancelled {
            operation: operation.into(),
        }
    }
}
