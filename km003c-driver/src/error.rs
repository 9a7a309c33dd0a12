use crate::packet::MessageHeader;
use crate::transport::TransportError;
use thiserror::Error;

/// The primary error type for the `km003c-driver` library.
#[derive(Error, Debug)]
pub enum KMError {
    #[error("Malformed frame: header must be exactly {expected} bytes, got {actual}")]
    MalformedFrame { expected: usize, actual: usize },

    #[error("Truncated record: expected at least {expected} bytes, got {actual}")]
    TruncatedRecord { expected: usize, actual: usize },

    #[error("Truncated frame at offset {offset}: chunk needs {needed} bytes, only {available} available")]
    TruncatedFrame {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Command rejected by device: {0}")]
    CommandRejected(MessageHeader),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(MessageHeader),

    #[error("Session is not connected")]
    NotConnected,

    #[error(transparent)]
    Transport(#[from] TransportError),
}
