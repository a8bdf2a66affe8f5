//! Protocol error types.

use thiserror::Error;

/// Protocol error type.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid channel name: {0}")]
    InvalidChannel(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Protocol result type.
pub type Result<T> = std::result::Result<T, ProtocolError>;
