//! Channel transport error types.

use thiserror::Error;

/// Channel error type.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("protocol error: {0}")]
    Protocol(#[from] hrdesk_protocol::ProtocolError),

    #[error("timeout error: {0}")]
    Timeout(String),

    #[error("not connected")]
    NotConnected,

    #[error("already connected")]
    AlreadyConnected,

    #[error("frame error: {0}")]
    Frame(String),
}

/// Channel result type.
pub type Result<T> = std::result::Result<T, ChannelError>;
