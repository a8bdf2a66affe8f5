use thiserror::Error;

/// Error type for the composition layer. Each subsystem keeps its own error
/// enum; this wraps them for callers that drive the whole client.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Channel(#[from] hrdesk_channel::ChannelError),
    #[error(transparent)]
    Api(#[from] hrdesk_api_client::ApiError),
    #[error(transparent)]
    Protocol(#[from] hrdesk_protocol::ProtocolError),
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
