//! Error types for the engine and their close-code mapping.

use permessage_deflate::CompressionError;
use ws_frame::{FrameError, close_code};

/// Rejected server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("host must not be empty")]
    EmptyHost,

    #[error("port {0} outside 0-65535")]
    InvalidPort(i64),

    #[error("max_connections must be positive, got {0}")]
    InvalidMaxConnections(i64),

    #[error("ssl enabled but {0} is not set")]
    MissingTlsFile(&'static str),

    #[error("deflate window bits must be within 8-15 (server {server}, client {client})")]
    InvalidWindowBits { server: u8, client: u8 },

    #[error("backpressure_threshold {threshold} exceeds outbound_queue_size {queue}")]
    BackpressureAboveQueue { threshold: usize, queue: usize },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("failed to load config: {0}")]
    Load(#[source] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Load(Box::new(e))
    }
}

/// Failure to queue an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("outbound queue is over its backpressure threshold")]
    Backpressure,

    #[error("connection closed")]
    Closed,

    #[error("connection has no outbound transport")]
    Detached,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("connection limit of {max} reached")]
    Capacity { max: usize },

    #[error("unknown connection {0}")]
    UnknownConnection(String),

    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    #[error("compression error: {0}")]
    Compression(#[from] CompressionError),

    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    #[error("text message is not valid UTF-8")]
    InvalidUtf8,

    #[error(transparent)]
    Send(#[from] SendError),

    #[error("handler failed: {0}")]
    Handler(#[source] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Close code to send the peer when this error ends a session.
    pub fn close_code(&self) -> u16 {
        match self {
            Self::Frame(FrameError::PayloadTooLarge { .. } | FrameError::MessageTooLarge { .. }) => {
                close_code::MESSAGE_TOO_BIG
            }
            Self::Frame(_) | Self::Protocol(_) => close_code::PROTOCOL_ERROR,
            Self::Compression(CompressionError::MessageTooLarge { .. }) => close_code::MESSAGE_TOO_BIG,
            Self::Compression(_) | Self::InvalidUtf8 => close_code::INVALID_PAYLOAD,
            Self::Capacity { .. } => close_code::TRY_AGAIN_LATER,
            Self::Config(_)
            | Self::UnknownConnection(_)
            | Self::Send(_)
            | Self::Handler(_)
            | Self::Io(_) => close_code::INTERNAL_ERROR,
        }
    }

    /// True for failures caused by what the peer sent.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::Frame(_) | Self::Compression(_) | Self::Protocol(_) | Self::InvalidUtf8
        )
    }
}
