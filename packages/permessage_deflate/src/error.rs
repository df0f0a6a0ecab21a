/// Failure while compressing or inflating a message.
#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    #[error("deflate failed: {0}")]
    Deflate(#[from] flate2::CompressError),

    #[error("inflate failed: {0}")]
    Inflate(#[from] flate2::DecompressError),

    #[error("inflated message exceeds {limit} bytes")]
    MessageTooLarge { limit: usize },

    #[error("inflate made no progress (truncated or corrupt input)")]
    Stalled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Why an extension offer could not be accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NegotiationError {
    #[error("malformed extension offer: {0}")]
    Malformed(String),

    #[error("unknown permessage-deflate parameter: {0}")]
    UnknownParameter(String),

    #[error("duplicate permessage-deflate parameter: {0}")]
    DuplicateParameter(String),

    #[error("invalid value for {param}: {value:?}")]
    InvalidValue { param: String, value: String },
}
