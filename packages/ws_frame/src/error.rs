/// Errors raised while encoding, decoding or reassembling frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    #[error("reserved bits set without a negotiated extension: {0:#04b}")]
    ReservedBits(u8),

    #[error("control frame payload too large: {0} bytes (max 125)")]
    ControlPayloadTooLarge(usize),

    #[error("control frames must not be fragmented")]
    FragmentedControl,

    #[error("invalid 64-bit payload length (most significant bit set)")]
    InvalidLength,

    #[error("payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: u64, max: usize },

    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),

    #[error("continuation frame without a message in progress")]
    UnexpectedContinuation,

    #[error("new data frame while a fragmented message is in progress")]
    InterleavedDataFrame,

    #[error("message too large: {len} bytes (max {max})")]
    MessageTooLarge { len: usize, max: usize },
}
