use crate::error::FrameError;

/// Maximum payload carried by a control frame (RFC 6455 §5.5).
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Status codes carried in close frames (RFC 6455 §7.4.1).
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const UNSUPPORTED_DATA: u16 = 1003;
    pub const INVALID_PAYLOAD: u16 = 1007;
    pub const POLICY_VIOLATION: u16 = 1008;
    pub const MESSAGE_TOO_BIG: u16 = 1009;
    pub const INTERNAL_ERROR: u16 = 1011;
    pub const TRY_AGAIN_LATER: u16 = 1013;

    /// Whether `code` may appear on the wire. 1005, 1006 and 1015 are
    /// reserved for local use, 1016-2999 are unassigned.
    pub fn is_valid(code: u16) -> bool {
        matches!(code, 1000..=1003 | 1007..=1014 | 3000..=4999)
    }
}

/// 4-bit frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    /// Parse the low nibble of the first header byte. Reserved opcodes are rejected.
    pub fn from_u8(value: u8) -> Result<Self, FrameError> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(FrameError::InvalidOpcode(other)),
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Close, ping and pong. Every opcode with the high bit of the nibble set.
    pub const fn is_control(self) -> bool {
        (self as u8) & 0x8 != 0
    }

    pub const fn is_data(self) -> bool {
        !self.is_control()
    }
}

/// One RFC 6455 frame.
///
/// `mask` is present iff the frame is masked. `payload` always holds the
/// unmasked bytes; masking only happens on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    /// Per-message compression marker (permessage-deflate).
    pub rsv1: bool,
    pub opcode: Opcode,
    pub mask: Option<[u8; 4]>,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(opcode: Opcode, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            rsv1: false,
            opcode,
            mask: None,
            payload: payload.into(),
        }
    }

    pub fn text(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Opcode::Text, payload)
    }

    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Opcode::Binary, payload)
    }

    pub fn continuation(payload: impl Into<Vec<u8>>, fin: bool) -> Self {
        Self::new(Opcode::Continuation, payload).with_fin(fin)
    }

    pub fn ping(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Opcode::Ping, payload)
    }

    pub fn pong(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Opcode::Pong, payload)
    }

    /// Close frame with a status code and a reason trimmed to fit the control payload limit.
    pub fn close(code: u16, reason: &str) -> Self {
        let mut end = reason.len().min(MAX_CONTROL_PAYLOAD - 2);
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        let mut payload = Vec::with_capacity(2 + end);
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(&reason.as_bytes()[..end]);
        Self::new(Opcode::Close, payload)
    }

    pub fn with_fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }

    pub fn with_rsv1(mut self, rsv1: bool) -> Self {
        self.rsv1 = rsv1;
        self
    }

    pub fn with_mask(mut self, key: [u8; 4]) -> Self {
        self.mask = Some(key);
        self
    }

    /// Mask with a fresh random key, as a client must for every frame it sends.
    pub fn with_random_mask(self) -> Self {
        self.with_mask(rand::random())
    }

    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    pub fn is_control(&self) -> bool {
        self.opcode.is_control()
    }

    /// Status code of a close frame, if one was sent.
    pub fn close_code(&self) -> Option<u16> {
        if self.opcode != Opcode::Close || self.payload.len() < 2 {
            return None;
        }
        Some(u16::from_be_bytes([self.payload[0], self.payload[1]]))
    }

    pub fn close_reason(&self) -> Option<&str> {
        if self.opcode != Opcode::Close || self.payload.len() < 2 {
            return None;
        }
        std::str::from_utf8(&self.payload[2..]).ok()
    }

    /// Check the control-frame constraints of RFC 6455 §5.5.
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.is_control() {
            if self.payload.len() > MAX_CONTROL_PAYLOAD {
                return Err(FrameError::ControlPayloadTooLarge(self.payload.len()));
            }
            if !self.fin {
                return Err(FrameError::FragmentedControl);
            }
        }
        Ok(())
    }

    /// Number of bytes this frame occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        let len = self.payload.len();
        let extended = if len < 126 {
            0
        } else if len <= u16::MAX as usize {
            2
        } else {
            8
        };
        let mask = if self.mask.is_some() { 4 } else { 0 };
        2 + extended + mask + len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_code_wire_validity() {
        for code in [1000, 1001, 1002, 1003, 1007, 1011, 1013, 1014, 3000, 4999] {
            assert!(close_code::is_valid(code), "{code}");
        }
        for code in [0, 999, 1004, 1005, 1006, 1015, 1016, 2999, 5000] {
            assert!(!close_code::is_valid(code), "{code}");
        }
    }

    #[test]
    fn control_classification_follows_high_bit() {
        assert!(Opcode::Close.is_control());
        assert!(Opcode::Ping.is_control());
        assert!(Opcode::Pong.is_control());
        assert!(!Opcode::Text.is_control());
        assert!(!Opcode::Binary.is_control());
        assert!(!Opcode::Continuation.is_control());
    }

    #[test]
    fn reserved_opcodes_rejected() {
        for op in [0x3, 0x7, 0xB, 0xF] {
            assert_eq!(Opcode::from_u8(op), Err(FrameError::InvalidOpcode(op)));
        }
    }

    #[test]
    fn close_frame_carries_code_and_reason() {
        let frame = Frame::close(close_code::GOING_AWAY, "shutting down");
        assert_eq!(frame.close_code(), Some(1001));
        assert_eq!(frame.close_reason(), Some("shutting down"));
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn close_reason_truncated_on_char_boundary() {
        // 'é' is two bytes; 70 of them overflow the 123-byte reason budget.
        let reason = "é".repeat(70);
        let frame = Frame::close(close_code::NORMAL, &reason);
        assert!(frame.payload.len() <= MAX_CONTROL_PAYLOAD);
        assert!(frame.close_reason().is_some());
    }

    #[test]
    fn oversized_control_frame_invalid() {
        let frame = Frame::ping(vec![0u8; 126]);
        assert_eq!(frame.validate(), Err(FrameError::ControlPayloadTooLarge(126)));
    }

    #[test]
    fn fragmented_control_frame_invalid() {
        let frame = Frame::pong(b"x".to_vec()).with_fin(false);
        assert_eq!(frame.validate(), Err(FrameError::FragmentedControl));
    }

    #[test]
    fn encoded_len_matches_length_forms() {
        assert_eq!(Frame::text(vec![0; 125]).encoded_len(), 127);
        assert_eq!(Frame::text(vec![0; 126]).encoded_len(), 2 + 2 + 126);
        assert_eq!(Frame::text(vec![0; 65536]).encoded_len(), 2 + 8 + 65536);
        assert_eq!(Frame::text("hi").with_mask([1, 2, 3, 4]).encoded_len(), 8);
    }
}
