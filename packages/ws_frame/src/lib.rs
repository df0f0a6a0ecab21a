//! WebSocket frame codec (RFC 6455)
//!
//! Pure byte-level framing with no I/O. The codec is direction-agnostic: callers
//! decide whether a frame is masked (client → server) or not (server → client).
//!
//! Wire layout:
//!
//! ```text
//! byte 0: FIN(1) RSV1(1) RSV2(1) RSV3(1) OPCODE(4)
//! byte 1: MASK(1) LEN(7)
//!         LEN == 126 → u16 big-endian length follows
//!         LEN == 127 → u64 big-endian length follows
//! [4-byte mask key if MASK]
//! payload (XORed with mask[i % 4] if MASK)
//! ```
//!
//! # Example
//!
//! ```
//! use ws_frame::{Frame, decode, encode};
//!
//! let bytes = encode(&Frame::text("hi")).unwrap();
//! assert_eq!(bytes, [0x81, 0x02, b'h', b'i']);
//! assert_eq!(decode(&bytes).unwrap(), Frame::text("hi"));
//! ```

mod codec;
mod error;
mod fragment;
mod frame;

pub use codec::{FrameDecoder, apply_mask, decode, decode_frame, encode, encode_into};
pub use error::FrameError;
pub use fragment::{AssembledMessage, Reassembler, fragment_message};
pub use frame::{Frame, MAX_CONTROL_PAYLOAD, Opcode, close_code};
