use crate::error::FrameError;
use crate::frame::{Frame, MAX_CONTROL_PAYLOAD, Opcode};

const FIN: u8 = 0x80;
const RSV1: u8 = 0x40;
const RSV2_RSV3: u8 = 0x30;
const MASK: u8 = 0x80;

/// XOR `buf` in place with the 4-byte key. Masking and unmasking are the same operation.
pub fn apply_mask(buf: &mut [u8], key: [u8; 4]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= key[i & 3];
    }
}

/// Encode a frame to its wire form.
pub fn encode(frame: &Frame) -> Result<Vec<u8>, FrameError> {
    let mut out = Vec::with_capacity(frame.encoded_len());
    encode_into(frame, &mut out)?;
    Ok(out)
}

/// Append the wire form of `frame` to `out`.
pub fn encode_into(frame: &Frame, out: &mut Vec<u8>) -> Result<(), FrameError> {
    frame.validate()?;

    let mut b0 = frame.opcode.as_u8();
    if frame.fin {
        b0 |= FIN;
    }
    if frame.rsv1 {
        b0 |= RSV1;
    }
    out.push(b0);

    let mask_bit = if frame.mask.is_some() { MASK } else { 0 };
    let len = frame.payload.len();
    if len < 126 {
        out.push(mask_bit | len as u8);
    } else if len <= u16::MAX as usize {
        out.push(mask_bit | 126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(mask_bit | 127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    match frame.mask {
        Some(key) => {
            out.extend_from_slice(&key);
            let start = out.len();
            out.extend_from_slice(&frame.payload);
            apply_mask(&mut out[start..], key);
        }
        None => out.extend_from_slice(&frame.payload),
    }
    Ok(())
}

/// Parsed fixed + extended header.
struct Header {
    fin: bool,
    rsv1: bool,
    opcode: Opcode,
    mask: Option<[u8; 4]>,
    payload_len: usize,
    header_len: usize,
}

enum Parsed<T> {
    Complete(T),
    /// Total number of bytes required before parsing can progress.
    Incomplete(usize),
}

fn parse_header(buf: &[u8], max_payload: Option<usize>) -> Result<Parsed<Header>, FrameError> {
    if buf.len() < 2 {
        return Ok(Parsed::Incomplete(2));
    }
    let b0 = buf[0];
    let b1 = buf[1];

    if b0 & RSV2_RSV3 != 0 {
        return Err(FrameError::ReservedBits((b0 & 0x70) >> 4));
    }
    let opcode = Opcode::from_u8(b0 & 0x0F)?;
    let fin = b0 & FIN != 0;
    let rsv1 = b0 & RSV1 != 0;
    let masked = b1 & MASK != 0;

    let (raw_len, mut offset) = match b1 & 0x7F {
        126 => {
            if buf.len() < 4 {
                return Ok(Parsed::Incomplete(4));
            }
            (u16::from_be_bytes([buf[2], buf[3]]) as u64, 4)
        }
        127 => {
            if buf.len() < 10 {
                return Ok(Parsed::Incomplete(10));
            }
            let mut len = [0u8; 8];
            len.copy_from_slice(&buf[2..10]);
            let len = u64::from_be_bytes(len);
            if len & (1 << 63) != 0 {
                return Err(FrameError::InvalidLength);
            }
            (len, 10)
        }
        short => (short as u64, 2),
    };

    if opcode.is_control() {
        if raw_len > MAX_CONTROL_PAYLOAD as u64 {
            return Err(FrameError::ControlPayloadTooLarge(raw_len as usize));
        }
        if !fin {
            return Err(FrameError::FragmentedControl);
        }
    }

    let limit = max_payload.unwrap_or(usize::MAX);
    if raw_len > limit as u64 {
        return Err(FrameError::PayloadTooLarge {
            len: raw_len,
            max: limit,
        });
    }
    let payload_len = raw_len as usize;

    let mask = if masked {
        if buf.len() < offset + 4 {
            return Ok(Parsed::Incomplete(offset + 4));
        }
        let key = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
        offset += 4;
        Some(key)
    } else {
        None
    };

    Ok(Parsed::Complete(Header {
        fin,
        rsv1,
        opcode,
        mask,
        payload_len,
        header_len: offset,
    }))
}

/// Decode one frame from the front of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed, otherwise the frame and the
/// number of bytes it consumed. `max_payload` bounds the declared payload
/// length before any payload is read.
pub fn decode_frame(
    buf: &[u8],
    max_payload: Option<usize>,
) -> Result<Option<(Frame, usize)>, FrameError> {
    match decode_inner(buf, max_payload)? {
        Parsed::Complete(decoded) => Ok(Some(decoded)),
        Parsed::Incomplete(_) => Ok(None),
    }
}

fn decode_inner(
    buf: &[u8],
    max_payload: Option<usize>,
) -> Result<Parsed<(Frame, usize)>, FrameError> {
    let header = match parse_header(buf, max_payload)? {
        Parsed::Complete(header) => header,
        Parsed::Incomplete(needed) => return Ok(Parsed::Incomplete(needed)),
    };

    let total = header
        .header_len
        .checked_add(header.payload_len)
        .ok_or(FrameError::InvalidLength)?;
    if buf.len() < total {
        return Ok(Parsed::Incomplete(total));
    }

    let mut payload = buf[header.header_len..total].to_vec();
    if let Some(key) = header.mask {
        apply_mask(&mut payload, key);
    }

    let frame = Frame {
        fin: header.fin,
        rsv1: header.rsv1,
        opcode: header.opcode,
        mask: header.mask,
        payload,
    };
    Ok(Parsed::Complete((frame, total)))
}

/// Decode exactly one frame. Truncated input and trailing bytes are errors.
pub fn decode(bytes: &[u8]) -> Result<Frame, FrameError> {
    match decode_inner(bytes, None)? {
        Parsed::Complete((frame, used)) if used == bytes.len() => Ok(frame),
        Parsed::Complete((_, used)) => Err(FrameError::TrailingBytes(bytes.len() - used)),
        Parsed::Incomplete(needed) => Err(FrameError::Truncated {
            needed,
            available: bytes.len(),
        }),
    }
}

/// Incremental decoder over a byte stream that arrives in arbitrary chunks.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    max_payload: usize,
}

impl FrameDecoder {
    pub fn new(max_payload: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_payload,
        }
    }

    /// Append freshly read bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pop the next complete frame, if the buffer holds one.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        match decode_frame(&self.buf, Some(self.max_payload))? {
            Some((frame, used)) => {
                self.buf.drain(..used);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
