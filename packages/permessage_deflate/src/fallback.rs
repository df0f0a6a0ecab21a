//! Stateless deflate for payloads that never went through negotiation.
//!
//! Every call is its own stream, so output from [`deflate`] is exactly what a
//! `no_context_takeover` context would produce for the same input.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

use crate::context::DEFLATE_TAIL;
use crate::error::CompressionError;

pub fn deflate(payload: &[u8], level: u32) -> Result<Vec<u8>, CompressionError> {
    let mut encoder = DeflateEncoder::new(
        Vec::with_capacity(payload.len() / 2 + 16),
        Compression::new(level.min(9)),
    );
    encoder.write_all(payload)?;
    // Sync flush, not finish: no BFINAL block.
    encoder.flush()?;
    let mut out = std::mem::take(encoder.get_mut());
    if out.ends_with(&DEFLATE_TAIL) {
        out.truncate(out.len() - DEFLATE_TAIL.len());
    }
    Ok(out)
}

/// Inflate at most `limit` bytes.
pub fn inflate(payload: &[u8], limit: usize) -> Result<Vec<u8>, CompressionError> {
    let decoder = DeflateDecoder::new(payload.chain(&DEFLATE_TAIL[..]));
    let mut out = Vec::new();
    decoder.take(limit as u64 + 1).read_to_end(&mut out)?;
    if out.len() > limit {
        return Err(CompressionError::MessageTooLarge { limit });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let payload = b"fallback fallback fallback fallback".repeat(20);
        let packed = deflate(&payload, 6).unwrap();
        assert!(packed.len() < payload.len());
        assert_eq!(inflate(&packed, 1 << 20).unwrap(), payload);
    }

    #[test]
    fn empty_payload() {
        let packed = deflate(b"", 6).unwrap();
        assert_eq!(inflate(&packed, 16).unwrap(), b"");
    }

    #[test]
    fn limit_enforced() {
        let packed = deflate(&[7u8; 10_000], 9).unwrap();
        assert!(matches!(
            inflate(&packed, 100),
            Err(CompressionError::MessageTooLarge { limit: 100 })
        ));
    }

    #[test]
    fn garbage_rejected() {
        assert!(inflate(&[0xff, 0xfe, 0xfd], 1024).is_err());
    }
}
