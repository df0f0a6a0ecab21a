use std::time::Instant;

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use tracing::{debug, warn};

use crate::adaptive::{estimated_benefit, select_level};
use crate::config::DeflateConfig;
use crate::error::CompressionError;
use crate::params::DeflateParams;
use crate::stats::CompressionStats;

/// Sync-flush trailer stripped from every outbound message (RFC 7692 §7.2.1).
pub(crate) const DEFLATE_TAIL: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// zlib refuses an 8-bit raw deflate window; 9 is the smallest it accepts.
const ZLIB_MIN_WINDOW_BITS: u8 = 9;

/// Which end of the connection this context sits on.
///
/// A server compresses with the `server_*` half of the negotiated parameters
/// and inflates with the `client_*` half. A client does the opposite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// Result of [`CompressionContext::compress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compressed<'a> {
    /// Deflated bytes; the frame must carry RSV1.
    Deflated(Vec<u8>),
    /// The payload went out untouched.
    Skipped(&'a [u8]),
}

impl Compressed<'_> {
    pub fn is_compressed(&self) -> bool {
        matches!(self, Compressed::Deflated(_))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Compressed::Deflated(bytes) => bytes,
            Compressed::Skipped(bytes) => bytes,
        }
    }

    pub fn into_vec(self) -> Vec<u8> {
        match self {
            Compressed::Deflated(bytes) => bytes,
            Compressed::Skipped(bytes) => bytes.to_vec(),
        }
    }
}

/// Per-connection deflate state.
///
/// Outbound and inbound windows are independent. Each one is reset after
/// every message when its `*_no_context_takeover` flag was negotiated and
/// carried over otherwise.
pub struct CompressionContext {
    params: DeflateParams,
    config: DeflateConfig,
    role: Role,
    compressor: Compress,
    decompressor: Decompress,
    level: u32,
    stats: CompressionStats,
}

impl std::fmt::Debug for CompressionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionContext")
            .field("params", &self.params)
            .field("role", &self.role)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

impl CompressionContext {
    pub fn new(params: DeflateParams, config: DeflateConfig, role: Role) -> Self {
        let level = config.level.min(9);
        let compressor = Compress::new_with_window_bits(
            Compression::new(level),
            false,
            zlib_window(outbound_window(&params, role)),
        );
        let decompressor =
            Decompress::new_with_window_bits(false, zlib_window(inbound_window(&params, role)));
        Self {
            params,
            config,
            role,
            compressor,
            decompressor,
            level,
            stats: CompressionStats::default(),
        }
    }

    pub fn params(&self) -> &DeflateParams {
        &self.params
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn stats(&self) -> &CompressionStats {
        &self.stats
    }

    /// Compress one outbound message.
    ///
    /// Small or low-benefit payloads are skipped. A deflate failure is logged
    /// and the payload is sent uncompressed instead.
    pub fn compress<'a>(&mut self, payload: &'a [u8]) -> Compressed<'a> {
        if payload.len() < self.config.min_compression_size {
            self.stats.record_skipped();
            return Compressed::Skipped(payload);
        }

        if self.config.adaptive {
            let benefit = estimated_benefit(payload);
            if benefit < self.config.compression_threshold {
                debug!(len = payload.len(), benefit, "payload not worth compressing");
                self.stats.record_skipped();
                return Compressed::Skipped(payload);
            }
            self.adjust_level(select_level(self.config.level, payload.len()));
        }

        let started = Instant::now();
        match self.deflate(payload) {
            Ok(out) => {
                if self.outbound_no_context_takeover() {
                    self.compressor.reset();
                }
                self.stats
                    .record_compressed(payload.len(), out.len(), started.elapsed());
                Compressed::Deflated(out)
            }
            Err(e) => {
                warn!(error = %e, len = payload.len(), "compression failed, sending uncompressed");
                // The window may hold half a message.
                self.compressor.reset();
                self.stats.record_compression_failure();
                Compressed::Skipped(payload)
            }
        }
    }

    /// Inflate one inbound message (the frame had RSV1 set).
    pub fn decompress(&mut self, payload: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let started = Instant::now();
        match self.inflate(payload) {
            Ok(out) => {
                if self.inbound_no_context_takeover() {
                    self.decompressor.reset(false);
                }
                self.stats
                    .record_decompressed(payload.len(), out.len(), started.elapsed());
                Ok(out)
            }
            Err(e) => {
                self.decompressor.reset(false);
                self.stats.record_decompression_failure();
                Err(e)
            }
        }
    }

    /// Drop both windows.
    pub fn reset(&mut self) {
        self.compressor.reset();
        self.decompressor.reset(false);
    }

    fn adjust_level(&mut self, level: u32) {
        if level == self.level {
            return;
        }
        match self.compressor.set_level(Compression::new(level)) {
            Ok(()) => self.level = level,
            Err(e) => debug!(error = %e, level, "keeping previous compression level"),
        }
    }

    fn deflate(&mut self, input: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let mut out = Vec::with_capacity(input.len() / 2 + 64);
        let start_in = self.compressor.total_in();

        loop {
            let consumed = (self.compressor.total_in() - start_in) as usize;
            if out.len() == out.capacity() {
                out.reserve(out.capacity().max(64));
            }
            let before_out = out.len();
            self.compressor
                .compress_vec(&input[consumed..], &mut out, FlushCompress::Sync)?;

            let consumed = (self.compressor.total_in() - start_in) as usize;
            // Sync flush is complete once all input is in and output stopped
            // short of the buffer end.
            if consumed == input.len() && out.len() < out.capacity() {
                break;
            }
            if consumed == input.len() && out.len() == before_out {
                break;
            }
        }

        if out.ends_with(&DEFLATE_TAIL) {
            out.truncate(out.len() - DEFLATE_TAIL.len());
        }
        Ok(out)
    }

    fn inflate(&mut self, payload: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let limit = self.config.max_decompressed_size;
        let mut input = Vec::with_capacity(payload.len() + DEFLATE_TAIL.len());
        input.extend_from_slice(payload);
        input.extend_from_slice(&DEFLATE_TAIL);

        let mut out = Vec::with_capacity((payload.len() * 3).clamp(64, limit.max(64)));
        let start_in = self.decompressor.total_in();

        loop {
            let consumed = (self.decompressor.total_in() - start_in) as usize;
            if out.len() == out.capacity() {
                out.reserve(out.capacity().max(64));
            }
            let before_out = out.len();
            let status =
                self.decompressor
                    .decompress_vec(&input[consumed..], &mut out, FlushDecompress::Sync)?;

            if out.len() > limit {
                return Err(CompressionError::MessageTooLarge { limit });
            }

            let now_consumed = (self.decompressor.total_in() - start_in) as usize;
            if now_consumed == input.len() && out.len() < out.capacity() {
                break;
            }
            if status == Status::StreamEnd {
                // Peer closed the block with BFINAL; the next message starts fresh.
                self.decompressor.reset(false);
                break;
            }
            if now_consumed == consumed && out.len() == before_out {
                if now_consumed == input.len() {
                    break;
                }
                return Err(CompressionError::Stalled);
            }
        }

        Ok(out)
    }

    fn outbound_no_context_takeover(&self) -> bool {
        match self.role {
            Role::Server => self.params.server_no_context_takeover,
            Role::Client => self.params.client_no_context_takeover,
        }
    }

    fn inbound_no_context_takeover(&self) -> bool {
        match self.role {
            Role::Server => self.params.client_no_context_takeover,
            Role::Client => self.params.server_no_context_takeover,
        }
    }
}

fn outbound_window(params: &DeflateParams, role: Role) -> u8 {
    match role {
        Role::Server => params.server_max_window_bits,
        Role::Client => params.client_max_window_bits,
    }
}

fn inbound_window(params: &DeflateParams, role: Role) -> u8 {
    match role {
        Role::Server => params.client_max_window_bits,
        Role::Client => params.server_max_window_bits,
    }
}

fn zlib_window(bits: u8) -> u8 {
    bits.clamp(ZLIB_MIN_WINDOW_BITS, crate::params::MAX_WINDOW_BITS)
}
