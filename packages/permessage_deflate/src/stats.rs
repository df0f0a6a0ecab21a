use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cumulative counters for one [`CompressionContext`](crate::CompressionContext).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompressionStats {
    pub messages_compressed: u64,
    pub messages_decompressed: u64,
    /// Sent uncompressed because too small or not worth it.
    pub messages_skipped: u64,
    pub compression_failures: u64,
    pub decompression_failures: u64,

    // Outbound direction
    /// Bytes handed to the compressor.
    pub bytes_in: u64,
    /// Bytes the compressor produced.
    pub bytes_out: u64,
    /// `bytes_out / bytes_in`, recomputed after every compressed message.
    pub average_ratio: f64,
    pub bytes_saved: u64,

    // Inbound direction
    pub inflated_bytes_in: u64,
    pub inflated_bytes_out: u64,

    pub compress_time_us: u64,
    pub decompress_time_us: u64,
}

impl CompressionStats {
    pub(crate) fn record_compressed(&mut self, input: usize, output: usize, took: Duration) {
        self.messages_compressed += 1;
        self.bytes_in += input as u64;
        self.bytes_out += output as u64;
        self.bytes_saved = self.bytes_in.saturating_sub(self.bytes_out);
        self.average_ratio = if self.bytes_in == 0 {
            0.0
        } else {
            self.bytes_out as f64 / self.bytes_in as f64
        };
        self.compress_time_us += took.as_micros() as u64;
    }

    pub(crate) fn record_decompressed(&mut self, input: usize, output: usize, took: Duration) {
        self.messages_decompressed += 1;
        self.inflated_bytes_in += input as u64;
        self.inflated_bytes_out += output as u64;
        self.decompress_time_us += took.as_micros() as u64;
    }

    pub(crate) fn record_skipped(&mut self) {
        self.messages_skipped += 1;
    }

    pub(crate) fn record_compression_failure(&mut self) {
        self.compression_failures += 1;
    }

    pub(crate) fn record_decompression_failure(&mut self) {
        self.decompression_failures += 1;
    }
}
