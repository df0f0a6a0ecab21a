use serde::{Deserialize, Serialize};

use crate::params::{DEFAULT_WINDOW_BITS, window_bits_in_range};

/// Local permessage-deflate settings (lives under `[deflate]` in the server config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeflateConfig {
    /// Accept permessage-deflate offers at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_window_bits")]
    pub server_max_window_bits: u8,
    #[serde(default = "default_window_bits")]
    pub client_max_window_bits: u8,
    #[serde(default)]
    pub server_no_context_takeover: bool,
    #[serde(default)]
    pub client_no_context_takeover: bool,
    /// zlib level 0-9.
    #[serde(default = "default_level")]
    pub level: u32,
    /// Payloads shorter than this are sent uncompressed.
    #[serde(default = "default_min_compression_size")]
    pub min_compression_size: usize,
    /// Minimum estimated benefit (0.0 - 1.0) for adaptive compression to bother.
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: f64,
    /// Score payloads before compressing and pick a faster level for large ones.
    #[serde(default = "default_true")]
    pub adaptive: bool,
    /// Upper bound on an inflated message.
    #[serde(default = "default_max_decompressed_size")]
    pub max_decompressed_size: usize,
}

impl Default for DeflateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            server_max_window_bits: default_window_bits(),
            client_max_window_bits: default_window_bits(),
            server_no_context_takeover: false,
            client_no_context_takeover: false,
            level: default_level(),
            min_compression_size: default_min_compression_size(),
            compression_threshold: default_compression_threshold(),
            adaptive: true,
            max_decompressed_size: default_max_decompressed_size(),
        }
    }
}

impl DeflateConfig {
    /// Both window sizes fall inside `[8, 15]`.
    pub fn window_bits_valid(&self) -> bool {
        window_bits_in_range(self.server_max_window_bits)
            && window_bits_in_range(self.client_max_window_bits)
    }
}

fn default_true() -> bool {
    true
}

fn default_window_bits() -> u8 {
    DEFAULT_WINDOW_BITS
}

fn default_level() -> u32 {
    6
}

fn default_min_compression_size() -> usize {
    1024 // 1KB
}

fn default_compression_threshold() -> f64 {
    0.1
}

fn default_max_decompressed_size() -> usize {
    16 * 1024 * 1024 // 16MB
}
