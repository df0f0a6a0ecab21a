//! permessage-deflate (RFC 7692)
//!
//! Two halves:
//! - [`Negotiator`] turns a `Sec-WebSocket-Extensions` offer into the
//!   [`DeflateParams`] both peers will use, and renders the response header.
//! - [`CompressionContext`] holds the per-connection deflate/inflate state,
//!   honouring `*_no_context_takeover` by resetting the window after every message.
//!
//! ```
//! use permessage_deflate::{CompressionContext, DeflateConfig, Negotiator, Role};
//!
//! let negotiator = Negotiator::new(DeflateConfig::default());
//! let params = negotiator
//!     .negotiate("permessage-deflate; client_max_window_bits")
//!     .unwrap();
//! assert_eq!(params.to_header(), "permessage-deflate");
//!
//! let config = DeflateConfig { min_compression_size: 0, ..Default::default() };
//! let mut server = CompressionContext::new(params, config.clone(), Role::Server);
//! let mut client = CompressionContext::new(params, config, Role::Client);
//! let payload = b"hello hello hello hello hello hello".to_vec();
//! let compressed = server.compress(&payload);
//! assert!(compressed.is_compressed());
//! assert_eq!(client.decompress(compressed.as_bytes()).unwrap(), payload);
//! ```

mod adaptive;
mod config;
mod context;
mod error;
pub mod fallback;
mod negotiation;
mod params;
mod stats;

pub use adaptive::{estimated_benefit, select_level};
pub use config::DeflateConfig;
pub use context::{Compressed, CompressionContext, Role};
pub use error::{CompressionError, NegotiationError};
pub use negotiation::Negotiator;
pub use params::{DEFAULT_WINDOW_BITS, DeflateParams, EXTENSION_NAME, MAX_WINDOW_BITS, MIN_WINDOW_BITS};
pub use stats::CompressionStats;
