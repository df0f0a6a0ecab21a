//! WebSocket session engine
//!
//! Sits between an already-upgraded byte stream and application handlers:
//!
//! ```text
//! bytes -> FrameDecoder -> Reassembler -> inflate -> Message
//!       -> Server::handle_message (validator -> middleware onion -> handler)
//! Outbound queue -> deflate -> fragment -> encode -> bytes
//! ```
//!
//! The HTTP upgrade handshake and TLS belong to the transport; hand
//! [`Server::serve`] the stream and, if the client offered it, the result of
//! [`Server::negotiate_extensions`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use ws_engine::{Connection, Message, Server, ServerConfig};
//!
//! # async fn run(stream: tokio::net::TcpStream) -> anyhow::Result<()> {
//! let server = Arc::new(Server::new(ServerConfig::default())?);
//! server.on_message(|conn: Arc<Connection>, msg: Arc<Message>| async move {
//!     conn.send(msg).await?;
//!     Ok::<_, anyhow::Error>(())
//! });
//! server.serve(stream, "client-1", None).await?;
//! # Ok(())
//! # }
//! ```

mod attribute;
mod broadcaster;
mod config;
mod connection;
mod error;
mod message;
mod metrics;
mod middleware;
pub mod outbound;
mod server;
mod session;

pub use attribute::AttributeValue;
pub use broadcaster::{BroadcasterStats, IndexedBroadcaster, Subscriber, SubscriptionId};
pub use config::{ServerConfig, SslConfig};
pub use connection::Connection;
pub use error::{ConfigError, EngineError, SendError};
pub use message::{Message, MessageKind};
pub use metrics::{
    ByteStats, ConnectionStats, ErrorStats, MessageStats, ServerMetrics, StatsSnapshot,
};
pub use middleware::{ConnectionHandler, Handler, Middleware, Next, compose};
pub use outbound::Outbound;
pub use server::{DispatchOutcome, Server};
