use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use parking_lot::RwLock;
use permessage_deflate::{CompressionError, DeflateParams, Negotiator, fallback};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ws_frame::{Frame, Opcode};

use crate::broadcaster::{BroadcasterStats, IndexedBroadcaster, SubscriptionId};
use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::{ConfigError, EngineError};
use crate::message::Message;
use crate::metrics::{ServerMetrics, StatsSnapshot};
use crate::middleware::{ConnectionHandler, Handler, Middleware, compose, noop};

type Validator = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// What happened to a message handed to [`Server::handle_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Ran through the middleware chain and the handler.
    Delivered,
    /// The validator said no; nothing ran.
    Rejected,
}

struct Pipeline {
    middleware: Vec<Arc<dyn Middleware>>,
    on_message: Arc<dyn Handler>,
    /// `middleware` wrapped around `on_message`, rebuilt on registration.
    composed: Arc<dyn Handler>,
}

impl Pipeline {
    fn rebuild(&mut self) {
        self.composed = compose(&self.middleware, Arc::clone(&self.on_message));
    }
}

/// Connection registry and message dispatch.
///
/// Shared across session tasks behind an `Arc`; every method takes `&self`.
pub struct Server {
    config: ServerConfig,
    connections: RwLock<HashMap<String, Arc<Connection>>>,
    pipeline: RwLock<Pipeline>,
    on_connect: RwLock<Option<Arc<dyn ConnectionHandler>>>,
    on_disconnect: RwLock<Option<Arc<dyn ConnectionHandler>>>,
    validator: RwLock<Option<Validator>>,
    broadcaster: IndexedBroadcaster<Arc<Message>>,
    negotiator: Negotiator,
    metrics: Arc<ServerMetrics>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("bind_addr", &self.config.bind_addr())
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}

impl Server {
    pub fn new(config: ServerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            addr = %config.bind_addr(),
            max_connections = config.max_connections,
            compression = config.compression,
            "websocket engine configured"
        );

        let handler = noop();
        Ok(Self {
            negotiator: Negotiator::new(config.deflate.clone()),
            config,
            connections: RwLock::new(HashMap::new()),
            pipeline: RwLock::new(Pipeline {
                middleware: Vec::new(),
                on_message: Arc::clone(&handler),
                composed: handler,
            }),
            on_connect: RwLock::new(None),
            on_disconnect: RwLock::new(None),
            validator: RwLock::new(None),
            broadcaster: IndexedBroadcaster::new(),
            metrics: Arc::new(ServerMetrics::new()),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn broadcaster(&self) -> &IndexedBroadcaster<Arc<Message>> {
        &self.broadcaster
    }

    pub fn metrics(&self) -> &ServerMetrics {
        &self.metrics
    }

    // =========================================================================
    // Registration
    // =========================================================================

    pub fn on_connect(&self, handler: impl ConnectionHandler) {
        *self.on_connect.write() = Some(Arc::new(handler));
    }

    pub fn on_message(&self, handler: impl Handler) {
        let mut pipeline = self.pipeline.write();
        pipeline.on_message = Arc::new(handler);
        pipeline.rebuild();
    }

    pub fn on_disconnect(&self, handler: impl ConnectionHandler) {
        *self.on_disconnect.write() = Some(Arc::new(handler));
    }

    /// Append a middleware. Earlier registrations wrap later ones.
    pub fn use_middleware(&self, middleware: impl Middleware) {
        let mut pipeline = self.pipeline.write();
        pipeline.middleware.push(Arc::new(middleware));
        pipeline.rebuild();
    }

    pub fn set_validator(&self, validator: impl Fn(&Message) -> bool + Send + Sync + 'static) {
        *self.validator.write() = Some(Arc::new(validator));
    }

    // =========================================================================
    // Registry
    // =========================================================================

    pub fn add_connection(&self, conn: Arc<Connection>) -> Result<(), EngineError> {
        let max = self.config.capacity();
        let mut connections = self.connections.write();
        if connections.len() >= max {
            warn!(connection_id = %conn.id(), max, "connection limit reached, rejecting");
            return Err(EngineError::Capacity { max });
        }
        let id = conn.id().to_string();
        if connections.insert(id.clone(), conn).is_some() {
            warn!(connection_id = %id, "replaced connection with duplicate id");
        }
        info!(connection_id = %id, active = connections.len(), "connection registered");
        Ok(())
    }

    pub fn remove_connection(&self, id: &str) -> Option<Arc<Connection>> {
        let mut connections = self.connections.write();
        let removed = connections.remove(id);
        if removed.is_some() {
            info!(connection_id = %id, active = connections.len(), "connection removed");
        }
        removed
    }

    pub fn has_connection(&self, id: &str) -> bool {
        self.connections.read().contains_key(id)
    }

    pub fn get_connection(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.read().get(id).cloned()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections.read().values().cloned().collect()
    }

    // =========================================================================
    // Fan-out to connections
    // =========================================================================

    /// Queue `message` on every registered connection. Returns how many accepted it.
    pub async fn broadcast(&self, message: impl Into<Arc<Message>>) -> usize {
        self.broadcast_where(message, |_| true).await
    }

    /// Queue `message` on the connections `predicate` selects at call time.
    pub async fn broadcast_where<P>(&self, message: impl Into<Arc<Message>>, predicate: P) -> usize
    where
        P: Fn(&Connection) -> bool,
    {
        let message = message.into();
        // Snapshot first so the predicate runs without the registry lock.
        let targets: Vec<Arc<Connection>> = self
            .connections()
            .into_iter()
            .filter(|conn| predicate(conn))
            .collect();

        let results = join_all(targets.iter().map(|conn| {
            let message = Arc::clone(&message);
            async move { (conn.id(), conn.send(message).await) }
        }))
        .await;

        let mut delivered = 0;
        for (id, result) in results {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    self.metrics.message_dropped();
                    debug!(connection_id = %id, error = %e, "broadcast not delivered");
                }
            }
        }
        delivered
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Run `message` through the middleware chain and the message handler.
    /// Errors come back exactly as the chain produced them.
    pub async fn process_message(&self, conn: Arc<Connection>, message: Arc<Message>) -> anyhow::Result<()> {
        let chain = Arc::clone(&self.pipeline.read().composed);
        chain.call(conn, message).await
    }

    /// `true` when no validator is registered.
    pub fn validate_message(&self, message: &Message) -> bool {
        let validator = self.validator.read().clone();
        validator.is_none_or(|validate| validate(message))
    }

    /// Count, validate and dispatch one inbound message.
    pub async fn handle_message(
        &self,
        conn: Arc<Connection>,
        message: Arc<Message>,
    ) -> anyhow::Result<DispatchOutcome> {
        self.metrics.message_received(message.payload().len());

        if !self.validate_message(&message) {
            self.metrics.message_rejected();
            debug!(connection_id = %conn.id(), "message rejected by validator");
            return Ok(DispatchOutcome::Rejected);
        }

        let id = conn.id().to_string();
        if let Err(e) = self.process_message(conn, message).await {
            self.metrics.handler_error();
            warn!(connection_id = %id, error = %e, "message handler failed");
            return Err(e);
        }
        Ok(DispatchOutcome::Delivered)
    }

    pub async fn handle_connect(&self, conn: Arc<Connection>) -> anyhow::Result<()> {
        let handler = self.on_connect.read().clone();
        let result = match handler {
            Some(handler) => handler.call(conn).await,
            None => Ok(()),
        };
        self.metrics.connection_opened();
        result
    }

    pub async fn handle_disconnect(&self, conn: Arc<Connection>) -> anyhow::Result<()> {
        let handler = self.on_disconnect.read().clone();
        match handler {
            Some(handler) => handler.call(conn).await,
            None => Ok(()),
        }
    }

    /// Deregister `id`, stop its session, drop its channel subscriptions and
    /// run the disconnect hook. `false` if it was not registered.
    pub async fn disconnect(&self, id: &str) -> bool {
        let Some(conn) = self.remove_connection(id) else {
            return false;
        };
        conn.close();
        conn.cancellation().cancel();
        for (channel, subscription) in conn.take_subscriptions() {
            self.broadcaster.unsubscribe(&channel, subscription);
        }
        if let Err(e) = self.handle_disconnect(conn).await {
            warn!(connection_id = %id, error = %e, "disconnect handler failed");
        }
        true
    }

    // =========================================================================
    // Liveness
    // =========================================================================

    /// Connections that are dead or have not answered a ping within
    /// `ping_timeout`. Nothing is closed here.
    pub fn check_timeouts(&self) -> Vec<Arc<Connection>> {
        let timeout =
            chrono::Duration::from_std(self.config.ping_timeout()).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        self.connections
            .read()
            .values()
            .filter(|conn| !conn.is_alive() || now - conn.last_ping_time() > timeout)
            .cloned()
            .collect()
    }

    /// `check_timeouts` followed by `disconnect` for each result.
    pub async fn sweep_timeouts(&self) -> usize {
        let stale = self.check_timeouts();
        if stale.is_empty() {
            return 0;
        }
        info!(count = stale.len(), "disconnecting timed-out connections");
        let mut removed = 0;
        for conn in stale {
            if self.disconnect(conn.id()).await {
                removed += 1;
            }
        }
        removed
    }

    /// Run `sweep_timeouts` every `heartbeat_interval` until `cancel` fires.
    pub fn spawn_heartbeat(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let server = Arc::clone(self);
        tokio::spawn(async move {
            let period = server.config.heartbeat_interval();
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("heartbeat sweep stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        server.sweep_timeouts().await;
                    }
                }
            }
        })
    }

    // =========================================================================
    // Frames and compression
    // =========================================================================

    /// `false` for continuation or reserved opcodes, or payloads over `max_frame_size`.
    pub fn validate_frame(&self, frame: &Frame) -> bool {
        matches!(
            frame.opcode,
            Opcode::Text | Opcode::Binary | Opcode::Close | Opcode::Ping | Opcode::Pong
        ) && frame.payload.len() <= self.config.max_frame_size
    }

    /// Stateless deflate for peers that did not negotiate permessage-deflate.
    /// Pass-through when compression is disabled.
    pub fn compress_frame(&self, payload: &[u8]) -> Result<Vec<u8>, CompressionError> {
        if !self.config.compression {
            return Ok(payload.to_vec());
        }
        fallback::deflate(payload, self.config.deflate.level)
    }

    pub fn decompress_frame(&self, payload: &[u8]) -> Result<Vec<u8>, CompressionError> {
        if !self.config.compression {
            return Ok(payload.to_vec());
        }
        fallback::inflate(payload, self.config.max_message_size)
    }

    /// Answer a `Sec-WebSocket-Extensions` offer. `None` leaves the
    /// extension off; otherwise the parameters and the response header value.
    pub fn negotiate_extensions(&self, offer: &str) -> Option<(DeflateParams, String)> {
        if !self.config.compression {
            return None;
        }
        self.negotiator
            .negotiate(offer)
            .map(|params| (params, params.to_header()))
    }

    // =========================================================================
    // Channels
    // =========================================================================

    /// Subscribe a registered connection to `channel`. Published messages are
    /// queued without waiting; a congested connection misses them.
    ///
    /// Subscribing twice to the same channel returns the existing id.
    pub fn subscribe_connection(&self, channel: &str, id: &str) -> Result<SubscriptionId, EngineError> {
        let conn = self
            .get_connection(id)
            .ok_or_else(|| EngineError::UnknownConnection(id.to_string()))?;
        if let Some(existing) = conn.subscription_for(channel) {
            return Ok(existing);
        }

        let weak = Arc::downgrade(&conn);
        let metrics = Arc::clone(&self.metrics);
        let subscription = self.broadcaster.subscribe(channel, move |message: &Arc<Message>| {
            let Some(conn) = weak.upgrade() else {
                return;
            };
            if let Err(e) = conn.try_send(Arc::clone(message)) {
                metrics.message_dropped();
                debug!(connection_id = %conn.id(), error = %e, "published message dropped");
            }
        });
        conn.track_subscription(channel, subscription);
        Ok(subscription)
    }

    pub fn unsubscribe_connection(&self, channel: &str, id: &str) -> bool {
        let Some(conn) = self.get_connection(id) else {
            return false;
        };
        let Some(subscription) = conn.subscription_for(channel) else {
            return false;
        };
        conn.untrack_subscription(subscription);
        self.broadcaster.unsubscribe(channel, subscription)
    }

    /// Deliver to the subscribers of `channel`. Returns how many were invoked.
    pub fn publish(&self, channel: &str, message: impl Into<Arc<Message>>) -> usize {
        self.broadcaster.broadcast(channel, &message.into())
    }

    // =========================================================================
    // Stats
    // =========================================================================

    pub fn stats(&self) -> StatsSnapshot {
        self.metrics.snapshot(self.connection_count())
    }

    pub fn broadcaster_stats(&self) -> BroadcasterStats {
        self.broadcaster.stats()
    }
}
