use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use permessage_deflate::DeflateParams;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::attribute::AttributeValue;
use crate::error::SendError;
use crate::message::Message;
use crate::outbound::Outbound;

/// One client session.
///
/// Holds identity, liveness, the attribute bag and (when a session task is
/// running) the outbound queue. Registration lives in the [`Server`](crate::Server);
/// [`close`](Self::close) only flips `alive`.
#[derive(Debug)]
pub struct Connection {
    id: String,
    alive: AtomicBool,
    connected_at: DateTime<Utc>,
    last_ping: Mutex<DateTime<Utc>>,
    attributes: RwLock<HashMap<String, AttributeValue>>,
    outbound: Option<Outbound>,
    deflate: Option<DeflateParams>,
    cancel: CancellationToken,
    /// Channel subscriptions made through the server, removed on disconnect.
    subscriptions: Mutex<Vec<(String, Uuid)>>,
}

impl Connection {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            alive: AtomicBool::new(true),
            connected_at: now,
            last_ping: Mutex::new(now),
            attributes: RwLock::new(HashMap::new()),
            outbound: None,
            deflate: None,
            cancel: CancellationToken::new(),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// A connection with a fresh v4 id.
    pub fn with_random_id() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    /// Attach the queue a session writer drains.
    pub fn with_outbound(mut self, outbound: Outbound) -> Self {
        self.outbound = Some(outbound);
        self
    }

    /// Record the negotiated permessage-deflate parameters.
    pub fn with_deflate(mut self, params: Option<DeflateParams>) -> Self {
        self.deflate = params;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Release);
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn last_ping_time(&self) -> DateTime<Utc> {
        *self.last_ping.lock()
    }

    /// Refresh the liveness timestamp (on pong or any inbound traffic).
    pub fn update_ping_time(&self) {
        *self.last_ping.lock() = Utc::now();
    }

    pub fn set_last_ping_time(&self, at: DateTime<Utc>) {
        *self.last_ping.lock() = at;
    }

    pub fn deflate(&self) -> Option<&DeflateParams> {
        self.deflate.as_ref()
    }

    // Attributes

    pub fn get_attribute(&self, key: &str) -> Option<AttributeValue> {
        self.attributes.read().get(key).cloned()
    }

    /// `default` when the key is absent.
    pub fn get_attribute_or(&self, key: &str, default: AttributeValue) -> AttributeValue {
        self.get_attribute(key).unwrap_or(default)
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.write().insert(key.into(), value.into());
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.read().contains_key(key)
    }

    pub fn remove_attribute(&self, key: &str) -> Option<AttributeValue> {
        self.attributes.write().remove(key)
    }

    pub fn attributes(&self) -> HashMap<String, AttributeValue> {
        self.attributes.read().clone()
    }

    // Outbound

    /// Queue a message, pausing under backpressure.
    pub async fn send(&self, message: Arc<Message>) -> Result<(), SendError> {
        match &self.outbound {
            Some(outbound) => outbound.send(message).await,
            None => Err(SendError::Detached),
        }
    }

    pub fn try_send(&self, message: Arc<Message>) -> Result<(), SendError> {
        match &self.outbound {
            Some(outbound) => outbound.try_send(message),
            None => Err(SendError::Detached),
        }
    }

    pub fn outbound(&self) -> Option<&Outbound> {
        self.outbound.as_ref()
    }

    /// Mark the connection dead. Deregistration is the server's job.
    pub fn close(&self) {
        self.set_alive(false);
    }

    /// Cancelled when the server drops this connection; the session task exits.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn track_subscription(&self, channel: &str, id: Uuid) {
        self.subscriptions.lock().push((channel.to_string(), id));
    }

    pub(crate) fn untrack_subscription(&self, id: Uuid) {
        self.subscriptions.lock().retain(|(_, sub)| *sub != id);
    }

    pub(crate) fn take_subscriptions(&self) -> Vec<(String, Uuid)> {
        std::mem::take(&mut *self.subscriptions.lock())
    }

    pub(crate) fn subscription_for(&self, channel: &str) -> Option<Uuid> {
        self.subscriptions
            .lock()
            .iter()
            .find(|(c, _)| c == channel)
            .map(|(_, id)| *id)
    }
}
