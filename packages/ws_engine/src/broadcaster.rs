//! Channel-keyed publish/subscribe index.
//!
//! Each channel holds a copy-on-write list of `(id, callback)` pairs.
//! `broadcast` clones the list's `Arc` under a read lock and invokes the
//! callbacks with no lock held, so a callback may subscribe or unsubscribe
//! freely. The snapshot taken at the start of a broadcast decides who gets
//! it: subscriptions added during a broadcast may miss it, and
//! unsubscriptions during a broadcast may not prevent delivery.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

pub type SubscriptionId = Uuid;

/// Subscriber callback.
pub type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;

type SubscriberList<T> = Arc<Vec<(SubscriptionId, Subscriber<T>)>>;

pub struct IndexedBroadcaster<T> {
    channels: RwLock<HashMap<String, SubscriberList<T>>>,
    broadcasts: AtomicU64,
    subscriptions: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcasterStats {
    /// `broadcast` calls, including ones to unknown channels.
    pub broadcasts: u64,
    pub channels: u64,
    /// Subscriptions ever made.
    pub subscribers: u64,
    /// Subscriptions currently live, across all channels.
    pub total_subscribers: u64,
}

impl<T> Default for IndexedBroadcaster<T> {
    fn default() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            broadcasts: AtomicU64::new(0),
            subscriptions: AtomicU64::new(0),
        }
    }
}

impl<T> std::fmt::Debug for IndexedBroadcaster<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedBroadcaster")
            .field("stats", &self.stats())
            .finish()
    }
}

impl<T> IndexedBroadcaster<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, channel: &str, subscriber: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = Uuid::now_v7();
        let mut channels = self.channels.write();
        let list = channels.entry(channel.to_string()).or_default();
        Arc::make_mut(list).push((id, Arc::new(subscriber)));
        self.subscriptions.fetch_add(1, Ordering::Relaxed);
        debug!(channel, subscription = %id, "subscribed");
        id
    }

    /// Remove one subscription. `false` if the channel or id is unknown.
    ///
    /// A channel whose last subscriber leaves is dropped.
    pub fn unsubscribe(&self, channel: &str, id: SubscriptionId) -> bool {
        let mut channels = self.channels.write();
        let Some(list) = channels.get_mut(channel) else {
            return false;
        };
        let Some(pos) = list.iter().position(|(sub, _)| *sub == id) else {
            return false;
        };
        Arc::make_mut(list).remove(pos);
        if list.is_empty() {
            channels.remove(channel);
        }
        debug!(channel, subscription = %id, "unsubscribed");
        true
    }

    /// Deliver `message` to every subscriber of `channel`, in subscription
    /// order. Returns how many callbacks ran.
    pub fn broadcast(&self, channel: &str, message: &T) -> usize {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        let Some(snapshot) = self.channels.read().get(channel).cloned() else {
            return 0;
        };
        for (_, subscriber) in snapshot.iter() {
            subscriber(message);
        }
        snapshot.len()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels.read().get(channel).map_or(0, |list| list.len())
    }

    /// Channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop a channel and every subscription in it. Returns how many were removed.
    pub fn clear_channel(&self, channel: &str) -> usize {
        let removed = self
            .channels
            .write()
            .remove(channel)
            .map_or(0, |list| list.len());
        if removed > 0 {
            debug!(channel, removed, "channel cleared");
        }
        removed
    }

    pub fn stats(&self) -> BroadcasterStats {
        let channels = self.channels.read();
        BroadcasterStats {
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            channels: channels.len() as u64,
            subscribers: self.subscriptions.load(Ordering::Relaxed),
            total_subscribers: channels.values().map(|list| list.len() as u64).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&String) + Send + Sync + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        (hits, move |_: &String| {
            h.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_subscribe_and_broadcast() {
        let b = IndexedBroadcaster::<String>::new();
        let (hits, cb) = counter();
        b.subscribe("news", cb);
        assert_eq!(b.broadcast("news", &"hello".to_string()), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(b.subscriber_count("news"), 1);
        assert_eq!(b.channels(), vec!["news".to_string()]);
    }

    #[test]
    fn test_ids_unique() {
        let b = IndexedBroadcaster::<String>::new();
        let a = b.subscribe("x", |_| {});
        let c = b.subscribe("x", |_| {});
        let d = b.subscribe("y", |_| {});
        assert_ne!(a, c);
        assert_ne!(c, d);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let b = IndexedBroadcaster::<String>::new();
        let id = b.subscribe("x", |_| {});
        assert!(!b.unsubscribe("y", id));
        assert!(b.unsubscribe("x", id));
        assert!(!b.unsubscribe("x", id));
        assert!(b.channels().is_empty());
    }

    #[test]
    fn test_delivery_in_subscription_order() {
        let b = IndexedBroadcaster::<u32>::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = order.clone();
            b.subscribe("c", move |_| order.lock().push(i));
        }
        b.broadcast("c", &0);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_unknown_channel_still_counts() {
        let b = IndexedBroadcaster::<String>::new();
        assert_eq!(b.broadcast("nowhere", &String::new()), 0);
        assert_eq!(b.stats().broadcasts, 1);
    }

    #[test]
    fn test_clear_channel_removes_callbacks() {
        let b = IndexedBroadcaster::<String>::new();
        let (hits, cb) = counter();
        b.subscribe("x", cb);
        b.subscribe("x", |_| {});
        assert_eq!(b.clear_channel("x"), 2);
        assert_eq!(b.broadcast("x", &String::new()), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        let stats = b.stats();
        assert_eq!(stats.channels, 0);
        assert_eq!(stats.total_subscribers, 0);
        assert_eq!(stats.subscribers, 2);
    }

    #[test]
    fn test_callback_may_mutate_during_broadcast() {
        let b = Arc::new(IndexedBroadcaster::<String>::new());
        let inner = b.clone();
        b.subscribe("x", move |_| {
            inner.subscribe("x", |_| {});
        });
        // Snapshot: only the original subscriber runs.
        assert_eq!(b.broadcast("x", &String::new()), 1);
        assert_eq!(b.subscriber_count("x"), 2);
    }

    #[test]
    fn test_stats() {
        let b = IndexedBroadcaster::<String>::new();
        b.subscribe("a", |_| {});
        b.subscribe("a", |_| {});
        let id = b.subscribe("b", |_| {});
        b.unsubscribe("b", id);
        b.broadcast("a", &String::new());
        assert_eq!(
            b.stats(),
            BroadcasterStats {
                broadcasts: 1,
                channels: 1,
                subscribers: 3,
                total_subscribers: 2,
            }
        );
    }
}
