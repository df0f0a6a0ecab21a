//! Bounded per-connection send queue with an explicit backpressure knob.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::Message;

/// How long a paused producer sleeps before re-checking the queue.
const PAUSE: Duration = Duration::from_millis(5);

/// Producer half of a connection's outbound queue.
///
/// Messages are shared (`Arc`) so a broadcast does not copy the payload once
/// per recipient.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Arc<Message>>,
    threshold: usize,
}

/// Create a queue holding `capacity` messages that pauses producers once
/// `threshold` are waiting.
pub fn channel(capacity: usize, threshold: usize) -> (Outbound, mpsc::Receiver<Arc<Message>>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        Outbound {
            tx,
            threshold: threshold.clamp(1, capacity.max(1)),
        },
        rx,
    )
}

impl Outbound {
    /// Messages queued and not yet taken by the writer.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_congested(&self) -> bool {
        self.depth() >= self.threshold
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue a message, pausing while the queue sits at or above the threshold.
    pub async fn send(&self, message: Arc<Message>) -> Result<(), SendError> {
        while self.is_congested() {
            if self.is_closed() {
                return Err(SendError::Closed);
            }
            tokio::time::sleep(PAUSE).await;
        }
        self.tx.send(message).await.map_err(|_| SendError::Closed)
    }

    /// Queue without waiting. Returns [`SendError::Backpressure`] instead of pausing.
    pub fn try_send(&self, message: Arc<Message>) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        if self.is_congested() {
            return Err(SendError::Backpressure);
        }
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(n: i64) -> Arc<Message> {
        Arc::new(Message::json(serde_json::json!({ "n": n })))
    }

    #[tokio::test]
    async fn test_try_send_signals_backpressure() {
        let (tx, mut rx) = channel(4, 2);
        tx.try_send(msg(1)).unwrap();
        tx.try_send(msg(2)).unwrap();
        assert_eq!(tx.depth(), 2);
        assert_eq!(tx.try_send(msg(3)), Err(SendError::Backpressure));

        rx.recv().await.unwrap();
        assert!(tx.try_send(msg(3)).is_ok());
    }

    #[tokio::test]
    async fn test_send_pauses_until_drained() {
        let (tx, mut rx) = channel(2, 1);
        tx.send(msg(1)).await.unwrap();

        let producer = {
            let tx = tx.clone();
            tokio::spawn(async move { tx.send(msg(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        assert_eq!(rx.recv().await.unwrap().get("n"), Some(&serde_json::json!(1)));
        producer.await.unwrap().unwrap();
        assert_eq!(rx.recv().await.unwrap().get("n"), Some(&serde_json::json!(2)));
    }

    #[tokio::test]
    async fn test_closed_queue() {
        let (tx, rx) = channel(2, 2);
        drop(rx);
        assert_eq!(tx.try_send(msg(1)), Err(SendError::Closed));
        assert_eq!(tx.send(msg(1)).await, Err(SendError::Closed));
    }
}
