//! Subscriber fan-out for inbound channel traffic
//!
//! Each subscriber owns an unbounded queue, so a slow or panicking consumer
//! never affects the others. Publishing walks the set and prunes queues whose
//! receivers have been dropped; dropping a [`Subscription`] is therefore
//! enough to unsubscribe.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, RwLock};

/// Receiving half of one registered subscriber
pub struct Subscription<T> {
    id: u64,
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Receive the next published item; `None` once detached
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Non-blocking receive
    pub fn try_recv(&mut self) -> Result<T, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

struct Entry<K, T> {
    id: u64,
    filter: Option<K>,
    tx: mpsc::UnboundedSender<T>,
}

/// A set of subscribers, each optionally filtered by a key
pub(crate) struct SubscriberSet<K, T> {
    entries: RwLock<Vec<Entry<K, T>>>,
    next_id: AtomicU64,
}

impl<K: PartialEq, T: Clone> SubscriberSet<K, T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber; a `None` filter receives everything
    pub async fn subscribe(&self, filter: Option<K>) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().await.push(Entry { id, filter, tx });
        Subscription { id, rx }
    }

    /// Remove one subscriber by id
    pub async fn unsubscribe(&self, id: u64) {
        self.entries.write().await.retain(|entry| entry.id != id);
    }

    /// Deliver an item to every subscriber whose filter matches `key`
    pub async fn publish(&self, key: &K, item: T) {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|entry| {
            let matches = entry.filter.as_ref().map_or(true, |f| f == key);
            if !matches {
                return true;
            }
            entry.tx.send(item.clone()).is_ok()
        });
        let pruned = before - entries.len();
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned closed subscriber queues");
        }
    }

    /// Detach every subscriber (session teardown)
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of registered subscribers
    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
