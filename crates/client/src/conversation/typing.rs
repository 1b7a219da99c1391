//! Active-typing tracking with bounded lifetime
//!
//! Inbound typing signals refresh a per-sender deadline. A sweeper task owned
//! by the roster removes entries whose deadline passed without a refresh, so
//! an abandoned typing state cannot outlive its window. Expiry is scheduled,
//! not inferred at render time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// Tracks which senders are currently typing in one ticket
pub struct TypingRoster {
    deadlines: Arc<Mutex<HashMap<Uuid, Instant>>>,
    notify: Arc<Notify>,
    ttl: Duration,
    active_rx: watch::Receiver<Vec<Uuid>>,
    sweeper: JoinHandle<()>,
}

impl TypingRoster {
    /// Create a roster whose entries expire `ttl` after their last refresh
    pub fn new(ttl: Duration) -> Self {
        let deadlines: Arc<Mutex<HashMap<Uuid, Instant>>> = Arc::new(Mutex::new(HashMap::new()));
        let notify = Arc::new(Notify::new());
        let (active_tx, active_rx) = watch::channel(Vec::new());

        let sweeper = tokio::spawn(sweep(
            Arc::clone(&deadlines),
            Arc::clone(&notify),
            active_tx,
        ));

        Self {
            deadlines,
            notify,
            ttl,
            active_rx,
            sweeper,
        }
    }

    /// Record or refresh a sender's typing signal
    pub async fn refresh(&self, sender_id: Uuid) {
        {
            let mut deadlines = self.deadlines.lock().await;
            deadlines.insert(sender_id, Instant::now() + self.ttl);
        }
        self.notify.notify_one();
    }

    /// Watch the active-typing set (sorted sender ids)
    pub fn watch(&self) -> watch::Receiver<Vec<Uuid>> {
        self.active_rx.clone()
    }

    /// Senders currently considered typing
    pub fn active(&self) -> Vec<Uuid> {
        self.active_rx.borrow().clone()
    }
}

impl Drop for TypingRoster {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

/// Remove expired entries and publish the active set whenever it changes
async fn sweep(
    deadlines: Arc<Mutex<HashMap<Uuid, Instant>>>,
    notify: Arc<Notify>,
    active_tx: watch::Sender<Vec<Uuid>>,
) {
    loop {
        let next_deadline = {
            let mut map = deadlines.lock().await;
            let now = Instant::now();
            map.retain(|_, deadline| *deadline > now);

            let mut active: Vec<Uuid> = map.keys().copied().collect();
            active.sort();
            active_tx.send_if_modified(|current| {
                if *current != active {
                    *current = active;
                    true
                } else {
                    false
                }
            });

            map.values().min().copied()
        };

        match next_deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = notify.notified() => {}
                }
            }
            None => notify.notified().await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_signal_expires_without_refresh() {
        let roster = TypingRoster::new(Duration::from_secs(4));
        let sender = Uuid::new_v4();
        let mut active = roster.watch();

        roster.refresh(sender).await;
        active.changed().await.unwrap();
        assert_eq!(*active.borrow(), vec![sender]);

        // No further signal: the sweeper drops the entry once the TTL passes
        active.changed().await.unwrap();
        assert!(active.borrow().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_extends_lifetime() {
        let roster = TypingRoster::new(Duration::from_secs(4));
        let sender = Uuid::new_v4();
        let mut active = roster.watch();

        roster.refresh(sender).await;
        active.changed().await.unwrap();

        // Refresh at the halfway point; the entry must survive the original
        // deadline.
        tokio::time::sleep(Duration::from_secs(2)).await;
        roster.refresh(sender).await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(roster.active(), vec![sender]);

        // And still expire after the refreshed deadline.
        active.changed().await.unwrap();
        assert!(roster.active().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_multiple_senders_tracked_independently() {
        let roster = TypingRoster::new(Duration::from_secs(4));
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let mut active = roster.watch();

        roster.refresh(first).await;
        active.changed().await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        roster.refresh(second).await;
        active.changed().await.unwrap();
        assert_eq!(roster.active().len(), 2);

        // First expires two seconds before second
        active.changed().await.unwrap();
        assert_eq!(roster.active(), vec![second]);
    }
}
