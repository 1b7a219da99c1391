//! Conversation reconciliation engine
//!
//! Owns the canonical in-memory view of one ticket's conversation: merges the
//! historical fetch with the live stream, tracks typing and connection state,
//! and applies the send and feedback policies. Only the engine mutates the
//! view; any number of UI readers observe it through a watch channel.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use ticketlink_protocol::{Feedback, Message, MessageKind};

use crate::api::SupportApi;
use crate::channel::{
    ChannelManager, ChannelStatus, SendOptions, StatusSnapshot, Subscription, TypingSignal,
};
use crate::config::Config;
use crate::error::ClientError;

use super::timeline::Timeline;
use super::typing::TypingRoster;

/// Upper bound on history pages fetched at open
const MAX_HISTORY_PAGES: u32 = 50;

/// Consistent view published to UI subscribers
#[derive(Debug, Clone)]
pub struct ConversationSnapshot {
    /// Reconciled sequence, ascending by timestamp
    pub messages: Vec<Message>,
    pub status: ChannelStatus,
    /// Senders currently typing
    pub typing: Vec<Uuid>,
}

/// A message could not be delivered on either path
#[derive(Debug, thiserror::Error)]
#[error("message could not be delivered: {source}")]
pub struct SendError {
    /// The unsent text, returned so the caller can restore the composer
    pub content: String,
    #[source]
    pub source: ClientError,
}

/// Shared pieces the snapshot is assembled from
#[derive(Clone)]
struct Shared {
    timeline: Arc<Mutex<Timeline>>,
    roster: Arc<TypingRoster>,
    status_rx: watch::Receiver<StatusSnapshot>,
    snapshot_tx: watch::Sender<ConversationSnapshot>,
}

impl Shared {
    async fn publish(&self) {
        let messages = self.timeline.lock().await.messages();
        let snapshot = ConversationSnapshot {
            messages,
            status: self.status_rx.borrow().status,
            typing: self.roster.active(),
        };
        self.snapshot_tx.send_replace(snapshot);
    }
}

/// One ticket's reconciled conversation
pub struct Conversation {
    ticket_id: Uuid,
    api: SupportApi,
    channel: ChannelManager,
    shared: Shared,
    pumps: Vec<JoinHandle<()>>,
}

impl Conversation {
    /// Open a ticket conversation
    ///
    /// Connects the live channel, loads the full message history, and starts
    /// the merge pumps. A channel that cannot connect degrades the view (the
    /// status reflects it and reconnection keeps running) but does not fail
    /// the open; a history fetch failure does.
    pub async fn open(
        api: SupportApi,
        config: Config,
        ticket_id: Uuid,
        auth_token: &str,
    ) -> Result<Self, ClientError> {
        let history_page_size = config.history_page_size;
        let typing_ttl = config.typing_ttl;
        let channel = ChannelManager::new(config);

        // Subscriptions are registered before the connect so no frame that
        // arrives during the history fetch can be missed.
        let message_sub = channel.subscribe_messages(None).await;
        let typing_sub = channel.subscribe_typing().await;

        if let Err(e) = channel.connect(ticket_id, auth_token).await {
            tracing::warn!(
                ticket_id = %ticket_id,
                error = %e,
                "Live channel unavailable; continuing degraded"
            );
        }

        let timeline = Arc::new(Mutex::new(Timeline::new()));
        if let Err(e) = load_history(&api, ticket_id, history_page_size, &timeline).await {
            channel.disconnect().await;
            return Err(e);
        }

        let roster = Arc::new(TypingRoster::new(typing_ttl));
        let status_rx = channel.watch_status();
        let initial = ConversationSnapshot {
            messages: timeline.lock().await.messages(),
            status: status_rx.borrow().status,
            typing: Vec::new(),
        };
        let (snapshot_tx, _) = watch::channel(initial);

        let shared = Shared {
            timeline,
            roster,
            status_rx,
            snapshot_tx,
        };
        let pumps = spawn_pumps(shared.clone(), message_sub, typing_sub);

        let message_count = shared.timeline.lock().await.len();
        tracing::info!(
            ticket_id = %ticket_id,
            messages = message_count,
            "Conversation opened"
        );

        Ok(Self {
            ticket_id,
            api,
            channel,
            shared,
            pumps,
        })
    }

    pub fn ticket_id(&self) -> Uuid {
        self.ticket_id
    }

    /// Subscribe to consistent conversation snapshots
    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Current snapshot
    pub fn snapshot(&self) -> ConversationSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    /// Send a message: live channel first, request/response fallback second
    ///
    /// On the live path the message reappears through the inbound stream and
    /// merges normally. On the fallback path the stored message is inserted
    /// directly, since it already carries its final id. Only total failure is an
    /// error, and it returns the original text for the composer.
    pub async fn send(&self, content: &str) -> Result<(), SendError> {
        if self.channel.connected() {
            if self
                .channel
                .send_chat(content, SendOptions::default())
                .await
            {
                tracing::debug!(ticket_id = %self.ticket_id, "Message sent on live channel");
                return Ok(());
            }
            tracing::debug!(
                ticket_id = %self.ticket_id,
                "Live write failed; trying fallback"
            );
        }

        match self
            .api
            .send_message(self.ticket_id, content, MessageKind::UserMessage, false)
            .await
        {
            Ok(message) => {
                {
                    let mut timeline = self.shared.timeline.lock().await;
                    timeline.insert(message);
                }
                self.shared.publish().await;
                tracing::debug!(ticket_id = %self.ticket_id, "Message sent via fallback API");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    ticket_id = %self.ticket_id,
                    error = %e,
                    "Message undeliverable on both paths"
                );
                Err(SendError {
                    content: content.to_string(),
                    source: e,
                })
            }
        }
    }

    /// Update feedback on a message
    ///
    /// The in-memory message changes only after the server accepts the
    /// update; a failed update leaves the displayed state untouched.
    pub async fn set_feedback(
        &self,
        message_id: Uuid,
        feedback: Feedback,
    ) -> Result<(), ClientError> {
        self.api
            .update_feedback(self.ticket_id, message_id, feedback)
            .await?;

        {
            let mut timeline = self.shared.timeline.lock().await;
            if !timeline.set_feedback(message_id, feedback) {
                tracing::warn!(
                    ticket_id = %self.ticket_id,
                    message_id = %message_id,
                    "Feedback accepted for a message not in the timeline"
                );
            }
        }
        self.shared.publish().await;
        tracing::debug!(
            ticket_id = %self.ticket_id,
            message_id = %message_id,
            feedback = feedback.as_str(),
            "Feedback updated"
        );
        Ok(())
    }

    /// Forward a local typing signal; best-effort
    pub async fn notify_typing(&self) {
        self.channel.send_typing().await;
    }

    /// Tear down: stop every pump and timer and close the channel
    pub async fn close(mut self) {
        for pump in self.pumps.drain(..) {
            pump.abort();
        }
        self.channel.disconnect().await;
        tracing::info!(ticket_id = %self.ticket_id, "Conversation closed");
    }
}

impl Drop for Conversation {
    fn drop(&mut self) {
        for pump in &self.pumps {
            pump.abort();
        }
    }
}

/// Page through the history fetch until the server reports no more
async fn load_history(
    api: &SupportApi,
    ticket_id: Uuid,
    page_size: u32,
    timeline: &Arc<Mutex<Timeline>>,
) -> Result<(), ClientError> {
    let mut page = 1;
    loop {
        let batch = api.fetch_messages(ticket_id, page, page_size).await?;
        let has_more = batch.pagination.has_more;
        let inserted = timeline.lock().await.merge(batch.messages);
        tracing::debug!(ticket_id = %ticket_id, page, inserted, "Merged history page");

        if !has_more {
            return Ok(());
        }
        page += 1;
        if page > MAX_HISTORY_PAGES {
            tracing::warn!(
                ticket_id = %ticket_id,
                max_pages = MAX_HISTORY_PAGES,
                "History page cap reached; older messages not loaded"
            );
            return Ok(());
        }
    }
}

/// Start the pump tasks feeding the snapshot channel
fn spawn_pumps(
    shared: Shared,
    mut message_sub: Subscription<Message>,
    mut typing_sub: Subscription<TypingSignal>,
) -> Vec<JoinHandle<()>> {
    let mut pumps = Vec::with_capacity(4);

    // Live messages → timeline
    {
        let shared = shared.clone();
        pumps.push(tokio::spawn(async move {
            while let Some(message) = message_sub.recv().await {
                let inserted = shared.timeline.lock().await.insert(message);
                if inserted {
                    shared.publish().await;
                }
            }
        }));
    }

    // Typing signals → roster
    {
        let roster = Arc::clone(&shared.roster);
        pumps.push(tokio::spawn(async move {
            while let Some(signal) = typing_sub.recv().await {
                roster.refresh(signal.sender_id).await;
            }
        }));
    }

    // Roster changes → snapshot
    {
        let shared = shared.clone();
        let mut roster_rx = shared.roster.watch();
        pumps.push(tokio::spawn(async move {
            while roster_rx.changed().await.is_ok() {
                shared.publish().await;
            }
        }));
    }

    // Connection status → snapshot
    {
        let shared = shared.clone();
        let mut status_rx = shared.status_rx.clone();
        pumps.push(tokio::spawn(async move {
            while status_rx.changed().await.is_ok() {
                shared.publish().await;
            }
        }));
    }

    pumps
}
