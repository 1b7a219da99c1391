//! Owned channel handle for one ticket view
//!
//! Each ticket view constructs its own `ChannelManager` and drops it on exit;
//! there is no process-wide singleton. Dropping the manager (or calling
//! `disconnect`) tears down the session task together with every timer and
//! subscriber attached to it, so nothing can fire against a stale ticket.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use ticketlink_protocol::{ClientFrame, Feedback, Message, MessageKind};

use crate::config::Config;

use super::dispatch::{SubscriberSet, Subscription};
use super::session::{
    self, ChannelError, ChannelStatus, ConnectionEvent, ConnectionEventKind, SessionCommand,
    SessionContext, StatusSnapshot, TypingSignal,
};

/// How long a session task gets to shut down cleanly before it is aborted
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Per-send options carried on the chat frame
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    pub kind: MessageKind,
    pub is_generated: bool,
    pub feedback: Feedback,
}

struct ActiveSession {
    ticket_id: Uuid,
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    task: JoinHandle<()>,
}

/// Live channel handle for one ticket view
pub struct ChannelManager {
    config: Config,
    messages: Arc<SubscriberSet<MessageKind, Message>>,
    typing: Arc<SubscriberSet<(), TypingSignal>>,
    events: Arc<SubscriberSet<ConnectionEventKind, ConnectionEvent>>,
    status_tx: watch::Sender<StatusSnapshot>,
    status_rx: watch::Receiver<StatusSnapshot>,
    session: Mutex<Option<ActiveSession>>,
}

impl ChannelManager {
    /// Create a manager with no live session
    pub fn new(config: Config) -> Self {
        let (status_tx, status_rx) =
            watch::channel(StatusSnapshot::idle(config.max_reconnect_attempts));
        Self {
            config,
            messages: Arc::new(SubscriberSet::new()),
            typing: Arc::new(SubscriberSet::new()),
            events: Arc::new(SubscriberSet::new()),
            status_tx,
            status_rx,
            session: Mutex::new(None),
        }
    }

    /// Open the live channel for a ticket
    ///
    /// Idempotent when a session for the same ticket is still running;
    /// connecting to a different ticket tears the existing session down
    /// first. The result reflects the initial attempt; after a failed initial
    /// attempt, background reconnection keeps running up to the configured
    /// cap and surfaces its outcome through connection events.
    pub async fn connect(
        &self,
        ticket_id: Uuid,
        auth_token: impl Into<String>,
    ) -> Result<(), ChannelError> {
        let mut session = self.session.lock().await;

        if let Some(active) = session.as_ref() {
            let status = self.status_rx.borrow().status;
            let reusable = active.ticket_id == ticket_id
                && !active.task.is_finished()
                && !matches!(status, ChannelStatus::Failed | ChannelStatus::Idle);
            if reusable {
                tracing::debug!(ticket_id = %ticket_id, "connect: session already active");
                return Ok(());
            }
        }

        if let Some(old) = session.take() {
            tracing::info!(
                old_ticket_id = %old.ticket_id,
                ticket_id = %ticket_id,
                "Replacing channel session"
            );
            shutdown_session(old).await;
            self.messages.clear().await;
            self.typing.clear().await;
            self.events.clear().await;
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let ctx = SessionContext {
            ticket_id,
            auth_token: auth_token.into(),
            config: self.config.clone(),
            messages: Arc::clone(&self.messages),
            typing: Arc::clone(&self.typing),
            events: Arc::clone(&self.events),
            status_tx: self.status_tx.clone(),
        };
        let task = tokio::spawn(session::run_session(ctx, cmd_rx, ready_tx));
        *session = Some(ActiveSession {
            ticket_id,
            cmd_tx,
            task,
        });
        drop(session);

        match ready_rx.await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::NotRunning),
        }
    }

    /// Close the live channel; never retries, safe to call repeatedly
    pub async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        if let Some(active) = session.take() {
            tracing::info!(ticket_id = %active.ticket_id, "Disconnecting channel");
            shutdown_session(active).await;
        }
        drop(session);

        self.messages.clear().await;
        self.typing.clear().await;
        self.events.clear().await;
        let _ = self
            .status_tx
            .send(StatusSnapshot::idle(self.config.max_reconnect_attempts));
    }

    /// Write a chat message to the live channel
    ///
    /// Returns false when no session is connected or the write fails, so the
    /// caller can apply its fallback policy. Never returns an error.
    pub async fn send_chat(&self, content: impl Into<String>, options: SendOptions) -> bool {
        let (ticket_id, cmd_tx) = {
            let session = self.session.lock().await;
            let Some(active) = session.as_ref() else {
                return false;
            };
            (active.ticket_id, active.cmd_tx.clone())
        };

        if self.status_rx.borrow().status != ChannelStatus::Connected {
            tracing::debug!(ticket_id = %ticket_id, "send_chat: channel not connected");
            return false;
        }

        let frame = ClientFrame::Chat {
            ticket_id,
            content: content.into(),
            message_type: options.kind,
            is_ai: options.is_generated,
            feedback: options.feedback,
        };
        let (result_tx, result_rx) = oneshot::channel();
        if cmd_tx
            .send(SessionCommand::Send { frame, result_tx })
            .is_err()
        {
            return false;
        }
        result_rx.await.unwrap_or(false)
    }

    /// Signal that the local user is typing; silent no-op when not connected
    pub async fn send_typing(&self) {
        let (ticket_id, cmd_tx) = {
            let session = self.session.lock().await;
            let Some(active) = session.as_ref() else {
                return;
            };
            (active.ticket_id, active.cmd_tx.clone())
        };

        if self.status_rx.borrow().status != ChannelStatus::Connected {
            return;
        }
        let _ = cmd_tx.send(SessionCommand::SendBestEffort {
            frame: ClientFrame::Typing { ticket_id },
        });
    }

    /// Subscribe to inbound messages, optionally filtered by kind
    pub async fn subscribe_messages(
        &self,
        filter: Option<MessageKind>,
    ) -> Subscription<Message> {
        self.messages.subscribe(filter).await
    }

    /// Subscribe to inbound typing broadcasts
    pub async fn subscribe_typing(&self) -> Subscription<TypingSignal> {
        self.typing.subscribe(None).await
    }

    /// Subscribe to connection lifecycle events, optionally filtered
    pub async fn subscribe_events(
        &self,
        filter: Option<ConnectionEventKind>,
    ) -> Subscription<ConnectionEvent> {
        self.events.subscribe(filter).await
    }

    /// Current session status
    pub fn status(&self) -> StatusSnapshot {
        self.status_rx.borrow().clone()
    }

    /// Whether the channel is currently connected
    pub fn connected(&self) -> bool {
        self.status_rx.borrow().status == ChannelStatus::Connected
    }

    /// Watch status transitions
    pub fn watch_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_rx.clone()
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        if let Ok(mut session) = self.session.try_lock() {
            if let Some(active) = session.take() {
                let _ = active.cmd_tx.send(SessionCommand::Disconnect);
                active.task.abort();
            }
        }
    }
}

/// Ask the task to shut down cleanly; abort it if it does not exit in time
async fn shutdown_session(active: ActiveSession) {
    let _ = active.cmd_tx.send(SessionCommand::Disconnect);
    let mut task = active.task;
    if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
        task.abort();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn offline_config() -> Config {
        Config::for_endpoints("http://127.0.0.1:9", "ws://127.0.0.1:9/ws")
    }

    #[tokio::test]
    async fn test_send_without_session_returns_false() {
        let manager = ChannelManager::new(offline_config());
        assert!(!manager.send_chat("hello", SendOptions::default()).await);
    }

    #[tokio::test]
    async fn test_initial_status_is_idle() {
        let manager = ChannelManager::new(offline_config());
        let status = manager.status();
        assert_eq!(status.status, ChannelStatus::Idle);
        assert_eq!(status.ticket_id, None);
        assert_eq!(status.attempt_count, 0);
    }

    #[tokio::test]
    async fn test_disconnect_without_session_is_safe() {
        let manager = ChannelManager::new(offline_config());
        manager.disconnect().await;
        manager.disconnect().await;
        assert_eq!(manager.status().status, ChannelStatus::Idle);
    }

    #[tokio::test]
    async fn test_typing_without_session_is_a_noop() {
        let manager = ChannelManager::new(offline_config());
        manager.send_typing().await;
    }
}
