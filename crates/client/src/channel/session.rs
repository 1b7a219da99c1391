//! Channel session state machine
//!
//! One background task per ticket owns the WebSocket stream and every timer
//! attached to it: keepalive while connected, backoff sleeps while
//! reconnecting. Status transitions are published through a watch channel and
//! lifecycle events through the subscriber set, so no retry happens silently.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use ticketlink_protocol::{ClientFrame, Message, MessageKind, ServerFrame};

use crate::config::Config;

use super::dispatch::SubscriberSet;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Status & Events
// =============================================================================

/// Connection lifecycle of a channel session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Errored,
    Failed,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Idle => "idle",
            ChannelStatus::Connecting => "connecting",
            ChannelStatus::Connected => "connected",
            ChannelStatus::Reconnecting => "reconnecting",
            ChannelStatus::Errored => "errored",
            ChannelStatus::Failed => "failed",
        }
    }
}

/// Point-in-time view of the session exposed to callers
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub status: ChannelStatus,
    pub ticket_id: Option<Uuid>,
    pub attempt_count: u32,
    pub max_attempts: u32,
}

impl StatusSnapshot {
    pub(crate) fn idle(max_attempts: u32) -> Self {
        Self {
            status: ChannelStatus::Idle,
            ticket_id: None,
            attempt_count: 0,
            max_attempts,
        }
    }
}

/// Lifecycle events delivered to `subscribe_events` subscribers
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    Errored { reason: String },
    Reconnecting { attempt: u32, delay: Duration },
    ReconnectExhausted,
}

impl ConnectionEvent {
    pub fn kind(&self) -> ConnectionEventKind {
        match self {
            ConnectionEvent::Connected => ConnectionEventKind::Connected,
            ConnectionEvent::Disconnected => ConnectionEventKind::Disconnected,
            ConnectionEvent::Errored { .. } => ConnectionEventKind::Errored,
            ConnectionEvent::Reconnecting { .. } => ConnectionEventKind::Reconnecting,
            ConnectionEvent::ReconnectExhausted => ConnectionEventKind::ReconnectExhausted,
        }
    }
}

/// Filter key for connection-event subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEventKind {
    Connected,
    Disconnected,
    Errored,
    Reconnecting,
    ReconnectExhausted,
}

/// Inbound typing broadcast from another participant
#[derive(Debug, Clone, Copy)]
pub struct TypingSignal {
    pub ticket_id: Uuid,
    pub sender_id: Uuid,
}

/// Errors surfaced from `ChannelManager::connect`
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("WebSocket connect failed: {0}")]
    Connect(String),

    #[error("channel session is not running")]
    NotRunning,
}

// =============================================================================
// Commands & Context
// =============================================================================

/// Commands from the public handle to the session task
pub(crate) enum SessionCommand {
    /// Write a frame; replies with whether the write reached the socket
    Send {
        frame: ClientFrame,
        result_tx: oneshot::Sender<bool>,
    },
    /// Fire-and-forget write (typing signals)
    SendBestEffort { frame: ClientFrame },
    /// Clean shutdown, no reconnection
    Disconnect,
}

/// Everything the session task needs, captured at `connect` time
pub(crate) struct SessionContext {
    pub ticket_id: Uuid,
    pub auth_token: String,
    pub config: Config,
    pub messages: Arc<SubscriberSet<MessageKind, Message>>,
    pub typing: Arc<SubscriberSet<(), TypingSignal>>,
    pub events: Arc<SubscriberSet<ConnectionEventKind, ConnectionEvent>>,
    pub status_tx: watch::Sender<StatusSnapshot>,
}

// =============================================================================
// Session Task
// =============================================================================

/// Run one channel session to completion
///
/// `ready_tx` receives the outcome of the initial connection attempt; a
/// failed initial attempt still leaves reconnection running up to the cap.
pub(crate) async fn run_session(
    ctx: SessionContext,
    mut cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    ready_tx: oneshot::Sender<Result<(), ChannelError>>,
) {
    let mut attempt_count: u32 = 0;
    let mut stream: Option<WsStream> = None;

    set_status(&ctx, ChannelStatus::Connecting, attempt_count);
    match open_socket(&ctx).await {
        Ok(ws) => {
            stream = Some(ws);
            set_status(&ctx, ChannelStatus::Connected, 0);
            emit(&ctx, ConnectionEvent::Connected).await;
            tracing::info!(ticket_id = %ctx.ticket_id, "Channel connected");
            let _ = ready_tx.send(Ok(()));
        }
        Err(e) => {
            set_status(&ctx, ChannelStatus::Errored, attempt_count);
            emit(
                &ctx,
                ConnectionEvent::Errored {
                    reason: e.to_string(),
                },
            )
            .await;
            tracing::warn!(ticket_id = %ctx.ticket_id, error = %e, "Initial connection failed");
            let _ = ready_tx.send(Err(e));
        }
    }

    loop {
        if let Some(ws) = stream.as_mut() {
            match drive_connected(&ctx, ws, &mut cmd_rx).await {
                ConnectedExit::CleanShutdown => {
                    set_status(&ctx, ChannelStatus::Idle, 0);
                    emit(&ctx, ConnectionEvent::Disconnected).await;
                    tracing::info!(ticket_id = %ctx.ticket_id, "Channel disconnected");
                    return;
                }
                ConnectedExit::AbnormalClosure => {
                    stream = None;
                    set_status(&ctx, ChannelStatus::Reconnecting, attempt_count);
                    emit(&ctx, ConnectionEvent::Disconnected).await;
                }
            }
        } else {
            attempt_count += 1;
            if attempt_count > ctx.config.max_reconnect_attempts {
                set_status(&ctx, ChannelStatus::Failed, attempt_count - 1);
                emit(&ctx, ConnectionEvent::ReconnectExhausted).await;
                tracing::warn!(
                    ticket_id = %ctx.ticket_id,
                    max_attempts = ctx.config.max_reconnect_attempts,
                    "Reconnection attempts exhausted"
                );
                drain_failed(&mut cmd_rx).await;
                return;
            }

            let delay = reconnect_delay(ctx.config.reconnect_base_delay, attempt_count);
            set_status(&ctx, ChannelStatus::Reconnecting, attempt_count);
            emit(
                &ctx,
                ConnectionEvent::Reconnecting {
                    attempt: attempt_count,
                    delay,
                },
            )
            .await;
            tracing::info!(
                ticket_id = %ctx.ticket_id,
                attempt = attempt_count,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting after backoff"
            );

            if !backoff_sleep(&ctx, &mut cmd_rx, delay).await {
                // Teardown arrived while waiting; the in-flight attempt is abandoned
                set_status(&ctx, ChannelStatus::Idle, 0);
                return;
            }

            set_status(&ctx, ChannelStatus::Connecting, attempt_count);
            match open_socket(&ctx).await {
                Ok(ws) => {
                    stream = Some(ws);
                    attempt_count = 0;
                    set_status(&ctx, ChannelStatus::Connected, 0);
                    emit(&ctx, ConnectionEvent::Connected).await;
                    tracing::info!(ticket_id = %ctx.ticket_id, "Channel reconnected");
                }
                Err(e) => {
                    set_status(&ctx, ChannelStatus::Errored, attempt_count);
                    emit(
                        &ctx,
                        ConnectionEvent::Errored {
                            reason: e.to_string(),
                        },
                    )
                    .await;
                    tracing::warn!(
                        ticket_id = %ctx.ticket_id,
                        attempt = attempt_count,
                        error = %e,
                        "Reconnection attempt failed"
                    );
                }
            }
        }
    }
}

enum ConnectedExit {
    CleanShutdown,
    AbnormalClosure,
}

/// Multiplex the open socket: inbound frames, commands, keepalive
async fn drive_connected(
    ctx: &SessionContext,
    ws: &mut WsStream,
    cmd_rx: &mut mpsc::UnboundedReceiver<SessionCommand>,
) -> ConnectedExit {
    let period = ctx.config.keepalive_interval;
    let mut keepalive = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(SessionCommand::Send { frame, result_tx }) => {
                    let ok = write_frame(ws, &frame).await;
                    let _ = result_tx.send(ok);
                    if !ok {
                        return ConnectedExit::AbnormalClosure;
                    }
                }
                Some(SessionCommand::SendBestEffort { frame }) => {
                    if !write_frame(ws, &frame).await {
                        return ConnectedExit::AbnormalClosure;
                    }
                }
                Some(SessionCommand::Disconnect) | None => {
                    let _ = ws.close(None).await;
                    return ConnectedExit::CleanShutdown;
                }
            },

            _ = keepalive.tick() => {
                let frame = ClientFrame::Ping { ticket_id: ctx.ticket_id };
                if !write_frame(ws, &frame).await {
                    tracing::warn!(ticket_id = %ctx.ticket_id, "Keepalive write failed");
                    return ConnectedExit::AbnormalClosure;
                }
                tracing::debug!(ticket_id = %ctx.ticket_id, "Keepalive ping sent");
            }

            frame = ws.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    handle_frame(ctx, text.as_str()).await;
                }
                Some(Ok(WsMessage::Ping(payload))) => {
                    let _ = ws.send(WsMessage::Pong(payload)).await;
                }
                Some(Ok(WsMessage::Pong(_))) => {}
                Some(Ok(WsMessage::Close(_))) => {
                    tracing::info!(ticket_id = %ctx.ticket_id, "Server closed the channel");
                    return ConnectedExit::AbnormalClosure;
                }
                Some(Ok(_)) => {
                    // Binary frames are not part of the protocol
                }
                Some(Err(e)) => {
                    tracing::warn!(ticket_id = %ctx.ticket_id, error = %e, "WebSocket error");
                    return ConnectedExit::AbnormalClosure;
                }
                None => {
                    return ConnectedExit::AbnormalClosure;
                }
            },
        }
    }
}

/// Parse and route one inbound text frame
///
/// A malformed frame is logged and dropped; it never terminates the channel.
async fn handle_frame(ctx: &SessionContext, raw: &str) {
    match serde_json::from_str::<ServerFrame>(raw) {
        Ok(ServerFrame::Message { ticket_id, message }) => {
            if ticket_id != ctx.ticket_id {
                tracing::debug!(
                    ticket_id = %ticket_id,
                    session_ticket = %ctx.ticket_id,
                    "Ignoring broadcast for another ticket"
                );
                return;
            }
            let kind = message.kind;
            ctx.messages.publish(&kind, message).await;
        }
        Ok(ServerFrame::Pong) => {
            tracing::debug!(ticket_id = %ctx.ticket_id, "Keepalive pong received");
        }
        Ok(ServerFrame::Typing {
            ticket_id,
            sender_id,
        }) => {
            if ticket_id != ctx.ticket_id {
                return;
            }
            ctx.typing
                .publish(
                    &(),
                    TypingSignal {
                        ticket_id,
                        sender_id,
                    },
                )
                .await;
        }
        Err(e) => {
            tracing::warn!(
                ticket_id = %ctx.ticket_id,
                error = %e,
                frame = %raw,
                "Dropping malformed inbound frame"
            );
        }
    }
}

/// Sleep for the backoff delay while answering commands
///
/// Returns false when teardown was requested during the wait.
async fn backoff_sleep(
    ctx: &SessionContext,
    cmd_rx: &mut mpsc::UnboundedReceiver<SessionCommand>,
    delay: Duration,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(SessionCommand::Send { result_tx, .. }) => {
                    let _ = result_tx.send(false);
                }
                Some(SessionCommand::SendBestEffort { .. }) => {}
                Some(SessionCommand::Disconnect) | None => {
                    tracing::info!(ticket_id = %ctx.ticket_id, "Teardown during backoff");
                    return false;
                }
            },
            _ = &mut sleep => return true,
        }
    }
}

/// Answer commands after the session has failed terminally
async fn drain_failed(cmd_rx: &mut mpsc::UnboundedReceiver<SessionCommand>) {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            SessionCommand::Send { result_tx, .. } => {
                let _ = result_tx.send(false);
            }
            SessionCommand::SendBestEffort { .. } => {}
            SessionCommand::Disconnect => return,
        }
    }
}

/// Open and upgrade the WebSocket within the configured timeout
async fn open_socket(ctx: &SessionContext) -> Result<WsStream, ChannelError> {
    let url = format!(
        "{}?ticket_id={}&token={}",
        ctx.config.ws_url, ctx.ticket_id, ctx.auth_token
    );
    match tokio::time::timeout(ctx.config.connect_timeout, connect_async(url.as_str())).await {
        Ok(Ok((ws, _response))) => Ok(ws),
        Ok(Err(e)) => Err(ChannelError::Connect(e.to_string())),
        Err(_) => Err(ChannelError::ConnectTimeout(ctx.config.connect_timeout)),
    }
}

/// Serialize and write one frame; false when the write did not reach the socket
async fn write_frame(ws: &mut WsStream, frame: &ClientFrame) -> bool {
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = ?e, "Failed to serialize outbound frame");
            return false;
        }
    };
    match ws.send(WsMessage::Text(json.into())).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to write frame");
            false
        }
    }
}

fn set_status(ctx: &SessionContext, status: ChannelStatus, attempt_count: u32) {
    let _ = ctx.status_tx.send(StatusSnapshot {
        status,
        ticket_id: Some(ctx.ticket_id),
        attempt_count,
        max_attempts: ctx.config.max_reconnect_attempts,
    });
    tracing::debug!(
        ticket_id = %ctx.ticket_id,
        status = status.as_str(),
        attempt_count,
        "Channel status"
    );
}

async fn emit(ctx: &SessionContext, event: ConnectionEvent) {
    let kind = event.kind();
    ctx.events.publish(&kind, event).await;
}

/// Delay before reconnection attempt `attempt` (1-based): base × 2^(attempt−1)
pub(crate) fn reconnect_delay(base: Duration, attempt: u32) -> Duration {
    use tokio_retry::strategy::ExponentialBackoff;

    let base_ms = base.as_millis().max(2) as u64;
    ExponentialBackoff::from_millis(2)
        .factor(base_ms / 2)
        .max_delay(Duration::from_secs(60))
        .nth(attempt.saturating_sub(1) as usize)
        .unwrap_or(base)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delays_double_from_base() {
        let base = Duration::from_secs(1);
        let delays: Vec<u64> = (1..=5)
            .map(|attempt| reconnect_delay(base, attempt).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
    }

    #[test]
    fn test_backoff_respects_small_bases() {
        let base = Duration::from_millis(40);
        assert_eq!(reconnect_delay(base, 1), Duration::from_millis(40));
        assert_eq!(reconnect_delay(base, 2), Duration::from_millis(80));
        assert_eq!(reconnect_delay(base, 3), Duration::from_millis(160));
    }

    #[test]
    fn test_backoff_is_capped() {
        let base = Duration::from_secs(1);
        assert_eq!(reconnect_delay(base, 10), Duration::from_secs(60));
    }

    #[test]
    fn test_event_kind_mapping() {
        assert_eq!(
            ConnectionEvent::ReconnectExhausted.kind(),
            ConnectionEventKind::ReconnectExhausted
        );
        assert_eq!(
            ConnectionEvent::Errored {
                reason: "boom".to_string()
            }
            .kind(),
            ConnectionEventKind::Errored
        );
    }

    #[test]
    fn test_status_as_str() {
        assert_eq!(ChannelStatus::Reconnecting.as_str(), "reconnecting");
        assert_eq!(ChannelStatus::Failed.as_str(), "failed");
    }
}
