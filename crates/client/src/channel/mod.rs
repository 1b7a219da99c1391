//! Live channel support for real-time ticket messaging
//!
//! Client-side counterpart of the platform's WebSocket layer:
//!
//! - **Session**: one background task per ticket that owns the socket, the
//!   keepalive timer, and the reconnection state machine
//! - **Manager**: the owned, per-ticket-view handle (connect/send/subscribe)
//! - **Dispatch**: filtered fan-out of inbound traffic to subscribers
//!
//! # Architecture
//!
//! The manager never touches the socket directly; it sends commands to the
//! session task over a channel and observes status through a watch channel.
//! Dropping the manager (or calling `disconnect`) tears the task down along
//! with every timer it owns.

pub mod dispatch;
pub mod manager;
pub mod session;

pub use dispatch::Subscription;
pub use manager::{ChannelManager, SendOptions};
pub use session::{
    ChannelError, ChannelStatus, ConnectionEvent, ConnectionEventKind, StatusSnapshot,
    TypingSignal,
};
