//! TicketLink Client Library
//!
//! Real-time transport for support-ticket conversations:
//!
//! - **channel**: one WebSocket session per ticket with keepalive and
//!   bounded exponential-backoff reconnection
//! - **conversation**: merges paginated history with the live stream into
//!   one ordered, deduplicated view and applies the send/feedback policies
//! - **api**: the request/response surface used for history, the send
//!   fallback path, and feedback updates

pub mod api;
pub mod channel;
pub mod config;
pub mod conversation;
pub mod error;

pub use api::SupportApi;
pub use channel::{ChannelManager, ChannelStatus, ConnectionEvent, ConnectionEventKind};
pub use config::Config;
pub use conversation::{Conversation, ConversationSnapshot, SendError};
pub use error::{ClientError, ClientResult};
