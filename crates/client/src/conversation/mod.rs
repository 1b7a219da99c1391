//! Conversation reconciliation for ticket views
//!
//! Produces one ordered, deduplicated message sequence from two producers
//! that may race, duplicate, or arrive out of order:
//!
//! - **Timeline**: keyed, ordered merge target for history and live messages
//! - **Typing**: active-typing roster with a bounded lifetime per sender
//! - **Engine**: wires the channel, the history fetch, and the send/feedback
//!   policies together and publishes consistent snapshots to the UI

pub mod engine;
pub mod timeline;
pub mod typing;

pub use engine::{Conversation, ConversationSnapshot, SendError};
pub use timeline::Timeline;
pub use typing::TypingRoster;
