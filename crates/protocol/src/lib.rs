//! TicketLink Shared Protocol Types
//!
//! This crate contains the message data model and the JSON wire frames for
//! the live ticket channel, shared by the client and by test fixtures that
//! emulate the server side of the protocol.

pub mod frames;
pub mod message;

pub use frames::{ClientFrame, ServerFrame};
pub use message::{Feedback, Message, MessageKind, SenderRole};
