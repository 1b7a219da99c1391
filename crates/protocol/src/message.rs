//! Message data model for ticket conversations
//!
//! Mirrors the server's stored representation. The server-assigned `id` is
//! the sole deduplication key and never changes once assigned.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    EndUser,
    ItAgent,
    HrAgent,
    Admin,
    System,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderRole::EndUser => "end_user",
            SenderRole::ItAgent => "it_agent",
            SenderRole::HrAgent => "hr_agent",
            SenderRole::Admin => "admin",
            SenderRole::System => "system",
        }
    }
}

/// Message classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    UserMessage,
    AgentMessage,
    SystemMessage,
}

/// Quality feedback recorded against a message
///
/// Mutable after creation; absent on the wire means [`Feedback::None`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    #[default]
    None,
    Up,
    Down,
}

impl Feedback {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feedback::None => "none",
            Feedback::Up => "up",
            Feedback::Down => "down",
        }
    }
}

/// A unit of conversation within one ticket
///
/// `timestamp` is the authoritative ordering key. It is non-decreasing per
/// sender but not across senders; ordering across senders is best-effort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub ticket_id: Uuid,
    /// `None` for system-originated messages
    #[serde(default)]
    pub sender_id: Option<Uuid>,
    pub sender_role: SenderRole,
    pub content: String,
    #[serde(rename = "message_type")]
    pub kind: MessageKind,
    /// True when authored by an automated assistant
    #[serde(rename = "isAI", default)]
    pub is_generated: bool,
    #[serde(default)]
    pub feedback: Feedback,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}
