//! Wire frames for the live ticket channel
//!
//! JSON text frames tagged by `type`, matching the server's WebSocket event
//! vocabulary. Both directions derive `Serialize` and `Deserialize` so test
//! fixtures can play the opposite role.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{Feedback, Message, MessageKind};

// =============================================================================
// Client-to-Server Frames
// =============================================================================

/// Frames sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// New chat message for a ticket
    Chat {
        ticket_id: Uuid,
        content: String,
        message_type: MessageKind,
        #[serde(rename = "isAI")]
        is_ai: bool,
        feedback: Feedback,
    },

    /// The local user is composing a reply
    Typing { ticket_id: Uuid },

    /// Application-level keepalive probe
    Ping { ticket_id: Uuid },
}

// =============================================================================
// Server-to-Client Frames
// =============================================================================

/// Frames sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Message broadcast for a subscribed ticket
    Message { ticket_id: Uuid, message: Message },

    /// Keepalive acknowledgement
    Pong,

    /// Another participant is composing
    Typing { ticket_id: Uuid, sender_id: Uuid },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::SenderRole;
    use time::OffsetDateTime;

    #[test]
    fn test_chat_frame_serialization() {
        let frame = ClientFrame::Chat {
            ticket_id: Uuid::nil(),
            content: "hello".to_string(),
            message_type: MessageKind::UserMessage,
            is_ai: false,
            feedback: Feedback::None,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"chat""#));
        assert!(json.contains(r#""isAI":false"#));
        assert!(json.contains(r#""feedback":"none""#));
    }

    #[test]
    fn test_ping_frame_serialization() {
        let frame = ClientFrame::Ping {
            ticket_id: Uuid::nil(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(
            json,
            r#"{"type":"ping","ticket_id":"00000000-0000-0000-0000-000000000000"}"#
        );
    }

    #[test]
    fn test_message_broadcast_deserialization() {
        let ticket_id = Uuid::new_v4();
        let message = Message {
            id: Uuid::new_v4(),
            ticket_id,
            sender_id: Some(Uuid::new_v4()),
            sender_role: SenderRole::EndUser,
            content: "my laptop won't boot".to_string(),
            kind: MessageKind::UserMessage,
            is_generated: false,
            feedback: Feedback::None,
            timestamp: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        };
        let json = serde_json::to_string(&ServerFrame::Message {
            ticket_id,
            message: message.clone(),
        })
        .unwrap();

        match serde_json::from_str::<ServerFrame>(&json).unwrap() {
            ServerFrame::Message {
                ticket_id: tid,
                message: parsed,
            } => {
                assert_eq!(tid, ticket_id);
                assert_eq!(parsed.id, message.id);
                assert_eq!(parsed.content, message.content);
            }
            other => panic!("Expected Message frame, got {:?}", other),
        }
    }

    #[test]
    fn test_pong_deserialization() {
        let frame: ServerFrame = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
        assert!(matches!(frame, ServerFrame::Pong));
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        assert!(serde_json::from_str::<ServerFrame>("not json").is_err());
        assert!(serde_json::from_str::<ServerFrame>(r#"{"type":"launch_missiles"}"#).is_err());
    }
}
