//! Collaborator API client
//!
//! Request/response surface consumed by the conversation engine: paginated
//! message history, the send fallback path, and feedback updates.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ticketlink_protocol::{Feedback, Message, MessageKind};

use crate::error::{ClientError, ClientResult};

/// Timeout for API requests (30 seconds)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Request/Response Types
// =============================================================================

/// One page of a ticket's message history
#[derive(Debug, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub pagination: PageInfo,
}

#[derive(Debug, Deserialize)]
pub struct PageInfo {
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    content: &'a str,
    message_type: MessageKind,
    #[serde(rename = "isAI")]
    is_ai: bool,
}

#[derive(Debug, Serialize)]
struct FeedbackRequest {
    feedback: Feedback,
}

/// Error envelope returned by the API
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for the support API
pub struct SupportApi {
    http: Client,
    base_url: String,
    auth_token: String,
}

impl SupportApi {
    /// Create a new API client
    #[allow(clippy::expect_used)] // HTTP client creation failure is a fatal system error
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .pool_max_idle_per_host(10)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: auth_token.into(),
        }
    }

    /// Fetch one page of a ticket's message history
    pub async fn fetch_messages(
        &self,
        ticket_id: Uuid,
        page: u32,
        per_page: u32,
    ) -> ClientResult<MessagePage> {
        let url = format!("{}/tickets/{}/messages", self.base_url, ticket_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.auth_token)
            .query(&[("page", page), ("per_page", per_page)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.json::<MessagePage>().await?)
    }

    /// Send a message through the request/response path
    ///
    /// Returns the stored message; it already carries its final id.
    pub async fn send_message(
        &self,
        ticket_id: Uuid,
        content: &str,
        kind: MessageKind,
        is_generated: bool,
    ) -> ClientResult<Message> {
        let url = format!("{}/tickets/{}/messages", self.base_url, ticket_id);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.auth_token)
            .json(&SendMessageRequest {
                content,
                message_type: kind,
                is_ai: is_generated,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.json::<Message>().await?)
    }

    /// Update the feedback recorded against a message
    pub async fn update_feedback(
        &self,
        ticket_id: Uuid,
        message_id: Uuid,
        feedback: Feedback,
    ) -> ClientResult<()> {
        let url = format!(
            "{}/tickets/{}/messages/{}/feedback",
            self.base_url, ticket_id, message_id
        );
        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.auth_token)
            .json(&FeedbackRequest { feedback })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }
}

/// Map a non-2xx response into [`ClientError::Api`], using the API's error
/// envelope when one is present
async fn error_from_response(response: reqwest::Response) -> ClientError {
    let status = response.status();
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error.message,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    };
    ClientError::Api {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn stored_message_json(ticket_id: Uuid, content: &str) -> String {
        let message = Message {
            id: Uuid::new_v4(),
            ticket_id,
            sender_id: Some(Uuid::new_v4()),
            sender_role: ticketlink_protocol::SenderRole::EndUser,
            content: content.to_string(),
            kind: MessageKind::UserMessage,
            is_generated: false,
            feedback: Feedback::None,
            timestamp: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        };
        serde_json::to_string(&message).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_messages_parses_page() {
        let mut server = mockito::Server::new_async().await;
        let ticket_id = Uuid::new_v4();

        let body = format!(
            r#"{{"messages":[{}],"pagination":{{"has_more":true}}}}"#,
            stored_message_json(ticket_id, "first message")
        );
        let mock = server
            .mock("GET", format!("/tickets/{}/messages", ticket_id).as_str())
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("page".into(), "1".into()),
                mockito::Matcher::UrlEncoded("per_page".into(), "50".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let api = SupportApi::new(server.url(), "test-token");
        let page = api.fetch_messages(ticket_id, 1, 50).await.unwrap();

        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].content, "first message");
        assert!(page.pagination.has_more);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_message_returns_stored_message() {
        let mut server = mockito::Server::new_async().await;
        let ticket_id = Uuid::new_v4();

        let mock = server
            .mock("POST", format!("/tickets/{}/messages", ticket_id).as_str())
            .match_header("authorization", "Bearer test-token")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(stored_message_json(ticket_id, "please help"))
            .create_async()
            .await;

        let api = SupportApi::new(server.url(), "test-token");
        let message = api
            .send_message(ticket_id, "please help", MessageKind::UserMessage, false)
            .await
            .unwrap();

        assert_eq!(message.ticket_id, ticket_id);
        assert_eq!(message.content, "please help");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_envelope_is_mapped() {
        let mut server = mockito::Server::new_async().await;
        let ticket_id = Uuid::new_v4();

        let _mock = server
            .mock("GET", format!("/tickets/{}/messages", ticket_id).as_str())
            .match_query(mockito::Matcher::Any)
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"code":"FORBIDDEN","message":"Access denied to ticket"}}"#)
            .create_async()
            .await;

        let api = SupportApi::new(server.url(), "test-token");
        let err = api.fetch_messages(ticket_id, 1, 50).await.unwrap_err();

        match err {
            ClientError::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Access denied to ticket");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_feedback_failure_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let ticket_id = Uuid::new_v4();
        let message_id = Uuid::new_v4();

        let _mock = server
            .mock(
                "PUT",
                format!("/tickets/{}/messages/{}/feedback", ticket_id, message_id).as_str(),
            )
            .with_status(500)
            .create_async()
            .await;

        let api = SupportApi::new(server.url(), "test-token");
        let err = api
            .update_feedback(ticket_id, message_id, Feedback::Up)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Api { status: 500, .. }));
        assert!(err.is_transient());
    }
}
