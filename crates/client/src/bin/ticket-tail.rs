//! Tail a ticket's reconciled conversation from the terminal
//!
//! Operational debug utility: connects the live channel, loads history, and
//! re-renders the conversation whenever the snapshot changes.
//!
//! ```text
//! TICKETLINK_API_URL=... TICKETLINK_WS_URL=... TICKETLINK_TOKEN=... \
//!     ticket-tail <ticket-id>
//! ```

use anyhow::{Context, Result};
use uuid::Uuid;

use ticketlink_client::{Config, Conversation, ConversationSnapshot, SupportApi};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let ticket_id: Uuid = std::env::args()
        .nth(1)
        .context("usage: ticket-tail <ticket-id>")?
        .parse()
        .context("invalid ticket id")?;
    let token = std::env::var("TICKETLINK_TOKEN").context("TICKETLINK_TOKEN is required")?;

    let config = Config::from_env()?;
    let api = SupportApi::new(config.api_base_url.clone(), token.clone());
    let conversation = Conversation::open(api, config, ticket_id, &token)
        .await
        .context("failed to open conversation")?;

    let mut snapshots = conversation.subscribe();
    loop {
        render(&snapshots.borrow_and_update().clone());
        if snapshots.changed().await.is_err() {
            break;
        }
    }

    Ok(())
}

fn render(snapshot: &ConversationSnapshot) {
    println!(
        "── {} · {} message(s) · {} typing ──",
        snapshot.status.as_str(),
        snapshot.messages.len(),
        snapshot.typing.len()
    );
    for message in &snapshot.messages {
        println!(
            "{} [{}] {}",
            message.timestamp,
            message.sender_role.as_str(),
            message.content
        );
    }
}
