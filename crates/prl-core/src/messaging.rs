//! Outbound side of the bot front end.

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    Result,
};

/// Cross-messenger port for replies.
///
/// Telegram is the only implementation; command handling in this crate talks to it
/// through this trait so it can be exercised without a bot token.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;
}
