use async_trait::async_trait;

use crate::error::Result;
use crate::message::{MessageData, PostedMessage};

/// Message operations on named channels.
#[async_trait]
pub trait ChatSurface: Send + Sync {
    /// Posts a message and returns its id.
    async fn send_message(&self, channel: &str, message: &MessageData) -> Result<String>;

    /// Up to `limit` messages, newest first.
    async fn recent_messages(&self, channel: &str, limit: usize) -> Result<Vec<PostedMessage>>;

    async fn latest_message(&self, channel: &str) -> Result<Option<PostedMessage>> {
        Ok(self.recent_messages(channel, 1).await?.into_iter().next())
    }

    async fn delete_message(&self, channel: &str, message_id: &str) -> Result<()>;

    /// Replaces the content and embeds of an existing message.
    async fn edit_message(
        &self,
        channel: &str,
        message_id: &str,
        message: &MessageData,
    ) -> Result<()>;
}
