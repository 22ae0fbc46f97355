use async_trait::async_trait;
use glucmon_common::types::Alert;
use std::sync::Arc;

use crate::error::Result;
use crate::message::{Embed, MessageData};
use crate::surface::ChatSurface;
use crate::utils::{truncate_string, MAX_FIELD_VALUE_LENGTH};
use crate::NotificationChannel;

/// Posts alerts to a named channel of a chat surface, pinging everyone.
pub struct ChatAlertChannel {
    surface: Arc<dyn ChatSurface>,
    channel: String,
}

impl ChatAlertChannel {
    pub fn new(surface: Arc<dyn ChatSurface>, channel: &str) -> Self {
        Self {
            surface,
            channel: channel.to_string(),
        }
    }
}

/// Builds the alert message: `@everyone` plus one warning field.
pub fn alert_message(alert: &Alert) -> MessageData {
    let embed = Embed::default().with_field(
        format!("⚠️ {}", alert.label),
        truncate_string(&alert.reason, MAX_FIELD_VALUE_LENGTH),
        false,
    );
    MessageData {
        content: "@everyone".to_string(),
        embeds: vec![embed],
        files: Vec::new(),
        mention_everyone: true,
    }
}

#[async_trait]
impl NotificationChannel for ChatAlertChannel {
    async fn send(&self, alert: &Alert) -> Result<()> {
        let message_id = self
            .surface
            .send_message(&self.channel, &alert_message(alert))
            .await?;
        tracing::debug!(
            channel = %self.channel,
            message_id = %message_id,
            label = %alert.label,
            "Alert posted"
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "chat"
    }
}
