use glucmon_common::types::Alert;
use std::time::Duration;

use crate::NotificationChannel;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Fans an alert out to every configured channel.
pub struct NotificationManager {
    channels: Vec<Box<dyn NotificationChannel>>,
    max_attempts: u32,
}

impl NotificationManager {
    pub fn new(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self {
            channels,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Sends `alert` to all channels, retrying each with exponential backoff.
    /// Returns how many channels accepted it. Failures are logged, never raised.
    pub async fn notify(&self, alert: &Alert) -> usize {
        let mut delivered = 0;
        for channel in &self.channels {
            if self.send_with_retry(channel.as_ref(), alert).await {
                delivered += 1;
            }
        }
        delivered
    }

    async fn send_with_retry(&self, channel: &dyn NotificationChannel, alert: &Alert) -> bool {
        for attempt in 0..self.max_attempts {
            match channel.send(alert).await {
                Ok(()) => {
                    tracing::info!(
                        channel = channel.channel_name(),
                        alert_id = %alert.id,
                        label = %alert.label,
                        "Alert notification sent"
                    );
                    return true;
                }
                Err(e) if attempt + 1 < self.max_attempts => {
                    tracing::warn!(
                        channel = channel.channel_name(),
                        attempt = attempt + 1,
                        error = %e,
                        "Alert notification failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempt))).await;
                }
                Err(e) => {
                    tracing::error!(
                        channel = channel.channel_name(),
                        alert_id = %alert.id,
                        error = %e,
                        "Failed to send alert notification"
                    );
                }
            }
        }
        false
    }
}
