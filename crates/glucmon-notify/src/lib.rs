//! Chat surface access and alert delivery.
//!
//! [`surface::ChatSurface`] is the narrow set of message operations the bot
//! needs on named channels. [`channels::discord::DiscordSurface`] implements
//! it over the Discord REST API and [`channels::memory::MemorySurface`] keeps
//! messages in process. Alerts go out through [`NotificationChannel`]
//! implementations managed by [`manager::NotificationManager`].

pub mod channels;
pub mod error;
pub mod interaction;
pub mod manager;
pub mod message;
pub mod surface;
pub mod utils;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use glucmon_common::types::Alert;

use crate::error::Result;

/// A delivery channel for alert notifications.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Delivers one alert.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying surface rejects the message.
    async fn send(&self, alert: &Alert) -> Result<()>;

    /// Returns the channel type name (e.g., `"chat"`).
    fn channel_name(&self) -> &str;
}
