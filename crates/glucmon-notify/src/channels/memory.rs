use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{NotifyError, Result};
use crate::message::{MessageData, PostedMessage};
use crate::surface::ChatSurface;

#[derive(Debug, Clone)]
struct StoredMessage {
    posted: PostedMessage,
    attachments: Vec<String>,
}

/// In-process [`ChatSurface`]. Used when no chat platform is configured and
/// by tests.
///
/// Every channel name is accepted. Messages are kept oldest first.
#[derive(Debug, Default)]
pub struct MemorySurface {
    channels: Mutex<HashMap<String, Vec<StoredMessage>>>,
    next_id: AtomicU64,
    sends: AtomicUsize,
    deletes: AtomicUsize,
    failing: AtomicBool,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every operation fails with a 503 API error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Messages currently in `channel`, oldest first.
    pub fn messages(&self, channel: &str) -> Vec<PostedMessage> {
        self.lock()
            .get(channel)
            .map(|msgs| msgs.iter().map(|m| m.posted.clone()).collect())
            .unwrap_or_default()
    }

    /// Attachment file names of the newest message in `channel`.
    pub fn latest_attachments(&self, channel: &str) -> Vec<String> {
        self.lock()
            .get(channel)
            .and_then(|msgs| msgs.last())
            .map(|m| m.attachments.clone())
            .unwrap_or_default()
    }

    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<StoredMessage>>> {
        self.channels.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::ApiError {
                service: "memory".to_string(),
                status: 503,
                body: "surface unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChatSurface for MemorySurface {
    async fn send_message(&self, channel: &str, message: &MessageData) -> Result<String> {
        self.check_available()?;
        let id = (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        let posted = PostedMessage {
            id: id.clone(),
            content: message.content.clone(),
            embeds: message.embeds.clone(),
        };
        tracing::info!(
            channel,
            message_id = %id,
            title = posted.title().unwrap_or(""),
            files = message.files.len(),
            "Message posted to in-memory surface"
        );
        self.lock()
            .entry(channel.to_string())
            .or_default()
            .push(StoredMessage {
                posted,
                attachments: message.files.iter().map(|f| f.name.clone()).collect(),
            });
        self.sends.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn recent_messages(&self, channel: &str, limit: usize) -> Result<Vec<PostedMessage>> {
        self.check_available()?;
        Ok(self
            .lock()
            .get(channel)
            .map(|msgs| {
                msgs.iter()
                    .rev()
                    .take(limit)
                    .map(|m| m.posted.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_message(&self, channel: &str, message_id: &str) -> Result<()> {
        self.check_available()?;
        if let Some(msgs) = self.lock().get_mut(channel) {
            let before = msgs.len();
            msgs.retain(|m| m.posted.id != message_id);
            if msgs.len() < before {
                self.deletes.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    async fn edit_message(
        &self,
        channel: &str,
        message_id: &str,
        message: &MessageData,
    ) -> Result<()> {
        self.check_available()?;
        let mut channels = self.lock();
        let stored = channels
            .get_mut(channel)
            .and_then(|msgs| msgs.iter_mut().find(|m| m.posted.id == message_id))
            .ok_or_else(|| NotifyError::ApiError {
                service: "memory".to_string(),
                status: 404,
                body: format!("unknown message {message_id}"),
            })?;
        stored.posted.content = message.content.clone();
        stored.posted.embeds = message.embeds.clone();
        Ok(())
    }
}
