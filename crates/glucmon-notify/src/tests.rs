use async_trait::async_trait;
use chrono::Utc;
use glucmon_common::types::{Alert, AlertLabel};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::channels::chat::{alert_message, ChatAlertChannel};
use crate::channels::memory::MemorySurface;
use crate::error::{NotifyError, Result};
use crate::manager::NotificationManager;
use crate::message::{Attachment, Embed, MessageData};
use crate::surface::ChatSurface;
use crate::NotificationChannel;

fn low_alert() -> Alert {
    Alert {
        id: "7156".into(),
        time: Utc::now(),
        label: AlertLabel::LowGlucose,
        reason: "current value: 3.50 ≤ 4.00".into(),
    }
}

/// Fails the first `failures` sends, then succeeds.
struct FlakyChannel {
    failures: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl NotificationChannel for FlakyChannel {
    async fn send(&self, _alert: &Alert) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(NotifyError::RateLimited { retry_after_ms: 10 });
        }
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "flaky"
    }
}

#[test]
fn alert_message_pings_everyone_with_reason() {
    let message = alert_message(&low_alert());
    assert_eq!(message.content, "@everyone");
    assert!(message.mention_everyone);
    assert!(message.files.is_empty());
    let field = &message.embeds[0].fields[0];
    assert_eq!(field.name, "⚠️ Low Glucose");
    assert_eq!(field.value, "current value: 3.50 ≤ 4.00");
}

#[tokio::test]
async fn chat_channel_posts_to_its_channel() {
    let surface = Arc::new(MemorySurface::new());
    let channel = ChatAlertChannel::new(surface.clone(), "alerts");
    channel.send(&low_alert()).await.unwrap();

    assert!(surface.messages("display").is_empty());
    let posted = surface.messages("alerts");
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].content, "@everyone");
}

#[tokio::test]
async fn manager_retries_until_channel_accepts() {
    let flaky = Arc::new(FlakyChannel {
        failures: 2,
        calls: AtomicUsize::new(0),
    });

    struct Shared(Arc<FlakyChannel>);

    #[async_trait]
    impl NotificationChannel for Shared {
        async fn send(&self, alert: &Alert) -> Result<()> {
            self.0.send(alert).await
        }
        fn channel_name(&self) -> &str {
            self.0.channel_name()
        }
    }

    let manager = NotificationManager::new(vec![Box::new(Shared(flaky.clone()))]);
    assert_eq!(manager.notify(&low_alert()).await, 1);
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn manager_gives_up_after_max_attempts() {
    let surface = Arc::new(MemorySurface::new());
    surface.set_failing(true);
    let manager = NotificationManager::new(vec![Box::new(ChatAlertChannel::new(
        surface.clone(),
        "alerts",
    ))])
    .with_max_attempts(2);

    assert_eq!(manager.notify(&low_alert()).await, 0);
    assert_eq!(surface.send_count(), 0);
}

#[tokio::test]
async fn memory_surface_lists_newest_first() {
    let surface = MemorySurface::new();
    for title in ["first", "second", "third"] {
        let message = MessageData {
            embeds: vec![Embed::titled(title)],
            ..MessageData::default()
        };
        surface.send_message("display", &message).await.unwrap();
    }

    let recent = surface.recent_messages("display", 2).await.unwrap();
    let titles: Vec<_> = recent.iter().filter_map(|m| m.title()).collect();
    assert_eq!(titles, vec!["third", "second"]);

    let latest = surface.latest_message("display").await.unwrap().unwrap();
    assert_eq!(latest.title(), Some("third"));
    assert!(surface.latest_message("reports").await.unwrap().is_none());
}

#[tokio::test]
async fn memory_surface_edits_and_deletes() {
    let surface = MemorySurface::new();
    let id = surface
        .send_message(
            "display",
            &MessageData {
                embeds: vec![Embed::titled("old").with_attachment_image("daily.png")],
                files: vec![Attachment {
                    name: "daily.png".into(),
                    data: vec![0x89, 0x50],
                }],
                ..MessageData::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(surface.latest_attachments("display"), vec!["daily.png"]);

    let edited = MessageData {
        embeds: vec![Embed::titled("new")],
        ..MessageData::default()
    };
    surface.edit_message("display", &id, &edited).await.unwrap();
    assert_eq!(surface.messages("display")[0].title(), Some("new"));
    assert!(surface.edit_message("display", "missing", &edited).await.is_err());

    surface.delete_message("display", &id).await.unwrap();
    surface.delete_message("display", &id).await.unwrap();
    assert!(surface.messages("display").is_empty());
    assert_eq!(surface.delete_count(), 1);
}
