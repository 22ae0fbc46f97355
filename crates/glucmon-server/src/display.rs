//! Keeps a single live status message in the display channel.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use glucmon_common::types::{Reading, Visibility};
use glucmon_notify::error::NotifyError;
use glucmon_notify::message::{Attachment, Embed, MessageData};
use glucmon_notify::surface::ChatSurface;
use glucmon_storage::StorageError;
use std::sync::{Arc, Mutex};

use crate::chart::{render_attachment, ChartRenderer};
use crate::description::describe;
use crate::DisplayStore;

pub const TITLE_FORMAT: &str = "%Y-%m-%d %I:%M %p";

/// How many old messages are cleared before publishing.
const CLEAR_LIMIT: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("Display: no readings in the last {hours} hours")]
    NoReadings { hours: i64 },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Surface(#[from] NotifyError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Skip when the live message already shows the newest reading.
    IfStale,
    /// Republish regardless, e.g. after the activity log changed.
    Always,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    UpToDate,
    Published { message_id: String },
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub channel: String,
    pub tz: FixedOffset,
    pub lookback: Duration,
    pub log_limit: usize,
}

pub struct DisplayReconciler {
    store: Arc<dyn DisplayStore>,
    surface: Arc<dyn ChatSurface>,
    chart: Option<Arc<dyn ChartRenderer>>,
    settings: DisplaySettings,
    visibility: Mutex<Visibility>,
    // 同一进程内串行化发布，避免残留两条实时消息
    publish: tokio::sync::Mutex<()>,
}

impl DisplayReconciler {
    pub fn new(
        store: Arc<dyn DisplayStore>,
        surface: Arc<dyn ChatSurface>,
        chart: Option<Arc<dyn ChartRenderer>>,
        settings: DisplaySettings,
    ) -> Self {
        Self {
            store,
            surface,
            chart,
            settings,
            visibility: Mutex::new(Visibility::default()),
            publish: tokio::sync::Mutex::new(()),
        }
    }

    pub fn visibility(&self) -> Visibility {
        *self.visibility.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        *self.visibility.lock().unwrap_or_else(|p| p.into_inner()) = visibility;
    }

    pub fn title_for(&self, reading: &Reading) -> String {
        format_title(reading.time, &self.settings.tz)
    }

    pub async fn update(&self, mode: UpdateMode) -> Result<UpdateOutcome, DisplayError> {
        let _guard = self.publish.lock().await;
        let now = Utc::now();
        let start = now - self.settings.lookback;

        let readings = self.store.readings_between(start, now).await?;
        let latest = readings.last().ok_or(DisplayError::NoReadings {
            hours: self.settings.lookback.num_hours(),
        })?;
        let title = self.title_for(latest);

        if mode == UpdateMode::IfStale && self.is_current(&title).await {
            tracing::debug!(title = %title, "Display up to date, skipping");
            return Ok(UpdateOutcome::UpToDate);
        }

        let image = match &self.chart {
            Some(chart) => {
                render_attachment(&*self.store, || chart.plot_daily(start, now)).await
            }
            None => None,
        };

        let doses = self.store.doses_between(start, now).await?;
        let intakes = self.store.intakes_between(start, now).await?;
        let description = describe(
            &doses,
            &intakes,
            self.visibility(),
            self.settings.log_limit,
            &self.settings.tz,
        );

        let message = live_message(title, latest, description, image);
        let message_id = self.publish(&message).await?;
        tracing::info!(message_id = %message_id, mmol = latest.mmol, "Display updated");
        Ok(UpdateOutcome::Published { message_id })
    }

    /// True only when the channel holds a single message carrying `title`.
    async fn is_current(&self, title: &str) -> bool {
        match self.surface.recent_messages(&self.settings.channel, 2).await {
            Ok(messages) => match messages.as_slice() {
                [only] => only.title() == Some(title),
                [] => false,
                _ => {
                    tracing::warn!(count = messages.len(), "Display channel holds leftover messages");
                    false
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Unable to read current display message");
                false
            }
        }
    }

    /// Clears every message in the channel, then sends `message`.
    async fn publish(&self, message: &MessageData) -> Result<String, DisplayError> {
        let channel = &self.settings.channel;
        let previous = self.surface.recent_messages(channel, CLEAR_LIMIT).await?;
        for old in &previous {
            self.surface.delete_message(channel, &old.id).await?;
        }
        Ok(self.surface.send_message(channel, message).await?)
    }
}

fn live_message(
    title: String,
    latest: &Reading,
    description: String,
    image: Option<Attachment>,
) -> MessageData {
    let mut embed = Embed::titled(title)
        .with_field("Current", format!("{:.2}", latest.mmol), true)
        .with_field("Trend", latest.trend.arrow(), true);
    if !description.is_empty() {
        embed = embed.with_description(description);
    }

    let mut files = Vec::new();
    if let Some(image) = image {
        embed = embed.with_attachment_image(&image.name);
        files.push(image);
    }

    MessageData {
        content: String::new(),
        embeds: vec![embed],
        files,
        mention_everyone: false,
    }
}

/// Title the live message would carry for a reading at `time`.
pub fn format_title(time: DateTime<Utc>, tz: &FixedOffset) -> String {
    time.with_timezone(tz).format(TITLE_FORMAT).to_string()
}
