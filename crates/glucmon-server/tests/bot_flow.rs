mod common;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{build_context, reading, FakeSource, ALERTS, CHART_NAME, DISPLAY, REPORTS};
use glucmon_common::reference::short_hash;
use glucmon_common::types::{DoseCategory, NewDose, NewReading, Reading, Trend, Visibility};
use glucmon_notify::message::{Embed, MessageData};
use glucmon_notify::surface::ChatSurface;
use glucmon_server::commands::{Command, CommandError};
use glucmon_server::display::{DisplayError, UpdateMode, UpdateOutcome};
use glucmon_server::driver::{Driver, TickOutcome};
use glucmon_server::fetcher::{FetchError, Fetcher};
use glucmon_server::mutation::{AmountChange, DoseEdit, IntakeEdit, MutationError, MutationOutcome};
use glucmon_server::report::{report_window, Timeframe};
use glucmon_storage::memory::MemoryStore;
use glucmon_storage::{
    DoseStore, FileStore, InsertOutcome, IntakeStore, ReadingStore, Result as StorageResult,
    StorageError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ── Display ──

#[tokio::test]
async fn display_publishes_once_per_reading() {
    let ctx = build_context(false);
    ctx.store.insert_reading_if_new(&reading(10, 6.2)).await.unwrap();

    let first = ctx.display.update(UpdateMode::IfStale).await.unwrap();
    assert!(matches!(first, UpdateOutcome::Published { .. }));
    let second = ctx.display.update(UpdateMode::IfStale).await.unwrap();
    assert_eq!(second, UpdateOutcome::UpToDate);
    assert_eq!(ctx.surface.send_count(), 1);

    ctx.store.insert_reading_if_new(&reading(5, 6.8)).await.unwrap();
    ctx.display.update(UpdateMode::IfStale).await.unwrap();

    let messages = ctx.surface.messages(DISPLAY);
    assert_eq!(messages.len(), 1, "old live message must be removed");
    assert_eq!(ctx.surface.delete_count(), 1);
    assert_eq!(messages[0].embeds[0].fields[0].value, "6.80");
}

fn leftover(title: &str) -> MessageData {
    MessageData {
        content: String::new(),
        embeds: vec![Embed::titled(title)],
        files: Vec::new(),
        mention_everyone: false,
    }
}

#[tokio::test]
async fn publish_clears_every_leftover_message() {
    let ctx = build_context(false);
    ctx.store.insert_reading_if_new(&reading(10, 6.2)).await.unwrap();
    for title in ["stale 1", "stale 2", "stale 3"] {
        ctx.surface.send_message(DISPLAY, &leftover(title)).await.unwrap();
    }

    let outcome = ctx.display.update(UpdateMode::Always).await.unwrap();

    let UpdateOutcome::Published { message_id } = outcome else {
        panic!("expected a publish, got {outcome:?}");
    };
    let messages = ctx.surface.messages(DISPLAY);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, message_id);
    assert_eq!(ctx.surface.delete_count(), 3);
}

#[tokio::test]
async fn duplicate_live_message_counts_as_stale() {
    let ctx = build_context(false);
    ctx.store.insert_reading_if_new(&reading(10, 6.2)).await.unwrap();
    ctx.display.update(UpdateMode::IfStale).await.unwrap();
    let current = ctx.surface.messages(DISPLAY)[0].title().unwrap().to_string();
    ctx.surface.send_message(DISPLAY, &leftover(&current)).await.unwrap();

    let outcome = ctx.display.update(UpdateMode::IfStale).await.unwrap();

    assert!(matches!(outcome, UpdateOutcome::Published { .. }));
    assert_eq!(ctx.surface.messages(DISPLAY).len(), 1);
}

#[tokio::test]
async fn display_attaches_chart_and_cleans_up_file() {
    let ctx = build_context(false);
    ctx.store.insert_reading_if_new(&reading(3, 5.5)).await.unwrap();

    ctx.display.update(UpdateMode::Always).await.unwrap();

    assert_eq!(ctx.surface.latest_attachments(DISPLAY), vec![CHART_NAME.to_string()]);
    assert_eq!(ctx.chart.renders(), 1);
    let file = ctx.chart.last_file().expect("chart should have been written");
    assert!(ctx.store.read_file(&file).await.is_err(), "chart file must be deleted");
}

#[tokio::test]
async fn chart_failure_still_publishes_without_image() {
    let ctx = build_context(true);
    ctx.store.insert_reading_if_new(&reading(3, 5.5)).await.unwrap();

    let outcome = ctx.display.update(UpdateMode::IfStale).await.unwrap();

    assert!(matches!(outcome, UpdateOutcome::Published { .. }));
    assert_eq!(ctx.chart.renders(), 1);
    assert!(ctx.surface.latest_attachments(DISPLAY).is_empty());
    assert_eq!(ctx.surface.messages(DISPLAY).len(), 1);
}

#[tokio::test]
async fn display_without_readings_reports_no_data() {
    let ctx = build_context(false);
    let err = ctx.display.update(UpdateMode::Always).await.unwrap_err();
    assert!(matches!(err, DisplayError::NoReadings { hours: 12 }));
    assert_eq!(ctx.surface.send_count(), 0);
}

#[tokio::test]
async fn activity_log_follows_visibility() {
    let ctx = build_context(false);
    ctx.store.insert_reading_if_new(&reading(3, 7.1)).await.unwrap();
    ctx.mutations.add_intake(45.0).await.unwrap();
    ctx.mutations.add_dose(DoseCategory::Rapid, 4.5).await.unwrap();

    let description = |ctx: &common::TestContext| {
        ctx.surface.messages(DISPLAY)[0].embeds[0]
            .description
            .clone()
            .unwrap_or_default()
    };
    let all = description(&ctx);
    assert!(all.contains("carbs 45.00"));
    assert!(all.contains("insulin rapid 4.50"));

    ctx.mutations.set_visibility(Visibility::IntakeOnly).await;
    let carbs_only = description(&ctx);
    assert!(carbs_only.contains("carbs 45.00"));
    assert!(!carbs_only.contains("insulin"));
    assert_eq!(ctx.surface.messages(DISPLAY).len(), 1);
}

// ── Mutations ──

#[tokio::test]
async fn edit_into_the_future_leaves_record_unchanged() {
    let ctx = build_context(false);
    let id = ctx.mutations.add_intake(30.0).await.unwrap().id().to_string();

    let err = ctx
        .mutations
        .edit_intake(IntakeEdit {
            reference: id.clone(),
            amount: AmountChange::Set(50.0),
            offset: Some(Duration::minutes(60)),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, MutationError::FutureTime(_)));
    assert!(err.is_user_error());
    let stored = ctx.store.intake_by_id(&id).await.unwrap().unwrap();
    assert_eq!(stored.amount, 30.0);
}

#[tokio::test]
async fn edit_by_short_reference_moves_dose_back() {
    let ctx = build_context(false);
    let id = ctx
        .mutations
        .add_dose(DoseCategory::Slow, 12.0)
        .await
        .unwrap()
        .id()
        .to_string();
    let before = ctx.store.dose_by_id(&id).await.unwrap().unwrap();

    let outcome = ctx
        .mutations
        .edit_dose(DoseEdit {
            reference: short_hash(&id),
            category: Some(DoseCategory::Rapid),
            amount: AmountChange::Keep,
            offset: Some(Duration::minutes(-30)),
        })
        .await
        .unwrap();

    assert_eq!(outcome, MutationOutcome::Updated { id: id.clone() });
    let after = ctx.store.dose_by_id(&id).await.unwrap().unwrap();
    assert_eq!(after.category, DoseCategory::Rapid);
    assert_eq!(after.amount, 12.0);
    assert_eq!(after.time, before.time - Duration::minutes(30));
}

#[tokio::test]
async fn negative_units_delete_the_dose() {
    let ctx = build_context(false);
    let id = ctx
        .mutations
        .add_dose(DoseCategory::Rapid, 3.0)
        .await
        .unwrap()
        .id()
        .to_string();

    let data = serde_json::from_value(serde_json::json!({
        "name": "editinsulin",
        "options": [{ "name": "id", "value": id.clone() }, { "name": "units", "value": -1 }]
    }))
    .unwrap();
    let reply = ctx.commands.execute(Command::parse(&data).unwrap()).await.unwrap();

    assert_eq!(reply, format!("deleted {id}"));
    assert!(ctx.store.dose_by_id(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_reference_is_a_user_error() {
    let ctx = build_context(false);
    let err = ctx
        .commands
        .execute(Command::EditCarbs(IntakeEdit {
            reference: "abcdef".to_string(),
            amount: AmountChange::Delete,
            offset: None,
        }))
        .await
        .unwrap_err();
    match err {
        CommandError::Mutation(e) => assert!(e.is_user_error()),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn negative_amount_on_add_is_rejected() {
    let ctx = build_context(false);
    let err = ctx.mutations.add_intake(-5.0).await.unwrap_err();
    assert!(matches!(err, MutationError::InvalidAmount(_)));
}

// ── Fetcher ──

#[tokio::test]
async fn fetch_is_idempotent_and_stops_at_known_readings() {
    let ctx = build_context(false);
    let source = Arc::new(FakeSource::with(vec![
        reading(15, 5.1),
        reading(10, 5.3),
        reading(5, 5.6),
    ]));
    let fetcher = Fetcher::new(source.clone(), ctx.store.clone());

    assert_eq!(fetcher.fetch_and_load().await.unwrap(), 3);
    assert_eq!(fetcher.fetch_and_load().await.unwrap(), 0);

    source.push(reading(0, 5.9));
    assert_eq!(fetcher.fetch_and_load().await.unwrap(), 1);

    let stored = ctx
        .store
        .readings_between(Utc::now() - Duration::hours(1), Utc::now())
        .await
        .unwrap();
    assert_eq!(stored.len(), 4);
    assert_eq!(source.calls(), 3);
}

#[tokio::test]
async fn fetch_skips_readings_stamped_in_the_future() {
    let ctx = build_context(false);
    let source = Arc::new(FakeSource::with(vec![
        reading(5, 5.6),
        NewReading {
            time: Utc::now() + Duration::minutes(30),
            mmol: 6.0,
            trend: Trend::Flat,
        },
    ]));
    let fetcher = Fetcher::new(source, ctx.store.clone());

    assert_eq!(fetcher.fetch_and_load().await.unwrap(), 1);
}

/// Reading store whose nth insert fails once.
struct FlakyStore {
    inner: Arc<MemoryStore>,
    fail_on: usize,
    inserts: AtomicUsize,
}

#[async_trait]
impl ReadingStore for FlakyStore {
    async fn insert_reading_if_new(&self, reading: &NewReading) -> StorageResult<InsertOutcome> {
        let n = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "timeout",
            )));
        }
        self.inner.insert_reading_if_new(reading).await
    }

    async fn readings_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<Reading>> {
        self.inner.readings_between(start, end).await
    }
}

#[tokio::test]
async fn interrupted_fetch_resumes_without_gaps() {
    let ctx = build_context(false);
    let source = Arc::new(FakeSource::with(vec![
        reading(15, 5.1),
        reading(10, 5.3),
        reading(5, 5.6),
    ]));
    let store = Arc::new(FlakyStore {
        inner: ctx.store.clone(),
        fail_on: 2,
        inserts: AtomicUsize::new(0),
    });
    let fetcher = Fetcher::new(source, store);

    assert!(matches!(
        fetcher.fetch_and_load().await,
        Err(FetchError::Storage(StorageError::Io(_)))
    ));
    assert_eq!(fetcher.fetch_and_load().await.unwrap(), 2);

    let stored = ctx
        .store
        .readings_between(Utc::now() - Duration::hours(1), Utc::now())
        .await
        .unwrap();
    assert_eq!(stored.len(), 3);
}

// ── Driver ──

#[tokio::test]
async fn tick_fetches_displays_and_alerts_in_order() {
    let ctx = build_context(false);
    let source = Arc::new(FakeSource::with(vec![reading(10, 5.0), reading(5, 3.2)]));
    let driver = Driver::new(
        Fetcher::new(source, ctx.store.clone()),
        ctx.display.clone(),
        ctx.analyzer(),
        std::time::Duration::from_secs(60),
        std::time::Duration::from_secs(5),
    );

    assert_eq!(driver.tick().await, TickOutcome::Completed);
    assert_eq!(ctx.surface.messages(DISPLAY).len(), 1);
    // low glucose and missing slow insulin
    assert_eq!(ctx.surface.messages(ALERTS).len(), 2);
    let sends = ctx.surface.send_count();

    assert_eq!(driver.tick().await, TickOutcome::Completed);
    assert_eq!(ctx.surface.send_count(), sends, "second tick should change nothing");
}

#[tokio::test]
async fn surface_outage_does_not_abort_the_tick() {
    let ctx = build_context(false);
    ctx.store
        .insert_dose(&NewDose {
            time: Utc::now() - Duration::hours(2),
            category: DoseCategory::Slow,
            amount: 14.0,
        })
        .await
        .unwrap();
    let source = Arc::new(FakeSource::with(vec![reading(5, 12.4)]));
    let driver = Driver::new(
        Fetcher::new(source, ctx.store.clone()),
        ctx.display.clone(),
        ctx.analyzer(),
        std::time::Duration::from_secs(60),
        std::time::Duration::from_secs(5),
    );
    ctx.surface.set_failing(true);

    assert_eq!(driver.tick().await, TickOutcome::Completed);

    // 告警已持久化，恢复后不会重复推送
    ctx.surface.set_failing(false);
    assert_eq!(driver.tick().await, TickOutcome::Completed);
    assert!(ctx.surface.messages(ALERTS).is_empty());
    assert_eq!(ctx.surface.messages(DISPLAY).len(), 1);
}

// ── Reports ──

#[tokio::test]
async fn weekly_report_summarises_previous_week() {
    let ctx = build_context(false);
    let window = report_window(Utc::now().with_timezone(&common::tz()), Timeframe::Week, 1).unwrap();
    let start = window.start.with_timezone(&Utc);
    for (hours, mmol) in [(1, 3.0), (2, 7.0)] {
        ctx.store
            .insert_reading_if_new(&NewReading {
                time: start + Duration::hours(hours),
                mmol,
                trend: Trend::Flat,
            })
            .await
            .unwrap();
    }
    ctx.store
        .insert_dose(&NewDose {
            time: start + Duration::hours(3),
            category: DoseCategory::Rapid,
            amount: 4.0,
        })
        .await
        .unwrap();

    let reply = ctx
        .commands
        .execute(Command::GenReport {
            timeframe: Timeframe::Week,
            offset: 1,
        })
        .await
        .unwrap();
    assert_eq!(reply, format!("report {} posted", window.title()));

    let messages = ctx.surface.messages(REPORTS);
    assert_eq!(messages.len(), 1);
    let embed = &messages[0].embeds[0];
    assert_eq!(embed.title.as_deref(), Some(window.title().as_str()));
    let field = |name: &str| {
        embed
            .fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.clone())
            .unwrap()
    };
    assert_eq!(field("Average"), "5.00");
    assert_eq!(field("Deviation"), "2.00");
    assert_eq!(field("Below Range"), "0.50");
    assert_eq!(field("In Range"), "0.50");
    assert_eq!(field("Above Range"), "0.00");
    assert!(embed.description.as_deref().unwrap_or("").contains("rapid"));
    assert_eq!(ctx.surface.latest_attachments(REPORTS), vec![CHART_NAME.to_string()]);
}

#[tokio::test]
async fn report_leaves_the_closing_midnight_to_the_next_period() {
    let ctx = build_context(false);
    let window = report_window(Utc::now().with_timezone(&common::tz()), Timeframe::Week, 1).unwrap();
    let start = window.start.with_timezone(&Utc);
    let end = window.end.with_timezone(&Utc);
    for (time, mmol) in [(start + Duration::hours(1), 5.0), (end, 20.0)] {
        ctx.store
            .insert_reading_if_new(&NewReading {
                time,
                mmol,
                trend: Trend::Flat,
            })
            .await
            .unwrap();
    }
    ctx.store
        .insert_dose(&NewDose {
            time: end,
            category: DoseCategory::Slow,
            amount: 12.0,
        })
        .await
        .unwrap();

    ctx.commands
        .execute(Command::GenReport {
            timeframe: Timeframe::Week,
            offset: 1,
        })
        .await
        .unwrap();

    let messages = ctx.surface.messages(REPORTS);
    let embed = &messages[0].embeds[0];
    let average = embed.fields.iter().find(|f| f.name == "Average").unwrap();
    assert_eq!(average.value, "5.00");
    let next_day = window.end.format("%m/%d").to_string();
    assert!(!embed.description.as_deref().unwrap_or("").contains(&next_day));
}
