use crate::dexcom::{classify_failure, parse_share_time, to_new_reading, ShareReading};
use crate::error::{Result, SourceError};
use crate::session::ShareSession;
use crate::{ReadingSource, ShareApi, MAX_WINDOW_COUNT, MAX_WINDOW_MINUTES};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use glucmon_common::types::{NewReading, Trend};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Scripted share API: each fetch pops the next outcome.
struct ScriptedApi {
    logins: AtomicUsize,
    fetches: AtomicUsize,
    outcomes: Mutex<VecDeque<Result<Vec<NewReading>>>>,
}

impl ScriptedApi {
    fn new(outcomes: Vec<Result<Vec<NewReading>>>) -> Self {
        Self {
            logins: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            outcomes: Mutex::new(outcomes.into()),
        }
    }
}

#[async_trait]
impl ShareApi for ScriptedApi {
    async fn login(&self) -> Result<String> {
        let n = self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(format!("session-{n}"))
    }

    async fn fetch(&self, _session: &str, _minutes: u32, _count: u32) -> Result<Vec<NewReading>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

fn reading(minutes_ago: i64) -> NewReading {
    NewReading {
        time: Utc::now() - Duration::minutes(minutes_ago),
        mmol: 6.0,
        trend: Trend::Flat,
    }
}

#[tokio::test]
async fn logs_in_lazily_and_returns_oldest_first() {
    let api = ScriptedApi::new(vec![Ok(vec![reading(0), reading(10), reading(5)])]);
    let source = ShareSession::new(api);

    let readings = source
        .latest_readings(MAX_WINDOW_MINUTES, MAX_WINDOW_COUNT)
        .await
        .unwrap();
    assert_eq!(readings.len(), 3);
    assert!(readings.windows(2).all(|w| w[0].time <= w[1].time));
    assert_eq!(source.api().logins.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn expired_session_triggers_exactly_one_reauth() {
    let api = ScriptedApi::new(vec![
        Ok(vec![reading(5)]),
        Err(SourceError::SessionExpired),
        Ok(vec![reading(0)]),
    ]);
    let source = ShareSession::new(api);

    source.latest_readings(60, 12).await.unwrap();
    assert_eq!(source.api().logins.load(Ordering::SeqCst), 1);

    let readings = source.latest_readings(60, 12).await.unwrap();
    assert_eq!(readings.len(), 1);
    assert_eq!(source.api().logins.load(Ordering::SeqCst), 2);
    assert_eq!(source.api().fetches.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn second_expiry_is_returned_without_further_logins() {
    let api = ScriptedApi::new(vec![
        Err(SourceError::SessionExpired),
        Err(SourceError::SessionExpired),
    ]);
    let source = ShareSession::new(api);

    let err = source.latest_readings(60, 12).await.unwrap_err();
    assert!(matches!(err, SourceError::SessionExpired));
    assert_eq!(source.api().logins.load(Ordering::SeqCst), 2);
    assert_eq!(source.api().fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn other_failures_do_not_reauthenticate() {
    let api = ScriptedApi::new(vec![Err(SourceError::HttpError {
        status: 502,
        body: "bad gateway".into(),
    })]);
    let source = ShareSession::new(api);

    let err = source.latest_readings(60, 12).await.unwrap_err();
    assert!(matches!(err, SourceError::HttpError { status: 502, .. }));
    assert_eq!(source.api().logins.load(Ordering::SeqCst), 1);
    assert_eq!(source.api().fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn window_above_ceiling_is_rejected_before_any_request() {
    let api = ScriptedApi::new(vec![]);
    let source = ShareSession::new(api);

    let err = source
        .latest_readings(MAX_WINDOW_MINUTES + 1, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::WindowTooLarge { .. }));

    let err = source
        .latest_readings(60, MAX_WINDOW_COUNT + 1)
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::WindowTooLarge { .. }));
    assert_eq!(source.api().logins.load(Ordering::SeqCst), 0);
    assert_eq!(source.api().fetches.load(Ordering::SeqCst), 0);
}

#[test]
fn share_timestamps_parse_with_and_without_offset() {
    let expected = Utc.timestamp_opt(1_616_961_813, 0).unwrap();
    assert_eq!(parse_share_time("Date(1616961813000)").unwrap(), expected);
    assert_eq!(parse_share_time("Date(1616961813999-0400)").unwrap(), expected);
    assert!(parse_share_time("1616961813000").is_err());
    assert!(parse_share_time("Date()").is_err());
}

#[test]
fn share_values_convert_to_mmol() {
    let raw: ShareReading = serde_json::from_str(
        r#"{"WT":"Date(1616961813000)","ST":"Date(1616961813000)","Value":180,"Trend":"SingleUp"}"#,
    )
    .unwrap();
    let reading = to_new_reading(raw).unwrap();
    assert!((reading.mmol - 10.0).abs() < f64::EPSILON);
    assert_eq!(reading.trend, Trend::SingleUp);
}

#[test]
fn session_errors_are_recognised_in_failure_bodies() {
    let err = classify_failure(500, r#"{"Code":"SessionIdNotFound"}"#.to_string());
    assert!(matches!(err, SourceError::SessionExpired));

    let err = classify_failure(500, r#"{"Code":"SessionNotValid"}"#.to_string());
    assert!(matches!(err, SourceError::SessionExpired));

    let err = classify_failure(503, "maintenance".to_string());
    assert!(matches!(err, SourceError::HttpError { status: 503, .. }));
}
