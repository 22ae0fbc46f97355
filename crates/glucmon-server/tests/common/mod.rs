#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use glucmon_alert::engine::{Analyzer, AnalyzerConfig};
use glucmon_common::types::{NewReading, Trend};
use glucmon_notify::channels::chat::ChatAlertChannel;
use glucmon_notify::channels::memory::MemorySurface;
use glucmon_notify::manager::NotificationManager;
use glucmon_notify::NotificationChannel;
use glucmon_server::api;
use glucmon_server::chart::{ChartError, ChartRenderer, RenderedRef};
use glucmon_server::commands::CommandHandler;
use glucmon_server::display::{DisplayReconciler, DisplaySettings};
use glucmon_server::mutation::MutationHandler;
use glucmon_server::report::ReportGenerator;
use glucmon_server::state::AppState;
use glucmon_source::error::Result as SourceResult;
use glucmon_source::ReadingSource;
use glucmon_storage::memory::MemoryStore;
use glucmon_storage::FileStore;
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::util::ServiceExt;

pub const DISPLAY: &str = "glucose";
pub const ALERTS: &str = "alerts";
pub const REPORTS: &str = "reports";
pub const CHART_NAME: &str = "chart.png";

pub fn reading(minutes_ago: i64, mmol: f64) -> NewReading {
    NewReading {
        time: Utc::now() - Duration::minutes(minutes_ago),
        mmol,
        trend: Trend::Flat,
    }
}

/// Remote source returning a fixed window.
#[derive(Default)]
pub struct FakeSource {
    readings: Mutex<Vec<NewReading>>,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn with(readings: Vec<NewReading>) -> Self {
        Self {
            readings: Mutex::new(readings),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, reading: NewReading) {
        self.readings.lock().unwrap().push(reading);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadingSource for FakeSource {
    async fn latest_readings(&self, _minutes: u32, _max_count: u32) -> SourceResult<Vec<NewReading>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut readings = self.readings.lock().unwrap().clone();
        readings.sort_by_key(|r| r.time);
        Ok(readings)
    }
}

/// Plotting service stand-in that writes a small file into the shared store.
pub struct FakeChart {
    files: Arc<MemoryStore>,
    failing: bool,
    renders: AtomicUsize,
    last_file: Mutex<Option<String>>,
}

impl FakeChart {
    pub fn new(files: Arc<MemoryStore>, failing: bool) -> Self {
        Self {
            files,
            failing,
            renders: AtomicUsize::new(0),
            last_file: Mutex::new(None),
        }
    }

    /// Id of the most recently written chart file.
    pub fn last_file(&self) -> Option<String> {
        self.last_file.lock().unwrap().clone()
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    async fn render(&self) -> Result<RenderedRef, ChartError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(ChartError::Unavailable("plotter offline".to_string()));
        }
        let id = self
            .files
            .put_file(CHART_NAME, b"\x89PNG")
            .await
            .map_err(|e| ChartError::Unavailable(e.to_string()))?;
        *self.last_file.lock().unwrap() = Some(id.clone());
        Ok(RenderedRef {
            id,
            name: CHART_NAME.to_string(),
        })
    }
}

#[async_trait]
impl ChartRenderer for FakeChart {
    async fn plot_daily(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<RenderedRef, ChartError> {
        self.render().await
    }

    async fn plot_weekly(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<RenderedRef, ChartError> {
        self.render().await
    }
}

pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub surface: Arc<MemorySurface>,
    pub chart: Arc<FakeChart>,
    pub display: Arc<DisplayReconciler>,
    pub mutations: Arc<MutationHandler>,
    pub reports: Arc<ReportGenerator>,
    pub commands: Arc<CommandHandler>,
    pub notifier: Arc<NotificationManager>,
    pub keys: Ed25519KeyPair,
    pub app: axum::Router,
}

pub fn tz() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap()
}

pub fn analyzer_config() -> AnalyzerConfig {
    AnalyzerConfig {
        low: 4.0,
        high: 10.0,
        glucose_suppression: Duration::minutes(60),
        missing_dose_suppression: Duration::minutes(240),
        lookback: Duration::hours(12),
        slow_insulin_window: Duration::hours(24),
    }
}

pub fn build_context(chart_failing: bool) -> TestContext {
    glucmon_common::id::init(1, 1);

    let store = Arc::new(MemoryStore::new());
    let surface = Arc::new(MemorySurface::new());
    let chart = Arc::new(FakeChart::new(store.clone(), chart_failing));

    let display = Arc::new(DisplayReconciler::new(
        store.clone(),
        surface.clone(),
        Some(chart.clone()),
        DisplaySettings {
            channel: DISPLAY.to_string(),
            tz: tz(),
            lookback: Duration::hours(12),
            log_limit: 7,
        },
    ));
    let mutations = Arc::new(MutationHandler::new(
        store.clone(),
        display.clone(),
        Duration::hours(12),
    ));
    let reports = Arc::new(ReportGenerator::new(
        store.clone(),
        surface.clone(),
        Some(chart.clone()),
        REPORTS,
        tz(),
        4.0,
        10.0,
    ));
    let commands = Arc::new(CommandHandler::new(mutations.clone(), reports.clone()));

    let channels: Vec<Box<dyn NotificationChannel>> =
        vec![Box::new(ChatAlertChannel::new(surface.clone(), ALERTS))];
    let notifier = Arc::new(NotificationManager::new(channels).with_max_attempts(1));

    let pkcs8 = Ed25519KeyPair::generate_pkcs8(&SystemRandom::new()).unwrap();
    let keys = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();

    let app = api::build_http_app(AppState {
        commands: commands.clone(),
        public_key: Some(Arc::new(hex::encode(keys.public_key().as_ref()))),
        start_time: Utc::now(),
    });

    TestContext {
        store,
        surface,
        chart,
        display,
        mutations,
        reports,
        commands,
        notifier,
        keys,
        app,
    }
}

impl TestContext {
    pub fn analyzer(&self) -> Analyzer {
        Analyzer::new(self.store.clone(), self.notifier.clone(), analyzer_config())
    }

    /// Signs `body` the way the chat platform does and posts it.
    pub async fn post_interaction(&self, body: &Value) -> (StatusCode, Value) {
        let body = body.to_string();
        let timestamp = Utc::now().timestamp().to_string();
        let mut signed = timestamp.clone().into_bytes();
        signed.extend_from_slice(body.as_bytes());
        let signature = hex::encode(self.keys.sign(&signed).as_ref());

        let req = Request::builder()
            .method("POST")
            .uri("/interactions")
            .header("Content-Type", "application/json")
            .header("X-Signature-Ed25519", signature)
            .header("X-Signature-Timestamp", timestamp)
            .body(Body::from(body))
            .expect("request should build");
        send(&self.app, req).await
    }
}

pub async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.expect("request should succeed");
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .expect("body should read");
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}
