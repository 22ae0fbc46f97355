//! Periodic fetch, reconcile and analyze loop.

use glucmon_alert::engine::Analyzer;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::display::{DisplayError, DisplayReconciler, UpdateMode};
use crate::fetcher::{FetchError, Fetcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Completed,
    /// The named step hit a store failure or timed out; later steps were skipped.
    Aborted(&'static str),
}

pub struct Driver {
    fetcher: Fetcher,
    display: Arc<DisplayReconciler>,
    analyzer: Analyzer,
    interval: Duration,
    step_timeout: Duration,
}

impl Driver {
    pub fn new(
        fetcher: Fetcher,
        display: Arc<DisplayReconciler>,
        analyzer: Analyzer,
        interval: Duration,
        step_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            display,
            analyzer,
            interval,
            step_timeout,
        }
    }

    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            step_timeout_secs = self.step_timeout.as_secs(),
            "Driver loop started"
        );

        let mut tick = interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            if let TickOutcome::Aborted(step) = self.tick().await {
                tracing::warn!(step, "Tick aborted, retrying next interval");
            }
        }
    }

    async fn bounded<F: Future>(&self, step: &'static str, fut: F) -> Option<F::Output> {
        match timeout(self.step_timeout, fut).await {
            Ok(out) => Some(out),
            Err(_) => {
                tracing::error!(step, timeout_secs = self.step_timeout.as_secs(), "Step timed out");
                None
            }
        }
    }

    /// One fetch, reconcile, analyze pass. Each step sees the writes of the one before.
    pub async fn tick(&self) -> TickOutcome {
        let Some(fetched) = self.bounded("fetch", self.fetcher.fetch_and_load()).await else {
            return TickOutcome::Aborted("fetch");
        };
        match fetched {
            Ok(inserted) => tracing::debug!(inserted, "Fetch finished"),
            Err(FetchError::Source(e)) => {
                tracing::warn!(error = %e, "Fetch failed, continuing with stored readings");
            }
            Err(e @ FetchError::Storage(_)) => {
                tracing::error!(error = %e, "Fetch could not store readings");
                return TickOutcome::Aborted("fetch");
            }
        }

        let Some(updated) = self
            .bounded("display", self.display.update(UpdateMode::IfStale))
            .await
        else {
            return TickOutcome::Aborted("display");
        };
        match updated {
            Ok(outcome) => tracing::debug!(?outcome, "Display reconciled"),
            Err(e @ DisplayError::NoReadings { .. }) => tracing::info!("{e}"),
            Err(e @ DisplayError::Surface(_)) => {
                tracing::warn!(error = %e, "Display publish failed");
            }
            Err(e @ DisplayError::Storage(_)) => {
                tracing::error!(error = %e, "Display could not read the store");
                return TickOutcome::Aborted("display");
            }
        }

        let Some(alerts) = self.bounded("analyze", self.analyzer.run()).await else {
            return TickOutcome::Aborted("analyze");
        };
        if !alerts.is_empty() {
            tracing::info!(count = alerts.len(), "Alerts raised");
        }
        TickOutcome::Completed
    }
}
