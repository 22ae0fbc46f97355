use chrono::{DateTime, Duration, Utc};
use glucmon_common::types::{Alert, AlertLabel, NewAlert};
use glucmon_notify::manager::NotificationManager;
use glucmon_storage::Result;
use std::sync::Arc;

use crate::rules::missing_dose::MissingDoseRule;
use crate::rules::threshold::ThresholdRule;
use crate::AnalyzerStore;

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub low: f64,
    pub high: f64,
    /// Suppression window shared by the high and low glucose alerts.
    pub glucose_suppression: Duration,
    pub missing_dose_suppression: Duration,
    /// How far back to look for the newest reading.
    pub lookback: Duration,
    pub slow_insulin_window: Duration,
}

pub struct Analyzer {
    store: Arc<dyn AnalyzerStore>,
    notifier: Arc<NotificationManager>,
    glucose_rules: Vec<ThresholdRule>,
    dose_rule: MissingDoseRule,
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(
        store: Arc<dyn AnalyzerStore>,
        notifier: Arc<NotificationManager>,
        config: AnalyzerConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            glucose_rules: vec![ThresholdRule::high(config.high), ThresholdRule::low(config.low)],
            dose_rule: MissingDoseRule::slow_insulin(config.slow_insulin_window),
            config,
        }
    }

    /// Runs every check. Returns the alerts raised during this run.
    ///
    /// A storage error inside one check is logged and only skips that check.
    pub async fn run(&self) -> Vec<Alert> {
        self.run_at(Utc::now()).await
    }

    pub async fn run_at(&self, now: DateTime<Utc>) -> Vec<Alert> {
        let mut fired = Vec::new();

        match self.check_glucose(now).await {
            Ok(alert) => fired.extend(alert),
            Err(e) => tracing::error!(error = %e, "Glucose check skipped"),
        }
        match self.check_slow_insulin(now).await {
            Ok(alert) => fired.extend(alert),
            Err(e) => tracing::error!(error = %e, "Slow insulin check skipped"),
        }

        fired
    }

    /// High/low check against the newest reading in the lookback window.
    /// No readings means nothing to alert on.
    pub async fn check_glucose(&self, now: DateTime<Utc>) -> Result<Option<Alert>> {
        let readings = self
            .store
            .readings_between(now - self.config.lookback, now)
            .await?;
        let Some(latest) = readings.last() else {
            tracing::debug!("No recent readings, glucose check skipped");
            return Ok(None);
        };

        for rule in &self.glucose_rules {
            let Some(reason) = rule.evaluate(latest) else {
                continue;
            };
            if self
                .suppressed(rule.label, self.config.glucose_suppression, now)
                .await
            {
                return Ok(None);
            }
            return self.raise(rule.label, reason, now).await.map(Some);
        }
        Ok(None)
    }

    pub async fn check_slow_insulin(&self, now: DateTime<Utc>) -> Result<Option<Alert>> {
        let doses = self
            .store
            .doses_between(now - self.dose_rule.window, now)
            .await?;
        let Some(reason) = self.dose_rule.evaluate(&doses) else {
            return Ok(None);
        };
        if self
            .suppressed(self.dose_rule.label, self.config.missing_dose_suppression, now)
            .await
        {
            return Ok(None);
        }
        self.raise(self.dose_rule.label, reason, now).await.map(Some)
    }

    /// Whether an alert with `label` was raised within `window` before `now`.
    /// A failed history read counts as not suppressed.
    async fn suppressed(&self, label: AlertLabel, window: Duration, now: DateTime<Utc>) -> bool {
        match self.store.alerts_between(now - window, now).await {
            Ok(alerts) => {
                let hit = alerts.iter().any(|a| a.label == label);
                if hit {
                    tracing::debug!(label = %label, "Alert suppressed (recent alert on record)");
                }
                hit
            }
            Err(e) => {
                tracing::warn!(label = %label, error = %e, "Alert history unavailable, not suppressing");
                false
            }
        }
    }

    /// Persists the alert first so a failed delivery still suppresses repeats.
    async fn raise(&self, label: AlertLabel, reason: String, now: DateTime<Utc>) -> Result<Alert> {
        let outcome = self
            .store
            .insert_alert(&NewAlert {
                time: now,
                label,
                reason: reason.clone(),
            })
            .await?;
        let alert = Alert {
            id: outcome.id().unwrap_or_default().to_string(),
            time: now,
            label,
            reason,
        };
        tracing::info!(alert_id = %alert.id, label = %label, reason = %alert.reason, "Alert raised");

        let delivered = self.notifier.notify(&alert).await;
        if delivered < self.notifier.channel_count() {
            tracing::warn!(
                alert_id = %alert.id,
                delivered,
                channels = self.notifier.channel_count(),
                "Alert not delivered to every channel"
            );
        }
        Ok(alert)
    }
}
