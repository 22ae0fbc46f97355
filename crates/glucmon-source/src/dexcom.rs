use async_trait::async_trait;
use chrono::DateTime;
use glucmon_common::types::{NewReading, Trend};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, SourceError};
use crate::ShareApi;

/// Share service outside the US.
pub const DEFAULT_SHARE_URL: &str = "https://shareous1.dexcom.com/ShareWebServices/Services";

const APPLICATION_ID: &str = "d89443d2-327c-4a6f-89e5-496bbb0317db";
const MGDL_PER_MMOL: f64 = 18.0;
const NULL_SESSION: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    account_name: &'a str,
    password: &'a str,
    application_id: &'a str,
}

/// One entry of `ReadPublisherLatestGlucoseValues`.
#[derive(Debug, Deserialize)]
pub(crate) struct ShareReading {
    #[serde(rename = "WT")]
    pub wt: String,
    #[serde(rename = "Value")]
    pub value: f64,
    #[serde(rename = "Trend", default)]
    pub trend: String,
}

pub struct DexcomShare {
    client: reqwest::Client,
    base_url: String,
    account: String,
    password: String,
}

impl DexcomShare {
    pub fn new(base_url: &str, account: &str, password: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            account: account.to_string(),
            password: password.to_string(),
        })
    }
}

#[async_trait]
impl ShareApi for DexcomShare {
    async fn login(&self) -> Result<String> {
        let url = format!("{}/General/LoginPublisherAccountByName", self.base_url);
        let body = LoginRequest {
            account_name: &self.account,
            password: &self.password,
            application_id: APPLICATION_ID,
        };
        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(SourceError::AuthenticationFailed(format!(
                "status={}, body={}",
                status.as_u16(),
                text
            )));
        }

        let session_id: String = serde_json::from_str(&text)?;
        if session_id.is_empty() || session_id == NULL_SESSION {
            return Err(SourceError::AuthenticationFailed(
                "service returned an empty session".to_string(),
            ));
        }
        Ok(session_id)
    }

    async fn fetch(
        &self,
        session_id: &str,
        minutes: u32,
        max_count: u32,
    ) -> Result<Vec<NewReading>> {
        let url = format!("{}/Publisher/ReadPublisherLatestGlucoseValues", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("sessionId", session_id.to_string()),
                ("minutes", minutes.to_string()),
                ("maxCount", max_count.to_string()),
            ])
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), text));
        }

        let raw: Vec<ShareReading> = serde_json::from_str(&text)?;
        raw.into_iter().map(to_new_reading).collect()
    }
}

/// Maps a non-2xx response to a session error when the body says so.
pub(crate) fn classify_failure(status: u16, body: String) -> SourceError {
    if body.contains("SessionIdNotFound") || body.contains("SessionNotValid") {
        SourceError::SessionExpired
    } else {
        SourceError::HttpError { status, body }
    }
}

/// Parses `Date(1616961813000)` or `Date(1616961813000-0400)` into UTC,
/// truncated to whole seconds.
pub(crate) fn parse_share_time(wt: &str) -> Result<DateTime<chrono::Utc>> {
    let inner = wt
        .strip_prefix("Date(")
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| SourceError::MalformedReading(format!("bad timestamp: {wt}")))?;
    let digits: String = inner.chars().take_while(|c| c.is_ascii_digit()).collect();
    let ms: i64 = digits
        .parse()
        .map_err(|_| SourceError::MalformedReading(format!("bad timestamp: {wt}")))?;
    DateTime::from_timestamp(ms / 1000, 0)
        .ok_or_else(|| SourceError::MalformedReading(format!("timestamp out of range: {wt}")))
}

pub(crate) fn to_new_reading(raw: ShareReading) -> Result<NewReading> {
    let time = parse_share_time(&raw.wt)?;
    let trend = raw.trend.parse().unwrap_or(Trend::NotComputable);
    Ok(NewReading {
        time,
        mmol: raw.value / MGDL_PER_MMOL,
        trend,
    })
}
