use async_trait::async_trait;
use glucmon_common::types::NewReading;
use tokio::sync::Mutex;

use crate::error::{Result, SourceError};
use crate::{check_window, ReadingSource, ShareApi};

/// Session-holding [`ReadingSource`] over a [`ShareApi`].
///
/// Logs in lazily on first use. When a fetch fails with
/// [`SourceError::SessionExpired`] it logs in exactly once more and retries
/// the fetch once; a second failure is returned to the caller.
pub struct ShareSession<A> {
    api: A,
    session: Mutex<Option<String>>,
}

impl<A: ShareApi> ShareSession<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            session: Mutex::new(None),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    async fn current_session(&self) -> Result<String> {
        let mut session = self.session.lock().await;
        if let Some(id) = session.as_ref() {
            return Ok(id.clone());
        }
        let id = self.api.login().await?;
        tracing::info!("Share session established");
        *session = Some(id.clone());
        Ok(id)
    }

    async fn renew_session(&self, stale: &str) -> Result<String> {
        let mut session = self.session.lock().await;
        // Another caller may already have renewed it.
        if let Some(id) = session.as_ref().filter(|id| id.as_str() != stale) {
            return Ok(id.clone());
        }
        *session = None;
        let id = self.api.login().await?;
        tracing::info!("Share session renewed");
        *session = Some(id.clone());
        Ok(id)
    }
}

#[async_trait]
impl<A: ShareApi> ReadingSource for ShareSession<A> {
    async fn latest_readings(&self, minutes: u32, max_count: u32) -> Result<Vec<NewReading>> {
        check_window(minutes, max_count)?;

        let session = self.current_session().await?;
        let mut readings = match self.api.fetch(&session, minutes, max_count).await {
            Err(SourceError::SessionExpired) => {
                tracing::warn!("Share session expired, re-authenticating once");
                let renewed = self.renew_session(&session).await?;
                self.api.fetch(&renewed, minutes, max_count).await?
            }
            other => other?,
        };

        readings.sort_by_key(|r| r.time);
        Ok(readings)
    }
}
