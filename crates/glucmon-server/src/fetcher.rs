use glucmon_source::error::SourceError;
use glucmon_source::{ReadingSource, MAX_WINDOW_COUNT, MAX_WINDOW_MINUTES};
use glucmon_storage::{ReadingStore, StorageError};
use chrono::Utc;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Pulls the newest source window into the reading store.
pub struct Fetcher {
    source: Arc<dyn ReadingSource>,
    store: Arc<dyn ReadingStore>,
}

impl Fetcher {
    pub fn new(source: Arc<dyn ReadingSource>, store: Arc<dyn ReadingStore>) -> Self {
        Self { source, store }
    }

    /// Stores unseen readings and returns how many were inserted.
    ///
    /// Only readings newer than the latest stored one are written, oldest
    /// first, so a run cut short by a store error resumes where it stopped.
    pub async fn fetch_and_load(&self) -> Result<usize, FetchError> {
        let readings = self
            .source
            .latest_readings(MAX_WINDOW_MINUTES, MAX_WINDOW_COUNT)
            .await?;
        let Some(oldest) = readings.first() else {
            tracing::debug!("Source returned an empty window");
            return Ok(0);
        };

        let latest_stored = self
            .store
            .readings_between(oldest.time, Utc::now())
            .await?
            .last()
            .map(|r| r.time);

        let mut inserted = 0;
        for reading in readings
            .iter()
            .filter(|r| latest_stored.map_or(true, |latest| r.time > latest))
        {
            match self.store.insert_reading_if_new(reading).await {
                Ok(outcome) if outcome.matched() => {}
                Ok(_) => inserted += 1,
                Err(StorageError::FutureTimestamp { time, .. }) => {
                    tracing::warn!(time = %time, "Skipping reading stamped in the future");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if inserted > 0 {
            tracing::info!(inserted, fetched = readings.len(), "Readings stored");
        } else {
            tracing::debug!(fetched = readings.len(), "No new readings");
        }
        Ok(inserted)
    }
}
