//! Event storage for readings, doses, intakes, alerts and rendered chart files.
//!
//! Access is split into narrow capability traits, one per record kind, so a
//! component can depend on exactly the subset it reads or writes. The
//! durable implementation is [`store::EventStore`] (SeaORM over SQLite);
//! [`memory::MemoryStore`] keeps everything in process.

pub mod entities;
pub mod error;
pub mod memory;
pub mod reference;
pub mod store;


use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use glucmon_common::reference::is_short_reference;
use glucmon_common::types::{
    Alert, Dose, Intake, NewAlert, NewDose, NewIntake, NewReading, Reading,
};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use error::{Result, StorageError};
pub use store::EventStore;

/// Record kinds held by the store. Used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Reading,
    Dose,
    Intake,
    Alert,
    File,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reading => "reading",
            Self::Dose => "dose",
            Self::Intake => "intake",
            Self::Alert => "alert",
            Self::File => "file",
        };
        f.write_str(name)
    }
}

/// Result of an idempotent insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new record was written under the returned id.
    Inserted(String),
    /// A record with the same natural key already existed; nothing was written.
    Matched,
}

impl InsertOutcome {
    pub fn matched(&self) -> bool {
        matches!(self, Self::Matched)
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Inserted(id) => Some(id),
            Self::Matched => None,
        }
    }
}

/// A chart image written by the rendering service, addressed by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub id: String,
    pub name: String,
    pub data: Vec<u8>,
}

/// Rejects timestamps later than the current time.
pub fn ensure_not_future(category: Category, time: DateTime<Utc>) -> Result<()> {
    if time > Utc::now() {
        return Err(StorageError::FutureTimestamp { category, time });
    }
    Ok(())
}

#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Persists `reading` unless one already exists at exactly the same time.
    ///
    /// Concurrent calls for the same time never produce two rows; the losing
    /// call reports [`InsertOutcome::Matched`].
    async fn insert_reading_if_new(&self, reading: &NewReading) -> Result<InsertOutcome>;

    /// Readings with `start <= time <= end`, oldest first.
    async fn readings_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>>;
}

#[async_trait]
pub trait DoseStore: Send + Sync {
    async fn insert_dose(&self, dose: &NewDose) -> Result<InsertOutcome>;

    async fn dose_by_id(&self, id: &str) -> Result<Option<Dose>>;

    /// Overwrites the dose with the same id. Fails with `NotFound` when the
    /// id does not exist; edits never insert.
    async fn replace_dose(&self, dose: &Dose) -> Result<()>;

    /// Removes the dose. Returns whether a row existed.
    async fn delete_dose(&self, id: &str) -> Result<bool>;

    async fn doses_between(&self, start: DateTime<Utc>, end: DateTime<Utc>)
        -> Result<Vec<Dose>>;

    /// Resolves a full id or a short reference among doses logged within
    /// `lookback` of now.
    async fn resolve_dose_reference(&self, token: &str, lookback: Duration) -> Result<String> {
        if !is_short_reference(token) {
            return match self.dose_by_id(token).await? {
                Some(dose) => Ok(dose.id),
                None => Err(StorageError::NotFound {
                    category: Category::Dose,
                    id: token.to_string(),
                }),
            };
        }
        let now = Utc::now();
        let recent = self.doses_between(now - lookback, now).await?;
        reference::resolve_reference(Category::Dose, token, &recent)
    }
}

#[async_trait]
pub trait IntakeStore: Send + Sync {
    async fn insert_intake(&self, intake: &NewIntake) -> Result<InsertOutcome>;

    async fn intake_by_id(&self, id: &str) -> Result<Option<Intake>>;

    /// Overwrites the intake with the same id; `NotFound` when absent.
    async fn replace_intake(&self, intake: &Intake) -> Result<()>;

    async fn delete_intake(&self, id: &str) -> Result<bool>;

    async fn intakes_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Intake>>;

    async fn resolve_intake_reference(&self, token: &str, lookback: Duration) -> Result<String> {
        if !is_short_reference(token) {
            return match self.intake_by_id(token).await? {
                Some(intake) => Ok(intake.id),
                None => Err(StorageError::NotFound {
                    category: Category::Intake,
                    id: token.to_string(),
                }),
            };
        }
        let now = Utc::now();
        let recent = self.intakes_between(now - lookback, now).await?;
        reference::resolve_reference(Category::Intake, token, &recent)
    }
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn insert_alert(&self, alert: &NewAlert) -> Result<InsertOutcome>;

    async fn alerts_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Alert>>;
}

/// Transient chart files shared with the rendering service.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn put_file(&self, name: &str, data: &[u8]) -> Result<String>;

    async fn read_file(&self, id: &str) -> Result<RenderedFile>;

    async fn delete_file(&self, id: &str) -> Result<bool>;
}
