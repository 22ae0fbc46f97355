//! In-process store with the same semantics as [`crate::EventStore`].
//!
//! Nothing survives a restart. Used for component tests and dry runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use glucmon_common::types::{
    Alert, Dose, Intake, NewAlert, NewDose, NewIntake, NewReading, Reading, Record,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::{
    ensure_not_future, AlertStore, Category, DoseStore, FileStore, InsertOutcome, IntakeStore,
    ReadingStore, RenderedFile, Result, StorageError,
};

#[derive(Default)]
struct Tables {
    readings: Vec<Reading>,
    doses: Vec<Dose>,
    intakes: Vec<Intake>,
    alerts: Vec<Alert>,
    files: HashMap<String, RenderedFile>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn between<R: Record + Clone>(records: &[R], start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<R> {
    let mut out: Vec<R> = records
        .iter()
        .filter(|r| r.time() >= start && r.time() <= end)
        .cloned()
        .collect();
    out.sort_by(|a, b| a.time().cmp(&b.time()).then_with(|| a.id().cmp(b.id())));
    out
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn insert_reading_if_new(&self, reading: &NewReading) -> Result<InsertOutcome> {
        ensure_not_future(Category::Reading, reading.time)?;
        let mut tables = self.tables();
        if tables.readings.iter().any(|r| r.time == reading.time) {
            return Ok(InsertOutcome::Matched);
        }
        let id = glucmon_common::id::next_id();
        tables.readings.push(Reading {
            id: id.clone(),
            time: reading.time,
            mmol: reading.mmol,
            trend: reading.trend,
        });
        Ok(InsertOutcome::Inserted(id))
    }

    async fn readings_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>> {
        Ok(between(&self.tables().readings, start, end))
    }
}

#[async_trait]
impl DoseStore for MemoryStore {
    async fn insert_dose(&self, dose: &NewDose) -> Result<InsertOutcome> {
        ensure_not_future(Category::Dose, dose.time)?;
        let id = glucmon_common::id::next_id();
        self.tables().doses.push(Dose {
            id: id.clone(),
            time: dose.time,
            category: dose.category,
            amount: dose.amount,
        });
        Ok(InsertOutcome::Inserted(id))
    }

    async fn dose_by_id(&self, id: &str) -> Result<Option<Dose>> {
        Ok(self.tables().doses.iter().find(|d| d.id == id).cloned())
    }

    async fn replace_dose(&self, dose: &Dose) -> Result<()> {
        ensure_not_future(Category::Dose, dose.time)?;
        let mut tables = self.tables();
        let slot = tables
            .doses
            .iter_mut()
            .find(|d| d.id == dose.id)
            .ok_or_else(|| StorageError::NotFound {
                category: Category::Dose,
                id: dose.id.clone(),
            })?;
        *slot = dose.clone();
        Ok(())
    }

    async fn delete_dose(&self, id: &str) -> Result<bool> {
        let mut tables = self.tables();
        let before = tables.doses.len();
        tables.doses.retain(|d| d.id != id);
        Ok(tables.doses.len() < before)
    }

    async fn doses_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Dose>> {
        Ok(between(&self.tables().doses, start, end))
    }
}

#[async_trait]
impl IntakeStore for MemoryStore {
    async fn insert_intake(&self, intake: &NewIntake) -> Result<InsertOutcome> {
        ensure_not_future(Category::Intake, intake.time)?;
        let id = glucmon_common::id::next_id();
        self.tables().intakes.push(Intake {
            id: id.clone(),
            time: intake.time,
            amount: intake.amount,
        });
        Ok(InsertOutcome::Inserted(id))
    }

    async fn intake_by_id(&self, id: &str) -> Result<Option<Intake>> {
        Ok(self.tables().intakes.iter().find(|i| i.id == id).cloned())
    }

    async fn replace_intake(&self, intake: &Intake) -> Result<()> {
        ensure_not_future(Category::Intake, intake.time)?;
        let mut tables = self.tables();
        let slot = tables
            .intakes
            .iter_mut()
            .find(|i| i.id == intake.id)
            .ok_or_else(|| StorageError::NotFound {
                category: Category::Intake,
                id: intake.id.clone(),
            })?;
        *slot = intake.clone();
        Ok(())
    }

    async fn delete_intake(&self, id: &str) -> Result<bool> {
        let mut tables = self.tables();
        let before = tables.intakes.len();
        tables.intakes.retain(|i| i.id != id);
        Ok(tables.intakes.len() < before)
    }

    async fn intakes_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Intake>> {
        Ok(between(&self.tables().intakes, start, end))
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn insert_alert(&self, alert: &NewAlert) -> Result<InsertOutcome> {
        ensure_not_future(Category::Alert, alert.time)?;
        let id = glucmon_common::id::next_id();
        self.tables().alerts.push(Alert {
            id: id.clone(),
            time: alert.time,
            label: alert.label,
            reason: alert.reason.clone(),
        });
        Ok(InsertOutcome::Inserted(id))
    }

    async fn alerts_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Alert>> {
        Ok(between(&self.tables().alerts, start, end))
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn put_file(&self, name: &str, data: &[u8]) -> Result<String> {
        let id = glucmon_common::id::next_id();
        self.tables().files.insert(
            id.clone(),
            RenderedFile {
                id: id.clone(),
                name: name.to_string(),
                data: data.to_vec(),
            },
        );
        Ok(id)
    }

    async fn read_file(&self, id: &str) -> Result<RenderedFile> {
        self.tables()
            .files
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                category: Category::File,
                id: id.to_string(),
            })
    }

    async fn delete_file(&self, id: &str) -> Result<bool> {
        Ok(self.tables().files.remove(id).is_some())
    }
}
