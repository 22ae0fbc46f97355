//! User-issued add/edit/delete of doses and intakes.

use chrono::{DateTime, Duration, Utc};
use glucmon_common::types::{Dose, DoseCategory, Intake, NewDose, NewIntake, Visibility};
use glucmon_storage::{Category, StorageError};
use std::sync::Arc;

use crate::display::{DisplayReconciler, UpdateMode};
use crate::MutationStore;

/// What an edit does to the amount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AmountChange {
    Keep,
    Set(f64),
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoseEdit {
    /// Full id or short reference.
    pub reference: String,
    pub category: Option<DoseCategory>,
    pub amount: AmountChange,
    pub offset: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntakeEdit {
    pub reference: String,
    pub amount: AmountChange,
    pub offset: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Added { id: String },
    Updated { id: String },
    Deleted { id: String },
}

impl MutationOutcome {
    pub fn id(&self) -> &str {
        match self {
            Self::Added { id } | Self::Updated { id } | Self::Deleted { id } => id,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    #[error("amount must be a non-negative number (got {0})")]
    InvalidAmount(f64),

    #[error("unable to set time after current time ({0})")]
    FutureTime(DateTime<Utc>),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl MutationError {
    /// Whether the user can fix this by changing the command.
    pub fn is_user_error(&self) -> bool {
        match self {
            Self::InvalidAmount(_) | Self::FutureTime(_) => true,
            Self::Storage(e) => e.is_user_error(),
        }
    }
}

fn check_amount(amount: f64) -> Result<f64, MutationError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(MutationError::InvalidAmount(amount));
    }
    Ok(amount)
}

fn shifted(time: DateTime<Utc>, offset: Option<Duration>) -> Result<DateTime<Utc>, MutationError> {
    let new_time = match offset {
        Some(offset) => time + offset,
        None => time,
    };
    if new_time > Utc::now() {
        return Err(MutationError::FutureTime(new_time));
    }
    Ok(new_time)
}

pub struct MutationHandler {
    store: Arc<dyn MutationStore>,
    display: Arc<DisplayReconciler>,
    reference_lookback: Duration,
}

impl MutationHandler {
    pub fn new(
        store: Arc<dyn MutationStore>,
        display: Arc<DisplayReconciler>,
        reference_lookback: Duration,
    ) -> Self {
        Self {
            store,
            display,
            reference_lookback,
        }
    }

    pub async fn add_dose(
        &self,
        category: DoseCategory,
        amount: f64,
    ) -> Result<MutationOutcome, MutationError> {
        let amount = check_amount(amount)?;
        let outcome = self
            .store
            .insert_dose(&NewDose {
                time: Utc::now(),
                category,
                amount,
            })
            .await?;
        let id = outcome.id().unwrap_or_default().to_string();
        tracing::info!(id = %id, category = %category, amount, "Dose logged");
        self.refresh().await;
        Ok(MutationOutcome::Added { id })
    }

    pub async fn add_intake(&self, amount: f64) -> Result<MutationOutcome, MutationError> {
        let amount = check_amount(amount)?;
        let outcome = self
            .store
            .insert_intake(&NewIntake {
                time: Utc::now(),
                amount,
            })
            .await?;
        let id = outcome.id().unwrap_or_default().to_string();
        tracing::info!(id = %id, amount, "Intake logged");
        self.refresh().await;
        Ok(MutationOutcome::Added { id })
    }

    pub async fn edit_dose(&self, edit: DoseEdit) -> Result<MutationOutcome, MutationError> {
        let id = self
            .store
            .resolve_dose_reference(&edit.reference, self.reference_lookback)
            .await?;
        let existing = self.store.dose_by_id(&id).await?.ok_or_else(|| StorageError::NotFound {
            category: Category::Dose,
            id: id.clone(),
        })?;

        let amount = match edit.amount {
            AmountChange::Delete => {
                self.store.delete_dose(&id).await?;
                tracing::info!(id = %id, "Dose deleted");
                self.refresh().await;
                return Ok(MutationOutcome::Deleted { id });
            }
            AmountChange::Set(amount) => check_amount(amount)?,
            AmountChange::Keep => existing.amount,
        };

        let updated = Dose {
            time: shifted(existing.time, edit.offset)?,
            category: edit.category.unwrap_or(existing.category),
            amount,
            id,
        };
        self.store.replace_dose(&updated).await?;
        tracing::info!(id = %updated.id, category = %updated.category, amount, "Dose edited");
        self.refresh().await;
        Ok(MutationOutcome::Updated { id: updated.id })
    }

    pub async fn edit_intake(&self, edit: IntakeEdit) -> Result<MutationOutcome, MutationError> {
        let id = self
            .store
            .resolve_intake_reference(&edit.reference, self.reference_lookback)
            .await?;
        let existing = self
            .store
            .intake_by_id(&id)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                category: Category::Intake,
                id: id.clone(),
            })?;

        let amount = match edit.amount {
            AmountChange::Delete => {
                self.store.delete_intake(&id).await?;
                tracing::info!(id = %id, "Intake deleted");
                self.refresh().await;
                return Ok(MutationOutcome::Deleted { id });
            }
            AmountChange::Set(amount) => check_amount(amount)?,
            AmountChange::Keep => existing.amount,
        };

        let updated = Intake {
            time: shifted(existing.time, edit.offset)?,
            amount,
            id,
        };
        self.store.replace_intake(&updated).await?;
        tracing::info!(id = %updated.id, amount, "Intake edited");
        self.refresh().await;
        Ok(MutationOutcome::Updated { id: updated.id })
    }

    pub async fn set_visibility(&self, visibility: Visibility) {
        self.display.set_visibility(visibility);
        tracing::info!(visibility = %visibility, "Display visibility changed");
        self.refresh().await;
    }

    /// The change is already stored; a failed refresh is picked up next tick.
    async fn refresh(&self) {
        if let Err(e) = self.display.update(UpdateMode::Always).await {
            tracing::warn!(error = %e, "Display refresh after mutation failed");
        }
    }
}
