use async_trait::async_trait;
use chrono::{DateTime, Utc};
use glucmon_common::types::{Dose, NewDose};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder,
};

use crate::entities::dose::{self, Column, Entity};
use crate::store::{from_millis, to_millis, EventStore};
use crate::{ensure_not_future, Category, DoseStore, InsertOutcome, Result, StorageError};

fn to_dose(m: dose::Model) -> Result<Dose> {
    let category = m.category.parse().map_err(|_| StorageError::Corrupt {
        category: Category::Dose,
        column: "category",
        value: m.category.clone(),
    })?;
    Ok(Dose {
        time: from_millis(Category::Dose, m.time_ms)?,
        id: m.id,
        category,
        amount: m.amount,
    })
}

#[async_trait]
impl DoseStore for EventStore {
    async fn insert_dose(&self, dose: &NewDose) -> Result<InsertOutcome> {
        ensure_not_future(Category::Dose, dose.time)?;
        let id = glucmon_common::id::next_id();
        let now = Utc::now();
        let am = dose::ActiveModel {
            id: Set(id.clone()),
            time_ms: Set(to_millis(dose.time)),
            category: Set(dose.category.as_str().to_string()),
            amount: Set(dose.amount),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Entity::insert(am).exec_without_returning(self.db()).await?;
        Ok(InsertOutcome::Inserted(id))
    }

    async fn dose_by_id(&self, id: &str) -> Result<Option<Dose>> {
        Entity::find_by_id(id.to_string())
            .one(self.db())
            .await?
            .map(to_dose)
            .transpose()
    }

    async fn replace_dose(&self, dose: &Dose) -> Result<()> {
        ensure_not_future(Category::Dose, dose.time)?;
        let existing = Entity::find_by_id(dose.id.clone())
            .one(self.db())
            .await?
            .ok_or_else(|| StorageError::NotFound {
                category: Category::Dose,
                id: dose.id.clone(),
            })?;

        let mut am: dose::ActiveModel = existing.into();
        am.time_ms = Set(to_millis(dose.time));
        am.category = Set(dose.category.as_str().to_string());
        am.amount = Set(dose.amount);
        am.updated_at = Set(Utc::now());
        am.update(self.db()).await?;
        Ok(())
    }

    async fn delete_dose(&self, id: &str) -> Result<bool> {
        let res = Entity::delete_by_id(id.to_string()).exec(self.db()).await?;
        Ok(res.rows_affected > 0)
    }

    async fn doses_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Dose>> {
        Entity::find()
            .filter(Column::TimeMs.gte(to_millis(start)))
            .filter(Column::TimeMs.lte(to_millis(end)))
            .order_by(Column::TimeMs, Order::Asc)
            .order_by(Column::Id, Order::Asc)
            .all(self.db())
            .await?
            .into_iter()
            .map(to_dose)
            .collect()
    }
}
