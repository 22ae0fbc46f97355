use async_trait::async_trait;
use chrono::{DateTime, Utc};
use glucmon_common::types::{Intake, NewIntake};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder,
};

use crate::entities::intake::{self, Column, Entity};
use crate::store::{from_millis, to_millis, EventStore};
use crate::{ensure_not_future, Category, InsertOutcome, IntakeStore, Result, StorageError};

fn to_intake(m: intake::Model) -> Result<Intake> {
    Ok(Intake {
        time: from_millis(Category::Intake, m.time_ms)?,
        id: m.id,
        amount: m.amount,
    })
}

#[async_trait]
impl IntakeStore for EventStore {
    async fn insert_intake(&self, intake: &NewIntake) -> Result<InsertOutcome> {
        ensure_not_future(Category::Intake, intake.time)?;
        let id = glucmon_common::id::next_id();
        let now = Utc::now();
        let am = intake::ActiveModel {
            id: Set(id.clone()),
            time_ms: Set(to_millis(intake.time)),
            amount: Set(intake.amount),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Entity::insert(am).exec_without_returning(self.db()).await?;
        Ok(InsertOutcome::Inserted(id))
    }

    async fn intake_by_id(&self, id: &str) -> Result<Option<Intake>> {
        Entity::find_by_id(id.to_string())
            .one(self.db())
            .await?
            .map(to_intake)
            .transpose()
    }

    async fn replace_intake(&self, intake: &Intake) -> Result<()> {
        ensure_not_future(Category::Intake, intake.time)?;
        let existing = Entity::find_by_id(intake.id.clone())
            .one(self.db())
            .await?
            .ok_or_else(|| StorageError::NotFound {
                category: Category::Intake,
                id: intake.id.clone(),
            })?;

        let mut am: intake::ActiveModel = existing.into();
        am.time_ms = Set(to_millis(intake.time));
        am.amount = Set(intake.amount);
        am.updated_at = Set(Utc::now());
        am.update(self.db()).await?;
        Ok(())
    }

    async fn delete_intake(&self, id: &str) -> Result<bool> {
        let res = Entity::delete_by_id(id.to_string()).exec(self.db()).await?;
        Ok(res.rows_affected > 0)
    }

    async fn intakes_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Intake>> {
        Entity::find()
            .filter(Column::TimeMs.gte(to_millis(start)))
            .filter(Column::TimeMs.lte(to_millis(end)))
            .order_by(Column::TimeMs, Order::Asc)
            .order_by(Column::Id, Order::Asc)
            .all(self.db())
            .await?
            .into_iter()
            .map(to_intake)
            .collect()
    }
}
