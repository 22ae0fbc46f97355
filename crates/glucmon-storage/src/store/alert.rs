use async_trait::async_trait;
use chrono::{DateTime, Utc};
use glucmon_common::types::{Alert, NewAlert};
use sea_orm::{ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder};

use crate::entities::alert::{self, Column, Entity};
use crate::store::{from_millis, to_millis, EventStore};
use crate::{ensure_not_future, AlertStore, Category, InsertOutcome, Result, StorageError};

fn to_alert(m: alert::Model) -> Result<Alert> {
    let label = m.label.parse().map_err(|_| StorageError::Corrupt {
        category: Category::Alert,
        column: "label",
        value: m.label.clone(),
    })?;
    Ok(Alert {
        time: from_millis(Category::Alert, m.time_ms)?,
        id: m.id,
        label,
        reason: m.reason,
    })
}

#[async_trait]
impl AlertStore for EventStore {
    async fn insert_alert(&self, alert: &NewAlert) -> Result<InsertOutcome> {
        ensure_not_future(Category::Alert, alert.time)?;
        let id = glucmon_common::id::next_id();
        let am = alert::ActiveModel {
            id: Set(id.clone()),
            time_ms: Set(to_millis(alert.time)),
            label: Set(alert.label.as_str().to_string()),
            reason: Set(alert.reason.clone()),
            created_at: Set(Utc::now()),
        };
        Entity::insert(am).exec_without_returning(self.db()).await?;
        Ok(InsertOutcome::Inserted(id))
    }

    async fn alerts_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Alert>> {
        Entity::find()
            .filter(Column::TimeMs.gte(to_millis(start)))
            .filter(Column::TimeMs.lte(to_millis(end)))
            .order_by(Column::TimeMs, Order::Asc)
            .all(self.db())
            .await?
            .into_iter()
            .map(to_alert)
            .collect()
    }
}
