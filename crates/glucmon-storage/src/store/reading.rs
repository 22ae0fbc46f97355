use async_trait::async_trait;
use chrono::{DateTime, Utc};
use glucmon_common::types::{NewReading, Reading};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder};

use crate::entities::reading::{self, Column, Entity};
use crate::store::{from_millis, to_millis, EventStore};
use crate::{ensure_not_future, Category, InsertOutcome, ReadingStore, Result, StorageError};

fn to_reading(m: reading::Model) -> Result<Reading> {
    let trend = m.trend.parse().map_err(|_| StorageError::Corrupt {
        category: Category::Reading,
        column: "trend",
        value: m.trend.clone(),
    })?;
    Ok(Reading {
        time: from_millis(Category::Reading, m.time_ms)?,
        id: m.id,
        mmol: m.mmol,
        trend,
    })
}

#[async_trait]
impl ReadingStore for EventStore {
    async fn insert_reading_if_new(&self, reading: &NewReading) -> Result<InsertOutcome> {
        ensure_not_future(Category::Reading, reading.time)?;
        let id = glucmon_common::id::next_id();
        let am = reading::ActiveModel {
            id: Set(id.clone()),
            time_ms: Set(to_millis(reading.time)),
            mmol: Set(reading.mmol),
            trend: Set(reading.trend.as_str().to_string()),
            created_at: Set(Utc::now()),
        };

        // UNIQUE(time_ms) + DO NOTHING: 冲突时影响行数为 0
        let inserted = Entity::insert(am)
            .on_conflict(OnConflict::column(Column::TimeMs).do_nothing().to_owned())
            .exec_without_returning(self.db())
            .await?;

        if inserted == 0 {
            Ok(InsertOutcome::Matched)
        } else {
            Ok(InsertOutcome::Inserted(id))
        }
    }

    async fn readings_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>> {
        Entity::find()
            .filter(Column::TimeMs.gte(to_millis(start)))
            .filter(Column::TimeMs.lte(to_millis(end)))
            .order_by(Column::TimeMs, Order::Asc)
            .all(self.db())
            .await?
            .into_iter()
            .map(to_reading)
            .collect()
    }
}
