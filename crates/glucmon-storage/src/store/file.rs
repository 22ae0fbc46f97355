use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveValue::Set, EntityTrait};

use crate::entities::rendered_file::{self, Entity};
use crate::store::EventStore;
use crate::{Category, FileStore, RenderedFile, Result, StorageError};

#[async_trait]
impl FileStore for EventStore {
    async fn put_file(&self, name: &str, data: &[u8]) -> Result<String> {
        let id = glucmon_common::id::next_id();
        let am = rendered_file::ActiveModel {
            id: Set(id.clone()),
            name: Set(name.to_string()),
            data: Set(data.to_vec()),
            created_at: Set(Utc::now()),
        };
        Entity::insert(am).exec_without_returning(self.db()).await?;
        Ok(id)
    }

    async fn read_file(&self, id: &str) -> Result<RenderedFile> {
        let m = Entity::find_by_id(id.to_string())
            .one(self.db())
            .await?
            .ok_or_else(|| StorageError::NotFound {
                category: Category::File,
                id: id.to_string(),
            })?;
        Ok(RenderedFile {
            id: m.id,
            name: m.name,
            data: m.data,
        })
    }

    async fn delete_file(&self, id: &str) -> Result<bool> {
        let res = Entity::delete_by_id(id.to_string()).exec(self.db()).await?;
        Ok(res.rows_affected > 0)
    }
}
