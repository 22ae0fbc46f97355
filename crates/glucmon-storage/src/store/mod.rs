use chrono::{DateTime, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::path::Path;
use std::time::Duration;

use crate::{Category, Result, StorageError};

pub mod alert;
pub mod dose;
pub mod file;
pub mod intake;
pub mod reading;

/// 事件数据库的统一访问层。
///
/// 所有方法均为 `async fn`，底层使用 SeaORM + SQLite。
pub struct EventStore {
    db: DatabaseConnection,
}

impl EventStore {
    /// Connects to the event database and runs pending migrations.
    ///
    /// `db_url` example: `sqlite://data/glucmon.db?mode=rwc`. The parent
    /// directory of a SQLite file is created when missing. `timeout` bounds
    /// both the initial connect and every pool acquire.
    pub async fn connect(db_url: &str, timeout: Duration) -> Result<Self> {
        if let Some(dir) = sqlite_parent_dir(db_url) {
            std::fs::create_dir_all(dir)?;
        }

        let mut options = ConnectOptions::new(db_url.to_owned());
        options
            .connect_timeout(timeout)
            .acquire_timeout(timeout)
            .sqlx_logging(false);
        let db = Database::connect(options).await?;

        // WAL 模式仅对 SQLite 有效
        if db_url.starts_with("sqlite:") {
            db.execute_unprepared("PRAGMA journal_mode=WAL;").await?;
        }

        Migrator::up(&db, None).await?;

        tracing::info!("Initialized event store (SeaORM)");
        Ok(Self { db })
    }

    pub(crate) fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

fn sqlite_parent_dir(db_url: &str) -> Option<&Path> {
    let path = db_url.strip_prefix("sqlite://")?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
}

pub(crate) fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub(crate) fn from_millis(category: Category, ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| StorageError::Corrupt {
        category,
        column: "time_ms",
        value: ms.to_string(),
    })
}
