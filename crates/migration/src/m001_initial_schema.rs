use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_initial_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await?;
        Ok(())
    }
}

// Event times are unix milliseconds so range scans compare integers.
const UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS readings (
    id TEXT PRIMARY KEY NOT NULL,
    time_ms INTEGER NOT NULL UNIQUE,
    mmol REAL NOT NULL,
    trend TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS doses (
    id TEXT PRIMARY KEY NOT NULL,
    time_ms INTEGER NOT NULL,
    category TEXT NOT NULL,
    amount REAL NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_doses_time ON doses(time_ms);

CREATE TABLE IF NOT EXISTS intakes (
    id TEXT PRIMARY KEY NOT NULL,
    time_ms INTEGER NOT NULL,
    amount REAL NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_intakes_time ON intakes(time_ms);

CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY NOT NULL,
    time_ms INTEGER NOT NULL,
    label TEXT NOT NULL,
    reason TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alerts_label_time ON alerts(label, time_ms);

CREATE TABLE IF NOT EXISTS rendered_files (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    data BLOB NOT NULL,
    created_at TEXT NOT NULL
);
";

const DOWN_SQL: &str = "
DROP TABLE IF EXISTS rendered_files;
DROP TABLE IF EXISTS alerts;
DROP TABLE IF EXISTS intakes;
DROP TABLE IF EXISTS doses;
DROP TABLE IF EXISTS readings;
";
