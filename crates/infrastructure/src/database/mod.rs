pub mod sqlite;

pub use sqlite::{SqliteJobStore, SqliteMessageStore};

use std::str::FromStr;

use broker_core::{BrokerResult, DatabaseConfig};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation, StoreEntity};
use crate::store_context;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS job_configs (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        cron_expression TEXT,
        is_scheduled INTEGER NOT NULL DEFAULT 0,
        is_enabled INTEGER NOT NULL DEFAULT 1,
        previous_fire_time_utc TEXT,
        next_fire_time_utc TEXT,
        crm_url TEXT NOT NULL DEFAULT '',
        crm_client_id TEXT NOT NULL DEFAULT '',
        crm_secret TEXT NOT NULL DEFAULT '',
        updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        message_id TEXT PRIMARY KEY,
        job_id TEXT NOT NULL,
        tms_name TEXT NOT NULL DEFAULT '',
        message_label TEXT NOT NULL DEFAULT '',
        status INTEGER NOT NULL,
        request TEXT NOT NULL,
        correlation_id TEXT,
        pull_response TEXT,
        received_from_source_on TEXT,
        push_started_on TEXT,
        push_completed_on TEXT,
        pull_started_on TEXT,
        pull_completed_on TEXT,
        returned_to_source_on TEXT,
        comment TEXT,
        errors TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS message_headers (
        job_id TEXT PRIMARY KEY,
        esaa_username TEXT NOT NULL DEFAULT '',
        esaa_password TEXT NOT NULL DEFAULT '',
        provider_number TEXT NOT NULL DEFAULT '',
        tms_username TEXT NOT NULL DEFAULT ''
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_job_configs_enabled ON job_configs(is_enabled)",
    "CREATE INDEX IF NOT EXISTS idx_messages_job_status ON messages(job_id, status)",
];

/// SQLite 连接池和表结构管理
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> BrokerResult<Self> {
        debug!("连接数据库: {}", config.url);

        let connect_options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(connect_options)
            .await?;

        Ok(Self { pool })
    }

    /// 使用已有连接池，主要用于测试
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 可重复执行的表结构迁移
    pub async fn migrate(&self) -> BrokerResult<()> {
        let context = store_context!(RepositoryOperation::Migrate, StoreEntity::Schema);
        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;
        }
        info!("数据库迁移完成");
        Ok(())
    }

    pub async fn health_check(&self) -> BrokerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn job_store(&self) -> SqliteJobStore {
        SqliteJobStore::new(self.pool.clone())
    }

    pub fn message_store(&self) -> SqliteMessageStore {
        SqliteMessageStore::new(self.pool.clone())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
