use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, instrument};
use uuid::Uuid;

use broker_core::{BrokerError, BrokerResult};
use broker_domain::{JobConfig, JobCredentials, JobStore};

use super::uuid_column;
use crate::error_handling::{
    RepositoryErrorHelpers, RepositoryOperation, StoreEntity, StoreOperationContext,
};
use crate::store_context;

const JOB_COLUMNS: &str = "id, name, cron_expression, is_scheduled, is_enabled, \
     previous_fire_time_utc, next_fire_time_utc, crm_url, crm_client_id, crm_secret";

pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &SqliteRow, context: &StoreOperationContext) -> BrokerResult<JobConfig> {
        Ok(JobConfig {
            id: uuid_column(row, "id", context)?,
            name: row.try_get("name")?,
            cron_expression: row.try_get("cron_expression")?,
            is_scheduled: row.try_get("is_scheduled")?,
            is_enabled: row.try_get("is_enabled")?,
            previous_fire_time_utc: row.try_get("previous_fire_time_utc")?,
            next_fire_time_utc: row.try_get("next_fire_time_utc")?,
            credentials: JobCredentials {
                crm_url: row.try_get("crm_url")?,
                crm_client_id: row.try_get("crm_client_id")?,
                crm_secret: row.try_get("crm_secret")?,
            },
        })
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    #[instrument(skip(self), fields(job_id = %job_id))]
    async fn get(&self, job_id: Uuid) -> BrokerResult<Option<JobConfig>> {
        let context = store_context!(RepositoryOperation::Read, StoreEntity::Job, job_id);

        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM job_configs WHERE id = ?1"))
            .bind(job_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        match row {
            Some(row) => Ok(Some(Self::row_to_job(&row, &context)?)),
            None => {
                debug!("作业配置不存在: {}", job_id);
                Ok(None)
            }
        }
    }

    /// 上次触发时间只在插入时写入
    #[instrument(skip(self, job), fields(job_id = %job.id, job_name = %job.name))]
    async fn save(&self, job: &JobConfig) -> BrokerResult<()> {
        let context = store_context!(RepositoryOperation::Update, StoreEntity::Job, job.id);

        sqlx::query(
            r#"
            INSERT INTO job_configs (id, name, cron_expression, is_scheduled, is_enabled,
                previous_fire_time_utc, next_fire_time_utc, crm_url, crm_client_id, crm_secret)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                cron_expression = excluded.cron_expression,
                is_scheduled = excluded.is_scheduled,
                is_enabled = excluded.is_enabled,
                next_fire_time_utc = excluded.next_fire_time_utc,
                crm_url = excluded.crm_url,
                crm_client_id = excluded.crm_client_id,
                crm_secret = excluded.crm_secret,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(job.id.to_string())
        .bind(&job.name)
        .bind(&job.cron_expression)
        .bind(job.is_scheduled)
        .bind(job.is_enabled)
        .bind(job.previous_fire_time_utc)
        .bind(job.next_fire_time_utc)
        .bind(&job.credentials.crm_url)
        .bind(&job.credentials.crm_client_id)
        .bind(&job.credentials.crm_secret)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        RepositoryErrorHelpers::log_operation_success(&context);
        Ok(())
    }

    async fn list_enabled(&self) -> BrokerResult<Vec<JobConfig>> {
        let context = store_context!(RepositoryOperation::Query, StoreEntity::Job);

        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM job_configs WHERE is_enabled = 1 ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        rows.iter()
            .map(|row| Self::row_to_job(row, &context))
            .collect()
    }

    #[instrument(skip(self), fields(job_id = %job_id))]
    async fn update_fire_times(
        &self,
        job_id: Uuid,
        previous_fire_time_utc: Option<DateTime<Utc>>,
        next_fire_time_utc: Option<DateTime<Utc>>,
    ) -> BrokerResult<()> {
        let context = store_context!(RepositoryOperation::Update, StoreEntity::Job, job_id);

        let result = sqlx::query(
            r#"
            UPDATE job_configs
            SET previous_fire_time_utc = ?2, next_fire_time_utc = ?3, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?1
            "#,
        )
        .bind(job_id.to_string())
        .bind(previous_fire_time_utc)
        .bind(next_fire_time_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        if result.rows_affected() == 0 {
            return Err(BrokerError::JobNotFound { id: job_id });
        }
        Ok(())
    }
}
