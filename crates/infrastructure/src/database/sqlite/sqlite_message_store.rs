use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, instrument};
use uuid::Uuid;

use broker_core::BrokerResult;
use broker_domain::{Message, MessageHeaders, MessageStatus, MessageStore};

use super::{optional_uuid_column, uuid_column};
use crate::error_handling::{
    RepositoryErrorHelpers, RepositoryOperation, StoreEntity, StoreOperationContext,
};
use crate::store_context;

const MESSAGE_COLUMNS: &str = "message_id, job_id, tms_name, message_label, status, request, \
     correlation_id, pull_response, received_from_source_on, push_started_on, push_completed_on, \
     pull_started_on, pull_completed_on, returned_to_source_on, comment, errors";

/// 来源系统出站消息的 SQLite 实现
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 写入作业的 ESIS 消息头设置
    #[instrument(skip(self, headers), fields(job_id = %job_id))]
    pub async fn set_headers(&self, job_id: Uuid, headers: &MessageHeaders) -> BrokerResult<()> {
        let context =
            store_context!(RepositoryOperation::Update, StoreEntity::MessageHeaders, job_id);

        sqlx::query(
            r#"
            INSERT INTO message_headers (job_id, esaa_username, esaa_password, provider_number, tms_username)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(job_id) DO UPDATE SET
                esaa_username = excluded.esaa_username,
                esaa_password = excluded.esaa_password,
                provider_number = excluded.provider_number,
                tms_username = excluded.tms_username
            "#,
        )
        .bind(job_id.to_string())
        .bind(&headers.esaa_username)
        .bind(&headers.esaa_password)
        .bind(&headers.provider_number)
        .bind(&headers.tms_username)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        RepositoryErrorHelpers::log_operation_success(&context);
        Ok(())
    }

    pub async fn get(&self, message_id: Uuid) -> BrokerResult<Option<Message>> {
        let context = store_context!(RepositoryOperation::Read, StoreEntity::Message, message_id);

        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE message_id = ?1"
        ))
        .bind(message_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        row.map(|row| Self::row_to_message(&row, &context))
            .transpose()
    }

    async fn query_by_status(
        &self,
        job_id: Uuid,
        statuses: &[MessageStatus],
    ) -> BrokerResult<Vec<Message>> {
        let context = store_context!(RepositoryOperation::Query, StoreEntity::Message);

        let placeholders: Vec<String> = (2..=statuses.len() + 1).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE job_id = ?1 AND status IN ({})
             ORDER BY received_from_source_on, message_id",
            placeholders.join(", ")
        );

        let mut query = sqlx::query(&sql).bind(job_id.to_string());
        for status in statuses {
            query = query.bind(status.code());
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        debug!("作业 {} 查询到 {} 条消息", job_id, rows.len());
        rows.iter()
            .map(|row| Self::row_to_message(row, &context))
            .collect()
    }

    fn row_to_message(row: &SqliteRow, context: &StoreOperationContext) -> BrokerResult<Message> {
        let code: i32 = row.try_get("status")?;
        let status = MessageStatus::try_from(code)
            .map_err(|e| RepositoryErrorHelpers::mapping_error(context, e))?;

        Ok(Message {
            message_id: uuid_column(row, "message_id", context)?,
            job_id: uuid_column(row, "job_id", context)?,
            tms_name: row.try_get("tms_name")?,
            message_label: row.try_get("message_label")?,
            status,
            request: row.try_get("request")?,
            correlation_id: optional_uuid_column(row, "correlation_id", context)?,
            pull_response: row.try_get("pull_response")?,
            received_from_source_on: row.try_get("received_from_source_on")?,
            push_started_on: row.try_get("push_started_on")?,
            push_completed_on: row.try_get("push_completed_on")?,
            pull_started_on: row.try_get("pull_started_on")?,
            pull_completed_on: row.try_get("pull_completed_on")?,
            returned_to_source_on: row.try_get("returned_to_source_on")?,
            comment: row.try_get("comment")?,
            errors: row.try_get("errors")?,
        })
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn get_queued(&self, job_id: Uuid) -> BrokerResult<Vec<Message>> {
        self.query_by_status(job_id, &[MessageStatus::PulledFromSource])
            .await
    }

    async fn get_pending(&self, job_id: Uuid) -> BrokerResult<Vec<Message>> {
        self.query_by_status(
            job_id,
            &[
                MessageStatus::PushedToService,
                MessageStatus::PushedFetchToService,
            ],
        )
        .await
    }

    async fn get_awaiting_return(&self, job_id: Uuid) -> BrokerResult<Vec<Message>> {
        self.query_by_status(job_id, &[MessageStatus::PulledFromService])
            .await
    }

    #[instrument(skip(self, message), fields(message_id = %message.message_id, status = %message.status))]
    async fn save(&self, message: &Message) -> BrokerResult<()> {
        let context = store_context!(
            RepositoryOperation::Update,
            StoreEntity::Message,
            message.message_id
        );

        sqlx::query(
            r#"
            INSERT INTO messages (message_id, job_id, tms_name, message_label, status, request,
                correlation_id, pull_response, received_from_source_on, push_started_on,
                push_completed_on, pull_started_on, pull_completed_on, returned_to_source_on,
                comment, errors)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(message_id) DO UPDATE SET
                tms_name = excluded.tms_name,
                message_label = excluded.message_label,
                status = excluded.status,
                request = excluded.request,
                correlation_id = excluded.correlation_id,
                pull_response = excluded.pull_response,
                received_from_source_on = excluded.received_from_source_on,
                push_started_on = excluded.push_started_on,
                push_completed_on = excluded.push_completed_on,
                pull_started_on = excluded.pull_started_on,
                pull_completed_on = excluded.pull_completed_on,
                returned_to_source_on = excluded.returned_to_source_on,
                comment = excluded.comment,
                errors = excluded.errors
            "#,
        )
        .bind(message.message_id.to_string())
        .bind(message.job_id.to_string())
        .bind(&message.tms_name)
        .bind(&message.message_label)
        .bind(message.status.code())
        .bind(&message.request)
        .bind(message.correlation_id.map(|id| id.to_string()))
        .bind(&message.pull_response)
        .bind(message.received_from_source_on)
        .bind(message.push_started_on)
        .bind(message.push_completed_on)
        .bind(message.pull_started_on)
        .bind(message.pull_completed_on)
        .bind(message.returned_to_source_on)
        .bind(&message.comment)
        .bind(&message.errors)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        RepositoryErrorHelpers::log_operation_success(&context);
        Ok(())
    }

    /// 未配置的作业返回空消息头，由周期内的校验报告缺失项
    async fn message_headers(&self, job_id: Uuid) -> BrokerResult<MessageHeaders> {
        let context =
            store_context!(RepositoryOperation::Read, StoreEntity::MessageHeaders, job_id);

        let row = sqlx::query(
            "SELECT esaa_username, esaa_password, provider_number, tms_username
             FROM message_headers WHERE job_id = ?1",
        )
        .bind(job_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        match row {
            Some(row) => Ok(MessageHeaders {
                esaa_username: row.try_get("esaa_username")?,
                esaa_password: row.try_get("esaa_password")?,
                provider_number: row.try_get("provider_number")?,
                tms_username: row.try_get("tms_username")?,
            }),
            None => Ok(MessageHeaders::default()),
        }
    }
}
