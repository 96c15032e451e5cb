//! 领域仓储抽象
//!
//! 作业存储是排程意图的唯一事实来源；消息存储代表来源系统（CRM）中的出站记录。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entities::{JobConfig, Message};
use crate::value_objects::MessageHeaders;
use broker_core::BrokerResult;

/// 作业配置仓储抽象
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self, job_id: Uuid) -> BrokerResult<Option<JobConfig>>;
    /// 写入作业配置。已存在的作业保留存储中的上次触发时间，该字段只由
    /// [`JobStore::update_fire_times`] 写入，配置的读改写不会覆盖并发触发的记录。
    async fn save(&self, job: &JobConfig) -> BrokerResult<()>;
    async fn list_enabled(&self) -> BrokerResult<Vec<JobConfig>>;
    /// 只更新触发时间字段，不影响并发的配置变更
    async fn update_fire_times(
        &self,
        job_id: Uuid,
        previous_fire_time_utc: Option<DateTime<Utc>>,
        next_fire_time_utc: Option<DateTime<Utc>>,
    ) -> BrokerResult<()>;
}

/// 消息仓储抽象
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// 等待推送的消息
    async fn get_queued(&self, job_id: Uuid) -> BrokerResult<Vec<Message>>;
    /// 已推送、等待拉取结果的消息
    async fn get_pending(&self, job_id: Uuid) -> BrokerResult<Vec<Message>>;
    /// 已拉取结果、尚未回传的消息
    async fn get_awaiting_return(&self, job_id: Uuid) -> BrokerResult<Vec<Message>>;
    /// 整条消息一次性写入
    async fn save(&self, message: &Message) -> BrokerResult<()>;
    async fn message_headers(&self, job_id: Uuid) -> BrokerResult<MessageHeaders>;
}
