use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use broker_core::{BrokerError, BrokerResult};

/// 作业连接凭据，由作业存储独占维护，核心逻辑只负责透传
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobCredentials {
    pub crm_url: String,
    pub crm_client_id: String,
    #[serde(skip_serializing)]
    pub crm_secret: String,
}

impl JobCredentials {
    pub fn new(crm_url: &str, crm_client_id: &str, crm_secret: &str) -> Self {
        Self {
            crm_url: crm_url.to_string(),
            crm_client_id: crm_client_id.to_string(),
            crm_secret: crm_secret.to_string(),
        }
    }
}

impl fmt::Debug for JobCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobCredentials")
            .field("crm_url", &self.crm_url)
            .field("crm_client_id", &self.crm_client_id)
            .field("crm_secret", &"***")
            .finish()
    }
}

/// 租户作业配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub id: Uuid,
    pub name: String,
    pub cron_expression: Option<String>,
    pub is_scheduled: bool,
    pub is_enabled: bool,
    pub previous_fire_time_utc: Option<DateTime<Utc>>,
    pub next_fire_time_utc: Option<DateTime<Utc>>,
    #[serde(skip_serializing, default)]
    pub credentials: JobCredentials,
}

impl JobConfig {
    pub fn new(name: String, credentials: JobCredentials) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            cron_expression: None,
            is_scheduled: false,
            is_enabled: true,
            previous_fire_time_utc: None,
            next_fire_time_utc: None,
            credentials,
        }
    }

    /// 作业是否应当持有一个活动的触发器
    pub fn wants_trigger(&self) -> bool {
        self.is_enabled && self.is_scheduled
    }

    pub fn cron(&self) -> &str {
        self.cron_expression.as_deref().unwrap_or("")
    }

    pub fn entity_description(&self) -> String {
        format!("作业 '{}' (ID: {})", self.name, self.id)
    }
}

/// 消息状态。状态之间构成有向无环图而非线性序列，数值与持久化存储保持一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageStatus {
    PulledFromSource,
    PushedToService,
    Failed,
    PulledFromService,
    ReturnedToSource,
    Unknown,
    PushedFetchToService,
}

impl MessageStatus {
    pub fn code(self) -> i32 {
        match self {
            MessageStatus::PulledFromSource => 0,
            MessageStatus::PushedToService => 1,
            MessageStatus::Failed => 2,
            MessageStatus::PulledFromService => 3,
            MessageStatus::ReturnedToSource => 4,
            MessageStatus::Unknown => 5,
            MessageStatus::PushedFetchToService => 6,
        }
    }

    pub fn is_pushed(self) -> bool {
        matches!(
            self,
            MessageStatus::PushedToService | MessageStatus::PushedFetchToService
        )
    }

    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        use MessageStatus::*;
        matches!(
            (self, next),
            (PulledFromSource, PushedToService)
                | (PulledFromSource, PushedFetchToService)
                | (PushedToService, Failed)
                | (PushedToService, PulledFromService)
                | (PushedToService, Unknown)
                | (PushedFetchToService, Failed)
                | (PushedFetchToService, PulledFromService)
                | (PushedFetchToService, Unknown)
                | (PulledFromService, ReturnedToSource)
        )
    }
}

impl TryFrom<i32> for MessageStatus {
    type Error = BrokerError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(MessageStatus::PulledFromSource),
            1 => Ok(MessageStatus::PushedToService),
            2 => Ok(MessageStatus::Failed),
            3 => Ok(MessageStatus::PulledFromService),
            4 => Ok(MessageStatus::ReturnedToSource),
            5 => Ok(MessageStatus::Unknown),
            6 => Ok(MessageStatus::PushedFetchToService),
            _ => Err(BrokerError::Serialization(format!(
                "Invalid message status: {code}"
            ))),
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageStatus::PulledFromSource => "PulledFromSource",
            MessageStatus::PushedToService => "PushedToService",
            MessageStatus::Failed => "Failed",
            MessageStatus::PulledFromService => "PulledFromService",
            MessageStatus::ReturnedToSource => "ReturnedToSource",
            MessageStatus::Unknown => "Unknown",
            MessageStatus::PushedFetchToService => "PushedFetchToService",
        };
        f.write_str(name)
    }
}

/// 请求的两种互斥形态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    Fetch,
    Upload,
}

impl RequestKind {
    pub fn pushed_status(self) -> MessageStatus {
        match self {
            RequestKind::Fetch => MessageStatus::PushedFetchToService,
            RequestKind::Upload => MessageStatus::PushedToService,
        }
    }

    pub fn from_pushed_status(status: MessageStatus) -> Option<Self> {
        match status {
            MessageStatus::PushedFetchToService => Some(RequestKind::Fetch),
            MessageStatus::PushedToService => Some(RequestKind::Upload),
            _ => None,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Fetch => f.write_str("fetch"),
            RequestKind::Upload => f.write_str("upload"),
        }
    }
}

/// 与 ESIS 交换的一条消息，ID 与 CRM 记录一一对应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: Uuid,
    pub job_id: Uuid,
    pub tms_name: String,
    pub message_label: String,
    pub status: MessageStatus,
    pub request: String,
    /// ESIS 在推送时返回的关联ID
    pub correlation_id: Option<Uuid>,
    pub pull_response: Option<String>,
    pub received_from_source_on: Option<DateTime<Utc>>,
    pub push_started_on: Option<DateTime<Utc>>,
    pub push_completed_on: Option<DateTime<Utc>>,
    pub pull_started_on: Option<DateTime<Utc>>,
    pub pull_completed_on: Option<DateTime<Utc>>,
    pub returned_to_source_on: Option<DateTime<Utc>>,
    pub comment: Option<String>,
    pub errors: Option<String>,
}

impl Message {
    pub fn new(message_id: Uuid, job_id: Uuid, request: String) -> Self {
        Self {
            message_id,
            job_id,
            tms_name: String::new(),
            message_label: String::new(),
            status: MessageStatus::PulledFromSource,
            request,
            correlation_id: None,
            pull_response: None,
            received_from_source_on: Some(Utc::now()),
            push_started_on: None,
            push_completed_on: None,
            pull_started_on: None,
            pull_completed_on: None,
            returned_to_source_on: None,
            comment: None,
            errors: None,
        }
    }

    /// 按状态图推进状态，非法转换返回错误且不修改消息
    pub fn transition_to(&mut self, next: MessageStatus) -> BrokerResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(BrokerError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn request_kind(&self) -> Option<RequestKind> {
        RequestKind::from_pushed_status(self.status)
    }
}
