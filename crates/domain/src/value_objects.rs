use serde::{Deserialize, Serialize};
use std::fmt;

use broker_core::{BrokerError, BrokerResult};

/// API 边界上的排程意图，进入协调引擎之前归一化为普通布尔值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleIntent {
    #[default]
    Unspecified,
    Enabled,
    Disabled,
}

impl ScheduleIntent {
    pub fn resolve(self, current: bool) -> bool {
        match self {
            ScheduleIntent::Unspecified => current,
            ScheduleIntent::Enabled => true,
            ScheduleIntent::Disabled => false,
        }
    }
}

impl From<Option<bool>> for ScheduleIntent {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => ScheduleIntent::Unspecified,
            Some(true) => ScheduleIntent::Enabled,
            Some(false) => ScheduleIntent::Disabled,
        }
    }
}

/// 作业配置变更请求
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobConfigUpdate {
    pub cron_expression: Option<String>,
    pub is_scheduled: ScheduleIntent,
}

impl JobConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.cron_expression.is_none() && self.is_scheduled == ScheduleIntent::Unspecified
    }
}

/// ESIS 消息头
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageHeaders {
    pub esaa_username: String,
    pub esaa_password: String,
    pub provider_number: String,
    pub tms_username: String,
}

impl MessageHeaders {
    /// 任何一个字段缺失都视为配置错误
    pub fn validate(&self) -> BrokerResult<()> {
        let mut missing = Vec::new();
        if self.esaa_username.trim().is_empty() {
            missing.push("EsaaUsername");
        }
        if self.esaa_password.trim().is_empty() {
            missing.push("EsaaPassword");
        }
        if self.provider_number.trim().is_empty() {
            missing.push("ProviderNumber");
        }
        if self.tms_username.trim().is_empty() {
            missing.push("TMSUsername");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(BrokerError::MissingMessageHeaders(missing))
        }
    }
}

impl fmt::Debug for MessageHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageHeaders")
            .field("esaa_username", &self.esaa_username)
            .field("esaa_password", &"***")
            .field("provider_number", &self.provider_number)
            .field("tms_username", &self.tms_username)
            .finish()
    }
}
