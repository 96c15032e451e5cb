use serde::{Deserialize, Serialize};

use super::{validate_not_empty, validate_positive, ConfigValidator};
use crate::{BrokerError, BrokerResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/itr-broker.db".to_string(),
            max_connections: 5,
        }
    }
}

impl ConfigValidator for DatabaseConfig {
    fn validate(&self) -> BrokerResult<()> {
        validate_not_empty(&self.url, "database.url")?;
        if !self.url.starts_with("sqlite:") {
            return Err(BrokerError::config_error(
                "database.url 必须以 sqlite: 开头",
            ));
        }
        validate_positive(self.max_connections as u64, "database.max_connections")
    }
}

/// 调度引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 触发器扫描间隔（毫秒）
    pub tick_interval_ms: u64,
    /// 关闭时等待正在执行的作业周期的时长（秒）
    pub shutdown_timeout_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl ConfigValidator for SchedulerConfig {
    fn validate(&self) -> BrokerResult<()> {
        validate_positive(self.tick_interval_ms, "scheduler.tick_interval_ms")?;
        validate_positive(
            self.shutdown_timeout_seconds,
            "scheduler.shutdown_timeout_seconds",
        )
    }
}

/// 消息交换配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// 单个阶段内同时处理的消息数，1 表示顺序处理
    pub max_concurrent_messages: usize,
    /// 被识别为 fetch 请求的根元素名（不区分大小写）
    pub fetch_root_elements: Vec<String>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_messages: 1,
            fetch_root_elements: vec!["FetchEnrolmentDetails".to_string()],
        }
    }
}

impl ConfigValidator for ExchangeConfig {
    fn validate(&self) -> BrokerResult<()> {
        validate_positive(
            self.max_concurrent_messages as u64,
            "exchange.max_concurrent_messages",
        )?;
        if self.fetch_root_elements.is_empty() {
            return Err(BrokerError::config_error(
                "exchange.fetch_root_elements 至少需要一个元素名",
            ));
        }
        for name in &self.fetch_root_elements {
            validate_not_empty(name, "exchange.fetch_root_elements")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EsisConfig {
    pub endpoint: String,
    pub request_timeout_seconds: u64,
    pub soap_action_prefix: String,
}

impl Default for EsisConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://esis.example.govt.nz/ESIS_TecItrLearnerEventServices_v1"
                .to_string(),
            request_timeout_seconds: 120,
            soap_action_prefix: "http://www.esis.govt.nz/TecItrLearnerEventServices/v1/"
                .to_string(),
        }
    }
}

impl ConfigValidator for EsisConfig {
    fn validate(&self) -> BrokerResult<()> {
        validate_not_empty(&self.endpoint, "esis.endpoint")?;
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(BrokerError::config_error(
                "esis.endpoint 必须是 http:// 或 https:// 地址",
            ));
        }
        validate_positive(self.request_timeout_seconds, "esis.request_timeout_seconds")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!("不支持的日志格式: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl ConfigValidator for ObservabilityConfig {
    fn validate(&self) -> BrokerResult<()> {
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(BrokerError::config_error(format!(
                "observability.log_level 无效: {other}"
            ))),
        }
    }
}
