//! 代理服务配置
//!
//! 配置来源按优先级从低到高：内置默认值、TOML 配置文件、`BROKER` 前缀的环境变量。

mod app_config;
mod models;

pub use app_config::AppConfig;
pub use models::{
    DatabaseConfig, EsisConfig, ExchangeConfig, LogFormat, ObservabilityConfig, SchedulerConfig,
};

use crate::BrokerResult;

/// 配置段校验
pub trait ConfigValidator {
    fn validate(&self) -> BrokerResult<()>;
}

pub(crate) fn validate_not_empty(value: &str, field: &str) -> BrokerResult<()> {
    if value.trim().is_empty() {
        return Err(crate::BrokerError::config_error(format!("{field} 不能为空")));
    }
    Ok(())
}

pub(crate) fn validate_positive(value: u64, field: &str) -> BrokerResult<()> {
    if value == 0 {
        return Err(crate::BrokerError::config_error(format!("{field} 必须大于0")));
    }
    Ok(())
}
