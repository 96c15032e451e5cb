use thiserror::Error;
use uuid::Uuid;

/// 消息代理错误类型定义
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("作业配置未找到: {id}")]
    JobNotFound { id: Uuid },

    #[error("消息未找到: {id}")]
    MessageNotFound { id: Uuid },

    #[error("作业 {id} 的触发器已存在")]
    DuplicateJob { id: Uuid },

    #[error("作业 {id} 的触发器不存在")]
    TriggerNotFound { id: Uuid },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("缺少消息头信息: {}", .0.join(", "))]
    MissingMessageHeaders(Vec<&'static str>),

    #[error("消息分类失败: {0}")]
    Classification(String),

    #[error("ESIS 返回的消息ID不是 GUID 格式: {value}")]
    MalformedCorrelationId { value: String },

    #[error("ESIS 服务错误: {0}")]
    ExternalService(String),

    #[error("无效的消息状态转换: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("操作已取消")]
    Cancelled,

    #[error("操作超时: {0}")]
    Timeout(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl BrokerError {
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn external<S: Into<String>>(msg: S) -> Self {
        Self::ExternalService(msg.into())
    }

    pub fn invalid_cron<E: Into<String>, M: Into<String>>(expr: E, message: M) -> Self {
        Self::InvalidCron {
            expr: expr.into(),
            message: message.into(),
        }
    }

    /// 写入配置时应当同步拒绝的错误
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BrokerError::InvalidCron { .. }
                | BrokerError::Configuration(_)
                | BrokerError::MissingMessageHeaders(_)
        )
    }

    /// 单条消息层面的错误，消息保持原状态等待下一周期
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BrokerError::ExternalService(_)
                | BrokerError::MalformedCorrelationId { .. }
                | BrokerError::Classification(_)
                | BrokerError::Timeout(_)
                | BrokerError::Database(_)
                | BrokerError::DatabaseOperation(_)
        )
    }
}
