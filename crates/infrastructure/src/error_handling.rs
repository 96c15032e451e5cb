//! 存储操作的错误上下文
//!
//! 为作业和消息存储的数据库错误附加操作类型和实体描述，并统一记录日志。

use std::fmt;

use broker_core::BrokerError;
use chrono::{DateTime, Utc};
use sqlx::Error as SqlxError;
use tracing::{debug, error};
use uuid::Uuid;

/// Operation context for store operations
#[derive(Debug, Clone, Copy)]
pub enum RepositoryOperation {
    Create,
    Read,
    Update,
    Query,
    Migrate,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryOperation::Create => write!(f, "创建"),
            RepositoryOperation::Read => write!(f, "查询"),
            RepositoryOperation::Update => write!(f, "更新"),
            RepositoryOperation::Query => write!(f, "查询"),
            RepositoryOperation::Migrate => write!(f, "迁移"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEntity {
    Job,
    Message,
    MessageHeaders,
    Schema,
}

impl fmt::Display for StoreEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreEntity::Job => write!(f, "作业配置"),
            StoreEntity::Message => write!(f, "消息"),
            StoreEntity::MessageHeaders => write!(f, "消息头"),
            StoreEntity::Schema => write!(f, "数据库结构"),
        }
    }
}

/// Context information for a single store operation
#[derive(Debug, Clone)]
pub struct StoreOperationContext {
    pub operation: RepositoryOperation,
    pub entity: StoreEntity,
    pub entity_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl StoreOperationContext {
    pub fn new(operation: RepositoryOperation, entity: StoreEntity) -> Self {
        Self {
            operation,
            entity,
            entity_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.entity_id = Some(id);
        self
    }

    pub fn entity_description(&self) -> String {
        match self.entity_id {
            Some(id) => format!("{} (ID: {})", self.entity, id),
            None => self.entity.to_string(),
        }
    }
}

pub struct RepositoryErrorHelpers;

impl RepositoryErrorHelpers {
    /// Create a database error with operation context
    pub fn database_error(context: &StoreOperationContext, error: SqlxError) -> BrokerError {
        let message = format!(
            "{}{}时发生数据库错误: {}",
            context.operation,
            context.entity_description(),
            error
        );
        error!(
            error = %error,
            operation = %context.operation,
            timestamp = %context.timestamp,
            "{}",
            message
        );
        BrokerError::DatabaseOperation(message)
    }

    /// 数据库中的值无法映射到领域类型
    pub fn mapping_error(context: &StoreOperationContext, detail: impl fmt::Display) -> BrokerError {
        let message = format!(
            "{}{}时数据格式错误: {}",
            context.operation,
            context.entity_description(),
            detail
        );
        error!("{}", message);
        BrokerError::Serialization(message)
    }

    pub fn log_operation_success(context: &StoreOperationContext) {
        debug!("{}{}成功", context.operation, context.entity_description());
    }
}

/// 构造存储操作上下文
#[macro_export]
macro_rules! store_context {
    ($operation:expr, $entity:expr) => {
        $crate::error_handling::StoreOperationContext::new($operation, $entity)
    };
    ($operation:expr, $entity:expr, $id:expr) => {
        $crate::error_handling::StoreOperationContext::new($operation, $entity).with_id($id)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_description() {
        let id = Uuid::new_v4();
        let context = StoreOperationContext::new(RepositoryOperation::Read, StoreEntity::Job)
            .with_id(id);
        assert_eq!(context.entity_description(), format!("作业配置 (ID: {id})"));

        let context =
            StoreOperationContext::new(RepositoryOperation::Migrate, StoreEntity::Schema);
        assert_eq!(context.entity_description(), "数据库结构");
    }

    #[test]
    fn test_database_error_carries_context() {
        let context = StoreOperationContext::new(RepositoryOperation::Update, StoreEntity::Message);
        let err = RepositoryErrorHelpers::database_error(&context, SqlxError::RowNotFound);
        match err {
            BrokerError::DatabaseOperation(message) => {
                assert!(message.starts_with("更新消息时发生数据库错误"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
