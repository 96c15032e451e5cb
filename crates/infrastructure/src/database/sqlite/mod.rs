pub mod sqlite_job_store;
pub mod sqlite_message_store;

pub use sqlite_job_store::SqliteJobStore;
pub use sqlite_message_store::SqliteMessageStore;

use broker_core::BrokerError;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::error_handling::{RepositoryErrorHelpers, StoreOperationContext};

/// 读取以文本形式保存的 UUID 列
pub(crate) fn uuid_column(
    row: &SqliteRow,
    column: &str,
    context: &StoreOperationContext,
) -> Result<Uuid, BrokerError> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw).map_err(|e| {
        RepositoryErrorHelpers::mapping_error(context, format!("列 {column} 不是合法的 UUID: {e}"))
    })
}

pub(crate) fn optional_uuid_column(
    row: &SqliteRow,
    column: &str,
    context: &StoreOperationContext,
) -> Result<Option<Uuid>, BrokerError> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|value| {
        Uuid::parse_str(&value).map_err(|e| {
            RepositoryErrorHelpers::mapping_error(
                context,
                format!("列 {column} 不是合法的 UUID: {e}"),
            )
        })
    })
    .transpose()
}
