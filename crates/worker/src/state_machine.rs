//! 消息状态转换
//!
//! 每个转换先校验状态图，校验失败时消息保持原样；成功后一次性写入状态和相关字段。
//! 拉取成功之后回写来源系统的最后一步不在这里，由作业周期在写回成功后完成。

use chrono::{DateTime, Utc};
use uuid::Uuid;

use broker_core::BrokerResult;
use broker_domain::{Message, MessageStatus, RequestKind};
use broker_infrastructure::StructuredLogger;

pub const EMPTY_RESULT_NOTE: &str =
    "ESIS returned status RETRIEVED but the result was unexpectedly empty";
pub const MESSAGE_ERROR_NOTE: &str = "ESIS returned status MESSAGE_ERROR";

fn transition(message: &mut Message, next: MessageStatus) -> BrokerResult<()> {
    let from = message.status;
    message.transition_to(next)?;
    StructuredLogger::log_message_transition(message.message_id, &from.to_string(), &next.to_string());
    Ok(())
}

/// 推送成功：记录关联ID和推送时间
pub fn mark_pushed(
    message: &mut Message,
    kind: RequestKind,
    correlation_id: Uuid,
    started: DateTime<Utc>,
    completed: DateTime<Utc>,
) -> BrokerResult<()> {
    transition(message, kind.pushed_status())?;
    message.correlation_id = Some(correlation_id);
    message.push_started_on = Some(started);
    message.push_completed_on = Some(completed);
    Ok(())
}

/// 拉取成功：保存结果文档
pub fn mark_pulled(
    message: &mut Message,
    result_xml: &str,
    comment: Option<String>,
    started: DateTime<Utc>,
    completed: DateTime<Utc>,
) -> BrokerResult<()> {
    transition(message, MessageStatus::PulledFromService)?;
    message.pull_response = Some(result_xml.to_string());
    message.comment = comment;
    message.errors = None;
    message.pull_started_on = Some(started);
    message.pull_completed_on = Some(completed);
    Ok(())
}

/// 业务失败或 ESIS 报错
pub fn mark_failed(
    message: &mut Message,
    errors: String,
    result_xml: Option<&str>,
    started: DateTime<Utc>,
    completed: DateTime<Utc>,
) -> BrokerResult<()> {
    transition(message, MessageStatus::Failed)?;
    message.errors = Some(errors);
    message.pull_response = result_xml.map(str::to_string);
    message.pull_started_on = Some(started);
    message.pull_completed_on = Some(completed);
    Ok(())
}

/// ESIS 无法识别该消息
pub fn mark_unknown(
    message: &mut Message,
    started: DateTime<Utc>,
    completed: DateTime<Utc>,
) -> BrokerResult<()> {
    transition(message, MessageStatus::Unknown)?;
    message.pull_started_on = Some(started);
    message.pull_completed_on = Some(completed);
    Ok(())
}

/// 结果已写回来源系统
pub fn mark_returned(message: &mut Message, at: DateTime<Utc>) -> BrokerResult<()> {
    transition(message, MessageStatus::ReturnedToSource)?;
    message.returned_to_source_on = Some(at);
    Ok(())
}
