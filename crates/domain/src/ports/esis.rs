use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::MessageHeaders;
use broker_core::BrokerResult;

/// 拉取结果的状态码
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PullStatusCode {
    Retrieved,
    MessageError,
    Unknown,
    /// 其余状态码（例如仍在处理中），消息保持待拉取
    Other(String),
}

impl PullStatusCode {
    pub fn parse(code: &str) -> Self {
        match code.trim() {
            "RETRIEVED" => PullStatusCode::Retrieved,
            "MESSAGE_ERROR" => PullStatusCode::MessageError,
            // 服务契约中的拼写为 UNKOWN
            "UNKNOWN" | "UNKOWN" => PullStatusCode::Unknown,
            other => PullStatusCode::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PullStatusCode::Retrieved => "RETRIEVED",
            PullStatusCode::MessageError => "MESSAGE_ERROR",
            PullStatusCode::Unknown => "UNKNOWN",
            PullStatusCode::Other(code) => code,
        }
    }
}

/// 拉取结果中携带的业务结果文档
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultPayload {
    /// 根元素的本地名，例如 Success 或 Failure
    pub local_name: String,
    pub xml: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullResult {
    pub correlation_id: Uuid,
    pub status_code: PullStatusCode,
    pub result: Option<ResultPayload>,
}

impl PullResult {
    pub fn is_success(&self) -> bool {
        self.result
            .as_ref()
            .is_some_and(|payload| payload.local_name.eq_ignore_ascii_case("Success"))
    }
}

/// ESIS SOAP 服务抽象
///
/// 推送操作返回服务端给出的原始关联ID文本，由调用方负责解析。
#[async_trait]
pub trait EsisService: Send + Sync {
    async fn push_upload(&self, headers: &MessageHeaders, payload: &str) -> BrokerResult<String>;

    async fn push_fetch(&self, headers: &MessageHeaders, payload: &str) -> BrokerResult<String>;

    /// 上传类消息的批量拉取
    async fn pull_upload(
        &self,
        headers: &MessageHeaders,
        correlation_ids: &[Uuid],
    ) -> BrokerResult<Vec<PullResult>>;

    /// 获取类消息逐条拉取
    async fn pull_fetch(
        &self,
        headers: &MessageHeaders,
        correlation_id: Uuid,
    ) -> BrokerResult<PullResult>;
}
