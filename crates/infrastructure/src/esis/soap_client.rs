use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, instrument};
use uuid::Uuid;

use broker_core::{BrokerError, BrokerResult, EsisConfig};
use broker_domain::{EsisService, MessageHeaders, PullResult};

use super::envelope::{self, EnvelopeBuilder, EsisOperation};

/// 基于 HTTP 的 ESIS SOAP 客户端
pub struct EsisSoapClient {
    http: Client,
    endpoint: String,
    action_prefix: String,
    envelopes: EnvelopeBuilder,
}

impl EsisSoapClient {
    pub fn new(config: &EsisConfig) -> BrokerResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| BrokerError::config_error(format!("无法创建 HTTP 客户端: {e}")))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            action_prefix: config.soap_action_prefix.clone(),
            envelopes: EnvelopeBuilder::new(config.soap_action_prefix.trim_end_matches('/')),
        })
    }

    fn soap_action(&self, operation: EsisOperation) -> String {
        format!("\"{}{}\"", self.action_prefix, operation.name())
    }

    /// 发送报文并返回响应正文。SOAP Fault 优先于 HTTP 状态码报告。
    async fn call(&self, operation: EsisOperation, envelope: String) -> BrokerResult<String> {
        debug!("调用 ESIS 操作 {}", operation.name());

        let response = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", self.soap_action(operation))
            .body(envelope)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BrokerError::Timeout(format!("ESIS {} 请求超时", operation.name()))
                } else {
                    BrokerError::external(format!("ESIS {} 请求失败: {e}", operation.name()))
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            BrokerError::external(format!("读取 ESIS {} 响应失败: {e}", operation.name()))
        })?;

        envelope::check_fault(&body)?;
        if !status.is_success() {
            return Err(BrokerError::external(format!(
                "ESIS {} 返回 HTTP {}",
                operation.name(),
                status
            )));
        }
        Ok(body)
    }
}

#[async_trait]
impl EsisService for EsisSoapClient {
    #[instrument(skip_all)]
    async fn push_upload(&self, headers: &MessageHeaders, payload: &str) -> BrokerResult<String> {
        let envelope = self.envelopes.upload_learner_event_data(headers, payload);
        let body = self
            .call(EsisOperation::UploadLearnerEventData, envelope)
            .await?;
        envelope::parse_push_response(&body)
    }

    #[instrument(skip_all)]
    async fn push_fetch(&self, headers: &MessageHeaders, payload: &str) -> BrokerResult<String> {
        let envelope = self.envelopes.fetch_learner_event_data(headers, payload);
        let body = self
            .call(EsisOperation::FetchLearnerEventData, envelope)
            .await?;
        envelope::parse_push_response(&body)
    }

    #[instrument(skip_all, fields(batch_size = correlation_ids.len()))]
    async fn pull_upload(
        &self,
        headers: &MessageHeaders,
        correlation_ids: &[Uuid],
    ) -> BrokerResult<Vec<PullResult>> {
        let envelope = self
            .envelopes
            .get_learner_event_results(headers, correlation_ids);
        let body = self
            .call(EsisOperation::GetLearnerEventResults, envelope)
            .await?;
        envelope::parse_upload_results(&body)
    }

    #[instrument(skip_all, fields(correlation_id = %correlation_id))]
    async fn pull_fetch(
        &self,
        headers: &MessageHeaders,
        correlation_id: Uuid,
    ) -> BrokerResult<PullResult> {
        let envelope = self
            .envelopes
            .fetch_learner_event_data_results(headers, correlation_id);
        let body = self
            .call(EsisOperation::FetchLearnerEventDataResults, envelope)
            .await?;
        envelope::parse_fetch_result(&body, correlation_id)
    }
}
