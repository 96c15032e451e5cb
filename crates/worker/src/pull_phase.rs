use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use broker_core::{BrokerError, BrokerResult};
use broker_domain::{
    CancellationSignal, EsisService, Message, MessageHeaders, MessageStore, PullResult,
    PullStatusCode, RequestKind,
};
use broker_infrastructure::{MetricsCollector, StructuredLogger};

use crate::result_report::{failure_report, success_summary};
use crate::state_machine::{self, EMPTY_RESULT_NOTE, MESSAGE_ERROR_NOTE};
use crate::with_cancel;

/// 拉取阶段结果。`updates` 合并了获取类和上传类的状态更新，由调用方统一写回。
#[derive(Debug, Clone, Default)]
pub struct PullOutcome {
    pub pending: usize,
    pub updates: Vec<Message>,
    pub still_pending: usize,
    pub errors: usize,
}

impl PullOutcome {
    fn absorb(&mut self, other: PullOutcome) {
        self.updates.extend(other.updates);
        self.still_pending += other.still_pending;
        self.errors += other.errors;
    }
}

/// 拉取阶段：查询已推送消息在 ESIS 上的处理结果
pub struct PullPhase {
    esis: Arc<dyn EsisService>,
    message_store: Arc<dyn MessageStore>,
    max_concurrency: usize,
    metrics: Arc<MetricsCollector>,
}

impl PullPhase {
    pub fn new(
        esis: Arc<dyn EsisService>,
        message_store: Arc<dyn MessageStore>,
        max_concurrency: usize,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            esis,
            message_store,
            max_concurrency: max_concurrency.max(1),
            metrics,
        }
    }

    pub async fn run(
        &self,
        job_id: Uuid,
        headers: &MessageHeaders,
        cancel: &CancellationSignal,
    ) -> BrokerResult<PullOutcome> {
        let pending = self.message_store.get_pending(job_id).await?;
        info!("作业 {} 获取到 {} 条等待结果的消息", job_id, pending.len());

        let mut fetches = Vec::new();
        let mut uploads = Vec::new();
        for message in pending {
            match message.request_kind() {
                Some(RequestKind::Fetch) => fetches.push(message),
                Some(RequestKind::Upload) => uploads.push(message),
                None => warn!(
                    "消息 {} 状态为 {}，不属于拉取范围",
                    message.message_id, message.status
                ),
            }
        }

        let mut outcome = PullOutcome {
            pending: fetches.len() + uploads.len(),
            ..Default::default()
        };

        if !fetches.is_empty() {
            outcome.absorb(self.pull_fetches(job_id, headers, fetches, cancel).await);
        }
        if !uploads.is_empty() && !cancel.is_cancelled() {
            outcome.absorb(self.pull_uploads(job_id, headers, uploads, cancel).await);
        }

        info!(
            "作业 {} 拉取阶段完成: 更新 {}, 仍在处理 {}, 错误 {}",
            job_id,
            outcome.updates.len(),
            outcome.still_pending,
            outcome.errors
        );
        Ok(outcome)
    }

    /// 获取类消息逐条查询
    async fn pull_fetches(
        &self,
        job_id: Uuid,
        headers: &MessageHeaders,
        messages: Vec<Message>,
        cancel: &CancellationSignal,
    ) -> PullOutcome {
        let results: Vec<PullOutcome> = stream::iter(messages)
            .map(|message| self.pull_fetch_one(job_id, headers, message, cancel))
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let mut outcome = PullOutcome::default();
        for result in results {
            outcome.absorb(result);
        }
        outcome
    }

    async fn pull_fetch_one(
        &self,
        job_id: Uuid,
        headers: &MessageHeaders,
        message: Message,
        cancel: &CancellationSignal,
    ) -> PullOutcome {
        let mut outcome = PullOutcome::default();
        if cancel.is_cancelled() {
            outcome.still_pending += 1;
            return outcome;
        }

        let Some(correlation_id) = message.correlation_id else {
            self.report_step_failure(job_id, &message, "pull_fetch", &missing_correlation());
            outcome.errors += 1;
            return outcome;
        };

        let started = Utc::now();
        let result = with_cancel(cancel, self.esis.pull_fetch(headers, correlation_id)).await;
        let completed = Utc::now();

        match result {
            Ok(result) => {
                self.apply(job_id, message, &result, started, completed, &mut outcome);
            }
            Err(BrokerError::Cancelled) => outcome.still_pending += 1,
            Err(e) => {
                self.report_step_failure(job_id, &message, "pull_fetch", &e);
                outcome.errors += 1;
            }
        }
        outcome
    }

    /// 上传类消息一次批量查询
    async fn pull_uploads(
        &self,
        job_id: Uuid,
        headers: &MessageHeaders,
        messages: Vec<Message>,
        cancel: &CancellationSignal,
    ) -> PullOutcome {
        let mut outcome = PullOutcome::default();

        let mut by_correlation: HashMap<Uuid, Message> = HashMap::new();
        for message in messages {
            match message.correlation_id {
                Some(id) => {
                    by_correlation.insert(id, message);
                }
                None => {
                    self.report_step_failure(job_id, &message, "pull_upload", &missing_correlation());
                    outcome.errors += 1;
                }
            }
        }
        if by_correlation.is_empty() {
            return outcome;
        }

        let ids: Vec<Uuid> = by_correlation.keys().copied().collect();
        let started = Utc::now();
        let results = with_cancel(cancel, self.esis.pull_upload(headers, &ids)).await;
        let completed = Utc::now();

        let results = match results {
            Ok(results) => results,
            Err(BrokerError::Cancelled) => {
                outcome.still_pending += by_correlation.len();
                return outcome;
            }
            Err(e) => {
                for message in by_correlation.values() {
                    self.report_step_failure(job_id, message, "pull_upload", &e);
                }
                outcome.errors += by_correlation.len();
                return outcome;
            }
        };

        for result in results {
            match by_correlation.remove(&result.correlation_id) {
                Some(message) => {
                    self.apply(job_id, message, &result, started, completed, &mut outcome);
                }
                None => warn!(
                    "作业 {} 收到未知关联ID {} 的上传结果",
                    job_id, result.correlation_id
                ),
            }
        }

        // 批量结果中缺失的消息保持原状态
        if !by_correlation.is_empty() {
            debug!("{} 条上传消息本次未返回结果", by_correlation.len());
            outcome.still_pending += by_correlation.len();
        }
        outcome
    }

    /// 根据 ESIS 状态码决定消息的下一状态
    fn apply(
        &self,
        job_id: Uuid,
        message: Message,
        result: &PullResult,
        started: DateTime<Utc>,
        completed: DateTime<Utc>,
        outcome: &mut PullOutcome,
    ) {
        let kind = message.request_kind();
        let mut updated = message.clone();

        let transition = match &result.status_code {
            PullStatusCode::Retrieved => match &result.result {
                Some(payload) if kind == Some(RequestKind::Fetch) || result.is_success() => {
                    let comment = if kind == Some(RequestKind::Upload) {
                        match success_summary(&payload.xml) {
                            Ok(summary) => Some(summary.render()),
                            Err(e) => {
                                warn!("消息 {} 的成功结果摘要解析失败: {}", message.message_id, e);
                                None
                            }
                        }
                    } else {
                        None
                    };
                    self.metrics.record_pull_outcome("pulled");
                    state_machine::mark_pulled(&mut updated, &payload.xml, comment, started, completed)
                }
                Some(payload) => {
                    let report = failure_report(&payload.xml)
                        .unwrap_or_else(|e| format!("Unable to read failure result: {e}"));
                    self.metrics.record_pull_outcome("failed");
                    state_machine::mark_failed(
                        &mut updated,
                        report,
                        Some(&payload.xml),
                        started,
                        completed,
                    )
                }
                None => {
                    self.metrics.record_pull_outcome("empty");
                    state_machine::mark_failed(
                        &mut updated,
                        EMPTY_RESULT_NOTE.to_string(),
                        None,
                        started,
                        completed,
                    )
                }
            },
            PullStatusCode::MessageError => {
                self.metrics.record_pull_outcome("message_error");
                state_machine::mark_failed(
                    &mut updated,
                    MESSAGE_ERROR_NOTE.to_string(),
                    None,
                    started,
                    completed,
                )
            }
            PullStatusCode::Unknown => {
                self.metrics.record_pull_outcome("unknown");
                state_machine::mark_unknown(&mut updated, started, completed)
            }
            PullStatusCode::Other(code) => {
                debug!("消息 {} 仍在处理中，ESIS 状态 {}", message.message_id, code);
                self.metrics.record_pull_outcome("pending");
                outcome.still_pending += 1;
                return;
            }
        };

        match transition {
            Ok(()) => outcome.updates.push(updated),
            Err(e) => {
                self.report_step_failure(job_id, &message, "transition", &e);
                outcome.errors += 1;
            }
        }
    }

    fn report_step_failure(&self, job_id: Uuid, message: &Message, step: &str, error: &BrokerError) {
        StructuredLogger::log_message_step_failed(
            job_id,
            message.message_id,
            message.correlation_id,
            step,
            error,
        );
    }
}

fn missing_correlation() -> BrokerError {
    BrokerError::MalformedCorrelationId {
        value: String::new(),
    }
}
