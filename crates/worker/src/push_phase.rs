use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, info};
use uuid::Uuid;

use broker_core::{BrokerError, BrokerResult};
use broker_domain::{
    CancellationSignal, EsisService, Message, MessageHeaders, MessageStore, RequestKind,
};
use broker_infrastructure::{MetricsCollector, StructuredLogger};

use crate::classifier::RequestClassifier;
use crate::state_machine;
use crate::with_cancel;

/// 推送阶段统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOutcome {
    pub queued: usize,
    pub pushed: usize,
    pub failed: usize,
    pub skipped: usize,
}

enum MessageResult {
    Pushed,
    Failed,
    Skipped,
}

/// 推送阶段：把排队中的消息逐条发送给 ESIS
pub struct PushPhase {
    esis: Arc<dyn EsisService>,
    message_store: Arc<dyn MessageStore>,
    classifier: RequestClassifier,
    max_concurrency: usize,
    metrics: Arc<MetricsCollector>,
}

impl PushPhase {
    pub fn new(
        esis: Arc<dyn EsisService>,
        message_store: Arc<dyn MessageStore>,
        classifier: RequestClassifier,
        max_concurrency: usize,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            esis,
            message_store,
            classifier,
            max_concurrency: max_concurrency.max(1),
            metrics,
        }
    }

    pub async fn run(
        &self,
        job_id: Uuid,
        headers: &MessageHeaders,
        cancel: &CancellationSignal,
    ) -> BrokerResult<PushOutcome> {
        let queued = self.message_store.get_queued(job_id).await?;
        info!("作业 {} 获取到 {} 条待推送消息", job_id, queued.len());

        let mut outcome = PushOutcome {
            queued: queued.len(),
            ..Default::default()
        };

        let results: Vec<MessageResult> = stream::iter(queued)
            .map(|message| self.push_one(job_id, headers, message, cancel))
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        for result in results {
            match result {
                MessageResult::Pushed => outcome.pushed += 1,
                MessageResult::Failed => outcome.failed += 1,
                MessageResult::Skipped => outcome.skipped += 1,
            }
        }

        info!(
            "作业 {} 推送阶段完成: 成功 {}, 失败 {}, 跳过 {}",
            job_id, outcome.pushed, outcome.failed, outcome.skipped
        );
        Ok(outcome)
    }

    async fn push_one(
        &self,
        job_id: Uuid,
        headers: &MessageHeaders,
        message: Message,
        cancel: &CancellationSignal,
    ) -> MessageResult {
        if cancel.is_cancelled() {
            debug!("已收到关闭信号，跳过消息 {}", message.message_id);
            return MessageResult::Skipped;
        }

        match self.try_push(headers, &message, cancel).await {
            Ok(()) => {
                self.metrics.record_message_pushed();
                MessageResult::Pushed
            }
            Err((_, BrokerError::Cancelled)) => {
                debug!("消息 {} 的推送已放弃", message.message_id);
                MessageResult::Skipped
            }
            Err((step, e)) => {
                StructuredLogger::log_message_step_failed(
                    job_id,
                    message.message_id,
                    message.correlation_id,
                    step,
                    &e,
                );
                self.metrics.record_message_push_failure(step);
                MessageResult::Failed
            }
        }
    }

    /// 任何一步失败都不写回，消息保持原状态等待下一周期
    async fn try_push(
        &self,
        headers: &MessageHeaders,
        message: &Message,
        cancel: &CancellationSignal,
    ) -> Result<(), (&'static str, BrokerError)> {
        let kind = self
            .classifier
            .classify(&message.request)
            .map_err(|e| ("classify", e))?;

        let started = Utc::now();
        let raw_id = with_cancel(cancel, async {
            match kind {
                RequestKind::Fetch => self.esis.push_fetch(headers, &message.request).await,
                RequestKind::Upload => self.esis.push_upload(headers, &message.request).await,
            }
        })
        .await
        .map_err(|e| ("push", e))?;
        let completed = Utc::now();

        let correlation_id = Uuid::parse_str(raw_id.trim()).map_err(|_| {
            (
                "parse_correlation_id",
                BrokerError::MalformedCorrelationId { value: raw_id.clone() },
            )
        })?;

        let mut updated = message.clone();
        updated.tms_name = headers.tms_username.clone();
        state_machine::mark_pushed(&mut updated, kind, correlation_id, started, completed)
            .map_err(|e| ("transition", e))?;

        self.message_store
            .save(&updated)
            .await
            .map_err(|e| ("save", e))?;

        info!(
            "消息 {} 已推送至 ESIS（{}），关联ID {}",
            message.message_id, kind, correlation_id
        );
        Ok(())
    }
}
