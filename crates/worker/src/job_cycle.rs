use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use broker_core::{BrokerError, BrokerResult, ExchangeConfig};
use broker_domain::{
    CancellationSignal, EsisService, FireContext, JobExecutor, JobStore, Message, MessageStatus,
    MessageStore,
};
use broker_infrastructure::{MetricsCollector, StructuredLogger};

use crate::classifier::RequestClassifier;
use crate::pull_phase::PullPhase;
use crate::push_phase::PushPhase;
use crate::state_machine;

/// 一次作业周期的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub pushed: usize,
    pub push_failures: usize,
    pub updated: usize,
    pub returned_to_source: usize,
    pub still_pending: usize,
    pub write_failures: usize,
}

/// 作业周期执行器
///
/// 每次触发依次执行推送阶段和拉取阶段，然后写回状态更新。
pub struct JobCycleRunner {
    job_store: Arc<dyn JobStore>,
    message_store: Arc<dyn MessageStore>,
    push: PushPhase,
    pull: PullPhase,
    metrics: Arc<MetricsCollector>,
}

impl JobCycleRunner {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        message_store: Arc<dyn MessageStore>,
        esis: Arc<dyn EsisService>,
        exchange: &ExchangeConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let classifier = RequestClassifier::new(exchange.fetch_root_elements.clone());
        let push = PushPhase::new(
            Arc::clone(&esis),
            Arc::clone(&message_store),
            classifier,
            exchange.max_concurrent_messages,
            Arc::clone(&metrics),
        );
        let pull = PullPhase::new(
            esis,
            Arc::clone(&message_store),
            exchange.max_concurrent_messages,
            Arc::clone(&metrics),
        );
        Self {
            job_store,
            message_store,
            push,
            pull,
            metrics,
        }
    }

    /// 手动执行一次作业周期
    pub async fn run_job_cycle(&self, job_id: Uuid) -> BrokerResult<CycleSummary> {
        self.run_with_cancel(job_id, &CancellationSignal::never()).await
    }

    /// 执行作业周期，周期级错误记录为严重错误后返回
    pub async fn run_with_cancel(
        &self,
        job_id: Uuid,
        cancel: &CancellationSignal,
    ) -> BrokerResult<CycleSummary> {
        let started = Instant::now();
        StructuredLogger::log_cycle_started(job_id, Utc::now());

        let result = self.run_phases(job_id, cancel).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(summary) => {
                StructuredLogger::log_cycle_completed(
                    job_id,
                    summary.pushed,
                    summary.updated,
                    elapsed.as_millis() as u64,
                );
                self.metrics.record_job_cycle(true, elapsed.as_secs_f64());
            }
            Err(BrokerError::Cancelled) => {
                info!("作业 {} 的周期因关闭信号中止", job_id);
            }
            Err(e) => {
                StructuredLogger::log_critical(
                    "job_cycle",
                    &format!("run_job_cycle({job_id})"),
                    e,
                );
                self.metrics.record_job_cycle(false, elapsed.as_secs_f64());
            }
        }
        result
    }

    async fn run_phases(
        &self,
        job_id: Uuid,
        cancel: &CancellationSignal,
    ) -> BrokerResult<CycleSummary> {
        let headers = self.message_store.message_headers(job_id).await?;
        headers.validate()?;

        let push = self.push.run(job_id, &headers, cancel).await?;
        if cancel.is_cancelled() {
            return Err(BrokerError::Cancelled);
        }

        let pull = self.pull.run(job_id, &headers, cancel).await?;
        // 之前周期回传失败的消息，在本周期的写回之前取出
        let unreturned = self.message_store.get_awaiting_return(job_id).await?;

        let mut summary = CycleSummary {
            pushed: push.pushed,
            push_failures: push.failed,
            updated: 0,
            returned_to_source: 0,
            still_pending: pull.still_pending,
            write_failures: 0,
        };

        if !unreturned.is_empty() {
            info!("作业 {} 有 {} 条消息等待重新回传", job_id, unreturned.len());
        }
        for message in unreturned {
            self.return_to_source(job_id, message, &mut summary).await;
        }
        for update in pull.updates {
            self.write_back(job_id, update, &mut summary).await;
        }
        Ok(summary)
    }

    /// 写回单条更新；拉取成功的消息在写回成功后标记为已回传
    async fn write_back(&self, job_id: Uuid, update: Message, summary: &mut CycleSummary) {
        if let Err(e) = self.message_store.save(&update).await {
            StructuredLogger::log_message_step_failed(
                job_id,
                update.message_id,
                update.correlation_id,
                "save",
                &e,
            );
            summary.write_failures += 1;
            return;
        }
        summary.updated += 1;

        if update.status == MessageStatus::PulledFromService {
            self.return_to_source(job_id, update, summary).await;
        }
    }

    /// 标记为已回传；失败时消息保持已拉取状态，下个周期重试
    async fn return_to_source(&self, job_id: Uuid, pulled: Message, summary: &mut CycleSummary) {
        let mut returned = pulled;
        let step = match state_machine::mark_returned(&mut returned, Utc::now()) {
            Ok(()) => self.message_store.save(&returned).await,
            Err(e) => Err(e),
        };
        match step {
            Ok(()) => summary.returned_to_source += 1,
            Err(e) => {
                StructuredLogger::log_message_step_failed(
                    job_id,
                    returned.message_id,
                    returned.correlation_id,
                    "return_to_source",
                    &e,
                );
                summary.write_failures += 1;
            }
        }
    }
}

#[async_trait]
impl JobExecutor for JobCycleRunner {
    async fn execute(&self, context: FireContext) {
        if let Err(e) = self
            .job_store
            .update_fire_times(context.job_id, Some(context.fire_time), context.next_fire_time)
            .await
        {
            warn!("作业 {} 的触发时间写入失败: {}", context.job_id, e);
        }

        // 错误已在周期内记录
        let _ = self.run_with_cancel(context.job_id, &context.cancel).await;
    }
}
