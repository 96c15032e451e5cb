use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use broker_core::{BrokerError, BrokerResult};
use broker_domain::{JobConfig, JobStore};
use broker_infrastructure::{MetricsCollector, StructuredLogger};

use crate::cron_utils::CronScheduler;
use crate::scheduler::{ScheduledTrigger, SchedulerEngine};

/// 协调动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Schedule,
    Reschedule,
    Unschedule,
    Noop,
}

impl SyncAction {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncAction::Schedule => "schedule",
            SyncAction::Reschedule => "reschedule",
            SyncAction::Unschedule => "unschedule",
            SyncAction::Noop => "noop",
        }
    }
}

/// 根据作业配置和当前触发器决定协调动作。
///
/// CRON 是否变化按表达式文本比较，而不是按触发时间比较。
pub fn decide(job: &JobConfig, trigger: Option<&ScheduledTrigger>) -> SyncAction {
    match (job.wants_trigger(), trigger) {
        (true, None) => SyncAction::Schedule,
        (true, Some(trigger)) if trigger.cron_expression != job.cron() => SyncAction::Reschedule,
        (true, Some(_)) => SyncAction::Noop,
        (false, Some(_)) => SyncAction::Unschedule,
        (false, None) => SyncAction::Noop,
    }
}

/// 协调引擎：让调度引擎中的触发器与作业存储中的排程意图保持一致
pub struct Reconciler {
    job_store: Arc<dyn JobStore>,
    engine: Arc<SchedulerEngine>,
    metrics: Arc<MetricsCollector>,
}

impl Reconciler {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        engine: Arc<SchedulerEngine>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            job_store,
            engine,
            metrics,
        }
    }

    /// 协调单个作业，返回协调后的作业配置
    pub async fn sync_job_by_id(&self, job_id: Uuid) -> BrokerResult<JobConfig> {
        let result = self.sync_locked(job_id).await;
        if let Err(e) = &result {
            StructuredLogger::log_sync_failed(job_id, e);
        }
        result
    }

    /// 启动时对所有启用的作业执行一次协调，返回成功协调的作业数量
    pub async fn sync_all_enabled(&self) -> BrokerResult<usize> {
        let jobs = self.job_store.list_enabled().await?;
        info!("启动协调：共 {} 个启用的作业", jobs.len());

        let mut synced = 0;
        for job in jobs {
            match self.sync_job_by_id(job.id).await {
                Ok(_) => synced += 1,
                Err(e) => warn!("{} 协调失败，等待下次同步: {}", job.entity_description(), e),
            }
        }
        Ok(synced)
    }

    async fn sync_locked(&self, job_id: Uuid) -> BrokerResult<JobConfig> {
        let _guard = self.engine.lock_job(job_id).await;

        let Some(mut job) = self.job_store.get(job_id).await? else {
            // 作业已从存储中删除，清理残留的触发器
            self.engine.delete_job(job_id).await?;
            return Err(BrokerError::JobNotFound { id: job_id });
        };

        let trigger = self.engine.get_trigger(job_id).await;
        let action = decide(&job, trigger.as_ref());

        if matches!(action, SyncAction::Schedule | SyncAction::Reschedule) {
            CronScheduler::validate_cron_expression(job.cron())?;
        }

        match action {
            SyncAction::Schedule => {
                job.next_fire_time_utc = self
                    .engine
                    .schedule_new_job(job_id, job.cron(), job.credentials.clone())
                    .await?;
                self.job_store.save(&job).await?;
            }
            SyncAction::Reschedule => {
                job.next_fire_time_utc = self.engine.reschedule_job(job_id, job.cron()).await?;
                self.job_store.save(&job).await?;
            }
            SyncAction::Unschedule => {
                self.engine.delete_job(job_id).await?;
                job.next_fire_time_utc = None;
                self.job_store.save(&job).await?;
            }
            SyncAction::Noop => {
                let live_next = trigger.as_ref().and_then(|t| t.next_fire_time);
                if job.next_fire_time_utc != live_next {
                    debug!(
                        "{} 存储的下次触发时间与触发器不一致，已修正",
                        job.entity_description()
                    );
                    job.next_fire_time_utc = live_next;
                    self.job_store.save(&job).await?;
                }
            }
        }

        self.metrics.record_reconciliation(action.as_str());
        debug!("{} 协调完成: {}", job.entity_description(), action.as_str());
        Ok(job)
    }
}
