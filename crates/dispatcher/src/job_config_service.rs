use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use broker_core::{BrokerError, BrokerResult};
use broker_domain::{JobConfig, JobConfigUpdate, JobCredentials, JobStore, ScheduleIntent};

use crate::cron_utils::CronScheduler;
use crate::reconciler::Reconciler;
use crate::scheduler::SchedulerEngine;

/// 作业配置服务
///
/// 写入前校验排程配置，写入后立即协调触发器。排程意图的三态在这里归一化为布尔值。
pub struct JobConfigService {
    job_store: Arc<dyn JobStore>,
    engine: Arc<SchedulerEngine>,
    reconciler: Arc<Reconciler>,
}

impl JobConfigService {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        engine: Arc<SchedulerEngine>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            job_store,
            engine,
            reconciler,
        }
    }

    pub async fn create_job(
        &self,
        name: &str,
        cron_expression: Option<String>,
        is_scheduled: ScheduleIntent,
        credentials: JobCredentials,
    ) -> BrokerResult<JobConfig> {
        let mut job = JobConfig::new(name.to_string(), credentials);
        job.cron_expression = normalize_cron(cron_expression);
        job.is_scheduled = is_scheduled.resolve(false);
        validate_schedule(&job)?;

        self.job_store.save(&job).await?;
        info!("创建{}", job.entity_description());
        self.reconciler.sync_job_by_id(job.id).await
    }

    pub async fn update_job(&self, job_id: Uuid, update: JobConfigUpdate) -> BrokerResult<JobConfig> {
        let mut job = self.load(job_id).await?;
        if update.is_empty() {
            return Ok(job);
        }

        if let Some(cron) = update.cron_expression {
            job.cron_expression = normalize_cron(Some(cron));
        }
        job.is_scheduled = update.is_scheduled.resolve(job.is_scheduled);
        validate_schedule(&job)?;

        self.job_store.save(&job).await?;
        info!("更新{}", job.entity_description());
        self.reconciler.sync_job_by_id(job_id).await
    }

    /// 启用或停用作业
    pub async fn set_enabled(&self, job_id: Uuid, enabled: bool) -> BrokerResult<JobConfig> {
        let mut job = self.load(job_id).await?;
        if job.is_enabled != enabled {
            job.is_enabled = enabled;
            validate_schedule(&job)?;
            self.job_store.save(&job).await?;
            info!("{} {}", job.entity_description(), if enabled { "已启用" } else { "已停用" });
        }
        self.reconciler.sync_job_by_id(job_id).await
    }

    /// 返回作业配置，存在触发器时以触发器的实时触发时间为准
    pub async fn get_job(&self, job_id: Uuid) -> BrokerResult<JobConfig> {
        let mut job = self.load(job_id).await?;
        if job.is_scheduled {
            if let Some(trigger) = self.engine.get_trigger(job_id).await {
                job.next_fire_time_utc = trigger.next_fire_time;
                if trigger.previous_fire_time.is_some() {
                    job.previous_fire_time_utc = trigger.previous_fire_time;
                }
            }
        }
        Ok(job)
    }

    /// 作业在外部被删除后调用，移除其触发器
    pub async fn remove_job(&self, job_id: Uuid) -> BrokerResult<()> {
        let _guard = self.engine.lock_job(job_id).await;
        self.engine.delete_job(job_id).await?;
        info!("作业 {} 已移除", job_id);
        Ok(())
    }

    async fn load(&self, job_id: Uuid) -> BrokerResult<JobConfig> {
        self.job_store
            .get(job_id)
            .await?
            .ok_or(BrokerError::JobNotFound { id: job_id })
    }
}

fn normalize_cron(cron: Option<String>) -> Option<String> {
    cron.filter(|expr| !expr.trim().is_empty())
}

/// 排程时CRON表达式必填且必须有效；不排程时允许为空，但非空时仍须有效
fn validate_schedule(job: &JobConfig) -> BrokerResult<()> {
    let cron = job.cron();
    if job.is_scheduled && cron.trim().is_empty() {
        return Err(BrokerError::invalid_cron(cron, "启用排程时必须提供CRON表达式"));
    }
    if !CronScheduler::is_valid(cron) {
        CronScheduler::validate_cron_expression(cron)?;
    }
    Ok(())
}
