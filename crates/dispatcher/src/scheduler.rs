use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, OwnedMutexGuard, RwLock};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use broker_core::{BrokerError, BrokerResult, SchedulerConfig};
use broker_domain::{CancellationSignal, FireContext, JobCredentials, JobExecutor};
use broker_infrastructure::{MetricsCollector, StructuredLogger};

use crate::cron_utils::CronScheduler;

/// 调度引擎配置
#[derive(Debug, Clone)]
pub struct SchedulerEngineConfig {
    pub tick_interval: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerEngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&SchedulerConfig> for SchedulerEngineConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            tick_interval: Duration::from_millis(config.tick_interval_ms),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_seconds),
        }
    }
}

/// 触发器快照，不包含凭据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTrigger {
    pub job_id: Uuid,
    pub cron_expression: String,
    pub previous_fire_time: Option<DateTime<Utc>>,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub is_executing: bool,
}

struct TriggerEntry {
    cron: CronScheduler,
    credentials: JobCredentials,
    previous_fire_time: Option<DateTime<Utc>>,
    next_fire_time: Option<DateTime<Utc>>,
    executing: Arc<AtomicBool>,
}

impl TriggerEntry {
    fn snapshot(&self, job_id: Uuid) -> ScheduledTrigger {
        ScheduledTrigger {
            job_id,
            cron_expression: self.cron.expression().to_string(),
            previous_fire_time: self.previous_fire_time,
            next_fire_time: self.next_fire_time,
            is_executing: self.executing.load(Ordering::SeqCst),
        }
    }
}

/// 执行结束（包括 panic）时清除执行标记
struct ExecutingGuard(Arc<AtomicBool>);

impl Drop for ExecutingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// 调度引擎
///
/// 以作业ID为键的内存触发器注册表。注册表本身不持久化，进程重启后由协调引擎根据
/// 作业存储重建。对同一作业的变更需要先通过 [`SchedulerEngine::lock_job`] 获取作业锁。
pub struct SchedulerEngine {
    triggers: RwLock<HashMap<Uuid, TriggerEntry>>,
    job_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    executor: Arc<dyn JobExecutor>,
    config: SchedulerEngineConfig,
    metrics: Arc<MetricsCollector>,
    ready_tx: watch::Sender<bool>,
    cancel_tx: watch::Sender<bool>,
    in_flight: Mutex<JoinSet<()>>,
    tick_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerEngine {
    pub fn new(
        executor: Arc<dyn JobExecutor>,
        config: SchedulerEngineConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let (ready_tx, _) = watch::channel(false);
        let (cancel_tx, _) = watch::channel(false);
        Self {
            triggers: RwLock::new(HashMap::new()),
            job_locks: Mutex::new(HashMap::new()),
            executor,
            config,
            metrics,
            ready_tx,
            cancel_tx,
            in_flight: Mutex::new(JoinSet::new()),
            tick_handle: Mutex::new(None),
        }
    }

    /// 获取作业级互斥锁，不同作业之间互不阻塞
    pub async fn lock_job(&self, job_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.job_locks.lock().await;
            locks
                .entry(job_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// 注册新触发器，返回下一次触发时间
    pub async fn schedule_new_job(
        &self,
        job_id: Uuid,
        cron_expr: &str,
        credentials: JobCredentials,
    ) -> BrokerResult<Option<DateTime<Utc>>> {
        let cron = CronScheduler::new(cron_expr)?;
        let next_fire_time = cron.next_execution_time(Utc::now());

        let count = {
            let mut triggers = self.triggers.write().await;
            if triggers.contains_key(&job_id) {
                return Err(BrokerError::DuplicateJob { id: job_id });
            }
            triggers.insert(
                job_id,
                TriggerEntry {
                    cron,
                    credentials,
                    previous_fire_time: None,
                    next_fire_time,
                    executing: Arc::new(AtomicBool::new(false)),
                },
            );
            triggers.len()
        };

        self.metrics.update_active_triggers(count);
        StructuredLogger::log_job_scheduled(job_id, cron_expr, next_fire_time);
        Ok(next_fire_time)
    }

    /// 替换已有触发器的CRON表达式，保留凭据和上次触发时间
    pub async fn reschedule_job(
        &self,
        job_id: Uuid,
        cron_expr: &str,
    ) -> BrokerResult<Option<DateTime<Utc>>> {
        let cron = CronScheduler::new(cron_expr)?;
        let next_fire_time = cron.next_execution_time(Utc::now());

        let old_cron = {
            let mut triggers = self.triggers.write().await;
            let entry = triggers
                .get_mut(&job_id)
                .ok_or(BrokerError::TriggerNotFound { id: job_id })?;
            let old = std::mem::replace(&mut entry.cron, cron);
            entry.next_fire_time = next_fire_time;
            old
        };

        StructuredLogger::log_job_rescheduled(job_id, old_cron.expression(), cron_expr, next_fire_time);
        Ok(next_fire_time)
    }

    /// 删除触发器，触发器不存在时同样返回成功
    pub async fn delete_job(&self, job_id: Uuid) -> BrokerResult<()> {
        let (removed, count) = {
            let mut triggers = self.triggers.write().await;
            let removed = triggers.remove(&job_id).is_some();
            (removed, triggers.len())
        };

        if removed {
            self.metrics.update_active_triggers(count);
            StructuredLogger::log_job_unscheduled(job_id);
        } else {
            debug!("作业 {} 没有触发器，无需删除", job_id);
        }
        Ok(())
    }

    pub async fn get_trigger(&self, job_id: Uuid) -> Option<ScheduledTrigger> {
        let triggers = self.triggers.read().await;
        triggers.get(&job_id).map(|entry| entry.snapshot(job_id))
    }

    pub async fn list_triggers(&self) -> Vec<ScheduledTrigger> {
        let triggers = self.triggers.read().await;
        triggers
            .iter()
            .map(|(job_id, entry)| entry.snapshot(*job_id))
            .collect()
    }

    /// 触发所有在 `now` 时刻已到期的触发器，返回实际触发的数量
    ///
    /// 到期触发器只触发一次，下一次触发时间从 `now` 起重新计算，错过的多次触发合并为一次。
    /// 上一次执行尚未结束的触发器跳过本次触发。
    pub async fn fire_due_at(&self, now: DateTime<Utc>) -> usize {
        let mut due = Vec::new();
        {
            let mut triggers = self.triggers.write().await;
            for (job_id, entry) in triggers.iter_mut() {
                let Some(scheduled_fire_time) = entry.next_fire_time else {
                    continue;
                };
                if scheduled_fire_time > now {
                    continue;
                }

                entry.next_fire_time = entry.cron.next_execution_time(now);

                if entry.executing.load(Ordering::SeqCst) {
                    self.metrics.record_trigger_skipped();
                    StructuredLogger::log_fire_skipped(*job_id, "previous execution still running");
                    continue;
                }

                entry.executing.store(true, Ordering::SeqCst);
                entry.previous_fire_time = Some(now);

                let context = FireContext {
                    job_id: *job_id,
                    credentials: entry.credentials.clone(),
                    fire_time: now,
                    scheduled_fire_time,
                    next_fire_time: entry.next_fire_time,
                    cancel: CancellationSignal::new(self.cancel_tx.subscribe()),
                };
                due.push((context, ExecutingGuard(entry.executing.clone())));
            }
        }

        let fired = due.len();
        if fired == 0 {
            return 0;
        }

        let mut in_flight = self.in_flight.lock().await;
        for (context, guard) in due {
            StructuredLogger::log_trigger_fired(context.job_id, context.scheduled_fire_time, now);
            self.metrics.record_trigger_fired();
            let executor = self.executor.clone();
            in_flight.spawn(async move {
                let _guard = guard;
                executor.execute(context).await;
            });
        }
        fired
    }

    /// 启动后台 tick 循环。重复调用无效果。
    pub async fn start(self: &Arc<Self>) {
        let mut handle = self.tick_handle.lock().await;
        if handle.is_some() {
            debug!("调度引擎已启动");
            return;
        }

        let engine = Arc::clone(self);
        let mut cancel_rx = self.cancel_tx.subscribe();
        let tick = self.config.tick_interval;

        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            engine.ready_tx.send_replace(true);
            info!("调度引擎已启动，tick 间隔 {:?}", tick);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        engine.fire_due_at(Utc::now()).await;
                        engine.reap_finished().await;
                    }
                    changed = cancel_rx.changed() => {
                        if changed.is_err() || *cancel_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("调度引擎 tick 循环已停止");
        }));
    }

    /// 等待引擎进入就绪状态
    pub async fn wait_until_ready(&self) -> BrokerResult<()> {
        let mut ready_rx = self.ready_tx.subscribe();
        ready_rx
            .wait_for(|ready| *ready)
            .await
            .map_err(|_| BrokerError::Cancelled)?;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        *self.ready_tx.borrow()
    }

    /// 等待当前所有执行结束，仅用于测试和手动触发后的同步
    pub async fn wait_for_idle(&self) {
        let mut in_flight = self.in_flight.lock().await;
        while let Some(result) = in_flight.join_next().await {
            log_join_result(result);
        }
    }

    /// 停止 tick 循环，通知执行中的作业取消，并在超时内等待它们结束
    pub async fn shutdown(&self) {
        self.cancel_tx.send_replace(true);

        if let Some(handle) = self.tick_handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("调度引擎 tick 循环异常退出: {}", e);
            }
        }

        let mut in_flight = std::mem::take(&mut *self.in_flight.lock().await);
        let pending = in_flight.len();
        if pending > 0 {
            info!("等待 {} 个执行中的作业结束", pending);
        }

        let drained = tokio::time::timeout(self.config.shutdown_timeout, async {
            while let Some(result) = in_flight.join_next().await {
                log_join_result(result);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "等待作业结束超时（{:?}），放弃剩余 {} 个执行",
                self.config.shutdown_timeout,
                in_flight.len()
            );
            in_flight.abort_all();
        }

        self.ready_tx.send_replace(false);
        info!("调度引擎已关闭");
    }

    async fn reap_finished(&self) {
        let mut in_flight = self.in_flight.lock().await;
        while let Some(result) = in_flight.try_join_next() {
            log_join_result(result);
        }
    }
}

fn log_join_result(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            StructuredLogger::log_critical("scheduler", "execute_job", &e);
        } else {
            debug!("作业执行已取消: {}", e);
        }
    }
}
