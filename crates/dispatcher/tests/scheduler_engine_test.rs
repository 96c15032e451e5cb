#[cfg(test)]
mod scheduler_engine_tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use uuid::Uuid;

    use broker_core::BrokerError;
    use broker_dispatcher::{SchedulerEngine, SchedulerEngineConfig};
    use broker_domain::{FireContext, JobCredentials, JobExecutor};
    use broker_infrastructure::MetricsCollector;
    use broker_testing_utils::{wait_for, RecordingExecutor};

    const EVERY_SECOND: &str = "* * * * * ?";

    fn create_engine(executor: Arc<dyn JobExecutor>) -> Arc<SchedulerEngine> {
        Arc::new(SchedulerEngine::new(
            executor,
            SchedulerEngineConfig {
                tick_interval: Duration::from_millis(20),
                shutdown_timeout: Duration::from_secs(2),
            },
            Arc::new(MetricsCollector::new()),
        ))
    }

    fn credentials() -> JobCredentials {
        JobCredentials::new("https://crm.example.test", "client", "secret")
    }

    #[tokio::test]
    async fn test_schedule_then_get_trigger_keeps_expression() {
        let engine = create_engine(Arc::new(RecordingExecutor::new()));
        let job_id = Uuid::new_v4();

        let next = engine
            .schedule_new_job(job_id, "0 0 12 * * ?", credentials())
            .await
            .unwrap();
        assert!(next.unwrap() > Utc::now());

        let trigger = engine.get_trigger(job_id).await.unwrap();
        assert_eq!(trigger.job_id, job_id);
        assert_eq!(trigger.cron_expression, "0 0 12 * * ?");
        assert_eq!(trigger.next_fire_time, next);
        assert_eq!(trigger.previous_fire_time, None);
        assert!(!trigger.is_executing);
    }

    #[tokio::test]
    async fn test_schedule_duplicate_job_fails() {
        let engine = create_engine(Arc::new(RecordingExecutor::new()));
        let job_id = Uuid::new_v4();

        engine
            .schedule_new_job(job_id, "0 0 12 * * ?", credentials())
            .await
            .unwrap();
        let result = engine
            .schedule_new_job(job_id, "0 0 18 * * ?", credentials())
            .await;

        assert!(matches!(result, Err(BrokerError::DuplicateJob { id }) if id == job_id));
        let trigger = engine.get_trigger(job_id).await.unwrap();
        assert_eq!(trigger.cron_expression, "0 0 12 * * ?");
    }

    #[tokio::test]
    async fn test_schedule_invalid_cron_registers_nothing() {
        let engine = create_engine(Arc::new(RecordingExecutor::new()));
        let job_id = Uuid::new_v4();

        let result = engine.schedule_new_job(job_id, "bogus", credentials()).await;
        assert!(matches!(result, Err(BrokerError::InvalidCron { .. })));
        assert!(engine.get_trigger(job_id).await.is_none());
    }

    #[tokio::test]
    async fn test_reschedule_requires_existing_trigger() {
        let engine = create_engine(Arc::new(RecordingExecutor::new()));
        let job_id = Uuid::new_v4();

        let result = engine.reschedule_job(job_id, "0 0 18 * * ?").await;
        assert!(matches!(result, Err(BrokerError::TriggerNotFound { .. })));

        engine
            .schedule_new_job(job_id, "0 0 12 * * ?", credentials())
            .await
            .unwrap();
        let next = engine.reschedule_job(job_id, "0 0 18 * * ?").await.unwrap();

        let trigger = engine.get_trigger(job_id).await.unwrap();
        assert_eq!(trigger.cron_expression, "0 0 18 * * ?");
        assert_eq!(trigger.next_fire_time, next);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let engine = create_engine(Arc::new(RecordingExecutor::new()));
        let job_id = Uuid::new_v4();

        engine.delete_job(job_id).await.unwrap();

        engine
            .schedule_new_job(job_id, "0 0 12 * * ?", credentials())
            .await
            .unwrap();
        engine.delete_job(job_id).await.unwrap();
        engine.delete_job(job_id).await.unwrap();

        assert!(engine.get_trigger(job_id).await.is_none());
    }

    #[tokio::test]
    async fn test_list_triggers() {
        let engine = create_engine(Arc::new(RecordingExecutor::new()));
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        engine
            .schedule_new_job(first, "0 0 12 * * ?", credentials())
            .await
            .unwrap();
        engine
            .schedule_new_job(second, "0 0 18 * * ?", credentials())
            .await
            .unwrap();

        let mut ids: Vec<Uuid> = engine
            .list_triggers()
            .await
            .into_iter()
            .map(|t| t.job_id)
            .collect();
        ids.sort();
        let mut expected = vec![first, second];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_due_trigger_fires_once_per_interval() {
        let executor = Arc::new(RecordingExecutor::new());
        let engine = create_engine(executor.clone());
        let job_id = Uuid::new_v4();

        let scheduled = engine
            .schedule_new_job(job_id, EVERY_SECOND, credentials())
            .await
            .unwrap()
            .unwrap();

        // 模拟进程暂停：多个触发点被错过，只触发一次
        let now = scheduled + ChronoDuration::seconds(5);
        assert_eq!(engine.fire_due_at(now).await, 1);
        assert_eq!(engine.fire_due_at(now).await, 0);
        engine.wait_for_idle().await;

        let fires = executor.fires();
        assert_eq!(fires.len(), 1);
        assert_eq!(fires[0].job_id, job_id);
        assert_eq!(fires[0].scheduled_fire_time, scheduled);
        assert_eq!(fires[0].fire_time, now);
        assert_eq!(fires[0].next_fire_time, Some(now + ChronoDuration::seconds(1)));
        assert_eq!(fires[0].credentials, credentials());

        let trigger = engine.get_trigger(job_id).await.unwrap();
        assert_eq!(trigger.previous_fire_time, Some(now));
        assert_eq!(trigger.next_fire_time, Some(now + ChronoDuration::seconds(1)));
    }

    #[tokio::test]
    async fn test_trigger_not_due_does_not_fire() {
        let executor = Arc::new(RecordingExecutor::new());
        let engine = create_engine(executor.clone());

        engine
            .schedule_new_job(Uuid::new_v4(), "0 0 12 * * ?", credentials())
            .await
            .unwrap();

        assert_eq!(engine.fire_due_at(Utc::now()).await, 0);
        engine.wait_for_idle().await;
        assert_eq!(executor.fire_count(), 0);
    }

    #[tokio::test]
    async fn test_running_trigger_skips_overlapping_fire() {
        let executor = Arc::new(RecordingExecutor::with_delay(Duration::from_millis(200)));
        let engine = create_engine(executor.clone());
        let job_id = Uuid::new_v4();

        let scheduled = engine
            .schedule_new_job(job_id, EVERY_SECOND, credentials())
            .await
            .unwrap()
            .unwrap();

        let first = scheduled + ChronoDuration::seconds(1);
        assert_eq!(engine.fire_due_at(first).await, 1);
        assert!(engine.get_trigger(job_id).await.unwrap().is_executing);

        let second = first + ChronoDuration::seconds(10);
        assert_eq!(engine.fire_due_at(second).await, 0);

        engine.wait_for_idle().await;
        assert!(!engine.get_trigger(job_id).await.unwrap().is_executing);

        let third = second + ChronoDuration::seconds(10);
        assert_eq!(engine.fire_due_at(third).await, 1);
        engine.wait_for_idle().await;

        assert_eq!(executor.fires_for(job_id), 2);
    }

    #[tokio::test]
    async fn test_deleted_trigger_no_longer_fires() {
        let executor = Arc::new(RecordingExecutor::new());
        let engine = create_engine(executor.clone());
        let job_id = Uuid::new_v4();

        let scheduled = engine
            .schedule_new_job(job_id, EVERY_SECOND, credentials())
            .await
            .unwrap()
            .unwrap();
        engine.delete_job(job_id).await.unwrap();

        assert_eq!(engine.fire_due_at(scheduled + ChronoDuration::seconds(1)).await, 0);
    }

    #[tokio::test]
    async fn test_tick_loop_fires_after_ready() {
        let executor = Arc::new(RecordingExecutor::new());
        let engine = create_engine(executor.clone());
        let job_id = Uuid::new_v4();

        assert!(!engine.is_ready());
        engine
            .schedule_new_job(job_id, EVERY_SECOND, credentials())
            .await
            .unwrap();

        engine.start().await;
        engine.wait_until_ready().await.unwrap();
        assert!(engine.is_ready());

        let executor_handle = executor.clone();
        let fired = wait_for(
            || {
                let executor = executor_handle.clone();
                async move { executor.fires_for(job_id) > 0 }
            },
            Duration::from_secs(3),
        )
        .await;
        assert!(fired);

        engine.shutdown().await;
        assert!(!engine.is_ready());
    }

    struct CancelAwareExecutor {
        observed_cancel: Arc<AtomicBool>,
    }

    #[async_trait]
    impl JobExecutor for CancelAwareExecutor {
        async fn execute(&self, mut context: FireContext) {
            context.cancel.cancelled().await;
            self.observed_cancel.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight_cycles() {
        let observed_cancel = Arc::new(AtomicBool::new(false));
        let engine = create_engine(Arc::new(CancelAwareExecutor {
            observed_cancel: observed_cancel.clone(),
        }));
        let job_id = Uuid::new_v4();

        let scheduled = engine
            .schedule_new_job(job_id, EVERY_SECOND, credentials())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(engine.fire_due_at(scheduled + ChronoDuration::seconds(1)).await, 1);

        tokio::time::timeout(Duration::from_secs(3), engine.shutdown())
            .await
            .unwrap();
        assert!(observed_cancel.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_job_lock_serializes_same_job() {
        let engine = create_engine(Arc::new(RecordingExecutor::new()));
        let job_id = Uuid::new_v4();

        let guard = engine.lock_job(job_id).await;
        let contended =
            tokio::time::timeout(Duration::from_millis(50), engine.lock_job(job_id)).await;
        assert!(contended.is_err());

        // 不同作业互不阻塞
        let other = tokio::time::timeout(Duration::from_millis(50), engine.lock_job(Uuid::new_v4())).await;
        assert!(other.is_ok());

        drop(guard);
        let reacquired =
            tokio::time::timeout(Duration::from_millis(50), engine.lock_job(job_id)).await;
        assert!(reacquired.is_ok());
    }
}
