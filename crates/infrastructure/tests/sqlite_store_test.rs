#[cfg(test)]
mod sqlite_store_tests {
    use chrono::{Duration, Utc};
    use sqlx::sqlite::SqlitePoolOptions;
    use uuid::Uuid;

    use broker_core::BrokerError;
    use broker_domain::{
        JobCredentials, JobStore, MessageHeaders, MessageStatus, MessageStore,
    };
    use broker_infrastructure::DatabaseManager;
    use broker_testing_utils::{sample_headers, JobConfigBuilder, MessageBuilder, FETCH_REQUEST};

    async fn setup() -> DatabaseManager {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let manager = DatabaseManager::from_pool(pool);
        manager.migrate().await.unwrap();
        manager
    }

    #[tokio::test]
    async fn test_job_roundtrip_keeps_credentials() {
        let manager = setup().await;
        let store = manager.job_store();
        let job = JobConfigBuilder::new()
            .with_name("tenant-a")
            .with_cron("0 */5 * * * ?")
            .scheduled(true)
            .with_credentials(JobCredentials::new("https://crm.example", "client", "secret"))
            .build();

        store.save(&job).await.unwrap();

        let loaded = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(loaded, job);
        assert_eq!(loaded.credentials.crm_secret, "secret");
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_overwrites_existing_job() {
        let manager = setup().await;
        let store = manager.job_store();
        let mut job = JobConfigBuilder::new().with_cron("0 0 * * * ?").build();
        store.save(&job).await.unwrap();

        job.cron_expression = None;
        job.is_scheduled = false;
        store.save(&job).await.unwrap();

        let loaded = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.cron_expression, None);
        assert!(!loaded.is_scheduled);
    }

    #[tokio::test]
    async fn test_list_enabled_skips_disabled_jobs() {
        let manager = setup().await;
        let store = manager.job_store();
        let enabled = JobConfigBuilder::new().with_name("a").enabled(true).build();
        let disabled = JobConfigBuilder::new().with_name("b").enabled(false).build();
        store.save(&enabled).await.unwrap();
        store.save(&disabled).await.unwrap();

        let jobs = store.list_enabled().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, enabled.id);
    }

    #[tokio::test]
    async fn test_update_fire_times_only_touches_fire_fields() {
        let manager = setup().await;
        let store = manager.job_store();
        let job = JobConfigBuilder::new()
            .with_cron("0 0 * * * ?")
            .scheduled(true)
            .build();
        store.save(&job).await.unwrap();

        let previous = Utc::now();
        let next = previous + Duration::hours(1);
        store
            .update_fire_times(job.id, Some(previous), Some(next))
            .await
            .unwrap();

        let loaded = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.previous_fire_time_utc, Some(previous));
        assert_eq!(loaded.next_fire_time_utc, Some(next));
        assert_eq!(loaded.cron_expression, job.cron_expression);

        let missing = Uuid::new_v4();
        let err = store.update_fire_times(missing, None, None).await.unwrap_err();
        assert!(matches!(err, BrokerError::JobNotFound { id } if id == missing));
    }

    #[tokio::test]
    async fn test_config_save_does_not_overwrite_previous_fire_time() {
        let manager = setup().await;
        let store = manager.job_store();
        let job = JobConfigBuilder::new()
            .with_cron("0 0 * * * ?")
            .scheduled(true)
            .build();
        store.save(&job).await.unwrap();

        let mut stale = store.get(job.id).await.unwrap().unwrap();
        let fired_at = Utc::now();
        let next = fired_at + Duration::hours(1);
        store
            .update_fire_times(job.id, Some(fired_at), Some(next))
            .await
            .unwrap();

        stale.cron_expression = Some("0 30 * * * ?".to_string());
        store.save(&stale).await.unwrap();

        let loaded = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.cron_expression.as_deref(), Some("0 30 * * * ?"));
        assert_eq!(loaded.previous_fire_time_utc, Some(fired_at));
    }

    #[tokio::test]
    async fn test_queued_and_pending_queries() {
        let manager = setup().await;
        let store = manager.message_store();
        let job_id = Uuid::new_v4();

        let queued = MessageBuilder::new(job_id).build();
        let pushed_upload = MessageBuilder::new(job_id)
            .pushed(MessageStatus::PushedToService, Uuid::new_v4())
            .build();
        let pushed_fetch = MessageBuilder::new(job_id)
            .with_request(FETCH_REQUEST)
            .pushed(MessageStatus::PushedFetchToService, Uuid::new_v4())
            .build();
        let failed = MessageBuilder::new(job_id)
            .with_status(MessageStatus::Failed)
            .build();
        let pulled = MessageBuilder::new(job_id)
            .pushed(MessageStatus::PushedToService, Uuid::new_v4())
            .with_status(MessageStatus::PulledFromService)
            .build();
        let other_job = MessageBuilder::new(Uuid::new_v4()).build();
        for message in [&queued, &pushed_upload, &pushed_fetch, &failed, &pulled, &other_job] {
            store.save(message).await.unwrap();
        }

        let loaded = store.get_queued(job_id).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], queued);

        let mut pending: Vec<Uuid> = store
            .get_pending(job_id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.message_id)
            .collect();
        pending.sort();
        let mut expected = vec![pushed_upload.message_id, pushed_fetch.message_id];
        expected.sort();
        assert_eq!(pending, expected);

        let awaiting = store.get_awaiting_return(job_id).await.unwrap();
        assert_eq!(awaiting.len(), 1);
        assert_eq!(awaiting[0].message_id, pulled.message_id);
    }

    #[tokio::test]
    async fn test_message_save_is_a_full_update() {
        let manager = setup().await;
        let store = manager.message_store();
        let mut message = MessageBuilder::new(Uuid::new_v4()).build();
        store.save(&message).await.unwrap();

        message.transition_to(MessageStatus::PushedToService).unwrap();
        message.correlation_id = Some(Uuid::new_v4());
        message.push_completed_on = Some(Utc::now());
        message.errors = Some("TransactionResultCode: E101\n".to_string());
        store.save(&message).await.unwrap();

        let loaded = store.get(message.message_id).await.unwrap().unwrap();
        assert_eq!(loaded, message);
    }

    #[tokio::test]
    async fn test_message_headers() {
        let manager = setup().await;
        let store = manager.message_store();
        let job_id = Uuid::new_v4();

        assert_eq!(
            store.message_headers(job_id).await.unwrap(),
            MessageHeaders::default()
        );

        store.set_headers(job_id, &sample_headers()).await.unwrap();
        let headers = store.message_headers(job_id).await.unwrap();
        assert_eq!(headers, sample_headers());
        assert!(headers.validate().is_ok());
    }
}
