#[cfg(test)]
mod job_cycle_tests {
    use std::sync::Arc;

    use chrono::Utc;
    use tokio::sync::watch;
    use uuid::Uuid;

    use broker_core::{BrokerError, ExchangeConfig};
    use broker_domain::{
        CancellationSignal, FireContext, JobCredentials, JobExecutor, Message, MessageHeaders,
        MessageStatus, PullStatusCode,
    };
    use broker_infrastructure::MetricsCollector;
    use broker_testing_utils::{
        sample_headers, JobConfigBuilder, MessageBuilder, MockEsisService, MockJobStore,
        MockMessageStore, PullResultBuilder, FAILURE_RESULT, FETCH_REQUEST, FETCH_RESULT,
        SUCCESS_RESULT,
    };
    use broker_worker::state_machine::{EMPTY_RESULT_NOTE, MESSAGE_ERROR_NOTE};
    use broker_worker::{failure_report, JobCycleRunner};

    struct Fixture {
        job_id: Uuid,
        jobs: Arc<MockJobStore>,
        messages: Arc<MockMessageStore>,
        esis: Arc<MockEsisService>,
        runner: JobCycleRunner,
    }

    fn setup() -> Fixture {
        let job = JobConfigBuilder::new().with_cron("0 */5 * * * ?").scheduled(true).build();
        let jobs = Arc::new(MockJobStore::with_jobs(vec![job.clone()]));
        let messages = Arc::new(MockMessageStore::new());
        messages.set_headers(job.id, sample_headers());
        let esis = Arc::new(MockEsisService::new());
        let runner = JobCycleRunner::new(
            jobs.clone(),
            messages.clone(),
            esis.clone(),
            &ExchangeConfig::default(),
            Arc::new(MetricsCollector::new()),
        );
        Fixture {
            job_id: job.id,
            jobs,
            messages,
            esis,
            runner,
        }
    }

    fn upload(job_id: Uuid, nsn: u32) -> Message {
        MessageBuilder::new(job_id)
            .with_request(&format!(
                "<UploadLearnerEvent><NSN>{nsn}</NSN></UploadLearnerEvent>"
            ))
            .build()
    }

    fn pushed_upload(job_id: Uuid, correlation_id: Uuid) -> Message {
        MessageBuilder::new(job_id)
            .pushed(MessageStatus::PushedToService, correlation_id)
            .build()
    }

    fn status_of(fx: &Fixture, message: &Message) -> MessageStatus {
        fx.messages.message(message.message_id).unwrap().status
    }

    #[tokio::test]
    async fn test_one_failed_push_does_not_block_the_batch() {
        let fx = setup();
        let batch: Vec<Message> = (1..=3).map(|n| upload(fx.job_id, n)).collect();
        for message in &batch {
            fx.messages.insert(message.clone());
        }
        fx.esis.fail_push_for(&batch[1].request);

        let summary = fx.runner.run_job_cycle(fx.job_id).await.unwrap();

        assert_eq!(summary.pushed, 2);
        assert_eq!(summary.push_failures, 1);
        assert_eq!(fx.esis.push_upload_calls().len(), 3);

        for index in [0, 2] {
            let stored = fx.messages.message(batch[index].message_id).unwrap();
            assert_eq!(stored.status, MessageStatus::PushedToService);
            assert_eq!(
                stored.correlation_id,
                fx.esis.correlation_for(&batch[index].request)
            );
            assert_eq!(stored.tms_name, "tms-user");
            assert!(stored.push_started_on.is_some());
            assert!(stored.push_completed_on.is_some());
        }

        let failed = fx.messages.message(batch[1].message_id).unwrap();
        assert_eq!(failed, batch[1]);
    }

    #[tokio::test]
    async fn test_fetch_requests_use_the_fetch_operation() {
        let fx = setup();
        let fetch = MessageBuilder::new(fx.job_id)
            .with_request(FETCH_REQUEST)
            .build();
        fx.messages.insert(fetch.clone());

        fx.runner.run_job_cycle(fx.job_id).await.unwrap();

        assert_eq!(fx.esis.push_fetch_calls(), vec![FETCH_REQUEST.to_string()]);
        assert!(fx.esis.push_upload_calls().is_empty());
        assert_eq!(status_of(&fx, &fetch), MessageStatus::PushedFetchToService);
        // 同一周期内立即拉取，ESIS 仍在处理
        assert_eq!(fx.esis.pull_fetch_calls().len(), 1);
        assert_eq!(status_of(&fx, &fetch), MessageStatus::PushedFetchToService);
    }

    #[tokio::test]
    async fn test_malformed_correlation_id_leaves_message_queued() {
        let fx = setup();
        let message = upload(fx.job_id, 42);
        fx.messages.insert(message.clone());
        fx.esis.respond_to_push_with(&message.request, "not-a-guid");

        let summary = fx.runner.run_job_cycle(fx.job_id).await.unwrap();

        assert_eq!(summary.push_failures, 1);
        assert_eq!(fx.messages.message(message.message_id).unwrap(), message);
        assert_eq!(fx.messages.save_count(), 0);
    }

    #[tokio::test]
    async fn test_unclassifiable_payload_is_not_pushed() {
        let fx = setup();
        let message = MessageBuilder::new(fx.job_id).with_request("garbage").build();
        fx.messages.insert(message.clone());

        let summary = fx.runner.run_job_cycle(fx.job_id).await.unwrap();

        assert_eq!(summary.push_failures, 1);
        assert!(fx.esis.push_upload_calls().is_empty());
        assert!(fx.esis.push_fetch_calls().is_empty());
        assert_eq!(status_of(&fx, &message), MessageStatus::PulledFromSource);
    }

    #[tokio::test]
    async fn test_missing_headers_abort_the_cycle() {
        let fx = setup();
        fx.messages.set_headers(
            fx.job_id,
            MessageHeaders {
                esaa_password: String::new(),
                tms_username: "  ".to_string(),
                ..sample_headers()
            },
        );
        let message = upload(fx.job_id, 7);
        fx.messages.insert(message.clone());

        let err = fx.runner.run_job_cycle(fx.job_id).await.unwrap_err();

        match err {
            BrokerError::MissingMessageHeaders(missing) => {
                assert_eq!(missing, vec!["EsaaPassword", "TMSUsername"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(fx.esis.push_upload_calls().is_empty());
        assert!(fx.esis.pull_upload_calls().is_empty());
        assert_eq!(status_of(&fx, &message), MessageStatus::PulledFromSource);
    }

    #[tokio::test]
    async fn test_successful_upload_is_returned_to_source_with_summary() {
        let fx = setup();
        let correlation_id = Uuid::new_v4();
        let message = pushed_upload(fx.job_id, correlation_id);
        fx.messages.insert(message.clone());
        fx.esis.add_pull_result(
            PullResultBuilder::new(correlation_id)
                .with_payload("Success", SUCCESS_RESULT)
                .build(),
        );

        let summary = fx.runner.run_job_cycle(fx.job_id).await.unwrap();

        assert_eq!(summary.updated, 1);
        assert_eq!(summary.returned_to_source, 1);

        let stored = fx.messages.message(message.message_id).unwrap();
        assert_eq!(stored.status, MessageStatus::ReturnedToSource);
        assert_eq!(stored.pull_response.as_deref(), Some(SUCCESS_RESULT));
        assert_eq!(
            stored.comment.as_deref(),
            Some("Programme Number: PR1234\nProgramme Version: 2\nTransaction Result: 0: Accepted")
        );
        assert!(stored.errors.is_none());
        assert!(stored.pull_started_on.is_some());
        assert!(stored.pull_completed_on.is_some());
        assert!(stored.returned_to_source_on.is_some());

        // 先写回拉取结果，再标记已回传
        let saves = fx.messages.saved();
        assert_eq!(saves.len(), 2);
        assert_eq!(saves[0].status, MessageStatus::PulledFromService);
        assert_eq!(saves[1].status, MessageStatus::ReturnedToSource);
    }

    #[tokio::test]
    async fn test_failed_upload_stores_the_failure_report() {
        let fx = setup();
        let correlation_id = Uuid::new_v4();
        let message = pushed_upload(fx.job_id, correlation_id);
        fx.messages.insert(message.clone());
        fx.esis.add_pull_result(
            PullResultBuilder::new(correlation_id)
                .with_payload("Failure", FAILURE_RESULT)
                .build(),
        );

        fx.runner.run_job_cycle(fx.job_id).await.unwrap();

        let stored = fx.messages.message(message.message_id).unwrap();
        assert_eq!(stored.status, MessageStatus::Failed);
        let report = stored.errors.unwrap();
        assert_eq!(report, failure_report(FAILURE_RESULT).unwrap());
        assert!(report.contains("TransactionResultCode: E101"));
        assert!(report.contains("TransactionResultDescription: Learner not found"));
        assert!(stored.returned_to_source_on.is_none());
    }

    #[tokio::test]
    async fn test_pull_status_codes() {
        let fx = setup();
        let empty = pushed_upload(fx.job_id, Uuid::new_v4());
        let message_error = pushed_upload(fx.job_id, Uuid::new_v4());
        let unknown = pushed_upload(fx.job_id, Uuid::new_v4());
        let processing = pushed_upload(fx.job_id, Uuid::new_v4());
        for message in [&empty, &message_error, &unknown, &processing] {
            fx.messages.insert(message.clone());
        }

        fx.esis
            .add_pull_result(PullResultBuilder::new(empty.correlation_id.unwrap()).build());
        fx.esis.add_pull_result(
            PullResultBuilder::new(message_error.correlation_id.unwrap())
                .with_status(PullStatusCode::MessageError)
                .build(),
        );
        fx.esis.add_pull_result(
            PullResultBuilder::new(unknown.correlation_id.unwrap())
                .with_status(PullStatusCode::Unknown)
                .build(),
        );

        let summary = fx.runner.run_job_cycle(fx.job_id).await.unwrap();

        assert_eq!(summary.updated, 3);
        assert_eq!(summary.still_pending, 1);

        let stored = fx.messages.message(empty.message_id).unwrap();
        assert_eq!(stored.status, MessageStatus::Failed);
        assert_eq!(stored.errors.as_deref(), Some(EMPTY_RESULT_NOTE));

        let stored = fx.messages.message(message_error.message_id).unwrap();
        assert_eq!(stored.status, MessageStatus::Failed);
        assert_eq!(stored.errors.as_deref(), Some(MESSAGE_ERROR_NOTE));

        assert_eq!(status_of(&fx, &unknown), MessageStatus::Unknown);
        assert_eq!(fx.messages.message(processing.message_id).unwrap(), processing);
    }

    #[tokio::test]
    async fn test_uploads_are_pulled_in_one_batch_and_fetches_individually() {
        let fx = setup();
        let uploads: Vec<Message> = (0..3)
            .map(|_| pushed_upload(fx.job_id, Uuid::new_v4()))
            .collect();
        let fetches: Vec<Message> = (0..2)
            .map(|_| {
                MessageBuilder::new(fx.job_id)
                    .with_request(FETCH_REQUEST)
                    .pushed(MessageStatus::PushedFetchToService, Uuid::new_v4())
                    .build()
            })
            .collect();
        for message in uploads.iter().chain(fetches.iter()) {
            fx.messages.insert(message.clone());
        }
        for message in &uploads {
            fx.esis.add_pull_result(
                PullResultBuilder::new(message.correlation_id.unwrap())
                    .with_payload("Success", SUCCESS_RESULT)
                    .build(),
            );
        }
        for message in &fetches {
            fx.esis.add_pull_result(
                PullResultBuilder::new(message.correlation_id.unwrap())
                    .with_payload("EnrolmentDetails", FETCH_RESULT)
                    .build(),
            );
        }

        let summary = fx.runner.run_job_cycle(fx.job_id).await.unwrap();

        let batches = fx.esis.pull_upload_calls();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
        assert_eq!(fx.esis.pull_fetch_calls().len(), 2);

        // 获取类和上传类的更新都被写回
        assert_eq!(summary.updated, 5);
        assert_eq!(summary.returned_to_source, 5);
        for message in uploads.iter().chain(fetches.iter()) {
            assert_eq!(status_of(&fx, message), MessageStatus::ReturnedToSource);
        }
        let fetched = fx.messages.message(fetches[0].message_id).unwrap();
        assert_eq!(fetched.pull_response.as_deref(), Some(FETCH_RESULT));
        assert!(fetched.comment.is_none());
    }

    #[tokio::test]
    async fn test_failed_batch_pull_keeps_uploads_pending() {
        let fx = setup();
        let upload = pushed_upload(fx.job_id, Uuid::new_v4());
        let fetch = MessageBuilder::new(fx.job_id)
            .with_request(FETCH_REQUEST)
            .pushed(MessageStatus::PushedFetchToService, Uuid::new_v4())
            .build();
        fx.messages.insert(upload.clone());
        fx.messages.insert(fetch.clone());
        fx.esis.set_fail_pull_upload(true);
        fx.esis.add_pull_result(
            PullResultBuilder::new(fetch.correlation_id.unwrap())
                .with_payload("EnrolmentDetails", FETCH_RESULT)
                .build(),
        );

        fx.runner.run_job_cycle(fx.job_id).await.unwrap();

        assert_eq!(fx.messages.message(upload.message_id).unwrap(), upload);
        assert_eq!(status_of(&fx, &fetch), MessageStatus::ReturnedToSource);
    }

    #[tokio::test]
    async fn test_failed_fetch_pull_only_affects_that_message() {
        let fx = setup();
        let broken = MessageBuilder::new(fx.job_id)
            .with_request(FETCH_REQUEST)
            .pushed(MessageStatus::PushedFetchToService, Uuid::new_v4())
            .build();
        let healthy = MessageBuilder::new(fx.job_id)
            .with_request(FETCH_REQUEST)
            .pushed(MessageStatus::PushedFetchToService, Uuid::new_v4())
            .build();
        fx.messages.insert(broken.clone());
        fx.messages.insert(healthy.clone());
        fx.esis.fail_pull_fetch_for(broken.correlation_id.unwrap());
        fx.esis.add_pull_result(
            PullResultBuilder::new(healthy.correlation_id.unwrap())
                .with_payload("EnrolmentDetails", FETCH_RESULT)
                .build(),
        );

        fx.runner.run_job_cycle(fx.job_id).await.unwrap();

        assert_eq!(fx.messages.message(broken.message_id).unwrap(), broken);
        assert_eq!(status_of(&fx, &healthy), MessageStatus::ReturnedToSource);
    }

    #[tokio::test]
    async fn test_failed_write_back_skips_return_to_source() {
        let fx = setup();
        let correlation_id = Uuid::new_v4();
        let message = pushed_upload(fx.job_id, correlation_id);
        fx.messages.insert(message.clone());
        fx.messages.fail_save_for(message.message_id);
        fx.esis.add_pull_result(
            PullResultBuilder::new(correlation_id)
                .with_payload("Success", SUCCESS_RESULT)
                .build(),
        );

        let summary = fx.runner.run_job_cycle(fx.job_id).await.unwrap();

        assert_eq!(summary.write_failures, 1);
        assert_eq!(summary.returned_to_source, 0);
        assert_eq!(status_of(&fx, &message), MessageStatus::PushedToService);
    }

    #[tokio::test]
    async fn test_unreturned_message_is_retried_next_cycle() {
        let fx = setup();
        let message = MessageBuilder::new(fx.job_id)
            .pushed(MessageStatus::PushedToService, Uuid::new_v4())
            .with_status(MessageStatus::PulledFromService)
            .build();
        fx.messages.insert(message.clone());
        fx.messages.fail_save_for(message.message_id);

        let summary = fx.runner.run_job_cycle(fx.job_id).await.unwrap();
        assert_eq!(summary.write_failures, 1);
        assert_eq!(summary.returned_to_source, 0);
        assert_eq!(status_of(&fx, &message), MessageStatus::PulledFromService);

        fx.messages.clear_save_failures();
        let summary = fx.runner.run_job_cycle(fx.job_id).await.unwrap();

        assert_eq!(summary.write_failures, 0);
        assert_eq!(summary.returned_to_source, 1);
        assert_eq!(summary.updated, 0);
        let stored = fx.messages.message(message.message_id).unwrap();
        assert_eq!(stored.status, MessageStatus::ReturnedToSource);
        assert!(stored.returned_to_source_on.is_some());
    }

    #[tokio::test]
    async fn test_execute_records_fire_times() {
        let fx = setup();
        let fire_time = Utc::now();

        fx.runner
            .execute(FireContext {
                job_id: fx.job_id,
                credentials: JobCredentials::default(),
                fire_time,
                scheduled_fire_time: fire_time,
                next_fire_time: Some(fire_time + chrono::Duration::minutes(5)),
                cancel: CancellationSignal::never(),
            })
            .await;

        assert_eq!(fx.jobs.fire_time_updates(), 1);
        let job = fx.jobs.job(fx.job_id).unwrap();
        assert_eq!(job.previous_fire_time_utc, Some(fire_time));
        assert_eq!(job.next_fire_time_utc, Some(fire_time + chrono::Duration::minutes(5)));
    }

    #[tokio::test]
    async fn test_cancelled_cycle_pushes_nothing() {
        let fx = setup();
        let message = upload(fx.job_id, 9);
        fx.messages.insert(message.clone());
        let (_tx, rx) = watch::channel(true);

        let err = fx
            .runner
            .run_with_cancel(fx.job_id, &CancellationSignal::new(rx))
            .await
            .unwrap_err();

        assert!(matches!(err, BrokerError::Cancelled));
        assert!(fx.esis.push_upload_calls().is_empty());
        assert_eq!(status_of(&fx, &message), MessageStatus::PulledFromSource);
    }
}
