//! Test data builders for creating test entities
//!
//! Builder patterns with sensible defaults and easy customization.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use broker_domain::{
    JobConfig, JobCredentials, Message, MessageStatus, PullResult, PullStatusCode, ResultPayload,
};

/// Builder for creating test JobConfig entities
pub struct JobConfigBuilder {
    job: JobConfig,
}

impl JobConfigBuilder {
    pub fn new() -> Self {
        Self {
            job: JobConfig::new(
                "test_job".to_string(),
                JobCredentials::new("https://crm.example.test", "client-id", "client-secret"),
            ),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.job.id = id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.job.name = name.to_string();
        self
    }

    pub fn with_cron(mut self, cron: &str) -> Self {
        self.job.cron_expression = Some(cron.to_string());
        self
    }

    pub fn without_cron(mut self) -> Self {
        self.job.cron_expression = None;
        self
    }

    pub fn scheduled(mut self, scheduled: bool) -> Self {
        self.job.is_scheduled = scheduled;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.job.is_enabled = enabled;
        self
    }

    pub fn with_next_fire_time(mut self, next: Option<DateTime<Utc>>) -> Self {
        self.job.next_fire_time_utc = next;
        self
    }

    pub fn with_credentials(mut self, credentials: JobCredentials) -> Self {
        self.job.credentials = credentials;
        self
    }

    pub fn build(self) -> JobConfig {
        self.job
    }
}

impl Default for JobConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test Message entities
pub struct MessageBuilder {
    message: Message,
}

impl MessageBuilder {
    pub fn new(job_id: Uuid) -> Self {
        let mut message = Message::new(
            Uuid::new_v4(),
            job_id,
            "<UploadLearnerEventData><Event/></UploadLearnerEventData>".to_string(),
        );
        message.tms_name = "TMS-0001".to_string();
        message.message_label = "Learner event".to_string();
        Self { message }
    }

    pub fn with_id(mut self, message_id: Uuid) -> Self {
        self.message.message_id = message_id;
        self
    }

    pub fn with_request(mut self, request: &str) -> Self {
        self.message.request = request.to_string();
        self
    }

    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.message.status = status;
        self
    }

    /// Message already pushed with the given correlation id
    pub fn pushed(mut self, status: MessageStatus, correlation_id: Uuid) -> Self {
        self.message.status = status;
        self.message.correlation_id = Some(correlation_id);
        self.message.push_started_on = Some(Utc::now());
        self.message.push_completed_on = Some(Utc::now());
        self
    }

    pub fn build(self) -> Message {
        self.message
    }
}

/// Builder for creating pull results
pub struct PullResultBuilder {
    result: PullResult,
}

impl PullResultBuilder {
    pub fn new(correlation_id: Uuid) -> Self {
        Self {
            result: PullResult {
                correlation_id,
                status_code: PullStatusCode::Retrieved,
                result: None,
            },
        }
    }

    pub fn with_status(mut self, status_code: PullStatusCode) -> Self {
        self.result.status_code = status_code;
        self
    }

    pub fn with_payload(mut self, local_name: &str, xml: &str) -> Self {
        self.result.result = Some(ResultPayload {
            local_name: local_name.to_string(),
            xml: xml.to_string(),
        });
        self
    }

    pub fn build(self) -> PullResult {
        self.result
    }
}
