//! Mock implementations for the store, service and executor traits
//!
//! In-memory doubles that can be used for unit testing without a database or
//! a live ESIS endpoint. All of them record how they were called.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use broker_core::{BrokerError, BrokerResult};
use broker_domain::{
    EsisService, FireContext, JobConfig, JobExecutor, JobStore, Message, MessageHeaders,
    MessageStatus, MessageStore, PullResult, PullStatusCode,
};

/// Mock implementation of JobStore for testing
#[derive(Debug, Clone, Default)]
pub struct MockJobStore {
    jobs: Arc<Mutex<HashMap<Uuid, JobConfig>>>,
    save_count: Arc<AtomicUsize>,
    fire_time_updates: Arc<AtomicUsize>,
    fail_saves: Arc<Mutex<bool>>,
}

impl MockJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: Vec<JobConfig>) -> Self {
        let store = Self::new();
        for job in jobs {
            store.insert(job);
        }
        store
    }

    /// Insert without counting as a save
    pub fn insert(&self, job: JobConfig) {
        self.jobs.lock().unwrap().insert(job.id, job);
    }

    pub fn remove(&self, job_id: Uuid) {
        self.jobs.lock().unwrap().remove(&job_id);
    }

    pub fn job(&self, job_id: Uuid) -> Option<JobConfig> {
        self.jobs.lock().unwrap().get(&job_id).cloned()
    }

    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    pub fn fire_time_updates(&self) -> usize {
        self.fire_time_updates.load(Ordering::SeqCst)
    }

    pub fn set_fail_saves(&self, fail: bool) {
        *self.fail_saves.lock().unwrap() = fail;
    }
}

#[async_trait]
impl JobStore for MockJobStore {
    async fn get(&self, job_id: Uuid) -> BrokerResult<Option<JobConfig>> {
        Ok(self.job(job_id))
    }

    async fn save(&self, job: &JobConfig) -> BrokerResult<()> {
        if *self.fail_saves.lock().unwrap() {
            return Err(BrokerError::DatabaseOperation("save failed".to_string()));
        }
        self.save_count.fetch_add(1, Ordering::SeqCst);
        let mut jobs = self.jobs.lock().unwrap();
        let mut stored = job.clone();
        if let Some(existing) = jobs.get(&job.id) {
            stored.previous_fire_time_utc = existing.previous_fire_time_utc;
        }
        jobs.insert(job.id, stored);
        Ok(())
    }

    async fn list_enabled(&self) -> BrokerResult<Vec<JobConfig>> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.values().filter(|job| job.is_enabled).cloned().collect())
    }

    async fn update_fire_times(
        &self,
        job_id: Uuid,
        previous_fire_time_utc: Option<DateTime<Utc>>,
        next_fire_time_utc: Option<DateTime<Utc>>,
    ) -> BrokerResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id)
            .ok_or(BrokerError::JobNotFound { id: job_id })?;
        job.previous_fire_time_utc = previous_fire_time_utc;
        job.next_fire_time_utc = next_fire_time_utc;
        self.fire_time_updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Mock implementation of MessageStore for testing
#[derive(Debug, Clone, Default)]
pub struct MockMessageStore {
    messages: Arc<Mutex<Vec<Message>>>,
    headers: Arc<Mutex<HashMap<Uuid, MessageHeaders>>>,
    saves: Arc<Mutex<Vec<Message>>>,
    fail_save_for: Arc<Mutex<HashSet<Uuid>>>,
}

impl MockMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: Vec<Message>) -> Self {
        let store = Self::new();
        for message in messages {
            store.insert(message);
        }
        store
    }

    pub fn insert(&self, message: Message) {
        let mut messages = self.messages.lock().unwrap();
        messages.retain(|m| m.message_id != message.message_id);
        messages.push(message);
    }

    pub fn set_headers(&self, job_id: Uuid, headers: MessageHeaders) {
        self.headers.lock().unwrap().insert(job_id, headers);
    }

    /// Make every save of this message fail
    pub fn fail_save_for(&self, message_id: Uuid) {
        self.fail_save_for.lock().unwrap().insert(message_id);
    }

    pub fn clear_save_failures(&self) {
        self.fail_save_for.lock().unwrap().clear();
    }

    pub fn message(&self, message_id: Uuid) -> Option<Message> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.message_id == message_id)
            .cloned()
    }

    pub fn all_messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    /// Every successful save, in order
    pub fn saved(&self) -> Vec<Message> {
        self.saves.lock().unwrap().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageStore for MockMessageStore {
    async fn get_queued(&self, job_id: Uuid) -> BrokerResult<Vec<Message>> {
        let messages = self.messages.lock().unwrap();
        Ok(messages
            .iter()
            .filter(|m| m.job_id == job_id && m.status == MessageStatus::PulledFromSource)
            .cloned()
            .collect())
    }

    async fn get_pending(&self, job_id: Uuid) -> BrokerResult<Vec<Message>> {
        let messages = self.messages.lock().unwrap();
        Ok(messages
            .iter()
            .filter(|m| m.job_id == job_id && m.status.is_pushed())
            .cloned()
            .collect())
    }

    async fn get_awaiting_return(&self, job_id: Uuid) -> BrokerResult<Vec<Message>> {
        let messages = self.messages.lock().unwrap();
        Ok(messages
            .iter()
            .filter(|m| m.job_id == job_id && m.status == MessageStatus::PulledFromService)
            .cloned()
            .collect())
    }

    async fn save(&self, message: &Message) -> BrokerResult<()> {
        if self.fail_save_for.lock().unwrap().contains(&message.message_id) {
            return Err(BrokerError::DatabaseOperation(format!(
                "save failed for {}",
                message.message_id
            )));
        }
        self.insert(message.clone());
        self.saves.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn message_headers(&self, job_id: Uuid) -> BrokerResult<MessageHeaders> {
        Ok(self
            .headers
            .lock()
            .unwrap()
            .get(&job_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Scripted ESIS service double
///
/// Pushes succeed with a fresh correlation id unless the payload has a scripted
/// failure or raw response. Pull results are looked up by correlation id; ids
/// without a scripted result come back with status `PROCESSING`.
#[derive(Debug, Clone, Default)]
pub struct MockEsisService {
    push_failures: Arc<Mutex<HashSet<String>>>,
    push_raw_responses: Arc<Mutex<HashMap<String, String>>>,
    correlations: Arc<Mutex<HashMap<String, Uuid>>>,
    pull_results: Arc<Mutex<HashMap<Uuid, PullResult>>>,
    pull_fetch_failures: Arc<Mutex<HashSet<Uuid>>>,
    fail_pull_upload: Arc<Mutex<bool>>,
    push_upload_calls: Arc<Mutex<Vec<String>>>,
    push_fetch_calls: Arc<Mutex<Vec<String>>>,
    pull_upload_calls: Arc<Mutex<Vec<Vec<Uuid>>>>,
    pull_fetch_calls: Arc<Mutex<Vec<Uuid>>>,
}

impl MockEsisService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push of this payload fails with an external service error
    pub fn fail_push_for(&self, payload: &str) {
        self.push_failures.lock().unwrap().insert(payload.to_string());
    }

    /// Push of this payload returns the given raw correlation text
    pub fn respond_to_push_with(&self, payload: &str, raw: &str) {
        self.push_raw_responses
            .lock()
            .unwrap()
            .insert(payload.to_string(), raw.to_string());
    }

    pub fn add_pull_result(&self, result: PullResult) {
        self.pull_results
            .lock()
            .unwrap()
            .insert(result.correlation_id, result);
    }

    pub fn fail_pull_fetch_for(&self, correlation_id: Uuid) {
        self.pull_fetch_failures.lock().unwrap().insert(correlation_id);
    }

    pub fn set_fail_pull_upload(&self, fail: bool) {
        *self.fail_pull_upload.lock().unwrap() = fail;
    }

    /// Correlation id handed out for a pushed payload
    pub fn correlation_for(&self, payload: &str) -> Option<Uuid> {
        self.correlations.lock().unwrap().get(payload).copied()
    }

    pub fn push_upload_calls(&self) -> Vec<String> {
        self.push_upload_calls.lock().unwrap().clone()
    }

    pub fn push_fetch_calls(&self) -> Vec<String> {
        self.push_fetch_calls.lock().unwrap().clone()
    }

    pub fn pull_upload_calls(&self) -> Vec<Vec<Uuid>> {
        self.pull_upload_calls.lock().unwrap().clone()
    }

    pub fn pull_fetch_calls(&self) -> Vec<Uuid> {
        self.pull_fetch_calls.lock().unwrap().clone()
    }

    fn push(&self, payload: &str) -> BrokerResult<String> {
        if self.push_failures.lock().unwrap().contains(payload) {
            return Err(BrokerError::external("push rejected"));
        }
        if let Some(raw) = self.push_raw_responses.lock().unwrap().get(payload) {
            return Ok(raw.clone());
        }
        let id = Uuid::new_v4();
        self.correlations
            .lock()
            .unwrap()
            .insert(payload.to_string(), id);
        Ok(id.to_string())
    }

    fn pull(&self, correlation_id: Uuid) -> PullResult {
        self.pull_results
            .lock()
            .unwrap()
            .get(&correlation_id)
            .cloned()
            .unwrap_or(PullResult {
                correlation_id,
                status_code: PullStatusCode::Other("PROCESSING".to_string()),
                result: None,
            })
    }
}

#[async_trait]
impl EsisService for MockEsisService {
    async fn push_upload(&self, _headers: &MessageHeaders, payload: &str) -> BrokerResult<String> {
        self.push_upload_calls
            .lock()
            .unwrap()
            .push(payload.to_string());
        self.push(payload)
    }

    async fn push_fetch(&self, _headers: &MessageHeaders, payload: &str) -> BrokerResult<String> {
        self.push_fetch_calls
            .lock()
            .unwrap()
            .push(payload.to_string());
        self.push(payload)
    }

    async fn pull_upload(
        &self,
        _headers: &MessageHeaders,
        correlation_ids: &[Uuid],
    ) -> BrokerResult<Vec<PullResult>> {
        self.pull_upload_calls
            .lock()
            .unwrap()
            .push(correlation_ids.to_vec());
        if *self.fail_pull_upload.lock().unwrap() {
            return Err(BrokerError::external("batch pull rejected"));
        }
        Ok(correlation_ids.iter().map(|id| self.pull(*id)).collect())
    }

    async fn pull_fetch(
        &self,
        _headers: &MessageHeaders,
        correlation_id: Uuid,
    ) -> BrokerResult<PullResult> {
        self.pull_fetch_calls.lock().unwrap().push(correlation_id);
        if self.pull_fetch_failures.lock().unwrap().contains(&correlation_id) {
            return Err(BrokerError::external("fetch pull rejected"));
        }
        Ok(self.pull(correlation_id))
    }
}

/// Executor that records every fire it receives
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    fires: Arc<Mutex<Vec<FireContext>>>,
    delay: Option<Duration>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each execution sleeps for the given duration before returning
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fires(&self) -> Vec<FireContext> {
        self.fires.lock().unwrap().clone()
    }

    pub fn fire_count(&self) -> usize {
        self.fires.lock().unwrap().len()
    }

    pub fn fires_for(&self, job_id: Uuid) -> usize {
        self.fires
            .lock()
            .unwrap()
            .iter()
            .filter(|fire| fire.job_id == job_id)
            .count()
    }
}

#[async_trait]
impl JobExecutor for RecordingExecutor {
    async fn execute(&self, context: FireContext) {
        self.fires.lock().unwrap().push(context);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}
