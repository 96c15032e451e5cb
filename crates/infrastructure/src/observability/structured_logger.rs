//! Structured logging utilities
//!
//! Fixed-shape log events for the broker. Every event carries an `event`
//! field so that log pipelines can filter on it without parsing the message.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    /// Log a new trigger registration
    pub fn log_job_scheduled(job_id: Uuid, cron_expression: &str, next_fire_time: Option<DateTime<Utc>>) {
        info!(
            event = "job_scheduled",
            job.id = %job_id,
            job.cron = cron_expression,
            job.next_fire_time = ?next_fire_time,
            "Job scheduled"
        );
    }

    /// Log a cron change on an existing trigger
    pub fn log_job_rescheduled(
        job_id: Uuid,
        old_cron: &str,
        new_cron: &str,
        next_fire_time: Option<DateTime<Utc>>,
    ) {
        info!(
            event = "job_rescheduled",
            job.id = %job_id,
            job.old_cron = old_cron,
            job.cron = new_cron,
            job.next_fire_time = ?next_fire_time,
            "Job rescheduled"
        );
    }

    /// Log trigger removal
    pub fn log_job_unscheduled(job_id: Uuid) {
        info!(event = "job_unscheduled", job.id = %job_id, "Job unscheduled");
    }

    /// Log a failed reconciliation
    pub fn log_sync_failed(job_id: Uuid, error: &dyn std::error::Error) {
        error!(
            event = "job_sync_failed",
            job.id = %job_id,
            error.message = %error,
            "Job reconciliation failed"
        );
    }

    /// Log a trigger fire
    pub fn log_trigger_fired(job_id: Uuid, scheduled_at: DateTime<Utc>, fired_at: DateTime<Utc>) {
        debug!(
            event = "trigger_fired",
            job.id = %job_id,
            trigger.scheduled_at = %scheduled_at,
            trigger.fired_at = %fired_at,
            "Trigger fired"
        );
    }

    /// Log a due fire that was skipped
    pub fn log_fire_skipped(job_id: Uuid, reason: &str) {
        warn!(
            event = "trigger_fire_skipped",
            job.id = %job_id,
            trigger.skip_reason = reason,
            "Trigger fire skipped"
        );
    }

    /// Log job cycle start
    pub fn log_cycle_started(job_id: Uuid, fire_time: DateTime<Utc>) {
        info!(
            event = "job_cycle_started",
            job.id = %job_id,
            job.fire_time = %fire_time,
            "Job cycle started"
        );
    }

    /// Log job cycle completion
    pub fn log_cycle_completed(job_id: Uuid, pushed: usize, pulled: usize, duration_ms: u64) {
        info!(
            event = "job_cycle_completed",
            job.id = %job_id,
            cycle.pushed = pushed,
            cycle.pulled = pulled,
            cycle.duration_ms = duration_ms,
            "Job cycle completed"
        );
    }

    /// Log a per-message failure with the step that failed
    pub fn log_message_step_failed(
        job_id: Uuid,
        message_id: Uuid,
        correlation_id: Option<Uuid>,
        step: &str,
        error: &dyn std::error::Error,
    ) {
        error!(
            event = "message_step_failed",
            job.id = %job_id,
            message.id = %message_id,
            message.correlation_id = ?correlation_id,
            message.step = step,
            error.message = %error,
            "Message processing step failed"
        );
    }

    /// Log a message status change
    pub fn log_message_transition(message_id: Uuid, from: &str, to: &str) {
        debug!(
            event = "message_transition",
            message.id = %message_id,
            message.from = from,
            message.to = to,
            "Message status changed"
        );
    }

    /// Log an unhandled failure at critical severity
    pub fn log_critical(component: &str, operation: &str, error: &dyn std::fmt::Display) {
        error!(
            event = "critical_error",
            severity = "critical",
            error.component = component,
            error.operation = operation,
            error.message = %error,
            "Critical error occurred"
        );
    }

    /// Log system error
    pub fn log_system_error(component: &str, operation: &str, error: &dyn std::error::Error) {
        error!(
            event = "system_error",
            error.component = component,
            error.operation = operation,
            error.message = %error,
            "System error occurred"
        );
    }
}
