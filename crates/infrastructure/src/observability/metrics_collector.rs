//! Metrics collector for the broker
//!
//! Uses the `metrics` facade only. Without an installed recorder every call is
//! a no-op, so the collector is safe to construct in tests.

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};

pub struct MetricsCollector {
    job_cycles_total: Counter,
    job_cycle_failures_total: Counter,
    job_cycle_duration: Histogram,

    messages_pushed_total: Counter,
    message_push_failures_total: Counter,

    trigger_fires_total: Counter,
    trigger_fires_skipped_total: Counter,
    active_triggers: Gauge,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            job_cycles_total: counter!("broker_job_cycles_total"),
            job_cycle_failures_total: counter!("broker_job_cycle_failures_total"),
            job_cycle_duration: histogram!("broker_job_cycle_duration_seconds"),
            messages_pushed_total: counter!("broker_messages_pushed_total"),
            message_push_failures_total: counter!("broker_message_push_failures_total"),
            trigger_fires_total: counter!("broker_trigger_fires_total"),
            trigger_fires_skipped_total: counter!("broker_trigger_fires_skipped_total"),
            active_triggers: gauge!("broker_active_triggers"),
        }
    }

    /// Record a finished job cycle
    pub fn record_job_cycle(&self, success: bool, duration_seconds: f64) {
        self.job_cycles_total.increment(1);
        self.job_cycle_duration.record(duration_seconds);
        if !success {
            self.job_cycle_failures_total.increment(1);
        }
    }

    pub fn record_message_pushed(&self) {
        self.messages_pushed_total.increment(1);
    }

    pub fn record_message_push_failure(&self, step: &'static str) {
        self.message_push_failures_total.increment(1);
        counter!("broker_message_step_failures_total", "step" => step).increment(1);
    }

    /// Record a pull outcome, labelled by the resulting status
    pub fn record_pull_outcome(&self, outcome: &'static str) {
        counter!("broker_pull_outcomes_total", "outcome" => outcome).increment(1);
    }

    /// Record a reconciliation decision
    pub fn record_reconciliation(&self, action: &'static str) {
        counter!("broker_reconciliation_actions_total", "action" => action).increment(1);
    }

    pub fn record_trigger_fired(&self) {
        self.trigger_fires_total.increment(1);
    }

    pub fn record_trigger_skipped(&self) {
        self.trigger_fires_skipped_total.increment(1);
    }

    pub fn update_active_triggers(&self, count: usize) {
        self.active_triggers.set(count as f64);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
