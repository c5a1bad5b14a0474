//! Metrics collection for the scheduling core.
//!
//! Thin wrapper over the `metrics` crate facade; an exporter (if any) is the
//! embedding application's concern.

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};

pub struct MetricsCollector {
    // Task lifecycle metrics
    tasks_submitted_total: Counter,
    task_completions_total: Counter,
    task_failures_total: Counter,
    task_retries_total: Counter,

    // Scheduling metrics
    placements_total: Counter,
    preemptions_total: Counter,
    round_duration: Histogram,
    ready_tasks: Gauge,
    running_tasks: Gauge,

    // Checkpoint metrics
    checkpoints_total: Counter,
    checkpoint_failures_total: Counter,
    checkpoint_duration: Histogram,

    // Cluster metrics
    healthy_nodes: Gauge,
    lossy_cancellations_total: Counter,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            tasks_submitted_total: counter!("fairsched_tasks_submitted_total"),
            task_completions_total: counter!("fairsched_task_completions_total"),
            task_failures_total: counter!("fairsched_task_failures_total"),
            task_retries_total: counter!("fairsched_task_retries_total"),
            placements_total: counter!("fairsched_placements_total"),
            preemptions_total: counter!("fairsched_preemptions_total"),
            round_duration: histogram!("fairsched_round_duration_seconds"),
            ready_tasks: gauge!("fairsched_ready_tasks"),
            running_tasks: gauge!("fairsched_running_tasks"),
            checkpoints_total: counter!("fairsched_checkpoints_total"),
            checkpoint_failures_total: counter!("fairsched_checkpoint_failures_total"),
            checkpoint_duration: histogram!("fairsched_checkpoint_duration_seconds"),
            healthy_nodes: gauge!("fairsched_healthy_nodes"),
            lossy_cancellations_total: counter!("fairsched_lossy_cancellations_total"),
        }
    }

    pub fn record_task_submitted(&self) {
        self.tasks_submitted_total.increment(1);
    }

    pub fn record_task_completion(&self) {
        self.task_completions_total.increment(1);
    }

    pub fn record_task_failure(&self) {
        self.task_failures_total.increment(1);
    }

    pub fn record_task_retry(&self) {
        self.task_retries_total.increment(1);
    }

    pub fn record_placement(&self) {
        self.placements_total.increment(1);
    }

    pub fn record_preemption(&self) {
        self.preemptions_total.increment(1);
    }

    pub fn record_round_duration(&self, seconds: f64) {
        self.round_duration.record(seconds);
    }

    pub fn set_queue_depths(&self, ready: usize, running: usize) {
        self.ready_tasks.set(ready as f64);
        self.running_tasks.set(running as f64);
    }

    pub fn record_checkpoint(&self, seconds: f64) {
        self.checkpoints_total.increment(1);
        self.checkpoint_duration.record(seconds);
    }

    pub fn record_checkpoint_failure(&self) {
        self.checkpoint_failures_total.increment(1);
    }

    pub fn set_healthy_nodes(&self, count: usize) {
        self.healthy_nodes.set(count as f64);
    }

    pub fn record_lossy_cancellation(&self) {
        self.lossy_cancellations_total.increment(1);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
