//! Structured logging helpers.
//!
//! Uniform event vocabulary for scheduling decisions so external tooling can
//! filter on `event` fields instead of parsing message text.

use tracing::{error, info, warn};

use fairsched_core::models::{NodeHealth, TaskState};

pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_task_placed(task_id: i64, task_name: &str, node_id: &str, score: f64) {
        info!(
            event = "task_placed",
            task.id = task_id,
            task.name = task_name,
            node.id = node_id,
            score,
            "Task placed on node"
        );
    }

    pub fn log_task_state_change(task_id: i64, from: TaskState, to: TaskState) {
        info!(
            event = "task_state_change",
            task.id = task_id,
            from = %from,
            to = %to,
            "Task state changed"
        );
    }

    pub fn log_preemption(task_id: i64, node_id: &str, reason: &str) {
        warn!(
            event = "preemption",
            task.id = task_id,
            node.id = node_id,
            reason,
            "Task preempted"
        );
    }

    pub fn log_checkpoint_failure(task_id: i64, attempt: u32, error: &str) {
        warn!(
            event = "checkpoint_failure",
            task.id = task_id,
            attempt,
            error,
            "Checkpoint attempt failed"
        );
    }

    pub fn log_forced_suspension(task_id: i64) {
        warn!(
            event = "forced_suspension",
            task.id = task_id,
            "Checkpoint timed out, task forcibly suspended with in-flight state loss"
        );
    }

    pub fn log_lossy_cancellation(task_id: i64) {
        warn!(
            event = "lossy_cancellation",
            task.id = task_id,
            "Cancellation grace period expired, task terminated without checkpoint"
        );
    }

    pub fn log_node_health_change(node_id: &str, health: NodeHealth) {
        warn!(
            event = "node_health_change",
            node.id = node_id,
            health = ?health,
            "Node health changed"
        );
    }

    pub fn log_fairness_intervention(tenant_id: &str, share_ratio: f64, hard: bool) {
        warn!(
            event = "fairness_intervention",
            tenant.id = tenant_id,
            share_ratio,
            hard,
            "Fairness intervention triggered"
        );
    }

    pub fn log_quota_reclaim(tenant_id: &str, task_id: i64) {
        info!(
            event = "quota_reclaim",
            tenant.id = tenant_id,
            task.id = task_id,
            "Burst allocation reclaimed for guaranteed owner"
        );
    }

    pub fn log_system_error(component: &str, operation: &str, error: &dyn std::fmt::Display) {
        error!(
            event = "system_error",
            component,
            operation,
            error = %error,
            "Internal error"
        );
    }
}
