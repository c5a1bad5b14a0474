use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::node::NodeHealth;
use super::resources::ResourceVector;
use super::task::{TaskKind, TaskState};

/// 任务执行上下文
///
/// 放置成功后交给工作节点的执行句柄内容。恢复执行时附带快照数据。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecutionContext {
    pub task_id: i64,
    pub task_name: String,
    pub tenant_id: String,
    pub kind: TaskKind,
    pub parameters: serde_json::Value,
    pub request: ResourceVector,
    pub retry_count: i32,
}

/// 工作节点回报的状态更新
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub task_id: i64,
    pub node_id: String,
    pub kind: StatusUpdateKind,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StatusUpdateKind {
    Started,
    Progress { fraction: f64 },
    Completed,
    /// `fatal` 为true时不重试，直接进入终态
    Failed { error: String, fatal: bool },
}

/// 调度域对外发布的事件，供观察者（报表、审计）消费
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SchedulerEvent {
    TaskStateChanged {
        task_id: i64,
        from: TaskState,
        to: TaskState,
    },
    RoundCompleted {
        round: u64,
        placed: usize,
        ready_remaining: usize,
    },
    QuotaReclaimed {
        tenant_id: String,
        reclaimed: ResourceVector,
    },
    FairnessIntervention {
        tenant_id: String,
        hard: bool,
    },
    NodeHealthChanged {
        node_id: String,
        health: NodeHealth,
    },
    LossyCancellation {
        task_id: i64,
    },
}

/// 资源利用率快照：按资源类别、按租户的当前用量
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtilizationSnapshot {
    pub taken_at: DateTime<Utc>,
    pub tenants: Vec<TenantUtilization>,
    pub nodes: Vec<NodeUtilization>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantUtilization {
    pub tenant_id: String,
    pub usage: ResourceVector,
    pub guaranteed: ResourceVector,
    pub burst_ceiling: ResourceVector,
    pub share_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeUtilization {
    pub node_id: String,
    pub capacity: ResourceVector,
    pub allocated: ResourceVector,
    pub health: NodeHealth,
    pub resident_count: usize,
}
