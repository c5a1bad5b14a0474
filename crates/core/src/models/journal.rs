use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::checkpoint::Checkpoint;
use super::node::{NodeHealth, NodeSpec};
use super::task::{FailureReason, Task, TaskState};
use super::tenant::TenantSpec;

/// 追加日志记录
///
/// 每次状态变更先追加到日志、再应用到内存表，启动时按序重放即可
/// 恢复任务表、租户表、节点表和检查点索引。预留/释放不入日志：
/// 重放后原Running任务走恢复路径重新放置，账本经由正常预留路径重建。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRecord {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub entry: JournalEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JournalEntry {
    TaskSubmitted {
        task: Task,
    },
    TaskStateChanged {
        task_id: i64,
        state: TaskState,
        failure_reason: Option<FailureReason>,
        error_message: Option<String>,
        assigned_node: Option<String>,
    },
    TaskPriorityUpdated {
        task_id: i64,
        static_priority: i32,
    },
    TaskRetryScheduled {
        task_id: i64,
        retry_count: i32,
        not_before: DateTime<Utc>,
    },
    TenantRegistered {
        spec: TenantSpec,
    },
    NodeRegistered {
        spec: NodeSpec,
    },
    NodeDeregistered {
        node_id: String,
    },
    NodeHealthChanged {
        node_id: String,
        health: NodeHealth,
    },
    CheckpointRecorded {
        checkpoint: Checkpoint,
    },
    CheckpointPruned {
        task_id: i64,
        sequence: u64,
    },
}

impl JournalRecord {
    pub fn new(entry: JournalEntry) -> Self {
        Self {
            id: Uuid::new_v4(),
            at: Utc::now(),
            entry,
        }
    }
}
