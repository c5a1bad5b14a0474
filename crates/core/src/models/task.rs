use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::checkpoint::CheckpointRef;
use super::resources::ResourceVector;

/// 任务定义
///
/// 表示调度核心中的一个逻辑任务。提交后由核心独占持有，
/// 外部只能通过定义好的命令（提交、取消、调整优先级）触发变更。
///
/// - `request`: 各资源类别的需求向量，支持GPU分数卡
/// - `static_priority`: 静态优先级，数值越大越优先
/// - `deadline`: 可选截止时间，接近时提升有效优先级
/// - `dependencies`: 必须先到达 `Completed` 的任务ID集合
/// - `checkpoint_ref`: 最近一次通过校验的检查点引用
/// - `not_before`: 重试退避的最早再调度时间
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub name: String,
    pub tenant_id: String,
    pub kind: TaskKind,
    pub parameters: serde_json::Value,
    pub request: ResourceVector,
    pub static_priority: i32,
    pub deadline: Option<DateTime<Utc>>,
    pub dependencies: Vec<i64>,
    pub state: TaskState,
    pub failure_reason: Option<FailureReason>,
    pub error_message: Option<String>,
    pub assigned_node: Option<String>,
    pub checkpoint_ref: Option<CheckpointRef>,
    pub next_checkpoint_sequence: u64,
    pub retry_count: i32,
    pub max_retries: i32,
    pub not_before: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 任务生命周期状态
///
/// `Pending` → `Ready` → `Running` → `Checkpointed` → `Completed`/`Failed`/`Cancelled`。
/// 任一非终态可因显式取消转入 `Cancelled`。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskState {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "READY")]
    Ready,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "CHECKPOINTED")]
    Checkpointed,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// 状态机允许的转换
    pub fn can_transition_to(&self, to: TaskState) -> bool {
        use TaskState::*;
        if to == Cancelled {
            return !self.is_terminal();
        }
        matches!(
            (self, to),
            (Pending, Ready)
                | (Pending, Failed)
                | (Ready, Running)
                | (Ready, Failed)
                | (Running, Checkpointed)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Ready)
                | (Checkpointed, Ready)
                | (Checkpointed, Failed)
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Pending => "PENDING",
            TaskState::Ready => "READY",
            TaskState::Running => "RUNNING",
            TaskState::Checkpointed => "CHECKPOINTED",
            TaskState::Completed => "COMPLETED",
            TaskState::Failed => "FAILED",
            TaskState::Cancelled => "CANCELLED",
        };
        write!(f, "{s}")
    }
}

/// 终态失败的结构化原因码
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FailureReason {
    #[serde(rename = "FATAL")]
    Fatal,
    #[serde(rename = "RETRIES_EXHAUSTED")]
    RetriesExhausted,
    #[serde(rename = "DEPENDENCY_FAILED")]
    DependencyFailed,
}

/// 任务种类标签
///
/// 种类相关的行为（可检查点性、默认重试策略）通过能力表查询，不使用继承。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskKind {
    #[serde(rename = "BUILD")]
    Build,
    #[serde(rename = "ML_TRAINING")]
    MlTraining,
    #[serde(rename = "SIMULATION")]
    Simulation,
}

/// 任务种类能力表条目
#[derive(Debug, Clone, Copy)]
pub struct KindCapabilities {
    pub checkpointable: bool,
    pub default_max_retries: i32,
}

impl TaskKind {
    /// 能力表：构建任务不可检查点（失败后从头重跑），训练和模拟任务可检查点续跑
    pub fn capabilities(&self) -> KindCapabilities {
        match self {
            TaskKind::Build => KindCapabilities {
                checkpointable: false,
                default_max_retries: 3,
            },
            TaskKind::MlTraining => KindCapabilities {
                checkpointable: true,
                default_max_retries: 2,
            },
            TaskKind::Simulation => KindCapabilities {
                checkpointable: true,
                default_max_retries: 2,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Build => "build",
            TaskKind::MlTraining => "ml_training",
            TaskKind::Simulation => "simulation",
        }
    }
}

/// 任务提交参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub tenant_id: String,
    pub kind: TaskKind,
    #[serde(default)]
    pub parameters: serde_json::Value,
    pub request: ResourceVector,
    #[serde(default)]
    pub static_priority: i32,
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dependencies: Vec<i64>,
    pub max_retries: Option<i32>,
}

/// 状态查询返回的任务视图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusView {
    pub task_id: i64,
    pub state: TaskState,
    pub assigned_node: Option<String>,
    pub checkpoint_ref: Option<CheckpointRef>,
    pub failure_reason: Option<FailureReason>,
    pub error_message: Option<String>,
    pub retry_count: i32,
}

/// 各状态任务数量汇总
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TaskStatusSummary {
    pub pending: usize,
    pub ready: usize,
    pub running: usize,
    pub checkpointed: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl TaskStatusSummary {
    pub fn total(&self) -> usize {
        self.pending
            + self.ready
            + self.running
            + self.checkpointed
            + self.completed
            + self.failed
            + self.cancelled
    }

    pub fn active(&self) -> usize {
        self.pending + self.ready + self.running + self.checkpointed
    }
}

impl Task {
    /// 由提交参数创建任务，ID由调度域分配
    pub fn from_spec(id: i64, spec: TaskSpec, now: DateTime<Utc>) -> Self {
        let max_retries = spec
            .max_retries
            .unwrap_or_else(|| spec.kind.capabilities().default_max_retries);
        Self {
            id,
            name: spec.name,
            tenant_id: spec.tenant_id,
            kind: spec.kind,
            parameters: spec.parameters,
            request: spec.request,
            static_priority: spec.static_priority,
            deadline: spec.deadline,
            dependencies: spec.dependencies,
            state: TaskState::Pending,
            failure_reason: None,
            error_message: None,
            assigned_node: None,
            checkpoint_ref: None,
            next_checkpoint_sequence: 1,
            retry_count: 0,
            max_retries,
            not_before: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_checkpointable(&self) -> bool {
        self.kind.capabilities().checkpointable
    }

    /// 是否可参与本轮调度（Ready且过了退避时间）
    pub fn is_schedulable(&self, now: DateTime<Utc>) -> bool {
        self.state == TaskState::Ready
            && self.not_before.map(|t| t <= now).unwrap_or(true)
    }

    pub fn status_view(&self) -> TaskStatusView {
        TaskStatusView {
            task_id: self.id,
            state: self.state,
            assigned_node: self.assigned_node.clone(),
            checkpoint_ref: self.checkpoint_ref.clone(),
            failure_reason: self.failure_reason,
            error_message: self.error_message.clone(),
            retry_count: self.retry_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_transitions() {
        use TaskState::*;
        assert!(Pending.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Running));
        assert!(Running.can_transition_to(Checkpointed));
        assert!(Checkpointed.can_transition_to(Ready));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Running));
        assert!(!Checkpointed.can_transition_to(Running));
        assert!(!Completed.can_transition_to(Ready));
    }

    #[test]
    fn test_cancel_from_any_non_terminal() {
        use TaskState::*;
        for state in [Pending, Ready, Running, Checkpointed] {
            assert!(state.can_transition_to(Cancelled), "{state} 应可取消");
        }
        for state in [Completed, Failed, Cancelled] {
            assert!(!state.can_transition_to(Cancelled), "{state} 不应可取消");
        }
    }

    #[test]
    fn test_kind_capability_table() {
        assert!(!TaskKind::Build.capabilities().checkpointable);
        assert!(TaskKind::MlTraining.capabilities().checkpointable);
        assert!(TaskKind::Simulation.capabilities().checkpointable);
    }

    #[test]
    fn test_from_spec_defaults() {
        let spec = TaskSpec {
            name: "nightly-train".to_string(),
            tenant_id: "ml-team".to_string(),
            kind: TaskKind::MlTraining,
            parameters: serde_json::json!({"epochs": 10}),
            request: ResourceVector::new().with("gpu", 1.0),
            static_priority: 5,
            deadline: None,
            dependencies: vec![],
            max_retries: None,
        };
        let task = Task::from_spec(42, spec, Utc::now());
        assert_eq!(task.id, 42);
        assert_eq!(task.state, TaskState::Pending);
        assert_eq!(task.max_retries, 2);
        assert_eq!(task.next_checkpoint_sequence, 1);
    }
}
