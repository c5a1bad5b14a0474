use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use fairsched_core::config::PolicyUpdate;
use fairsched_core::models::{
    NodeSpec, TaskSpec, TaskStatusSummary, TaskStatusView, TenantSpec, UtilizationSnapshot,
};
use fairsched_core::traits::{ClusterManagementService, PolicyService, TaskControlService};
use fairsched_core::{SchedulerError, SchedulerResult};

/// 调度域命令
///
/// 外部调用经服务门面转换为命令，串行进入域控制循环处理，
/// 回复通过oneshot通道返回。
pub enum DomainCommand {
    SubmitTask {
        spec: TaskSpec,
        reply: oneshot::Sender<SchedulerResult<i64>>,
    },
    CancelTask {
        task_id: i64,
        reply: oneshot::Sender<SchedulerResult<()>>,
    },
    UpdatePriority {
        task_id: i64,
        static_priority: i32,
        reply: oneshot::Sender<SchedulerResult<()>>,
    },
    GetTaskStatus {
        task_id: i64,
        reply: oneshot::Sender<SchedulerResult<TaskStatusView>>,
    },
    StatusSummary {
        reply: oneshot::Sender<SchedulerResult<TaskStatusSummary>>,
    },
    RegisterTenant {
        spec: TenantSpec,
        reply: oneshot::Sender<SchedulerResult<()>>,
    },
    RegisterNode {
        spec: NodeSpec,
        reply: oneshot::Sender<SchedulerResult<()>>,
    },
    DeregisterNode {
        node_id: String,
        reply: oneshot::Sender<SchedulerResult<()>>,
    },
    NodeHeartbeat {
        node_id: String,
        reply: oneshot::Sender<SchedulerResult<()>>,
    },
    Configure {
        update: PolicyUpdate,
        reply: oneshot::Sender<SchedulerResult<()>>,
    },
    UtilizationSnapshot {
        reply: oneshot::Sender<SchedulerResult<UtilizationSnapshot>>,
    },
}

/// 调度服务门面
///
/// 对外暴露核心API（提交、取消、查询、节点管理、策略下发），
/// 内部只是把命令送进调度域的串行命令通道。可克隆，跨任务共享。
#[derive(Clone)]
pub struct SchedulerService {
    commands: mpsc::Sender<DomainCommand>,
}

impl SchedulerService {
    pub fn new(commands: mpsc::Sender<DomainCommand>) -> Self {
        Self { commands }
    }

    async fn dispatch<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<SchedulerResult<T>>) -> DomainCommand,
    ) -> SchedulerResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| SchedulerError::Internal("调度域已停止".to_string()))?;
        reply_rx
            .await
            .map_err(|_| SchedulerError::Internal("调度域未应答".to_string()))?
    }
}

#[async_trait]
impl TaskControlService for SchedulerService {
    async fn submit_task(&self, spec: TaskSpec) -> SchedulerResult<i64> {
        self.dispatch(|reply| DomainCommand::SubmitTask { spec, reply })
            .await
    }

    async fn cancel_task(&self, task_id: i64) -> SchedulerResult<()> {
        self.dispatch(|reply| DomainCommand::CancelTask { task_id, reply })
            .await
    }

    async fn update_priority(&self, task_id: i64, static_priority: i32) -> SchedulerResult<()> {
        self.dispatch(|reply| DomainCommand::UpdatePriority {
            task_id,
            static_priority,
            reply,
        })
        .await
    }

    async fn get_task_status(&self, task_id: i64) -> SchedulerResult<TaskStatusView> {
        self.dispatch(|reply| DomainCommand::GetTaskStatus { task_id, reply })
            .await
    }

    async fn status_summary(&self) -> SchedulerResult<TaskStatusSummary> {
        self.dispatch(|reply| DomainCommand::StatusSummary { reply })
            .await
    }
}

#[async_trait]
impl ClusterManagementService for SchedulerService {
    async fn register_tenant(&self, spec: TenantSpec) -> SchedulerResult<()> {
        self.dispatch(|reply| DomainCommand::RegisterTenant { spec, reply })
            .await
    }

    async fn register_node(&self, spec: NodeSpec) -> SchedulerResult<()> {
        self.dispatch(|reply| DomainCommand::RegisterNode { spec, reply })
            .await
    }

    async fn deregister_node(&self, node_id: &str) -> SchedulerResult<()> {
        let node_id = node_id.to_string();
        self.dispatch(|reply| DomainCommand::DeregisterNode { node_id, reply })
            .await
    }

    async fn node_heartbeat(&self, node_id: &str) -> SchedulerResult<()> {
        let node_id = node_id.to_string();
        self.dispatch(|reply| DomainCommand::NodeHeartbeat { node_id, reply })
            .await
    }
}

#[async_trait]
impl PolicyService for SchedulerService {
    async fn configure(&self, update: PolicyUpdate) -> SchedulerResult<()> {
        self.dispatch(|reply| DomainCommand::Configure { update, reply })
            .await
    }

    async fn utilization_snapshot(&self) -> SchedulerResult<UtilizationSnapshot> {
        self.dispatch(|reply| DomainCommand::UtilizationSnapshot { reply })
            .await
    }
}
