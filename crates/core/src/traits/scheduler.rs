use async_trait::async_trait;

use crate::config::PolicyUpdate;
use crate::errors::SchedulerResult;
use crate::models::{
    NodeSpec, TaskSpec, TaskStatusSummary, TaskStatusView, TenantSpec, UtilizationSnapshot,
};

/// 任务控制服务
///
/// 外部协作方（CLI、上游集成、报表工具）消费的核心操作。
#[async_trait]
pub trait TaskControlService: Send + Sync {
    /// 提交任务，校验资源类别与租户，检测依赖环，返回任务ID
    async fn submit_task(&self, spec: TaskSpec) -> SchedulerResult<i64>;

    /// 取消任务；幂等，已终态时为无操作
    async fn cancel_task(&self, task_id: i64) -> SchedulerResult<()>;

    /// 调整静态优先级，下一调度轮生效
    async fn update_priority(&self, task_id: i64, static_priority: i32) -> SchedulerResult<()>;

    async fn get_task_status(&self, task_id: i64) -> SchedulerResult<TaskStatusView>;

    async fn status_summary(&self) -> SchedulerResult<TaskStatusSummary>;
}

/// 集群管理服务
#[async_trait]
pub trait ClusterManagementService: Send + Sync {
    async fn register_tenant(&self, spec: TenantSpec) -> SchedulerResult<()>;

    async fn register_node(&self, spec: NodeSpec) -> SchedulerResult<()>;

    /// 注销节点；驻留任务按节点失效处理重新指派
    async fn deregister_node(&self, node_id: &str) -> SchedulerResult<()>;

    async fn node_heartbeat(&self, node_id: &str) -> SchedulerResult<()>;
}

/// 策略与报表服务
#[async_trait]
pub trait PolicyService: Send + Sync {
    /// 下发策略参数，下一轮边界生效，从不在轮中生效
    async fn configure(&self, update: PolicyUpdate) -> SchedulerResult<()>;

    /// 按资源类别、按租户的利用率快照，供外部报表/计费消费
    async fn utilization_snapshot(&self) -> SchedulerResult<UtilizationSnapshot>;
}
