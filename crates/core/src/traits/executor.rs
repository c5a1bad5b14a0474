use async_trait::async_trait;

use crate::errors::SchedulerResult;
use crate::models::{TaskExecutionContext, TaskKind};

/// 任务执行器接口（工作节点侧）
///
/// 调度核心不执行任务体；每种任务种类由一个执行器实现承载。
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    fn kind(&self) -> TaskKind;

    /// 启动执行，立即返回；完成/失败经状态回报通道上报
    async fn launch(&self, ctx: TaskExecutionContext) -> SchedulerResult<()>;

    /// 从快照恢复执行
    async fn resume(&self, ctx: TaskExecutionContext, snapshot: Vec<u8>) -> SchedulerResult<()>;

    /// 捕获当前可恢复状态
    async fn capture_state(&self, task_id: i64) -> SchedulerResult<Vec<u8>>;

    /// 终止执行并释放执行器侧资源
    async fn terminate(&self, task_id: i64) -> SchedulerResult<()>;
}

/// 工作节点网关（调度器侧）
///
/// 调度域通过该接口把指派、检查点请求和终止请求路由到具体节点。
/// 所有调用都可能跨越慢节点，调用方必须施加有界超时。
#[async_trait]
pub trait WorkerGateway: Send + Sync {
    /// 把任务指派到节点并启动执行
    async fn assign(&self, node_id: &str, ctx: TaskExecutionContext) -> SchedulerResult<()>;

    /// 请求节点捕获任务的可恢复状态
    async fn checkpoint(&self, node_id: &str, task_id: i64) -> SchedulerResult<Vec<u8>>;

    /// 从快照在节点上恢复任务执行
    async fn resume(
        &self,
        node_id: &str,
        ctx: TaskExecutionContext,
        snapshot: Vec<u8>,
    ) -> SchedulerResult<()>;

    /// 终止节点上的任务
    async fn terminate(&self, node_id: &str, task_id: i64) -> SchedulerResult<()>;
}
