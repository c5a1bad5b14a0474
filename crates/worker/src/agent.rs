use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::debug;

use fairsched_core::models::{TaskExecutionContext, TaskKind};
use fairsched_core::{SchedulerError, SchedulerResult};

use crate::executors::ExecutorRegistry;

/// 工作节点代理
///
/// 承接调度域下发的指派、检查点与终止请求，按任务种类路由到执行器。
/// 执行结果经执行器的状态回报通道上行，代理本身不回传结果。
pub struct WorkerAgent {
    node_id: String,
    registry: ExecutorRegistry,
    /// 任务 -> 种类，检查点与终止时路由执行器
    resident: Mutex<HashMap<i64, TaskKind>>,
}

impl WorkerAgent {
    pub fn new(node_id: String, registry: ExecutorRegistry) -> Self {
        Self {
            node_id,
            registry,
            resident: Mutex::new(HashMap::new()),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub async fn assign(&self, ctx: TaskExecutionContext) -> SchedulerResult<()> {
        let executor = self.registry.get(ctx.kind).ok_or_else(|| {
            SchedulerError::InvalidTaskParams(format!(
                "节点 {} 不支持任务种类 {}",
                self.node_id,
                ctx.kind.as_str()
            ))
        })?;
        self.resident.lock().await.insert(ctx.task_id, ctx.kind);
        debug!("节点 {} 接受任务 {} 指派", self.node_id, ctx.task_id);
        executor.launch(ctx).await
    }

    pub async fn resume(&self, ctx: TaskExecutionContext, snapshot: Vec<u8>) -> SchedulerResult<()> {
        let executor = self.registry.get(ctx.kind).ok_or_else(|| {
            SchedulerError::InvalidTaskParams(format!(
                "节点 {} 不支持任务种类 {}",
                self.node_id,
                ctx.kind.as_str()
            ))
        })?;
        self.resident.lock().await.insert(ctx.task_id, ctx.kind);
        executor.resume(ctx, snapshot).await
    }

    pub async fn checkpoint(&self, task_id: i64) -> SchedulerResult<Vec<u8>> {
        let kind = self
            .resident
            .lock()
            .await
            .get(&task_id)
            .copied()
            .ok_or_else(|| {
                SchedulerError::Internal(format!(
                    "任务 {task_id} 不在节点 {} 上驻留",
                    self.node_id
                ))
            })?;
        let executor = self
            .registry
            .get(kind)
            .ok_or_else(|| SchedulerError::Internal("执行器缺失".to_string()))?;
        executor.capture_state(task_id).await
    }

    pub async fn terminate(&self, task_id: i64) -> SchedulerResult<()> {
        let kind = self.resident.lock().await.remove(&task_id);
        if let Some(kind) = kind {
            if let Some(executor) = self.registry.get(kind) {
                executor.terminate(task_id).await?;
            }
        }
        Ok(())
    }
}
