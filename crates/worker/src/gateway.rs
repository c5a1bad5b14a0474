use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use fairsched_core::models::TaskExecutionContext;
use fairsched_core::traits::WorkerGateway;
use fairsched_core::{SchedulerError, SchedulerResult};

use crate::agent::WorkerAgent;

/// 进程内工作节点网关
///
/// 把调度域的网关调用路由到同进程的节点代理，适用于嵌入式部署与测试。
/// 跨进程网关是外部集成的事，核心只依赖 `WorkerGateway` 抽象。
#[derive(Default)]
pub struct LocalWorkerGateway {
    agents: RwLock<HashMap<String, Arc<WorkerAgent>>>,
}

impl LocalWorkerGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attach(&self, agent: Arc<WorkerAgent>) {
        self.agents
            .write()
            .await
            .insert(agent.node_id().to_string(), agent);
    }

    pub async fn detach(&self, node_id: &str) {
        self.agents.write().await.remove(node_id);
    }

    async fn agent(&self, node_id: &str) -> SchedulerResult<Arc<WorkerAgent>> {
        self.agents
            .read()
            .await
            .get(node_id)
            .cloned()
            .ok_or_else(|| SchedulerError::NodeFailure {
                node_id: node_id.to_string(),
            })
    }
}

#[async_trait]
impl WorkerGateway for LocalWorkerGateway {
    async fn assign(&self, node_id: &str, ctx: TaskExecutionContext) -> SchedulerResult<()> {
        self.agent(node_id).await?.assign(ctx).await
    }

    async fn checkpoint(&self, node_id: &str, task_id: i64) -> SchedulerResult<Vec<u8>> {
        self.agent(node_id).await?.checkpoint(task_id).await
    }

    async fn resume(
        &self,
        node_id: &str,
        ctx: TaskExecutionContext,
        snapshot: Vec<u8>,
    ) -> SchedulerResult<()> {
        self.agent(node_id).await?.resume(ctx, snapshot).await
    }

    async fn terminate(&self, node_id: &str, task_id: i64) -> SchedulerResult<()> {
        self.agent(node_id).await?.terminate(task_id).await
    }
}
