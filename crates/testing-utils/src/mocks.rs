//! 共享mock实现

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use fairsched_core::models::TaskExecutionContext;
use fairsched_core::traits::WorkerGateway;
use fairsched_core::{SchedulerError, SchedulerResult};

/// 可编排行为的工作节点网关mock
///
/// 默认所有调用立即成功，检查点返回可预测的快照内容；
/// 测试可注入检查点失败、检查点延迟与指派失败。
#[derive(Default)]
pub struct MockWorkerGateway {
    pub assignments: Mutex<Vec<(String, i64)>>,
    pub resumes: Mutex<Vec<(String, i64, Vec<u8>)>>,
    pub terminations: Mutex<Vec<(String, i64)>>,
    checkpoint_payloads: Mutex<HashMap<i64, Vec<u8>>>,
    failing_checkpoints: Mutex<HashSet<i64>>,
    checkpoint_delay: Mutex<Option<Duration>>,
    failing_assign_nodes: Mutex<HashSet<String>>,
}

impl MockWorkerGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定任务的检查点内容
    pub async fn set_checkpoint_payload(&self, task_id: i64, payload: Vec<u8>) {
        self.checkpoint_payloads
            .lock()
            .await
            .insert(task_id, payload);
    }

    /// 注入检查点失败
    pub async fn fail_checkpoint(&self, task_id: i64) {
        self.failing_checkpoints.lock().await.insert(task_id);
    }

    /// 注入检查点延迟，用于超时路径
    pub async fn set_checkpoint_delay(&self, delay: Duration) {
        *self.checkpoint_delay.lock().await = Some(delay);
    }

    /// 注入节点指派失败
    pub async fn fail_assign_on(&self, node_id: &str) {
        self.failing_assign_nodes
            .lock()
            .await
            .insert(node_id.to_string());
    }

    pub async fn assignment_count(&self) -> usize {
        self.assignments.lock().await.len()
    }

    pub async fn terminated_tasks(&self) -> Vec<i64> {
        self.terminations
            .lock()
            .await
            .iter()
            .map(|(_, task_id)| *task_id)
            .collect()
    }
}

#[async_trait]
impl WorkerGateway for MockWorkerGateway {
    async fn assign(&self, node_id: &str, ctx: TaskExecutionContext) -> SchedulerResult<()> {
        if self.failing_assign_nodes.lock().await.contains(node_id) {
            return Err(SchedulerError::NodeFailure {
                node_id: node_id.to_string(),
            });
        }
        self.assignments
            .lock()
            .await
            .push((node_id.to_string(), ctx.task_id));
        Ok(())
    }

    async fn checkpoint(&self, _node_id: &str, task_id: i64) -> SchedulerResult<Vec<u8>> {
        if let Some(delay) = *self.checkpoint_delay.lock().await {
            tokio::time::sleep(delay).await;
        }
        if self.failing_checkpoints.lock().await.contains(&task_id) {
            return Err(SchedulerError::StorageUnavailable(format!(
                "注入的检查点失败: 任务 {task_id}"
            )));
        }
        Ok(self
            .checkpoint_payloads
            .lock()
            .await
            .get(&task_id)
            .cloned()
            .unwrap_or_else(|| format!("snapshot-{task_id}").into_bytes()))
    }

    async fn resume(
        &self,
        node_id: &str,
        ctx: TaskExecutionContext,
        snapshot: Vec<u8>,
    ) -> SchedulerResult<()> {
        if self.failing_assign_nodes.lock().await.contains(node_id) {
            return Err(SchedulerError::NodeFailure {
                node_id: node_id.to_string(),
            });
        }
        self.resumes
            .lock()
            .await
            .push((node_id.to_string(), ctx.task_id, snapshot));
        Ok(())
    }

    async fn terminate(&self, node_id: &str, task_id: i64) -> SchedulerResult<()> {
        self.terminations
            .lock()
            .await
            .push((node_id.to_string(), task_id));
        Ok(())
    }
}
