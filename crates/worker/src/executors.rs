use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use fairsched_core::models::{StatusUpdate, StatusUpdateKind, TaskExecutionContext, TaskKind};
use fairsched_core::traits::TaskExecutor;
use fairsched_core::{SchedulerError, SchedulerResult};

/// 模拟执行器的可恢复状态快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedSnapshot {
    pub completed_ms: u64,
    pub total_ms: u64,
}

struct RunningTask {
    handle: tokio::task::JoinHandle<()>,
    /// 已完成的模拟毫秒数，检查点时读取
    completed_ms: Arc<AtomicU64>,
    total_ms: u64,
}

/// 模拟执行器
///
/// 按参数 `duration_ms` 模拟长任务的推进，每个tick累计进度。
/// 参数 `fail_after_ms` 与 `fatal` 用于注入执行失败。
/// 进度即可恢复状态：检查点捕获已完成毫秒数，恢复时从该处继续。
pub struct SimulatedExecutor {
    kind: TaskKind,
    node_id: String,
    status_tx: mpsc::Sender<StatusUpdate>,
    running: Arc<Mutex<HashMap<i64, RunningTask>>>,
}

impl SimulatedExecutor {
    pub fn new(kind: TaskKind, node_id: String, status_tx: mpsc::Sender<StatusUpdate>) -> Self {
        Self {
            kind,
            node_id,
            status_tx,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn duration_ms(ctx: &TaskExecutionContext) -> u64 {
        ctx.parameters
            .get("duration_ms")
            .and_then(|v| v.as_u64())
            .unwrap_or(100)
    }

    fn fail_after_ms(ctx: &TaskExecutionContext) -> Option<(u64, bool)> {
        ctx.parameters
            .get("fail_after_ms")
            .and_then(|v| v.as_u64())
            .map(|ms| {
                let fatal = ctx
                    .parameters
                    .get("fatal")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                (ms, fatal)
            })
    }

    async fn start(&self, ctx: TaskExecutionContext, initial_ms: u64) -> SchedulerResult<()> {
        let total_ms = Self::duration_ms(&ctx);
        let fail_at = Self::fail_after_ms(&ctx);
        let completed = Arc::new(AtomicU64::new(initial_ms.min(total_ms)));
        let task_id = ctx.task_id;
        let node_id = self.node_id.clone();
        let status_tx = self.status_tx.clone();
        let running = self.running.clone();
        let progress = completed.clone();

        let handle = tokio::spawn(async move {
            let _ = status_tx
                .send(StatusUpdate {
                    task_id,
                    node_id: node_id.clone(),
                    kind: StatusUpdateKind::Started,
                    timestamp: Utc::now(),
                })
                .await;

            const TICK_MS: u64 = 10;
            loop {
                let done = progress.load(Ordering::Relaxed);
                if done >= total_ms {
                    break;
                }
                if let Some((fail_ms, fatal)) = fail_at {
                    if done >= fail_ms {
                        let _ = status_tx
                            .send(StatusUpdate {
                                task_id,
                                node_id: node_id.clone(),
                                kind: StatusUpdateKind::Failed {
                                    error: "模拟执行失败".to_string(),
                                    fatal,
                                },
                                timestamp: Utc::now(),
                            })
                            .await;
                        running.lock().await.remove(&task_id);
                        return;
                    }
                }
                tokio::time::sleep(std::time::Duration::from_millis(TICK_MS)).await;
                let done = progress.fetch_add(TICK_MS, Ordering::Relaxed) + TICK_MS;
                if done % 1000 < TICK_MS {
                    let _ = status_tx
                        .send(StatusUpdate {
                            task_id,
                            node_id: node_id.clone(),
                            kind: StatusUpdateKind::Progress {
                                fraction: (done as f64 / total_ms as f64).min(1.0),
                            },
                            timestamp: Utc::now(),
                        })
                        .await;
                }
            }

            let _ = status_tx
                .send(StatusUpdate {
                    task_id,
                    node_id: node_id.clone(),
                    kind: StatusUpdateKind::Completed,
                    timestamp: Utc::now(),
                })
                .await;
            running.lock().await.remove(&task_id);
        });

        self.running.lock().await.insert(
            ctx.task_id,
            RunningTask {
                handle,
                completed_ms: completed,
                total_ms,
            },
        );

        debug!(
            "节点 {} 启动 {} 任务 {} (总时长 {}ms, 起点 {}ms)",
            self.node_id,
            self.kind.as_str(),
            ctx.task_id,
            total_ms,
            initial_ms
        );
        Ok(())
    }
}

#[async_trait]
impl TaskExecutor for SimulatedExecutor {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    async fn launch(&self, ctx: TaskExecutionContext) -> SchedulerResult<()> {
        self.start(ctx, 0).await
    }

    async fn resume(&self, ctx: TaskExecutionContext, snapshot: Vec<u8>) -> SchedulerResult<()> {
        let snapshot: SimulatedSnapshot = serde_json::from_slice(&snapshot)?;
        info!(
            "任务 {} 从快照恢复，已完成 {}ms",
            ctx.task_id, snapshot.completed_ms
        );
        self.start(ctx, snapshot.completed_ms).await
    }

    async fn capture_state(&self, task_id: i64) -> SchedulerResult<Vec<u8>> {
        let running = self.running.lock().await;
        let task = running.get(&task_id).ok_or_else(|| {
            SchedulerError::Internal(format!("任务 {task_id} 未在本执行器运行"))
        })?;
        let snapshot = SimulatedSnapshot {
            completed_ms: task.completed_ms.load(Ordering::Relaxed),
            total_ms: task.total_ms,
        };
        Ok(serde_json::to_vec(&snapshot)?)
    }

    async fn terminate(&self, task_id: i64) -> SchedulerResult<()> {
        let mut running = self.running.lock().await;
        if let Some(task) = running.remove(&task_id) {
            task.handle.abort();
            debug!("任务 {} 已在节点 {} 终止", task_id, self.node_id);
        } else {
            warn!("终止请求的任务 {} 不在节点 {} 上运行", task_id, self.node_id);
        }
        Ok(())
    }
}

/// 执行器注册表：任务种类到执行器的能力映射
pub struct ExecutorRegistry {
    executors: HashMap<TaskKind, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    pub fn register(&mut self, executor: Arc<dyn TaskExecutor>) {
        self.executors.insert(executor.kind(), executor);
    }

    pub fn get(&self, kind: TaskKind) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(&kind).cloned()
    }

    /// 为节点构造支持全部种类的模拟执行器集合
    pub fn simulated(node_id: &str, status_tx: mpsc::Sender<StatusUpdate>) -> Self {
        let mut registry = Self::new();
        for kind in [TaskKind::Build, TaskKind::MlTraining, TaskKind::Simulation] {
            registry.register(Arc::new(SimulatedExecutor::new(
                kind,
                node_id.to_string(),
                status_tx.clone(),
            )));
        }
        registry
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
