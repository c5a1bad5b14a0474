use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use fairsched_core::config::{CheckpointConfig, CheckpointTimeoutPolicy, FailureConfig};
use fairsched_core::models::{Checkpoint, Task};
use fairsched_core::traits::{CheckpointStore, WorkerGateway};
use fairsched_core::{SchedulerError, SchedulerResult};
use fairsched_infrastructure::{sha256_hex, StructuredLogger};

/// 一次恢复准备的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// 从已校验的检查点续跑
    ResumeFrom { sequence: u64 },
    /// 无有效检查点，从头重跑，重试计数加一
    Restart,
}

/// 检查点与恢复管理器
///
/// 检查点捕获经工作节点网关发起，受有界超时约束；存储失败带退避重试，
/// 超过配置次数后由调用方按超时策略处置（强制挂起或放弃抢占）。
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    gateway: Arc<dyn WorkerGateway>,
    config: CheckpointConfig,
}

impl CheckpointManager {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        gateway: Arc<dyn WorkerGateway>,
        config: CheckpointConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    pub fn update_config(&mut self, config: CheckpointConfig) {
        self.config = config;
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    pub fn timeout_policy(&self) -> CheckpointTimeoutPolicy {
        self.config.policy()
    }

    pub fn interval_seconds(&self) -> u64 {
        self.config.interval_seconds
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.config.cancel_grace_ms)
    }

    /// 为运行中任务创建检查点
    ///
    /// 成功时推进任务的序号计数并更新其检查点引用，保证每任务序号严格递增。
    pub async fn checkpoint_task(
        &self,
        task: &mut Task,
        node_id: &str,
    ) -> SchedulerResult<Checkpoint> {
        let mut last_error = SchedulerError::CheckpointTimeout { task_id: task.id };

        for attempt in 1..=self.config.max_retries {
            let capture = tokio::time::timeout(
                Duration::from_millis(self.config.timeout_ms),
                self.gateway.checkpoint(node_id, task.id),
            )
            .await;

            match capture {
                Err(_) => {
                    last_error = SchedulerError::CheckpointTimeout { task_id: task.id };
                }
                Ok(Err(e)) => {
                    last_error = e;
                }
                Ok(Ok(payload)) => {
                    match self
                        .store
                        .put(task.id, task.next_checkpoint_sequence, &payload)
                        .await
                    {
                        Ok(checkpoint) => {
                            task.next_checkpoint_sequence += 1;
                            task.checkpoint_ref = Some(checkpoint.checkpoint_ref());
                            info!(
                                "任务 {} 检查点序号 {} 已持久化 ({} 字节)",
                                task.id,
                                checkpoint.sequence,
                                checkpoint.blob.size_bytes
                            );
                            return Ok(checkpoint);
                        }
                        Err(e) => {
                            last_error = e;
                        }
                    }
                }
            }

            StructuredLogger::log_checkpoint_failure(task.id, attempt, &last_error.to_string());
            if attempt < self.config.max_retries {
                tokio::time::sleep(Duration::from_millis(
                    self.config.retry_backoff_ms * attempt as u64,
                ))
                .await;
            }
        }

        Err(last_error)
    }

    /// 取回并校验检查点内容，哈希不符或存储不可达均视为无效
    pub async fn verified_payload(&self, checkpoint: &Checkpoint) -> Option<Vec<u8>> {
        match self.store.fetch(checkpoint).await {
            Ok(payload) => {
                if sha256_hex(&payload) == checkpoint.blob.sha256 {
                    Some(payload)
                } else {
                    warn!(
                        "任务 {} 检查点序号 {} 完整性校验失败",
                        checkpoint.task_id, checkpoint.sequence
                    );
                    None
                }
            }
            Err(e) => {
                warn!(
                    "任务 {} 检查点序号 {} 读取失败: {}",
                    checkpoint.task_id, checkpoint.sequence, e
                );
                None
            }
        }
    }

    /// 恢复准备：从最新到最旧寻找首个通过校验的检查点
    ///
    /// 幂等：同一检查点索引下重复调用产生等价的任务状态。
    /// 全部无效时清空引用并把重试计数加一，任务从头重跑。
    pub async fn prepare_recovery(
        &self,
        task: &mut Task,
        index: &[Checkpoint],
    ) -> RecoveryOutcome {
        for checkpoint in index.iter().rev() {
            if self.verified_payload(checkpoint).await.is_some() {
                debug!(
                    "任务 {} 将从检查点序号 {} 恢复",
                    task.id, checkpoint.sequence
                );
                task.checkpoint_ref = Some(checkpoint.checkpoint_ref());
                return RecoveryOutcome::ResumeFrom {
                    sequence: checkpoint.sequence,
                };
            }
        }

        warn!("任务 {} 无有效检查点，将从头重跑", task.id);
        task.checkpoint_ref = None;
        task.retry_count += 1;
        RecoveryOutcome::Restart
    }

    /// 保留策略：只留最新N个检查点，返回被回收的序号
    pub async fn prune(&self, task_id: i64, index: &mut Vec<Checkpoint>) -> Vec<u64> {
        let mut pruned = Vec::new();
        while index.len() > self.config.retention_count {
            let oldest = index.remove(0);
            if let Err(e) = self.store.remove(task_id, oldest.sequence).await {
                warn!(
                    "回收任务 {} 检查点序号 {} 失败: {}",
                    task_id, oldest.sequence, e
                );
            }
            pruned.push(oldest.sequence);
        }
        pruned
    }
}

/// 重试退避计算
///
/// 指数退避加随机抖动，避免雷群效应。
pub struct RetryBackoff {
    config: FailureConfig,
}

impl RetryBackoff {
    pub fn new(config: FailureConfig) -> Self {
        Self { config }
    }

    pub fn update_config(&mut self, config: FailureConfig) {
        self.config = config;
    }

    pub fn next_retry_at(&self, retry_count: i32, now: DateTime<Utc>) -> DateTime<Utc> {
        let base = self.config.retry_base_interval_seconds as f64;
        let max = self.config.retry_max_interval_seconds as f64;

        let exponential = base * self.config.backoff_multiplier.powi(retry_count.max(0));
        let capped = exponential.min(max);

        let jitter = capped * self.config.jitter_factor * (rand::random::<f64>() - 0.5) * 2.0;
        let final_interval = (capped + jitter).max(base);

        now + chrono::Duration::seconds(final_interval as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_with_retry_count() {
        let backoff = RetryBackoff::new(FailureConfig {
            jitter_factor: 0.0,
            ..FailureConfig::default()
        });
        let now = Utc::now();

        let first = backoff.next_retry_at(0, now) - now;
        let second = backoff.next_retry_at(1, now) - now;
        let third = backoff.next_retry_at(2, now) - now;

        assert_eq!(first.num_seconds(), 60);
        assert_eq!(second.num_seconds(), 120);
        assert_eq!(third.num_seconds(), 240);
    }

    #[test]
    fn test_backoff_capped_at_max() {
        let backoff = RetryBackoff::new(FailureConfig {
            jitter_factor: 0.0,
            ..FailureConfig::default()
        });
        let now = Utc::now();
        let interval = backoff.next_retry_at(20, now) - now;
        assert_eq!(interval.num_seconds(), 3600);
    }

    #[test]
    fn test_backoff_with_jitter_stays_reasonable() {
        let backoff = RetryBackoff::new(FailureConfig::default());
        let now = Utc::now();
        for retry in 0..5 {
            let at = backoff.next_retry_at(retry, now);
            let seconds = (at - now).num_seconds();
            assert!(seconds >= 60, "退避不应低于基础间隔: {seconds}");
            assert!(seconds <= 4000, "退避不应超出上限太多: {seconds}");
        }
    }
}
