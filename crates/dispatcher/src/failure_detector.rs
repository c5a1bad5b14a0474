use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use fairsched_core::config::FailureConfig;
use fairsched_core::models::{Node, NodeHealth};

/// 节点失效检测器
///
/// 周期性扫描心跳时间戳，超时的节点标记为Unreachable，
/// 其驻留任务由调度域转入恢复路径。
pub struct FailureDetector {
    config: FailureConfig,
}

impl FailureDetector {
    pub fn new(config: FailureConfig) -> Self {
        Self { config }
    }

    pub fn update_config(&mut self, config: FailureConfig) {
        self.config = config;
    }

    /// 返回本次扫描新判定失效的节点ID
    pub fn sweep<'a>(
        &self,
        nodes: impl Iterator<Item = &'a Node>,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let timeout = Duration::seconds(self.config.heartbeat_timeout_seconds);
        let mut failed = Vec::new();

        for node in nodes {
            if node.health == NodeHealth::Unreachable {
                continue;
            }
            let silence = now - node.last_heartbeat;
            if silence > timeout {
                warn!(
                    "节点 {} 心跳静默 {} 秒，判定失效",
                    node.id,
                    silence.num_seconds()
                );
                failed.push(node.id.clone());
            }
        }
        failed
    }
}
