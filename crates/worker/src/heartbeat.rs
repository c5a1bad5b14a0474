use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use fairsched_core::traits::ClusterManagementService;

/// 心跳管理器
///
/// 周期性向调度域上报节点存活；停止信号经watch通道下发。
pub struct HeartbeatManager {
    node_id: String,
    service: Arc<dyn ClusterManagementService>,
    interval: Duration,
}

impl HeartbeatManager {
    pub fn new(
        node_id: String,
        service: Arc<dyn ClusterManagementService>,
        interval: Duration,
    ) -> Self {
        Self {
            node_id,
            service,
            interval,
        }
    }

    /// 本机主机名作为默认节点ID
    pub fn default_node_id() -> String {
        hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "worker-local".to_string())
    }

    pub fn start(self, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        match self.service.node_heartbeat(&self.node_id).await {
                            Ok(()) => debug!("节点 {} 心跳已上报", self.node_id),
                            Err(e) => warn!("节点 {} 心跳上报失败: {}", self.node_id, e),
                        }
                    }
                    changed = shutdown.changed() => {
                        // 发送端消失或收到停止信号都结束心跳
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("节点 {} 心跳停止", self.node_id);
                            break;
                        }
                    }
                }
            }
        })
    }
}
