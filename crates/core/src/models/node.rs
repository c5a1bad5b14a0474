use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::resources::ResourceVector;
use super::task::TaskKind;

/// 工作节点
///
/// 容量与已分配量只由资源账本修改。`resident_tasks` 是当前驻留
/// （Running）任务的ID集合，节点失效或注销时这些任务进入恢复路径。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub capacity: ResourceVector,
    pub allocated: ResourceVector,
    pub health: NodeHealth,
    pub resident_tasks: HashSet<i64>,
    pub supported_kinds: Vec<TaskKind>,
    pub last_heartbeat: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
}

/// 节点健康状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeHealth {
    #[serde(rename = "HEALTHY")]
    Healthy,
    #[serde(rename = "DEGRADED")]
    Degraded,
    #[serde(rename = "UNREACHABLE")]
    Unreachable,
}

/// 节点注册参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    pub capacity: ResourceVector,
    #[serde(default = "default_supported_kinds")]
    pub supported_kinds: Vec<TaskKind>,
}

fn default_supported_kinds() -> Vec<TaskKind> {
    vec![TaskKind::Build, TaskKind::MlTraining, TaskKind::Simulation]
}

impl Node {
    pub fn from_spec(spec: NodeSpec, now: DateTime<Utc>) -> Self {
        Self {
            id: spec.id,
            capacity: spec.capacity,
            allocated: ResourceVector::new(),
            health: NodeHealth::Healthy,
            resident_tasks: HashSet::new(),
            supported_kinds: spec.supported_kinds,
            last_heartbeat: now,
            registered_at: now,
        }
    }

    /// 剩余可分配容量
    pub fn available(&self) -> ResourceVector {
        self.capacity.headroom(&self.allocated)
    }

    pub fn can_fit(&self, request: &ResourceVector) -> bool {
        request.fits_within(&self.available())
    }

    pub fn supports_kind(&self, kind: TaskKind) -> bool {
        self.supported_kinds.contains(&kind)
    }

    /// 仅Healthy节点接受新放置；Degraded节点保留驻留任务但不再接单
    pub fn accepts_placements(&self) -> bool {
        self.health == NodeHealth::Healthy
    }

    /// 已分配量占容量的比例（取各类别最大值），用于负载均衡选点
    pub fn load_fraction(&self) -> f64 {
        self.capacity
            .iter()
            .map(|(class, total)| {
                if total <= 0.0 {
                    0.0
                } else {
                    self.allocated.get(class) / total
                }
            })
            .fold(0.0, f64::max)
    }
}
