use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use fairsched_core::models::{Node, NodeHealth, ResourceVector, Task, Tenant};
use fairsched_core::{SchedulerError, SchedulerResult};

/// 一次资源预留
///
/// `burst` 标记该预留是否属于突发占用——突发预留是配额回收和抢占的首选对象。
#[derive(Debug, Clone)]
pub struct Reservation {
    pub id: Uuid,
    pub node_id: String,
    pub task_id: i64,
    pub tenant_id: String,
    pub vector: ResourceVector,
    pub burst: bool,
    pub created_at: DateTime<Utc>,
}

/// 资源账本
///
/// 每个调度域唯一的容量事实来源。所有容量变更必须经过 `reserve`/`release`，
/// 任何组件不得绕过账本直接指派资源。账本由调度域控制循环独占持有，
/// 同域内的预留天然串行；不同域各持账本，互不影响。
#[derive(Debug, Default)]
pub struct ResourceLedger {
    nodes: HashMap<String, Node>,
    reservations: HashMap<Uuid, Reservation>,
    by_task: HashMap<i64, Uuid>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_node(&mut self, node: Node) -> SchedulerResult<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(SchedulerError::Internal(format!(
                "节点 {} 已注册",
                node.id
            )));
        }
        debug!("注册节点 {} 容量 {:?}", node.id, node.capacity);
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// 摘除节点并返回其驻留任务，调用方负责先释放预留、再走恢复路径
    pub fn remove_node(&mut self, node_id: &str) -> SchedulerResult<Node> {
        self.nodes
            .remove(node_id)
            .ok_or_else(|| SchedulerError::NodeNotFound {
                id: node_id.to_string(),
            })
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn set_node_health(&mut self, node_id: &str, health: NodeHealth) -> SchedulerResult<()> {
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| SchedulerError::NodeNotFound {
                id: node_id.to_string(),
            })?;
        node.health = health;
        Ok(())
    }

    pub fn record_heartbeat(&mut self, node_id: &str, now: DateTime<Utc>) -> SchedulerResult<()> {
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| SchedulerError::NodeNotFound {
                id: node_id.to_string(),
            })?;
        node.last_heartbeat = now;
        // 恢复心跳的Unreachable节点回到Degraded，需人工或后续心跳确认健康
        if node.health == NodeHealth::Unreachable {
            node.health = NodeHealth::Degraded;
        } else {
            node.health = NodeHealth::Healthy;
        }
        Ok(())
    }

    /// 原子预留：完整向量要么全部预留成功，要么全无副作用
    ///
    /// 成功时事务性更新节点已分配量与租户用量。
    pub fn reserve(
        &mut self,
        node_id: &str,
        task: &Task,
        tenant: &mut Tenant,
        burst: bool,
    ) -> SchedulerResult<Uuid> {
        if self.by_task.contains_key(&task.id) {
            return Err(SchedulerError::PlacementConflict(format!(
                "任务 {} 已持有预留",
                task.id
            )));
        }
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| SchedulerError::NodeNotFound {
                id: node_id.to_string(),
            })?;
        if !node.can_fit(&task.request) {
            return Err(SchedulerError::InsufficientCapacity {
                node_id: node_id.to_string(),
            });
        }

        // 全部检查通过后才应用变更
        node.allocated.add(&task.request);
        node.resident_tasks.insert(task.id);
        tenant.usage.add(&task.request);

        debug_assert!(
            node.allocated.fits_within(&node.capacity),
            "节点 {node_id} 分配量超出容量"
        );

        let reservation = Reservation {
            id: Uuid::new_v4(),
            node_id: node_id.to_string(),
            task_id: task.id,
            tenant_id: tenant.id.clone(),
            vector: task.request.clone(),
            burst,
            created_at: Utc::now(),
        };
        let id = reservation.id;
        self.by_task.insert(task.id, id);
        self.reservations.insert(id, reservation);

        debug!(
            "预留成功: 任务 {} -> 节点 {} (突发: {})",
            task.id, node_id, burst
        );
        Ok(id)
    }

    /// 释放预留，回退节点已分配量与租户用量
    pub fn release(
        &mut self,
        reservation_id: Uuid,
        tenants: &mut HashMap<String, Tenant>,
    ) -> SchedulerResult<Reservation> {
        let reservation = self
            .reservations
            .remove(&reservation_id)
            .ok_or_else(|| SchedulerError::Internal(format!("预留 {reservation_id} 不存在")))?;
        self.by_task.remove(&reservation.task_id);

        if let Some(node) = self.nodes.get_mut(&reservation.node_id) {
            node.allocated.saturating_sub(&reservation.vector);
            node.resident_tasks.remove(&reservation.task_id);
        }
        if let Some(tenant) = tenants.get_mut(&reservation.tenant_id) {
            tenant.usage.saturating_sub(&reservation.vector);
        }

        debug!(
            "释放预留: 任务 {} 于节点 {}",
            reservation.task_id, reservation.node_id
        );
        Ok(reservation)
    }

    /// 按任务释放预留；任务无预留时为无操作
    pub fn release_task(
        &mut self,
        task_id: i64,
        tenants: &mut HashMap<String, Tenant>,
    ) -> Option<Reservation> {
        let id = self.by_task.get(&task_id).copied()?;
        self.release(id, tenants).ok()
    }

    pub fn reservation_for_task(&self, task_id: i64) -> Option<&Reservation> {
        self.by_task
            .get(&task_id)
            .and_then(|id| self.reservations.get(id))
    }

    /// 当前的突发预留，配额回收的候选集合
    pub fn burst_reservations(&self) -> Vec<&Reservation> {
        self.reservations.values().filter(|r| r.burst).collect()
    }

    pub fn query(&self, node_id: &str) -> SchedulerResult<(ResourceVector, ResourceVector)> {
        let node = self
            .nodes
            .get(node_id)
            .ok_or_else(|| SchedulerError::NodeNotFound {
                id: node_id.to_string(),
            })?;
        Ok((node.capacity.clone(), node.allocated.clone()))
    }

    /// 健康节点的总剩余容量
    pub fn idle_capacity(&self) -> ResourceVector {
        let mut idle = ResourceVector::new();
        for node in self.nodes.values() {
            if node.health == NodeHealth::Healthy {
                idle.add(&node.available());
            }
        }
        idle
    }

    pub fn healthy_node_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| n.health == NodeHealth::Healthy)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use fairsched_core::models::{NodeSpec, TaskKind, TaskSpec, TenantSpec};

    fn make_tenant(id: &str, guaranteed: f64, burst: f64) -> Tenant {
        Tenant::from_spec(
            TenantSpec {
                id: id.to_string(),
                name: id.to_string(),
                guaranteed: ResourceVector::new().with("cpu", guaranteed),
                burst_ceiling: ResourceVector::new().with("cpu", burst),
            },
            Duration::seconds(600),
            Utc::now(),
        )
    }

    fn make_node(id: &str, cpu: f64) -> Node {
        Node::from_spec(
            NodeSpec {
                id: id.to_string(),
                capacity: ResourceVector::new().with("cpu", cpu),
                supported_kinds: vec![TaskKind::Build, TaskKind::MlTraining, TaskKind::Simulation],
            },
            Utc::now(),
        )
    }

    fn make_task(id: i64, tenant: &str, cpu: f64) -> Task {
        Task::from_spec(
            id,
            TaskSpec {
                name: format!("task-{id}"),
                tenant_id: tenant.to_string(),
                kind: TaskKind::Simulation,
                parameters: serde_json::json!({}),
                request: ResourceVector::new().with("cpu", cpu),
                static_priority: 0,
                deadline: None,
                dependencies: vec![],
                max_retries: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_reserve_updates_node_and_tenant() {
        let mut ledger = ResourceLedger::new();
        ledger.register_node(make_node("node-1", 8.0)).unwrap();
        let mut tenant = make_tenant("a", 4.0, 8.0);
        let task = make_task(1, "a", 2.0);

        ledger.reserve("node-1", &task, &mut tenant, false).unwrap();

        let (_, allocated) = ledger.query("node-1").unwrap();
        assert_eq!(allocated.get("cpu"), 2.0);
        assert_eq!(tenant.usage.get("cpu"), 2.0);
    }

    #[test]
    fn test_reserve_is_all_or_nothing() {
        let mut ledger = ResourceLedger::new();
        ledger.register_node(make_node("node-1", 4.0)).unwrap();
        let mut tenant = make_tenant("a", 4.0, 8.0);

        // cpu可满足但gpu不足，应无任何副作用
        let mut task = make_task(1, "a", 2.0);
        task.request.set("gpu", 1.0);
        let result = ledger.reserve("node-1", &task, &mut tenant, false);
        assert!(matches!(
            result,
            Err(SchedulerError::InsufficientCapacity { .. })
        ));

        let (_, allocated) = ledger.query("node-1").unwrap();
        assert!(allocated.is_empty());
        assert!(tenant.usage.is_empty());
    }

    #[test]
    fn test_no_double_allocation() {
        let mut ledger = ResourceLedger::new();
        ledger.register_node(make_node("node-1", 8.0)).unwrap();
        let mut tenant = make_tenant("a", 8.0, 8.0);

        ledger
            .reserve("node-1", &make_task(1, "a", 5.0), &mut tenant, false)
            .unwrap();
        let result = ledger.reserve("node-1", &make_task(2, "a", 5.0), &mut tenant, false);
        assert!(matches!(
            result,
            Err(SchedulerError::InsufficientCapacity { .. })
        ));

        // 不变式：分配量不超过容量
        let (capacity, allocated) = ledger.query("node-1").unwrap();
        assert!(allocated.fits_within(&capacity));
    }

    #[test]
    fn test_one_reservation_per_task() {
        let mut ledger = ResourceLedger::new();
        ledger.register_node(make_node("node-1", 8.0)).unwrap();
        ledger.register_node(make_node("node-2", 8.0)).unwrap();
        let mut tenant = make_tenant("a", 8.0, 8.0);
        let task = make_task(1, "a", 1.0);

        ledger.reserve("node-1", &task, &mut tenant, false).unwrap();
        let result = ledger.reserve("node-2", &task, &mut tenant, false);
        assert!(matches!(result, Err(SchedulerError::PlacementConflict(_))));
    }

    #[test]
    fn test_release_restores_capacity() {
        let mut ledger = ResourceLedger::new();
        ledger.register_node(make_node("node-1", 8.0)).unwrap();
        let mut tenants = HashMap::new();
        tenants.insert("a".to_string(), make_tenant("a", 8.0, 8.0));

        let task = make_task(1, "a", 3.0);
        let id = ledger
            .reserve("node-1", &task, tenants.get_mut("a").unwrap(), false)
            .unwrap();

        let released = ledger.release(id, &mut tenants).unwrap();
        assert_eq!(released.task_id, 1);

        let (_, allocated) = ledger.query("node-1").unwrap();
        assert!(allocated.is_empty());
        assert!(tenants["a"].usage.is_empty());
        assert!(ledger.reservation_for_task(1).is_none());
    }

    #[test]
    fn test_idle_capacity_ignores_unhealthy_nodes() {
        let mut ledger = ResourceLedger::new();
        ledger.register_node(make_node("node-1", 8.0)).unwrap();
        ledger.register_node(make_node("node-2", 4.0)).unwrap();
        ledger
            .set_node_health("node-2", NodeHealth::Unreachable)
            .unwrap();

        assert_eq!(ledger.idle_capacity().get("cpu"), 8.0);
    }

    #[test]
    fn test_burst_reservations_filter() {
        let mut ledger = ResourceLedger::new();
        ledger.register_node(make_node("node-1", 8.0)).unwrap();
        let mut tenant = make_tenant("a", 4.0, 8.0);

        ledger
            .reserve("node-1", &make_task(1, "a", 4.0), &mut tenant, false)
            .unwrap();
        ledger
            .reserve("node-1", &make_task(2, "a", 2.0), &mut tenant, true)
            .unwrap();

        let burst = ledger.burst_reservations();
        assert_eq!(burst.len(), 1);
        assert_eq!(burst[0].task_id, 2);
    }
}
