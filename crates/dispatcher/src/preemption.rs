use std::collections::HashMap;

use tracing::debug;

use fairsched_core::models::ResourceVector;

/// 抢占触发原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreemptionReason {
    /// 保障配额所有者被拒而突发租户持有可回收容量
    QuotaReclaim { for_tenant: String },
    /// 待调度任务有效优先级超出运行任务配置余量以上
    PriorityGap { pending_task: i64 },
    /// 公平性监视器的硬干预
    Monopolization { tenant_id: String },
}

/// 抢占候选
///
/// 不可检查点的任务不进入候选集合（硬约束），由调用方与控制器双重过滤。
#[derive(Debug, Clone)]
pub struct PreemptionCandidate {
    pub task_id: i64,
    pub node_id: String,
    pub tenant_id: String,
    pub effective_priority: f64,
    pub footprint: ResourceVector,
    /// 距最近一次检查点的秒数；从未检查点取 `i64::MAX`（最贵）
    pub checkpoint_age_seconds: i64,
    pub checkpointable: bool,
    pub burst: bool,
}

/// 选出的抢占方案：在单一节点上腾出足够容量
#[derive(Debug, Clone)]
pub struct PreemptionPlan {
    pub node_id: String,
    pub victims: Vec<i64>,
}

/// 抢占控制器
///
/// 候选排序偏好：(i) 检查点最新/最廉价，(ii) 有效优先级最低，
/// (iii) 单次抢占释放的资源足迹最大（最小化抢占次数）。
pub struct PreemptionController {
    margin: f64,
}

impl PreemptionController {
    pub fn new(margin: f64) -> Self {
        Self { margin }
    }

    pub fn update_margin(&mut self, margin: f64) {
        self.margin = margin;
    }

    /// 优先级差触发判定
    pub fn exceeds_margin(&self, pending_score: f64, running_score: f64) -> bool {
        pending_score - running_score > self.margin
    }

    fn order_candidates(candidates: &mut [PreemptionCandidate]) {
        candidates.sort_by(|a, b| {
            a.checkpoint_age_seconds
                .cmp(&b.checkpoint_age_seconds)
                .then_with(|| {
                    a.effective_priority
                        .partial_cmp(&b.effective_priority)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| {
                    b.footprint
                        .total_units()
                        .partial_cmp(&a.footprint.total_units())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });
    }

    /// 为请求在某个节点上规划腾挪方案，返回牺牲者最少的节点方案
    ///
    /// `node_available` 为各节点当前剩余容量（仅限可接受该任务的节点）。
    pub fn plan(
        &self,
        request: &ResourceVector,
        node_available: &HashMap<String, ResourceVector>,
        candidates: Vec<PreemptionCandidate>,
    ) -> Option<PreemptionPlan> {
        let mut per_node: HashMap<String, Vec<PreemptionCandidate>> = HashMap::new();
        for candidate in candidates {
            if !candidate.checkpointable {
                // 硬约束：不可检查点的任务完全不参与抢占
                continue;
            }
            per_node
                .entry(candidate.node_id.clone())
                .or_default()
                .push(candidate);
        }

        let mut best: Option<PreemptionPlan> = None;
        for (node_id, available) in node_available {
            let Some(node_candidates) = per_node.get_mut(node_id) else {
                continue;
            };
            Self::order_candidates(node_candidates);

            let mut freed = available.clone();
            let mut victims = Vec::new();
            for candidate in node_candidates.iter() {
                if request.fits_within(&freed) {
                    break;
                }
                freed.add(&candidate.footprint);
                victims.push(candidate.task_id);
            }

            if request.fits_within(&freed) && !victims.is_empty() {
                let better = match &best {
                    None => true,
                    Some(plan) => victims.len() < plan.victims.len(),
                };
                if better {
                    best = Some(PreemptionPlan {
                        node_id: node_id.clone(),
                        victims,
                    });
                }
            }
        }

        if let Some(plan) = &best {
            debug!(
                "抢占方案: 节点 {} 牺牲 {} 个任务",
                plan.node_id,
                plan.victims.len()
            );
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu(amount: f64) -> ResourceVector {
        ResourceVector::new().with("cpu", amount)
    }

    fn candidate(task_id: i64, node: &str, priority: f64, footprint: f64, age: i64) -> PreemptionCandidate {
        PreemptionCandidate {
            task_id,
            node_id: node.to_string(),
            tenant_id: "t".to_string(),
            effective_priority: priority,
            footprint: cpu(footprint),
            checkpoint_age_seconds: age,
            checkpointable: true,
            burst: true,
        }
    }

    #[test]
    fn test_non_checkpointable_never_selected() {
        let controller = PreemptionController::new(2.0);
        let mut c = candidate(1, "node-1", 0.0, 8.0, 0);
        c.checkpointable = false;

        let mut available = HashMap::new();
        available.insert("node-1".to_string(), cpu(0.0));

        let plan = controller.plan(&cpu(4.0), &available, vec![c]);
        assert!(plan.is_none());
    }

    #[test]
    fn test_prefers_recent_checkpoint() {
        let controller = PreemptionController::new(2.0);
        let mut available = HashMap::new();
        available.insert("node-1".to_string(), cpu(0.0));

        let plan = controller
            .plan(
                &cpu(4.0),
                &available,
                vec![
                    candidate(1, "node-1", 1.0, 4.0, 600),
                    candidate(2, "node-1", 1.0, 4.0, 10),
                ],
            )
            .unwrap();
        assert_eq!(plan.victims, vec![2]);
    }

    #[test]
    fn test_prefers_lowest_priority_on_equal_checkpoint_age() {
        let controller = PreemptionController::new(2.0);
        let mut available = HashMap::new();
        available.insert("node-1".to_string(), cpu(0.0));

        let plan = controller
            .plan(
                &cpu(4.0),
                &available,
                vec![
                    candidate(1, "node-1", 5.0, 4.0, 10),
                    candidate(2, "node-1", 1.0, 4.0, 10),
                ],
            )
            .unwrap();
        assert_eq!(plan.victims, vec![2]);
    }

    #[test]
    fn test_minimizes_victim_count_across_nodes() {
        let controller = PreemptionController::new(2.0);
        let mut available = HashMap::new();
        available.insert("node-1".to_string(), cpu(0.0));
        available.insert("node-2".to_string(), cpu(0.0));

        // node-1 需要两个牺牲者，node-2 一个就够
        let plan = controller
            .plan(
                &cpu(4.0),
                &available,
                vec![
                    candidate(1, "node-1", 1.0, 2.0, 10),
                    candidate(2, "node-1", 1.0, 2.0, 10),
                    candidate(3, "node-2", 1.0, 4.0, 10),
                ],
            )
            .unwrap();
        assert_eq!(plan.node_id, "node-2");
        assert_eq!(plan.victims, vec![3]);
    }

    #[test]
    fn test_no_plan_when_insufficient_even_after_preemption() {
        let controller = PreemptionController::new(2.0);
        let mut available = HashMap::new();
        available.insert("node-1".to_string(), cpu(1.0));

        let plan = controller.plan(
            &cpu(8.0),
            &available,
            vec![candidate(1, "node-1", 1.0, 2.0, 10)],
        );
        assert!(plan.is_none());
    }

    #[test]
    fn test_margin_check() {
        let controller = PreemptionController::new(2.0);
        assert!(!controller.exceeds_margin(5.0, 4.0));
        assert!(!controller.exceeds_margin(6.0, 4.0));
        assert!(controller.exceeds_margin(6.1, 4.0));
    }
}
