use chrono::{DateTime, Utc};

use fairsched_core::config::PolicyConfig;
use fairsched_core::models::Task;

/// 一轮调度中某任务的评分结果
#[derive(Debug, Clone)]
pub struct ScoredTask {
    pub task_id: i64,
    pub score: f64,
    pub submitted_at: DateTime<Utc>,
}

/// 优先级与截止时间引擎
///
/// 有效优先级 `P = w1·静态优先级 + w2·截止紧迫度 + w3·公平欠账`，
/// 每个调度轮重新计算，不在提交时一次性定值。权重来自配置。
pub struct PriorityEngine {
    config: PolicyConfig,
}

impl PriorityEngine {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn update_config(&mut self, config: PolicyConfig) {
        self.config = config;
    }

    /// 截止紧迫度：进入紧迫窗口后随剩余时间线性上升，过期取上限
    fn deadline_urgency(&self, deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
        let Some(deadline) = deadline else {
            return 0.0;
        };
        let remaining = (deadline - now).num_seconds();
        let threshold = self.config.urgency_threshold_seconds;
        if remaining >= threshold {
            0.0
        } else if remaining <= 0 {
            self.config.urgency_cap
        } else {
            self.config.urgency_cap * (threshold - remaining) as f64 / threshold as f64
        }
    }

    /// 计算有效优先级
    ///
    /// `fairness_debt` 取 [0,1]，`deweight` 是公平性软干预的降权系数（无干预为1.0）。
    pub fn effective_priority(
        &self,
        task: &Task,
        fairness_debt: f64,
        deweight: f64,
        now: DateTime<Utc>,
    ) -> f64 {
        let base = self.config.static_weight * task.static_priority as f64
            + self.config.urgency_weight * self.deadline_urgency(task.deadline, now)
            + self.config.fairness_weight * fairness_debt;
        base * deweight
    }

    /// 评分并降序排序；同分按提交时间FIFO、再按任务ID兜底，保证无饿死
    pub fn rank(&self, scored: Vec<ScoredTask>) -> Vec<ScoredTask> {
        let mut ranked = scored;
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.submitted_at.cmp(&b.submitted_at))
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        ranked
    }
}
