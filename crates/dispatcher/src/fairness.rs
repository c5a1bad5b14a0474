use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use fairsched_core::config::FairnessConfig;
use fairsched_core::models::{Tenant, UsageSample};

/// 公平性干预级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterventionLevel {
    /// 软性：对垄断租户的评分降权，默认对租户静默
    Soft,
    /// 硬性：直接抢占垄断租户的突发占用
    Hard,
}

#[derive(Debug, Clone)]
pub struct Intervention {
    pub tenant_id: String,
    pub level: InterventionLevel,
    pub share_ratio: f64,
}

#[derive(Debug, Clone)]
struct FlagState {
    over_since: DateTime<Utc>,
    soft_since: Option<DateTime<Utc>>,
}

/// 公平性监视器
///
/// 持续计算每租户滑动窗口内的 实际份额/应得份额。超阈值持续超过
/// 配置时长后发出干预事件：先软性降权，软性窗口内未恢复平衡再升级为硬抢占。
pub struct FairnessMonitor {
    config: FairnessConfig,
    flags: HashMap<String, FlagState>,
}

impl FairnessMonitor {
    pub fn new(config: FairnessConfig) -> Self {
        Self {
            config,
            flags: HashMap::new(),
        }
    }

    pub fn update_config(&mut self, config: FairnessConfig) {
        self.config = config;
    }

    pub fn expose_soft_interventions(&self) -> bool {
        self.config.expose_soft_interventions
    }

    /// 每轮推入一次用量采样
    pub fn observe(&mut self, tenants: &mut HashMap<String, Tenant>, now: DateTime<Utc>) {
        for tenant in tenants.values_mut() {
            tenant.history.push(UsageSample {
                at: now,
                actual_units: tenant.usage.total_units(),
                entitled_units: tenant.guaranteed.total_units(),
            });
        }
    }

    /// 评估垄断状态，返回需要执行的干预
    pub fn evaluate(
        &mut self,
        tenants: &HashMap<String, Tenant>,
        now: DateTime<Utc>,
    ) -> Vec<Intervention> {
        let mut interventions = Vec::new();

        for tenant in tenants.values() {
            let ratio = tenant.history.mean_share_ratio();

            if ratio <= self.config.monopolization_threshold {
                if self.flags.remove(&tenant.id).is_some() {
                    debug!("租户 {} 份额回落，解除垄断标记", tenant.id);
                }
                continue;
            }

            let flag = self.flags.entry(tenant.id.clone()).or_insert(FlagState {
                over_since: now,
                soft_since: None,
            });

            let over_duration = now - flag.over_since;
            if over_duration < Duration::seconds(self.config.flag_duration_seconds) {
                continue;
            }

            match flag.soft_since {
                None => {
                    flag.soft_since = Some(now);
                    interventions.push(Intervention {
                        tenant_id: tenant.id.clone(),
                        level: InterventionLevel::Soft,
                        share_ratio: ratio,
                    });
                }
                Some(soft_since) => {
                    if now - soft_since >= Duration::seconds(self.config.soft_window_seconds) {
                        interventions.push(Intervention {
                            tenant_id: tenant.id.clone(),
                            level: InterventionLevel::Hard,
                            share_ratio: ratio,
                        });
                    }
                }
            }
        }

        interventions
    }

    /// 软干预生效期间对该租户评分的降权系数，无干预为1.0
    pub fn deweight_factor(&self, tenant_id: &str) -> f64 {
        match self.flags.get(tenant_id) {
            Some(flag) if flag.soft_since.is_some() => self.config.soft_deweight_factor,
            _ => 1.0,
        }
    }

    /// 公平性欠账，供优先级引擎使用
    pub fn debt(&self, tenant: &Tenant) -> f64 {
        tenant.history.fairness_debt()
    }

    /// 硬干预执行后重新计时，避免连续轮次重复抢占
    pub fn acknowledge_hard(&mut self, tenant_id: &str, now: DateTime<Utc>) {
        if let Some(flag) = self.flags.get_mut(tenant_id) {
            flag.soft_since = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairsched_core::models::{ResourceVector, TenantSpec};

    fn make_tenants(usage: f64) -> HashMap<String, Tenant> {
        let mut tenant = Tenant::from_spec(
            TenantSpec {
                id: "hog".to_string(),
                name: "hog".to_string(),
                guaranteed: ResourceVector::new().with("cpu", 4.0),
                burst_ceiling: ResourceVector::new().with("cpu", 16.0),
            },
            Duration::seconds(600),
            Utc::now(),
        );
        tenant.usage = ResourceVector::new().with("cpu", usage);
        let mut tenants = HashMap::new();
        tenants.insert("hog".to_string(), tenant);
        tenants
    }

    fn config() -> FairnessConfig {
        FairnessConfig {
            window_seconds: 600,
            monopolization_threshold: 1.5,
            flag_duration_seconds: 60,
            soft_window_seconds: 120,
            soft_deweight_factor: 0.5,
            expose_soft_interventions: false,
        }
    }

    #[test]
    fn test_soft_then_hard_escalation() {
        let mut monitor = FairnessMonitor::new(config());
        let mut tenants = make_tenants(12.0); // 份额比 3.0 > 1.5
        let start = Utc::now();

        // 刚超阈值：只标记，不干预
        monitor.observe(&mut tenants, start);
        assert!(monitor.evaluate(&tenants, start).is_empty());

        // 持续超过flag_duration后：软干预
        let later = start + Duration::seconds(61);
        monitor.observe(&mut tenants, later);
        let interventions = monitor.evaluate(&tenants, later);
        assert_eq!(interventions.len(), 1);
        assert_eq!(interventions[0].level, InterventionLevel::Soft);
        assert_eq!(monitor.deweight_factor("hog"), 0.5);

        // 软窗口内未恢复：升级为硬干预
        let escalation = later + Duration::seconds(121);
        monitor.observe(&mut tenants, escalation);
        let interventions = monitor.evaluate(&tenants, escalation);
        assert_eq!(interventions.len(), 1);
        assert_eq!(interventions[0].level, InterventionLevel::Hard);
    }

    #[test]
    fn test_flag_cleared_when_balance_restored() {
        let mut monitor = FairnessMonitor::new(config());
        let mut tenants = make_tenants(12.0);
        let start = Utc::now();
        monitor.observe(&mut tenants, start);
        let later = start + Duration::seconds(61);
        monitor.observe(&mut tenants, later);
        monitor.evaluate(&tenants, later);
        assert_eq!(monitor.deweight_factor("hog"), 0.5);

        // 用量回落后窗口比值恢复，标记解除、降权取消
        tenants.get_mut("hog").unwrap().usage = ResourceVector::new().with("cpu", 2.0);
        let recovered = later + Duration::seconds(1200);
        monitor.observe(&mut tenants, recovered);
        monitor.evaluate(&tenants, recovered);
        assert_eq!(monitor.deweight_factor("hog"), 1.0);
    }

    #[test]
    fn test_fair_tenant_never_flagged() {
        let mut monitor = FairnessMonitor::new(config());
        let mut tenants = make_tenants(4.0);
        let now = Utc::now();
        for i in 0..10 {
            let at = now + Duration::seconds(i * 30);
            monitor.observe(&mut tenants, at);
            assert!(monitor.evaluate(&tenants, at).is_empty());
        }
    }
}
