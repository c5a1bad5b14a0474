use std::collections::HashMap;

use chrono::Duration;
use tracing::debug;

use fairsched_core::config::{QuotaConfig, ReclamationPolicy};
use fairsched_core::models::{ResourceVector, Tenant};

/// 准入裁决
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// 保障配额内，争用下也不会被拒绝
    Allowed,
    /// 超出保障但在突发上限内，且存在空闲容量可借
    AllowedBurst,
    Denied { reason: String },
}

/// 配额管理器
///
/// 保障配额对其所有者永不拒绝；突发占用只在空闲容量存在时放行，
/// 且在保障所有者需求回归时最先被回收。
pub struct QuotaManager {
    config: QuotaConfig,
}

impl QuotaManager {
    pub fn new(config: QuotaConfig) -> Self {
        Self { config }
    }

    pub fn update_config(&mut self, config: QuotaConfig) {
        self.config = config;
    }

    pub fn policy(&self) -> ReclamationPolicy {
        self.config.policy()
    }

    pub fn grace_period(&self) -> Duration {
        Duration::seconds(self.config.grace_period_seconds as i64)
    }

    /// 准入检查
    ///
    /// `idle` 为账本中健康节点的总剩余容量，突发准入要求整个请求
    /// 都能放进空闲容量（与账本的全有或全无预留一致，不做部分突发）。
    pub fn check_admission(
        &self,
        tenant: &Tenant,
        request: &ResourceVector,
        idle: &ResourceVector,
    ) -> Admission {
        if tenant.within_guaranteed(request) {
            return Admission::Allowed;
        }

        if !tenant.within_burst_ceiling(request) {
            return Admission::Denied {
                reason: format!("租户 {} 的请求超出突发上限", tenant.id),
            };
        }

        if request.fits_within(idle) {
            debug!("租户 {} 以突发方式准入", tenant.id);
            Admission::AllowedBurst
        } else {
            Admission::Denied {
                reason: format!("无空闲容量可供租户 {} 突发借用", tenant.id),
            }
        }
    }

    /// 周期性识别保障未用容量，可借给突发租户
    pub fn reclaim_idle(&self, tenants: &HashMap<String, Tenant>) -> Vec<(String, ResourceVector)> {
        let mut reclaimable = Vec::new();
        for tenant in tenants.values() {
            let headroom = tenant.guaranteed_headroom();
            if !headroom.is_empty() {
                reclaimable.push((tenant.id.clone(), headroom));
            }
        }
        reclaimable
    }
}
