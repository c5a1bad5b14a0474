use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::resources::ResourceVector;

/// 租户
///
/// 配额核算实体（院系/项目/用户）。`guaranteed` 是争用下始终可获得的保障配额，
/// `burst_ceiling` 是空闲容量存在时允许的突发上限。`usage` 由资源账本在每次
/// 预留/释放时事务性更新，其他组件只读。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub guaranteed: ResourceVector,
    pub burst_ceiling: ResourceVector,
    pub usage: ResourceVector,
    pub history: UsageWindow,
    pub created_at: DateTime<Utc>,
}

/// 租户注册参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantSpec {
    pub id: String,
    pub name: String,
    pub guaranteed: ResourceVector,
    pub burst_ceiling: ResourceVector,
}

impl Tenant {
    pub fn from_spec(spec: TenantSpec, window: Duration, now: DateTime<Utc>) -> Self {
        Self {
            id: spec.id,
            name: spec.name,
            guaranteed: spec.guaranteed,
            burst_ceiling: spec.burst_ceiling,
            usage: ResourceVector::new(),
            history: UsageWindow::new(window),
            created_at: now,
        }
    }

    /// 保障配额内的剩余空间
    pub fn guaranteed_headroom(&self) -> ResourceVector {
        self.guaranteed.headroom(&self.usage)
    }

    /// 当前用量是否超出保障配额（即存在突发占用）
    pub fn is_bursting(&self) -> bool {
        self.usage.exceeds(&self.guaranteed)
    }

    /// 加上请求后是否仍在保障配额内
    pub fn within_guaranteed(&self, request: &ResourceVector) -> bool {
        let mut projected = self.usage.clone();
        projected.add(request);
        projected.fits_within(&self.guaranteed)
    }

    /// 加上请求后是否仍在突发上限内
    pub fn within_burst_ceiling(&self, request: &ResourceVector) -> bool {
        let mut projected = self.usage.clone();
        projected.add(request);
        projected.fits_within(&self.burst_ceiling)
    }
}

/// 滚动核算窗口内的用量采样
///
/// 公平性监视器每轮推入一个采样（实际用量/应得份额的标量化），
/// 超出窗口的旧采样被丢弃。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageWindow {
    window_seconds: i64,
    samples: VecDeque<UsageSample>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UsageSample {
    pub at: DateTime<Utc>,
    pub actual_units: f64,
    pub entitled_units: f64,
}

impl UsageWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window_seconds: window.num_seconds(),
            samples: VecDeque::new(),
        }
    }

    pub fn push(&mut self, sample: UsageSample) {
        self.samples.push_back(sample);
        self.evict(sample.at);
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(self.window_seconds);
        while let Some(front) = self.samples.front() {
            if front.at < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// 窗口内 实际份额/应得份额 的平均比值，无采样时视为刚好公平（1.0）
    pub fn mean_share_ratio(&self) -> f64 {
        if self.samples.is_empty() {
            return 1.0;
        }
        let sum: f64 = self
            .samples
            .iter()
            .map(|s| {
                if s.entitled_units <= 0.0 {
                    1.0
                } else {
                    s.actual_units / s.entitled_units
                }
            })
            .sum();
        sum / self.samples.len() as f64
    }

    /// 公平性欠账：窗口内被少服务的程度，范围 [0, 1]
    pub fn fairness_debt(&self) -> f64 {
        (1.0 - self.mean_share_ratio()).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(at: DateTime<Utc>, actual: f64, entitled: f64) -> UsageSample {
        UsageSample {
            at,
            actual_units: actual,
            entitled_units: entitled,
        }
    }

    #[test]
    fn test_window_eviction() {
        let mut window = UsageWindow::new(Duration::seconds(60));
        let now = Utc::now();
        window.push(sample(now - Duration::seconds(120), 1.0, 4.0));
        window.push(sample(now, 1.0, 4.0));
        assert_eq!(window.samples.len(), 1);
    }

    #[test]
    fn test_fairness_debt_for_underserved_tenant() {
        let mut window = UsageWindow::new(Duration::seconds(600));
        let now = Utc::now();
        for i in 0..5 {
            window.push(sample(now - Duration::seconds(50 - i * 10), 1.0, 4.0));
        }
        // 只拿到1/4的应得份额，欠账0.75
        assert!((window.fairness_debt() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_fairness_debt_zero_when_overserved() {
        let mut window = UsageWindow::new(Duration::seconds(600));
        let now = Utc::now();
        window.push(sample(now, 8.0, 4.0));
        assert_eq!(window.fairness_debt(), 0.0);
        assert_eq!(window.mean_share_ratio(), 2.0);
    }

    #[test]
    fn test_tenant_burst_bounds() {
        let spec = TenantSpec {
            id: "dept-a".to_string(),
            name: "Department A".to_string(),
            guaranteed: ResourceVector::new().with("cpu", 4.0),
            burst_ceiling: ResourceVector::new().with("cpu", 8.0),
        };
        let mut tenant = Tenant::from_spec(spec, Duration::seconds(600), Utc::now());
        let request = ResourceVector::new().with("cpu", 6.0);

        assert!(!tenant.within_guaranteed(&request));
        assert!(tenant.within_burst_ceiling(&request));

        tenant.usage = ResourceVector::new().with("cpu", 6.0);
        assert!(tenant.is_bursting());
        assert!(!tenant.within_burst_ceiling(&ResourceVector::new().with("cpu", 3.0)));
    }
}
