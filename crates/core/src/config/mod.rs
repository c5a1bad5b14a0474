pub mod loader;

use serde::{Deserialize, Serialize};

/// 应用配置
///
/// 各节均有默认值，配置文件可只覆盖部分字段。
/// 运行期通过 `configure` 下发的 `PolicyUpdate` 在下一轮边界生效，从不在轮中生效。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub domain: DomainConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub fairness: FairnessConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub failure: FailureConfig,
    #[serde(default)]
    pub journal: JournalConfig,
}

/// 调度域配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub name: String,
    /// 已知资源类别，提交时校验请求向量
    pub resource_classes: Vec<String>,
    /// 定时触发调度轮的间隔
    pub round_interval_seconds: u64,
    /// 指派、恢复、终止等网关调用的有界超时
    pub dispatch_timeout_ms: u64,
    pub command_buffer: usize,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            resource_classes: vec![
                "cpu".to_string(),
                "memory_mb".to_string(),
                "gpu".to_string(),
            ],
            round_interval_seconds: 5,
            dispatch_timeout_ms: 5000,
            command_buffer: 256,
        }
    }
}

/// 优先级与截止时间配置（§有效优先级 P = w1·静态 + w2·紧迫度 + w3·公平欠账）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub static_weight: f64,
    pub urgency_weight: f64,
    pub fairness_weight: f64,
    /// 截止时间进入该窗口后紧迫度开始上升
    pub urgency_threshold_seconds: i64,
    /// 紧迫度上限（已过期任务取该值）
    pub urgency_cap: f64,
    /// 待调度任务有效优先级超出运行中任务该值即触发抢占评估
    pub preemption_margin: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            static_weight: 1.0,
            urgency_weight: 1.0,
            fairness_weight: 2.0,
            urgency_threshold_seconds: 300,
            urgency_cap: 100.0,
            preemption_margin: 2.0,
        }
    }
}

/// 配额回收策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclamationPolicy {
    /// 立即抢占突发租户
    Immediate,
    /// 等待宽限期后再抢占
    Graceful,
}

/// 配额管理配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// "immediate" 或 "graceful"
    pub reclamation_policy: String,
    pub grace_period_seconds: u64,
    /// 周期性空闲回收扫描的间隔
    pub reclaim_interval_seconds: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            reclamation_policy: "graceful".to_string(),
            grace_period_seconds: 30,
            reclaim_interval_seconds: 10,
        }
    }
}

impl QuotaConfig {
    pub fn policy(&self) -> ReclamationPolicy {
        match self.reclamation_policy.as_str() {
            "immediate" => ReclamationPolicy::Immediate,
            _ => ReclamationPolicy::Graceful,
        }
    }
}

/// 公平性监视配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FairnessConfig {
    /// 滑动核算窗口
    pub window_seconds: i64,
    /// 实际份额/应得份额超过该比值视为垄断
    pub monopolization_threshold: f64,
    /// 持续超阈值该时长后才触发干预
    pub flag_duration_seconds: i64,
    /// 软性干预未能恢复平衡时，该窗口后升级为硬抢占
    pub soft_window_seconds: i64,
    /// 软性干预对垄断租户评分的降权系数
    pub soft_deweight_factor: f64,
    /// 软性干预是否对受影响租户可见（默认静默，硬抢占总是可见）
    pub expose_soft_interventions: bool,
}

impl Default for FairnessConfig {
    fn default() -> Self {
        Self {
            window_seconds: 600,
            monopolization_threshold: 1.5,
            flag_duration_seconds: 60,
            soft_window_seconds: 120,
            soft_deweight_factor: 0.5,
            expose_soft_interventions: false,
        }
    }
}

/// 检查点超时处置策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointTimeoutPolicy {
    /// 强制挂起，丢失在途状态（记录日志）
    ForceSuspend,
    /// 放弃本次抢占
    AbortPreemption,
}

/// 检查点配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// "force-suspend" 或 "abort-preemption"
    pub timeout_policy: String,
    /// 运行中任务的周期性快照间隔
    pub interval_seconds: u64,
    /// 每任务保留的检查点个数，更早的被垃圾回收
    pub retention_count: usize,
    /// 取消时 检查点后终止 的硬超时
    pub cancel_grace_ms: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            max_retries: 3,
            retry_backoff_ms: 500,
            timeout_policy: "force-suspend".to_string(),
            interval_seconds: 300,
            retention_count: 3,
            cancel_grace_ms: 3000,
        }
    }
}

impl CheckpointConfig {
    pub fn policy(&self) -> CheckpointTimeoutPolicy {
        match self.timeout_policy.as_str() {
            "abort-preemption" => CheckpointTimeoutPolicy::AbortPreemption,
            _ => CheckpointTimeoutPolicy::ForceSuspend,
        }
    }
}

/// 失效检测与重试配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureConfig {
    pub heartbeat_timeout_seconds: i64,
    pub sweep_interval_seconds: u64,
    /// 重试退避基础间隔
    pub retry_base_interval_seconds: u64,
    pub retry_max_interval_seconds: u64,
    pub backoff_multiplier: f64,
    /// 重试间隔的随机抖动范围（0.0-1.0）
    pub jitter_factor: f64,
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_seconds: 90,
            sweep_interval_seconds: 30,
            retry_base_interval_seconds: 60,
            retry_max_interval_seconds: 3600,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// 状态日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    pub directory: String,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            directory: "data/journal".to_string(),
        }
    }
}

/// 运行期策略更新
///
/// 只覆盖携带的节；在下一轮边界原子生效。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyUpdate {
    pub policy: Option<PolicyConfig>,
    pub quota: Option<QuotaConfig>,
    pub fairness: Option<FairnessConfig>,
    pub checkpoint: Option<CheckpointConfig>,
    pub failure: Option<FailureConfig>,
}

impl PolicyUpdate {
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(policy) = &self.policy {
            policy.validate()?;
        }
        if let Some(quota) = &self.quota {
            quota.validate()?;
        }
        if let Some(fairness) = &self.fairness {
            fairness.validate()?;
        }
        if let Some(checkpoint) = &self.checkpoint {
            checkpoint.validate()?;
        }
        if let Some(failure) = &self.failure {
            failure.validate()?;
        }
        Ok(())
    }

    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(policy) = &self.policy {
            config.policy = policy.clone();
        }
        if let Some(quota) = &self.quota {
            config.quota = quota.clone();
        }
        if let Some(fairness) = &self.fairness {
            config.fairness = fairness.clone();
        }
        if let Some(checkpoint) = &self.checkpoint {
            config.checkpoint = checkpoint.clone();
        }
        if let Some(failure) = &self.failure {
            config.failure = failure.clone();
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.domain.validate()?;
        self.policy.validate()?;
        self.quota.validate()?;
        self.fairness.validate()?;
        self.checkpoint.validate()?;
        self.failure.validate()?;
        Ok(())
    }
}

impl DomainConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.is_empty() {
            return Err(anyhow::anyhow!("调度域名称不能为空"));
        }
        if self.resource_classes.is_empty() {
            return Err(anyhow::anyhow!("资源类别列表不能为空"));
        }
        if self.round_interval_seconds == 0 {
            return Err(anyhow::anyhow!("调度轮间隔必须大于0"));
        }
        if self.dispatch_timeout_ms == 0 {
            return Err(anyhow::anyhow!("网关调用超时必须大于0"));
        }
        if self.command_buffer == 0 {
            return Err(anyhow::anyhow!("命令缓冲区大小必须大于0"));
        }
        Ok(())
    }
}

impl PolicyConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.static_weight < 0.0 || self.urgency_weight < 0.0 || self.fairness_weight < 0.0 {
            return Err(anyhow::anyhow!("优先级权重不能为负"));
        }
        if self.urgency_threshold_seconds <= 0 {
            return Err(anyhow::anyhow!("紧迫度窗口必须大于0"));
        }
        if self.urgency_cap <= 0.0 {
            return Err(anyhow::anyhow!("紧迫度上限必须大于0"));
        }
        if self.preemption_margin < 0.0 {
            return Err(anyhow::anyhow!("抢占余量不能为负"));
        }
        Ok(())
    }
}

impl QuotaConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_policies = ["immediate", "graceful"];
        if !valid_policies.contains(&self.reclamation_policy.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的回收策略: {}，支持的策略: {:?}",
                self.reclamation_policy,
                valid_policies
            ));
        }
        if self.reclamation_policy == "graceful" && self.grace_period_seconds == 0 {
            return Err(anyhow::anyhow!("graceful回收策略的宽限期必须大于0"));
        }
        if self.reclaim_interval_seconds == 0 {
            return Err(anyhow::anyhow!("回收扫描间隔必须大于0"));
        }
        Ok(())
    }
}

impl FairnessConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.window_seconds <= 0 {
            return Err(anyhow::anyhow!("核算窗口必须大于0"));
        }
        if self.monopolization_threshold <= 1.0 {
            return Err(anyhow::anyhow!("垄断阈值必须大于1.0"));
        }
        if self.flag_duration_seconds < 0 || self.soft_window_seconds <= 0 {
            return Err(anyhow::anyhow!("干预时长配置无效"));
        }
        if !(0.0..=1.0).contains(&self.soft_deweight_factor) {
            return Err(anyhow::anyhow!("软性降权系数必须在0.0到1.0之间"));
        }
        Ok(())
    }
}

impl CheckpointConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_ms == 0 {
            return Err(anyhow::anyhow!("检查点超时必须大于0"));
        }
        let valid_policies = ["force-suspend", "abort-preemption"];
        if !valid_policies.contains(&self.timeout_policy.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的检查点超时策略: {}，支持的策略: {:?}",
                self.timeout_policy,
                valid_policies
            ));
        }
        if self.retention_count == 0 {
            return Err(anyhow::anyhow!("检查点保留个数必须大于0"));
        }
        if self.interval_seconds == 0 {
            return Err(anyhow::anyhow!("周期性快照间隔必须大于0"));
        }
        Ok(())
    }
}

impl FailureConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.heartbeat_timeout_seconds <= 0 {
            return Err(anyhow::anyhow!("心跳超时必须大于0"));
        }
        if self.sweep_interval_seconds == 0 {
            return Err(anyhow::anyhow!("失效扫描间隔必须大于0"));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(anyhow::anyhow!("退避倍数必须不小于1.0"));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(anyhow::anyhow!("抖动系数必须在0.0到1.0之间"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_reclamation_policy_rejected() {
        let mut config = AppConfig::default();
        config.quota.reclamation_policy = "eager".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_graceful_requires_nonzero_grace() {
        let mut config = AppConfig::default();
        config.quota.grace_period_seconds = 0;
        assert!(config.validate().is_err());

        config.quota.reclamation_policy = "immediate".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_policy_update_applies_only_carried_sections() {
        let mut config = AppConfig::default();
        let update = PolicyUpdate {
            policy: Some(PolicyConfig {
                static_weight: 3.0,
                ..PolicyConfig::default()
            }),
            ..PolicyUpdate::default()
        };
        update.apply_to(&mut config);
        assert_eq!(config.policy.static_weight, 3.0);
        assert_eq!(config.quota.reclamation_policy, "graceful");
    }

    #[test]
    fn test_monopolization_threshold_must_exceed_one() {
        let mut config = AppConfig::default();
        config.fairness.monopolization_threshold = 0.9;
        assert!(config.validate().is_err());
    }
}
