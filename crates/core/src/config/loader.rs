use anyhow::Context;

use super::AppConfig;

impl AppConfig {
    /// 从TOML文件和环境变量加载配置
    ///
    /// 所有字段都有默认值，文件可缺省或只覆盖部分字段。
    /// 环境变量使用 `FAIRSCHED__` 前缀和双下划线分隔，
    /// 如 `FAIRSCHED__QUOTA__GRACE_PERIOD_SECONDS=10`。
    pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("FAIRSCHED")
                .prefix_separator("__")
                .separator("__"),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置源失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate().context("配置校验失败")?;

        Ok(config)
    }

    /// 从TOML字符串解析配置，主要用于测试
    pub fn from_toml(content: &str) -> anyhow::Result<AppConfig> {
        let config: AppConfig = toml::from_str(content).context("解析TOML配置失败")?;
        config.validate().context("配置校验失败")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.domain.name, "default");
        assert_eq!(config.quota.reclamation_policy, "graceful");
    }

    #[test]
    fn test_from_toml_partial_override() {
        let config = AppConfig::from_toml(
            r#"
            [policy]
            static_weight = 2.0
            urgency_weight = 1.0
            fairness_weight = 1.5
            urgency_threshold_seconds = 120
            urgency_cap = 50.0
            preemption_margin = 3.0

            [quota]
            reclamation_policy = "immediate"
            grace_period_seconds = 5
            reclaim_interval_seconds = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.policy.static_weight, 2.0);
        assert_eq!(config.quota.reclamation_policy, "immediate");
        // 未覆盖的节保持默认
        assert_eq!(config.checkpoint.retention_count, 3);
    }

    #[test]
    fn test_from_toml_rejects_invalid() {
        let result = AppConfig::from_toml(
            r#"
            [fairness]
            window_seconds = -10
            monopolization_threshold = 1.5
            flag_duration_seconds = 60
            soft_window_seconds = 120
            soft_deweight_factor = 0.5
            expose_soft_interventions = false
            "#,
        );
        assert!(result.is_err());
    }
}
