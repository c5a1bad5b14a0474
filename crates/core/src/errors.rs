use thiserror::Error;

/// 调度器错误类型定义
///
/// 错误分为五大类：准入错误（可恢复，任务保持Ready）、放置冲突（轮内自动重试）、
/// 检查点错误（带退避重试，超限后升级为强制挂起）、节点失效（触发恢复路径）、
/// 任务致命错误（终态，不重试）。
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("容量不足: 节点 {node_id} 无法满足资源请求")]
    InsufficientCapacity { node_id: String },

    #[error("配额拒绝: 租户 {tenant_id} - {reason}")]
    QuotaDenied { tenant_id: String, reason: String },

    #[error("放置冲突: {0}")]
    PlacementConflict(String),

    #[error("检查点超时: 任务 {task_id}")]
    CheckpointTimeout { task_id: i64 },

    #[error("检查点存储不可用: {0}")]
    StorageUnavailable(String),

    #[error("检查点校验失败: 任务 {task_id} 序号 {sequence}")]
    CheckpointCorrupted { task_id: i64, sequence: u64 },

    #[error("节点失效: {node_id}")]
    NodeFailure { node_id: String },

    #[error("任务致命错误: {0}")]
    FatalTask(String),

    #[error("检测到循环依赖")]
    CyclicDependency,

    #[error("未知资源类别: {class}")]
    InvalidResourceClass { class: String },

    #[error("未知租户: {tenant_id}")]
    UnknownTenant { tenant_id: String },

    #[error("任务未找到: {id}")]
    TaskNotFound { id: i64 },

    #[error("依赖任务未找到: {id}")]
    DependencyNotFound { id: i64 },

    #[error("节点未找到: {id}")]
    NodeNotFound { id: String },

    #[error("租户已存在: {tenant_id}")]
    TenantAlreadyExists { tenant_id: String },

    #[error("无效的任务参数: {0}")]
    InvalidTaskParams(String),

    #[error("无效的状态转换: 任务 {task_id} 无法从 {from} 转换到 {to}")]
    InvalidStateTransition {
        task_id: i64,
        from: String,
        to: String,
    },

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("存储IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// 准入类错误不向提交者暴露为失败，任务保持Ready等待下一轮
    pub fn is_admission_error(&self) -> bool {
        matches!(
            self,
            SchedulerError::InsufficientCapacity { .. } | SchedulerError::QuotaDenied { .. }
        )
    }
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_errors_are_recoverable() {
        let err = SchedulerError::InsufficientCapacity {
            node_id: "node-1".to_string(),
        };
        assert!(err.is_admission_error());

        let err = SchedulerError::QuotaDenied {
            tenant_id: "tenant-a".to_string(),
            reason: "超出突发上限".to_string(),
        };
        assert!(err.is_admission_error());

        let err = SchedulerError::FatalTask("oom".to_string());
        assert!(!err.is_admission_error());
    }
}
