use async_trait::async_trait;

use crate::errors::SchedulerResult;
use crate::models::{Checkpoint, JournalRecord};

/// 状态日志接口
///
/// 追加先于应用：调用方保证每次内存表变更前先 `append` 成功。
#[async_trait]
pub trait StateJournal: Send + Sync {
    /// 追加一条记录并落盘
    async fn append(&self, record: &JournalRecord) -> SchedulerResult<()>;

    /// 按写入顺序重放全部记录
    async fn replay(&self) -> SchedulerResult<Vec<JournalRecord>>;
}

/// 检查点存储接口
///
/// 写入方提供严格递增的序号；存储不得覆盖已有序号。
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 写入一个检查点快照，返回带完整性哈希的元数据
    async fn put(&self, task_id: i64, sequence: u64, payload: &[u8])
        -> SchedulerResult<Checkpoint>;

    /// 读取快照内容（不做校验，校验由恢复逻辑负责）
    async fn fetch(&self, checkpoint: &Checkpoint) -> SchedulerResult<Vec<u8>>;

    /// 列出某任务的全部检查点，按序号升序
    async fn list(&self, task_id: i64) -> SchedulerResult<Vec<Checkpoint>>;

    /// 删除被取代且不再用于恢复的检查点
    async fn remove(&self, task_id: i64, sequence: u64) -> SchedulerResult<()>;
}
