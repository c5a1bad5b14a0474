use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 检查点
///
/// 任务某一时刻可恢复状态的持久化快照。写入后不可变；
/// 后续检查点取代（而非覆盖）先前的；每任务序号严格递增。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub task_id: i64,
    pub sequence: u64,
    pub blob: BlobRef,
    pub created_at: DateTime<Utc>,
}

/// 状态快照的不透明引用：存储位置、字节数、完整性哈希
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlobRef {
    pub location: String,
    pub size_bytes: u64,
    pub sha256: String,
}

/// 任务上携带的轻量检查点引用
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointRef {
    pub task_id: i64,
    pub sequence: u64,
}

impl Checkpoint {
    pub fn checkpoint_ref(&self) -> CheckpointRef {
        CheckpointRef {
            task_id: self.task_id,
            sequence: self.sequence,
        }
    }
}
