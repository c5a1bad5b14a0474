pub mod checkpoint;
pub mod journal;
pub mod message;
pub mod node;
pub mod resources;
pub mod task;
pub mod tenant;

pub use checkpoint::{BlobRef, Checkpoint, CheckpointRef};
pub use journal::{JournalEntry, JournalRecord};
pub use message::{
    NodeUtilization, SchedulerEvent, StatusUpdate, StatusUpdateKind, TaskExecutionContext,
    TenantUtilization, UtilizationSnapshot,
};
pub use node::{Node, NodeHealth, NodeSpec};
pub use resources::ResourceVector;
pub use task::{
    FailureReason, KindCapabilities, Task, TaskKind, TaskSpec, TaskState, TaskStatusSummary,
    TaskStatusView,
};
pub use tenant::{Tenant, TenantSpec, UsageSample, UsageWindow};
