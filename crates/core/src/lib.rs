pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::{
    AppConfig, CheckpointConfig, CheckpointTimeoutPolicy, DomainConfig, FailureConfig,
    FairnessConfig, JournalConfig, PolicyConfig, PolicyUpdate, QuotaConfig, ReclamationPolicy,
};
pub use errors::{SchedulerError, SchedulerResult};
pub use models::{
    BlobRef, Checkpoint, CheckpointRef, FailureReason, JournalEntry, JournalRecord, Node,
    NodeHealth, NodeSpec, ResourceVector, SchedulerEvent, StatusUpdate, StatusUpdateKind, Task,
    TaskExecutionContext, TaskKind, TaskSpec, TaskState, TaskStatusSummary, TaskStatusView,
    Tenant, TenantSpec, UtilizationSnapshot,
};
pub use traits::{
    CheckpointStore, ClusterManagementService, PolicyService, StateJournal, TaskControlService,
    TaskExecutor, WorkerGateway,
};
