pub mod checkpoint_store;
pub mod journal;
pub mod observability;

pub use checkpoint_store::{sha256_hex, FileCheckpointStore, InMemoryCheckpointStore};
pub use journal::{FailingStateJournal, FileStateJournal, InMemoryStateJournal};
pub use observability::{MetricsCollector, StructuredLogger};
