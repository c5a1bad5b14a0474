pub mod dependency_graph;
pub mod domain;
pub mod failure_detector;
pub mod fairness;
pub mod ledger;
pub mod preemption;
pub mod priority;
pub mod quota;
pub mod recovery;
pub mod service;

pub use dependency_graph::DependencyGraph;
pub use domain::{DomainHandles, RoundReport, SchedulingDomain};
pub use failure_detector::FailureDetector;
pub use fairness::{FairnessMonitor, Intervention, InterventionLevel};
pub use ledger::{Reservation, ResourceLedger};
pub use preemption::{PreemptionCandidate, PreemptionController, PreemptionPlan, PreemptionReason};
pub use priority::{PriorityEngine, ScoredTask};
pub use quota::{Admission, QuotaManager};
pub use recovery::{CheckpointManager, RecoveryOutcome, RetryBackoff};
pub use service::{DomainCommand, SchedulerService};
