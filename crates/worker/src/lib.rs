pub mod agent;
pub mod executors;
pub mod gateway;
pub mod heartbeat;

pub use agent::WorkerAgent;
pub use executors::{ExecutorRegistry, SimulatedExecutor, SimulatedSnapshot};
pub use gateway::LocalWorkerGateway;
pub use heartbeat::HeartbeatManager;
