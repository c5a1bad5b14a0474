//! # Fairsched Testing Utils
//!
//! 工作区各crate共享的测试工具：数据构造器、mock网关与集成测试辅助。
//!
//! 作为dev-dependency引入：
//!
//! ```toml
//! [dev-dependencies]
//! fairsched-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::{NodeSpecBuilder, TaskSpecBuilder, TenantSpecBuilder};
pub use helpers::wait_for_state;
pub use mocks::MockWorkerGateway;
