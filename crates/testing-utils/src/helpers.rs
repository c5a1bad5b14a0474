//! 集成测试辅助

use std::time::Duration;

use fairsched_core::models::TaskState;
use fairsched_core::traits::TaskControlService;
use fairsched_core::{SchedulerError, SchedulerResult};

/// 轮询等待任务到达目标状态，超时返回最后一次观测到的状态
pub async fn wait_for_state(
    service: &dyn TaskControlService,
    task_id: i64,
    expected: TaskState,
    timeout: Duration,
) -> SchedulerResult<TaskState> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut last = None;

    while tokio::time::Instant::now() < deadline {
        let view = service.get_task_status(task_id).await?;
        if view.state == expected {
            return Ok(view.state);
        }
        last = Some(view.state);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    Err(SchedulerError::Internal(format!(
        "等待任务 {task_id} 到达 {expected} 超时，最后状态 {:?}",
        last
    )))
}
