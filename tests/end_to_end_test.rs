use std::sync::Arc;
use std::time::Duration;

use fairsched_core::config::AppConfig;
use fairsched_core::models::{TaskKind, TaskState};
use fairsched_core::traits::{ClusterManagementService, TaskControlService};
use fairsched_dispatcher::{SchedulerService, SchedulingDomain};
use fairsched_infrastructure::{InMemoryCheckpointStore, InMemoryStateJournal, MetricsCollector};
use fairsched_testing_utils::{wait_for_state, NodeSpecBuilder, TaskSpecBuilder, TenantSpecBuilder};
use fairsched_worker::{ExecutorRegistry, LocalWorkerGateway, WorkerAgent};

/// 完整栈：调度域控制循环 + 服务门面 + 进程内工作节点
async fn start_stack() -> (SchedulerService, Arc<LocalWorkerGateway>) {
    let mut config = AppConfig::default();
    config.domain.round_interval_seconds = 1;
    config.quota.reclamation_policy = "immediate".to_string();

    let gateway = Arc::new(LocalWorkerGateway::new());
    let (domain, handles) = SchedulingDomain::new(
        config,
        Arc::new(InMemoryStateJournal::new()),
        Arc::new(InMemoryCheckpointStore::new()),
        gateway.clone(),
        Arc::new(MetricsCollector::new()),
    );

    for node_id in ["node-1", "node-2"] {
        let agent = Arc::new(WorkerAgent::new(
            node_id.to_string(),
            ExecutorRegistry::simulated(node_id, handles.status_updates.clone()),
        ));
        gateway.attach(agent).await;
    }

    let service = SchedulerService::new(handles.commands.clone());
    tokio::spawn(domain.run());

    service
        .register_tenant(TenantSpecBuilder::new("team-a").build())
        .await
        .unwrap();
    for node_id in ["node-1", "node-2"] {
        service
            .register_node(NodeSpecBuilder::new(node_id).cpu(4.0).build())
            .await
            .unwrap();
    }

    (service, gateway)
}

#[tokio::test]
async fn test_submit_to_completion_through_full_stack() {
    let (service, _gateway) = start_stack().await;

    let task_id = service
        .submit_task(
            TaskSpecBuilder::new("quick-sim", "team-a")
                .kind(TaskKind::Simulation)
                .cpu(2.0)
                .parameters(serde_json::json!({"duration_ms": 50}))
                .build(),
        )
        .await
        .unwrap();

    let state = wait_for_state(
        &service,
        task_id,
        TaskState::Completed,
        Duration::from_secs(5),
    )
    .await
    .unwrap();
    assert_eq!(state, TaskState::Completed);

    // 终态后资源归还
    let snapshot = fairsched_core::traits::PolicyService::utilization_snapshot(&service)
        .await
        .unwrap();
    let tenant = &snapshot.tenants[0];
    assert_eq!(tenant.usage.get("cpu"), 0.0);
}

#[tokio::test]
async fn test_dependent_tasks_run_in_order() {
    let (service, _gateway) = start_stack().await;

    let first = service
        .submit_task(
            TaskSpecBuilder::new("stage-1", "team-a")
                .parameters(serde_json::json!({"duration_ms": 50}))
                .build(),
        )
        .await
        .unwrap();
    let second = service
        .submit_task(
            TaskSpecBuilder::new("stage-2", "team-a")
                .parameters(serde_json::json!({"duration_ms": 50}))
                .dependencies(vec![first])
                .build(),
        )
        .await
        .unwrap();

    let view = service.get_task_status(second).await.unwrap();
    assert_eq!(view.state, TaskState::Pending);

    wait_for_state(&service, second, TaskState::Completed, Duration::from_secs(5))
        .await
        .unwrap();
    let first_view = service.get_task_status(first).await.unwrap();
    assert_eq!(first_view.state, TaskState::Completed);
}

#[tokio::test]
async fn test_cancel_running_task_through_full_stack() {
    let (service, _gateway) = start_stack().await;

    let task_id = service
        .submit_task(
            TaskSpecBuilder::new("long-sim", "team-a")
                .kind(TaskKind::Simulation)
                .parameters(serde_json::json!({"duration_ms": 60_000}))
                .build(),
        )
        .await
        .unwrap();

    wait_for_state(&service, task_id, TaskState::Running, Duration::from_secs(5))
        .await
        .unwrap();

    service.cancel_task(task_id).await.unwrap();
    let view = service.get_task_status(task_id).await.unwrap();
    assert_eq!(view.state, TaskState::Cancelled);

    // 幂等
    service.cancel_task(task_id).await.unwrap();

    let summary = service.status_summary().await.unwrap();
    assert_eq!(summary.cancelled, 1);
    assert_eq!(summary.running, 0);
}

#[tokio::test]
async fn test_fatal_executor_failure_surfaces_reason() {
    let (service, _gateway) = start_stack().await;

    let task_id = service
        .submit_task(
            TaskSpecBuilder::new("broken", "team-a")
                .parameters(
                    serde_json::json!({"duration_ms": 10_000, "fail_after_ms": 20, "fatal": true}),
                )
                .build(),
        )
        .await
        .unwrap();

    wait_for_state(&service, task_id, TaskState::Failed, Duration::from_secs(5))
        .await
        .unwrap();
    let view = service.get_task_status(task_id).await.unwrap();
    assert_eq!(
        view.failure_reason,
        Some(fairsched_core::models::FailureReason::Fatal)
    );
    assert!(view.error_message.is_some());
}
