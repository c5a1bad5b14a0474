use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use fairsched_core::config::AppConfig;
use fairsched_core::models::{NodeSpec, TaskKind, TaskSpec, TaskState, TenantSpec};
use fairsched_dispatcher::{DomainCommand, SchedulingDomain};
use fairsched_infrastructure::{InMemoryCheckpointStore, InMemoryStateJournal, MetricsCollector};
use fairsched_testing_utils::{MockWorkerGateway, NodeSpecBuilder, TaskSpecBuilder, TenantSpecBuilder};

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.quota.reclamation_policy = "immediate".to_string();
    config
}

fn build_domain(config: AppConfig, gateway: Arc<MockWorkerGateway>) -> SchedulingDomain {
    let (domain, _handles) = SchedulingDomain::new(
        config,
        Arc::new(InMemoryStateJournal::new()),
        Arc::new(InMemoryCheckpointStore::new()),
        gateway,
        Arc::new(MetricsCollector::new()),
    );
    domain
}

async fn register_tenant(domain: &mut SchedulingDomain, spec: TenantSpec) {
    let (tx, rx) = oneshot::channel();
    domain
        .handle_command(DomainCommand::RegisterTenant { spec, reply: tx })
        .await;
    rx.await.unwrap().unwrap();
}

async fn register_node(domain: &mut SchedulingDomain, spec: NodeSpec) {
    let (tx, rx) = oneshot::channel();
    domain
        .handle_command(DomainCommand::RegisterNode { spec, reply: tx })
        .await;
    rx.await.unwrap().unwrap();
}

async fn submit(domain: &mut SchedulingDomain, spec: TaskSpec) -> i64 {
    let (tx, rx) = oneshot::channel();
    domain
        .handle_command(DomainCommand::SubmitTask { spec, reply: tx })
        .await;
    rx.await.unwrap().unwrap()
}

async fn setup_two_tenants(domain: &mut SchedulingDomain) {
    register_tenant(
        domain,
        TenantSpecBuilder::new("tenant-a")
            .guaranteed_cpu(4.0)
            .burst_cpu(4.0)
            .build(),
    )
    .await;
    register_tenant(
        domain,
        TenantSpecBuilder::new("tenant-b")
            .guaranteed_cpu(4.0)
            .burst_cpu(4.0)
            .build(),
    )
    .await;
    register_node(domain, NodeSpecBuilder::new("node-1").cpu(4.0).build()).await;
}

/// 优先级差超出配置余量时，低优先级运行任务被检查点后抢占
#[tokio::test]
async fn test_priority_gap_preemption() {
    let gateway = Arc::new(MockWorkerGateway::new());
    let mut domain = build_domain(test_config(), gateway.clone());
    setup_two_tenants(&mut domain).await;

    let low = submit(
        &mut domain,
        TaskSpecBuilder::new("low", "tenant-a")
            .kind(TaskKind::Simulation)
            .cpu(4.0)
            .priority(0)
            .build(),
    )
    .await;
    domain.run_round().await;
    assert_eq!(domain.task(low).unwrap().state, TaskState::Running);

    let high = submit(
        &mut domain,
        TaskSpecBuilder::new("high", "tenant-b")
            .cpu(4.0)
            .priority(10)
            .build(),
    )
    .await;
    domain.run_round().await;

    assert_eq!(domain.task(high).unwrap().state, TaskState::Running);
    let low_task = domain.task(low).unwrap();
    assert_eq!(low_task.state, TaskState::Checkpointed);
    // 抢占前必有检查点
    assert!(low_task.checkpoint_ref.is_some());
    assert!(gateway.terminated_tasks().await.contains(&low));
}

/// 余量内的优先级差不触发抢占
#[tokio::test]
async fn test_no_preemption_within_margin() {
    let gateway = Arc::new(MockWorkerGateway::new());
    let mut domain = build_domain(test_config(), gateway);
    setup_two_tenants(&mut domain).await;

    let low = submit(
        &mut domain,
        TaskSpecBuilder::new("low", "tenant-a")
            .kind(TaskKind::Simulation)
            .cpu(4.0)
            .priority(3)
            .build(),
    )
    .await;
    domain.run_round().await;

    // 差值4-3=1未超出默认余量2.0
    let near = submit(
        &mut domain,
        TaskSpecBuilder::new("near", "tenant-b").cpu(4.0).priority(4).build(),
    )
    .await;
    domain.run_round().await;

    assert_eq!(domain.task(low).unwrap().state, TaskState::Running);
    assert_eq!(domain.task(near).unwrap().state, TaskState::Ready);
}

/// 抢占安全：不可检查点的任务永远不会被选为牺牲者
#[tokio::test]
async fn test_non_checkpointable_task_never_preempted() {
    let gateway = Arc::new(MockWorkerGateway::new());
    let mut domain = build_domain(test_config(), gateway.clone());
    setup_two_tenants(&mut domain).await;

    // Build种类不可检查点
    let protected = submit(
        &mut domain,
        TaskSpecBuilder::new("protected", "tenant-a")
            .kind(TaskKind::Build)
            .cpu(4.0)
            .priority(0)
            .build(),
    )
    .await;
    domain.run_round().await;
    assert_eq!(domain.task(protected).unwrap().state, TaskState::Running);

    let high = submit(
        &mut domain,
        TaskSpecBuilder::new("high", "tenant-b")
            .cpu(4.0)
            .priority(100)
            .build(),
    )
    .await;
    for _ in 0..3 {
        domain.run_round().await;
    }

    // 高优先级任务等待，受保护任务不受影响
    assert_eq!(domain.task(protected).unwrap().state, TaskState::Running);
    assert_eq!(domain.task(high).unwrap().state, TaskState::Ready);
    assert!(gateway.terminated_tasks().await.is_empty());
}

/// 检查点超时 + abort-preemption策略：放弃抢占，牺牲者继续运行
#[tokio::test]
async fn test_checkpoint_timeout_aborts_preemption() {
    let mut config = test_config();
    config.checkpoint.timeout_ms = 50;
    config.checkpoint.max_retries = 1;
    config.checkpoint.timeout_policy = "abort-preemption".to_string();

    let gateway = Arc::new(MockWorkerGateway::new());
    gateway.set_checkpoint_delay(Duration::from_millis(300)).await;
    let mut domain = build_domain(config, gateway.clone());
    setup_two_tenants(&mut domain).await;

    let low = submit(
        &mut domain,
        TaskSpecBuilder::new("low", "tenant-a")
            .kind(TaskKind::Simulation)
            .cpu(4.0)
            .priority(0)
            .build(),
    )
    .await;
    domain.run_round().await;

    let high = submit(
        &mut domain,
        TaskSpecBuilder::new("high", "tenant-b").cpu(4.0).priority(10).build(),
    )
    .await;
    domain.run_round().await;

    assert_eq!(domain.task(low).unwrap().state, TaskState::Running);
    assert_eq!(domain.task(high).unwrap().state, TaskState::Ready);
    assert!(gateway.terminated_tasks().await.is_empty());
}

/// 检查点超时 + force-suspend策略：有损挂起后照常回收资源
#[tokio::test]
async fn test_checkpoint_timeout_forces_suspension() {
    let mut config = test_config();
    config.checkpoint.timeout_ms = 50;
    config.checkpoint.max_retries = 1;
    config.checkpoint.timeout_policy = "force-suspend".to_string();

    let gateway = Arc::new(MockWorkerGateway::new());
    gateway.set_checkpoint_delay(Duration::from_millis(300)).await;
    let mut domain = build_domain(config, gateway.clone());
    setup_two_tenants(&mut domain).await;

    let low = submit(
        &mut domain,
        TaskSpecBuilder::new("low", "tenant-a")
            .kind(TaskKind::Simulation)
            .cpu(4.0)
            .priority(0)
            .build(),
    )
    .await;
    domain.run_round().await;

    let high = submit(
        &mut domain,
        TaskSpecBuilder::new("high", "tenant-b").cpu(4.0).priority(10).build(),
    )
    .await;
    domain.run_round().await;

    // 有损挂起：无新检查点但资源已让渡
    let low_task = domain.task(low).unwrap();
    assert_eq!(low_task.state, TaskState::Checkpointed);
    assert!(low_task.checkpoint_ref.is_none());
    assert_eq!(domain.task(high).unwrap().state, TaskState::Running);
    assert!(gateway.terminated_tasks().await.contains(&low));
}
