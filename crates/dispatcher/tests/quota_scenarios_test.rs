use std::sync::Arc;

use tokio::sync::oneshot;

use fairsched_core::config::AppConfig;
use fairsched_core::models::{NodeSpec, TaskSpec, TaskState, TenantSpec};
use fairsched_dispatcher::{DomainCommand, SchedulingDomain};
use fairsched_infrastructure::{InMemoryCheckpointStore, InMemoryStateJournal, MetricsCollector};
use fairsched_testing_utils::{MockWorkerGateway, NodeSpecBuilder, TaskSpecBuilder, TenantSpecBuilder};

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

/// 两个租户各保障4、突发8，共享8单位集群：
/// A 空闲时占满8（4保障+4突发），B 提交4的需求后，
/// A 被回收到4，B 获得其保障的4。
#[tokio::test]
async fn test_burst_reclaimed_when_guaranteed_owner_returns() {
    let mut config = AppConfig::default();
    config.quota.reclamation_policy = "immediate".to_string();
    let gateway = Arc::new(MockWorkerGateway::new());
    let mut domain = build_domain(config, gateway.clone());

    register_tenant(
        &mut domain,
        TenantSpecBuilder::new("tenant-a")
            .guaranteed_cpu(4.0)
            .burst_cpu(8.0)
            .build(),
    )
    .await;
    register_tenant(
        &mut domain,
        TenantSpecBuilder::new("tenant-b")
            .guaranteed_cpu(4.0)
            .burst_cpu(8.0)
            .build(),
    )
    .await;
    register_node(&mut domain, NodeSpecBuilder::new("node-1").cpu(8.0).build()).await;

    // A 的两个4单位任务：第一个在保障内，第二个是突发
    let a_guaranteed = submit(
        &mut domain,
        TaskSpecBuilder::new("a1", "tenant-a").cpu(4.0).build(),
    )
    .await;
    let a_burst = submit(
        &mut domain,
        TaskSpecBuilder::new("a2", "tenant-a").cpu(4.0).build(),
    )
    .await;
    domain.run_round().await;

    assert_eq!(domain.task(a_guaranteed).unwrap().state, TaskState::Running);
    assert_eq!(domain.task(a_burst).unwrap().state, TaskState::Running);
    assert_eq!(domain.tenant("tenant-a").unwrap().usage.get("cpu"), 8.0);

    // B 回归提交保障内需求
    let b_task = submit(
        &mut domain,
        TaskSpecBuilder::new("b1", "tenant-b").cpu(4.0).build(),
    )
    .await;
    domain.run_round().await;

    // A 的突发占用被回收，B 获得保障份额
    assert_eq!(domain.task(b_task).unwrap().state, TaskState::Running);
    assert_eq!(domain.tenant("tenant-a").unwrap().usage.get("cpu"), 4.0);
    assert_eq!(domain.tenant("tenant-b").unwrap().usage.get("cpu"), 4.0);
    assert_ne!(domain.task(a_burst).unwrap().state, TaskState::Running);
    // 保障内的任务不受影响
    assert_eq!(domain.task(a_guaranteed).unwrap().state, TaskState::Running);
}

/// graceful策略下突发占用先进入宽限期，到期后才被回收
#[tokio::test]
async fn test_graceful_reclamation_waits_for_grace_period() {
    let mut config = AppConfig::default();
    config.quota.reclamation_policy = "graceful".to_string();
    config.quota.grace_period_seconds = 1;
    let gateway = Arc::new(MockWorkerGateway::new());
    let mut domain = build_domain(config, gateway);

    register_tenant(
        &mut domain,
        TenantSpecBuilder::new("tenant-a")
            .guaranteed_cpu(4.0)
            .burst_cpu(8.0)
            .build(),
    )
    .await;
    register_tenant(
        &mut domain,
        TenantSpecBuilder::new("tenant-b")
            .guaranteed_cpu(4.0)
            .burst_cpu(8.0)
            .build(),
    )
    .await;
    register_node(&mut domain, NodeSpecBuilder::new("node-1").cpu(8.0).build()).await;

    submit(&mut domain, TaskSpecBuilder::new("a1", "tenant-a").cpu(4.0).build()).await;
    let a_burst = submit(
        &mut domain,
        TaskSpecBuilder::new("a2", "tenant-a").cpu(4.0).build(),
    )
    .await;
    domain.run_round().await;

    let b_task = submit(
        &mut domain,
        TaskSpecBuilder::new("b1", "tenant-b").cpu(4.0).build(),
    )
    .await;
    domain.run_round().await;

    // 宽限期内突发占用继续运行，B 等待
    assert_eq!(domain.task(a_burst).unwrap().state, TaskState::Running);
    assert_eq!(domain.task(b_task).unwrap().state, TaskState::Ready);

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    domain.run_round().await;

    assert_ne!(domain.task(a_burst).unwrap().state, TaskState::Running);
    assert_eq!(domain.task(b_task).unwrap().state, TaskState::Running);
}

/// 配额不变式：任意时刻 usage ≤ burst_ceiling
#[tokio::test]
async fn test_usage_never_exceeds_burst_ceiling() {
    let mut config = AppConfig::default();
    config.quota.reclamation_policy = "immediate".to_string();
    let gateway = Arc::new(MockWorkerGateway::new());
    let mut domain = build_domain(config, gateway);

    register_tenant(
        &mut domain,
        TenantSpecBuilder::new("greedy")
            .guaranteed_cpu(2.0)
            .burst_cpu(4.0)
            .build(),
    )
    .await;
    register_node(&mut domain, NodeSpecBuilder::new("node-1").cpu(16.0).build()).await;

    // 提交远超突发上限的需求
    for i in 0..6 {
        submit(
            &mut domain,
            TaskSpecBuilder::new(&format!("g{i}"), "greedy").cpu(2.0).build(),
        )
        .await;
    }

    for _ in 0..4 {
        domain.run_round().await;
        let tenant = domain.tenant("greedy").unwrap();
        assert!(
            tenant.usage.fits_within(&tenant.burst_ceiling),
            "用量 {:?} 超出突发上限",
            tenant.usage
        );
    }
    // 上限4：最多两个2单位任务在跑
    assert_eq!(domain.tenant("greedy").unwrap().usage.get("cpu"), 4.0);
}

/// 无双重分配：同节点各资源类别的预留之和不超过总容量
#[tokio::test]
async fn test_no_double_allocation_under_contention() {
    let mut config = AppConfig::default();
    config.quota.reclamation_policy = "immediate".to_string();
    let gateway = Arc::new(MockWorkerGateway::new());
    let mut domain = build_domain(config, gateway);

    register_tenant(
        &mut domain,
        TenantSpecBuilder::new("team")
            .guaranteed_cpu(32.0)
            .burst_cpu(32.0)
            .build(),
    )
    .await;
    register_node(&mut domain, NodeSpecBuilder::new("node-1").cpu(5.0).build()).await;
    register_node(&mut domain, NodeSpecBuilder::new("node-2").cpu(3.0).build()).await;

    for i in 0..8 {
        submit(
            &mut domain,
            TaskSpecBuilder::new(&format!("t{i}"), "team").cpu(2.0).build(),
        )
        .await;
    }
    domain.run_round().await;

    for node_id in ["node-1", "node-2"] {
        let (capacity, allocated) = domain.ledger().query(node_id).unwrap();
        assert!(
            allocated.fits_within(&capacity),
            "节点 {node_id} 分配量 {allocated:?} 超出容量 {capacity:?}"
        );
    }
}
