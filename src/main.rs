use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use fairsched_core::models::{NodeSpec, ResourceVector, TaskKind, TenantSpec};
use fairsched_core::traits::ClusterManagementService;
use fairsched_core::AppConfig;
use fairsched_dispatcher::{SchedulerService, SchedulingDomain};
use fairsched_infrastructure::{FileCheckpointStore, FileStateJournal, MetricsCollector};
use fairsched_worker::{ExecutorRegistry, HeartbeatManager, LocalWorkerGateway, WorkerAgent};

/// 嵌入式部署入口：单调度域 + 进程内模拟工作节点。
/// CLI解析、HTTP面等外围协作方不在核心范围内，这里只做最小引导。
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("FAIRSCHED_CONFIG").ok())
        .unwrap_or_else(|| "config/scheduler.toml".to_string());

    init_logging()?;

    info!("启动多租户资源调度系统");
    info!("配置文件: {config_path}");

    let config = AppConfig::load(Some(&config_path))
        .with_context(|| format!("加载配置文件失败: {config_path}"))?;

    // 持久化基础设施
    let data_dir = Path::new(&config.journal.directory);
    let journal = Arc::new(
        FileStateJournal::open(data_dir.join("state.log"))
            .await
            .context("打开状态日志失败")?,
    );
    let checkpoints = Arc::new(
        FileCheckpointStore::open(data_dir.join("checkpoints"))
            .await
            .context("打开检查点存储失败")?,
    );
    let gateway = Arc::new(LocalWorkerGateway::new());
    let metrics = Arc::new(MetricsCollector::new());

    let (mut domain, handles) = SchedulingDomain::new(
        config.clone(),
        journal,
        checkpoints,
        gateway.clone(),
        metrics,
    );
    let replayed = domain.restore().await.context("状态日志重放失败")?;
    if replayed > 0 {
        info!("重放了 {replayed} 条状态记录");
    }

    let service = SchedulerService::new(handles.commands.clone());
    let status_tx = handles.status_updates.clone();
    let mut events = handles.events;
    drop(handles.commands);
    drop(handles.status_updates);

    // 事件流消费：仅记录，外部报表/审计按需接入
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(?event, "调度事件");
        }
    });

    let domain_handle = tokio::spawn(domain.run());

    // 进程内模拟工作节点
    let node_id = format!("{}-0", HeartbeatManager::default_node_id());
    let agent = Arc::new(WorkerAgent::new(
        node_id.clone(),
        ExecutorRegistry::simulated(&node_id, status_tx),
    ));
    gateway.attach(agent).await;

    let node_spec = NodeSpec {
        id: node_id.clone(),
        capacity: ResourceVector::new()
            .with("cpu", 8.0)
            .with("memory_mb", 16384.0)
            .with("gpu", 1.0),
        supported_kinds: vec![TaskKind::Build, TaskKind::MlTraining, TaskKind::Simulation],
    };
    if let Err(e) = service.register_node(node_spec).await {
        warn!("节点注册跳过: {e}");
    }

    // 引导一个默认租户，便于空库直接提交
    let tenant_spec = TenantSpec {
        id: "default".to_string(),
        name: "默认租户".to_string(),
        guaranteed: ResourceVector::new()
            .with("cpu", 4.0)
            .with("memory_mb", 8192.0),
        burst_ceiling: ResourceVector::new()
            .with("cpu", 8.0)
            .with("memory_mb", 16384.0)
            .with("gpu", 1.0),
    };
    if let Err(e) = service.register_tenant(tenant_spec).await {
        warn!("默认租户注册跳过: {e}");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let heartbeat = HeartbeatManager::new(
        node_id,
        Arc::new(service.clone()) as Arc<dyn ClusterManagementService>,
        Duration::from_secs(15),
    )
    .start(shutdown_rx);

    info!("调度域已就绪，Ctrl-C 退出");
    signal::ctrl_c().await.context("监听退出信号失败")?;
    info!("收到退出信号，正在停机");

    let _ = shutdown_tx.send(true);
    let _ = heartbeat.await;
    drop(service);
    let _ = domain_handle.await;

    info!("已停机");
    Ok(())
}

fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
    Ok(())
}
