use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use fairsched_core::config::{AppConfig, CheckpointTimeoutPolicy, PolicyUpdate, ReclamationPolicy};
use fairsched_core::models::{
    Checkpoint, FailureReason, JournalEntry, JournalRecord, Node, NodeHealth, NodeSpec,
    NodeUtilization, ResourceVector, SchedulerEvent, StatusUpdate, StatusUpdateKind, Task,
    TaskExecutionContext, TaskKind, TaskSpec, TaskState, TaskStatusSummary, Tenant, TenantSpec,
    TenantUtilization, UtilizationSnapshot,
};
use fairsched_core::traits::{StateJournal, WorkerGateway};
use fairsched_core::{SchedulerError, SchedulerResult};
use fairsched_infrastructure::{MetricsCollector, StructuredLogger};

use crate::dependency_graph::DependencyGraph;
use crate::failure_detector::FailureDetector;
use crate::fairness::{FairnessMonitor, InterventionLevel};
use crate::ledger::ResourceLedger;
use crate::preemption::{PreemptionCandidate, PreemptionController, PreemptionReason};
use crate::priority::{PriorityEngine, ScoredTask};
use crate::quota::{Admission, QuotaManager};
use crate::recovery::{CheckpointManager, RecoveryOutcome, RetryBackoff};
use crate::service::DomainCommand;

/// 调度域的内存状态表
///
/// 任务表、租户表、节点表（在账本内）与检查点索引，
/// 每次变更先写状态日志再应用。
#[derive(Default)]
pub struct DomainState {
    pub tasks: HashMap<i64, Task>,
    pub tenants: HashMap<String, Tenant>,
    pub ledger: ResourceLedger,
    pub graph: DependencyGraph,
    pub checkpoints: HashMap<i64, Vec<Checkpoint>>,
    pub next_task_id: i64,
}

/// 域构造时交给外部的通道句柄
pub struct DomainHandles {
    pub commands: mpsc::Sender<DomainCommand>,
    pub status_updates: mpsc::Sender<StatusUpdate>,
    pub events: mpsc::UnboundedReceiver<SchedulerEvent>,
}

/// 一轮调度的结果
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub round: u64,
    pub placed: usize,
    pub ready_remaining: usize,
}

#[derive(Debug, Clone)]
struct PendingReclaim {
    due: DateTime<Utc>,
    reason: PreemptionReason,
}

/// 调度域
///
/// 每个资源域一个控制循环，逻辑单线程地持有全部可变状态，
/// 预留在域内天然串行；多个域可并发运行互不干扰。
/// 外部经命令通道交互，工作节点经状态回报通道上行。
pub struct SchedulingDomain {
    config: AppConfig,
    pending_update: Option<PolicyUpdate>,
    state: DomainState,
    quota: QuotaManager,
    priority: PriorityEngine,
    fairness: FairnessMonitor,
    preemption: PreemptionController,
    checkpoint_manager: CheckpointManager,
    retry_backoff: RetryBackoff,
    failure_detector: FailureDetector,
    journal: Arc<dyn StateJournal>,
    gateway: Arc<dyn WorkerGateway>,
    metrics: Arc<MetricsCollector>,
    events: mpsc::UnboundedSender<SchedulerEvent>,
    commands: mpsc::Receiver<DomainCommand>,
    status_updates: mpsc::Receiver<StatusUpdate>,
    /// 域自持一份发送端，防止通道因工作节点全部下线而关闭
    _status_keepalive: mpsc::Sender<StatusUpdate>,
    pending_reclaims: HashMap<i64, PendingReclaim>,
    round: u64,
}

impl SchedulingDomain {
    pub fn new(
        config: AppConfig,
        journal: Arc<dyn StateJournal>,
        checkpoint_store: Arc<dyn fairsched_core::traits::CheckpointStore>,
        gateway: Arc<dyn WorkerGateway>,
        metrics: Arc<MetricsCollector>,
    ) -> (Self, DomainHandles) {
        let (command_tx, command_rx) = mpsc::channel(config.domain.command_buffer);
        let (status_tx, status_rx) = mpsc::channel(config.domain.command_buffer);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let domain = Self {
            quota: QuotaManager::new(config.quota.clone()),
            priority: PriorityEngine::new(config.policy.clone()),
            fairness: FairnessMonitor::new(config.fairness.clone()),
            preemption: PreemptionController::new(config.policy.preemption_margin),
            checkpoint_manager: CheckpointManager::new(
                checkpoint_store,
                gateway.clone(),
                config.checkpoint.clone(),
            ),
            retry_backoff: RetryBackoff::new(config.failure.clone()),
            failure_detector: FailureDetector::new(config.failure.clone()),
            config,
            pending_update: None,
            state: DomainState {
                next_task_id: 1,
                ..DomainState::default()
            },
            journal,
            gateway,
            metrics,
            events: event_tx,
            commands: command_rx,
            status_updates: status_rx,
            _status_keepalive: status_tx.clone(),
            pending_reclaims: HashMap::new(),
            round: 0,
        };

        (
            domain,
            DomainHandles {
                commands: command_tx,
                status_updates: status_tx,
                events: event_rx,
            },
        )
    }

    /// 控制循环
    ///
    /// 调度轮由事件触发：任务完成、新提交、定时tick、配额回收信号。
    /// 命令通道关闭即退出（服务门面全部被丢弃）。
    pub async fn run(mut self) {
        info!("调度域 {} 控制循环启动", self.config.domain.name);

        let mut round_tick = tokio::time::interval(StdDuration::from_secs(
            self.config.domain.round_interval_seconds,
        ));
        let mut reclaim_tick = tokio::time::interval(StdDuration::from_secs(
            self.config.quota.reclaim_interval_seconds,
        ));
        let mut sweep_tick = tokio::time::interval(StdDuration::from_secs(
            self.config.failure.sweep_interval_seconds,
        ));
        let mut checkpoint_tick = tokio::time::interval(StdDuration::from_secs(
            self.config.checkpoint.interval_seconds,
        ));

        loop {
            tokio::select! {
                maybe_command = self.commands.recv() => {
                    match maybe_command {
                        Some(command) => {
                            if self.handle_command(command).await {
                                self.run_round().await;
                            }
                        }
                        None => {
                            info!("调度域 {} 命令通道关闭，控制循环退出", self.config.domain.name);
                            break;
                        }
                    }
                }
                maybe_update = self.status_updates.recv() => {
                    if let Some(update) = maybe_update {
                        if self.handle_status(update).await {
                            self.run_round().await;
                        }
                    }
                }
                _ = round_tick.tick() => {
                    self.run_round().await;
                }
                _ = reclaim_tick.tick() => {
                    let reclaimable = self.quota.reclaim_idle(&self.state.tenants);
                    if !reclaimable.is_empty() {
                        debug!("{} 个租户存在可出借的空闲保障容量", reclaimable.len());
                    }
                    self.run_round().await;
                }
                _ = sweep_tick.tick() => {
                    self.sweep_failures(Utc::now()).await;
                }
                _ = checkpoint_tick.tick() => {
                    self.periodic_checkpoints(Utc::now()).await;
                }
            }
        }
    }

    fn publish(&self, event: SchedulerEvent) {
        let _ = self.events.send(event);
    }

    /// 处理一条外部命令，返回是否需要触发调度轮
    pub async fn handle_command(&mut self, command: DomainCommand) -> bool {
        match command {
            DomainCommand::SubmitTask { spec, reply } => {
                let result = self.submit_task(spec).await;
                let _ = reply.send(result);
                true
            }
            DomainCommand::CancelTask { task_id, reply } => {
                let result = self.cancel_task(task_id).await;
                let _ = reply.send(result);
                true
            }
            DomainCommand::UpdatePriority {
                task_id,
                static_priority,
                reply,
            } => {
                let result = self.update_priority(task_id, static_priority).await;
                let _ = reply.send(result);
                true
            }
            DomainCommand::GetTaskStatus { task_id, reply } => {
                let result = self
                    .state
                    .tasks
                    .get(&task_id)
                    .map(|task| task.status_view())
                    .ok_or(SchedulerError::TaskNotFound { id: task_id });
                let _ = reply.send(result);
                false
            }
            DomainCommand::StatusSummary { reply } => {
                let _ = reply.send(Ok(self.status_summary()));
                false
            }
            DomainCommand::RegisterTenant { spec, reply } => {
                let result = self.register_tenant(spec).await;
                let _ = reply.send(result);
                false
            }
            DomainCommand::RegisterNode { spec, reply } => {
                let result = self.register_node(spec).await;
                let _ = reply.send(result);
                true
            }
            DomainCommand::DeregisterNode { node_id, reply } => {
                let result = self.deregister_node(&node_id).await;
                let _ = reply.send(result);
                true
            }
            DomainCommand::NodeHeartbeat { node_id, reply } => {
                let result = self.state.ledger.record_heartbeat(&node_id, Utc::now());
                let _ = reply.send(result);
                false
            }
            DomainCommand::Configure { update, reply } => {
                let result = match update.validate() {
                    Ok(()) => {
                        self.pending_update = Some(update);
                        info!("收到策略更新，将在下一轮边界生效");
                        Ok(())
                    }
                    Err(e) => Err(SchedulerError::Configuration(e.to_string())),
                };
                let _ = reply.send(result);
                false
            }
            DomainCommand::UtilizationSnapshot { reply } => {
                let _ = reply.send(Ok(self.utilization_snapshot()));
                false
            }
        }
    }

    /// 任务提交：校验租户、资源类别、依赖存在性与依赖环
    async fn submit_task(&mut self, spec: TaskSpec) -> SchedulerResult<i64> {
        if !self.state.tenants.contains_key(&spec.tenant_id) {
            return Err(SchedulerError::UnknownTenant {
                tenant_id: spec.tenant_id.clone(),
            });
        }
        for class in spec.request.classes() {
            if !self
                .config
                .domain
                .resource_classes
                .iter()
                .any(|known| known == class)
            {
                return Err(SchedulerError::InvalidResourceClass {
                    class: class.to_string(),
                });
            }
        }
        if spec.request.is_empty() {
            return Err(SchedulerError::InvalidTaskParams(
                "资源请求不能为空".to_string(),
            ));
        }
        let task_id = self.state.next_task_id;
        if self.state.graph.would_create_cycle(task_id, &spec.dependencies) {
            return Err(SchedulerError::CyclicDependency);
        }
        for &dep in &spec.dependencies {
            if !self.state.tasks.contains_key(&dep) {
                return Err(SchedulerError::DependencyNotFound { id: dep });
            }
        }

        let now = Utc::now();
        let task = Task::from_spec(task_id, spec, now);

        self.journal
            .append(&JournalRecord::new(JournalEntry::TaskSubmitted {
                task: task.clone(),
            }))
            .await?;

        self.state.next_task_id += 1;
        self.state.graph.insert(task_id, &task.dependencies);
        let dependencies = task.dependencies.clone();
        self.state.tasks.insert(task_id, task);
        self.metrics.record_task_submitted();
        info!("任务 {} 已提交", task_id);

        // 依赖已有终态失败的，立即注定失败；全部满足的直接就绪
        if dependencies.iter().any(|dep| self.state.graph.is_doomed(*dep)) {
            self.persist_transition(
                task_id,
                TaskState::Failed,
                Some(FailureReason::DependencyFailed),
                Some("依赖任务已处于失败终态".to_string()),
                None,
            )
            .await?;
        } else if self.state.graph.deps_satisfied(task_id) {
            self.persist_transition(task_id, TaskState::Ready, None, None, None)
                .await?;
        }

        Ok(task_id)
    }

    /// 取消：幂等；Pending/Ready立即移除，Running先尽力检查点再终止
    async fn cancel_task(&mut self, task_id: i64) -> SchedulerResult<()> {
        let Some(task) = self.state.tasks.get(&task_id) else {
            return Err(SchedulerError::TaskNotFound { id: task_id });
        };
        if task.state.is_terminal() {
            return Ok(());
        }

        match task.state {
            TaskState::Pending | TaskState::Ready | TaskState::Checkpointed => {
                self.state.graph.remove(task_id);
                self.pending_reclaims.remove(&task_id);
                self.persist_transition(task_id, TaskState::Cancelled, None, None, None)
                    .await?;
            }
            TaskState::Running => {
                let node_id = task.assigned_node.clone();
                let checkpointable = task.is_checkpointable();

                if let Some(node_id) = node_id {
                    let mut lossy = true;
                    if checkpointable {
                        let grace = self.checkpoint_manager.cancel_grace();
                        let capture = {
                            let manager = &self.checkpoint_manager;
                            let task = self.state.tasks.get_mut(&task_id).unwrap();
                            tokio::time::timeout(grace, manager.checkpoint_task(task, &node_id))
                                .await
                        };
                        match capture {
                            Ok(Ok(checkpoint)) => {
                                self.record_checkpoint(checkpoint).await?;
                                lossy = false;
                            }
                            Ok(Err(e)) => {
                                warn!("取消任务 {} 时检查点失败: {}", task_id, e);
                            }
                            Err(_) => {
                                warn!("取消任务 {} 时检查点超过宽限期", task_id);
                            }
                        }
                    }
                    if lossy {
                        StructuredLogger::log_lossy_cancellation(task_id);
                        self.metrics.record_lossy_cancellation();
                        self.publish(SchedulerEvent::LossyCancellation { task_id });
                    }
                    let _ = tokio::time::timeout(
                        StdDuration::from_millis(self.config.domain.dispatch_timeout_ms),
                        self.gateway.terminate(&node_id, task_id),
                    )
                    .await;
                }

                self.state.ledger.release_task(task_id, &mut self.state.tenants);
                self.persist_transition(task_id, TaskState::Cancelled, None, None, None)
                    .await?;
            }
            _ => {}
        }

        self.cascade_dependency_failure(task_id).await?;
        self.cleanup_checkpoints(task_id).await;
        info!("任务 {} 已取消", task_id);
        Ok(())
    }

    async fn update_priority(&mut self, task_id: i64, static_priority: i32) -> SchedulerResult<()> {
        let Some(task) = self.state.tasks.get(&task_id) else {
            return Err(SchedulerError::TaskNotFound { id: task_id });
        };
        if task.state.is_terminal() {
            return Err(SchedulerError::InvalidStateTransition {
                task_id,
                from: task.state.to_string(),
                to: task.state.to_string(),
            });
        }

        self.journal
            .append(&JournalRecord::new(JournalEntry::TaskPriorityUpdated {
                task_id,
                static_priority,
            }))
            .await?;

        let task = self.state.tasks.get_mut(&task_id).unwrap();
        task.static_priority = static_priority;
        task.updated_at = Utc::now();
        debug!("任务 {} 静态优先级调整为 {}，下一轮生效", task_id, static_priority);
        Ok(())
    }

    async fn register_tenant(&mut self, spec: TenantSpec) -> SchedulerResult<()> {
        if self.state.tenants.contains_key(&spec.id) {
            return Err(SchedulerError::TenantAlreadyExists {
                tenant_id: spec.id.clone(),
            });
        }
        for class in spec.guaranteed.classes().chain(spec.burst_ceiling.classes()) {
            if !self
                .config
                .domain
                .resource_classes
                .iter()
                .any(|known| known == class)
            {
                return Err(SchedulerError::InvalidResourceClass {
                    class: class.to_string(),
                });
            }
        }
        if !spec.guaranteed.fits_within(&spec.burst_ceiling) {
            return Err(SchedulerError::Configuration(format!(
                "租户 {} 的保障配额超出突发上限",
                spec.id
            )));
        }

        self.journal
            .append(&JournalRecord::new(JournalEntry::TenantRegistered {
                spec: spec.clone(),
            }))
            .await?;

        let tenant = Tenant::from_spec(
            spec,
            chrono::Duration::seconds(self.config.fairness.window_seconds),
            Utc::now(),
        );
        info!("租户 {} 已注册", tenant.id);
        self.state.tenants.insert(tenant.id.clone(), tenant);
        Ok(())
    }

    async fn register_node(&mut self, spec: NodeSpec) -> SchedulerResult<()> {
        for class in spec.capacity.classes() {
            if !self
                .config
                .domain
                .resource_classes
                .iter()
                .any(|known| known == class)
            {
                return Err(SchedulerError::InvalidResourceClass {
                    class: class.to_string(),
                });
            }
        }

        self.journal
            .append(&JournalRecord::new(JournalEntry::NodeRegistered {
                spec: spec.clone(),
            }))
            .await?;

        let node = Node::from_spec(spec, Utc::now());
        info!("节点 {} 已注册，容量 {:?}", node.id, node.capacity);
        self.state.ledger.register_node(node)?;
        self.metrics
            .set_healthy_nodes(self.state.ledger.healthy_node_count());
        Ok(())
    }

    /// 注销节点：驻留任务按节点失效处理重新指派
    async fn deregister_node(&mut self, node_id: &str) -> SchedulerResult<()> {
        if self.state.ledger.node(node_id).is_none() {
            return Err(SchedulerError::NodeNotFound {
                id: node_id.to_string(),
            });
        }
        self.handle_node_loss(node_id, true).await
    }

    /// 处理一条工作节点状态回报，返回是否触发调度轮
    pub async fn handle_status(&mut self, update: StatusUpdate) -> bool {
        let Some(task) = self.state.tasks.get(&update.task_id) else {
            debug!("忽略未知任务 {} 的状态回报", update.task_id);
            return false;
        };
        // 过滤来自旧指派节点的过期回报
        if task.assigned_node.as_deref() != Some(update.node_id.as_str()) {
            debug!(
                "忽略任务 {} 来自节点 {} 的过期回报",
                update.task_id, update.node_id
            );
            return false;
        }

        match update.kind {
            StatusUpdateKind::Started => {
                debug!("任务 {} 在节点 {} 开始执行", update.task_id, update.node_id);
                false
            }
            StatusUpdateKind::Progress { fraction } => {
                debug!("任务 {} 进度 {:.1}%", update.task_id, fraction * 100.0);
                false
            }
            StatusUpdateKind::Completed => {
                if let Err(e) = self.complete_task(update.task_id).await {
                    StructuredLogger::log_system_error("domain", "complete_task", &e);
                }
                true
            }
            StatusUpdateKind::Failed { error, fatal } => {
                if let Err(e) = self.fail_task(update.task_id, error, fatal).await {
                    StructuredLogger::log_system_error("domain", "fail_task", &e);
                }
                true
            }
        }
    }

    async fn complete_task(&mut self, task_id: i64) -> SchedulerResult<()> {
        let Some(task) = self.state.tasks.get(&task_id) else {
            return Ok(());
        };
        if task.state != TaskState::Running {
            return Ok(());
        }

        self.state.ledger.release_task(task_id, &mut self.state.tenants);
        self.persist_transition(task_id, TaskState::Completed, None, None, None)
            .await?;
        self.metrics.record_task_completion();

        // 依赖者重新评估就绪
        let newly_ready = self.state.graph.mark_completed(task_id);
        for dependent in newly_ready {
            let is_pending = self
                .state
                .tasks
                .get(&dependent)
                .map(|t| t.state == TaskState::Pending)
                .unwrap_or(false);
            if is_pending {
                self.persist_transition(dependent, TaskState::Ready, None, None, None)
                    .await?;
            }
        }

        self.cleanup_checkpoints(task_id).await;
        Ok(())
    }

    async fn fail_task(&mut self, task_id: i64, error: String, fatal: bool) -> SchedulerResult<()> {
        let Some(task) = self.state.tasks.get(&task_id) else {
            return Ok(());
        };
        if task.state != TaskState::Running {
            return Ok(());
        }
        let retry_count = task.retry_count;
        let max_retries = task.max_retries;

        self.state.ledger.release_task(task_id, &mut self.state.tenants);

        if fatal {
            // 任务自报不可恢复：终态，不重试
            self.persist_transition(
                task_id,
                TaskState::Failed,
                Some(FailureReason::Fatal),
                Some(error),
                None,
            )
            .await?;
            self.metrics.record_task_failure();
            self.cascade_dependency_failure(task_id).await?;
            self.cleanup_checkpoints(task_id).await;
            return Ok(());
        }

        if retry_count < max_retries {
            let next_retry = retry_count + 1;
            let not_before = self.retry_backoff.next_retry_at(next_retry, Utc::now());
            self.journal
                .append(&JournalRecord::new(JournalEntry::TaskRetryScheduled {
                    task_id,
                    retry_count: next_retry,
                    not_before,
                }))
                .await?;
            {
                let task = self.state.tasks.get_mut(&task_id).unwrap();
                task.retry_count = next_retry;
                task.not_before = Some(not_before);
            }
            self.persist_transition(task_id, TaskState::Ready, None, Some(error), None)
                .await?;
            self.metrics.record_task_retry();
            info!(
                "任务 {} 执行失败，第 {} 次重试安排在 {}",
                task_id,
                next_retry,
                not_before.format("%Y-%m-%d %H:%M:%S UTC")
            );
        } else {
            self.persist_transition(
                task_id,
                TaskState::Failed,
                Some(FailureReason::RetriesExhausted),
                Some(error),
                None,
            )
            .await?;
            self.metrics.record_task_failure();
            self.cascade_dependency_failure(task_id).await?;
            self.cleanup_checkpoints(task_id).await;
        }
        Ok(())
    }

    /// 运行一轮调度：重新接纳、公平性审计、到期回收、评分排序、贪心放置
    pub async fn run_round(&mut self) -> RoundReport {
        let started = std::time::Instant::now();
        let now = Utc::now();
        self.round += 1;

        // 策略更新只在轮边界生效
        self.apply_pending_update();

        // Checkpointed任务重新接纳为Ready
        let checkpointed: Vec<i64> = self
            .state
            .tasks
            .values()
            .filter(|t| t.state == TaskState::Checkpointed)
            .map(|t| t.id)
            .collect();
        for task_id in checkpointed {
            if let Err(e) = self
                .persist_transition(task_id, TaskState::Ready, None, None, None)
                .await
            {
                StructuredLogger::log_system_error("domain", "readmit_checkpointed", &e);
            }
        }

        // 公平性采样与干预
        self.fairness.observe(&mut self.state.tenants, now);
        let interventions = self.fairness.evaluate(&self.state.tenants, now);
        for intervention in interventions {
            match intervention.level {
                InterventionLevel::Soft => {
                    StructuredLogger::log_fairness_intervention(
                        &intervention.tenant_id,
                        intervention.share_ratio,
                        false,
                    );
                    if self.fairness.expose_soft_interventions() {
                        self.publish(SchedulerEvent::FairnessIntervention {
                            tenant_id: intervention.tenant_id.clone(),
                            hard: false,
                        });
                    }
                }
                InterventionLevel::Hard => {
                    StructuredLogger::log_fairness_intervention(
                        &intervention.tenant_id,
                        intervention.share_ratio,
                        true,
                    );
                    self.publish(SchedulerEvent::FairnessIntervention {
                        tenant_id: intervention.tenant_id.clone(),
                        hard: true,
                    });
                    self.execute_hard_intervention(&intervention.tenant_id, now)
                        .await;
                    self.fairness.acknowledge_hard(&intervention.tenant_id, now);
                }
            }
        }

        // 到期的宽限回收
        let due: Vec<(i64, PreemptionReason)> = self
            .pending_reclaims
            .iter()
            .filter(|(_, pending)| pending.due <= now)
            .map(|(&task_id, pending)| (task_id, pending.reason.clone()))
            .collect();
        for (task_id, reason) in due {
            self.pending_reclaims.remove(&task_id);
            if let Err(e) = self.execute_preemption(task_id, reason).await {
                StructuredLogger::log_system_error("domain", "graceful_reclaim", &e);
            }
        }

        // 收集并评分Ready任务
        let mut scored = Vec::new();
        for task in self.state.tasks.values() {
            if !task.is_schedulable(now) {
                continue;
            }
            let Some(tenant) = self.state.tenants.get(&task.tenant_id) else {
                continue;
            };
            let debt = self.fairness.debt(tenant);
            let deweight = self.fairness.deweight_factor(&task.tenant_id);
            scored.push(ScoredTask {
                task_id: task.id,
                score: self.priority.effective_priority(task, debt, deweight, now),
                submitted_at: task.created_at,
            });
        }
        let ranked = self.priority.rank(scored);
        let ready_total = ranked.len();

        // 按分数降序贪心放置
        let mut placed = 0;
        for entry in ranked {
            match self.try_place(entry.task_id, entry.score, now).await {
                Ok(true) => placed += 1,
                Ok(false) => {}
                Err(e) if e.is_admission_error() => {
                    // 准入类失败不上浮，任务保持Ready待下一轮
                    debug!("任务 {} 本轮未能放置: {}", entry.task_id, e);
                }
                Err(e) => {
                    StructuredLogger::log_system_error("domain", "try_place", &e);
                }
            }
        }

        let running = self
            .state
            .tasks
            .values()
            .filter(|t| t.state == TaskState::Running)
            .count();
        self.metrics
            .set_queue_depths(ready_total.saturating_sub(placed), running);
        self.metrics
            .record_round_duration(started.elapsed().as_secs_f64());

        let report = RoundReport {
            round: self.round,
            placed,
            ready_remaining: ready_total - placed,
        };
        self.publish(SchedulerEvent::RoundCompleted {
            round: report.round,
            placed: report.placed,
            ready_remaining: report.ready_remaining,
        });
        debug!(
            "调度轮 {} 完成: 放置 {}/{} 个就绪任务",
            report.round, report.placed, ready_total
        );
        report
    }

    fn apply_pending_update(&mut self) {
        if let Some(update) = self.pending_update.take() {
            update.apply_to(&mut self.config);
            self.quota.update_config(self.config.quota.clone());
            self.priority.update_config(self.config.policy.clone());
            self.fairness.update_config(self.config.fairness.clone());
            self.preemption
                .update_margin(self.config.policy.preemption_margin);
            self.checkpoint_manager
                .update_config(self.config.checkpoint.clone());
            self.retry_backoff.update_config(self.config.failure.clone());
            self.failure_detector
                .update_config(self.config.failure.clone());
            info!("策略更新在轮 {} 边界生效", self.round + 1);
        }
    }

    /// 尝试放置单个任务：准入检查、选点、预留、指派；失败时评估抢占
    async fn try_place(
        &mut self,
        task_id: i64,
        score: f64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<bool> {
        let Some(task) = self.state.tasks.get(&task_id) else {
            return Ok(false);
        };
        if task.state != TaskState::Ready {
            return Ok(false);
        }
        let request = task.request.clone();
        let kind = task.kind;
        let tenant_id = task.tenant_id.clone();

        let Some(tenant) = self.state.tenants.get(&tenant_id) else {
            return Ok(false);
        };
        let idle = self.state.ledger.idle_capacity();
        let burst = match self.quota.check_admission(tenant, &request, &idle) {
            Admission::Allowed => false,
            Admission::AllowedBurst => true,
            Admission::Denied { reason } => {
                debug!("任务 {} 准入被拒: {}", task_id, reason);
                return Ok(false);
            }
        };

        // 放置冲突时换节点重试一次
        let mut excluded = HashSet::new();
        for _ in 0..2 {
            let Some(node_id) = self.select_node(&request, kind, &excluded) else {
                break;
            };
            match self.assign_to_node(task_id, &node_id, burst, score).await {
                Ok(()) => return Ok(true),
                Err(SchedulerError::PlacementConflict(_))
                | Err(SchedulerError::InsufficientCapacity { .. }) => {
                    excluded.insert(node_id);
                }
                Err(e) => return Err(e),
            }
        }

        // 触发(a)：保障配额所有者被拒而突发租户占有可回收容量
        if !burst {
            if let Some(node_id) = self
                .trigger_quota_reclaim(&request, kind, &tenant_id, now)
                .await?
            {
                if self
                    .assign_to_node(task_id, &node_id, burst, score)
                    .await
                    .is_ok()
                {
                    return Ok(true);
                }
            }
        }

        // 触发(b)：优先级差超出配置余量
        if let Some(node_id) = self
            .trigger_priority_preemption(task_id, &request, kind, score, now)
            .await?
        {
            if self
                .assign_to_node(task_id, &node_id, burst, score)
                .await
                .is_ok()
            {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// 负载均衡选点：健康、支持该种类、容得下请求的节点中取负载最低者
    fn select_node(
        &self,
        request: &ResourceVector,
        kind: TaskKind,
        excluded: &HashSet<String>,
    ) -> Option<String> {
        self.state
            .ledger
            .nodes()
            .filter(|node| {
                node.accepts_placements()
                    && node.supports_kind(kind)
                    && node.can_fit(request)
                    && !excluded.contains(&node.id)
            })
            .min_by(|a, b| {
                a.load_fraction()
                    .partial_cmp(&b.load_fraction())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|node| node.id.clone())
    }

    /// 预留并指派；失败则回滚预留、降级节点并报告放置冲突
    async fn assign_to_node(
        &mut self,
        task_id: i64,
        node_id: &str,
        burst: bool,
        score: f64,
    ) -> SchedulerResult<()> {
        let task_snapshot = self
            .state
            .tasks
            .get(&task_id)
            .cloned()
            .ok_or(SchedulerError::TaskNotFound { id: task_id })?;
        let tenant = self
            .state
            .tenants
            .get_mut(&task_snapshot.tenant_id)
            .ok_or_else(|| SchedulerError::UnknownTenant {
                tenant_id: task_snapshot.tenant_id.clone(),
            })?;

        let reservation_id = self
            .state
            .ledger
            .reserve(node_id, &task_snapshot, tenant, burst)?;

        let ctx = TaskExecutionContext {
            task_id,
            task_name: task_snapshot.name.clone(),
            tenant_id: task_snapshot.tenant_id.clone(),
            kind: task_snapshot.kind,
            parameters: task_snapshot.parameters.clone(),
            request: task_snapshot.request.clone(),
            retry_count: task_snapshot.retry_count,
        };

        // 有已校验检查点则恢复执行，否则全新启动
        let snapshot = match &task_snapshot.checkpoint_ref {
            Some(checkpoint_ref) => {
                let checkpoint = self
                    .state
                    .checkpoints
                    .get(&task_id)
                    .and_then(|index| {
                        index
                            .iter()
                            .find(|cp| cp.sequence == checkpoint_ref.sequence)
                    })
                    .cloned();
                match checkpoint {
                    Some(cp) => self.checkpoint_manager.verified_payload(&cp).await,
                    None => None,
                }
            }
            None => None,
        };

        let dispatch_timeout = StdDuration::from_millis(self.config.domain.dispatch_timeout_ms);
        let dispatched = match snapshot {
            Some(payload) => {
                tokio::time::timeout(
                    dispatch_timeout,
                    self.gateway.resume(node_id, ctx, payload),
                )
                .await
            }
            None => tokio::time::timeout(dispatch_timeout, self.gateway.assign(node_id, ctx)).await,
        };

        match dispatched {
            Ok(Ok(())) => {}
            outcome => {
                // 指派失败：回滚预留并降级节点
                let _ = self
                    .state
                    .ledger
                    .release(reservation_id, &mut self.state.tenants);
                let detail = match outcome {
                    Ok(Err(e)) => e.to_string(),
                    _ => "指派超时".to_string(),
                };
                warn!("节点 {} 指派任务 {} 失败: {}", node_id, task_id, detail);
                self.degrade_node(node_id).await;
                return Err(SchedulerError::PlacementConflict(format!(
                    "节点 {node_id} 指派失败: {detail}"
                )));
            }
        }

        if let Err(e) = self
            .persist_transition(
                task_id,
                TaskState::Running,
                None,
                None,
                Some(node_id.to_string()),
            )
            .await
        {
            // 日志写入失败则不能让执行继续：终止并回滚预留
            let _ = tokio::time::timeout(
                dispatch_timeout,
                self.gateway.terminate(node_id, task_id),
            )
            .await;
            self.state.ledger.release_task(task_id, &mut self.state.tenants);
            return Err(e);
        }
        self.metrics.record_placement();
        StructuredLogger::log_task_placed(task_id, &task_snapshot.name, node_id, score);
        Ok(())
    }

    async fn degrade_node(&mut self, node_id: &str) {
        let record = JournalRecord::new(JournalEntry::NodeHealthChanged {
            node_id: node_id.to_string(),
            health: NodeHealth::Degraded,
        });
        if self.journal.append(&record).await.is_ok() {
            let _ = self
                .state
                .ledger
                .set_node_health(node_id, NodeHealth::Degraded);
            StructuredLogger::log_node_health_change(node_id, NodeHealth::Degraded);
            self.publish(SchedulerEvent::NodeHealthChanged {
                node_id: node_id.to_string(),
                health: NodeHealth::Degraded,
            });
        }
    }

    fn tenant_score_factors(&self, tenant_id: &str) -> (f64, f64) {
        let debt = self
            .state
            .tenants
            .get(tenant_id)
            .map(|tenant| self.fairness.debt(tenant))
            .unwrap_or(0.0);
        (debt, self.fairness.deweight_factor(tenant_id))
    }

    fn checkpoint_age_seconds(&self, task: &Task, now: DateTime<Utc>) -> i64 {
        task.checkpoint_ref
            .as_ref()
            .and_then(|reference| {
                self.state.checkpoints.get(&task.id).and_then(|index| {
                    index
                        .iter()
                        .find(|cp| cp.sequence == reference.sequence)
                        .map(|cp| (now - cp.created_at).num_seconds())
                })
            })
            .unwrap_or(i64::MAX)
    }

    fn eligible_node_available(&self, kind: TaskKind) -> HashMap<String, ResourceVector> {
        self.state
            .ledger
            .nodes()
            .filter(|node| node.accepts_placements() && node.supports_kind(kind))
            .map(|node| (node.id.clone(), node.available()))
            .collect()
    }

    /// 触发(a)：回收突发占用为保障所有者腾容量
    async fn trigger_quota_reclaim(
        &mut self,
        request: &ResourceVector,
        kind: TaskKind,
        for_tenant: &str,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Option<String>> {
        let burst_holders: Vec<(i64, String)> = self
            .state
            .ledger
            .burst_reservations()
            .iter()
            .filter(|r| r.tenant_id != for_tenant)
            .map(|r| (r.task_id, r.node_id.clone()))
            .collect();
        if burst_holders.is_empty() {
            return Ok(None);
        }

        let mut candidates = Vec::new();
        for (victim_id, node_id) in burst_holders {
            let Some(task) = self.state.tasks.get(&victim_id) else {
                continue;
            };
            if task.state != TaskState::Running || !task.is_checkpointable() {
                continue;
            }
            let (debt, deweight) = self.tenant_score_factors(&task.tenant_id);
            candidates.push(PreemptionCandidate {
                task_id: victim_id,
                node_id,
                tenant_id: task.tenant_id.clone(),
                effective_priority: self.priority.effective_priority(task, debt, deweight, now),
                footprint: task.request.clone(),
                checkpoint_age_seconds: self.checkpoint_age_seconds(task, now),
                checkpointable: true,
                burst: true,
            });
        }

        let available = self.eligible_node_available(kind);
        let Some(plan) = self.preemption.plan(request, &available, candidates) else {
            return Ok(None);
        };

        match self.quota.policy() {
            ReclamationPolicy::Immediate => {
                for victim in &plan.victims {
                    self.execute_preemption(
                        *victim,
                        PreemptionReason::QuotaReclaim {
                            for_tenant: for_tenant.to_string(),
                        },
                    )
                    .await?;
                }
                Ok(Some(plan.node_id))
            }
            ReclamationPolicy::Graceful => {
                let due = now + self.quota.grace_period();
                for victim in plan.victims {
                    self.pending_reclaims
                        .entry(victim)
                        .or_insert(PendingReclaim {
                            due,
                            reason: PreemptionReason::QuotaReclaim {
                                for_tenant: for_tenant.to_string(),
                            },
                        });
                }
                info!(
                    "突发占用进入宽限期，{} 后回收给租户 {}",
                    due.format("%H:%M:%S"),
                    for_tenant
                );
                Ok(None)
            }
        }
    }

    /// 触发(b)：待调度任务优先级超出运行任务余量以上
    async fn trigger_priority_preemption(
        &mut self,
        pending_task: i64,
        request: &ResourceVector,
        kind: TaskKind,
        pending_score: f64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Option<String>> {
        let mut candidates = Vec::new();
        for task in self.state.tasks.values() {
            if task.state != TaskState::Running || !task.is_checkpointable() {
                continue;
            }
            let Some(node_id) = task.assigned_node.clone() else {
                continue;
            };
            let (debt, deweight) = self.tenant_score_factors(&task.tenant_id);
            let running_score = self.priority.effective_priority(task, debt, deweight, now);
            if !self.preemption.exceeds_margin(pending_score, running_score) {
                continue;
            }
            let burst = self
                .state
                .ledger
                .reservation_for_task(task.id)
                .map(|r| r.burst)
                .unwrap_or(false);
            candidates.push(PreemptionCandidate {
                task_id: task.id,
                node_id,
                tenant_id: task.tenant_id.clone(),
                effective_priority: running_score,
                footprint: task.request.clone(),
                checkpoint_age_seconds: self.checkpoint_age_seconds(task, now),
                checkpointable: true,
                burst,
            });
        }

        let available = self.eligible_node_available(kind);
        let Some(plan) = self.preemption.plan(request, &available, candidates) else {
            return Ok(None);
        };

        for victim in &plan.victims {
            self.execute_preemption(
                *victim,
                PreemptionReason::PriorityGap {
                    pending_task,
                },
            )
            .await?;
        }
        Ok(Some(plan.node_id))
    }

    /// 硬性公平干预：回收垄断租户的突发占用直至回到保障配额内
    async fn execute_hard_intervention(&mut self, tenant_id: &str, now: DateTime<Utc>) {
        loop {
            let over_guaranteed = self
                .state
                .tenants
                .get(tenant_id)
                .map(|t| t.is_bursting())
                .unwrap_or(false);
            if !over_guaranteed {
                break;
            }

            // 该租户突发预留中按控制器偏好排序选一个
            let mut candidates = Vec::new();
            for reservation in self.state.ledger.burst_reservations() {
                if reservation.tenant_id != tenant_id {
                    continue;
                }
                let Some(task) = self.state.tasks.get(&reservation.task_id) else {
                    continue;
                };
                if task.state != TaskState::Running || !task.is_checkpointable() {
                    continue;
                }
                let (debt, deweight) = self.tenant_score_factors(tenant_id);
                candidates.push(PreemptionCandidate {
                    task_id: task.id,
                    node_id: reservation.node_id.clone(),
                    tenant_id: tenant_id.to_string(),
                    effective_priority: self
                        .priority
                        .effective_priority(task, debt, deweight, now),
                    footprint: task.request.clone(),
                    checkpoint_age_seconds: self.checkpoint_age_seconds(task, now),
                    checkpointable: true,
                    burst: true,
                });
            }
            if candidates.is_empty() {
                break;
            }
            candidates.sort_by(|a, b| {
                a.checkpoint_age_seconds
                    .cmp(&b.checkpoint_age_seconds)
                    .then_with(|| {
                        b.footprint
                            .total_units()
                            .partial_cmp(&a.footprint.total_units())
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
            });
            let victim = candidates[0].task_id;
            match self
                .execute_preemption(
                    victim,
                    PreemptionReason::Monopolization {
                        tenant_id: tenant_id.to_string(),
                    },
                )
                .await
            {
                Ok(true) => {}
                _ => break,
            }
        }
    }

    /// 执行抢占：先请求检查点，成功或按策略强制挂起后回收资源
    ///
    /// 不可检查点的任务不会走到这里（候选构造与控制器双重过滤），
    /// 此处再兜底检查一次。
    async fn execute_preemption(
        &mut self,
        victim: i64,
        reason: PreemptionReason,
    ) -> SchedulerResult<bool> {
        let Some(task) = self.state.tasks.get(&victim) else {
            return Ok(false);
        };
        if task.state != TaskState::Running || !task.is_checkpointable() {
            return Ok(false);
        }
        let Some(node_id) = task.assigned_node.clone() else {
            return Ok(false);
        };
        let tenant_id = task.tenant_id.clone();
        let footprint = task.request.clone();

        StructuredLogger::log_preemption(victim, &node_id, &format!("{reason:?}"));

        let capture_started = std::time::Instant::now();
        let capture = {
            let manager = &self.checkpoint_manager;
            let task = self.state.tasks.get_mut(&victim).unwrap();
            manager.checkpoint_task(task, &node_id).await
        };
        match capture {
            Ok(checkpoint) => {
                self.metrics
                    .record_checkpoint(capture_started.elapsed().as_secs_f64());
                self.record_checkpoint(checkpoint).await?;
            }
            Err(e) => {
                self.metrics.record_checkpoint_failure();
                match self.checkpoint_manager.timeout_policy() {
                    CheckpointTimeoutPolicy::AbortPreemption => {
                        warn!("任务 {} 检查点失败，按策略放弃本次抢占: {}", victim, e);
                        return Ok(false);
                    }
                    CheckpointTimeoutPolicy::ForceSuspend => {
                        StructuredLogger::log_forced_suspension(victim);
                    }
                }
            }
        }

        let _ = tokio::time::timeout(
            StdDuration::from_millis(self.config.domain.dispatch_timeout_ms),
            self.gateway.terminate(&node_id, victim),
        )
        .await;
        self.state.ledger.release_task(victim, &mut self.state.tenants);
        self.persist_transition(victim, TaskState::Checkpointed, None, None, None)
            .await?;
        self.metrics.record_preemption();

        if let PreemptionReason::QuotaReclaim { .. } = &reason {
            StructuredLogger::log_quota_reclaim(&tenant_id, victim);
            self.publish(SchedulerEvent::QuotaReclaimed {
                tenant_id,
                reclaimed: footprint,
            });
        }
        Ok(true)
    }

    /// 节点失效/注销：驻留任务释放预留后进入恢复路径
    async fn handle_node_loss(&mut self, node_id: &str, deregistered: bool) -> SchedulerResult<()> {
        let resident: Vec<i64> = self
            .state
            .ledger
            .node(node_id)
            .map(|node| node.resident_tasks.iter().copied().collect())
            .unwrap_or_default();

        if deregistered {
            self.journal
                .append(&JournalRecord::new(JournalEntry::NodeDeregistered {
                    node_id: node_id.to_string(),
                }))
                .await?;
        } else {
            self.journal
                .append(&JournalRecord::new(JournalEntry::NodeHealthChanged {
                    node_id: node_id.to_string(),
                    health: NodeHealth::Unreachable,
                }))
                .await?;
            self.state
                .ledger
                .set_node_health(node_id, NodeHealth::Unreachable)?;
            StructuredLogger::log_node_health_change(node_id, NodeHealth::Unreachable);
            self.publish(SchedulerEvent::NodeHealthChanged {
                node_id: node_id.to_string(),
                health: NodeHealth::Unreachable,
            });
        }

        for task_id in resident {
            self.state.ledger.release_task(task_id, &mut self.state.tenants);
            self.pending_reclaims.remove(&task_id);
            if let Err(e) = self.recover_after_loss(task_id).await {
                StructuredLogger::log_system_error("domain", "recover_after_loss", &e);
            }
        }

        if deregistered {
            self.state.ledger.remove_node(node_id)?;
            info!("节点 {} 已注销，驻留任务转入恢复路径", node_id);
        }
        self.metrics
            .set_healthy_nodes(self.state.ledger.healthy_node_count());
        Ok(())
    }

    /// 恢复路径：从最高有效检查点续跑，全部无效则从头重跑并计一次重试
    async fn recover_after_loss(&mut self, task_id: i64) -> SchedulerResult<()> {
        let index = self
            .state
            .checkpoints
            .get(&task_id)
            .cloned()
            .unwrap_or_default();

        let outcome = {
            let manager = &self.checkpoint_manager;
            let Some(task) = self.state.tasks.get_mut(&task_id) else {
                return Ok(());
            };
            if task.state != TaskState::Running && task.state != TaskState::Checkpointed {
                return Ok(());
            }
            manager.prepare_recovery(task, &index).await
        };

        let (retry_count, max_retries) = {
            let task = self.state.tasks.get(&task_id).unwrap();
            (task.retry_count, task.max_retries)
        };

        if outcome == RecoveryOutcome::Restart {
            self.metrics.record_task_retry();
            if retry_count > max_retries {
                self.persist_transition(
                    task_id,
                    TaskState::Failed,
                    Some(FailureReason::RetriesExhausted),
                    Some("节点失效后无有效检查点且重试次数耗尽".to_string()),
                    None,
                )
                .await?;
                self.metrics.record_task_failure();
                self.cascade_dependency_failure(task_id).await?;
                self.cleanup_checkpoints(task_id).await;
                return Ok(());
            }
            // 节点失效不是任务自身的过错，重新就绪不做退避；
            // 日志记录只为持久化重试计数
            self.journal
                .append(&JournalRecord::new(JournalEntry::TaskRetryScheduled {
                    task_id,
                    retry_count,
                    not_before: Utc::now(),
                }))
                .await?;
        }

        self.persist_transition(task_id, TaskState::Ready, None, None, None)
            .await
    }

    /// 依赖者级联失败：终态失败/取消的任务，其依赖者永远无法就绪
    async fn cascade_dependency_failure(&mut self, root: i64) -> SchedulerResult<()> {
        let mut stack = self.state.graph.mark_doomed(root);
        while let Some(task_id) = stack.pop() {
            let doomed = match self.state.tasks.get(&task_id) {
                Some(task) if !task.state.is_terminal() => true,
                _ => false,
            };
            if doomed {
                self.persist_transition(
                    task_id,
                    TaskState::Failed,
                    Some(FailureReason::DependencyFailed),
                    Some("依赖任务未能完成".to_string()),
                    None,
                )
                .await?;
                self.metrics.record_task_failure();
            }
            stack.extend(self.state.graph.mark_doomed(task_id));
        }
        Ok(())
    }

    /// 记录检查点：写日志、入索引、按保留策略回收旧检查点
    async fn record_checkpoint(&mut self, checkpoint: Checkpoint) -> SchedulerResult<()> {
        let task_id = checkpoint.task_id;
        self.journal
            .append(&JournalRecord::new(JournalEntry::CheckpointRecorded {
                checkpoint: checkpoint.clone(),
            }))
            .await?;

        let pruned = {
            let manager = &self.checkpoint_manager;
            let index = self.state.checkpoints.entry(task_id).or_default();
            index.push(checkpoint);
            manager.prune(task_id, index).await
        };
        for sequence in pruned {
            self.journal
                .append(&JournalRecord::new(JournalEntry::CheckpointPruned {
                    task_id,
                    sequence,
                }))
                .await?;
        }
        Ok(())
    }

    /// 终态任务的检查点不再用于恢复，全部回收
    async fn cleanup_checkpoints(&mut self, task_id: i64) {
        let Some(index) = self.state.checkpoints.remove(&task_id) else {
            return;
        };
        for checkpoint in index {
            if let Err(e) = self
                .checkpoint_manager
                .store()
                .remove(task_id, checkpoint.sequence)
                .await
            {
                warn!(
                    "回收任务 {} 检查点序号 {} 失败: {}",
                    task_id, checkpoint.sequence, e
                );
            }
            let _ = self
                .journal
                .append(&JournalRecord::new(JournalEntry::CheckpointPruned {
                    task_id,
                    sequence: checkpoint.sequence,
                }))
                .await;
        }
    }

    /// 失效扫描：心跳超时节点标记Unreachable，驻留任务转入恢复
    pub async fn sweep_failures(&mut self, now: DateTime<Utc>) {
        let failed = self.failure_detector.sweep(self.state.ledger.nodes(), now);
        let any = !failed.is_empty();
        for node_id in failed {
            if let Err(e) = self.handle_node_loss(&node_id, false).await {
                StructuredLogger::log_system_error("domain", "handle_node_loss", &e);
            }
        }
        if any {
            self.run_round().await;
        }
    }

    /// 周期性快照：为运行中的可检查点任务创建检查点
    pub async fn periodic_checkpoints(&mut self, now: DateTime<Utc>) {
        let interval = self.checkpoint_manager.interval_seconds() as i64;
        let targets: Vec<(i64, String)> = self
            .state
            .tasks
            .values()
            .filter(|task| {
                task.state == TaskState::Running
                    && task.is_checkpointable()
                    && self.checkpoint_age_seconds(task, now) >= interval
            })
            .filter_map(|task| {
                task.assigned_node
                    .clone()
                    .map(|node_id| (task.id, node_id))
            })
            .collect();

        for (task_id, node_id) in targets {
            let started = std::time::Instant::now();
            let capture = {
                let manager = &self.checkpoint_manager;
                let Some(task) = self.state.tasks.get_mut(&task_id) else {
                    continue;
                };
                manager.checkpoint_task(task, &node_id).await
            };
            match capture {
                Ok(checkpoint) => {
                    self.metrics
                        .record_checkpoint(started.elapsed().as_secs_f64());
                    if let Err(e) = self.record_checkpoint(checkpoint).await {
                        StructuredLogger::log_system_error("domain", "record_checkpoint", &e);
                    }
                }
                Err(e) => {
                    self.metrics.record_checkpoint_failure();
                    warn!("任务 {} 周期性检查点失败: {}", task_id, e);
                }
            }
        }
    }

    /// 状态转换：先写日志、再应用、再发事件
    async fn persist_transition(
        &mut self,
        task_id: i64,
        to: TaskState,
        failure_reason: Option<FailureReason>,
        error_message: Option<String>,
        assigned_node: Option<String>,
    ) -> SchedulerResult<()> {
        let from = {
            let task = self
                .state
                .tasks
                .get(&task_id)
                .ok_or(SchedulerError::TaskNotFound { id: task_id })?;
            if !task.state.can_transition_to(to) {
                return Err(SchedulerError::InvalidStateTransition {
                    task_id,
                    from: task.state.to_string(),
                    to: to.to_string(),
                });
            }
            task.state
        };

        self.journal
            .append(&JournalRecord::new(JournalEntry::TaskStateChanged {
                task_id,
                state: to,
                failure_reason,
                error_message: error_message.clone(),
                assigned_node: assigned_node.clone(),
            }))
            .await?;

        let task = self.state.tasks.get_mut(&task_id).unwrap();
        task.state = to;
        task.failure_reason = failure_reason;
        if error_message.is_some() {
            task.error_message = error_message;
        }
        task.assigned_node = assigned_node;
        task.updated_at = Utc::now();

        StructuredLogger::log_task_state_change(task_id, from, to);
        self.publish(SchedulerEvent::TaskStateChanged { task_id, from, to });
        Ok(())
    }

    fn status_summary(&self) -> TaskStatusSummary {
        let mut summary = TaskStatusSummary::default();
        for task in self.state.tasks.values() {
            match task.state {
                TaskState::Pending => summary.pending += 1,
                TaskState::Ready => summary.ready += 1,
                TaskState::Running => summary.running += 1,
                TaskState::Checkpointed => summary.checkpointed += 1,
                TaskState::Completed => summary.completed += 1,
                TaskState::Failed => summary.failed += 1,
                TaskState::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }

    fn utilization_snapshot(&self) -> UtilizationSnapshot {
        UtilizationSnapshot {
            taken_at: Utc::now(),
            tenants: self
                .state
                .tenants
                .values()
                .map(|tenant| TenantUtilization {
                    tenant_id: tenant.id.clone(),
                    usage: tenant.usage.clone(),
                    guaranteed: tenant.guaranteed.clone(),
                    burst_ceiling: tenant.burst_ceiling.clone(),
                    share_ratio: tenant.history.mean_share_ratio(),
                })
                .collect(),
            nodes: self
                .state
                .ledger
                .nodes()
                .map(|node| NodeUtilization {
                    node_id: node.id.clone(),
                    capacity: node.capacity.clone(),
                    allocated: node.allocated.clone(),
                    health: node.health,
                    resident_count: node.resident_tasks.len(),
                })
                .collect(),
        }
    }

    /// 从状态日志重放恢复内存表，随后把残留的Running/Checkpointed任务转入恢复路径
    pub async fn restore(&mut self) -> SchedulerResult<usize> {
        let records = self.journal.replay().await?;
        let count = records.len();
        for record in records {
            self.apply_record(record);
        }

        // 重放后账本为空（预留不入日志），残留执行态任务重新准入
        let interrupted: Vec<i64> = self
            .state
            .tasks
            .values()
            .filter(|t| matches!(t.state, TaskState::Running | TaskState::Checkpointed))
            .map(|t| t.id)
            .collect();

        for task_id in &interrupted {
            // 与检查点存储对账，避免孤儿快照造成序号冲突
            if let Ok(stored) = self.checkpoint_manager.store().list(*task_id).await {
                if let Some(max_seq) = stored.last().map(|cp| cp.sequence) {
                    if let Some(task) = self.state.tasks.get_mut(task_id) {
                        if task.next_checkpoint_sequence <= max_seq {
                            task.next_checkpoint_sequence = max_seq + 1;
                        }
                    }
                }
            }
            if let Some(task) = self.state.tasks.get_mut(task_id) {
                task.assigned_node = None;
            }
            if let Err(e) = self.recover_after_loss(*task_id).await {
                StructuredLogger::log_system_error("domain", "restore_recovery", &e);
            }
        }

        info!(
            "状态重放完成: {} 条记录，{} 个中断任务转入恢复路径",
            count,
            interrupted.len()
        );
        Ok(count)
    }

    fn apply_record(&mut self, record: JournalRecord) {
        match record.entry {
            JournalEntry::TaskSubmitted { task } => {
                self.state.graph.insert(task.id, &task.dependencies);
                if task.id >= self.state.next_task_id {
                    self.state.next_task_id = task.id + 1;
                }
                self.state.tasks.insert(task.id, task);
            }
            JournalEntry::TaskStateChanged {
                task_id,
                state,
                failure_reason,
                error_message,
                assigned_node,
            } => {
                match state {
                    TaskState::Completed => {
                        self.state.graph.mark_completed(task_id);
                    }
                    TaskState::Failed | TaskState::Cancelled => {
                        self.state.graph.mark_doomed(task_id);
                    }
                    _ => {}
                }
                if let Some(task) = self.state.tasks.get_mut(&task_id) {
                    task.state = state;
                    task.failure_reason = failure_reason;
                    if error_message.is_some() {
                        task.error_message = error_message;
                    }
                    task.assigned_node = assigned_node;
                    task.updated_at = record.at;
                }
            }
            JournalEntry::TaskPriorityUpdated {
                task_id,
                static_priority,
            } => {
                if let Some(task) = self.state.tasks.get_mut(&task_id) {
                    task.static_priority = static_priority;
                }
            }
            JournalEntry::TaskRetryScheduled {
                task_id,
                retry_count,
                not_before,
            } => {
                if let Some(task) = self.state.tasks.get_mut(&task_id) {
                    task.retry_count = retry_count;
                    task.not_before = Some(not_before);
                }
            }
            JournalEntry::TenantRegistered { spec } => {
                let tenant = Tenant::from_spec(
                    spec,
                    chrono::Duration::seconds(self.config.fairness.window_seconds),
                    record.at,
                );
                self.state.tenants.insert(tenant.id.clone(), tenant);
            }
            JournalEntry::NodeRegistered { spec } => {
                let node = Node::from_spec(spec, record.at);
                if let Err(e) = self.state.ledger.register_node(node) {
                    error!("重放节点注册失败: {}", e);
                }
            }
            JournalEntry::NodeDeregistered { node_id } => {
                let _ = self.state.ledger.remove_node(&node_id);
            }
            JournalEntry::NodeHealthChanged { node_id, health } => {
                let _ = self.state.ledger.set_node_health(&node_id, health);
            }
            JournalEntry::CheckpointRecorded { checkpoint } => {
                if let Some(task) = self.state.tasks.get_mut(&checkpoint.task_id) {
                    if task.next_checkpoint_sequence <= checkpoint.sequence {
                        task.next_checkpoint_sequence = checkpoint.sequence + 1;
                    }
                    task.checkpoint_ref = Some(checkpoint.checkpoint_ref());
                }
                self.state
                    .checkpoints
                    .entry(checkpoint.task_id)
                    .or_default()
                    .push(checkpoint);
            }
            JournalEntry::CheckpointPruned { task_id, sequence } => {
                if let Some(index) = self.state.checkpoints.get_mut(&task_id) {
                    index.retain(|cp| cp.sequence != sequence);
                }
            }
        }
    }

    // 测试与诊断辅助
    pub fn task(&self, task_id: i64) -> Option<&Task> {
        self.state.tasks.get(&task_id)
    }

    pub fn tenant(&self, tenant_id: &str) -> Option<&Tenant> {
        self.state.tenants.get(tenant_id)
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.state.ledger
    }

    pub fn checkpoint_index(&self, task_id: i64) -> &[Checkpoint] {
        self.state
            .checkpoints
            .get(&task_id)
            .map(|index| index.as_slice())
            .unwrap_or(&[])
    }
}
