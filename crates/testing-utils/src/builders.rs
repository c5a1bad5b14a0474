//! 测试数据构造器

use chrono::{DateTime, Duration, Utc};

use fairsched_core::models::{NodeSpec, ResourceVector, TaskKind, TaskSpec, TenantSpec};

pub struct TaskSpecBuilder {
    spec: TaskSpec,
}

impl TaskSpecBuilder {
    pub fn new(name: &str, tenant_id: &str) -> Self {
        Self {
            spec: TaskSpec {
                name: name.to_string(),
                tenant_id: tenant_id.to_string(),
                kind: TaskKind::Simulation,
                parameters: serde_json::json!({"duration_ms": 60_000}),
                request: ResourceVector::new().with("cpu", 1.0),
                static_priority: 0,
                deadline: None,
                dependencies: vec![],
                max_retries: None,
            },
        }
    }

    pub fn kind(mut self, kind: TaskKind) -> Self {
        self.spec.kind = kind;
        self
    }

    pub fn cpu(mut self, amount: f64) -> Self {
        self.spec.request = ResourceVector::new().with("cpu", amount);
        self
    }

    pub fn request(mut self, request: ResourceVector) -> Self {
        self.spec.request = request;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.spec.static_priority = priority;
        self
    }

    pub fn deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.spec.deadline = Some(deadline);
        self
    }

    pub fn deadline_in_seconds(mut self, seconds: i64) -> Self {
        self.spec.deadline = Some(Utc::now() + Duration::seconds(seconds));
        self
    }

    pub fn dependencies(mut self, deps: Vec<i64>) -> Self {
        self.spec.dependencies = deps;
        self
    }

    pub fn parameters(mut self, parameters: serde_json::Value) -> Self {
        self.spec.parameters = parameters;
        self
    }

    pub fn max_retries(mut self, retries: i32) -> Self {
        self.spec.max_retries = Some(retries);
        self
    }

    pub fn build(self) -> TaskSpec {
        self.spec
    }
}

pub struct TenantSpecBuilder {
    spec: TenantSpec,
}

impl TenantSpecBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            spec: TenantSpec {
                id: id.to_string(),
                name: id.to_string(),
                guaranteed: ResourceVector::new().with("cpu", 4.0),
                burst_ceiling: ResourceVector::new().with("cpu", 8.0),
            },
        }
    }

    pub fn guaranteed_cpu(mut self, amount: f64) -> Self {
        self.spec.guaranteed = ResourceVector::new().with("cpu", amount);
        self
    }

    pub fn burst_cpu(mut self, amount: f64) -> Self {
        self.spec.burst_ceiling = ResourceVector::new().with("cpu", amount);
        self
    }

    pub fn guaranteed(mut self, vector: ResourceVector) -> Self {
        self.spec.guaranteed = vector;
        self
    }

    pub fn burst_ceiling(mut self, vector: ResourceVector) -> Self {
        self.spec.burst_ceiling = vector;
        self
    }

    pub fn build(self) -> TenantSpec {
        self.spec
    }
}

pub struct NodeSpecBuilder {
    spec: NodeSpec,
}

impl NodeSpecBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            spec: NodeSpec {
                id: id.to_string(),
                capacity: ResourceVector::new().with("cpu", 8.0),
                supported_kinds: vec![
                    TaskKind::Build,
                    TaskKind::MlTraining,
                    TaskKind::Simulation,
                ],
            },
        }
    }

    pub fn cpu(mut self, amount: f64) -> Self {
        self.spec.capacity = ResourceVector::new().with("cpu", amount);
        self
    }

    pub fn capacity(mut self, capacity: ResourceVector) -> Self {
        self.spec.capacity = capacity;
        self
    }

    pub fn kinds(mut self, kinds: Vec<TaskKind>) -> Self {
        self.spec.supported_kinds = kinds;
        self
    }

    pub fn build(self) -> NodeSpec {
        self.spec
    }
}
