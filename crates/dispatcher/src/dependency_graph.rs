use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

/// 任务依赖图
///
/// 维护任务间的DAG与就绪判定。环检测在提交时进行，
/// 带环的任务在进入Pending之前即被拒绝。资源无关，只关心依赖拓扑。
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// 任务 -> 其依赖集合
    dependencies: HashMap<i64, HashSet<i64>>,
    /// 任务 -> 依赖它的任务集合
    dependents: HashMap<i64, HashSet<i64>>,
    completed: HashSet<i64>,
    /// 终态失败或取消的任务，其依赖者永远无法就绪
    doomed: HashSet<i64>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 假设加入 (task_id, deps) 后图中是否出现环，使用Kahn拓扑排序判定
    pub fn would_create_cycle(&self, task_id: i64, deps: &[i64]) -> bool {
        if deps.contains(&task_id) {
            return true;
        }

        let mut graph: HashMap<i64, Vec<i64>> = self
            .dependencies
            .iter()
            .map(|(&id, deps)| (id, deps.iter().copied().collect()))
            .collect();
        graph.insert(task_id, deps.to_vec());

        let mut in_degree: HashMap<i64, usize> = HashMap::new();
        for &node in graph.keys() {
            in_degree.entry(node).or_insert(0);
        }
        for deps in graph.values() {
            for &dep in deps {
                *in_degree.entry(dep).or_insert(0) += 1;
            }
        }

        let mut queue: VecDeque<i64> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&node, _)| node)
            .collect();

        let total = in_degree.len();
        let mut processed = 0;
        while let Some(node) = queue.pop_front() {
            processed += 1;
            if let Some(deps) = graph.get(&node) {
                for &dep in deps {
                    if let Some(degree) = in_degree.get_mut(&dep) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(dep);
                        }
                    }
                }
            }
        }

        let has_cycle = processed < total;
        if has_cycle {
            warn!("检测到循环依赖，任务ID: {}, 新依赖: {:?}", task_id, deps);
        }
        has_cycle
    }

    /// 登记任务及其依赖，调用方需先通过环检测
    pub fn insert(&mut self, task_id: i64, deps: &[i64]) {
        let dep_set: HashSet<i64> = deps.iter().copied().collect();
        for &dep in &dep_set {
            self.dependents.entry(dep).or_default().insert(task_id);
        }
        self.dependencies.insert(task_id, dep_set);
    }

    /// 所有依赖均已Completed
    pub fn deps_satisfied(&self, task_id: i64) -> bool {
        self.dependencies
            .get(&task_id)
            .map(|deps| deps.iter().all(|dep| self.completed.contains(dep)))
            .unwrap_or(true)
    }

    /// 标记完成，返回因此而全部依赖满足的依赖者
    pub fn mark_completed(&mut self, task_id: i64) -> Vec<i64> {
        self.completed.insert(task_id);
        debug!("任务 {} 完成，重新评估其依赖者", task_id);

        let mut newly_ready = Vec::new();
        if let Some(dependents) = self.dependents.get(&task_id) {
            for &dependent in dependents {
                if self.deps_satisfied(dependent) {
                    newly_ready.push(dependent);
                }
            }
        }
        newly_ready
    }

    /// 标记终态失败/取消，返回直接依赖者（它们已注定无法执行）
    pub fn mark_doomed(&mut self, task_id: i64) -> Vec<i64> {
        self.doomed.insert(task_id);
        self.dependents
            .get(&task_id)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default()
    }

    /// 从图中摘除任务（取消Pending/Ready任务时）
    pub fn remove(&mut self, task_id: i64) {
        if let Some(deps) = self.dependencies.remove(&task_id) {
            for dep in deps {
                if let Some(dependents) = self.dependents.get_mut(&dep) {
                    dependents.remove(&task_id);
                }
            }
        }
    }

    /// BFS收集传递依赖
    pub fn transitive_dependencies(&self, task_id: i64) -> Vec<i64> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        let mut result = Vec::new();

        if let Some(deps) = self.dependencies.get(&task_id) {
            for &dep in deps {
                queue.push_back(dep);
                visited.insert(dep);
            }
        }

        while let Some(current) = queue.pop_front() {
            result.push(current);
            if let Some(deps) = self.dependencies.get(&current) {
                for &dep in deps {
                    if visited.insert(dep) {
                        queue.push_back(dep);
                    }
                }
            }
        }
        result
    }

    pub fn is_doomed(&self, task_id: i64) -> bool {
        self.doomed.contains(&task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_dependency_is_cycle() {
        let graph = DependencyGraph::new();
        assert!(graph.would_create_cycle(1, &[1]));
    }

    #[test]
    fn test_cycle_detection_transitive() {
        let mut graph = DependencyGraph::new();
        graph.insert(1, &[]);
        graph.insert(2, &[1]);
        graph.insert(3, &[2]);
        // 1 依赖 3 形成环 1->3->2->1
        assert!(graph.would_create_cycle(1, &[3]));
        // 4 依赖 3 无环
        assert!(!graph.would_create_cycle(4, &[3]));
    }

    #[test]
    fn test_readiness_after_completion() {
        let mut graph = DependencyGraph::new();
        graph.insert(1, &[]);
        graph.insert(2, &[]);
        graph.insert(3, &[1, 2]);

        assert!(!graph.deps_satisfied(3));
        assert!(graph.mark_completed(1).is_empty());
        let ready = graph.mark_completed(2);
        assert_eq!(ready, vec![3]);
        assert!(graph.deps_satisfied(3));
    }

    #[test]
    fn test_no_dependencies_always_satisfied() {
        let graph = DependencyGraph::new();
        assert!(graph.deps_satisfied(42));
    }

    #[test]
    fn test_doomed_propagates_to_dependents() {
        let mut graph = DependencyGraph::new();
        graph.insert(1, &[]);
        graph.insert(2, &[1]);
        graph.insert(3, &[2]);

        let doomed_dependents = graph.mark_doomed(1);
        assert_eq!(doomed_dependents, vec![2]);
        assert!(graph.is_doomed(1));
    }

    #[test]
    fn test_transitive_dependencies() {
        let mut graph = DependencyGraph::new();
        graph.insert(1, &[]);
        graph.insert(2, &[1]);
        graph.insert(3, &[2]);

        let deps = graph.transitive_dependencies(3);
        assert_eq!(deps.len(), 2);
        assert!(deps.contains(&1));
        assert!(deps.contains(&2));
    }

    #[test]
    fn test_remove_detaches_dependents() {
        let mut graph = DependencyGraph::new();
        graph.insert(1, &[]);
        graph.insert(2, &[1]);
        graph.remove(2);

        let ready = graph.mark_completed(1);
        assert!(ready.is_empty());
    }
}
