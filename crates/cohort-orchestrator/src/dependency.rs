use cohort_core::{CohortError, CohortResult, Task, TaskStatus};
use cohort_store::TeamStore;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Dependency graph keyed by node; each entry lists the node's prerequisites.
pub type DependencyGraph<K> = HashMap<K, Vec<K>>;

/// Answers ordering and readiness questions about a team's task graph.
///
/// The graph algorithms are pure functions over a [`DependencyGraph`]; the
/// readiness queries read edges and statuses from the [`TeamStore`].
pub struct DependencyResolver {
    store: Arc<dyn TeamStore>,
}

impl DependencyResolver {
    pub fn new(store: Arc<dyn TeamStore>) -> Self {
        Self { store }
    }

    /// Order the nodes so that every prerequisite comes before its dependents.
    ///
    /// Kahn's algorithm, consuming zero-indegree nodes in ascending key order
    /// so the result is deterministic. Prerequisites that are not keys of
    /// `dag` are nodes without prerequisites of their own. Any cycle fails
    /// the whole sort with [`CohortError::CircularDependency`].
    pub fn topological_sort<K>(dag: &DependencyGraph<K>) -> CohortResult<Vec<K>>
    where
        K: Ord + Clone + Hash + Display,
    {
        let mut prerequisites: BTreeMap<K, BTreeSet<K>> = BTreeMap::new();
        for (node, deps) in dag {
            prerequisites
                .entry(node.clone())
                .or_default()
                .extend(deps.iter().cloned());
            for dep in deps {
                prerequisites.entry(dep.clone()).or_default();
            }
        }

        let mut dependents: BTreeMap<K, Vec<K>> = BTreeMap::new();
        let mut indegree: BTreeMap<K, usize> = BTreeMap::new();
        for (node, deps) in &prerequisites {
            indegree.insert(node.clone(), deps.len());
            for dep in deps {
                dependents.entry(dep.clone()).or_default().push(node.clone());
            }
        }

        let mut ready: BTreeSet<K> = indegree
            .iter()
            .filter(|(_, &n)| n == 0)
            .map(|(node, _)| node.clone())
            .collect();
        let mut order = Vec::with_capacity(indegree.len());

        while let Some(node) = ready.pop_first() {
            if let Some(children) = dependents.get(&node) {
                for child in children {
                    if let Some(n) = indegree.get_mut(child) {
                        *n -= 1;
                        if *n == 0 {
                            ready.insert(child.clone());
                        }
                    }
                }
            }
            order.push(node);
        }

        if order.len() < indegree.len() {
            let stuck: Vec<String> = indegree
                .iter()
                .filter(|(_, &n)| n > 0)
                .map(|(node, _)| node.to_string())
                .collect();
            return Err(CohortError::CircularDependency(stuck.join(", ")));
        }
        Ok(order)
    }

    /// List the cycles of `dag` without failing.
    ///
    /// Each cycle is a closed path `[n0, n1, ..., n0]` following prerequisite
    /// edges, one per back edge met by a depth-first walk in key order.
    /// Empty for an acyclic graph.
    pub fn detect_cycles<K>(dag: &DependencyGraph<K>) -> Vec<Vec<K>>
    where
        K: Ord + Clone + Hash + Display,
    {
        let graph: BTreeMap<&K, BTreeSet<&K>> = dag
            .iter()
            .map(|(node, deps)| (node, deps.iter().collect()))
            .collect();
        let mut colour: HashMap<&K, u8> = HashMap::new();
        let mut path: Vec<&K> = Vec::new();
        let mut cycles = Vec::new();

        for &node in graph.keys() {
            dfs_cycles(node, &graph, &mut colour, &mut path, &mut cycles);
        }
        cycles
    }

    /// Prerequisites of `task` that are not completed.
    ///
    /// A prerequisite id the store cannot resolve counts as unmet.
    pub async fn unmet_dependencies(&self, task: &Task) -> CohortResult<Vec<Uuid>> {
        let deps = self.store.get_task_dependencies(task.id).await?;
        let mut unmet = Vec::new();
        for prerequisite in deps.blocked_by {
            let done = matches!(
                self.store.get_task(prerequisite).await?,
                Some(t) if t.status == TaskStatus::Completed
            );
            if !done {
                unmet.push(prerequisite);
            }
        }
        Ok(unmet)
    }

    /// True when every prerequisite of `task` is completed.
    pub async fn is_task_ready(&self, task: &Task) -> CohortResult<bool> {
        Ok(self.unmet_dependencies(task).await?.is_empty())
    }

    /// Pending tasks of the team whose prerequisites are all completed,
    /// highest priority first, then oldest first.
    pub async fn get_ready_tasks(&self, team_id: Uuid) -> CohortResult<Vec<Task>> {
        let tasks = self.store.list_tasks(team_id).await?;
        let status: HashMap<Uuid, TaskStatus> = tasks.iter().map(|t| (t.id, t.status)).collect();

        let mut ready = Vec::new();
        for task in tasks.iter().filter(|t| t.status == TaskStatus::Pending) {
            let deps = self.store.get_task_dependencies(task.id).await?;
            let mut satisfied = true;
            for prerequisite in &deps.blocked_by {
                let completed = match status.get(prerequisite) {
                    Some(s) => *s == TaskStatus::Completed,
                    // prerequisite owned by another team
                    None => matches!(
                        self.store.get_task(*prerequisite).await?,
                        Some(t) if t.status == TaskStatus::Completed
                    ),
                };
                if !completed {
                    satisfied = false;
                    break;
                }
            }
            if satisfied {
                ready.push(task.clone());
            }
        }

        ready.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        debug!(team_id = %team_id, ready = ready.len(), "resolver: ready tasks");
        Ok(ready)
    }

    /// The team's task graph as stored, keyed by task id.
    pub async fn dependency_graph(&self, team_id: Uuid) -> CohortResult<DependencyGraph<Uuid>> {
        let mut graph = HashMap::new();
        for task in self.store.list_tasks(team_id).await? {
            let deps = self.store.get_task_dependencies(task.id).await?;
            graph.insert(task.id, deps.blocked_by);
        }
        Ok(graph)
    }

    /// Execution order for the whole team, or the cycle error.
    pub async fn validate_team(&self, team_id: Uuid) -> CohortResult<Vec<Uuid>> {
        let graph = self.dependency_graph(team_id).await?;
        Self::topological_sort(&graph)
    }
}

fn dfs_cycles<'a, K>(
    node: &'a K,
    graph: &BTreeMap<&'a K, BTreeSet<&'a K>>,
    colour: &mut HashMap<&'a K, u8>,
    path: &mut Vec<&'a K>,
    cycles: &mut Vec<Vec<K>>,
) where
    K: Ord + Clone + Hash,
{
    match colour.get(node) {
        Some(1) => {
            // back edge: close the loop from the first occurrence on the path
            if let Some(start) = path.iter().position(|n| *n == node) {
                let mut cycle: Vec<K> = path[start..].iter().map(|n| (*n).clone()).collect();
                cycle.push(node.clone());
                cycles.push(cycle);
            }
            return;
        }
        Some(2) => return,
        _ => {}
    }

    colour.insert(node, 1);
    path.push(node);
    if let Some(deps) = graph.get(node) {
        for &dep in deps {
            dfs_cycles(dep, graph, colour, path, cycles);
        }
    }
    path.pop();
    colour.insert(node, 2);
}
