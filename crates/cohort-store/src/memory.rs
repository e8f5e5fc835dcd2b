use crate::store::TeamStore;
use async_trait::async_trait;
use cohort_core::{
    CohortError, CohortResult, Task, TaskDependencies, TaskPatch, Team, TeamPatch, Teammate,
    TeammatePatch,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A directed "must complete before" edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Edge {
    prerequisite: Uuid,
    dependent: Uuid,
}

#[derive(Default)]
struct Inner {
    teams: HashMap<Uuid, Team>,
    teammates: HashMap<Uuid, Teammate>,
    tasks: HashMap<Uuid, Task>,
    // insertion order, so listings are stable
    teammate_order: Vec<Uuid>,
    task_order: Vec<Uuid>,
    edges: Vec<Edge>,
}

/// In-memory [`TeamStore`]. Good enough for tests, the CLI simulator and
/// embedding hosts that keep their own durable copy.
///
/// Dependency edges are held once; `blocks` and `blocked_by` are both
/// derived from the same collection on read.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_team(&self, team: Team) -> Uuid {
        let id = team.id;
        self.inner.write().await.teams.insert(id, team);
        id
    }

    /// Add a teammate. The team must exist.
    pub async fn insert_teammate(&self, teammate: Teammate) -> CohortResult<Uuid> {
        let mut inner = self.inner.write().await;
        if !inner.teams.contains_key(&teammate.team_id) {
            return Err(CohortError::not_found("team", teammate.team_id));
        }
        let id = teammate.id;
        if inner.teammates.insert(id, teammate).is_none() {
            inner.teammate_order.push(id);
        }
        Ok(id)
    }

    /// Add a task and bump the team's `total_tasks` counter.
    pub async fn insert_task(&self, task: Task) -> CohortResult<Uuid> {
        let mut inner = self.inner.write().await;
        let team = inner
            .teams
            .get_mut(&task.team_id)
            .ok_or_else(|| CohortError::not_found("team", task.team_id))?;
        let id = task.id;
        team.total_tasks += 1;
        if inner.tasks.insert(id, task).is_none() {
            inner.task_order.push(id);
        }
        Ok(id)
    }

    /// Record that `task_id` cannot start before `prerequisite_id` completes.
    ///
    /// Both tasks must exist. Adding the same edge twice is a no-op. Cycles
    /// are not rejected here; the dependency resolver reports them.
    pub async fn add_dependency(&self, task_id: Uuid, prerequisite_id: Uuid) -> CohortResult<()> {
        let mut inner = self.inner.write().await;
        for id in [task_id, prerequisite_id] {
            if !inner.tasks.contains_key(&id) {
                return Err(CohortError::not_found("task", id));
            }
        }
        let edge = Edge {
            prerequisite: prerequisite_id,
            dependent: task_id,
        };
        if !inner.edges.contains(&edge) {
            inner.edges.push(edge);
        }
        Ok(())
    }

    /// Number of stored edges.
    pub async fn dependency_count(&self) -> usize {
        self.inner.read().await.edges.len()
    }
}

#[async_trait]
impl TeamStore for MemoryStore {
    async fn get_task(&self, id: Uuid) -> CohortResult<Option<Task>> {
        Ok(self.inner.read().await.tasks.get(&id).cloned())
    }

    async fn update_task(&self, id: Uuid, patch: TaskPatch) -> CohortResult<Option<Task>> {
        let mut inner = self.inner.write().await;
        Ok(inner.tasks.get_mut(&id).map(|task| {
            patch.apply(task);
            task.clone()
        }))
    }

    async fn list_tasks(&self, team_id: Uuid) -> CohortResult<Vec<Task>> {
        let inner = self.inner.read().await;
        Ok(inner
            .task_order
            .iter()
            .filter_map(|id| inner.tasks.get(id))
            .filter(|t| t.team_id == team_id)
            .cloned()
            .collect())
    }

    async fn get_team(&self, id: Uuid) -> CohortResult<Option<Team>> {
        Ok(self.inner.read().await.teams.get(&id).cloned())
    }

    async fn update_team(&self, id: Uuid, patch: TeamPatch) -> CohortResult<Option<Team>> {
        let mut inner = self.inner.write().await;
        Ok(inner.teams.get_mut(&id).map(|team| {
            patch.apply(team);
            team.clone()
        }))
    }

    async fn get_teammate(&self, id: Uuid) -> CohortResult<Option<Teammate>> {
        Ok(self.inner.read().await.teammates.get(&id).cloned())
    }

    async fn update_teammate(
        &self,
        id: Uuid,
        patch: TeammatePatch,
    ) -> CohortResult<Option<Teammate>> {
        let mut inner = self.inner.write().await;
        Ok(inner.teammates.get_mut(&id).map(|mate| {
            patch.apply(mate);
            mate.clone()
        }))
    }

    async fn list_teammates(&self, team_id: Uuid) -> CohortResult<Vec<Teammate>> {
        let inner = self.inner.read().await;
        Ok(inner
            .teammate_order
            .iter()
            .filter_map(|id| inner.teammates.get(id))
            .filter(|m| m.team_id == team_id)
            .cloned()
            .collect())
    }

    async fn get_task_dependencies(&self, id: Uuid) -> CohortResult<TaskDependencies> {
        let inner = self.inner.read().await;
        let mut deps = TaskDependencies::default();
        for edge in &inner.edges {
            if edge.dependent == id {
                deps.blocked_by.push(edge.prerequisite);
            }
            if edge.prerequisite == id {
                deps.blocks.push(edge.dependent);
            }
        }
        Ok(deps)
    }
}
