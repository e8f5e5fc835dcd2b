use async_trait::async_trait;
use cohort_core::{
    CohortResult, Task, TaskDependencies, TaskPatch, Team, TeamPatch, Teammate, TeammatePatch,
};
use uuid::Uuid;

/// CRUD gateway for team, teammate and task records.
///
/// Lookups return `Ok(None)` for unknown ids; deciding whether that is an
/// error belongs to the caller. Updates are last-write-wins.
#[async_trait]
pub trait TeamStore: Send + Sync {
    async fn get_task(&self, id: Uuid) -> CohortResult<Option<Task>>;
    async fn update_task(&self, id: Uuid, patch: TaskPatch) -> CohortResult<Option<Task>>;
    async fn list_tasks(&self, team_id: Uuid) -> CohortResult<Vec<Task>>;

    async fn get_team(&self, id: Uuid) -> CohortResult<Option<Team>>;
    async fn update_team(&self, id: Uuid, patch: TeamPatch) -> CohortResult<Option<Team>>;

    async fn get_teammate(&self, id: Uuid) -> CohortResult<Option<Teammate>>;
    async fn update_teammate(
        &self,
        id: Uuid,
        patch: TeammatePatch,
    ) -> CohortResult<Option<Teammate>>;
    /// Teammates of a team in roster (insertion) order.
    async fn list_teammates(&self, team_id: Uuid) -> CohortResult<Vec<Teammate>>;

    /// Both edge directions for a task, in the order the edges were added.
    async fn get_task_dependencies(&self, id: Uuid) -> CohortResult<TaskDependencies>;
}
