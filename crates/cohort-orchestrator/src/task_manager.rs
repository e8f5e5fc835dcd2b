use crate::allocator::TaskAllocator;
use crate::dependency::DependencyResolver;
use crate::router::ProviderRouter;
use chrono::Utc;
use cohort_core::{
    AllocationStrategy, CohortError, CohortResult, Task, TaskPatch, TaskStatus, Teammate,
    TeammatePatch, TeammateStatus,
};
use cohort_store::TeamStore;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// A ready task paired with the teammate that should run it.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub task: Task,
    pub teammate: Teammate,
}

/// Pairs ready tasks with idle teammates and moves tasks into progress.
pub struct TaskManager {
    store: Arc<dyn TeamStore>,
    resolver: Arc<DependencyResolver>,
    router: Arc<ProviderRouter>,
    allocator: TaskAllocator,
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(", ")
}

impl TaskManager {
    pub fn new(
        store: Arc<dyn TeamStore>,
        resolver: Arc<DependencyResolver>,
        router: Arc<ProviderRouter>,
    ) -> Self {
        Self {
            store,
            resolver,
            router,
            allocator: TaskAllocator::new(),
        }
    }

    pub fn allocator(&self) -> &TaskAllocator {
        &self.allocator
    }

    async fn load_task(&self, task_id: Uuid) -> CohortResult<Task> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| CohortError::not_found("task", task_id))
    }

    /// `DependencyNotSatisfied` naming every prerequisite not yet completed.
    pub(crate) async fn ensure_ready(&self, task: &Task) -> CohortResult<()> {
        let unmet = self.resolver.unmet_dependencies(task).await?;
        if unmet.is_empty() {
            return Ok(());
        }
        Err(CohortError::DependencyNotSatisfied {
            task_id: task.id.to_string(),
            pending: join_ids(&unmet),
        })
    }

    /// Give `task_id` to `teammate_id` and move the task into progress.
    ///
    /// The provider and model come from the router unless the task already
    /// names a provider.
    pub async fn assign_task(&self, task_id: Uuid, teammate_id: Uuid) -> CohortResult<Task> {
        let task = self.load_task(task_id).await?;
        let teammate = self
            .store
            .get_teammate(teammate_id)
            .await?
            .ok_or_else(|| CohortError::not_found("teammate", teammate_id))?;

        if task.status != TaskStatus::Pending {
            return Err(CohortError::InvalidState(format!(
                "task {task_id} is {}, only pending tasks can be assigned",
                task.status
            )));
        }
        if teammate.status == TeammateStatus::Offline {
            return Err(CohortError::InvalidState(format!(
                "teammate {} is offline",
                teammate.name
            )));
        }
        if !teammate.is_idle() {
            let current = teammate
                .current_task_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "another task".into());
            return Err(CohortError::InvalidState(format!(
                "teammate {} is busy with {current}",
                teammate.name
            )));
        }
        self.ensure_ready(&task).await?;

        let selection = match &task.provider {
            Some(provider) => {
                let mut selection = self.router.selection_for(provider);
                if let Some(model) = &task.model {
                    selection.model.clone_from(model);
                }
                selection
            }
            None => self.router.select_provider(&task),
        };

        self.store
            .update_teammate(
                teammate_id,
                TeammatePatch {
                    status: Some(TeammateStatus::Busy),
                    current_task_id: Some(Some(task_id)),
                    ..TeammatePatch::default()
                },
            )
            .await?
            .ok_or_else(|| CohortError::not_found("teammate", teammate_id))?;

        let updated = self
            .store
            .update_task(
                task_id,
                TaskPatch {
                    status: Some(TaskStatus::InProgress),
                    assigned_to: Some(Some(teammate_id)),
                    provider: Some(Some(selection.provider.clone())),
                    model: Some(Some(selection.model.clone())),
                    started_at: Some(Utc::now()),
                    ..TaskPatch::default()
                },
            )
            .await?
            .ok_or_else(|| CohortError::not_found("task", task_id))?;

        info!(
            task_id = %task_id,
            teammate = %teammate.name,
            provider = %selection.provider,
            model = %selection.model,
            "task assigned"
        );
        Ok(updated)
    }

    /// Next pairing for the team, or `None` when there is no ready task or
    /// no idle teammate.
    pub async fn get_next_task(
        &self,
        team_id: Uuid,
        strategy: AllocationStrategy,
    ) -> CohortResult<Option<Assignment>> {
        let Some(task) = self.resolver.get_ready_tasks(team_id).await?.into_iter().next() else {
            debug!(team_id = %team_id, "no ready task");
            return Ok(None);
        };
        let roster = self.store.list_teammates(team_id).await?;
        let Some(idx) = self.allocator.pick(team_id, strategy, &task, &roster) else {
            debug!(team_id = %team_id, "no idle teammate");
            return Ok(None);
        };
        let teammate = roster.into_iter().nth(idx).ok_or_else(|| {
            CohortError::InvalidState(format!("allocator picked roster slot {idx} out of range"))
        })?;
        Ok(Some(Assignment { task, teammate }))
    }

    /// Move a task into progress without assigning it.
    pub async fn start_task(&self, task_id: Uuid) -> CohortResult<Task> {
        let task = self.load_task(task_id).await?;
        if task.status.is_terminal() {
            return Err(CohortError::InvalidState(format!(
                "task {task_id} is already {}",
                task.status
            )));
        }
        self.ensure_ready(&task).await?;

        let updated = self
            .store
            .update_task(
                task_id,
                TaskPatch {
                    status: Some(TaskStatus::InProgress),
                    started_at: Some(Utc::now()),
                    ..TaskPatch::default()
                },
            )
            .await?
            .ok_or_else(|| CohortError::not_found("task", task_id))?;
        info!(task_id = %task_id, "task started");
        Ok(updated)
    }
}
