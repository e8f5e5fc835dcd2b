use crate::task_manager::TaskManager;
use chrono::Utc;
use cohort_agent::RunResponse;
use cohort_core::{
    CohortError, CohortResult, LifecycleMessage, MessageBroker, MessageKind, Task, TaskPatch,
    TaskStatus, Team, TeamPatch, TeamStatus, TeammatePatch, TeammateStatus,
};
use cohort_store::TeamStore;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};
use uuid::Uuid;

/// What a successful run produced, as recorded on the task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskOutcome {
    pub result: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

impl From<&RunResponse> for TaskOutcome {
    fn from(response: &RunResponse) -> Self {
        Self {
            result: response.output.clone(),
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            cost_usd: response.cost_usd,
        }
    }
}

/// How a teammate's current task ended.
enum Release<'a> {
    Completed(&'a TaskOutcome),
    Failed,
    Cancelled,
}

/// Team-level control: start and pause, bulk scheduling, and recording of
/// terminal task outcomes with their lifecycle messages.
///
/// Scheduling and terminal bookkeeping for one team run under that team's
/// lock, so concurrent executions never lose counter updates.
pub struct TeamCoordinator {
    store: Arc<dyn TeamStore>,
    tasks: Arc<TaskManager>,
    broker: Arc<dyn MessageBroker>,
    team_locks: parking_lot::Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl TeamCoordinator {
    pub fn new(
        store: Arc<dyn TeamStore>,
        tasks: Arc<TaskManager>,
        broker: Arc<dyn MessageBroker>,
    ) -> Self {
        Self {
            store,
            tasks,
            broker,
            team_locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    pub fn task_manager(&self) -> &Arc<TaskManager> {
        &self.tasks
    }

    async fn load_team(&self, team_id: Uuid) -> CohortResult<Team> {
        self.store
            .get_team(team_id)
            .await?
            .ok_or_else(|| CohortError::not_found("team", team_id))
    }

    async fn load_task(&self, task_id: Uuid) -> CohortResult<Task> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| CohortError::not_found("task", task_id))
    }

    async fn patch_team(&self, team_id: Uuid, patch: TeamPatch) -> CohortResult<Team> {
        self.store
            .update_team(team_id, patch)
            .await?
            .ok_or_else(|| CohortError::not_found("team", team_id))
    }

    async fn patch_task(&self, task_id: Uuid, patch: TaskPatch) -> CohortResult<Task> {
        self.store
            .update_task(task_id, patch)
            .await?
            .ok_or_else(|| CohortError::not_found("task", task_id))
    }

    async fn notify(&self, message: LifecycleMessage) {
        let kind = message.kind;
        if let Err(e) = self.broker.send_message(message).await {
            warn!(kind = %kind, error = %e, "message delivery failed");
        }
    }

    async fn announce(&self, team_id: Uuid, text: &str, metadata: serde_json::Value) {
        if let Err(e) = self.broker.broadcast_message(team_id, text, metadata).await {
            warn!(team_id = %team_id, error = %e, "broadcast delivery failed");
        }
    }

    /// Activate a draft or paused team and schedule whatever is ready.
    pub async fn start_team(&self, team_id: Uuid) -> CohortResult<Team> {
        let team = self.load_team(team_id).await?;
        if !matches!(team.status, TeamStatus::Draft | TeamStatus::Paused) {
            return Err(CohortError::InvalidState(format!(
                "team '{}' is {}, only draft or paused teams can start",
                team.name, team.status
            )));
        }

        self.patch_team(
            team_id,
            TeamPatch {
                status: Some(TeamStatus::Active),
                started_at: team.started_at.is_none().then(Utc::now),
                ..TeamPatch::default()
            },
        )
        .await?;
        info!(team_id = %team_id, team = %team.name, "team started");

        let scheduled = self.schedule_all_ready_tasks(team_id).await?;
        self.announce(team_id, "Team started", json!({ "scheduled": scheduled }))
            .await;
        self.load_team(team_id).await
    }

    /// Stop scheduling for an active team. Running tasks are left alone.
    pub async fn pause_team(&self, team_id: Uuid) -> CohortResult<Team> {
        let team = self.load_team(team_id).await?;
        if team.status != TeamStatus::Active {
            return Err(CohortError::InvalidState(format!(
                "team '{}' is {}, only active teams can pause",
                team.name, team.status
            )));
        }
        let paused = self
            .patch_team(team_id, TeamPatch::status(TeamStatus::Paused))
            .await?;
        info!(team_id = %team_id, team = %team.name, "team paused");
        self.announce(team_id, "Team paused", json!({})).await;
        Ok(paused)
    }

    async fn lock_team(&self, team_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self.team_locks.lock().entry(team_id).or_default().clone();
        lock.lock_owned().await
    }

    /// Take the lock of the task's team, then read the task again under it.
    async fn lock_task(&self, task_id: Uuid) -> CohortResult<(Task, OwnedMutexGuard<()>)> {
        let team_id = self.load_task(task_id).await?.team_id;
        let guard = self.lock_team(team_id).await;
        let task = self.load_task(task_id).await?;
        Ok((task, guard))
    }

    /// Assign ready tasks to idle teammates until either runs out.
    ///
    /// Returns the number of tasks assigned; 0 for a team that is not
    /// active. Concurrent calls for one team run one after another.
    pub async fn schedule_all_ready_tasks(&self, team_id: Uuid) -> CohortResult<usize> {
        let _guard = self.lock_team(team_id).await;
        self.schedule_locked(team_id).await
    }

    /// Caller holds the team lock.
    async fn schedule_locked(&self, team_id: Uuid) -> CohortResult<usize> {
        let team = self.load_team(team_id).await?;
        if team.status != TeamStatus::Active {
            return Ok(0);
        }

        let mut scheduled = 0;
        while let Some(assignment) = self
            .tasks
            .get_next_task(team_id, team.task_allocation_strategy)
            .await?
        {
            let teammate = assignment.teammate;
            let task = self.tasks.assign_task(assignment.task.id, teammate.id).await?;
            self.notify(LifecycleMessage::task(
                MessageKind::TaskAssigned,
                team_id,
                task.id,
                format!("Task '{}' assigned to {}", task.subject, teammate.name),
                json!({
                    "teammate_id": teammate.id,
                    "teammate": teammate.name,
                    "provider": task.provider,
                    "model": task.model,
                }),
            ))
            .await;
            scheduled += 1;
        }

        if scheduled > 0 {
            info!(team_id = %team_id, scheduled, "tasks scheduled");
        }
        Ok(scheduled)
    }

    async fn release_teammate(&self, task: &Task, how: Release<'_>) -> CohortResult<()> {
        let Some(teammate_id) = task.assigned_to else {
            return Ok(());
        };
        let Some(teammate) = self.store.get_teammate(teammate_id).await? else {
            warn!(task_id = %task.id, teammate_id = %teammate_id, "assigned teammate is gone");
            return Ok(());
        };

        let mut stats = teammate.stats.clone();
        match how {
            Release::Completed(outcome) => {
                stats.tasks_completed += 1;
                stats.input_tokens += outcome.input_tokens;
                stats.output_tokens += outcome.output_tokens;
                stats.cost_usd += outcome.cost_usd;
            }
            Release::Failed => stats.tasks_failed += 1,
            Release::Cancelled => {}
        }

        let holds_task = teammate.current_task_id == Some(task.id);
        let patch = TeammatePatch {
            status: holds_task.then_some(TeammateStatus::Idle),
            current_task_id: holds_task.then_some(None),
            stats: (stats != teammate.stats).then_some(stats),
        };
        self.store.update_teammate(teammate_id, patch).await?;
        Ok(())
    }

    fn ensure_open(task: &Task) -> CohortResult<()> {
        if task.status.is_terminal() {
            return Err(CohortError::InvalidState(format!(
                "task {} is already {}",
                task.id, task.status
            )));
        }
        Ok(())
    }

    /// Record a successful run and schedule whatever it unblocked.
    pub async fn handle_task_completion(
        &self,
        task_id: Uuid,
        outcome: TaskOutcome,
    ) -> CohortResult<Task> {
        let (task, guard) = self.lock_task(task_id).await?;
        Self::ensure_open(&task)?;

        let completed = self
            .patch_task(
                task_id,
                TaskPatch {
                    status: Some(TaskStatus::Completed),
                    completed_at: Some(Utc::now()),
                    input_tokens: Some(task.input_tokens + outcome.input_tokens),
                    output_tokens: Some(task.output_tokens + outcome.output_tokens),
                    cost_usd: Some(task.cost_usd + outcome.cost_usd),
                    result: Some(outcome.result.clone()),
                    error: Some(None),
                    ..TaskPatch::default()
                },
            )
            .await?;
        self.release_teammate(&task, Release::Completed(&outcome))
            .await?;

        let team = self.load_team(task.team_id).await?;
        self.patch_team(
            team.id,
            TeamPatch {
                completed_tasks: Some(team.completed_tasks + 1),
                total_cost_usd: Some(team.total_cost_usd + outcome.cost_usd),
                ..TeamPatch::default()
            },
        )
        .await?;
        drop(guard);

        info!(task_id = %task_id, cost_usd = outcome.cost_usd, "task completed");
        self.notify(LifecycleMessage::task(
            MessageKind::TaskCompleted,
            task.team_id,
            task_id,
            format!("Task '{}' completed", task.subject),
            json!({
                "input_tokens": outcome.input_tokens,
                "output_tokens": outcome.output_tokens,
                "cost_usd": outcome.cost_usd,
            }),
        ))
        .await;

        self.after_terminal(task.team_id).await?;
        Ok(completed)
    }

    /// Record a terminal failure. Retrying is the runtime's business; a
    /// failed task stays failed.
    pub async fn handle_task_failure(&self, task_id: Uuid, error: &str) -> CohortResult<Task> {
        let (task, guard) = self.lock_task(task_id).await?;
        Self::ensure_open(&task)?;

        let failed = self
            .patch_task(
                task_id,
                TaskPatch {
                    status: Some(TaskStatus::Failed),
                    completed_at: Some(Utc::now()),
                    error: Some(Some(error.to_string())),
                    ..TaskPatch::default()
                },
            )
            .await?;
        self.release_teammate(&task, Release::Failed).await?;

        let team = self.load_team(task.team_id).await?;
        self.patch_team(
            team.id,
            TeamPatch {
                failed_tasks: Some(team.failed_tasks + 1),
                ..TeamPatch::default()
            },
        )
        .await?;
        drop(guard);

        warn!(task_id = %task_id, error, "task failed");
        self.notify(LifecycleMessage::task(
            MessageKind::TaskFailed,
            task.team_id,
            task_id,
            format!("Task '{}' failed", task.subject),
            json!({ "error": error }),
        ))
        .await;

        self.after_terminal(task.team_id).await?;
        Ok(failed)
    }

    /// Mark a task cancelled. A pending task is settled at once; a running
    /// one is released by the runtime before its next attempt.
    ///
    /// An in-progress task that no runtime is executing keeps its teammate
    /// busy until [`Self::handle_task_cancelled`] is called for it.
    pub async fn cancel_task(&self, task_id: Uuid) -> CohortResult<Task> {
        let (task, guard) = self.lock_task(task_id).await?;
        Self::ensure_open(&task)?;
        let cancelled = self
            .patch_task(
                task_id,
                TaskPatch {
                    status: Some(TaskStatus::Cancelled),
                    completed_at: Some(Utc::now()),
                    ..TaskPatch::default()
                },
            )
            .await?;
        drop(guard);
        info!(task_id = %task_id, previous = %task.status, "task cancelled");

        if task.status == TaskStatus::Pending {
            self.handle_task_cancelled(task_id).await
        } else {
            Ok(cancelled)
        }
    }

    /// Release the teammate of a cancelled task and move on. The task keeps
    /// its `cancelled` status.
    pub async fn handle_task_cancelled(&self, task_id: Uuid) -> CohortResult<Task> {
        let (task, guard) = self.lock_task(task_id).await?;
        if task.status != TaskStatus::Cancelled {
            return Err(CohortError::InvalidState(format!(
                "task {task_id} is {}, not cancelled",
                task.status
            )));
        }
        self.release_teammate(&task, Release::Cancelled).await?;
        drop(guard);

        self.notify(LifecycleMessage::task(
            MessageKind::TaskCancelled,
            task.team_id,
            task_id,
            format!("Task '{}' cancelled", task.subject),
            json!({}),
        ))
        .await;

        self.after_terminal(task.team_id).await?;
        Ok(task)
    }

    async fn after_terminal(&self, team_id: Uuid) -> CohortResult<()> {
        let _guard = self.lock_team(team_id).await;
        if self.complete_team_if_done(team_id).await? {
            return Ok(());
        }
        self.schedule_locked(team_id).await?;
        Ok(())
    }

    /// Close an active team once every task is terminal. Caller holds the
    /// team lock.
    async fn complete_team_if_done(&self, team_id: Uuid) -> CohortResult<bool> {
        let team = self.load_team(team_id).await?;
        if team.status != TeamStatus::Active {
            return Ok(false);
        }
        let tasks = self.store.list_tasks(team_id).await?;
        if tasks.is_empty() || !tasks.iter().all(|t| t.status.is_terminal()) {
            return Ok(false);
        }

        let done = self
            .patch_team(team_id, TeamPatch::status(TeamStatus::Completed))
            .await?;
        info!(
            team_id = %team_id,
            completed = done.completed_tasks,
            failed = done.failed_tasks,
            "team completed"
        );
        self.announce(
            team_id,
            "Team completed",
            json!({
                "completed_tasks": done.completed_tasks,
                "failed_tasks": done.failed_tasks,
                "total_cost_usd": done.total_cost_usd,
            }),
        )
        .await;
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::dependency::DependencyResolver;
    use crate::router::{ProviderRouter, RouterConfig};
    use cohort_core::{AllocationStrategy, InMemoryBroker, Teammate, TeammateStats};
    use cohort_store::MemoryStore;

    struct Harness {
        store: Arc<MemoryStore>,
        broker: Arc<InMemoryBroker>,
        coordinator: TeamCoordinator,
        team_id: Uuid,
    }

    async fn harness(strategy: AllocationStrategy) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let team_id = store
            .insert_team(Team::new("squad").with_strategy(strategy))
            .await;
        let broker = Arc::new(InMemoryBroker::new());
        let resolver = Arc::new(DependencyResolver::new(store.clone()));
        let router = Arc::new(ProviderRouter::new(RouterConfig::default()).unwrap());
        let tasks = Arc::new(TaskManager::new(store.clone(), resolver, router));
        let coordinator = TeamCoordinator::new(store.clone(), tasks, broker.clone());
        Harness {
            store,
            broker,
            coordinator,
            team_id,
        }
    }

    impl Harness {
        async fn teammate(&self, name: &str) -> Uuid {
            self.store
                .insert_teammate(Teammate::new(self.team_id, name, "generalist"))
                .await
                .unwrap()
        }

        async fn task(&self, subject: &str) -> Uuid {
            self.store
                .insert_task(Task::new(self.team_id, subject, ""))
                .await
                .unwrap()
        }

        async fn status(&self, task_id: Uuid) -> TaskStatus {
            self.store.get_task(task_id).await.unwrap().unwrap().status
        }
    }

    #[tokio::test]
    async fn test_start_team_schedules_and_broadcasts() {
        let h = harness(AllocationStrategy::RoundRobin).await;
        h.teammate("a").await;
        h.teammate("b").await;
        let ids = [h.task("one").await, h.task("two").await, h.task("three").await];

        let team = h.coordinator.start_team(h.team_id).await.unwrap();
        assert_eq!(team.status, TeamStatus::Active);
        assert!(team.started_at.is_some());

        let mut statuses = Vec::new();
        for id in ids {
            statuses.push(h.status(id).await);
        }
        let in_progress = statuses
            .iter()
            .filter(|s| **s == TaskStatus::InProgress)
            .count();
        assert_eq!(in_progress, 2);
        assert_eq!(
            statuses.iter().filter(|s| **s == TaskStatus::Pending).count(),
            1
        );
        assert_eq!(h.broker.count(MessageKind::TaskAssigned).await, 2);

        let messages = h.broker.messages().await;
        let last = messages.last().unwrap();
        assert_eq!(last.kind, MessageKind::Broadcast);
        assert_eq!(last.text, "Team started");
        assert_eq!(last.payload["scheduled"], 2);
    }

    #[tokio::test]
    async fn test_start_team_requires_draft_or_paused() {
        let h = harness(AllocationStrategy::RoundRobin).await;
        h.coordinator.start_team(h.team_id).await.unwrap();
        assert!(matches!(
            h.coordinator.start_team(h.team_id).await,
            Err(CohortError::InvalidState(_))
        ));
        assert!(matches!(
            h.coordinator.start_team(Uuid::new_v4()).await,
            Err(CohortError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_pause_stops_scheduling_and_resume_keeps_started_at() {
        let h = harness(AllocationStrategy::RoundRobin).await;
        h.teammate("a").await;
        let first = h.task("first").await;
        let second = h.task("second").await;

        let started = h.coordinator.start_team(h.team_id).await.unwrap();
        let started_at = started.started_at;
        h.coordinator.pause_team(h.team_id).await.unwrap();
        assert!(matches!(
            h.coordinator.pause_team(h.team_id).await,
            Err(CohortError::InvalidState(_))
        ));

        // finishing the running task frees the teammate, but nothing is scheduled
        h.coordinator
            .handle_task_completion(first, TaskOutcome::default())
            .await
            .unwrap();
        assert_eq!(h.status(second).await, TaskStatus::Pending);
        assert_eq!(h.coordinator.schedule_all_ready_tasks(h.team_id).await.unwrap(), 0);

        let resumed = h.coordinator.start_team(h.team_id).await.unwrap();
        assert_eq!(resumed.started_at, started_at);
        assert_eq!(h.status(second).await, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn test_completion_updates_stats_and_cascades() {
        let h = harness(AllocationStrategy::RoundRobin).await;
        let alice = h.teammate("alice").await;
        let design = h.task("design").await;
        let build = h.task("build").await;
        h.store.add_dependency(build, design).await.unwrap();

        h.coordinator.start_team(h.team_id).await.unwrap();
        assert_eq!(h.status(build).await, TaskStatus::Pending);

        let outcome = TaskOutcome {
            result: Some("spec written".into()),
            input_tokens: 100,
            output_tokens: 40,
            cost_usd: 0.25,
        };
        let done = h
            .coordinator
            .handle_task_completion(design, outcome)
            .await
            .unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.result.as_deref(), Some("spec written"));
        assert!(done.completed_at.is_some());

        // the unblocked task went straight to the freed teammate
        assert_eq!(h.status(build).await, TaskStatus::InProgress);
        let mate = h.store.get_teammate(alice).await.unwrap().unwrap();
        assert_eq!(mate.current_task_id, Some(build));
        assert_eq!(mate.stats.tasks_completed, 1);
        assert_eq!(mate.stats.input_tokens, 100);

        let team = h.store.get_team(h.team_id).await.unwrap().unwrap();
        assert_eq!(team.completed_tasks, 1);
        assert!((team.total_cost_usd - 0.25).abs() < 1e-9);
        assert_eq!(h.broker.count(MessageKind::TaskCompleted).await, 1);
        assert_eq!(h.broker.count(MessageKind::TaskAssigned).await, 2);
    }

    #[tokio::test]
    async fn test_failure_is_terminal_and_team_completes() {
        let h = harness(AllocationStrategy::LeastBusy).await;
        let alice = h.teammate("alice").await;
        let only = h.task("only").await;
        h.coordinator.start_team(h.team_id).await.unwrap();

        let failed = h
            .coordinator
            .handle_task_failure(only, "quota exceeded")
            .await
            .unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("quota exceeded"));

        let mate = h.store.get_teammate(alice).await.unwrap().unwrap();
        assert!(mate.is_idle());
        assert_eq!(mate.stats.tasks_failed, 1);

        let team = h.store.get_team(h.team_id).await.unwrap().unwrap();
        assert_eq!(team.status, TeamStatus::Completed);
        assert_eq!(team.failed_tasks, 1);
        assert_eq!(h.broker.count(MessageKind::TaskFailed).await, 1);
        let last = h.broker.messages().await.pop().unwrap();
        assert_eq!(last.text, "Team completed");

        // terminal tasks cannot be settled twice
        assert!(matches!(
            h.coordinator
                .handle_task_completion(only, TaskOutcome::default())
                .await,
            Err(CohortError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_pending_and_running_tasks() {
        let h = harness(AllocationStrategy::RoundRobin).await;
        let alice = h.teammate("alice").await;
        let running = h.task("running").await;
        let queued = h.task("queued").await;
        h.coordinator.start_team(h.team_id).await.unwrap();
        assert_eq!(h.status(running).await, TaskStatus::InProgress);

        h.coordinator.cancel_task(queued).await.unwrap();
        assert_eq!(h.status(queued).await, TaskStatus::Cancelled);
        assert_eq!(h.broker.count(MessageKind::TaskCancelled).await, 1);

        h.coordinator.cancel_task(running).await.unwrap();
        // still held until the runtime observes the cancellation
        let mate = h.store.get_teammate(alice).await.unwrap().unwrap();
        assert_eq!(mate.current_task_id, Some(running));

        h.coordinator.handle_task_cancelled(running).await.unwrap();
        let mate = h.store.get_teammate(alice).await.unwrap().unwrap();
        assert!(mate.is_idle());
        assert_eq!(mate.stats, TeammateStats::default());

        let team = h.store.get_team(h.team_id).await.unwrap().unwrap();
        assert_eq!(team.status, TeamStatus::Completed);
    }

    #[tokio::test]
    async fn test_concurrent_scheduling_never_double_assigns() {
        let h = Arc::new(harness(AllocationStrategy::RoundRobin).await);
        for name in ["a", "b", "c"] {
            h.teammate(name).await;
        }
        for i in 0..6 {
            h.task(&format!("task {i}")).await;
        }
        h.store
            .update_team(h.team_id, TeamPatch::status(TeamStatus::Active))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let h = h.clone();
            handles.push(tokio::spawn(async move {
                h.coordinator.schedule_all_ready_tasks(h.team_id).await.unwrap()
            }));
        }
        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }
        assert_eq!(total, 3);
        assert_eq!(h.broker.count(MessageKind::TaskAssigned).await, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_terminal_outcomes_settle_once() {
        let h = Arc::new(harness(AllocationStrategy::RoundRobin).await);
        let mut tasks = Vec::new();
        for i in 0..8 {
            h.teammate(&format!("mate {i}")).await;
            tasks.push(h.task(&format!("task {i}")).await);
        }
        h.coordinator.start_team(h.team_id).await.unwrap();

        // every task is completed twice and failed once, all at the same time
        let mut handles = Vec::new();
        for &task_id in &tasks {
            for attempt in 0..3 {
                let h = h.clone();
                handles.push(tokio::spawn(async move {
                    if attempt == 2 {
                        h.coordinator
                            .handle_task_failure(task_id, "timed out")
                            .await
                            .is_ok()
                    } else {
                        let outcome = TaskOutcome {
                            cost_usd: 0.25,
                            ..TaskOutcome::default()
                        };
                        h.coordinator
                            .handle_task_completion(task_id, outcome)
                            .await
                            .is_ok()
                    }
                }));
            }
        }
        let mut settled = 0;
        for handle in handles {
            if handle.await.unwrap() {
                settled += 1;
            }
        }
        assert_eq!(settled, tasks.len());

        let team = h.store.get_team(h.team_id).await.unwrap().unwrap();
        assert_eq!(team.status, TeamStatus::Completed);
        assert_eq!((team.completed_tasks + team.failed_tasks) as usize, tasks.len());
        let completed = f64::from(team.completed_tasks);
        assert!((team.total_cost_usd - completed * 0.25).abs() < 1e-9);
        assert_eq!(
            h.broker.count(MessageKind::TaskCompleted).await
                + h.broker.count(MessageKind::TaskFailed).await,
            tasks.len()
        );
    }
}
