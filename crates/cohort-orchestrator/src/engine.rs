use crate::config::OrchestratorConfig;
use crate::coordinator::TeamCoordinator;
use crate::dependency::DependencyResolver;
use crate::router::ProviderRouter;
use crate::runtime::{ExecutionResult, TaskExecutionRuntime};
use crate::task_manager::TaskManager;
use cohort_agent::ProviderClientFactory;
use cohort_core::{CohortResult, MessageBroker, TaskStatus, TeamStatus};
use cohort_session::SessionManager;
use cohort_store::TeamStore;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// All orchestration components wired over one set of collaborators.
pub struct Orchestrator {
    store: Arc<dyn TeamStore>,
    resolver: Arc<DependencyResolver>,
    router: Arc<ProviderRouter>,
    tasks: Arc<TaskManager>,
    coordinator: Arc<TeamCoordinator>,
    runtime: Arc<TaskExecutionRuntime>,
}

impl Orchestrator {
    pub fn new(
        config: &OrchestratorConfig,
        store: Arc<dyn TeamStore>,
        broker: Arc<dyn MessageBroker>,
        sessions: Arc<dyn SessionManager>,
        clients: Arc<ProviderClientFactory>,
    ) -> CohortResult<Self> {
        let router = Arc::new(ProviderRouter::new(config.router.clone())?);
        let resolver = Arc::new(DependencyResolver::new(store.clone()));
        let tasks = Arc::new(TaskManager::new(
            store.clone(),
            resolver.clone(),
            router.clone(),
        ));
        let coordinator = Arc::new(TeamCoordinator::new(store.clone(), tasks.clone(), broker));
        let runtime = Arc::new(
            TaskExecutionRuntime::new(
                store.clone(),
                router.clone(),
                coordinator.clone(),
                sessions,
                clients,
            )
            .with_retry_policy(config.retry)
            .with_config(config.runtime.clone()),
        );
        Ok(Self {
            store,
            resolver,
            router,
            tasks,
            coordinator,
            runtime,
        })
    }

    pub fn resolver(&self) -> &Arc<DependencyResolver> {
        &self.resolver
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }

    pub fn tasks(&self) -> &Arc<TaskManager> {
        &self.tasks
    }

    pub fn coordinator(&self) -> &Arc<TeamCoordinator> {
        &self.coordinator
    }

    pub fn runtime(&self) -> &Arc<TaskExecutionRuntime> {
        &self.runtime
    }

    /// Validate the graph, start the team and execute assigned tasks wave by
    /// wave until nothing is left in progress.
    ///
    /// Each wave runs every in-progress task concurrently; completions
    /// schedule the next wave through the coordinator.
    pub async fn run_team(&self, team_id: Uuid) -> CohortResult<RunSummary> {
        let order = self.resolver.validate_team(team_id).await?;
        info!(team_id = %team_id, tasks = order.len(), "run: dependency graph valid");

        self.coordinator.start_team(team_id).await?;

        let mut executions = Vec::new();
        let mut seen = HashSet::new();
        loop {
            let wave: Vec<Uuid> = self
                .store
                .list_tasks(team_id)
                .await?
                .into_iter()
                .filter(|t| t.status == TaskStatus::InProgress && seen.insert(t.id))
                .map(|t| t.id)
                .collect();
            if wave.is_empty() {
                break;
            }
            info!(team_id = %team_id, tasks = wave.len(), "run: executing wave");

            let handles: Vec<_> = wave
                .iter()
                .map(|&task_id| {
                    let runtime = self.runtime.clone();
                    tokio::spawn(async move { runtime.execute_task(task_id).await })
                })
                .collect();

            for (joined, task_id) in join_all(handles).await.into_iter().zip(wave) {
                match joined {
                    Ok(Ok(result)) => executions.push(result),
                    Ok(Err(e)) => return Err(e),
                    Err(e) => error!(task_id = %task_id, error = %e, "run: execution task panicked"),
                }
            }
        }

        let tasks = self.store.list_tasks(team_id).await?;
        let stalled = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .count();
        if stalled > 0 {
            warn!(team_id = %team_id, stalled, "run: tasks left pending behind failed prerequisites");
        }
        let team = self
            .store
            .get_team(team_id)
            .await?
            .ok_or_else(|| cohort_core::CohortError::not_found("team", team_id))?;

        Ok(RunSummary {
            team_id,
            status: team.status,
            completed: team.completed_tasks,
            failed: team.failed_tasks,
            pending: stalled,
            total_cost_usd: team.total_cost_usd,
            executions,
        })
    }
}

/// Result of [`Orchestrator::run_team`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub team_id: Uuid,
    pub status: TeamStatus,
    pub completed: u32,
    pub failed: u32,
    /// Tasks that never became ready.
    pub pending: usize,
    pub total_cost_usd: f64,
    pub executions: Vec<ExecutionResult>,
}
