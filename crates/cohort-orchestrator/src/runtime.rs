use crate::coordinator::{TaskOutcome, TeamCoordinator};
use crate::router::{ProviderRouter, ProviderSelection};
use cohort_agent::{ProviderClientFactory, RetryPolicy, RunRequest, RunResponse};
use cohort_core::{CohortError, CohortResult, Task, TaskPatch, TaskStatus};
use cohort_session::SessionManager;
use cohort_store::TeamStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Type alias for the injectable sleep function used in tests.
#[cfg(test)]
type SleepFn = Box<
    dyn Fn(u64) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync,
>;

/// `[runtime]` configuration section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Probe the provider before every attempt and skip the run when it
    /// reports unhealthy.
    #[serde(default)]
    pub health_check: bool,
}

/// Outcome of [`TaskExecutionRuntime::execute_task`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub task_id: Uuid,
    pub success: bool,
    /// Provider of the last attempt.
    pub provider: String,
    pub model: String,
    pub attempts: u32,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecutionResult {
    fn succeeded(
        task_id: Uuid,
        selection: &ProviderSelection,
        attempts: u32,
        output: Option<String>,
    ) -> Self {
        Self {
            task_id,
            success: true,
            provider: selection.provider.clone(),
            model: selection.model.clone(),
            attempts,
            output,
            error: None,
        }
    }

    fn failed(task_id: Uuid, selection: &ProviderSelection, attempts: u32, error: String) -> Self {
        Self {
            task_id,
            success: false,
            provider: selection.provider.clone(),
            model: selection.model.clone(),
            attempts,
            output: None,
            error: Some(error),
        }
    }
}

/// Runs one task end to end: provider selection, attempts with failover
/// between them, session bookkeeping, and the terminal hand-off to the
/// [`TeamCoordinator`].
///
/// Every failure is retried, transient or not, until the task's retry
/// budget is spent. Provider failures never escape as errors; they end up
/// in [`ExecutionResult::error`].
pub struct TaskExecutionRuntime {
    store: Arc<dyn TeamStore>,
    router: Arc<ProviderRouter>,
    coordinator: Arc<TeamCoordinator>,
    sessions: Arc<dyn SessionManager>,
    clients: Arc<ProviderClientFactory>,
    retry: RetryPolicy,
    config: RuntimeConfig,
    /// Injectable sleep function for testing (allows skipping real delays).
    #[cfg(test)]
    sleep_fn: Option<SleepFn>,
}

impl TaskExecutionRuntime {
    pub fn new(
        store: Arc<dyn TeamStore>,
        router: Arc<ProviderRouter>,
        coordinator: Arc<TeamCoordinator>,
        sessions: Arc<dyn SessionManager>,
        clients: Arc<ProviderClientFactory>,
    ) -> Self {
        Self {
            store,
            router,
            coordinator,
            sessions,
            clients,
            retry: RetryPolicy::default(),
            config: RuntimeConfig::default(),
            #[cfg(test)]
            sleep_fn: None,
        }
    }

    /// Retry defaults for tasks whose metadata does not override them.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Wait out the policy's backoff before the next attempt.
    async fn do_sleep(&self, policy: &RetryPolicy) {
        #[cfg(test)]
        if let Some(ref f) = self.sleep_fn {
            f(policy.retry_backoff_ms).await;
            return;
        }
        let delay = policy.backoff();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    async fn load_task(&self, task_id: Uuid) -> CohortResult<Task> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| CohortError::not_found("task", task_id))
    }

    fn initial_selection(&self, task: &Task) -> ProviderSelection {
        match &task.provider {
            Some(provider) => {
                let mut selection = self.router.selection_for(provider);
                if let Some(model) = &task.model {
                    selection.model.clone_from(model);
                }
                selection
            }
            None => self.router.select_provider(task),
        }
    }

    /// One call against the provider. Both an `Err` from the client and an
    /// unsuccessful response come back as [`CohortError::ProviderExecution`].
    async fn attempt(
        &self,
        task: &Task,
        selection: &ProviderSelection,
        attempt: u32,
    ) -> CohortResult<RunResponse> {
        let provider_error = |message: String| CohortError::ProviderExecution {
            provider: selection.provider.clone(),
            message,
        };

        let client = self.clients.create(&selection.provider);
        if self.config.health_check && !client.health_check().await {
            return Err(provider_error("health check failed".into()));
        }

        let request = RunRequest {
            task_id: task.id,
            team_id: task.team_id,
            provider: selection.provider.clone(),
            model: selection.model.clone(),
            prompt: task.text(),
            attempt,
            metadata: task.metadata.clone(),
        };
        match client.run(request).await {
            Ok(response) if response.success => Ok(response),
            Ok(response) => Err(provider_error(
                response
                    .error
                    .unwrap_or_else(|| "provider reported failure".into()),
            )),
            Err(e @ CohortError::ProviderExecution { .. }) => Err(e),
            Err(e) => Err(provider_error(e.to_string())),
        }
    }

    async fn settle_cancelled(
        &self,
        task_id: Uuid,
        selection: &ProviderSelection,
        attempts: u32,
    ) -> CohortResult<ExecutionResult> {
        info!(task_id = %task_id, attempts, "execution stopped: task cancelled");
        self.coordinator.handle_task_cancelled(task_id).await?;
        Ok(ExecutionResult::failed(
            task_id,
            selection,
            attempts,
            "task cancelled".into(),
        ))
    }

    /// Execute a task until it succeeds or its retry budget is spent.
    ///
    /// Only in-progress tasks with every prerequisite completed run; a
    /// cancelled task is settled without a provider call. Besides those
    /// gates, only a task id the store cannot resolve, or a failing
    /// collaborator (store, sessions), is reported as `Err`.
    pub async fn execute_task(&self, task_id: Uuid) -> CohortResult<ExecutionResult> {
        let task = self.load_task(task_id).await?;
        match task.status {
            TaskStatus::InProgress => {
                self.coordinator.task_manager().ensure_ready(&task).await?;
            }
            TaskStatus::Cancelled => {}
            other => {
                return Err(CohortError::InvalidState(format!(
                    "task {task_id} is {other}, only in-progress tasks can execute"
                )));
            }
        }
        let policy = RetryPolicy::from_metadata(&task.metadata, self.retry);
        let max_attempts = policy.attempts();
        let mut selection = self.initial_selection(&task);
        let mut attempt: u32 = 1;

        info!(
            task_id = %task_id,
            provider = %selection.provider,
            max_attempts,
            "execution started"
        );

        loop {
            let current = self.load_task(task_id).await?;
            if current.status == TaskStatus::Cancelled {
                return self.settle_cancelled(task_id, &selection, attempt - 1).await;
            }

            let session = self
                .sessions
                .create_session(task_id, &selection.provider, &selection.model)
                .await?;

            match self.attempt(&current, &selection, attempt).await {
                Ok(response) => {
                    self.sessions.complete_session(&session).await?;

                    // cancelled while the provider was running
                    if self.load_task(task_id).await?.status == TaskStatus::Cancelled {
                        return self.settle_cancelled(task_id, &selection, attempt).await;
                    }

                    self.coordinator
                        .handle_task_completion(task_id, TaskOutcome::from(&response))
                        .await?;
                    info!(
                        task_id = %task_id,
                        provider = %selection.provider,
                        attempt,
                        "execution succeeded"
                    );
                    return Ok(ExecutionResult::succeeded(
                        task_id,
                        &selection,
                        attempt,
                        response.output,
                    ));
                }
                Err(e) => {
                    let message = e.to_string();
                    self.sessions.fail_session(&session, &message).await?;
                    warn!(
                        task_id = %task_id,
                        provider = %selection.provider,
                        attempt,
                        max_attempts,
                        error = %message,
                        "attempt failed"
                    );

                    if attempt >= max_attempts {
                        self.coordinator
                            .handle_task_failure(task_id, &message)
                            .await?;
                        return Ok(ExecutionResult::failed(task_id, &selection, attempt, message));
                    }

                    let next = self.router.failover(&current, &selection.provider);
                    info!(
                        task_id = %task_id,
                        from = %selection.provider,
                        to = %next.provider,
                        "failing over"
                    );
                    self.store
                        .update_task(
                            task_id,
                            TaskPatch {
                                provider: Some(Some(next.provider.clone())),
                                model: Some(Some(next.model.clone())),
                                ..TaskPatch::default()
                            },
                        )
                        .await?;
                    selection = next;
                    attempt += 1;
                    self.do_sleep(&policy).await;
                }
            }
        }
    }
}
