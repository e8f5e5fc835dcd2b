#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end orchestration tests.
//!
//! These drive the real resolver, router, task manager, coordinator and
//! runtime over the in-memory store, broker and session manager, with
//! scripted provider clients standing in for vendors.

use async_trait::async_trait;
use cohort_agent::{
    EchoClient, ProviderClient, ProviderClientFactory, RetryPolicy, RunRequest, RunResponse,
};
use cohort_core::{
    AllocationStrategy, CohortError, CohortResult, InMemoryBroker, MessageKind, Task,
    TaskDependencies, TaskPatch, TaskStatus, Team, TeamPatch, TeamStatus, Teammate, TeammatePatch,
    TeammateStatus,
};
use cohort_orchestrator::{
    DependencyGraph, DependencyResolver, Orchestrator, OrchestratorConfig, ProviderRouter, Route,
    RouterConfig,
};
use cohort_session::{InMemorySessionManager, SessionOutcome};
use cohort_store::{MemoryStore, TeamFixture, TeamStore};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Scripted provider that always errors at the transport level
// ---------------------------------------------------------------------------

struct ErroringClient {
    provider: String,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl ProviderClient for ErroringClient {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn run(&self, _request: RunRequest) -> CohortResult<RunResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CohortError::ProviderExecution {
            provider: self.provider.clone(),
            message: "connection reset by peer".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Store that yields after every read, like one doing real I/O
// ---------------------------------------------------------------------------

struct YieldingStore {
    inner: Arc<MemoryStore>,
}

#[async_trait]
impl TeamStore for YieldingStore {
    async fn get_task(&self, id: Uuid) -> CohortResult<Option<Task>> {
        let task = self.inner.get_task(id).await;
        tokio::task::yield_now().await;
        task
    }

    async fn update_task(&self, id: Uuid, patch: TaskPatch) -> CohortResult<Option<Task>> {
        self.inner.update_task(id, patch).await
    }

    async fn list_tasks(&self, team_id: Uuid) -> CohortResult<Vec<Task>> {
        let tasks = self.inner.list_tasks(team_id).await;
        tokio::task::yield_now().await;
        tasks
    }

    async fn get_team(&self, id: Uuid) -> CohortResult<Option<Team>> {
        let team = self.inner.get_team(id).await;
        tokio::task::yield_now().await;
        team
    }

    async fn update_team(&self, id: Uuid, patch: TeamPatch) -> CohortResult<Option<Team>> {
        self.inner.update_team(id, patch).await
    }

    async fn get_teammate(&self, id: Uuid) -> CohortResult<Option<Teammate>> {
        let teammate = self.inner.get_teammate(id).await;
        tokio::task::yield_now().await;
        teammate
    }

    async fn update_teammate(
        &self,
        id: Uuid,
        patch: TeammatePatch,
    ) -> CohortResult<Option<Teammate>> {
        self.inner.update_teammate(id, patch).await
    }

    async fn list_teammates(&self, team_id: Uuid) -> CohortResult<Vec<Teammate>> {
        let teammates = self.inner.list_teammates(team_id).await;
        tokio::task::yield_now().await;
        teammates
    }

    async fn get_task_dependencies(&self, id: Uuid) -> CohortResult<TaskDependencies> {
        self.inner.get_task_dependencies(id).await
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    store: Arc<MemoryStore>,
    broker: Arc<InMemoryBroker>,
    sessions: Arc<InMemorySessionManager>,
    orchestrator: Orchestrator,
}

fn harness(factory: ProviderClientFactory) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let broker = Arc::new(InMemoryBroker::new());
    let sessions = Arc::new(InMemorySessionManager::new());
    let config = OrchestratorConfig {
        retry: RetryPolicy::new(2, 0),
        ..OrchestratorConfig::default()
    };
    let orchestrator = Orchestrator::new(
        &config,
        store.clone(),
        broker.clone(),
        sessions.clone(),
        Arc::new(factory),
    )
    .unwrap();
    Harness {
        store,
        broker,
        sessions,
        orchestrator,
    }
}

fn echo_factory(providers: &[&str]) -> ProviderClientFactory {
    let mut factory = ProviderClientFactory::new();
    for provider in providers {
        factory.register_client(*provider, Arc::new(EchoClient::new(*provider)));
    }
    factory
}

async fn seed_team(store: &MemoryStore, teammates: &[&str]) -> (Uuid, Vec<Uuid>) {
    let team_id = store.insert_team(Team::new("squad")).await;
    let mut ids = Vec::new();
    for name in teammates {
        ids.push(
            store
                .insert_teammate(Teammate::new(team_id, *name, "generalist"))
                .await
                .unwrap(),
        );
    }
    (team_id, ids)
}

fn no_backoff(max_retries: u32) -> serde_json::Value {
    json!({ "max_retries": max_retries, "retry_backoff_ms": 0 })
}

// ---------------------------------------------------------------------------
// DependencyResolver
// ---------------------------------------------------------------------------

#[test]
fn test_topological_sort_orders_chain() {
    let mut dag: DependencyGraph<&str> = HashMap::new();
    dag.insert("deploy", vec!["test"]);
    dag.insert("test", vec!["build"]);
    dag.insert("build", vec![]);

    let order = DependencyResolver::topological_sort(&dag).unwrap();
    assert_eq!(order, vec!["build", "test", "deploy"]);
}

#[test]
fn test_cycle_is_rejected_and_reported() {
    let mut dag: DependencyGraph<&str> = HashMap::new();
    dag.insert("a", vec!["b"]);
    dag.insert("b", vec!["a"]);

    let err = DependencyResolver::topological_sort(&dag).unwrap_err();
    assert!(matches!(err, CohortError::CircularDependency(_)));
    let cycles = DependencyResolver::detect_cycles(&dag);
    assert!(!cycles.is_empty());
    assert!(cycles[0].contains(&"a") && cycles[0].contains(&"b"));
}

#[tokio::test]
async fn test_readiness_follows_prerequisite_status() {
    let h = harness(ProviderClientFactory::new());
    let (team_id, _) = seed_team(&h.store, &[]).await;
    let design = h
        .store
        .insert_task(Task::new(team_id, "design", ""))
        .await
        .unwrap();
    let build = h
        .store
        .insert_task(Task::new(team_id, "build", ""))
        .await
        .unwrap();
    h.store.add_dependency(build, design).await.unwrap();

    let resolver = h.orchestrator.resolver();
    let ready: Vec<Uuid> = resolver
        .get_ready_tasks(team_id)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(ready, vec![design]);

    let task = h.store.get_task(build).await.unwrap().unwrap();
    assert!(!resolver.is_task_ready(&task).await.unwrap());
    assert_eq!(resolver.validate_team(team_id).await.unwrap(), vec![design, build]);
}

// ---------------------------------------------------------------------------
// ProviderRouter
// ---------------------------------------------------------------------------

#[test]
fn test_router_is_pure_and_honours_cues() {
    let router = ProviderRouter::new(RouterConfig::default()).unwrap();
    let team_id = Uuid::new_v4();

    let coding = Task::new(team_id, "Add a REST endpoint", "and a database migration");
    let first = router.select_provider(&coding);
    assert_eq!(first, router.select_provider(&coding));
    assert_eq!(first.provider, "codex");

    let language = Task::new(team_id, "Translate the onboarding guide", "");
    assert_eq!(router.select_provider(&language).provider, "qwen");

    let script = Task::new(team_id, "校对这段文字", "");
    assert_eq!(router.classify(&script.text()), Route::Language);

    let plain = Task::new(team_id, "Plan the quarterly offsite", "");
    assert_eq!(router.select_provider(&plain).provider, "claude");
}

#[test]
fn test_failover_never_returns_failed_provider() {
    let router = ProviderRouter::new(RouterConfig::default()).unwrap();
    let task = Task::new(Uuid::new_v4(), "anything", "");
    for provider in router.config().catalog.keys() {
        assert_ne!(&router.failover(&task, provider).provider, provider);
    }
    assert_eq!(router.failover(&task, "claude").provider, "deepseek");
}

// ---------------------------------------------------------------------------
// TaskManager
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_assign_task_sets_both_sides() {
    let h = harness(ProviderClientFactory::new());
    let (team_id, mates) = seed_team(&h.store, &["alice"]).await;
    let id = h
        .store
        .insert_task(Task::new(team_id, "Write release notes", ""))
        .await
        .unwrap();

    let task = h.orchestrator.tasks().assign_task(id, mates[0]).await.unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);
    assert_eq!(task.assigned_to, Some(mates[0]));
    assert_eq!(task.provider.as_deref(), Some("claude"));
    assert_eq!(task.model.as_deref(), Some("claude-sonnet"));
    assert!(task.started_at.is_some());

    let alice = h.store.get_teammate(mates[0]).await.unwrap().unwrap();
    assert_eq!(alice.status, TeammateStatus::Busy);
    assert_eq!(alice.current_task_id, Some(id));
}

#[tokio::test]
async fn test_round_robin_hands_out_a_then_b() {
    let h = harness(ProviderClientFactory::new());
    let (team_id, mates) = seed_team(&h.store, &["a", "b"]).await;
    h.store
        .insert_task(Task::new(team_id, "one", ""))
        .await
        .unwrap();

    let tasks = h.orchestrator.tasks();
    let first = tasks
        .get_next_task(team_id, AllocationStrategy::RoundRobin)
        .await
        .unwrap()
        .unwrap();
    let second = tasks
        .get_next_task(team_id, AllocationStrategy::RoundRobin)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.teammate.id, mates[0]);
    assert_eq!(second.teammate.id, mates[1]);
}

#[tokio::test]
async fn test_start_task_blocked_by_pending_prerequisite() {
    let h = harness(ProviderClientFactory::new());
    let (team_id, _) = seed_team(&h.store, &[]).await;
    let first = h
        .store
        .insert_task(Task::new(team_id, "first", ""))
        .await
        .unwrap();
    let second = h
        .store
        .insert_task(Task::new(team_id, "second", ""))
        .await
        .unwrap();
    h.store.add_dependency(second, first).await.unwrap();

    let err = h.orchestrator.tasks().start_task(second).await.unwrap_err();
    match err {
        CohortError::DependencyNotSatisfied { task_id, pending } => {
            assert_eq!(task_id, second.to_string());
            assert!(pending.contains(&first.to_string()));
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ---------------------------------------------------------------------------
// TeamCoordinator
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_start_team_assigns_one_task_per_idle_teammate() {
    let h = harness(ProviderClientFactory::new());
    let (team_id, _) = seed_team(&h.store, &["a", "b"]).await;
    for subject in ["one", "two", "three"] {
        h.store
            .insert_task(Task::new(team_id, subject, ""))
            .await
            .unwrap();
    }

    let team = h.orchestrator.coordinator().start_team(team_id).await.unwrap();
    assert_eq!(team.status, TeamStatus::Active);
    assert!(team.started_at.is_some());

    let tasks = h.store.list_tasks(team_id).await.unwrap();
    let in_progress = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::InProgress)
        .count();
    let pending = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Pending)
        .count();
    assert_eq!(in_progress, 2);
    assert_eq!(pending, 1);
    assert_eq!(h.broker.count(MessageKind::TaskAssigned).await, 2);
}

#[tokio::test]
async fn test_paused_team_schedules_nothing() {
    let h = harness(ProviderClientFactory::new());
    let (team_id, _) = seed_team(&h.store, &["a"]).await;
    let coordinator = h.orchestrator.coordinator();
    coordinator.start_team(team_id).await.unwrap();
    coordinator.pause_team(team_id).await.unwrap();
    h.store
        .insert_task(Task::new(team_id, "late", ""))
        .await
        .unwrap();

    assert_eq!(coordinator.schedule_all_ready_tasks(team_id).await.unwrap(), 0);
    let err = coordinator.pause_team(team_id).await.unwrap_err();
    assert!(matches!(err, CohortError::InvalidState(_)));
}

// ---------------------------------------------------------------------------
// TaskExecutionRuntime
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_failure_then_failover_success() {
    let mut factory = ProviderClientFactory::new();
    let claude = Arc::new(EchoClient::new("claude").failing_first(1));
    let deepseek = Arc::new(EchoClient::new("deepseek"));
    factory.register_client("claude", claude.clone());
    factory.register_client("deepseek", deepseek.clone());
    let h = harness(factory);

    let (team_id, mates) = seed_team(&h.store, &["a"]).await;
    let id = h
        .store
        .insert_task(Task::new(team_id, "Summarise the meeting", "").with_metadata(no_backoff(2)))
        .await
        .unwrap();
    h.orchestrator.coordinator().start_team(team_id).await.unwrap();

    let result = h.orchestrator.runtime().execute_task(id).await.unwrap();
    assert!(result.success);
    assert_eq!(result.attempts, 2);
    assert_eq!(result.provider, "deepseek");
    assert_eq!(claude.runs(), 1);
    assert_eq!(deepseek.runs(), 1);

    let sessions = h.sessions.sessions_for(id).await;
    let providers: Vec<&str> = sessions.iter().map(|s| s.provider.as_str()).collect();
    assert_eq!(providers, vec!["claude", "deepseek"]);
    assert_eq!(h.sessions.count(SessionOutcome::Failed).await, 1);
    assert_eq!(h.sessions.count(SessionOutcome::Completed).await, 1);

    let task = h.store.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.provider.as_deref(), Some("deepseek"));
    let mate = h.store.get_teammate(mates[0]).await.unwrap().unwrap();
    assert!(mate.is_idle());
    assert_eq!(mate.stats.tasks_completed, 1);

    let team = h.store.get_team(team_id).await.unwrap().unwrap();
    assert_eq!(team.status, TeamStatus::Completed);
    assert_eq!(team.completed_tasks, 1);
}

#[tokio::test]
async fn test_client_error_exhausts_single_attempt() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut factory = ProviderClientFactory::new();
    let counter = calls.clone();
    factory.register("claude", move |provider| {
        Arc::new(ErroringClient {
            provider: provider.to_string(),
            calls: counter.clone(),
        }) as Arc<dyn ProviderClient>
    });
    let h = harness(factory);

    let (team_id, mates) = seed_team(&h.store, &["a"]).await;
    let id = h
        .store
        .insert_task(Task::new(team_id, "Summarise the meeting", "").with_metadata(no_backoff(1)))
        .await
        .unwrap();
    h.orchestrator.coordinator().start_team(team_id).await.unwrap();

    let result = h.orchestrator.runtime().execute_task(id).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.attempts, 1);
    assert!(result
        .error
        .as_deref()
        .unwrap()
        .contains("connection reset by peer"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(h.broker.count(MessageKind::TaskFailed).await, 1);
    assert_eq!(h.broker.count(MessageKind::TaskCompleted).await, 0);

    let task = h.store.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.is_some());
    let mate = h.store.get_teammate(mates[0]).await.unwrap().unwrap();
    assert!(mate.is_idle());
    assert_eq!(mate.stats.tasks_failed, 1);
}

#[tokio::test]
async fn test_cancelled_task_is_not_run() {
    let echo = Arc::new(EchoClient::new("claude"));
    let mut factory = ProviderClientFactory::new();
    factory.register_client("claude", echo.clone());
    let h = harness(factory);

    let (team_id, mates) = seed_team(&h.store, &["a"]).await;
    let id = h
        .store
        .insert_task(Task::new(team_id, "Summarise", ""))
        .await
        .unwrap();
    let coordinator = h.orchestrator.coordinator();
    coordinator.start_team(team_id).await.unwrap();
    coordinator.cancel_task(id).await.unwrap();

    let result = h.orchestrator.runtime().execute_task(id).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.attempts, 0);
    assert_eq!(echo.runs(), 0);
    assert_eq!(h.broker.count(MessageKind::TaskCancelled).await, 1);
    let mate = h.store.get_teammate(mates[0]).await.unwrap().unwrap();
    assert!(mate.is_idle());
}

#[tokio::test]
async fn test_execute_requires_in_progress_task_with_met_prerequisites() {
    let echo = Arc::new(EchoClient::new("claude"));
    let mut factory = ProviderClientFactory::new();
    factory.register_client("claude", echo.clone());
    let h = harness(factory);

    let (team_id, _) = seed_team(&h.store, &["a"]).await;
    let outline = h
        .store
        .insert_task(Task::new(team_id, "Outline the talk", "").with_metadata(no_backoff(1)))
        .await
        .unwrap();
    let slides = h
        .store
        .insert_task(Task::new(team_id, "Make the slides", "").with_metadata(no_backoff(1)))
        .await
        .unwrap();
    h.store.add_dependency(slides, outline).await.unwrap();
    h.orchestrator.coordinator().start_team(team_id).await.unwrap();

    let runtime = h.orchestrator.runtime();
    let err = runtime.execute_task(slides).await.unwrap_err();
    assert!(matches!(err, CohortError::InvalidState(_)));
    assert_eq!(echo.runs(), 0);
    assert!(h.sessions.sessions_for(slides).await.is_empty());

    assert!(runtime.execute_task(outline).await.unwrap().success);
    let err = runtime.execute_task(outline).await.unwrap_err();
    assert!(matches!(err, CohortError::InvalidState(_)));
    assert_eq!(echo.runs(), 1);
    assert_eq!(h.sessions.sessions_for(outline).await.len(), 1);

    let team = h.store.get_team(team_id).await.unwrap().unwrap();
    assert_eq!(team.completed_tasks, 1);
    assert_eq!(
        h.store.get_task(slides).await.unwrap().unwrap().status,
        TaskStatus::InProgress
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_completions_keep_team_counters() {
    const TASKS: usize = 20;
    let memory = Arc::new(MemoryStore::new());
    let store = Arc::new(YieldingStore {
        inner: memory.clone(),
    });
    let config = OrchestratorConfig {
        retry: RetryPolicy::new(1, 0),
        ..OrchestratorConfig::default()
    };
    let mut factory = ProviderClientFactory::new();
    factory.register_client("claude", Arc::new(EchoClient::new("claude").with_cost(0.5)));
    let orchestrator = Orchestrator::new(
        &config,
        store,
        Arc::new(InMemoryBroker::new()),
        Arc::new(InMemorySessionManager::new()),
        Arc::new(factory),
    )
    .unwrap();

    let team_id = memory.insert_team(Team::new("crowd")).await;
    for idx in 0..TASKS {
        memory
            .insert_teammate(Teammate::new(team_id, format!("mate-{idx}"), "generalist"))
            .await
            .unwrap();
        memory
            .insert_task(Task::new(team_id, format!("Summarise chapter {idx}"), ""))
            .await
            .unwrap();
    }

    let summary = orchestrator.run_team(team_id).await.unwrap();
    assert_eq!(summary.executions.len(), TASKS);
    assert!(summary.executions.iter().all(|e| e.success));
    assert_eq!(summary.status, TeamStatus::Completed);
    assert_eq!(summary.completed as usize, TASKS);
    assert_eq!(summary.failed, 0);

    let expected_cost: f64 = memory
        .list_tasks(team_id)
        .await
        .unwrap()
        .iter()
        .map(|t| t.cost_usd)
        .sum();
    assert!((summary.total_cost_usd - expected_cost).abs() < 1e-9);

    let mates = memory.list_teammates(team_id).await.unwrap();
    assert!(mates.iter().all(|m| m.is_idle()));
    assert_eq!(
        mates.iter().map(|m| m.stats.tasks_completed).sum::<u32>() as usize,
        TASKS
    );
}

// ---------------------------------------------------------------------------
// Full run from a fixture file
// ---------------------------------------------------------------------------

const FIXTURE: &str = r#"
[team]
name = "launch"
allocation_strategy = "skill_match"

[[teammates]]
name = "dba"
skills = ["schema", "sql"]

[[teammates]]
name = "writer"
skills = ["docs"]

[[tasks]]
key = "schema"
subject = "Design the orders schema"
priority = 5

[[tasks]]
key = "api"
subject = "Build the orders API endpoint"
blocked_by = ["schema"]

[[tasks]]
key = "docs"
subject = "Write the docs"
blocked_by = ["api"]

[[tasks]]
key = "translate"
subject = "Translate the docs into Japanese"
blocked_by = ["docs"]
"#;

#[tokio::test]
async fn test_fixture_runs_to_completion() {
    let h = harness(echo_factory(&["claude", "codex", "qwen"]));
    let fixture = TeamFixture::from_toml(FIXTURE).unwrap();
    let seeded = fixture.seed(&h.store).await.unwrap();

    let summary = h.orchestrator.run_team(seeded.team_id).await.unwrap();
    assert_eq!(summary.status, TeamStatus::Completed);
    assert_eq!(summary.completed, 4);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.pending, 0);

    let provider_of = |key: &str| {
        let id = seeded.task_ids[key];
        summary
            .executions
            .iter()
            .find(|e| e.task_id == id)
            .map(|e| e.provider.clone())
            .unwrap()
    };
    assert_eq!(provider_of("schema"), "codex");
    assert_eq!(provider_of("api"), "codex");
    assert_eq!(provider_of("docs"), "claude");
    assert_eq!(provider_of("translate"), "qwen");

    let schema = h
        .store
        .get_task(seeded.task_ids["schema"])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(schema.assigned_to, Some(seeded.teammate_ids[0]));

    let broadcasts: Vec<String> = h
        .broker
        .messages()
        .await
        .into_iter()
        .filter(|m| m.kind == MessageKind::Broadcast)
        .map(|m| m.text)
        .collect();
    assert_eq!(broadcasts.first().map(String::as_str), Some("Team started"));
    assert_eq!(broadcasts.last().map(String::as_str), Some("Team completed"));
}
