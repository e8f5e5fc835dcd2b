use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// --- Team ---

/// Lifecycle status of a [`Team`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TeamStatus {
    /// Created but never started.
    #[default]
    Draft,
    /// Scheduling and executing tasks.
    Active,
    /// Scheduling suspended; in-flight tasks finish on their own.
    Paused,
    /// Every task reached a terminal status.
    Completed,
}

impl fmt::Display for TeamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamStatus::Draft => write!(f, "draft"),
            TeamStatus::Active => write!(f, "active"),
            TeamStatus::Paused => write!(f, "paused"),
            TeamStatus::Completed => write!(f, "completed"),
        }
    }
}

/// How ready tasks are paired with idle teammates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    /// Rotate through the roster, resuming after the last pick.
    #[default]
    RoundRobin,
    /// Prefer the idle teammate with the fewest finished tasks.
    LeastBusy,
    /// Prefer the idle teammate whose skills appear most in the task text.
    SkillMatch,
}

impl fmt::Display for AllocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationStrategy::RoundRobin => write!(f, "round_robin"),
            AllocationStrategy::LeastBusy => write!(f, "least_busy"),
            AllocationStrategy::SkillMatch => write!(f, "skill_match"),
        }
    }
}

impl FromStr for AllocationStrategy {
    type Err = crate::CohortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "round_robin" => Ok(AllocationStrategy::RoundRobin),
            "least_busy" => Ok(AllocationStrategy::LeastBusy),
            "skill_match" => Ok(AllocationStrategy::SkillMatch),
            other => Err(crate::CohortError::Config(format!(
                "unknown allocation strategy '{other}'"
            ))),
        }
    }
}

/// A group of teammates sharing a task backlog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub status: TeamStatus,
    #[serde(default = "default_max_teammates")]
    pub max_teammates: u32,
    #[serde(default)]
    pub task_allocation_strategy: AllocationStrategy,
    #[serde(default)]
    pub total_tasks: u32,
    #[serde(default)]
    pub completed_tasks: u32,
    #[serde(default)]
    pub failed_tasks: u32,
    #[serde(default)]
    pub total_cost_usd: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

fn default_max_teammates() -> u32 {
    5
}

impl Team {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: TeamStatus::Draft,
            max_teammates: default_max_teammates(),
            task_allocation_strategy: AllocationStrategy::RoundRobin,
            total_tasks: 0,
            completed_tasks: 0,
            failed_tasks: 0,
            total_cost_usd: 0.0,
            created_at: now,
            updated_at: now,
            started_at: None,
        }
    }

    pub fn with_strategy(mut self, strategy: AllocationStrategy) -> Self {
        self.task_allocation_strategy = strategy;
        self
    }

    pub fn with_max_teammates(mut self, max: u32) -> Self {
        self.max_teammates = max;
        self
    }
}

// --- Teammate ---

/// Availability of a [`Teammate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TeammateStatus {
    #[default]
    Idle,
    Busy,
    Offline,
}

impl fmt::Display for TeammateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeammateStatus::Idle => write!(f, "idle"),
            TeammateStatus::Busy => write!(f, "busy"),
            TeammateStatus::Offline => write!(f, "offline"),
        }
    }
}

/// Cumulative counters for a teammate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeammateStats {
    pub tasks_completed: u32,
    pub tasks_failed: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

impl TeammateStats {
    /// Tasks that reached a terminal outcome on this teammate.
    pub fn finished(&self) -> u32 {
        self.tasks_completed + self.tasks_failed
    }
}

/// A worker bound to one provider/model that executes one task at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Teammate {
    pub id: Uuid,
    pub team_id: Uuid,
    pub name: String,
    pub role: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub status: TeammateStatus,
    /// Weak reference; the task record is owned by the store.
    #[serde(default)]
    pub current_task_id: Option<Uuid>,
    #[serde(default)]
    pub skills: BTreeSet<String>,
    #[serde(default)]
    pub stats: TeammateStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Teammate {
    pub fn new(team_id: Uuid, name: impl Into<String>, role: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            team_id,
            name: name.into(),
            role: role.into(),
            provider: "claude".to_string(),
            model: "claude-sonnet".to_string(),
            status: TeammateStatus::Idle,
            current_task_id: None,
            skills: BTreeSet::new(),
            stats: TeammateStats::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.provider = provider.into();
        self.model = model.into();
        self
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }

    /// Free to take a new task.
    pub fn is_idle(&self) -> bool {
        self.status == TeammateStatus::Idle && self.current_task_id.is_none()
    }
}

// --- Task ---

/// Status of a task. `Completed`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A unit of work with priority, dependencies and lifecycle status.
///
/// Dependency edges are not stored here; ask the store for
/// [`TaskDependencies`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub team_id: Uuid,
    pub subject: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    /// Higher is more urgent.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub assigned_to: Option<Uuid>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// Opaque bag; retry overrides (`max_retries`, `retry_backoff_ms`) live here.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Task {
    pub fn new(team_id: Uuid, subject: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            team_id,
            subject: subject.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            priority: 0,
            assigned_to: None,
            provider: None,
            model: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: 0.0,
            result: None,
            error: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Subject and description joined, for routing and prompting.
    pub fn text(&self) -> String {
        if self.description.is_empty() {
            self.subject.clone()
        } else {
            format!("{}\n{}", self.subject, self.description)
        }
    }
}

/// Both directions of a task's dependency edges, derived on read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDependencies {
    /// Tasks waiting on this one.
    pub blocks: Vec<Uuid>,
    /// Prerequisites of this task.
    pub blocked_by: Vec<Uuid>,
}

// --- Patches ---

/// Partial update for a [`Task`]. `None` leaves a field untouched;
/// `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub priority: Option<i32>,
    pub assigned_to: Option<Option<Uuid>>,
    pub provider: Option<Option<String>>,
    pub model: Option<Option<String>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cost_usd: Option<f64>,
    pub result: Option<Option<String>>,
    pub error: Option<Option<String>>,
    pub metadata: Option<serde_json::Value>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(assigned_to) = self.assigned_to {
            task.assigned_to = assigned_to;
        }
        if let Some(provider) = &self.provider {
            task.provider.clone_from(provider);
        }
        if let Some(model) = &self.model {
            task.model.clone_from(model);
        }
        if let Some(started_at) = self.started_at {
            task.started_at = Some(started_at);
        }
        if let Some(completed_at) = self.completed_at {
            task.completed_at = Some(completed_at);
        }
        if let Some(tokens) = self.input_tokens {
            task.input_tokens = tokens;
        }
        if let Some(tokens) = self.output_tokens {
            task.output_tokens = tokens;
        }
        if let Some(cost) = self.cost_usd {
            task.cost_usd = cost;
        }
        if let Some(result) = &self.result {
            task.result.clone_from(result);
        }
        if let Some(error) = &self.error {
            task.error.clone_from(error);
        }
        if let Some(metadata) = &self.metadata {
            task.metadata = metadata.clone();
        }
        task.updated_at = Utc::now();
    }
}

/// Partial update for a [`Team`].
#[derive(Debug, Clone, Default)]
pub struct TeamPatch {
    pub status: Option<TeamStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub total_tasks: Option<u32>,
    pub completed_tasks: Option<u32>,
    pub failed_tasks: Option<u32>,
    pub total_cost_usd: Option<f64>,
}

impl TeamPatch {
    pub fn status(status: TeamStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn apply(&self, team: &mut Team) {
        if let Some(status) = self.status {
            team.status = status;
        }
        if let Some(started_at) = self.started_at {
            team.started_at = Some(started_at);
        }
        if let Some(total) = self.total_tasks {
            team.total_tasks = total;
        }
        if let Some(completed) = self.completed_tasks {
            team.completed_tasks = completed;
        }
        if let Some(failed) = self.failed_tasks {
            team.failed_tasks = failed;
        }
        if let Some(cost) = self.total_cost_usd {
            team.total_cost_usd = cost;
        }
        team.updated_at = Utc::now();
    }
}

/// Partial update for a [`Teammate`].
#[derive(Debug, Clone, Default)]
pub struct TeammatePatch {
    pub status: Option<TeammateStatus>,
    pub current_task_id: Option<Option<Uuid>>,
    pub stats: Option<TeammateStats>,
}

impl TeammatePatch {
    pub fn apply(&self, teammate: &mut Teammate) {
        if let Some(status) = self.status {
            teammate.status = status;
        }
        if let Some(current) = self.current_task_id {
            teammate.current_task_id = current;
        }
        if let Some(stats) = &self.stats {
            teammate.stats = stats.clone();
        }
        teammate.updated_at = Utc::now();
    }
}
