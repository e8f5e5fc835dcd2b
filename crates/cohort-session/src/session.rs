use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How an attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    #[default]
    Running,
    Completed,
    Failed,
}

/// Bookkeeping record for one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub task_id: Uuid,
    pub provider: String,
    pub model: String,
    /// 1-based attempt number within the task's execution.
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outcome: SessionOutcome,
    #[serde(default)]
    pub error: Option<String>,
}

impl Session {
    pub fn new(task_id: Uuid, provider: impl Into<String>, model: impl Into<String>, attempt: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            provider: provider.into(),
            model: model.into(),
            attempt,
            started_at: Utc::now(),
            ended_at: None,
            outcome: SessionOutcome::Running,
            error: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.outcome == SessionOutcome::Running
    }

    pub fn complete(&mut self) {
        self.outcome = SessionOutcome::Completed;
        self.ended_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.outcome = SessionOutcome::Failed;
        self.error = Some(error.into());
        self.ended_at = Some(Utc::now());
    }
}

/// Opaque reference returned by `create_session` and passed back to close it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    pub session_id: Uuid,
    pub task_id: Uuid,
    pub provider: String,
}
