use crate::CohortResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

/// The kind of lifecycle event a [`LifecycleMessage`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// A task was paired with a teammate and moved to `in_progress`.
    TaskAssigned,
    /// A task finished successfully.
    TaskCompleted,
    /// A task exhausted its attempts.
    TaskFailed,
    /// A running task was observed as cancelled.
    TaskCancelled,
    /// Free-form team-wide announcement.
    Broadcast,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::TaskAssigned => write!(f, "task_assigned"),
            MessageKind::TaskCompleted => write!(f, "task_completed"),
            MessageKind::TaskFailed => write!(f, "task_failed"),
            MessageKind::TaskCancelled => write!(f, "task_cancelled"),
            MessageKind::Broadcast => write!(f, "broadcast"),
        }
    }
}

/// A notification published on task and team transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleMessage {
    /// Unique identifier for this message.
    pub id: Uuid,
    /// What happened.
    pub kind: MessageKind,
    /// Team the event belongs to.
    pub team_id: Uuid,
    /// Task the event is about, if any.
    pub task_id: Option<Uuid>,
    /// Human-readable summary.
    pub text: String,
    /// Structured details (teammate, provider, error...).
    #[serde(default)]
    pub payload: serde_json::Value,
    /// UTC timestamp of when the message was created.
    pub timestamp: DateTime<Utc>,
}

impl LifecycleMessage {
    /// Creates a task-scoped message.
    pub fn task(
        kind: MessageKind,
        team_id: Uuid,
        task_id: Uuid,
        text: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            team_id,
            task_id: Some(task_id),
            text: text.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Creates a team-wide broadcast.
    pub fn broadcast(team_id: Uuid, text: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: MessageKind::Broadcast,
            team_id,
            task_id: None,
            text: text.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Sink for lifecycle notifications.
///
/// Implementations can forward to a chat transcript, a WebSocket dashboard,
/// a webhook, etc. The orchestrator treats delivery as best effort.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Publish a task- or team-scoped message.
    async fn send_message(&self, message: LifecycleMessage) -> CohortResult<()>;

    /// Publish a free-form announcement to every member of a team.
    async fn broadcast_message(
        &self,
        team_id: Uuid,
        text: &str,
        metadata: serde_json::Value,
    ) -> CohortResult<()>;
}

/// Broker that keeps every message in memory. Used by tests and the CLI.
#[derive(Default)]
pub struct InMemoryBroker {
    messages: Mutex<Vec<LifecycleMessage>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages published so far, oldest first.
    pub async fn messages(&self) -> Vec<LifecycleMessage> {
        self.messages.lock().await.clone()
    }

    /// Number of messages of the given kind.
    pub async fn count(&self, kind: MessageKind) -> usize {
        self.messages
            .lock()
            .await
            .iter()
            .filter(|m| m.kind == kind)
            .count()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn send_message(&self, message: LifecycleMessage) -> CohortResult<()> {
        self.messages.lock().await.push(message);
        Ok(())
    }

    async fn broadcast_message(
        &self,
        team_id: Uuid,
        text: &str,
        metadata: serde_json::Value,
    ) -> CohortResult<()> {
        self.messages
            .lock()
            .await
            .push(LifecycleMessage::broadcast(team_id, text, metadata));
        Ok(())
    }
}

/// Broker that only logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBroker;

#[async_trait]
impl MessageBroker for TracingBroker {
    async fn send_message(&self, message: LifecycleMessage) -> CohortResult<()> {
        tracing::info!(
            kind = %message.kind,
            team_id = %message.team_id,
            task_id = ?message.task_id,
            "{}",
            message.text
        );
        Ok(())
    }

    async fn broadcast_message(
        &self,
        team_id: Uuid,
        text: &str,
        _metadata: serde_json::Value,
    ) -> CohortResult<()> {
        tracing::info!(team_id = %team_id, "broadcast: {text}");
        Ok(())
    }
}
