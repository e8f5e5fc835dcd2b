use crate::session::{Session, SessionHandle, SessionOutcome};
use async_trait::async_trait;
use cohort_core::{CohortError, CohortResult};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Tracks one bookkeeping record per execution attempt.
///
/// Every handle returned by `create_session` must be closed exactly once,
/// with either `complete_session` or `fail_session`.
#[async_trait]
pub trait SessionManager: Send + Sync {
    async fn create_session(
        &self,
        task_id: Uuid,
        provider: &str,
        model: &str,
    ) -> CohortResult<SessionHandle>;
    async fn complete_session(&self, handle: &SessionHandle) -> CohortResult<()>;
    async fn fail_session(&self, handle: &SessionHandle, error: &str) -> CohortResult<()>;
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<Uuid, Session>,
    order: Vec<Uuid>,
}

/// In-memory [`SessionManager`].
#[derive(Default)]
pub struct InMemorySessionManager {
    inner: Mutex<Inner>,
}

impl InMemorySessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions of one task, oldest first.
    pub async fn sessions_for(&self, task_id: Uuid) -> Vec<Session> {
        let inner = self.inner.lock().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.sessions.get(id))
            .filter(|s| s.task_id == task_id)
            .cloned()
            .collect()
    }

    /// Count of sessions across all tasks with the given outcome.
    pub async fn count(&self, outcome: SessionOutcome) -> usize {
        self.inner
            .lock()
            .await
            .sessions
            .values()
            .filter(|s| s.outcome == outcome)
            .count()
    }

    async fn close(
        &self,
        handle: &SessionHandle,
        close: impl FnOnce(&mut Session) + Send,
    ) -> CohortResult<()> {
        let mut inner = self.inner.lock().await;
        let session = inner
            .sessions
            .get_mut(&handle.session_id)
            .ok_or_else(|| CohortError::not_found("session", handle.session_id))?;
        if !session.is_open() {
            return Err(CohortError::Session(format!(
                "session {} already closed",
                handle.session_id
            )));
        }
        close(session);
        Ok(())
    }
}

#[async_trait]
impl SessionManager for InMemorySessionManager {
    async fn create_session(
        &self,
        task_id: Uuid,
        provider: &str,
        model: &str,
    ) -> CohortResult<SessionHandle> {
        let mut inner = self.inner.lock().await;
        let previous = inner
            .sessions
            .values()
            .filter(|s| s.task_id == task_id)
            .count();
        let session = Session::new(task_id, provider, model, previous as u32 + 1);
        let handle = SessionHandle {
            session_id: session.id,
            task_id,
            provider: provider.to_string(),
        };
        tracing::debug!(
            session_id = %session.id,
            task_id = %task_id,
            provider,
            attempt = session.attempt,
            "session opened"
        );
        inner.order.push(session.id);
        inner.sessions.insert(session.id, session);
        Ok(handle)
    }

    async fn complete_session(&self, handle: &SessionHandle) -> CohortResult<()> {
        self.close(handle, Session::complete).await
    }

    async fn fail_session(&self, handle: &SessionHandle, error: &str) -> CohortResult<()> {
        let error = error.to_string();
        self.close(handle, move |s| s.fail(error)).await
    }
}
