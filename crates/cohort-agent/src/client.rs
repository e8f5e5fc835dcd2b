use async_trait::async_trait;
use cohort_core::CohortResult;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything a provider needs to execute one attempt of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub task_id: Uuid,
    pub team_id: Uuid,
    pub provider: String,
    pub model: String,
    /// Task subject and description joined.
    pub prompt: String,
    /// 1-based attempt number.
    pub attempt: u32,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Outcome of a provider run. `success == false` is a failed attempt even
/// when the call itself returned `Ok`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunResponse {
    pub success: bool,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub error: Option<String>,
}

impl RunResponse {
    pub fn ok(request: &RunRequest, output: impl Into<String>) -> Self {
        Self {
            success: true,
            provider: request.provider.clone(),
            model: request.model.clone(),
            output: Some(output.into()),
            ..Self::default()
        }
    }

    pub fn failed(request: &RunRequest, error: impl Into<String>) -> Self {
        Self {
            success: false,
            provider: request.provider.clone(),
            model: request.model.clone(),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64, cost_usd: f64) -> Self {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self.cost_usd = cost_usd;
        self
    }
}

/// Trait for provider backends.
///
/// Each backend (local CLI, echo simulator, a vendor HTTP API living in a
/// downstream crate...) implements this trait. Timeouts are the client's
/// business; the runtime imposes no wall-clock bound of its own.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Provider identifier this client serves.
    fn provider(&self) -> &str;

    /// Cheap liveness probe.
    async fn health_check(&self) -> bool;

    /// Execute one attempt.
    async fn run(&self, request: RunRequest) -> CohortResult<RunResponse>;
}
