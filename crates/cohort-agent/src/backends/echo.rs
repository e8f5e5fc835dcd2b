use crate::client::{ProviderClient, RunRequest, RunResponse};
use async_trait::async_trait;
use cohort_core::CohortResult;
use std::sync::atomic::{AtomicU32, Ordering};

/// Local simulator backend.
///
/// Answers every run with the first line of the prompt and a word-count
/// usage estimate. `fail_first` makes the first N runs fail so failover can
/// be rehearsed without a real vendor.
pub struct EchoClient {
    provider: String,
    fail_first: u32,
    cost_per_1k_tokens: f64,
    runs: AtomicU32,
}

impl EchoClient {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            fail_first: 0,
            cost_per_1k_tokens: 0.0,
            runs: AtomicU32::new(0),
        }
    }

    pub fn failing_first(mut self, runs: u32) -> Self {
        self.fail_first = runs;
        self
    }

    pub fn with_cost(mut self, cost_per_1k_tokens: f64) -> Self {
        self.cost_per_1k_tokens = cost_per_1k_tokens;
        self
    }

    /// Number of `run` calls served so far.
    pub fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }
}

fn estimate_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

#[async_trait]
impl ProviderClient for EchoClient {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn run(&self, request: RunRequest) -> CohortResult<RunResponse> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst);
        if run < self.fail_first {
            tracing::debug!(provider = %self.provider, run, "echo: simulated failure");
            return Ok(RunResponse::failed(
                &request,
                format!("simulated failure {} of {}", run + 1, self.fail_first),
            ));
        }

        let headline = request.prompt.lines().next().unwrap_or_default();
        let output = format!("[{}] {headline}", self.provider);
        let input_tokens = estimate_tokens(&request.prompt);
        let output_tokens = estimate_tokens(&output);
        let cost = (input_tokens + output_tokens) as f64 * self.cost_per_1k_tokens / 1000.0;

        Ok(RunResponse::ok(&request, output).with_usage(input_tokens, output_tokens, cost))
    }
}
