use crate::client::{ProviderClient, RunRequest, RunResponse};
use async_trait::async_trait;
use cohort_core::CohortResult;

/// Client handed out for provider names nobody registered.
///
/// It never succeeds, so an unknown provider simply fails its attempt and
/// the runtime moves on to the failover provider.
pub struct UnavailableClient {
    provider: String,
}

impl UnavailableClient {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }
}

#[async_trait]
impl ProviderClient for UnavailableClient {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn health_check(&self) -> bool {
        false
    }

    async fn run(&self, request: RunRequest) -> CohortResult<RunResponse> {
        Ok(RunResponse::failed(
            &request,
            format!("no client registered for provider '{}'", self.provider),
        ))
    }
}
