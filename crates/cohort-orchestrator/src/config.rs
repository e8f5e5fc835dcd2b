use crate::router::RouterConfig;
use crate::runtime::RuntimeConfig;
use cohort_agent::{ProviderConfig, RetryPolicy};
use cohort_core::{AllocationStrategy, CohortError, CohortResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Contents of `cohort.toml`.
///
/// ```toml
/// allocation_strategy = "least_busy"
///
/// [retry]
/// max_retries = 3
/// retry_backoff_ms = 500
///
/// [runtime]
/// health_check = true
///
/// [router]
/// default_provider = "claude"
///
/// [[providers]]
/// name = "claude"
/// kind = "echo"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Overrides the allocation strategy of teams loaded from fixtures.
    #[serde(default)]
    pub allocation_strategy: Option<AllocationStrategy>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl OrchestratorConfig {
    pub fn from_toml(data: &str) -> CohortResult<Self> {
        let config: Self = toml::from_str(data)
            .map_err(|e| CohortError::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> CohortResult<Self> {
        let data = tokio::fs::read_to_string(path).await?;
        Self::from_toml(&data)
    }

    pub fn validate(&self) -> CohortResult<()> {
        self.router.validate()?;
        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.name.as_str()) {
                return Err(CohortError::Config(format!(
                    "provider '{}' is configured twice",
                    provider.name
                )));
            }
        }
        Ok(())
    }
}
