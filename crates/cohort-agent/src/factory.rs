use crate::backends::{CommandClient, EchoClient, UnavailableClient};
use crate::client::ProviderClient;
use crate::config::{ClientKind, ProviderConfig};
use cohort_core::{CohortError, CohortResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Builds a client for a provider name.
pub type ClientConstructor = Arc<dyn Fn(&str) -> Arc<dyn ProviderClient> + Send + Sync>;

/// Registry mapping provider ids to client constructors.
///
/// Unknown providers go to the default constructor, which out of the box
/// yields an [`UnavailableClient`]. Adding a provider is a `register` call,
/// never a new match arm.
pub struct ProviderClientFactory {
    constructors: HashMap<String, ClientConstructor>,
    default: ClientConstructor,
}

impl ProviderClientFactory {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
            default: Arc::new(|name: &str| {
                Arc::new(UnavailableClient::new(name)) as Arc<dyn ProviderClient>
            }),
        }
    }

    /// Register (or replace) the constructor for `provider`.
    pub fn register<F>(&mut self, provider: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&str) -> Arc<dyn ProviderClient> + Send + Sync + 'static,
    {
        self.constructors
            .insert(provider.into(), Arc::new(constructor));
        self
    }

    /// Register a shared client instance; every `create` returns the same one.
    pub fn register_client(
        &mut self,
        provider: impl Into<String>,
        client: Arc<dyn ProviderClient>,
    ) -> &mut Self {
        self.register(provider, move |_| Arc::clone(&client))
    }

    /// Replace the constructor used for unregistered providers.
    pub fn with_default<F>(mut self, constructor: F) -> Self
    where
        F: Fn(&str) -> Arc<dyn ProviderClient> + Send + Sync + 'static,
    {
        self.default = Arc::new(constructor);
        self
    }

    pub fn is_registered(&self, provider: &str) -> bool {
        self.constructors.contains_key(provider)
    }

    /// Registered provider names, sorted.
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn create(&self, provider: &str) -> Arc<dyn ProviderClient> {
        match self.constructors.get(provider) {
            Some(constructor) => constructor(provider),
            None => {
                tracing::debug!(provider, "no client registered, using default");
                (self.default)(provider)
            }
        }
    }

    /// Build a factory from `[[providers]]` configuration entries.
    ///
    /// Echo and command clients are created once and shared, so the echo
    /// failure counter spans the whole run.
    pub fn from_config(providers: &[ProviderConfig]) -> CohortResult<Self> {
        let mut factory = Self::new();
        for config in providers {
            let client: Arc<dyn ProviderClient> = match config.kind {
                ClientKind::Echo => Arc::new(
                    EchoClient::new(&config.name)
                        .failing_first(config.fail_first)
                        .with_cost(config.cost_per_1k_tokens),
                ),
                ClientKind::Command => {
                    let program = config.program.clone().ok_or_else(|| {
                        CohortError::Config(format!(
                            "provider '{}' is a command client but has no program",
                            config.name
                        ))
                    })?;
                    Arc::new(
                        CommandClient::new(&config.name, program)
                            .with_args(config.args.clone())
                            .with_timeout(Duration::from_secs(config.timeout_secs)),
                    )
                }
                ClientKind::Unavailable => Arc::new(UnavailableClient::new(&config.name)),
            };
            factory.register_client(config.name.clone(), client);
        }
        Ok(factory)
    }
}

impl Default for ProviderClientFactory {
    fn default() -> Self {
        Self::new()
    }
}
