use serde::{Deserialize, Serialize};

/// Which built-in client backs a provider name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    /// Local deterministic simulator; echoes the prompt back.
    #[default]
    Echo,
    /// Run a local command in headless mode with the prompt as last argument.
    Command,
    /// Always fails; the default for unknown providers.
    Unavailable,
}

/// One `[[providers]]` entry of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub kind: ClientKind,
    /// Executable for [`ClientKind::Command`].
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Echo only: number of initial runs that fail, to rehearse failover.
    #[serde(default)]
    pub fail_first: u32,
    #[serde(default)]
    pub cost_per_1k_tokens: f64,
}

fn default_timeout_secs() -> u64 {
    300
}

impl ProviderConfig {
    pub fn echo(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ClientKind::Echo,
            program: None,
            args: Vec::new(),
            timeout_secs: default_timeout_secs(),
            fail_first: 0,
            cost_per_1k_tokens: 0.0,
        }
    }
}
