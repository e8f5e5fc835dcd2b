use cohort_core::{CohortError, CohortResult, Task};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Model and price of one catalog provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub model: String,
    #[serde(default)]
    pub cost_per_1k_tokens: f64,
}

impl ProviderSpec {
    fn new(model: &str, cost_per_1k_tokens: f64) -> Self {
        Self {
            model: model.to_string(),
            cost_per_1k_tokens,
        }
    }
}

/// `[router]` configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Provider for tasks with no specialist cue.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Provider for translation and non-Latin text.
    #[serde(default = "default_language_provider")]
    pub language_provider: String,
    /// Provider for backend, database and API work.
    #[serde(default = "default_coding_provider")]
    pub coding_provider: String,
    /// Whole words that mark a task as language work.
    #[serde(default = "default_language_cues")]
    pub language_cues: Vec<String>,
    /// Whole words that mark a task as coding work.
    #[serde(default = "default_coding_cues")]
    pub coding_cues: Vec<String>,
    #[serde(default = "default_catalog")]
    pub catalog: BTreeMap<String, ProviderSpec>,
    /// Failed provider -> provider to try next.
    #[serde(default = "default_fallbacks")]
    pub fallbacks: BTreeMap<String, String>,
}

fn default_provider() -> String {
    "claude".into()
}

fn default_language_provider() -> String {
    "qwen".into()
}

fn default_coding_provider() -> String {
    "codex".into()
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| (*w).to_string()).collect()
}

fn default_language_cues() -> Vec<String> {
    words(&[
        "translate",
        "translated",
        "translating",
        "translation",
        "translations",
        "translator",
        "localize",
        "localise",
        "localization",
        "localisation",
        "i18n",
        "l10n",
        "multilingual",
        "chinese",
        "japanese",
        "korean",
        "russian",
        "arabic",
    ])
}

fn default_coding_cues() -> Vec<String> {
    words(&[
        "backend",
        "back-end",
        "database",
        "databases",
        "db",
        "sql",
        "schema",
        "migration",
        "migrations",
        "api",
        "apis",
        "endpoint",
        "endpoints",
        "rest",
        "graphql",
        "server",
        "microservice",
        "microservices",
        "query",
        "queries",
    ])
}

fn default_catalog() -> BTreeMap<String, ProviderSpec> {
    [
        ("claude", ProviderSpec::new("claude-sonnet", 3.0)),
        ("codex", ProviderSpec::new("gpt-5-codex", 1.25)),
        ("deepseek", ProviderSpec::new("deepseek-chat", 0.28)),
        ("gemini", ProviderSpec::new("gemini-2.5-pro", 1.25)),
        ("kimi", ProviderSpec::new("kimi-k2", 0.6)),
        ("qwen", ProviderSpec::new("qwen-max", 1.6)),
    ]
    .into_iter()
    .map(|(name, spec)| (name.to_string(), spec))
    .collect()
}

fn default_fallbacks() -> BTreeMap<String, String> {
    [
        ("claude", "deepseek"),
        ("deepseek", "claude"),
        ("codex", "claude"),
        ("qwen", "kimi"),
        ("kimi", "qwen"),
        ("gemini", "claude"),
    ]
    .into_iter()
    .map(|(from, to)| (from.to_string(), to.to_string()))
    .collect()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            language_provider: default_language_provider(),
            coding_provider: default_coding_provider(),
            language_cues: default_language_cues(),
            coding_cues: default_coding_cues(),
            catalog: default_catalog(),
            fallbacks: default_fallbacks(),
        }
    }
}

impl RouterConfig {
    /// Route targets must name catalog providers.
    pub fn validate(&self) -> CohortResult<()> {
        for (field, provider) in [
            ("default_provider", &self.default_provider),
            ("language_provider", &self.language_provider),
            ("coding_provider", &self.coding_provider),
        ] {
            if !self.catalog.contains_key(provider) {
                return Err(CohortError::Config(format!(
                    "router.{field} '{provider}' is not in the provider catalog"
                )));
            }
        }
        for (from, to) in &self.fallbacks {
            if !self.catalog.contains_key(to) {
                return Err(CohortError::Config(format!(
                    "router fallback {from} -> {to}: '{to}' is not in the provider catalog"
                )));
            }
        }
        Ok(())
    }
}

/// Which kind of provider a task calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Default,
    Language,
    Coding,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Default => write!(f, "default"),
            Route::Language => write!(f, "language"),
            Route::Coding => write!(f, "coding"),
        }
    }
}

/// A provider together with the model and price to use on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSelection {
    pub provider: String,
    pub model: String,
    pub cost_per_1k_tokens: f64,
}

/// Maps task content to a provider and picks alternatives after a failure.
///
/// Routing is a pure function of the task text: the same subject and
/// description always give the same selection.
pub struct ProviderRouter {
    config: RouterConfig,
    non_latin: Regex,
    language_cues: Option<Regex>,
    coding_cues: Option<Regex>,
}

fn cue_pattern(cues: &[String]) -> CohortResult<Option<Regex>> {
    let alternatives: Vec<String> = cues
        .iter()
        .map(|cue| cue.trim())
        .filter(|cue| !cue.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
    Regex::new(&pattern)
        .map(Some)
        .map_err(|e| CohortError::Config(format!("invalid router cue: {e}")))
}

impl ProviderRouter {
    pub fn new(config: RouterConfig) -> CohortResult<Self> {
        config.validate()?;
        let non_latin = Regex::new(
            r"[\p{Han}\p{Hiragana}\p{Katakana}\p{Hangul}\p{Cyrillic}\p{Arabic}\p{Hebrew}\p{Thai}\p{Devanagari}]",
        )
        .map_err(|e| CohortError::Config(format!("invalid script pattern: {e}")))?;
        Ok(Self {
            language_cues: cue_pattern(&config.language_cues)?,
            coding_cues: cue_pattern(&config.coding_cues)?,
            non_latin,
            config,
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Classify free text. Language cues win over coding cues.
    pub fn classify(&self, text: &str) -> Route {
        let matches = |re: &Option<Regex>| re.as_ref().is_some_and(|re| re.is_match(text));
        if self.non_latin.is_match(text) || matches(&self.language_cues) {
            Route::Language
        } else if matches(&self.coding_cues) {
            Route::Coding
        } else {
            Route::Default
        }
    }

    pub fn provider_for(&self, route: Route) -> &str {
        match route {
            Route::Default => &self.config.default_provider,
            Route::Language => &self.config.language_provider,
            Route::Coding => &self.config.coding_provider,
        }
    }

    /// Catalog model and price for `provider`; unknown providers get the
    /// `default` model at no cost.
    pub fn selection_for(&self, provider: &str) -> ProviderSelection {
        match self.config.catalog.get(provider) {
            Some(spec) => ProviderSelection {
                provider: provider.to_string(),
                model: spec.model.clone(),
                cost_per_1k_tokens: spec.cost_per_1k_tokens,
            },
            None => ProviderSelection {
                provider: provider.to_string(),
                model: "default".into(),
                cost_per_1k_tokens: 0.0,
            },
        }
    }

    pub fn select_provider(&self, task: &Task) -> ProviderSelection {
        let route = self.classify(&task.text());
        let selection = self.selection_for(self.provider_for(route));
        debug!(
            task_id = %task.id,
            route = %route,
            provider = %selection.provider,
            "router: provider selected"
        );
        selection
    }

    /// Provider to try after `failed_provider` failed on `task`.
    ///
    /// Never returns `failed_provider` while the catalog holds any other
    /// provider.
    pub fn failover(&self, task: &Task, failed_provider: &str) -> ProviderSelection {
        let mut next = self
            .config
            .fallbacks
            .get(failed_provider)
            .unwrap_or(&self.config.default_provider)
            .as_str();

        if next == failed_provider {
            match self
                .config
                .catalog
                .keys()
                .find(|name| name.as_str() != failed_provider)
            {
                Some(other) => next = other.as_str(),
                None => warn!(
                    task_id = %task.id,
                    provider = failed_provider,
                    "router: no alternative provider in catalog"
                ),
            }
        }

        debug!(task_id = %task.id, from = failed_provider, to = next, "router: failover");
        self.selection_for(next)
    }
}
