use crate::memory::MemoryStore;
use cohort_core::{AllocationStrategy, CohortError, CohortResult, Task, Team, Teammate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

/// Team section of a fixture file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamSection {
    pub name: String,
    #[serde(default)]
    pub allocation_strategy: AllocationStrategy,
    #[serde(default = "default_max_teammates")]
    pub max_teammates: u32,
}

fn default_max_teammates() -> u32 {
    5
}

/// A teammate entry in a fixture file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeammateFixture {
    pub name: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub skills: Vec<String>,
}

fn default_role() -> String {
    "generalist".to_string()
}

fn default_provider() -> String {
    "claude".to_string()
}

fn default_model() -> String {
    "claude-sonnet".to_string()
}

/// A task entry in a fixture file. `key` is a local name used by
/// `blocked_by`; real ids are generated when the fixture is seeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFixture {
    pub key: String,
    pub subject: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub blocked_by: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A whole team described in one TOML or JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamFixture {
    pub team: TeamSection,
    #[serde(default)]
    pub teammates: Vec<TeammateFixture>,
    #[serde(default)]
    pub tasks: Vec<TaskFixture>,
}

/// Ids produced by [`TeamFixture::seed`].
#[derive(Debug, Clone)]
pub struct SeededTeam {
    pub team_id: Uuid,
    /// Fixture key → generated task id.
    pub task_ids: HashMap<String, Uuid>,
    /// Teammate ids in roster order.
    pub teammate_ids: Vec<Uuid>,
}

impl SeededTeam {
    /// Reverse lookup of a task id to its fixture key.
    pub fn key_of(&self, id: Uuid) -> Option<&str> {
        self.task_ids
            .iter()
            .find(|(_, v)| **v == id)
            .map(|(k, _)| k.as_str())
    }
}

impl TeamFixture {
    /// Parse a fixture. Files ending in `.json` are read as JSON, anything
    /// else as TOML.
    pub async fn from_path(path: &Path) -> CohortResult<Self> {
        let data = tokio::fs::read_to_string(path).await?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Ok(serde_json::from_str(&data)?)
        } else {
            Self::from_toml(&data)
        }
    }

    pub fn from_toml(data: &str) -> CohortResult<Self> {
        toml::from_str(data)
            .map_err(|e| CohortError::Config(format!("Invalid team fixture: {e}")))
    }

    /// Insert the team, its roster, tasks and edges into `store`.
    ///
    /// Every `blocked_by` key must name a task of the same fixture.
    pub async fn seed(&self, store: &MemoryStore) -> CohortResult<SeededTeam> {
        let mut task_ids = HashMap::new();
        for task in &self.tasks {
            if task_ids.insert(task.key.clone(), Uuid::new_v4()).is_some() {
                return Err(CohortError::Config(format!(
                    "duplicate task key '{}' in fixture",
                    task.key
                )));
            }
        }
        for task in &self.tasks {
            if let Some(missing) = task.blocked_by.iter().find(|k| !task_ids.contains_key(*k)) {
                return Err(CohortError::Config(format!(
                    "task '{}' is blocked by unknown task '{missing}'",
                    task.key
                )));
            }
        }

        let team = Team::new(&self.team.name)
            .with_strategy(self.team.allocation_strategy)
            .with_max_teammates(self.team.max_teammates);
        let team_id = store.insert_team(team).await;

        if self.teammates.len() > self.team.max_teammates as usize {
            tracing::warn!(
                team = %self.team.name,
                roster = self.teammates.len(),
                max = self.team.max_teammates,
                "fixture roster exceeds max_teammates, extra teammates ignored"
            );
        }

        let mut teammate_ids = Vec::new();
        for mate in self.teammates.iter().take(self.team.max_teammates as usize) {
            let teammate = Teammate::new(team_id, &mate.name, &mate.role)
                .with_provider(&mate.provider, &mate.model)
                .with_skills(mate.skills.iter().cloned());
            teammate_ids.push(store.insert_teammate(teammate).await?);
        }

        for fixture in &self.tasks {
            let mut task = Task::new(team_id, &fixture.subject, &fixture.description)
                .with_priority(fixture.priority)
                .with_metadata(fixture.metadata.clone());
            if let Some(id) = task_ids.get(&fixture.key) {
                task.id = *id;
            }
            store.insert_task(task).await?;
        }

        for fixture in &self.tasks {
            let Some(&task_id) = task_ids.get(&fixture.key) else {
                continue;
            };
            for key in &fixture.blocked_by {
                if let Some(&prerequisite) = task_ids.get(key) {
                    store.add_dependency(task_id, prerequisite).await?;
                }
            }
        }

        tracing::debug!(
            team_id = %team_id,
            teammates = teammate_ids.len(),
            tasks = task_ids.len(),
            edges = store.dependency_count().await,
            "seeded team fixture"
        );

        Ok(SeededTeam {
            team_id,
            task_ids,
            teammate_ids,
        })
    }
}
