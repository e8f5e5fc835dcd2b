use cohort_agent::{EchoClient, ProviderClient, ProviderClientFactory};
use cohort_core::{Task, TracingBroker};
use cohort_orchestrator::{
    DependencyGraph, DependencyResolver, Orchestrator, OrchestratorConfig, ProviderRouter,
};
use cohort_session::InMemorySessionManager;
use cohort_store::{MemoryStore, TeamFixture};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "cohort", about = "Cohort: team task orchestration across AI providers")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "cohort.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the execution order, cycles and provider routes of a team fixture
    Plan {
        /// Team fixture (TOML, or JSON with a .json extension)
        fixture: PathBuf,
    },
    /// Run a team fixture to completion against the configured providers
    Run {
        /// Team fixture (TOML, or JSON with a .json extension)
        fixture: PathBuf,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn load_config(path: &Path) -> anyhow::Result<OrchestratorConfig> {
    if !path.exists() {
        info!(path = %path.display(), "config file not found, using defaults");
        return Ok(OrchestratorConfig::default());
    }
    OrchestratorConfig::load(path).await.map_err(|e| {
        anyhow::anyhow!("Failed to load config file '{}': {e}", path.display())
    })
}

/// Clients from `[[providers]]`, with every other catalog provider served
/// by a local echo client priced at its catalog rate.
fn build_factory(config: &OrchestratorConfig) -> anyhow::Result<ProviderClientFactory> {
    let mut factory = ProviderClientFactory::from_config(&config.providers)?;
    for (name, spec) in &config.router.catalog {
        if factory.is_registered(name) {
            continue;
        }
        let cost = spec.cost_per_1k_tokens;
        factory.register(name.as_str(), move |provider| {
            Arc::new(EchoClient::new(provider).with_cost(cost)) as Arc<dyn ProviderClient>
        });
    }
    Ok(factory)
}

/// Human-readable plan for a fixture: order, cycles and one route per task.
fn plan_lines(fixture: &TeamFixture, router: &ProviderRouter) -> Vec<String> {
    let graph: DependencyGraph<String> = fixture
        .tasks
        .iter()
        .map(|t| (t.key.clone(), t.blocked_by.clone()))
        .collect();

    let mut lines = vec![format!("Team: {}", fixture.team.name)];
    match DependencyResolver::topological_sort(&graph) {
        Ok(order) => {
            lines.push("Execution order:".into());
            for (idx, key) in order.iter().enumerate() {
                lines.push(format!("  {}. {key}", idx + 1));
            }
        }
        Err(e) => {
            lines.push(format!("Invalid graph: {e}"));
            for cycle in DependencyResolver::detect_cycles(&graph) {
                lines.push(format!("  cycle: {}", cycle.join(" -> ")));
            }
        }
    }

    lines.push("Routes:".into());
    for fixture_task in &fixture.tasks {
        let task = Task::new(Uuid::nil(), &fixture_task.subject, &fixture_task.description);
        let route = router.classify(&task.text());
        let selection = router.select_provider(&task);
        lines.push(format!(
            "  {}: {route} -> {} ({})",
            fixture_task.key, selection.provider, selection.model
        ));
    }
    lines
}

async fn run_fixture(
    config: &OrchestratorConfig,
    mut fixture: TeamFixture,
    json: bool,
) -> anyhow::Result<()> {
    if let Some(strategy) = config.allocation_strategy {
        fixture.team.allocation_strategy = strategy;
    }

    let store = Arc::new(MemoryStore::new());
    let seeded = fixture.seed(&store).await?;
    let orchestrator = Orchestrator::new(
        config,
        store,
        Arc::new(TracingBroker),
        Arc::new(InMemorySessionManager::new()),
        Arc::new(build_factory(config)?),
    )?;

    let summary = orchestrator.run_team(seeded.team_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Team '{}' finished as {}", fixture.team.name, summary.status);
    let mut keys: HashMap<Uuid, &str> = HashMap::new();
    for (key, id) in &seeded.task_ids {
        keys.insert(*id, key.as_str());
    }
    for execution in &summary.executions {
        let key = keys.get(&execution.task_id).copied().unwrap_or("?");
        let outcome = if execution.success { "ok" } else { "failed" };
        println!(
            "  {key}: {outcome} on {} after {} attempt(s)",
            execution.provider, execution.attempts
        );
        if let Some(error) = &execution.error {
            println!("    error: {error}");
        }
    }
    println!(
        "Completed: {}  Failed: {}  Pending: {}  Cost: ${:.4}",
        summary.completed, summary.failed, summary.pending, summary.total_cost_usd
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = load_config(&cli.config).await?;

    match cli.command {
        Commands::Plan { fixture } => {
            let fixture = TeamFixture::from_path(&fixture).await?;
            let router = ProviderRouter::new(config.router.clone())?;
            for line in plan_lines(&fixture, &router) {
                println!("{line}");
            }
        }
        Commands::Run { fixture, json } => {
            let fixture = TeamFixture::from_path(&fixture).await?;
            if fixture.tasks.is_empty() {
                warn!(team = %fixture.team.name, "fixture has no tasks");
            }
            run_fixture(&config, fixture, json).await?;
        }
    }

    Ok(())
}
