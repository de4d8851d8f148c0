//! CLI command definitions for shell-forge.
//!
//! Every subcommand builds an [`AppConfig`] from defaults, an optional YAML
//! file, the environment and finally its own flags.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::info;

use crate::config::AppConfig;
use crate::dataset::{ScenarioDataset, ScenarioQuery};
use crate::llm::{LiteLlmClient, LlmProvider};
use crate::metrics;
use crate::rollout::{PromptStyle, RolloutEngine};
use crate::sandbox::{SandboxClient, SandboxService};
use crate::storage::JsonlLog;
use crate::synthesis::SynthesisPipeline;
use crate::training::{benchmark, GroupCollector};

/// Default output file for collected trajectories.
const DEFAULT_TRAJECTORY_OUTPUT: &str = "./trajectories.jsonl";

/// Multi-turn shell-agent rollouts, reward shaping and task synthesis.
#[derive(Parser)]
#[command(name = "shell-forge")]
#[command(about = "Roll out shell agents in sandboxes and synthesize validated shell tasks")]
#[command(version)]
#[command(
    long_about = "shell-forge drives a language model through multi-turn shell sessions in remote sandboxes,\nscores the resulting trajectories, and synthesizes new shell tasks that are validated by\nrepeated solving.\n\nExample usage:\n  shell-forge rollout --split train --limit 8 --rollouts 4 -o ./trajectories.jsonl"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// YAML configuration file.
    #[arg(long, env = "SHELL_FORGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Sandbox service URL.
    #[arg(long, global = true)]
    pub sandbox_url: Option<String>,

    /// Model to use (defaults to LITELLM_DEFAULT_MODEL).
    #[arg(short = 'm', long, global = true)]
    pub model: Option<String>,

    /// Write Prometheus metrics to this file when the command finishes.
    #[arg(long, global = true)]
    pub metrics_file: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Check the sandbox service and list its sandboxes.
    Status(StatusArgs),

    /// Run scored rollouts over a dataset split and write trajectories.
    Rollout(RolloutArgs),

    /// Run one greedy rollout per scenario and report mean reward and accuracy.
    #[command(alias = "bench")]
    Benchmark(BenchmarkArgs),

    /// Generate, validate and persist new shell tasks from seed tasks.
    #[command(alias = "synth")]
    Synthesize(SynthesizeArgs),
}

/// Arguments for `shell-forge status`.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Output JSON to stdout.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Scenario selection shared by rollout and benchmark.
#[derive(Parser, Debug)]
pub struct ScenarioArgs {
    /// Scenario directory (defaults to the configured dataset_dir).
    #[arg(short = 'd', long)]
    pub dataset_dir: Option<PathBuf>,

    /// Dataset split to load.
    #[arg(short = 's', long, default_value = "train")]
    pub split: String,

    /// Maximum number of scenarios.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Shuffle scenarios before applying the limit.
    #[arg(long)]
    pub shuffle: bool,

    /// Seed for a reproducible shuffle (implies --shuffle).
    #[arg(long)]
    pub seed: Option<u64>,

    /// Only run scenarios of this difficulty tier.
    #[arg(long)]
    pub difficulty: Option<u32>,

    /// Wrap the task in the shell-mode system prompt.
    #[arg(long)]
    pub shell_mode: bool,
}

impl ScenarioArgs {
    fn query(&self) -> ScenarioQuery {
        let mut query = ScenarioQuery::new();
        if let Some(limit) = self.limit {
            query = query.with_limit(limit);
        }
        if self.shuffle || self.seed.is_some() {
            query = query.with_shuffle(self.seed);
        }
        if let Some(difficulty) = self.difficulty {
            query = query.with_difficulty(difficulty);
        }
        query
    }
}

/// Arguments for `shell-forge rollout`.
#[derive(Parser, Debug)]
pub struct RolloutArgs {
    #[command(flatten)]
    pub scenarios: ScenarioArgs,

    /// Rollouts per scenario.
    #[arg(short = 'r', long, default_value = "1")]
    pub rollouts: usize,

    /// Maximum turns per rollout.
    #[arg(long)]
    pub max_turns: Option<u32>,

    /// Sampling temperature.
    #[arg(short = 't', long)]
    pub temperature: Option<f64>,

    /// Output JSONL file for trajectories.
    #[arg(short = 'o', long, default_value = DEFAULT_TRAJECTORY_OUTPUT)]
    pub output: PathBuf,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `shell-forge benchmark`.
#[derive(Parser, Debug)]
pub struct BenchmarkArgs {
    #[command(flatten)]
    pub scenarios: ScenarioArgs,

    /// Also write the benchmark trajectories to this JSONL file.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `shell-forge synthesize`.
#[derive(Parser, Debug)]
pub struct SynthesizeArgs {
    /// Seed scenario directory (defaults to the configured dataset_dir).
    #[arg(short = 'd', long)]
    pub dataset_dir: Option<PathBuf>,

    /// Split seed tasks are drawn from.
    #[arg(long)]
    pub seed_split: Option<String>,

    /// Accepted tasks wanted per difficulty tier.
    #[arg(short = 'n', long)]
    pub tasks_per_difficulty: Option<usize>,

    /// Comma-separated difficulty tiers (discovered from seeds when unset).
    #[arg(long)]
    pub difficulties: Option<String>,

    /// Solve attempts per candidate.
    #[arg(short = 'k', long)]
    pub k: Option<usize>,

    /// Fraction of attempts that must solve the task.
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Output directory for task and rollout logs.
    #[arg(short = 'o', long)]
    pub out_dir: Option<PathBuf>,

    /// Persist unsolved rollouts as well.
    #[arg(long)]
    pub save_all_rollouts: bool,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
///
/// This is the main entry point for the shell-forge CLI.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Failed to initialize metrics");
    }

    let mut config = load_config(&cli)?;
    match cli.command {
        Commands::Status(args) => run_status_command(&config, args).await?,
        Commands::Rollout(args) => run_rollout_command(&mut config, args).await?,
        Commands::Benchmark(args) => run_benchmark_command(&mut config, args).await?,
        Commands::Synthesize(args) => run_synthesize_command(&mut config, args).await?,
    }

    if let Some(path) = &cli.metrics_file {
        std::fs::write(path, metrics::export_metrics())?;
        info!(path = %path.display(), "Wrote metrics");
    }
    Ok(())
}

/// Defaults, then YAML, then environment, then global flags.
fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_yaml_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", path.display(), e))?,
        None => AppConfig::default(),
    };
    config.apply_env()?;

    if let Some(url) = &cli.sandbox_url {
        config.sandbox.url = url.clone();
    }
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
        config.rollout.model = model.clone();
        config.synthesis.model = model.clone();
    }
    config.resolve_models();
    Ok(config)
}

async fn connect_sandbox(config: &AppConfig) -> anyhow::Result<Arc<dyn SandboxService>> {
    let client = SandboxClient::connect(config.sandbox.url.as_str())
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "Sandbox service at {} is not reachable: {}",
                config.sandbox.url,
                e
            )
        })?;
    info!(url = %client.base_url(), "Connected to sandbox service");
    Ok(Arc::new(client))
}

fn build_llm_client(config: &AppConfig) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let api_base = config.llm.api_base.clone().ok_or_else(|| {
        anyhow::anyhow!("No model endpoint configured. Set LITELLM_API_BASE or llm.api_base.")
    })?;
    info!(api_base = %api_base, model = %config.llm.model, "Using LiteLLM client");
    let client = LiteLlmClient::new(api_base, config.llm.api_key.clone(), config.llm.model.clone())?;
    Ok(Arc::new(client))
}

fn apply_scenario_args(config: &mut AppConfig, args: &ScenarioArgs) {
    if let Some(dir) = &args.dataset_dir {
        config.dataset_dir = dir.clone();
    }
    if args.shell_mode {
        config.rollout.prompt_style = PromptStyle::ShellMode;
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Status
// ============================================================================

async fn run_status_command(config: &AppConfig, args: StatusArgs) -> anyhow::Result<()> {
    let sandbox = connect_sandbox(config).await?;
    let sandboxes = sandbox.list_sandboxes().await?;

    if args.json {
        return print_json(&serde_json::json!({
            "url": config.sandbox.url,
            "healthy": true,
            "sandboxes": sandboxes,
        }));
    }

    println!("Sandbox service: {} (healthy)", config.sandbox.url);
    println!("Sandboxes: {}", sandboxes.len());
    for info in &sandboxes {
        let last = info
            .last_standalone_exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {}  {:<10} image={} commands={} last_exit={}",
            info.id, info.status, info.image, info.session_command_count, last
        );
    }
    Ok(())
}

// ============================================================================
// Rollout
// ============================================================================

#[derive(Debug, Serialize)]
struct RolloutSummary {
    scenarios: usize,
    trajectories: usize,
    mean_reward: f64,
    success_rate: f64,
    output: String,
}

async fn run_rollout_command(config: &mut AppConfig, args: RolloutArgs) -> anyhow::Result<()> {
    apply_scenario_args(config, &args.scenarios);
    if let Some(max_turns) = args.max_turns {
        config.sampling.max_turns = max_turns;
    }
    if let Some(temperature) = args.temperature {
        config.sampling.temperature = temperature;
    }
    config.validate()?;

    let dataset = ScenarioDataset::new(&config.dataset_dir);
    let scenarios = dataset
        .load_scenarios(&args.scenarios.split, &args.scenarios.query())
        .await?;
    if scenarios.is_empty() {
        return Err(anyhow::anyhow!(
            "No scenarios selected from split '{}'",
            args.scenarios.split
        ));
    }
    info!(count = scenarios.len(), split = %args.scenarios.split, "Loaded scenarios");

    let engine = RolloutEngine::new(
        connect_sandbox(config).await?,
        build_llm_client(config)?,
        config.rollout.clone(),
    );
    let collector = GroupCollector::new(engine)
        .with_rollouts_per_group(args.rollouts)
        .with_config(config.sampling);

    let groups = collector.collect(&scenarios).await;
    let log = JsonlLog::new(&args.output);
    let mut written = 0usize;
    let mut total_reward = 0.0;
    let mut successes = 0usize;
    for trajectory in groups.iter().flat_map(|g| g.trajectories.iter()) {
        log.append(trajectory).await?;
        written += 1;
        total_reward += trajectory.reward;
        if trajectory.success_condition_passed {
            successes += 1;
        }
    }

    let summary = RolloutSummary {
        scenarios: scenarios.len(),
        trajectories: written,
        mean_reward: if written == 0 { 0.0 } else { total_reward / written as f64 },
        success_rate: if written == 0 { 0.0 } else { successes as f64 / written as f64 },
        output: args.output.display().to_string(),
    };

    if args.json {
        return print_json(&summary);
    }
    println!(
        "Wrote {} trajectories for {} scenarios to {}",
        summary.trajectories, summary.scenarios, summary.output
    );
    println!(
        "Mean reward: {:.4}  Success rate: {:.1}%",
        summary.mean_reward,
        summary.success_rate * 100.0
    );
    Ok(())
}

// ============================================================================
// Benchmark
// ============================================================================

#[derive(Debug, Serialize)]
struct BenchmarkSummary {
    split: String,
    scenarios: usize,
    completed: usize,
    mean_reward: f64,
    accuracy: f64,
}

async fn run_benchmark_command(config: &mut AppConfig, args: BenchmarkArgs) -> anyhow::Result<()> {
    apply_scenario_args(config, &args.scenarios);
    config.validate()?;

    let dataset = ScenarioDataset::new(&config.dataset_dir);
    let scenarios = dataset
        .load_scenarios(&args.scenarios.split, &args.scenarios.query())
        .await?;
    info!(count = scenarios.len(), split = %args.scenarios.split, "Loaded benchmark scenarios");

    let engine = RolloutEngine::new(
        connect_sandbox(config).await?,
        build_llm_client(config)?,
        config.rollout.clone(),
    );
    let report = benchmark(&engine, &scenarios).await;

    if let Some(path) = &args.output {
        let log = JsonlLog::new(path);
        for trajectory in &report.trajectories {
            log.append(trajectory).await?;
        }
    }

    let summary = BenchmarkSummary {
        split: args.scenarios.split.clone(),
        scenarios: scenarios.len(),
        completed: report.trajectories.len(),
        mean_reward: report.mean_reward,
        accuracy: report.accuracy,
    };
    if args.json {
        return print_json(&summary);
    }
    println!(
        "Benchmark on '{}': {} scenarios, {} completed",
        summary.split, summary.scenarios, summary.completed
    );
    println!(
        "Mean reward: {:.4}  Accuracy: {:.1}%",
        summary.mean_reward,
        summary.accuracy * 100.0
    );
    Ok(())
}

// ============================================================================
// Synthesize
// ============================================================================

fn parse_difficulties(raw: &str) -> anyhow::Result<Vec<u32>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .map_err(|_| anyhow::anyhow!("Invalid difficulty tier '{}'", s))
        })
        .collect()
}

async fn run_synthesize_command(config: &mut AppConfig, args: SynthesizeArgs) -> anyhow::Result<()> {
    if let Some(dir) = &args.dataset_dir {
        config.dataset_dir = dir.clone();
    }
    let synthesis = &mut config.synthesis;
    if let Some(split) = &args.seed_split {
        synthesis.seed_split = split.clone();
    }
    if let Some(n) = args.tasks_per_difficulty {
        synthesis.tasks_per_difficulty = n;
    }
    if let Some(raw) = &args.difficulties {
        synthesis.difficulties = Some(parse_difficulties(raw)?);
    }
    if let Some(k) = args.k {
        synthesis.k = k;
    }
    if let Some(threshold) = args.threshold {
        synthesis.threshold = threshold;
    }
    if let Some(out_dir) = &args.out_dir {
        synthesis.out_dir = out_dir.clone();
    }
    if args.save_all_rollouts {
        synthesis.save_all_rollouts = true;
    }
    config.validate()?;

    let pipeline = SynthesisPipeline::new(
        connect_sandbox(config).await?,
        build_llm_client(config)?,
        config.synthesis.clone(),
    );
    let report = pipeline
        .run(&ScenarioDataset::new(&config.dataset_dir))
        .await?;

    if args.json {
        let tiers: Vec<serde_json::Value> = report
            .tiers
            .iter()
            .map(|t| {
                serde_json::json!({
                    "difficulty": t.difficulty,
                    "target": t.target,
                    "existing": t.existing,
                    "accepted": t.accepted,
                    "pairs_processed": t.pairs_processed,
                    "outcomes": t.outcomes,
                    "seed_error": t.seed_error,
                })
            })
            .collect();
        return print_json(&serde_json::json!({
            "out_dir": display(&config.synthesis.out_dir),
            "accepted": report.accepted(),
            "tiers": tiers,
        }));
    }

    println!(
        "Accepted {} new tasks into {}",
        report.accepted(),
        display(&config.synthesis.out_dir)
    );
    for tier in &report.tiers {
        println!(
            "  difficulty {}: {}/{} ({} new, {} pairs tried)",
            tier.difficulty,
            tier.total(),
            tier.target,
            tier.accepted,
            tier.pairs_processed
        );
        if let Some(e) = &tier.seed_error {
            println!("    seeds unavailable: {}", e);
        }
    }
    Ok(())
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
