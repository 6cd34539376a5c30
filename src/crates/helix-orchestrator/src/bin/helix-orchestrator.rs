//! helix-orchestrator binary
//!
//! Runs tasks through the reference agent suite and prints final states as
//! JSON on stdout. Logs go to stderr, filtered by `RUST_LOG`.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use helix_checkpoint::{CheckpointSaver, FileCheckpointSaver};
use helix_orchestrator::config::loader::load_config_file;
use helix_orchestrator::spawner::{
    EchoHandler, HandlerTable, InMemoryAuditLog, InMemoryCostLedger, StaticModelRouter,
};
use helix_orchestrator::{
    telemetry, ModelSpawner, Orchestrator, OrchestratorConfig, OrchestratorState, RunOptions,
};
use serde_json::json;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "helix-orchestrator")]
#[command(about = "Run tasks through the supervisor/specialist graph", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// Budget every run starts with, in cents
    #[arg(long, env = "HELIX_BUDGET_CENTS", default_value_t = 1_000, global = true)]
    budget_cents: u64,

    /// YAML config merged over the defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory for file-backed checkpoints
    #[arg(long, env = "HELIX_CHECKPOINT_DIR", global = true)]
    checkpoint_dir: Option<PathBuf>,

    /// User the spawned operations are billed to
    #[arg(long, default_value = "cli", global = true)]
    user_id: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task to completion
    Run {
        #[arg(short, long)]
        task: String,

        #[arg(long)]
        thread_id: Option<String>,
    },

    /// Run a task, printing each completed node
    Stream {
        #[arg(short, long)]
        task: String,

        #[arg(long)]
        thread_id: Option<String>,
    },

    /// Run a task under two configs side by side
    Compare {
        #[arg(short, long)]
        task: String,

        /// YAML config for the first path
        #[arg(long)]
        config_a: PathBuf,

        /// YAML config for the second path
        #[arg(long)]
        config_b: PathBuf,
    },

    /// Continue from a stored checkpoint (needs --checkpoint-dir)
    Resume {
        #[arg(long)]
        checkpoint_id: String,
    },

    /// Print every checkpointed state of a thread (needs --checkpoint-dir)
    History {
        #[arg(long)]
        thread_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();
    let cli = Cli::parse();
    let common = &cli.common;

    let config = resolve_config(common.config.as_deref())?;
    let spawner = Arc::new(build_spawner(&config)?);
    let orchestrator = Orchestrator::reference(common.budget_cents).with_spawner(spawner.clone());

    let mut options = RunOptions::default()
        .with_config(serde_json::to_value(&config)?)
        .with_user_id(common.user_id.clone());
    let checkpointer = match &common.checkpoint_dir {
        Some(dir) => {
            let saver = FileCheckpointSaver::open(dir.clone())
                .await
                .with_context(|| format!("opening checkpoint dir {}", dir.display()))?;
            let saver: Arc<dyn CheckpointSaver<OrchestratorState>> = Arc::new(saver);
            options = options.with_checkpointer(saver.clone());
            Some(saver)
        }
        None => None,
    };

    let output = match cli.command {
        Commands::Run { task, thread_id } => {
            if let Some(id) = thread_id {
                options = options.with_thread_id(id);
            }
            let outcome = orchestrator.run_detailed(&task, options).await?;
            json!({ "thread_id": outcome.thread_id, "state": outcome.state })
        }
        Commands::Stream { task, thread_id } => {
            if let Some(id) = thread_id {
                options = options.with_thread_id(id);
            }
            let mut on_step = |node: &str, state: &OrchestratorState| {
                eprintln!("[{}] {} message(s)", node, state.messages().len());
                ControlFlow::Continue(())
            };
            let outcome = orchestrator
                .stream_detailed(&task, Some(&mut on_step), options)
                .await?;
            json!({ "thread_id": outcome.thread_id, "state": outcome.state })
        }
        Commands::Compare {
            task,
            config_a,
            config_b,
        } => {
            let a = serde_json::to_value(resolve_config(Some(&config_a))?)?;
            let b = serde_json::to_value(resolve_config(Some(&config_b))?)?;
            let comparison = orchestrator
                .compare_execution_paths(&task, a, b, options)
                .await?;
            json!({
                "path1": { "thread_id": comparison.path1.thread_id, "state": comparison.path1.state },
                "path2": { "thread_id": comparison.path2.thread_id, "state": comparison.path2.state },
            })
        }
        Commands::Resume { checkpoint_id } => {
            let state = orchestrator.resume(&checkpoint_id, options).await?;
            json!({ "state": state })
        }
        Commands::History { thread_id } => {
            let saver = checkpointer.context("history needs --checkpoint-dir")?;
            let states = orchestrator
                .get_execution_history(&thread_id, &*saver)
                .await?;
            json!({ "thread_id": thread_id, "states": states })
        }
    };

    spawner.wait_idle().await;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn resolve_config(path: Option<&Path>) -> Result<OrchestratorConfig> {
    let mut config = match path {
        Some(path) => load_config_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => OrchestratorConfig::default(),
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

fn build_spawner(config: &OrchestratorConfig) -> Result<ModelSpawner> {
    let router = StaticModelRouter::from_config(config);
    let default_selection = router.default_selection().clone();
    let handlers = HandlerTable::builder()
        .fallback(Arc::new(EchoHandler::new()))
        .build()?;
    Ok(ModelSpawner::new(
        Arc::new(router),
        Arc::new(InMemoryCostLedger::new()),
        Arc::new(InMemoryAuditLog::new()),
        handlers,
        default_selection,
    ))
}
