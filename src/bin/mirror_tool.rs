use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use mirrorstore::{
    CommandDispatcher, MirrorStore, ScriptedTransport, Settlement, StorePolicy, TransportError,
    UpdateOperation, UpdateTriple,
};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mirror-tool")]
#[command(about = "Developer tooling for mirror store snapshots and update triples")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply a JSON list of update operations to a state file and print the result.
    Apply {
        #[arg(long)]
        state: PathBuf,
        #[arg(long)]
        updates: PathBuf,
        /// Save the result back to the state file.
        #[arg(long)]
        write: bool,
    },
    /// Check that every optimistic pending marker is settled by both branches.
    CheckTriple {
        #[arg(long)]
        triple: PathBuf,
    },
    /// Run a triple against a state file through a scripted command outcome.
    Simulate {
        #[arg(long)]
        state: PathBuf,
        #[arg(long)]
        triple: PathBuf,
        #[arg(long, value_enum, default_value_t = Outcome::Success)]
        outcome: Outcome,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Outcome {
    Success,
    Failure,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Apply {
            state,
            updates,
            write,
        } => apply_updates(&state, &updates, write),
        Command::CheckTriple { triple } => check_triple(&triple),
        Command::Simulate {
            state,
            triple,
            outcome,
        } => simulate(&state, &triple, outcome).await,
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse '{}'", path.display()))
}

fn print_state(label: &str, store: &MirrorStore) -> Result<()> {
    println!("{}:", label);
    println!("{}", serde_json::to_string_pretty(&store.snapshot()?)?);
    Ok(())
}

fn apply_updates(state: &Path, updates: &Path, write: bool) -> Result<()> {
    let ops: Vec<UpdateOperation> = read_json(updates)?;
    let store = MirrorStore::load_snapshot(state, StorePolicy::default())?;

    store
        .apply_all(&ops)
        .with_context(|| format!("Failed to apply '{}'", updates.display()))?;
    print_state(&format!("After {} operations", ops.len()), &store)?;

    if write {
        let written = store.save_snapshot(state)?;
        println!("{} keys saved to {}", written, state.display());
    }
    Ok(())
}

fn check_triple(path: &Path) -> Result<()> {
    let triple: UpdateTriple = read_json(path)?;
    triple.validate_operations()?;
    triple
        .validate()
        .map_err(|e| anyhow!("{}: {}", path.display(), e))?;

    println!(
        "OK: {} optimistic, {} success, {} failure operations",
        triple.optimistic.len(),
        triple.success.len(),
        triple.failure.len()
    );
    Ok(())
}

async fn simulate(state: &Path, triple: &Path, outcome: Outcome) -> Result<()> {
    const COMMAND: &str = "Simulate";

    let triple: UpdateTriple = read_json(triple)?;
    let store = MirrorStore::load_snapshot(state, StorePolicy::default())?;

    let transport = Arc::new(ScriptedTransport::new());
    if let Outcome::Failure = outcome {
        transport.fail_with(COMMAND, TransportError::validation("simulated failure"));
    }
    transport.pause();

    let dispatcher =
        CommandDispatcher::start(store.clone(), transport.clone(), Default::default());
    let handle = dispatcher.write(COMMAND, json!({}), triple)?;
    print_state("After optimistic", &store)?;

    transport.resume();
    let settlement = handle.settled().await?;
    dispatcher.shutdown().await?;
    info!(?settlement, "simulated command settled");

    let label = match settlement {
        Settlement::Succeeded => "After success".to_string(),
        Settlement::Failed(kind) => format!("After failure ({:?})", kind),
    };
    print_state(&label, &store)
}
