use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ironsieve::fixtures::{generate_csv, Injection};
use ironsieve::handler::{handle, InvocationEvent};
use ironsieve::io::compression::open_input;
use ironsieve::io::store::LocalStore;
use ironsieve::spool::AtomicFile;
use ironsieve::{CleansingEngine, EngineConfig, OrderingPolicy, TransferConfig};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Prefix for engine settings read from the environment.
const ENV_PREFIX: &str = "IRONSIEVE_";

#[derive(Parser)]
#[command(
    name = "ironsieve",
    version,
    about = "Split large CSV files into accepted and rejected records"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(clap::Args)]
struct EngineArgs {
    /// Concurrent validation tasks
    #[arg(long)]
    workers: Option<usize>,
    /// Records per batch
    #[arg(long)]
    batch_size: Option<usize>,
    /// Maximum batches in flight (default: twice the workers)
    #[arg(long)]
    in_flight: Option<usize>,
    /// Output ordering: input or completion
    #[arg(long)]
    ordering: Option<OrderingPolicy>,
}

impl EngineArgs {
    fn to_config(&self) -> Result<EngineConfig> {
        let mut config = EngineConfig::from_env(ENV_PREFIX)?;
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(batch_size) = self.batch_size {
            config = config.with_batch_size(batch_size);
        }
        if let Some(in_flight) = self.in_flight {
            config = config.with_in_flight(in_flight);
        }
        if let Some(ordering) = self.ordering {
            config = config.with_ordering(ordering);
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Cleanse a local file
    Run {
        /// Input CSV, optionally compressed
        #[arg(long)]
        input: PathBuf,
        /// Destination for accepted records
        #[arg(long)]
        accepted: PathBuf,
        /// Destination for rejected records
        #[arg(long)]
        rejected: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Run one invocation against a directory-backed object store
    Invoke {
        /// Store root; buckets are its subdirectories
        #[arg(long)]
        root: PathBuf,
        /// JSON invocation event
        #[arg(long)]
        event: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Write a synthetic input file
    Generate {
        #[arg(long)]
        output: PathBuf,
        /// Data rows to write
        #[arg(long, conflicts_with = "size_mb")]
        rows: Option<u64>,
        /// Approximate file size in MiB
        #[arg(long)]
        size_mb: Option<u64>,
        /// none, null-id, long-name or bad-date-format
        #[arg(long, default_value = "none")]
        inject: Injection,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

fn init_logging(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    match cli.command {
        Commands::Run {
            input,
            accepted,
            rejected,
            engine,
        } => run(&input, &accepted, &rejected, &engine),
        Commands::Invoke { root, event, engine } => invoke(&root, &event, &engine),
        Commands::Generate {
            output,
            rows,
            size_mb,
            inject,
            seed,
        } => {
            let rows = rows.unwrap_or_else(|| ironsieve::fixtures::rows_for_size(size_mb.unwrap_or(10)));
            let file = File::create(&output).with_context(|| format!("create {}", output.display()))?;
            let generated = generate_csv(BufWriter::new(file), rows, inject, seed)?;
            tracing::info!(
                path = %output.display(),
                rows = generated.rows,
                injected = generated.injected,
                "generated"
            );
            Ok(())
        }
    }
}

fn run(input: &Path, accepted: &Path, rejected: &Path, args: &EngineArgs) -> Result<()> {
    let engine = CleansingEngine::new(args.to_config()?)?;
    let file = File::open(input).with_context(|| format!("open {}", input.display()))?;
    let reader = open_input(file, &input.to_string_lossy())?;

    let out = engine
        .run(reader, AtomicFile::new(accepted)?, AtomicFile::new(rejected)?)
        .with_context(|| format!("cleanse {}", input.display()))?;
    out.accepted.persist()?;
    out.rejected.persist()?;

    println!("{}", serde_json::to_string_pretty(&out.summary)?);
    Ok(())
}

fn invoke(root: &Path, event: &Path, args: &EngineArgs) -> Result<()> {
    let raw = std::fs::read_to_string(event).with_context(|| format!("read {}", event.display()))?;
    let event: InvocationEvent =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", event.display()))?;
    let engine = CleansingEngine::new(args.to_config()?)?;
    let store = LocalStore::new(root);

    let summary = handle(&event, &store, &engine, &TransferConfig::default())?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
