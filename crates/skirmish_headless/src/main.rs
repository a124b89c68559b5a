//! Headless skirmish runner.
//!
//! Runs AI-vs-AI matches without graphics. Logs go to stderr, JSON results
//! to stdout.
//!
//! # Usage
//!
//! ```bash
//! # Run a single match
//! cargo run -p skirmish_headless -- run --scenario scenarios/three_way.ron --seed 3
//!
//! # Run a batch and save the results
//! cargo run -p skirmish_headless -- batch --count 100 --output results/
//!
//! # Verify determinism
//! cargo run -p skirmish_headless -- verify --seed 12345 --runs 5
//!
//! # Resume from a saved snapshot
//! cargo run -p skirmish_headless -- resume --dir snaps --name final --ticks 1200
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use skirmish_core::snapshot::SnapshotPort;
use skirmish_headless::{
    resume, run_batch, verify_determinism, BatchConfig, BatchResults, FileSnapshotStore,
    MatchRunner, Scenario, ScenarioError, SnapshotFormat,
};

#[derive(Parser)]
#[command(name = "skirmish_headless")]
#[command(about = "Headless skirmish runner for AI testing and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single match and print its metrics
    Run {
        /// Built-in scenario name or path to a RON file
        #[arg(short, long, default_value = "skirmish_1v1")]
        scenario: String,

        /// Match seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Override the scenario's tick cap
        #[arg(long)]
        max_ticks: Option<u64>,

        /// Directory to write snapshots into
        #[arg(long)]
        snapshot_dir: Option<PathBuf>,

        /// Ticks between periodic snapshots (0 = final snapshot only)
        #[arg(long, default_value = "0")]
        snapshot_every: u64,

        /// Snapshot file format
        #[arg(long, value_enum, default_value = "ron")]
        format: SnapshotFormat,
    },

    /// Run many seeds in parallel
    Batch {
        /// Built-in scenario name or path to a RON file
        #[arg(short, long, default_value = "skirmish_1v1")]
        scenario: String,

        /// Number of matches
        #[arg(short, long, default_value = "10")]
        count: u32,

        /// Worker threads (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Seed of the first match
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Override the scenario's tick cap
        #[arg(long)]
        max_ticks: Option<u64>,

        /// Directory to save batch.json into
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replay one seed several times and compare state hashes
    Verify {
        /// Built-in scenario name or path to a RON file
        #[arg(short, long, default_value = "skirmish_1v1")]
        scenario: String,

        /// Seed to replay
        #[arg(long, default_value = "12345")]
        seed: u64,

        /// Number of runs
        #[arg(short, long, default_value = "3")]
        runs: usize,

        /// Ticks per run
        #[arg(short, long, default_value = "2400")]
        ticks: u64,
    },

    /// Resume a match from a stored snapshot
    Resume {
        /// Scenario the snapshot came from
        #[arg(short, long, default_value = "skirmish_1v1")]
        scenario: String,

        /// Snapshot directory
        #[arg(long)]
        dir: PathBuf,

        /// Snapshot name
        #[arg(long, default_value = "final")]
        name: String,

        /// Snapshot file format
        #[arg(long, value_enum, default_value = "ron")]
        format: SnapshotFormat,

        /// Seed for the resumed AIs
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Ticks to run after resuming
        #[arg(short, long, default_value = "1200")]
        ticks: u64,
    },

    /// List snapshots in a directory
    Snapshots {
        /// Snapshot directory
        #[arg(long)]
        dir: PathBuf,

        /// Snapshot file format
        #[arg(long, value_enum, default_value = "ron")]
        format: SnapshotFormat,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs to stderr; stdout carries JSON.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    match dispatch(cli.command) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(command: Commands) -> Result<ExitCode, ScenarioError> {
    match command {
        Commands::Run {
            scenario,
            seed,
            max_ticks,
            snapshot_dir,
            snapshot_every,
            format,
        } => {
            let scenario = Scenario::resolve(&scenario)?;
            let mut runner = MatchRunner::new(scenario, seed).with_snapshot_every(snapshot_every);
            if let Some(max_ticks) = max_ticks {
                runner = runner.with_max_ticks(max_ticks);
            }
            let metrics = match snapshot_dir {
                Some(dir) => {
                    let mut store = FileSnapshotStore::open(dir, format)?;
                    runner.run_with_store(&mut store)?
                }
                None => runner.run()?,
            };
            print_json(&metrics)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Batch {
            scenario,
            count,
            parallel,
            seed,
            max_ticks,
            output,
        } => {
            let scenario = Scenario::resolve(&scenario)?;
            let config = BatchConfig {
                game_count: count,
                parallel_games: parallel,
                seed_start: seed,
                max_ticks,
            };
            let results = run_batch(&scenario, config)?;
            if let Some(dir) = output {
                let path = BatchResults::default_path(&dir);
                results.save(&path)?;
                tracing::info!(path = %path.display(), "Batch results saved");
            }
            print_json(&results.summary)?;
            Ok(if results.errors.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Verify {
            scenario,
            seed,
            runs,
            ticks,
        } => {
            let scenario = Scenario::resolve(&scenario)?;
            let report = verify_determinism(&scenario, seed, runs, ticks)?;
            print_json(&report)?;
            Ok(if report.deterministic {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Resume {
            scenario,
            dir,
            name,
            format,
            seed,
            ticks,
        } => {
            let scenario = Scenario::resolve(&scenario)?;
            let store = FileSnapshotStore::open(dir, format)?;
            let snapshot = store.load(&name)?;
            let metrics = resume(&scenario, seed, &snapshot, ticks)?;
            print_json(&metrics)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Snapshots { dir, format } => {
            let store = FileSnapshotStore::open(dir, format)?;
            print_json(&store.list()?)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), ScenarioError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
