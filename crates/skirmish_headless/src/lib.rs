//! Headless match runner for AI testing and CI verification.
//!
//! Runs AI-vs-AI skirmishes without graphics:
//!
//! - **Scenarios**: RON files describing config, players and resource nodes
//! - **Batches**: many seeds in parallel, summarized as JSON
//! - **Verification**: replay a seed and compare state hashes
//! - **Snapshots**: periodic world snapshots written as RON or JSON files
//!
//! Logs go to stderr; machine-readable results go to stdout.
//!
//! # Example
//!
//! ```bash
//! # Run one match and print its metrics
//! cargo run -p skirmish_headless -- run --scenario skirmish_1v1 --seed 7
//!
//! # Run a batch of 100 seeds
//! cargo run -p skirmish_headless -- batch --count 100 --output results/
//!
//! # Verify determinism
//! cargo run -p skirmish_headless -- verify --seed 12345 --runs 5
//! ```

pub mod batch;
pub mod metrics;
pub mod runner;
pub mod scenario;
pub mod store;

pub use batch::{run_batch, BatchConfig, BatchResults};
pub use metrics::{BatchSummary, MatchMetrics, MatchOutcome, MetricsCollector, PlayerMetrics};
pub use runner::{resume, verify_determinism, MatchRunner, VerifyReport};
pub use scenario::{NodePlacement, PlayerSetup, Scenario, ScenarioError};
pub use store::{FileSnapshotStore, SnapshotFormat};
