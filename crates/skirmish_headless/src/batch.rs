//! Batch match runner.
//!
//! Runs many seeds of one scenario in parallel using rayon and aggregates
//! the outcomes.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::metrics::{BatchSummary, MatchMetrics};
use crate::runner::MatchRunner;
use crate::scenario::{Scenario, ScenarioError};

/// Configuration for a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Number of matches.
    pub game_count: u32,
    /// Worker threads (0 = rayon default).
    pub parallel_games: u32,
    /// Seed of the first match; match `i` uses `seed_start + i`.
    pub seed_start: u64,
    /// Tick cap override (`None` = the scenario's).
    pub max_ticks: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            game_count: 10,
            parallel_games: 0,
            seed_start: 0,
            max_ticks: None,
        }
    }
}

/// A match that failed to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    /// Match index.
    pub game_index: u32,
    /// Seed used.
    pub seed: u64,
    /// What went wrong.
    pub message: String,
}

/// Results from a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Scenario name.
    pub scenario: String,
    /// Configuration used.
    pub config: BatchConfig,
    /// Finished matches, in seed order.
    pub games: Vec<MatchMetrics>,
    /// Aggregate summary.
    pub summary: BatchSummary,
    /// Wall-clock runtime.
    pub duration_seconds: f64,
    /// Matches that failed.
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ScenarioError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Load results saved by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Default file name inside an output directory.
    #[must_use]
    pub fn default_path(dir: &Path) -> PathBuf {
        dir.join("batch.json")
    }
}

/// Run every seed of the batch.
pub fn run_batch(scenario: &Scenario, config: BatchConfig) -> Result<BatchResults, ScenarioError> {
    scenario.validate()?;
    let start = Instant::now();
    info!(
        scenario = %scenario.name,
        games = config.game_count,
        seed_start = config.seed_start,
        "Batch starting"
    );

    let play = |index: u32| {
        let seed = config.seed_start.wrapping_add(u64::from(index));
        let mut runner = MatchRunner::new(scenario.clone(), seed);
        if let Some(max_ticks) = config.max_ticks {
            runner = runner.with_max_ticks(max_ticks);
        }
        runner.run().map_err(|e| {
            warn!(game = index, seed, error = %e, "Match failed");
            BatchError {
                game_index: index,
                seed,
                message: e.to_string(),
            }
        })
    };

    let results: Vec<Result<MatchMetrics, BatchError>> = if config.parallel_games > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_games as usize)
            .build()
            .map_err(|e| ScenarioError::Invalid(format!("thread pool: {e}")))?;
        pool.install(|| (0..config.game_count).into_par_iter().map(play).collect())
    } else {
        (0..config.game_count).into_par_iter().map(play).collect()
    };

    let mut games = Vec::new();
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(game) => games.push(game),
            Err(err) => errors.push(err),
        }
    }

    let summary = BatchSummary::from_games(&games);
    let duration_seconds = start.elapsed().as_secs_f64();
    info!(
        games = games.len(),
        failed = errors.len(),
        seconds = duration_seconds,
        "Batch complete"
    );

    Ok(BatchResults {
        scenario: scenario.name.clone(),
        config,
        games,
        summary,
        duration_seconds,
        errors,
    })
}
