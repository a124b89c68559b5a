//! Single-match runner.
//!
//! Builds a simulation from a [`Scenario`], ticks it until a player wins or
//! the tick cap is hit, and optionally writes periodic snapshots.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use skirmish_core::config::SimConfig;
use skirmish_core::error::Result as GameResult;
use skirmish_core::races::Catalog;
use skirmish_core::simulation::Simulation;
use skirmish_core::snapshot::{SnapshotPort, WorldSnapshot};

use crate::metrics::{MatchMetrics, MetricsCollector};
use crate::scenario::{Scenario, ScenarioError};

/// Runs one match of a scenario.
#[derive(Debug, Clone)]
pub struct MatchRunner {
    scenario: Scenario,
    seed: u64,
    max_ticks: u64,
    snapshot_every: Option<u64>,
}

impl MatchRunner {
    /// Runner using the scenario's own tick cap.
    #[must_use]
    pub fn new(scenario: Scenario, seed: u64) -> Self {
        let max_ticks = scenario.max_ticks;
        Self {
            scenario,
            seed,
            max_ticks,
            snapshot_every: None,
        }
    }

    /// Override the tick cap.
    #[must_use]
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Snapshot every `interval` ticks when a store is passed to
    /// [`run_with_store`](Self::run_with_store). Zero disables.
    #[must_use]
    pub fn with_snapshot_every(mut self, interval: u64) -> Self {
        self.snapshot_every = (interval > 0).then_some(interval);
        self
    }

    /// Play the match to the end.
    pub fn run(&self) -> Result<MatchMetrics, ScenarioError> {
        let mut sim = self.scenario.build(self.seed)?;
        self.play(&mut sim, None).map_err(ScenarioError::from)
    }

    /// Play the match, saving snapshots into `store` along the way and
    /// once more at the end as `final`.
    pub fn run_with_store(&self, store: &mut dyn SnapshotPort) -> Result<MatchMetrics, ScenarioError> {
        let mut sim = self.scenario.build(self.seed)?;
        self.play(&mut sim, Some(store)).map_err(ScenarioError::from)
    }

    fn play(
        &self,
        sim: &mut Simulation,
        mut store: Option<&mut dyn SnapshotPort>,
    ) -> GameResult<MatchMetrics> {
        info!(
            scenario = %self.scenario.name,
            seed = self.seed,
            max_ticks = self.max_ticks,
            "Match starting"
        );
        let mut collector = MetricsCollector::new(sim);

        while sim.get_tick() < self.max_ticks && sim.winner().is_none() {
            let events = sim.tick();
            collector.record(sim, &events);

            let tick = sim.get_tick();
            if let (Some(store), Some(every)) = (store.as_deref_mut(), self.snapshot_every) {
                if tick % every == 0 {
                    store.save(&format!("tick_{tick:08}"), &WorldSnapshot::capture(sim))?;
                    debug!(tick, "Periodic snapshot saved");
                }
            }
        }

        if let Some(store) = store {
            store.save("final", &WorldSnapshot::capture(sim))?;
        }

        let metrics = collector.finish(sim, &self.scenario.name);
        info!(
            scenario = %metrics.scenario,
            seed = metrics.seed,
            ticks = metrics.duration_ticks,
            winner = ?metrics.winner,
            state_hash = metrics.final_state_hash,
            "Match finished"
        );
        Ok(metrics)
    }
}

/// Outcome of replaying one seed several times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Scenario name.
    pub scenario: String,
    /// Seed replayed.
    pub seed: u64,
    /// Ticks per run.
    pub ticks: u64,
    /// Final hash of each run.
    pub hashes: Vec<u64>,
    /// Whether every run agreed.
    pub deterministic: bool,
    /// First tick the first two runs disagreed on, when they did.
    pub first_divergence: Option<u64>,
}

/// Replay `seed` `runs` times for `ticks` ticks and compare state hashes.
pub fn verify_determinism(
    scenario: &Scenario,
    seed: u64,
    runs: usize,
    ticks: u64,
) -> Result<VerifyReport, ScenarioError> {
    let mut hashes = Vec::with_capacity(runs);
    for _ in 0..runs {
        let mut sim = scenario.build(seed)?;
        sim.run(ticks);
        hashes.push(sim.state_hash());
    }
    let deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    let first_divergence = if deterministic {
        None
    } else {
        let mut a = scenario.build(seed)?;
        let mut b = scenario.build(seed)?;
        (1..=ticks).find(|_| {
            a.tick();
            b.tick();
            a.state_hash() != b.state_hash()
        })
    };

    Ok(VerifyReport {
        scenario: scenario.name.clone(),
        seed,
        ticks,
        hashes,
        deterministic,
        first_divergence,
    })
}

/// Resume a match from a stored snapshot and run it for `ticks` more.
///
/// AI controllers are not stored, so AI players from the scenario are
/// re-enabled with fresh controllers.
pub fn resume(
    scenario: &Scenario,
    seed: u64,
    snapshot: &WorldSnapshot,
    ticks: u64,
) -> Result<MatchMetrics, ScenarioError> {
    let config = SimConfig {
        seed,
        ..scenario.config.clone()
    };
    let mut sim = Simulation::from_snapshot(config, Catalog::standard(), snapshot)?;
    for player in &scenario.players {
        if let Some(difficulty) = player.ai {
            if sim.player(player.id).is_some() {
                sim.enable_ai(player.id, Some(difficulty))?;
            }
        }
    }

    let mut collector = MetricsCollector::new(&sim);
    let end = sim.get_tick() + ticks;
    while sim.get_tick() < end && sim.winner().is_none() {
        let events = sim.tick();
        collector.record(&sim, &events);
    }
    Ok(collector.finish(&sim, &scenario.name))
}
