//! Match metrics collection.
//!
//! The collector watches [`TickEvents`] as a match runs and keeps per-player
//! tallies; the batch summary aggregates finished matches.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use skirmish_core::components::{EntityId, PlayerId};
use skirmish_core::economy::ResourceKind;
use skirmish_core::simulation::{Simulation, TickEvents};

/// How a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
    /// One player is left standing.
    Elimination,
    /// The tick cap was reached first.
    TimeLimit,
}

/// Per-player tallies for one match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerMetrics {
    /// Race name.
    pub race: String,
    /// Minerals gathered.
    pub minerals_gathered: u64,
    /// Gas gathered.
    pub gas_gathered: u64,
    /// Units that finished training.
    pub units_produced: u32,
    /// Units and buildings lost.
    pub losses: u32,
    /// Buildings that finished construction.
    pub buildings_constructed: u32,
    /// Damage dealt by this player's units.
    pub damage_dealt: u64,
    /// Units alive at the end.
    pub final_units: usize,
    /// Buildings alive at the end.
    pub final_buildings: usize,
    /// AI state at the end, if AI controlled.
    pub final_ai_state: Option<String>,
}

/// Complete metrics for a single match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchMetrics {
    /// Scenario name.
    pub scenario: String,
    /// Seed used.
    pub seed: u64,
    /// Ticks simulated.
    pub duration_ticks: u64,
    /// Winning player, if any.
    pub winner: Option<PlayerId>,
    /// How the match ended.
    pub outcome: MatchOutcome,
    /// Final state hash (for determinism checks).
    pub final_state_hash: u64,
    /// AI orders rejected over the match.
    pub rejected_orders: u64,
    /// Per-player tallies.
    pub players: BTreeMap<PlayerId, PlayerMetrics>,
}

/// Accumulates [`PlayerMetrics`] tick by tick.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    players: BTreeMap<PlayerId, PlayerMetrics>,
    owners: BTreeMap<EntityId, PlayerId>,
    rejected_orders: u64,
}

impl MetricsCollector {
    /// Start collecting for the players of `sim`.
    #[must_use]
    pub fn new(sim: &Simulation) -> Self {
        let mut collector = Self::default();
        for player in sim.world().players.values() {
            collector.players.insert(
                player.id,
                PlayerMetrics {
                    race: player.race.name().to_string(),
                    ..PlayerMetrics::default()
                },
            );
        }
        collector.refresh_owners(sim);
        collector
    }

    fn refresh_owners(&mut self, sim: &Simulation) {
        let world = sim.world();
        for unit in world.units.values() {
            self.owners.insert(unit.id, unit.owner);
        }
        for building in world.buildings.values() {
            self.owners.insert(building.id, building.owner);
        }
    }

    fn player(&mut self, id: Option<PlayerId>) -> Option<&mut PlayerMetrics> {
        id.and_then(|id| self.players.get_mut(&id))
    }

    /// Fold in the events of the tick that just ran.
    pub fn record(&mut self, sim: &Simulation, events: &TickEvents) {
        self.rejected_orders += events.rejected_orders as u64;

        for gather in &events.gathered {
            let owner = self.owners.get(&gather.unit).copied();
            if let Some(metrics) = self.player(owner) {
                match gather.kind {
                    ResourceKind::Minerals => metrics.minerals_gathered += u64::from(gather.amount),
                    ResourceKind::Gas => metrics.gas_gathered += u64::from(gather.amount),
                }
            }
        }
        for hit in &events.damage {
            let owner = self.owners.get(&hit.source).copied();
            if let Some(metrics) = self.player(owner) {
                metrics.damage_dealt += u64::from(hit.amount);
            }
        }
        for &dead in &events.deaths {
            let owner = self.owners.remove(&dead);
            if let Some(metrics) = self.player(owner) {
                metrics.losses += 1;
            }
        }

        self.refresh_owners(sim);

        for produced in &events.produced {
            let owner = self.owners.get(&produced.unit).copied();
            if let Some(metrics) = self.player(owner) {
                metrics.units_produced += 1;
            }
        }
        for &site in &events.constructed {
            let owner = self.owners.get(&site).copied();
            if let Some(metrics) = self.player(owner) {
                metrics.buildings_constructed += 1;
            }
        }
    }

    /// Close out the match.
    #[must_use]
    pub fn finish(mut self, sim: &Simulation, scenario: &str) -> MatchMetrics {
        for (id, metrics) in &mut self.players {
            if let Some(player) = sim.player(*id) {
                metrics.final_units = player.units.len();
                metrics.final_buildings = player.buildings.len();
            }
            metrics.final_ai_state = sim.ai(*id).map(|ai| ai.state.name().to_string());
        }
        let winner = sim.winner();
        MatchMetrics {
            scenario: scenario.to_string(),
            seed: sim.config().seed,
            duration_ticks: sim.get_tick(),
            winner,
            outcome: if winner.is_some() {
                MatchOutcome::Elimination
            } else {
                MatchOutcome::TimeLimit
            },
            final_state_hash: sim.state_hash(),
            rejected_orders: self.rejected_orders,
            players: self.players,
        }
    }
}

/// Aggregate over a batch of matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Matches finished.
    pub total_games: usize,
    /// Wins per player id.
    pub wins: BTreeMap<PlayerId, usize>,
    /// Matches that hit the tick cap.
    pub time_limits: usize,
    /// Mean match length in ticks.
    pub avg_duration_ticks: f64,
    /// Win rate per player id.
    pub win_rates: BTreeMap<PlayerId, f64>,
}

impl BatchSummary {
    /// Summarize finished matches.
    #[must_use]
    pub fn from_games(games: &[MatchMetrics]) -> Self {
        if games.is_empty() {
            return Self::default();
        }
        let mut summary = Self {
            total_games: games.len(),
            ..Self::default()
        };
        let mut total_ticks = 0u64;
        for game in games {
            total_ticks += game.duration_ticks;
            match game.winner {
                Some(winner) => *summary.wins.entry(winner).or_default() += 1,
                None => summary.time_limits += 1,
            }
        }
        let count = games.len() as f64;
        summary.avg_duration_ticks = total_ticks as f64 / count;
        summary.win_rates = summary
            .wins
            .iter()
            .map(|(&player, &wins)| (player, wins as f64 / count))
            .collect();
        summary
    }
}
