//! Scenario loading and configuration.
//!
//! A scenario is a RON file describing the match config, the players with
//! their starting bases and AI difficulty, and the resource nodes on the map.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use skirmish_core::ai::Difficulty;
use skirmish_core::components::PlayerId;
use skirmish_core::config::SimConfig;
use skirmish_core::economy::ResourceKind;
use skirmish_core::error::GameError;
use skirmish_core::math::{Fixed, Vec2Fixed};
use skirmish_core::races::Race;
use skirmish_core::simulation::{Simulation, TICK_RATE};

/// Error type for scenario and runner operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read or write a file.
    #[error("I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// Failed to encode or decode JSON.
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    /// The scenario is well-formed but inconsistent.
    #[error("Invalid scenario: {0}")]
    Invalid(String),
    /// The simulation rejected the setup.
    #[error(transparent)]
    Game(#[from] GameError),
}

/// One player's starting setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSetup {
    /// Player id.
    pub id: PlayerId,
    /// Race.
    pub race: Race,
    /// Starting base center.
    pub base: (i32, i32),
    /// AI difficulty; `None` leaves the player idle.
    #[serde(default)]
    pub ai: Option<Difficulty>,
}

/// A resource node on the map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePlacement {
    /// Currency the node yields.
    pub kind: ResourceKind,
    /// Center.
    pub position: (i32, i32),
    /// Starting amount.
    pub amount: u32,
    /// Radius.
    #[serde(default = "default_node_radius")]
    pub radius: i32,
}

const fn default_node_radius() -> i32 {
    12
}

impl NodePlacement {
    /// A mineral node with the default radius.
    #[must_use]
    pub const fn minerals(x: i32, y: i32, amount: u32) -> Self {
        Self {
            kind: ResourceKind::Minerals,
            position: (x, y),
            amount,
            radius: default_node_radius(),
        }
    }

    /// A gas node with the default radius.
    #[must_use]
    pub const fn gas(x: i32, y: i32, amount: u32) -> Self {
        Self {
            kind: ResourceKind::Gas,
            position: (x, y),
            amount,
            radius: default_node_radius(),
        }
    }
}

/// A complete scenario configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Match tunables. The seed is overridden per run.
    #[serde(default)]
    pub config: SimConfig,
    /// Players.
    pub players: Vec<PlayerSetup>,
    /// Resource nodes.
    #[serde(default)]
    pub resources: Vec<NodePlacement>,
    /// Match length cap in ticks.
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,
}

const fn default_max_ticks() -> u64 {
    // 15 minutes of game time.
    15 * 60 * TICK_RATE as u64
}

impl Default for Scenario {
    fn default() -> Self {
        Self::skirmish_1v1()
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let scenario = Self::from_ron_str(&contents)?;
        debug!(name = %scenario.name, path = %path.display(), "Scenario loaded");
        Ok(scenario)
    }

    /// Load from a RON string and validate.
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Self = ron::from_str(ron)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Resolve a CLI argument: a built-in name or a path to a RON file.
    pub fn resolve(name_or_path: &str) -> Result<Self, ScenarioError> {
        match name_or_path {
            "skirmish_1v1" => Ok(Self::skirmish_1v1()),
            "mirror" => Ok(Self::mirror()),
            path => Self::load(path),
        }
    }

    /// Standard 1v1 between two medium AIs on a 2048 map.
    #[must_use]
    pub fn skirmish_1v1() -> Self {
        Self {
            name: "skirmish_1v1".to_string(),
            description: "Vanguard against Swarm, bases in opposite corners".to_string(),
            config: SimConfig::default(),
            players: vec![
                PlayerSetup {
                    id: 1,
                    race: Race::Vanguard,
                    base: (300, 300),
                    ai: Some(Difficulty::Medium),
                },
                PlayerSetup {
                    id: 2,
                    race: Race::Swarm,
                    base: (1748, 1748),
                    ai: Some(Difficulty::Medium),
                },
            ],
            resources: vec![
                NodePlacement::minerals(150, 300, 1500),
                NodePlacement::minerals(300, 150, 1500),
                NodePlacement::gas(450, 180, 800),
                NodePlacement::minerals(1898, 1748, 1500),
                NodePlacement::minerals(1748, 1898, 1500),
                NodePlacement::gas(1598, 1868, 800),
                // Contested expansions
                NodePlacement::minerals(700, 1350, 2500),
                NodePlacement::minerals(1350, 700, 2500),
            ],
            max_ticks: default_max_ticks(),
        }
    }

    /// Same race on both sides, hard AIs.
    #[must_use]
    pub fn mirror() -> Self {
        let mut scenario = Self::skirmish_1v1();
        scenario.name = "mirror".to_string();
        scenario.description = "Vanguard mirror between hard AIs".to_string();
        for player in &mut scenario.players {
            player.race = Race::Vanguard;
            player.ai = Some(Difficulty::Hard);
        }
        scenario
    }

    /// Check the scenario before building a match from it.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.config.validate()?;
        if self.players.len() < 2 {
            return Err(ScenarioError::Invalid(format!(
                "{} needs at least two players",
                self.name
            )));
        }
        let mut ids: Vec<PlayerId> = self.players.iter().map(|p| p.id).collect();
        ids.sort_unstable();
        if ids.windows(2).any(|w| w[0] == w[1]) {
            return Err(ScenarioError::Invalid(format!(
                "{} has duplicate player ids",
                self.name
            )));
        }
        let size = i64::from(self.config.world_size);
        let outside = |(x, y): (i32, i32)| {
            !(0..=size).contains(&i64::from(x)) || !(0..=size).contains(&i64::from(y))
        };
        if self.players.iter().any(|p| outside(p.base))
            || self.resources.iter().any(|n| outside(n.position))
        {
            return Err(ScenarioError::Invalid(format!(
                "{} places something outside the {size} world",
                self.name
            )));
        }
        Ok(())
    }

    /// Build the simulation for one run with the given seed.
    pub fn build(&self, seed: u64) -> Result<Simulation, ScenarioError> {
        self.validate()?;
        let config = SimConfig {
            seed,
            ..self.config.clone()
        };
        let mut sim = Simulation::new(config)?;
        for player in &self.players {
            sim.add_player(player.id, player.race)?;
            if let Some(difficulty) = player.ai {
                sim.enable_ai(player.id, Some(difficulty))?;
            }
        }
        for player in &self.players {
            let (x, y) = player.base;
            sim.setup_starting_base(player.id, Vec2Fixed::from_ints(x, y))?;
        }
        for node in &self.resources {
            let (x, y) = node.position;
            sim.spawn_resource(
                node.kind,
                node.amount,
                Vec2Fixed::from_ints(x, y),
                Fixed::from_num(node.radius),
            );
        }
        Ok(sim)
    }

    /// Write the scenario as pretty RON.
    pub fn to_ron(&self) -> Result<String, ScenarioError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ScenarioError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_scenarios_are_valid() {
        assert!(Scenario::skirmish_1v1().validate().is_ok());
        assert!(Scenario::mirror().validate().is_ok());
    }

    #[test]
    fn test_build_sets_up_bases_and_ai() {
        let sim = Scenario::skirmish_1v1().build(7).unwrap();
        assert_eq!(sim.config().seed, 7);
        assert_eq!(sim.world().buildings.len(), 2);
        assert_eq!(sim.world().resources.len(), 8);
        assert!(sim.ai(1).is_some());
        assert!(sim.ai(2).is_some());
    }

    #[test]
    fn test_ron_roundtrip() {
        let scenario = Scenario::mirror();
        let ron = scenario.to_ron().unwrap();
        let parsed = Scenario::from_ron_str(&ron).unwrap();
        assert_eq!(parsed, scenario);
    }

    #[test]
    fn test_minimal_ron_uses_defaults() {
        let scenario = Scenario::from_ron_str(
            r#"(
                name: "tiny",
                players: [
                    (id: 1, race: Vanguard, base: (200, 200)),
                    (id: 2, race: Ascendant, base: (800, 800), ai: Some(Easy)),
                ],
            )"#,
        )
        .unwrap();
        assert_eq!(scenario.config, SimConfig::default());
        assert_eq!(scenario.max_ticks, default_max_ticks());
        assert!(scenario.resources.is_empty());
        assert_eq!(scenario.players[0].ai, None);
    }

    #[test]
    fn test_rejects_duplicate_players() {
        let mut scenario = Scenario::skirmish_1v1();
        scenario.players[1].id = 1;
        assert!(matches!(scenario.validate(), Err(ScenarioError::Invalid(_))));
    }

    #[test]
    fn test_rejects_out_of_world_base() {
        let mut scenario = Scenario::skirmish_1v1();
        scenario.players[0].base = (5000, 10);
        assert!(matches!(scenario.validate(), Err(ScenarioError::Invalid(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Scenario::load("/definitely/not/here.ron"),
            Err(ScenarioError::FileNotFound(_))
        ));
    }
}
