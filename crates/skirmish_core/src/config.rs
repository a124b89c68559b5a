//! Simulation configuration.

use serde::{Deserialize, Serialize};

use crate::ai::Difficulty;
use crate::economy::Resources;
use crate::error::{GameError, Result};
use crate::math::Fixed;
use crate::simulation::TICK_RATE;

/// Smallest supported world edge.
pub const MIN_WORLD_SIZE: u32 = 64;

/// Largest supported world edge. Squared distances across the whole map
/// must fit the fixed-point integer range.
pub const MAX_WORLD_SIZE: u32 = 16_384;

/// Tunables for one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Edge length of the square world.
    pub world_size: u32,
    /// Edge length of a spatial index cell.
    pub cell_size: u32,
    /// How often the spatial index is rebuilt, in simulated milliseconds.
    pub index_rebuild_ms: u32,
    /// Match seed for AI randomness.
    pub seed: u64,
    /// Stockpile every player starts with.
    pub starting_resources: Resources,
    /// Difficulty for AI players added without an explicit one.
    pub default_difficulty: Difficulty,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            world_size: 2048,
            cell_size: 64,
            index_rebuild_ms: 100,
            seed: 0,
            starting_resources: Resources::new(500, 0),
            default_difficulty: Difficulty::Medium,
        }
    }
}

impl SimConfig {
    /// Parse and validate a RON config.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        let config: Self =
            ron::from_str(ron).map_err(|e| GameError::DataParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field is in range.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_WORLD_SIZE..=MAX_WORLD_SIZE).contains(&self.world_size) {
            return Err(GameError::InvalidConfig(format!(
                "world_size {} outside {MIN_WORLD_SIZE}..={MAX_WORLD_SIZE}",
                self.world_size
            )));
        }
        if self.cell_size == 0 || self.cell_size > self.world_size {
            return Err(GameError::InvalidConfig(format!(
                "cell_size {} must be in 1..={}",
                self.cell_size, self.world_size
            )));
        }
        if self.index_rebuild_ms == 0 {
            return Err(GameError::InvalidConfig(
                "index_rebuild_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// World edge as a fixed-point value.
    #[must_use]
    pub fn world_size_fixed(&self) -> Fixed {
        Fixed::from_num(self.world_size)
    }

    /// Index rebuild cadence in ticks (at least one).
    #[must_use]
    pub fn rebuild_interval_ticks(&self) -> u64 {
        (u64::from(self.index_rebuild_ms) * u64::from(TICK_RATE) / 1000).max(1)
    }
}
