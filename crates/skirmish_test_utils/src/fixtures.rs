//! Test fixtures and helpers.
//!
//! Pre-built match setups and value helpers for consistent testing.

use fixed::types::I32F32;
use skirmish_core::ai::Difficulty;
use skirmish_core::config::SimConfig;
use skirmish_core::economy::{ResourceKind, Resources};
use skirmish_core::math::Vec2Fixed;
use skirmish_core::races::Race;
use skirmish_core::simulation::Simulation;

/// Minerals in each fixture resource node.
pub const NODE_MINERALS: u32 = 1500;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Integer world position.
#[must_use]
pub fn pos(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::from_ints(x, y)
}

/// Default config with a fixed seed and a generous stockpile.
#[must_use]
pub fn test_config(seed: u64) -> SimConfig {
    SimConfig {
        seed,
        starting_resources: Resources::new(1000, 200),
        ..SimConfig::default()
    }
}

/// Two players (Vanguard as 1, Swarm as 2) on an empty map.
///
/// # Panics
///
/// Panics if the fixture config is rejected.
#[must_use]
pub fn two_player_sim(seed: u64) -> Simulation {
    let mut sim = Simulation::new(test_config(seed)).expect("fixture config is valid");
    sim.add_player(1, Race::Vanguard).expect("player 1");
    sim.add_player(2, Race::Swarm).expect("player 2");
    sim
}

/// Two AI players with starting bases in opposite corners and a pair of
/// mineral nodes beside each base.
///
/// # Panics
///
/// Panics if the fixture setup is rejected.
#[must_use]
pub fn ai_match(seed: u64, difficulty: Difficulty) -> Simulation {
    let mut sim = two_player_sim(seed);
    for (player, x) in [(1, 300), (2, 1700)] {
        sim.enable_ai(player, Some(difficulty)).expect("ai");
        sim.setup_starting_base(player, pos(x, x)).expect("base");
        for offset in [-150, 150] {
            sim.spawn_resource(ResourceKind::Minerals, NODE_MINERALS, pos(x + offset, x), fixed(12));
        }
    }
    // Expansion targets in the middle of the map.
    sim.spawn_resource(ResourceKind::Minerals, NODE_MINERALS, pos(1000, 700), fixed(12));
    sim.spawn_resource(ResourceKind::Minerals, NODE_MINERALS, pos(1000, 1300), fixed(12));
    sim
}

/// Tick until `done` holds or `max_ticks` pass. Returns the tick count at
/// which `done` first held.
pub fn run_until<F>(sim: &mut Simulation, max_ticks: u64, mut done: F) -> Option<u64>
where
    F: FnMut(&Simulation) -> bool,
{
    for _ in 0..max_ticks {
        if done(sim) {
            return Some(sim.get_tick());
        }
        sim.tick();
    }
    done(sim).then(|| sim.get_tick())
}
