//! # Skirmish Core
//!
//! Tick-based simulation core for a real-time skirmish game.
//!
//! This crate contains **only** simulation logic:
//! - No rendering
//! - No IO
//! - No system randomness (AI rolls come from seeded generators)
//! - No floating-point math in the tick (uses fixed-point)
//!
//! Identical inputs produce identical runs, which keeps tests and replays
//! reproducible and lets the headless runner verify matches.
//!
//! ## Crate Structure
//!
//! - [`spatial`] - Grid index: proximity queries, placement, overlap resolution
//! - [`units`] - Per-unit behavioral state machine
//! - [`buildings`] - Construction, production queues, healing
//! - [`ai`] - Autonomous opponent decision loop
//! - [`simulation`] - Tick phases and the command surface
//! - [`snapshot`] - Persisted snapshots and the save/load port
//! - [`components`], [`economy`], [`races`] - Data model and templates
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod ai;
pub mod buildings;
pub mod components;
pub mod config;
pub mod economy;
pub mod error;
pub mod math;
pub mod races;
pub mod simulation;
pub mod snapshot;
pub mod spatial;
pub mod units;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::ai::{AiController, AiOrder, AiState, Difficulty};
    pub use crate::buildings::{Building, ProductionItem, ProductionQueue, Producer};
    pub use crate::components::{
        Attacker, EntityClass, EntityId, Health, Movable, PlayerId, Projectile, Target, Unit,
        UnitCommand, UnitState, Worker,
    };
    pub use crate::config::SimConfig;
    pub use crate::economy::{Player, ResourceKind, ResourceNode, Resources};
    pub use crate::error::{CommandError, GameError, Result};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::races::{BuildingKind, Catalog, Race, UnitKind};
    pub use crate::simulation::{Command, Simulation, TickEvents, TICK_RATE};
    pub use crate::snapshot::{MemorySnapshotStore, SnapshotPort, WorldSnapshot};
    pub use crate::spatial::{ClassFilter, Placement, PlacementOutcome, SpatialIndex};
    pub use crate::world::World;
}
