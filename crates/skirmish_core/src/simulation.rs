//! Core simulation loop.
//!
//! The simulation runs at a fixed tick rate and owns every entity
//! collection. Each tick runs its phases in a fixed order:
//!
//! 1. **Index** - rebuild the spatial index when the cadence is due
//! 2. **Decisions** - AI controllers that are due emit orders, checked
//!    by the same command surface a player uses and held until the unit phase
//! 3. **Units** - pending AI orders are handed over, then per-unit state
//!    machines run
//! 4. **Buildings** - healing and production; finished units spawn
//! 5. **Projectiles** - homing, impact, lifetime
//! 6. **Collision** - overlap resolution between units
//! 7. **Cleanup** - dead units and buildings leave the world
//!
//! # Determinism
//!
//! - No floating-point math in the simulation (fixed-point via [`Fixed`])
//! - AI randomness comes from seeded `ChaCha8Rng`s
//! - Consistent iteration order (sorted entity ids)
//!
//! # Example
//!
//! ```
//! use skirmish_core::prelude::*;
//!
//! let mut sim = Simulation::new(SimConfig::default()).unwrap();
//! sim.add_player(1, Race::Vanguard).unwrap();
//! let worker = sim
//!     .spawn_unit(1, UnitKind::Worker, Vec2Fixed::from_ints(100, 100))
//!     .unwrap();
//!
//! sim.move_unit(worker, Vec2Fixed::from_ints(200, 100), false).unwrap();
//! sim.tick();
//! assert_eq!(sim.get_tick(), 1);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ai::{AiController, AiOrder, Difficulty};
use crate::buildings::{Building, ProductionItem};
use crate::components::{
    Attacker, EntityClass, EntityId, PlayerId, Target, Unit, UnitCommand, Worker,
};
use crate::config::SimConfig;
use crate::economy::{Player, ResourceKind, ResourceNode, Resources};
use crate::error::{CommandError, GameError, Result};
use crate::math::{Fixed, Vec2Fixed};
use crate::races::{BuildingKind, Catalog, Race, UnitKind};
use crate::snapshot::WorldSnapshot;
use crate::spatial::{IndexEntry, DEFAULT_PLACEMENT_ATTEMPTS};
use crate::units::{begin_command, update_unit};
use crate::world::World;

/// Ticks per second for the simulation.
pub const TICK_RATE: u32 = 20;

/// Duration of one tick in milliseconds.
pub const TICK_DURATION_MS: u32 = 1000 / TICK_RATE;

/// Workers a starting base comes with.
pub const STARTING_WORKERS: usize = 4;

/// Convert template seconds to ticks.
#[must_use]
pub const fn seconds_to_ticks(seconds: u32) -> u32 {
    seconds * TICK_RATE
}

/// Damage dealt this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageEvent {
    /// Unit that attacked (or fired the projectile).
    pub source: EntityId,
    /// What was hit.
    pub target: Target,
    /// Damage actually dealt.
    pub amount: u32,
}

/// One extraction from a resource node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatherEvent {
    /// Gathering unit.
    pub unit: EntityId,
    /// Node extracted from.
    pub node: EntityId,
    /// Currency credited.
    pub kind: ResourceKind,
    /// Amount credited.
    pub amount: u32,
}

/// A unit finished training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionEvent {
    /// Producing building.
    pub building: EntityId,
    /// New unit.
    pub unit: EntityId,
    /// Its kind.
    pub kind: UnitKind,
}

/// Events generated during a simulation tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickEvents {
    /// Melee hits and projectile impacts.
    pub damage: Vec<DamageEvent>,
    /// Projectiles launched.
    pub projectiles_fired: Vec<EntityId>,
    /// Resource extractions.
    pub gathered: Vec<GatherEvent>,
    /// Resource nodes exhausted and removed.
    pub depleted: Vec<EntityId>,
    /// Buildings that finished construction.
    pub constructed: Vec<EntityId>,
    /// Units that finished training.
    pub produced: Vec<ProductionEvent>,
    /// Units and buildings removed by cleanup.
    pub deaths: Vec<EntityId>,
    /// AI orders the command surface turned down.
    pub rejected_orders: usize,
}

/// A serializable command, routed by [`Simulation::apply_command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Move a unit to a point.
    Move(Vec2Fixed),
    /// Clear a unit's goal and queue.
    Stop,
    /// Attack a unit or building by id.
    Attack(EntityId),
    /// Gather from a resource node.
    Gather(EntityId),
    /// Patrol between two points.
    Patrol(Vec2Fixed, Vec2Fixed),
    /// Found a building.
    Build {
        /// Building to construct.
        kind: BuildingKind,
        /// Site center.
        position: Vec2Fixed,
    },
    /// Queue a unit at a building.
    Train(UnitKind),
    /// Move a building's rally point.
    SetRallyPoint(Vec2Fixed),
    /// Flip a building's auto-repair.
    ToggleAutoRepair,
    /// Cancel a building's queue entry.
    CancelProduction(usize),
}

/// The core game simulation.
///
/// Owns the world, the template catalog and the AI controllers, and
/// exposes the command surface shared by human input and AI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    /// Current simulation tick.
    tick: u64,
    config: SimConfig,
    catalog: Catalog,
    world: World,
    ai: BTreeMap<PlayerId, AiController>,
    /// AI unit orders waiting for the unit phase of the current tick.
    #[serde(default)]
    pending_orders: BTreeMap<EntityId, UnitCommand>,
    last_index_rebuild: Option<u64>,
}

impl Simulation {
    /// Create an empty simulation with the standard catalog.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfig`] if the config is out of range.
    pub fn new(config: SimConfig) -> Result<Self> {
        Self::with_catalog(config, Catalog::standard())
    }

    /// Create an empty simulation with a custom catalog.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfig`] if the config is out of range.
    pub fn with_catalog(config: SimConfig, catalog: Catalog) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, catalog))
    }

    fn assemble(config: SimConfig, catalog: Catalog) -> Self {
        let world = World::new(config.world_size_fixed(), Fixed::from_num(config.cell_size));
        Self {
            tick: 0,
            config,
            catalog,
            world,
            ai: BTreeMap::new(),
            pending_orders: BTreeMap::new(),
            last_index_rebuild: None,
        }
    }

    /// Get the current tick number.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.tick
    }

    /// The configuration in force.
    #[must_use]
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The template catalog.
    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The world.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Mutable world access for tooling and tests.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// AI controller of a player.
    #[must_use]
    pub fn ai(&self, player: PlayerId) -> Option<&AiController> {
        self.ai.get(&player)
    }

    /// Look up a unit.
    #[must_use]
    pub fn unit(&self, id: EntityId) -> Option<&Unit> {
        self.world.units.get(id)
    }

    /// Look up a building.
    #[must_use]
    pub fn building(&self, id: EntityId) -> Option<&Building> {
        self.world.buildings.get(id)
    }

    /// Look up a player.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.world.players.get(&id)
    }

    /// The last player standing, once every other player is eliminated.
    #[must_use]
    pub fn winner(&self) -> Option<PlayerId> {
        if self.world.players.len() < 2 {
            return None;
        }
        let mut alive = self.world.players.values().filter(|p| !p.is_eliminated());
        let first = alive.next()?;
        alive.next().is_none().then_some(first.id)
    }

    // ------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------

    /// Register a player with the configured starting stockpile.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] if the id is taken.
    pub fn add_player(&mut self, id: PlayerId, race: Race) -> Result<()> {
        if self.world.players.contains_key(&id) {
            return Err(GameError::InvalidState(format!("player {id} already exists")));
        }
        self.world
            .players
            .insert(id, Player::new(id, race, self.config.starting_resources));
        info!(player = id, race = race.name(), "Player joined");
        Ok(())
    }

    /// Hand a player to an AI controller.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::UnknownPlayer`] for an unregistered player.
    pub fn enable_ai(&mut self, player: PlayerId, difficulty: Option<Difficulty>) -> Result<()> {
        if !self.world.players.contains_key(&player) {
            return Err(GameError::UnknownPlayer(player));
        }
        let difficulty = difficulty.unwrap_or(self.config.default_difficulty);
        self.ai
            .insert(player, AiController::new(player, difficulty, self.config.seed));
        Ok(())
    }

    fn race_of(&self, player: PlayerId) -> Result<Race> {
        self.world
            .players
            .get(&player)
            .map(|p| p.race)
            .ok_or(GameError::UnknownPlayer(player))
    }

    /// Spawn a unit for free.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown player or missing template.
    pub fn spawn_unit(&mut self, owner: PlayerId, kind: UnitKind, position: Vec2Fixed) -> Result<EntityId> {
        let race = self.race_of(owner)?;
        let template = self.catalog.unit(race, kind)?;
        let id = self.world.allocate_id();
        let position = self.world.clamp_to_world(position, template.radius);
        let unit = Unit::from_template(id, owner, race, kind, template, position);
        self.insert_unit(unit);
        Ok(id)
    }

    fn insert_unit(&mut self, unit: Unit) {
        self.world.index.insert(IndexEntry {
            id: unit.id,
            class: EntityClass::Unit,
            owner: Some(unit.owner),
            position: unit.position,
            radius: unit.radius,
        });
        if let Some(player) = self.world.players.get_mut(&unit.owner) {
            player.units.insert(unit.id);
        }
        self.world.units.insert(unit.id, unit);
    }

    /// Spawn a building for free, either finished or as a bare site.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown player or missing template.
    pub fn spawn_building(
        &mut self,
        owner: PlayerId,
        kind: BuildingKind,
        position: Vec2Fixed,
        constructed: bool,
    ) -> Result<EntityId> {
        let race = self.race_of(owner)?;
        let template = self.catalog.building(race, kind)?;
        let id = self.world.allocate_id();
        let position = self.world.clamp_to_world(position, template.radius());
        let building = if constructed {
            Building::constructed(id, owner, race, kind, template, position)
        } else {
            Building::new_site(id, owner, race, kind, template, position)
        };
        self.world.index.insert(IndexEntry {
            id,
            class: EntityClass::Building,
            owner: Some(owner),
            position,
            radius: building.radius(),
        });
        if let Some(player) = self.world.players.get_mut(&owner) {
            if constructed {
                player.buildings.insert(id);
            } else {
                player.sites.insert(id);
            }
        }
        self.world.buildings.insert(id, building);
        Ok(id)
    }

    /// Place a resource node.
    pub fn spawn_resource(
        &mut self,
        kind: ResourceKind,
        amount: u32,
        position: Vec2Fixed,
        radius: Fixed,
    ) -> EntityId {
        let id = self.world.allocate_id();
        let position = self.world.clamp_to_world(position, radius);
        self.world.index.insert(IndexEntry {
            id,
            class: EntityClass::Resource,
            owner: None,
            position,
            radius,
        });
        self.world
            .resources
            .insert(id, ResourceNode::new(id, kind, amount, position, radius));
        id
    }

    /// A finished base plus [`STARTING_WORKERS`] workers at its rally point.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown player or missing template.
    pub fn setup_starting_base(&mut self, player: PlayerId, position: Vec2Fixed) -> Result<EntityId> {
        let base = self.spawn_building(player, BuildingKind::Base, position, true)?;
        let rally = self
            .world
            .buildings
            .get(base)
            .map(|b| b.rally_point)
            .ok_or(GameError::EntityNotFound(base))?;
        let race = self.race_of(player)?;
        let radius = self.catalog.unit(race, UnitKind::Worker)?.radius;
        for _ in 0..STARTING_WORKERS {
            let placement =
                self.world
                    .index
                    .find_valid_placement(rally, radius, DEFAULT_PLACEMENT_ATTEMPTS);
            self.spawn_unit(player, UnitKind::Worker, placement.position)?;
        }
        Ok(base)
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance the simulation by one tick.
    ///
    /// Returns events generated during this tick for the embedding layer.
    pub fn tick(&mut self) -> TickEvents {
        let mut events = TickEvents::default();
        let tick = self.tick;

        let interval = self.config.rebuild_interval_ticks();
        if self
            .last_index_rebuild
            .map_or(true, |last| tick.saturating_sub(last) >= interval)
        {
            self.world.rebuild_index();
            self.last_index_rebuild = Some(tick);
        }

        self.run_decisions(&mut events);
        self.run_units(&mut events);

        self.run_buildings(&mut events);
        self.run_projectiles(&mut events);
        self.world.index.resolve_overlaps(&mut self.world.units);
        self.run_cleanup(&mut events);

        self.tick += 1;

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::trace!(tick = self.tick, state_hash = hash, "Simulation state hash");
        }

        events
    }

    /// Run `ticks` ticks, discarding events.
    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    fn run_decisions(&mut self, events: &mut TickEvents) {
        let mut pending = Vec::new();
        for controller in self.ai.values_mut() {
            let orders = controller.decide(&self.world, &self.catalog, self.tick);
            if !orders.is_empty() {
                pending.push((controller.player, orders));
            }
        }
        for (player, orders) in pending {
            for order in orders {
                if let Err(err) = self.apply_ai_order(player, order) {
                    debug!(tick = self.tick, player, ?order, %err, "AI order rejected");
                    events.rejected_orders += 1;
                }
            }
        }
    }

    /// Unit orders are checked now and handed to the unit on its next
    /// update; production is queued at once.
    fn apply_ai_order(&mut self, player: PlayerId, order: AiOrder) -> std::result::Result<(), CommandError> {
        match order {
            AiOrder::Unit { unit, command } => {
                let owner = self.unit_owner(unit)?;
                if owner != player {
                    return Err(CommandError::InvalidTarget(unit));
                }
                let command = self.check_unit_command(unit, command)?;
                self.pending_orders.insert(unit, command);
                Ok(())
            }
            AiOrder::Train { building, kind } => {
                let owner = self
                    .world
                    .buildings
                    .get(building)
                    .map(|b| b.owner)
                    .ok_or(CommandError::EntityNotFound(building))?;
                if owner != player {
                    return Err(CommandError::InvalidTarget(building));
                }
                self.train(building, kind)
            }
        }
    }

    fn run_units(&mut self, events: &mut TickEvents) {
        let tick = self.tick;
        for id in self.world.units.sorted_ids() {
            if let Some(command) = self.pending_orders.remove(&id) {
                if let Err(err) = self.issue(id, command, false) {
                    debug!(tick, unit = id, %err, "AI order dropped");
                }
            }
            update_unit(&mut self.world, &self.catalog, id, tick, events);
        }
        self.pending_orders.clear();
    }

    fn run_buildings(&mut self, events: &mut TickEvents) {
        for id in self.world.buildings.sorted_ids() {
            let Some(building) = self.world.buildings.get_mut(id) else {
                continue;
            };
            if building.health.is_dead() {
                continue;
            }
            let Some(item) = building.update(self.tick) else {
                continue;
            };
            let (owner, rally) = (building.owner, building.rally_point);
            self.spawn_trained(id, owner, item, rally, events);
        }
    }

    fn spawn_trained(
        &mut self,
        building: EntityId,
        owner: PlayerId,
        item: ProductionItem,
        rally: Vec2Fixed,
        events: &mut TickEvents,
    ) {
        let Ok(race) = self.race_of(owner) else {
            return;
        };
        let Ok(template) = self.catalog.unit(race, item.unit_kind) else {
            debug!(tick = self.tick, building, kind = item.unit_kind.name(), "No unit template");
            return;
        };
        let placement =
            self.world
                .index
                .find_valid_placement(rally, template.radius, DEFAULT_PLACEMENT_ATTEMPTS);
        let id = self.world.allocate_id();
        let position = self.world.clamp_to_world(placement.position, template.radius);
        let unit = Unit::from_template(id, owner, race, item.unit_kind, template, position);
        self.insert_unit(unit);
        events.produced.push(ProductionEvent {
            building,
            unit: id,
            kind: item.unit_kind,
        });
        info!(
            tick = self.tick,
            building,
            unit = id,
            kind = item.unit_kind.name(),
            "Unit trained"
        );
    }

    fn run_projectiles(&mut self, events: &mut TickEvents) {
        for id in self.world.projectiles.sorted_ids() {
            let Some(mut projectile) = self.world.projectiles.remove(id) else {
                continue;
            };
            projectile.lifetime = projectile.lifetime.saturating_sub(1);

            if !projectile.struck {
                if let Some(target) = projectile.target {
                    match self
                        .world
                        .target_position(&target)
                        .filter(|_| self.world.is_target_alive(&target))
                    {
                        Some(position) => projectile.last_known = position,
                        None => projectile.target = None,
                    }
                }

                let reach = projectile
                    .target
                    .map_or(Fixed::ZERO, |t| self.world.target_radius(&t));
                let offset = projectile.last_known - projectile.position;
                if offset.length() <= projectile.speed + reach {
                    projectile.position = projectile.last_known;
                    if let Some(target) = projectile.target {
                        let amount = self.world.damage_target(&target, projectile.damage, self.tick);
                        events.damage.push(DamageEvent {
                            source: projectile.source,
                            target,
                            amount,
                        });
                    }
                    projectile.strike();
                } else {
                    projectile.position += offset.normalize().scale(projectile.speed);
                }
            }

            if !projectile.is_expired() {
                self.world.projectiles.insert(id, projectile);
            }
        }
    }

    /// Two-phase removal: collect the dead, then detach them everywhere.
    fn run_cleanup(&mut self, events: &mut TickEvents) {
        let dead_units: Vec<EntityId> = self
            .world
            .units
            .iter_sorted()
            .filter(|u| u.health.is_dead())
            .map(|u| u.id)
            .collect();
        let dead_buildings: Vec<EntityId> = self
            .world
            .buildings
            .iter_sorted()
            .filter(|b| b.health.is_dead())
            .map(|b| b.id)
            .collect();

        for id in dead_units {
            if let Some(unit) = self.world.units.remove(id) {
                if let Some(player) = self.world.players.get_mut(&unit.owner) {
                    player.units.remove(&id);
                }
                info!(tick = self.tick, unit = id, player = unit.owner, "Unit destroyed");
            }
            self.world.index.remove(id);
            events.deaths.push(id);
        }
        for id in dead_buildings {
            if let Some(building) = self.world.buildings.remove(id) {
                if let Some(player) = self.world.players.get_mut(&building.owner) {
                    player.remove_building(id);
                }
                info!(
                    tick = self.tick,
                    building = id,
                    player = building.owner,
                    "Building destroyed"
                );
            }
            self.world.index.remove(id);
            events.deaths.push(id);
        }
    }

    // ------------------------------------------------------------------
    // Command surface
    // ------------------------------------------------------------------

    fn unit_owner(&self, id: EntityId) -> std::result::Result<PlayerId, CommandError> {
        self.world
            .units
            .get(id)
            .map(|u| u.owner)
            .ok_or(CommandError::EntityNotFound(id))
    }

    /// Hand a unit command over. A queued command waits its turn; any
    /// other discards the current goal and queue at once.
    fn issue(
        &mut self,
        id: EntityId,
        command: UnitCommand,
        queued: bool,
    ) -> std::result::Result<(), CommandError> {
        let tick = self.tick;
        let unit = self
            .world
            .units
            .get_mut(id)
            .ok_or(CommandError::EntityNotFound(id))?;
        if queued {
            unit.commands.push(command);
        } else {
            unit.commands.clear();
            unit.reset();
            begin_command(unit, command, tick);
        }
        Ok(())
    }

    /// Check a unit command against the world. Points come back clamped to
    /// the world bounds and entity targets resolved.
    fn check_unit_command(
        &self,
        id: EntityId,
        command: UnitCommand,
    ) -> std::result::Result<UnitCommand, CommandError> {
        let unit = self
            .world
            .units
            .get(id)
            .ok_or(CommandError::EntityNotFound(id))?;
        match command {
            UnitCommand::Stop => Ok(command),
            UnitCommand::Move(point) => Ok(UnitCommand::Move(
                self.world.clamp_to_world(point, unit.radius),
            )),
            UnitCommand::Patrol(a, b) => Ok(UnitCommand::Patrol(
                self.world.clamp_to_world(a, unit.radius),
                self.world.clamp_to_world(b, unit.radius),
            )),
            UnitCommand::Attack(target) => {
                if !unit.is_armed() {
                    return Err(CommandError::MissingCapability(id));
                }
                let target_id = target.entity_id().ok_or(CommandError::UnknownCommand(id))?;
                self.world
                    .target_for(target_id)
                    .filter(|t| self.world.is_target_alive(t))
                    .filter(|t| self.world.target_owner(t) != Some(unit.owner))
                    .map(UnitCommand::Attack)
                    .ok_or(CommandError::InvalidTarget(target_id))
            }
            UnitCommand::Gather(node) => {
                if !unit.can_gather() {
                    return Err(CommandError::MissingCapability(id));
                }
                if !self.world.resources.contains(node) {
                    return Err(CommandError::InvalidTarget(node));
                }
                Ok(command)
            }
            UnitCommand::Build { kind, position } => {
                if !unit.can_build() {
                    return Err(CommandError::MissingCapability(id));
                }
                let template = self
                    .catalog
                    .building(unit.race, kind)
                    .map_err(|_| CommandError::MissingCapability(id))?;
                if !self.world.can_afford(unit.owner, &template.cost) {
                    return Err(CommandError::InsufficientResources);
                }
                let radius = template.radius();
                let position = self.world.clamp_to_world(position, radius);
                let placement = self.world.index.find_valid_placement_excluding(
                    position,
                    radius,
                    DEFAULT_PLACEMENT_ATTEMPTS,
                    Some(id),
                );
                if !placement.is_found() {
                    return Err(CommandError::NoValidPlacement);
                }
                Ok(UnitCommand::Build { kind, position })
            }
        }
    }

    fn command_unit(
        &mut self,
        id: EntityId,
        command: UnitCommand,
        queued: bool,
    ) -> std::result::Result<(), CommandError> {
        let command = self.check_unit_command(id, command)?;
        self.issue(id, command, queued)
    }

    /// Move a unit to a point.
    ///
    /// # Errors
    ///
    /// [`CommandError::EntityNotFound`] for an unknown unit.
    pub fn move_unit(
        &mut self,
        unit: EntityId,
        point: Vec2Fixed,
        queued: bool,
    ) -> std::result::Result<(), CommandError> {
        self.command_unit(unit, UnitCommand::Move(point), queued)
    }

    /// Drop a unit's goal and queued commands. A no-op on an idle unit.
    ///
    /// # Errors
    ///
    /// [`CommandError::EntityNotFound`] for an unknown unit.
    pub fn stop(&mut self, unit: EntityId, queued: bool) -> std::result::Result<(), CommandError> {
        self.command_unit(unit, UnitCommand::Stop, queued)
    }

    /// Attack a unit or building.
    ///
    /// # Errors
    ///
    /// [`CommandError::MissingCapability`] for an unarmed unit,
    /// [`CommandError::InvalidTarget`] for a dead, missing or friendly target.
    pub fn attack(
        &mut self,
        unit: EntityId,
        target: EntityId,
        queued: bool,
    ) -> std::result::Result<(), CommandError> {
        let target = self.world.target_for(target).unwrap_or(Target::Unit(target));
        self.command_unit(unit, UnitCommand::Attack(target), queued)
    }

    /// Gather from a resource node.
    ///
    /// # Errors
    ///
    /// [`CommandError::MissingCapability`] for a non-gatherer,
    /// [`CommandError::InvalidTarget`] for a missing node.
    pub fn gather(
        &mut self,
        unit: EntityId,
        node: EntityId,
        queued: bool,
    ) -> std::result::Result<(), CommandError> {
        self.command_unit(unit, UnitCommand::Gather(node), queued)
    }

    /// Patrol between two points.
    ///
    /// # Errors
    ///
    /// [`CommandError::EntityNotFound`] for an unknown unit.
    pub fn patrol(
        &mut self,
        unit: EntityId,
        a: Vec2Fixed,
        b: Vec2Fixed,
        queued: bool,
    ) -> std::result::Result<(), CommandError> {
        self.command_unit(unit, UnitCommand::Patrol(a, b), queued)
    }

    /// Send a worker to found a building. Checked now, paid on arrival.
    ///
    /// # Errors
    ///
    /// [`CommandError::MissingCapability`] for a non-builder or a kind
    /// its race lacks, [`CommandError::InsufficientResources`] if the owner
    /// cannot pay, [`CommandError::NoValidPlacement`] if no site near
    /// `position` is free.
    pub fn build(
        &mut self,
        unit: EntityId,
        kind: BuildingKind,
        position: Vec2Fixed,
        queued: bool,
    ) -> std::result::Result<(), CommandError> {
        self.command_unit(unit, UnitCommand::Build { kind, position }, queued)
    }

    /// Queue a unit at a building, paying its cost now.
    ///
    /// # Errors
    ///
    /// [`CommandError::NotConstructed`], [`CommandError::CannotProduce`],
    /// [`CommandError::QueueFull`] or [`CommandError::InsufficientResources`];
    /// the ledger is untouched on every error.
    pub fn train(&mut self, building: EntityId, kind: UnitKind) -> std::result::Result<(), CommandError> {
        let result = self.enqueue_production(building, kind);
        match result {
            Ok(()) => debug!(tick = self.tick, building, kind = kind.name(), "Production queued"),
            Err(err) => debug!(tick = self.tick, building, kind = kind.name(), %err, "Production rejected"),
        }
        result
    }

    fn enqueue_production(&mut self, building: EntityId, kind: UnitKind) -> std::result::Result<(), CommandError> {
        let producer = self
            .world
            .buildings
            .get(building)
            .ok_or(CommandError::EntityNotFound(building))?;
        producer.check_production(kind)?;
        let (owner, race) = (producer.owner, producer.race);
        let template = self
            .catalog
            .unit(race, kind)
            .map_err(|_| CommandError::CannotProduce(building))?;
        let item = ProductionItem::new(kind, template.cost, seconds_to_ticks(template.build_seconds));

        self.world.spend_resources(owner, &item.cost)?;
        let queued = self
            .world
            .buildings
            .get_mut(building)
            .ok_or(CommandError::EntityNotFound(building))
            .and_then(|b| b.queue.add(item));
        if let Err(err) = queued {
            self.world.refund(owner, item.cost);
            return Err(err);
        }
        Ok(())
    }

    /// Move a building's rally point.
    ///
    /// # Errors
    ///
    /// [`CommandError::EntityNotFound`] for an unknown building.
    pub fn set_rally_point(
        &mut self,
        building: EntityId,
        point: Vec2Fixed,
    ) -> std::result::Result<(), CommandError> {
        let point = self.world.clamp_to_world(point, Fixed::ZERO);
        self.world
            .buildings
            .get_mut(building)
            .ok_or(CommandError::EntityNotFound(building))?
            .set_rally_point(point);
        Ok(())
    }

    /// Flip a building's auto-repair, returning the new setting.
    ///
    /// # Errors
    ///
    /// [`CommandError::EntityNotFound`] for an unknown building.
    pub fn toggle_auto_repair(&mut self, building: EntityId) -> std::result::Result<bool, CommandError> {
        Ok(self
            .world
            .buildings
            .get_mut(building)
            .ok_or(CommandError::EntityNotFound(building))?
            .toggle_auto_repair())
    }

    /// Cancel queue entry `index`, refunding half its cost.
    ///
    /// # Errors
    ///
    /// [`CommandError::NoSuchEntry`] for an index past the queue.
    pub fn cancel_production(
        &mut self,
        building: EntityId,
        index: usize,
    ) -> std::result::Result<Resources, CommandError> {
        let producer = self
            .world
            .buildings
            .get_mut(building)
            .ok_or(CommandError::EntityNotFound(building))?;
        let owner = producer.owner;
        let refund = producer.cancel_production(index)?;
        self.world.refund(owner, refund);
        debug!(tick = self.tick, building, index, ?refund, "Production cancelled");
        Ok(refund)
    }

    /// Route a [`Command`] to the addressed entity.
    ///
    /// # Errors
    ///
    /// [`CommandError::UnknownCommand`] when the command does not apply to
    /// that kind of entity, or whatever the routed operation reports.
    pub fn apply_command(
        &mut self,
        entity: EntityId,
        command: Command,
        queued: bool,
    ) -> std::result::Result<(), CommandError> {
        let class = self
            .world
            .class_of(entity)
            .ok_or(CommandError::EntityNotFound(entity))?;
        let result = match (class, command) {
            (EntityClass::Unit, Command::Move(point)) => self.move_unit(entity, point, queued),
            (EntityClass::Unit, Command::Stop) => self.stop(entity, queued),
            (EntityClass::Unit, Command::Attack(target)) => self.attack(entity, target, queued),
            (EntityClass::Unit, Command::Gather(node)) => self.gather(entity, node, queued),
            (EntityClass::Unit, Command::Patrol(a, b)) => self.patrol(entity, a, b, queued),
            (EntityClass::Unit, Command::Build { kind, position }) => {
                self.build(entity, kind, position, queued)
            }
            (EntityClass::Building, Command::Train(kind)) => self.train(entity, kind),
            (EntityClass::Building, Command::SetRallyPoint(point)) => {
                self.set_rally_point(entity, point)
            }
            (EntityClass::Building, Command::ToggleAutoRepair) => {
                self.toggle_auto_repair(entity).map(|_| ())
            }
            (EntityClass::Building, Command::CancelProduction(index)) => {
                self.cancel_production(entity, index).map(|_| ())
            }
            _ => Err(CommandError::UnknownCommand(entity)),
        };
        if let Err(err) = result {
            if !matches!(command, Command::Train(_)) {
                debug!(tick = self.tick, entity, ?command, %err, "Command rejected");
            }
        }
        result
    }

    // ------------------------------------------------------------------
    // Determinism and persistence
    // ------------------------------------------------------------------

    /// Calculate a hash of the current simulation state.
    ///
    /// Two simulations with identical state produce identical hashes.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);

        for unit in self.world.units.iter_sorted() {
            unit.id.hash(&mut hasher);
            unit.owner.hash(&mut hasher);
            unit.position.x.to_bits().hash(&mut hasher);
            unit.position.y.to_bits().hash(&mut hasher);
            unit.velocity.x.to_bits().hash(&mut hasher);
            unit.velocity.y.to_bits().hash(&mut hasher);
            unit.health.current.hash(&mut hasher);
            unit.state.hash(&mut hasher);
            unit.target.map(|t| t.entity_id()).hash(&mut hasher);
            unit.commands.len().hash(&mut hasher);
        }
        for building in self.world.buildings.iter_sorted() {
            building.id.hash(&mut hasher);
            building.health.current.hash(&mut hasher);
            building.construction_progress.hash(&mut hasher);
            building.queue.len().hash(&mut hasher);
            building.queue.current().map(|i| i.progress).hash(&mut hasher);
        }
        for projectile in self.world.projectiles.iter_sorted() {
            projectile.id.hash(&mut hasher);
            projectile.position.x.to_bits().hash(&mut hasher);
            projectile.position.y.to_bits().hash(&mut hasher);
            projectile.lifetime.hash(&mut hasher);
            projectile.struck.hash(&mut hasher);
        }
        for node in self.world.resources.iter_sorted() {
            node.id.hash(&mut hasher);
            node.remaining.hash(&mut hasher);
        }
        for player in self.world.players.values() {
            player.id.hash(&mut hasher);
            player.ledger.hash(&mut hasher);
        }
        for controller in self.ai.values() {
            controller.state.hash(&mut hasher);
            controller.combat_goal.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Serialize the simulation state.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize simulation: {e}")))
    }

    /// Deserialize simulation state from bytes and rebuild the index.
    ///
    /// The index is refilled from current positions, so a state saved
    /// between scheduled rebuilds only replays identically once the next
    /// rebuild comes due.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut sim: Self = bincode::deserialize(data).map_err(|e| {
            GameError::InvalidState(format!("Failed to deserialize simulation: {e}"))
        })?;
        sim.world
            .reset_index(Fixed::from_num(sim.config.cell_size));
        Ok(sim)
    }

    /// Resume from a persisted snapshot. AI controllers are not part of a
    /// snapshot; re-enable them with [`enable_ai`](Self::enable_ai).
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid config or an incompatible snapshot.
    pub fn from_snapshot(config: SimConfig, catalog: Catalog, snapshot: &WorldSnapshot) -> Result<Self> {
        config.validate()?;
        let world = snapshot.restore_world(&config, &catalog)?;
        let mut sim = Self::assemble(config, catalog);
        sim.world = world;
        sim.tick = snapshot.tick;
        info!(
            tick = sim.tick,
            units = sim.world.units.len(),
            buildings = sim.world.buildings.len(),
            "Simulation restored from snapshot"
        );
        Ok(sim)
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::assemble(SimConfig::default(), Catalog::standard())
    }
}
