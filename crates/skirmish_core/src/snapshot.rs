//! Persisted snapshots of the world.
//!
//! Snapshots describe entities by value and refer to one another by id.
//! Race, kind and state are stored by name so a snapshot written against a
//! different catalog still loads: unknown names fall back to the defaults
//! and missing templates to the standard catalog. Target ids that no
//! longer resolve in the live world come back as `None`.
//!
//! Whole-simulation persistence (AI state included) goes through
//! [`Simulation::serialize`]; snapshots are the narrower exchange format.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::buildings::{Building, ProductionItem};
use crate::components::{
    BuildOrder, EntityId, Health, PatrolRoute, PlayerId, Projectile, Target, Unit, UnitCommand,
    UnitState,
};
use crate::config::SimConfig;
use crate::economy::{Player, ResourceKind, ResourceNode, Resources};
use crate::error::{GameError, Result};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::races::{BuildingKind, BuildingTemplate, Catalog, Race, UnitKind, UnitTemplate};
use crate::simulation::Simulation;
use crate::world::World;

/// Snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

fn unit_template<'a>(
    catalog: &'a Catalog,
    fallback: &'a Catalog,
    race: Race,
    kind: UnitKind,
) -> Result<&'a UnitTemplate> {
    catalog.unit(race, kind).or_else(|_| {
        debug!(race = race.name(), kind = kind.name(), "Falling back to standard unit template");
        fallback.unit(race, kind)
    })
}

fn building_template<'a>(
    catalog: &'a Catalog,
    fallback: &'a Catalog,
    race: Race,
    kind: BuildingKind,
) -> Result<&'a BuildingTemplate> {
    catalog.building(race, kind).or_else(|_| {
        debug!(race = race.name(), kind = kind.name(), "Falling back to standard building template");
        fallback.building(race, kind)
    })
}

fn parse_race(name: &str) -> Race {
    Race::from_name(name).unwrap_or_else(|| {
        warn!(race = name, "Unknown race in snapshot, using default");
        Race::default()
    })
}

fn parse_unit_kind(name: &str) -> UnitKind {
    UnitKind::from_name(name).unwrap_or_else(|| {
        warn!(kind = name, "Unknown unit kind in snapshot, using default");
        UnitKind::default()
    })
}

fn parse_building_kind(name: &str) -> BuildingKind {
    BuildingKind::from_name(name).unwrap_or_else(|| {
        warn!(kind = name, "Unknown building kind in snapshot, using default");
        BuildingKind::default()
    })
}

/// Resolve a stored target against the live world.
fn resolve_target(world: &World, id: Option<EntityId>, point: Option<Vec2Fixed>) -> Option<Target> {
    match id {
        Some(id) => world
            .target_for(id)
            .filter(|target| world.is_target_alive(target)),
        None => point.map(Target::Point),
    }
}

/// A unit at rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    /// Entity id.
    pub id: EntityId,
    /// Unit kind name.
    pub kind: String,
    /// Race name.
    pub race: String,
    /// Owning player.
    pub owner: PlayerId,
    /// Position.
    pub position: Vec2Fixed,
    /// Current health.
    pub health: u32,
    /// Maximum health.
    pub max_health: u32,
    /// State name.
    pub state: String,
    /// Targeted unit or building.
    pub target: Option<EntityId>,
    /// Targeted point, when the target is not an entity.
    pub target_point: Option<Vec2Fixed>,
    /// Node being gathered.
    pub gather_target: Option<EntityId>,
    /// Pending commands.
    pub queue: Vec<UnitCommand>,
    /// Velocity last tick.
    #[serde(default)]
    pub velocity: Vec2Fixed,
    /// Patrol route, while patrolling.
    #[serde(default)]
    pub patrol: Option<PatrolRoute>,
    /// Construction order, while heading to or working on a site.
    #[serde(default)]
    pub build_order: Option<BuildOrder>,
    /// Ticks until the weapon is ready.
    #[serde(default)]
    pub cooldown_remaining: u32,
    /// Ticks until the next extraction.
    #[serde(default)]
    pub gather_timer: u32,
}

impl UnitSnapshot {
    /// Capture a unit.
    #[must_use]
    pub fn capture(unit: &Unit) -> Self {
        let (target, target_point) = match unit.target {
            Some(Target::Point(point)) => (None, Some(point)),
            Some(other) => (other.entity_id(), None),
            None => (None, None),
        };
        Self {
            id: unit.id,
            kind: unit.kind.name().to_string(),
            race: unit.race.name().to_string(),
            owner: unit.owner,
            position: unit.position,
            health: unit.health.current,
            max_health: unit.health.max,
            state: unit.state.name().to_string(),
            target,
            target_point,
            gather_target: unit.gather_target,
            queue: unit.commands.iter().copied().collect(),
            velocity: unit.velocity,
            patrol: unit.patrol,
            build_order: unit.build_order,
            cooldown_remaining: unit.attack.map_or(0, |attack| attack.cooldown_remaining),
            gather_timer: unit.gather_timer,
        }
    }

    /// Rebuild the unit, resolving ids against `world`.
    ///
    /// A goal state whose goal did not survive (a patrol without a route,
    /// a build without an order) comes back idle.
    pub fn reconstruct(&self, world: &World, catalog: &Catalog) -> Result<Unit> {
        let race = parse_race(&self.race);
        let kind = parse_unit_kind(&self.kind);
        let fallback = Catalog::standard();
        let template = unit_template(catalog, &fallback, race, kind)?;

        let mut unit = Unit::from_template(self.id, self.owner, race, kind, template, self.position);
        unit.health = Health::with_current(self.health, self.max_health);
        unit.state = UnitState::from_name(&self.state).unwrap_or_default();
        unit.target = resolve_target(world, self.target, self.target_point);
        unit.gather_target = self
            .gather_target
            .filter(|node| world.resources.contains(*node));
        unit.velocity = self.velocity;
        unit.patrol = self.patrol;
        unit.build_order = self.build_order.map(|order| BuildOrder {
            site: order.site.filter(|site| world.buildings.contains(*site)),
            ..order
        });
        unit.gather_timer = self.gather_timer;
        if let Some(attack) = unit.attack.as_mut() {
            attack.cooldown_remaining = self.cooldown_remaining.min(attack.cooldown_ticks);
        }
        for command in &self.queue {
            unit.commands.push(*command);
        }

        let stranded = match unit.state {
            UnitState::Patrolling => unit.patrol.is_none(),
            UnitState::Building => unit.build_order.and_then(|order| order.site).is_none(),
            _ => false,
        };
        if stranded {
            warn!(unit = self.id, state = %self.state, "Goal missing from snapshot, unit idles");
            unit.reset();
        }
        Ok(unit)
    }
}

/// One production queue entry at rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntrySnapshot {
    /// Unit kind name.
    pub unit_kind: String,
    /// Cost paid.
    pub cost: Resources,
    /// Elapsed ticks.
    pub progress: u32,
    /// Total ticks.
    pub total_time: u32,
}

/// A building at rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingSnapshot {
    /// Entity id.
    pub id: EntityId,
    /// Building kind name.
    pub kind: String,
    /// Race name.
    pub race: String,
    /// Owning player.
    pub owner: PlayerId,
    /// Footprint center.
    pub position: Vec2Fixed,
    /// Current health.
    pub health: u32,
    /// Maximum health.
    pub max_health: u32,
    /// Whether construction has finished.
    pub is_constructed: bool,
    /// Construction progress in ticks.
    pub construction_progress: u32,
    /// Production queue in order.
    pub queue: Vec<QueueEntrySnapshot>,
    /// Rally point.
    pub rally_point: Vec2Fixed,
    /// Innate healing.
    pub healing: bool,
    /// Auto-repair toggle.
    pub auto_repair: bool,
    /// Tick of the most recent damage.
    pub last_damaged_tick: Option<u64>,
}

impl BuildingSnapshot {
    /// Capture a building.
    #[must_use]
    pub fn capture(building: &Building) -> Self {
        Self {
            id: building.id,
            kind: building.kind.name().to_string(),
            race: building.race.name().to_string(),
            owner: building.owner,
            position: building.position,
            health: building.health.current,
            max_health: building.health.max,
            is_constructed: building.is_constructed,
            construction_progress: building.construction_progress,
            queue: building
                .queue
                .iter()
                .map(|item| QueueEntrySnapshot {
                    unit_kind: item.unit_kind.name().to_string(),
                    cost: item.cost,
                    progress: item.progress,
                    total_time: item.total_time,
                })
                .collect(),
            rally_point: building.rally_point,
            healing: building.healing,
            auto_repair: building.auto_repair,
            last_damaged_tick: building.last_damaged_tick,
        }
    }

    /// Rebuild the building.
    pub fn reconstruct(&self, catalog: &Catalog) -> Result<Building> {
        let race = parse_race(&self.race);
        let kind = parse_building_kind(&self.kind);
        let fallback = Catalog::standard();
        let template = building_template(catalog, &fallback, race, kind)?;

        let mut building = Building::new_site(self.id, self.owner, race, kind, template, self.position);
        building.health = Health::with_current(self.health, self.max_health);
        building.is_constructed = self.is_constructed;
        building.construction_progress = if self.is_constructed {
            building.construction_total
        } else {
            self.construction_progress.min(building.construction_total)
        };
        for entry in &self.queue {
            let mut item = ProductionItem::new(parse_unit_kind(&entry.unit_kind), entry.cost, entry.total_time);
            item.progress = entry.progress.min(entry.total_time);
            if building.queue.add(item).is_err() {
                warn!(building = self.id, "Snapshot queue exceeds capacity, truncating");
                break;
            }
        }
        building.rally_point = self.rally_point;
        building.healing = self.healing;
        building.auto_repair = self.auto_repair;
        building.last_damaged_tick = self.last_damaged_tick;
        Ok(building)
    }
}

/// A projectile at rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectileSnapshot {
    /// Entity id.
    pub id: EntityId,
    /// Owner of the firing unit.
    pub owner: PlayerId,
    /// Firing unit.
    pub source: EntityId,
    /// Launch point.
    pub origin: Vec2Fixed,
    /// Current position.
    pub position: Vec2Fixed,
    /// Homing target.
    pub target: Option<EntityId>,
    /// Last observed target position.
    pub last_known: Vec2Fixed,
    /// Damage on impact.
    pub damage: u32,
    /// Remaining ticks.
    pub lifetime: u32,
    /// Already struck.
    pub struck: bool,
}

impl ProjectileSnapshot {
    /// Capture a projectile.
    #[must_use]
    pub fn capture(projectile: &Projectile) -> Self {
        Self {
            id: projectile.id,
            owner: projectile.owner,
            source: projectile.source,
            origin: projectile.origin,
            position: projectile.position,
            target: projectile.target.and_then(|t| t.entity_id()),
            last_known: projectile.last_known,
            damage: projectile.damage,
            lifetime: projectile.lifetime,
            struck: projectile.struck,
        }
    }

    /// Rebuild the projectile, dropping a target that no longer resolves.
    #[must_use]
    pub fn reconstruct(&self, world: &World) -> Projectile {
        let target = resolve_target(world, self.target, None);
        let mut projectile = Projectile::new(
            self.id,
            self.owner,
            self.source,
            self.origin,
            target.unwrap_or(Target::Point(self.last_known)),
            self.last_known,
            self.damage,
        );
        projectile.position = self.position;
        projectile.target = target;
        projectile.lifetime = self.lifetime;
        projectile.struck = self.struck;
        projectile
    }
}

/// A resource node at rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Entity id.
    pub id: EntityId,
    /// Currency kind.
    pub kind: ResourceKind,
    /// Amount left.
    pub remaining: u32,
    /// Position.
    pub position: Vec2Fixed,
    /// Radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
}

/// A player at rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// Player id.
    pub id: PlayerId,
    /// Race name.
    pub race: String,
    /// Stockpile.
    pub ledger: Resources,
}

/// Everything needed to restore a world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Format version.
    pub version: u32,
    /// Tick the snapshot was taken on.
    pub tick: u64,
    /// Players.
    pub players: Vec<PlayerSnapshot>,
    /// Resource nodes.
    pub resources: Vec<ResourceSnapshot>,
    /// Buildings.
    pub buildings: Vec<BuildingSnapshot>,
    /// Units.
    pub units: Vec<UnitSnapshot>,
    /// Projectiles.
    pub projectiles: Vec<ProjectileSnapshot>,
}

impl WorldSnapshot {
    /// Capture every entity of a simulation, in id order.
    #[must_use]
    pub fn capture(sim: &Simulation) -> Self {
        let world = sim.world();
        Self {
            version: SNAPSHOT_VERSION,
            tick: sim.get_tick(),
            players: world
                .players
                .values()
                .map(|p| PlayerSnapshot {
                    id: p.id,
                    race: p.race.name().to_string(),
                    ledger: p.ledger,
                })
                .collect(),
            resources: world
                .resources
                .iter_sorted()
                .map(|r| ResourceSnapshot {
                    id: r.id,
                    kind: r.kind,
                    remaining: r.remaining,
                    position: r.position,
                    radius: r.radius,
                })
                .collect(),
            buildings: world.buildings.iter_sorted().map(BuildingSnapshot::capture).collect(),
            units: world.units.iter_sorted().map(UnitSnapshot::capture).collect(),
            projectiles: world
                .projectiles
                .iter_sorted()
                .map(ProjectileSnapshot::capture)
                .collect(),
        }
    }

    /// Rebuild a world from this snapshot.
    ///
    /// Entities are restored before any target is resolved, so references
    /// between units survive. AI controllers are not part of a snapshot.
    pub fn restore_world(&self, config: &SimConfig, catalog: &Catalog) -> Result<World> {
        if self.version != SNAPSHOT_VERSION {
            return Err(GameError::SnapshotEncoding(format!(
                "Snapshot version mismatch: expected {SNAPSHOT_VERSION}, got {}",
                self.version
            )));
        }
        let mut world = World::new(config.world_size_fixed(), Fixed::from_num(config.cell_size));

        for player in &self.players {
            world
                .players
                .insert(player.id, Player::new(player.id, parse_race(&player.race), player.ledger));
        }
        for node in &self.resources {
            world.reserve_id(node.id);
            world.resources.insert(
                node.id,
                ResourceNode::new(node.id, node.kind, node.remaining, node.position, node.radius),
            );
        }
        for snapshot in &self.buildings {
            let building = snapshot.reconstruct(catalog)?;
            world.reserve_id(building.id);
            if let Some(player) = world.players.get_mut(&building.owner) {
                if building.is_constructed {
                    player.buildings.insert(building.id);
                } else {
                    player.sites.insert(building.id);
                }
            }
            world.buildings.insert(building.id, building);
        }

        // Insert shells first so unit-to-unit targets resolve.
        let mut units = BTreeMap::new();
        for snapshot in &self.units {
            let unit = snapshot.reconstruct(&world, catalog)?;
            let id = unit.id;
            world.reserve_id(id);
            if let Some(player) = world.players.get_mut(&unit.owner) {
                player.units.insert(id);
            }
            world.units.insert(id, unit);
            units.insert(id, snapshot);
        }
        for (id, snapshot) in units {
            let target = resolve_target(&world, snapshot.target, snapshot.target_point);
            if let Some(unit) = world.units.get_mut(id) {
                unit.target = target;
            }
        }

        for snapshot in &self.projectiles {
            let projectile = snapshot.reconstruct(&world);
            world.reserve_id(projectile.id);
            world.projectiles.insert(projectile.id, projectile);
        }

        world.rebuild_index();
        Ok(world)
    }

    /// Encode with bincode.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| GameError::SnapshotEncoding(e.to_string()))
    }

    /// Decode from bincode.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| GameError::SnapshotEncoding(e.to_string()))
    }
}

/// Where snapshots are saved and loaded.
pub trait SnapshotPort {
    /// Store a snapshot under `name`, replacing any previous one.
    fn save(&mut self, name: &str, snapshot: &WorldSnapshot) -> Result<()>;

    /// Fetch the snapshot stored under `name`.
    fn load(&self, name: &str) -> Result<WorldSnapshot>;

    /// Names of stored snapshots, sorted.
    fn list(&self) -> Result<Vec<String>>;
}

/// Snapshots held in memory as bincode bytes.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    slots: BTreeMap<String, Vec<u8>>,
}

impl MemorySnapshotStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotPort for MemorySnapshotStore {
    fn save(&mut self, name: &str, snapshot: &WorldSnapshot) -> Result<()> {
        self.slots.insert(name.to_string(), snapshot.to_bytes()?);
        Ok(())
    }

    fn load(&self, name: &str) -> Result<WorldSnapshot> {
        let bytes = self
            .slots
            .get(name)
            .ok_or_else(|| GameError::SnapshotNotFound(name.to_string()))?;
        WorldSnapshot::from_bytes(bytes)
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.slots.keys().cloned().collect())
    }
}
