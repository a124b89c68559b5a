//! Authoritative entity collections and the world context.
//!
//! The [`World`] is owned by the simulation and handed to behavior code by
//! reference. It answers lookups by id, distances, and ledger operations.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::buildings::Building;
use crate::components::{EntityClass, EntityId, PlayerId, Projectile, Target, Unit};
use crate::economy::{Player, ResourceKind, ResourceNode, Resources};
use crate::error::CommandError;
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::spatial::{IndexEntry, SpatialIndex};

/// Storage for one kind of entity.
///
/// Uses a `HashMap` for O(1) lookup by id, with deterministic iteration
/// via sorted keys when processing systems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStorage<T> {
    entities: HashMap<EntityId, T>,
}

impl<T> Default for EntityStorage<T> {
    fn default() -> Self {
        Self {
            entities: HashMap::new(),
        }
    }
}

impl<T> EntityStorage<T> {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity under an id allocated by the world.
    pub fn insert(&mut self, id: EntityId, entity: T) {
        self.entities.insert(id, entity);
    }

    /// Remove an entity by id.
    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        self.entities.remove(&id)
    }

    /// Get an entity by id.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.entities.get(&id)
    }

    /// Get a mutable reference to an entity by id.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.entities.get_mut(&id)
    }

    /// Check if an entity exists.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Sorted ids for deterministic iteration.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Entities in id order.
    pub fn iter_sorted(&self) -> impl Iterator<Item = &T> + '_ {
        self.sorted_ids()
            .into_iter()
            .filter_map(move |id| self.entities.get(&id))
    }

    /// Iterate over all entities (not in deterministic order).
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entities.values()
    }
}

/// The world context: every live entity plus the player ledgers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    /// Mobile units.
    pub units: EntityStorage<Unit>,
    /// Buildings, finished or under construction.
    pub buildings: EntityStorage<Building>,
    /// Projectiles in flight.
    pub projectiles: EntityStorage<Projectile>,
    /// Resource nodes.
    pub resources: EntityStorage<ResourceNode>,
    /// Players by id.
    pub players: BTreeMap<PlayerId, Player>,
    /// Proximity index; rebuilt after deserializing.
    #[serde(skip)]
    pub index: SpatialIndex,
    next_id: EntityId,
    #[serde(with = "fixed_serde")]
    world_size: Fixed,
}

impl World {
    /// Create an empty world.
    #[must_use]
    pub fn new(world_size: Fixed, cell_size: Fixed) -> Self {
        Self {
            units: EntityStorage::new(),
            buildings: EntityStorage::new(),
            projectiles: EntityStorage::new(),
            resources: EntityStorage::new(),
            players: BTreeMap::new(),
            index: SpatialIndex::new(world_size, cell_size),
            next_id: 1,
            world_size,
        }
    }

    /// Edge length of the square world.
    #[must_use]
    pub const fn world_size(&self) -> Fixed {
        self.world_size
    }

    /// Hand out the next entity id.
    pub fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Next id that will be handed out.
    #[must_use]
    pub const fn next_id(&self) -> EntityId {
        self.next_id
    }

    /// Make sure future ids never collide with `id`.
    pub fn reserve_id(&mut self, id: EntityId) {
        self.next_id = self.next_id.max(id + 1);
    }

    /// Clamp a position so a circle of `radius` stays inside the world.
    #[must_use]
    pub fn clamp_to_world(&self, position: Vec2Fixed, radius: Fixed) -> Vec2Fixed {
        let max = (self.world_size - radius).max(radius);
        position.clamp(radius, max)
    }

    /// Which collection an id lives in.
    #[must_use]
    pub fn class_of(&self, id: EntityId) -> Option<EntityClass> {
        if self.units.contains(id) {
            Some(EntityClass::Unit)
        } else if self.buildings.contains(id) {
            Some(EntityClass::Building)
        } else if self.resources.contains(id) {
            Some(EntityClass::Resource)
        } else {
            None
        }
    }

    /// Wrap an attackable id as a target.
    #[must_use]
    pub fn target_for(&self, id: EntityId) -> Option<Target> {
        match self.class_of(id)? {
            EntityClass::Unit => Some(Target::Unit(id)),
            EntityClass::Building => Some(Target::Building(id)),
            EntityClass::Resource => None,
        }
    }

    /// Live position of any unit, building or resource node.
    #[must_use]
    pub fn position_of(&self, id: EntityId) -> Option<Vec2Fixed> {
        self.units
            .get(id)
            .map(|u| u.position)
            .or_else(|| self.buildings.get(id).map(|b| b.position))
            .or_else(|| self.resources.get(id).map(|r| r.position))
    }

    /// Collision radius of any unit, building or resource node.
    #[must_use]
    pub fn radius_of(&self, id: EntityId) -> Option<Fixed> {
        self.units
            .get(id)
            .map(|u| u.radius)
            .or_else(|| self.buildings.get(id).map(Building::radius))
            .or_else(|| self.resources.get(id).map(|r| r.radius))
    }

    /// Center distance between two entities.
    #[must_use]
    pub fn distance(&self, a: EntityId, b: EntityId) -> Option<Fixed> {
        Some(self.position_of(a)?.distance(self.position_of(b)?))
    }

    /// Live position of a target. Points are always resolvable.
    #[must_use]
    pub fn target_position(&self, target: &Target) -> Option<Vec2Fixed> {
        match target {
            Target::Unit(id) => self.units.get(*id).map(|u| u.position),
            Target::Building(id) => self.buildings.get(*id).map(|b| b.position),
            Target::Point(point) => Some(*point),
        }
    }

    /// Radius of a target. Points have none.
    #[must_use]
    pub fn target_radius(&self, target: &Target) -> Fixed {
        match target {
            Target::Unit(id) => self.units.get(*id).map_or(Fixed::ZERO, |u| u.radius),
            Target::Building(id) => self.buildings.get(*id).map_or(Fixed::ZERO, Building::radius),
            Target::Point(_) => Fixed::ZERO,
        }
    }

    /// Whether the target still exists and has health left.
    #[must_use]
    pub fn is_target_alive(&self, target: &Target) -> bool {
        match target {
            Target::Unit(id) => self.units.get(*id).is_some_and(|u| !u.health.is_dead()),
            Target::Building(id) => self
                .buildings
                .get(*id)
                .is_some_and(|b| !b.health.is_dead()),
            Target::Point(_) => true,
        }
    }

    /// Owner of a target entity.
    #[must_use]
    pub fn target_owner(&self, target: &Target) -> Option<PlayerId> {
        match target {
            Target::Unit(id) => self.units.get(*id).map(|u| u.owner),
            Target::Building(id) => self.buildings.get(*id).map(|b| b.owner),
            Target::Point(_) => None,
        }
    }

    /// Deal damage to a target. Returns the damage actually dealt.
    ///
    /// Dead entities stay in place until the cleanup phase.
    pub fn damage_target(&mut self, target: &Target, amount: u32, tick: u64) -> u32 {
        match target {
            Target::Unit(id) => self
                .units
                .get_mut(*id)
                .map_or(0, |u| u.health.apply_damage(amount)),
            Target::Building(id) => self.buildings.get_mut(*id).map_or(0, |b| {
                b.last_damaged_tick = Some(tick);
                b.health.apply_damage(amount)
            }),
            Target::Point(_) => 0,
        }
    }

    /// Check whether a player can pay `cost`.
    #[must_use]
    pub fn can_afford(&self, player: PlayerId, cost: &Resources) -> bool {
        self.players
            .get(&player)
            .is_some_and(|p| p.ledger.can_afford(cost))
    }

    /// Deduct `cost` from a player's ledger, or leave it untouched.
    pub fn spend_resources(
        &mut self,
        player: PlayerId,
        cost: &Resources,
    ) -> Result<(), CommandError> {
        let record = self
            .players
            .get_mut(&player)
            .ok_or(CommandError::InsufficientResources)?;
        if record.ledger.spend(cost) {
            Ok(())
        } else {
            Err(CommandError::InsufficientResources)
        }
    }

    /// Credit one currency to a player.
    pub fn add_resources(&mut self, player: PlayerId, kind: ResourceKind, amount: u32) {
        if let Some(record) = self.players.get_mut(&player) {
            record.ledger.add(kind, amount);
        }
    }

    /// Credit a whole bundle to a player.
    pub fn refund(&mut self, player: PlayerId, amount: Resources) {
        if let Some(record) = self.players.get_mut(&player) {
            record.ledger += amount;
        }
    }

    /// Ledger of a player.
    #[must_use]
    pub fn ledger(&self, player: PlayerId) -> Option<Resources> {
        self.players.get(&player).map(|p| p.ledger)
    }

    /// Snapshot of every unit, building and resource for the index.
    #[must_use]
    pub fn index_entries(&self) -> Vec<IndexEntry> {
        let units = self.units.iter_sorted().map(|u| IndexEntry {
            id: u.id,
            class: EntityClass::Unit,
            owner: Some(u.owner),
            position: u.position,
            radius: u.radius,
        });
        let buildings = self.buildings.iter_sorted().map(|b| IndexEntry {
            id: b.id,
            class: EntityClass::Building,
            owner: Some(b.owner),
            position: b.position,
            radius: b.radius(),
        });
        let resources = self.resources.iter_sorted().map(|r| IndexEntry {
            id: r.id,
            class: EntityClass::Resource,
            owner: None,
            position: r.position,
            radius: r.radius,
        });
        units.chain(buildings).chain(resources).collect()
    }

    /// Recompute the spatial index from live entities.
    pub fn rebuild_index(&mut self) {
        let entries = self.index_entries();
        self.index.rebuild(entries);
    }

    /// Replace the index (after deserializing) and fill it.
    pub fn reset_index(&mut self, cell_size: Fixed) {
        self.index = SpatialIndex::new(self.world_size, cell_size);
        self.rebuild_index();
    }
}
