//! Autonomous opponent.
//!
//! Each AI player runs a small state machine on a coarser cadence than the
//! simulation tick. A decision reads the world immutably and returns
//! [`AiOrder`]s; the simulation applies them through the same command
//! surface a human uses, so an AI can never do anything a player cannot.
//!
//! Failures never escalate: with no production structure training is
//! skipped, with no enemy target selection is skipped.

use std::collections::BTreeSet;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::buildings::Producer;
use crate::components::{Attacker, EntityId, PlayerId, Target, UnitCommand, UnitState, Worker};
use crate::economy::Resources;
use crate::math::{Fixed, Vec2Fixed};
use crate::races::{BuildingKind, Catalog, Race, UnitKind};
use crate::simulation::seconds_to_ticks;
use crate::spatial::{ClassFilter, DEFAULT_PLACEMENT_ATTEMPTS};
use crate::world::World;

/// Workers every AI keeps at least.
pub const WORKER_FLOOR: usize = 5;

/// Army size that triggers the first attack.
pub const INITIAL_COMBAT_GOAL: usize = 10;

/// Goal increase after each attack cycle.
pub const COMBAT_GOAL_STEP: usize = 5;

/// A new base must be at least this far from every own base.
pub const EXPANSION_MIN_DISTANCE: i32 = 300;

/// Bases an AI will own at most.
pub const MAX_BASES: usize = 3;

/// Idle combat units engage enemies within this percentage of their range.
const AUTO_ATTACK_RANGE_PERCENT: i32 = 150;

/// Entries an AI keeps in one production queue.
const AI_QUEUE_DEPTH: usize = 2;

/// Gap left between the home base and a new barracks.
const BARRACKS_SPACING: i32 = 24;

/// AI strength, expressed as decision cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Difficulty {
    /// Decides every 3 seconds.
    Easy,
    /// Decides every 2 seconds.
    #[default]
    Medium,
    /// Decides every second.
    Hard,
}

impl Difficulty {
    /// Seconds between decisions.
    #[must_use]
    pub const fn decision_seconds(self) -> u32 {
        match self {
            Self::Easy => 3,
            Self::Medium => 2,
            Self::Hard => 1,
        }
    }

    /// Ticks between decisions.
    #[must_use]
    pub const fn decision_interval(self) -> u64 {
        seconds_to_ticks(self.decision_seconds()) as u64
    }
}

/// Strategic state of one AI player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AiState {
    /// Not yet started.
    #[default]
    Idle,
    /// Growing the economy and army, founding bases.
    Expanding,
    /// Sending waves at the enemy.
    Attacking,
    /// Regrouping at a damaged structure.
    Defending,
    /// Building up the worker floor.
    Gathering,
}

impl AiState {
    /// Display name for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Expanding => "expanding",
            Self::Attacking => "attacking",
            Self::Defending => "defending",
            Self::Gathering => "gathering",
        }
    }
}

/// One instruction for the command surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AiOrder {
    /// Command a unit.
    Unit {
        /// Unit to command.
        unit: EntityId,
        /// What to do.
        command: UnitCommand,
    },
    /// Queue production.
    Train {
        /// Producing building.
        building: EntityId,
        /// Unit to train.
        kind: UnitKind,
    },
}

/// Snapshot of what an AI owns, taken once per decision.
#[derive(Debug, Default)]
struct Census {
    workers: Vec<EntityId>,
    idle_workers: Vec<EntityId>,
    combat: Vec<EntityId>,
    available_combat: Vec<EntityId>,
    producers: Vec<EntityId>,
    base_positions: Vec<Vec2Fixed>,
    home: Option<Vec2Fixed>,
    has_barracks: bool,
    construction_pending: bool,
    queued_workers: usize,
    queued_combat: usize,
    damaged: Option<Vec2Fixed>,
}

impl Census {
    fn take(world: &World, catalog: &Catalog, player: PlayerId, race: Race, since: u64) -> Self {
        let mut census = Self::default();

        for unit in world.units.iter_sorted() {
            if unit.owner != player || unit.health.is_dead() {
                continue;
            }
            let idle = unit.state == UnitState::Idle && unit.commands.is_empty();
            if unit.can_gather() {
                census.workers.push(unit.id);
                if idle {
                    census.idle_workers.push(unit.id);
                }
                if unit.build_order.is_some() {
                    census.construction_pending = true;
                }
            } else if unit.is_armed() {
                census.combat.push(unit.id);
                if idle || unit.state == UnitState::Patrolling {
                    census.available_combat.push(unit.id);
                }
            }
        }

        for building in world.buildings.iter_sorted() {
            if building.owner != player {
                continue;
            }
            if building.kind == BuildingKind::Base {
                census.base_positions.push(building.position);
                if census.home.is_none() && building.is_constructed {
                    census.home = Some(building.position);
                }
            }
            if building.kind == BuildingKind::Barracks {
                census.has_barracks = true;
            }
            if !building.is_constructed {
                census.construction_pending = true;
                continue;
            }
            census.producers.push(building.id);
            for item in building.production_queue().iter() {
                if is_worker_kind(catalog, race, item.unit_kind) {
                    census.queued_workers += 1;
                } else {
                    census.queued_combat += 1;
                }
            }
            if census.damaged.is_none()
                && building.last_damaged_tick.is_some_and(|t| t >= since)
            {
                census.damaged = Some(building.position);
            }
        }

        if census.home.is_none() {
            census.home = census.base_positions.first().copied();
        }
        census
    }
}

fn is_worker_kind(catalog: &Catalog, race: Race, kind: UnitKind) -> bool {
    catalog.unit(race, kind).is_ok_and(|t| t.gathers)
}

fn is_combat_kind(catalog: &Catalog, race: Race, kind: UnitKind) -> bool {
    catalog
        .unit(race, kind)
        .is_ok_and(|t| t.attack.is_some() && !t.gathers)
}

/// Decision loop for one AI player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiController {
    /// Controlled player.
    pub player: PlayerId,
    /// Cadence.
    pub difficulty: Difficulty,
    /// Current strategic state.
    pub state: AiState,
    /// State to return to once a defense ends.
    pub resume_state: AiState,
    /// Army size that triggers the next attack.
    pub combat_goal: usize,
    next_decision: u64,
    last_decision: u64,
    gather_cursor: usize,
    rng: ChaCha8Rng,
}

impl AiController {
    /// Create a controller. The RNG is seeded from the match seed and the
    /// player id so every AI in a match rolls differently but reproducibly.
    #[must_use]
    pub fn new(player: PlayerId, difficulty: Difficulty, seed: u64) -> Self {
        Self {
            player,
            difficulty,
            state: AiState::Idle,
            resume_state: AiState::Gathering,
            combat_goal: INITIAL_COMBAT_GOAL,
            next_decision: 0,
            last_decision: 0,
            gather_cursor: 0,
            rng: ChaCha8Rng::seed_from_u64(seed ^ u64::from(player).rotate_left(32)),
        }
    }

    /// Whether a decision is due on `tick`.
    #[must_use]
    pub const fn is_due(&self, tick: u64) -> bool {
        tick >= self.next_decision
    }

    fn set_state(&mut self, next: AiState, tick: u64) {
        if self.state != next {
            info!(
                tick,
                player = self.player,
                from = self.state.name(),
                to = next.name(),
                "AI state change"
            );
            self.state = next;
        }
    }

    /// Run one decision if due, returning the orders to apply.
    pub fn decide(&mut self, world: &World, catalog: &Catalog, tick: u64) -> Vec<AiOrder> {
        if !self.is_due(tick) {
            return Vec::new();
        }
        let since = self.last_decision;
        self.last_decision = tick;
        self.next_decision = tick + self.difficulty.decision_interval();

        let Some(player) = world.players.get(&self.player) else {
            return Vec::new();
        };
        if player.is_eliminated() {
            return Vec::new();
        }
        let race = player.race;
        let mut budget = player.ledger;
        let census = Census::take(world, catalog, self.player, race, since);
        let mut orders = Vec::new();
        let mut claimed = BTreeSet::new();

        if census.damaged.is_some() {
            if self.state != AiState::Defending {
                self.resume_state = self.state;
                self.set_state(AiState::Defending, tick);
            }
        } else if self.state == AiState::Defending {
            self.set_state(self.resume_state, tick);
        }
        if self.state == AiState::Idle {
            self.set_state(AiState::Gathering, tick);
        }

        match self.state {
            AiState::Idle | AiState::Gathering => {
                Self::train_workers(world, catalog, race, &census, &mut budget, &mut orders);
                if census.workers.len() >= WORKER_FLOOR {
                    self.set_state(AiState::Expanding, tick);
                }
            }
            AiState::Expanding => {
                Self::train_workers(world, catalog, race, &census, &mut budget, &mut orders);
                self.train_combat(world, catalog, race, &census, &mut budget, &mut orders);
                if census.workers.len() >= WORKER_FLOOR && !census.producers.is_empty() {
                    self.expand(world, catalog, race, &census, &mut budget, &mut orders, &mut claimed);
                }
                if census.combat.len() >= self.combat_goal {
                    self.combat_goal += COMBAT_GOAL_STEP;
                    self.set_state(AiState::Attacking, tick);
                }
            }
            AiState::Attacking => {
                if let Some(target) = self.choose_target(world) {
                    let wave = (census.available_combat.len() / 2).max(1);
                    for &unit in census.available_combat.iter().take(wave) {
                        orders.push(AiOrder::Unit {
                            unit,
                            command: UnitCommand::Attack(target),
                        });
                        claimed.insert(unit);
                    }
                    debug!(tick, player = self.player, ?target, wave, "AI attack wave");
                } else {
                    self.combat_goal += COMBAT_GOAL_STEP;
                    self.set_state(AiState::Expanding, tick);
                }
                Self::train_workers(world, catalog, race, &census, &mut budget, &mut orders);
                self.train_combat(world, catalog, race, &census, &mut budget, &mut orders);
            }
            AiState::Defending => {
                if let Some(position) = census.damaged {
                    for &unit in &census.combat {
                        let engaged = world
                            .units
                            .get(unit)
                            .is_some_and(|u| u.state == UnitState::Attacking);
                        if !engaged {
                            orders.push(AiOrder::Unit {
                                unit,
                                command: UnitCommand::Move(position),
                            });
                            claimed.insert(unit);
                        }
                    }
                }
                self.train_combat(world, catalog, race, &census, &mut budget, &mut orders);
            }
        }

        self.auto_attack(world, &census, &claimed, &mut orders);
        self.assign_idle_workers(world, &census, &claimed, &mut orders);
        orders
    }

    fn queue_room(world: &World, building: EntityId) -> bool {
        world
            .buildings
            .get(building)
            .is_some_and(|b| b.queue.len() < AI_QUEUE_DEPTH)
    }

    fn train_workers(
        world: &World,
        catalog: &Catalog,
        race: Race,
        census: &Census,
        budget: &mut Resources,
        orders: &mut Vec<AiOrder>,
    ) {
        let mut planned = census.workers.len() + census.queued_workers;
        for &building_id in &census.producers {
            if planned >= WORKER_FLOOR {
                return;
            }
            let Some(building) = world.buildings.get(building_id) else {
                continue;
            };
            let Some(kind) = UnitKind::ALL
                .into_iter()
                .find(|&k| building.can_produce(k) && is_worker_kind(catalog, race, k))
            else {
                continue;
            };
            let Ok(template) = catalog.unit(race, kind) else {
                continue;
            };
            if Self::queue_room(world, building_id) && budget.spend(&template.cost) {
                orders.push(AiOrder::Train {
                    building: building_id,
                    kind,
                });
                planned += 1;
            }
        }
    }

    fn train_combat(
        &mut self,
        world: &World,
        catalog: &Catalog,
        race: Race,
        census: &Census,
        budget: &mut Resources,
        orders: &mut Vec<AiOrder>,
    ) {
        let mut planned = census.combat.len() + census.queued_combat;
        for &building_id in &census.producers {
            if planned >= self.combat_goal {
                return;
            }
            let Some(building) = world.buildings.get(building_id) else {
                continue;
            };
            let affordable: Vec<(UnitKind, Resources)> = UnitKind::ALL
                .into_iter()
                .filter(|&k| building.can_produce(k) && is_combat_kind(catalog, race, k))
                .filter_map(|k| catalog.unit(race, k).ok().map(|t| (k, t.cost)))
                .filter(|(_, cost)| budget.can_afford(cost))
                .collect();
            if affordable.is_empty() || !Self::queue_room(world, building_id) {
                continue;
            }
            let (kind, cost) = affordable[self.rng.gen_range(0..affordable.len())];
            if budget.spend(&cost) {
                orders.push(AiOrder::Train {
                    building: building_id,
                    kind,
                });
                planned += 1;
            }
        }
    }

    /// Found a barracks if missing, otherwise a new base near resources.
    fn expand(
        &self,
        world: &World,
        catalog: &Catalog,
        race: Race,
        census: &Census,
        budget: &mut Resources,
        orders: &mut Vec<AiOrder>,
        claimed: &mut BTreeSet<EntityId>,
    ) {
        if census.construction_pending {
            return;
        }
        let Some(home) = census.home else {
            return;
        };

        let (kind, anchor) = if !census.has_barracks {
            let base_radius = catalog
                .building(race, BuildingKind::Base)
                .map_or(Fixed::ZERO, |t| t.radius());
            let barracks_radius = catalog
                .building(race, BuildingKind::Barracks)
                .map_or(Fixed::ZERO, |t| t.radius());
            let center = Vec2Fixed::new(world.world_size(), world.world_size())
                .scale(Fixed::from_num(0.5));
            let toward = (center - home).normalize();
            let toward = if toward == Vec2Fixed::ZERO {
                Vec2Fixed::UNIT_X
            } else {
                toward
            };
            let gap = base_radius + barracks_radius + Fixed::from_num(BARRACKS_SPACING);
            (BuildingKind::Barracks, home + toward.scale(gap))
        } else if census.base_positions.len() < MAX_BASES {
            let min_distance = Fixed::from_num(EXPANSION_MIN_DISTANCE);
            let candidate = world
                .resources
                .iter_sorted()
                .filter(|node| !node.is_depleted())
                .filter(|node| {
                    census
                        .base_positions
                        .iter()
                        .all(|&base| base.distance(node.position) >= min_distance)
                })
                .min_by(|a, b| {
                    a.position
                        .distance_squared(home)
                        .cmp(&b.position.distance_squared(home))
                        .then(a.id.cmp(&b.id))
                });
            let Some(node) = candidate else {
                return;
            };
            (BuildingKind::Base, node.position)
        } else {
            return;
        };

        let Ok(template) = catalog.building(race, kind) else {
            return;
        };
        if !budget.can_afford(&template.cost) {
            return;
        }
        let placement =
            world
                .index
                .find_valid_placement(anchor, template.radius(), DEFAULT_PLACEMENT_ATTEMPTS);
        if !placement.is_found() {
            return;
        }
        let Some(&builder) = census
            .idle_workers
            .first()
            .or_else(|| census.workers.first())
        else {
            return;
        };

        budget.spend(&template.cost);
        claimed.insert(builder);
        orders.push(AiOrder::Unit {
            unit: builder,
            command: UnitCommand::Build {
                kind,
                position: placement.position,
            },
        });
        info!(
            player = self.player,
            builder,
            kind = kind.name(),
            "AI founding structure"
        );
    }

    /// Enemy structures first, then units; uniform pick within the tier.
    fn choose_target(&mut self, world: &World) -> Option<Target> {
        let structures: Vec<Target> = world
            .buildings
            .iter_sorted()
            .filter(|b| b.owner != self.player && !b.health.is_dead())
            .map(|b| Target::Building(b.id))
            .collect();
        let tier = if structures.is_empty() {
            world
                .units
                .iter_sorted()
                .filter(|u| u.owner != self.player && !u.health.is_dead())
                .map(|u| Target::Unit(u.id))
                .collect()
        } else {
            structures
        };
        if tier.is_empty() {
            return None;
        }
        Some(tier[self.rng.gen_range(0..tier.len())])
    }

    fn auto_attack(
        &self,
        world: &World,
        census: &Census,
        claimed: &BTreeSet<EntityId>,
        orders: &mut Vec<AiOrder>,
    ) {
        for &unit_id in &census.available_combat {
            if claimed.contains(&unit_id) {
                continue;
            }
            let Some(unit) = world.units.get(unit_id) else {
                continue;
            };
            let Some(attack) = unit.attack_profile() else {
                continue;
            };
            let reach = attack.range * Fixed::from_num(AUTO_ATTACK_RANGE_PERCENT) / Fixed::from_num(100);
            let me = self.player;
            let target = world
                .index
                .query_radius(unit.position, reach, ClassFilter::ATTACKABLE, |e| {
                    e.owner.is_some_and(|owner| owner != me)
                })
                .into_iter()
                .filter_map(|hit| world.target_for(hit.id))
                .find(|target| world.is_target_alive(target));
            if let Some(target) = target {
                orders.push(AiOrder::Unit {
                    unit: unit_id,
                    command: UnitCommand::Attack(target),
                });
            }
        }
    }

    /// Round-robin idle workers over the nodes around own bases.
    fn assign_idle_workers(
        &mut self,
        world: &World,
        census: &Census,
        claimed: &BTreeSet<EntityId>,
        orders: &mut Vec<AiOrder>,
    ) {
        let reach = Fixed::from_num(EXPANSION_MIN_DISTANCE);
        let mut nodes: Vec<(Fixed, EntityId)> = world
            .resources
            .iter_sorted()
            .filter(|node| !node.is_depleted())
            .filter(|node| {
                census
                    .base_positions
                    .iter()
                    .any(|&base| base.distance(node.position) <= reach)
            })
            .map(|node| {
                let home = census.home.unwrap_or(node.position);
                (node.position.distance_squared(home), node.id)
            })
            .collect();
        nodes.sort_unstable();
        if nodes.is_empty() {
            return;
        }

        for &worker in &census.idle_workers {
            if claimed.contains(&worker) {
                continue;
            }
            let (_, node) = nodes[self.gather_cursor % nodes.len()];
            self.gather_cursor = self.gather_cursor.wrapping_add(1);
            orders.push(AiOrder::Unit {
                unit: worker,
                command: UnitCommand::Gather(node),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buildings::Building;
    use crate::components::Unit;
    use crate::economy::{Player, ResourceKind, ResourceNode};

    struct Fixture {
        world: World,
        catalog: Catalog,
    }

    impl Fixture {
        fn new(ledger: Resources) -> Self {
            let mut world = World::new(Fixed::from_num(2048), Fixed::from_num(64));
            world
                .players
                .insert(1, Player::new(1, Race::Vanguard, ledger));
            world
                .players
                .insert(2, Player::new(2, Race::Swarm, Resources::ZERO));
            Self {
                world,
                catalog: Catalog::standard(),
            }
        }

        fn unit(&mut self, owner: PlayerId, kind: UnitKind, x: i32, y: i32) -> EntityId {
            let race = self.world.players[&owner].race;
            let id = self.world.allocate_id();
            let template = self.catalog.unit(race, kind).unwrap();
            let unit = Unit::from_template(id, owner, race, kind, template, Vec2Fixed::from_ints(x, y));
            self.world.units.insert(id, unit);
            self.world.players.get_mut(&owner).unwrap().units.insert(id);
            id
        }

        fn building(&mut self, owner: PlayerId, kind: BuildingKind, x: i32, y: i32) -> EntityId {
            let race = self.world.players[&owner].race;
            let id = self.world.allocate_id();
            let template = self.catalog.building(race, kind).unwrap();
            let building =
                Building::constructed(id, owner, race, kind, template, Vec2Fixed::from_ints(x, y));
            self.world.buildings.insert(id, building);
            self.world.players.get_mut(&owner).unwrap().buildings.insert(id);
            id
        }

        fn node(&mut self, x: i32, y: i32) -> EntityId {
            let id = self.world.allocate_id();
            self.world.resources.insert(
                id,
                ResourceNode::new(id, ResourceKind::Minerals, 1000, Vec2Fixed::from_ints(x, y), Fixed::from_num(12)),
            );
            id
        }
    }

    fn trains(orders: &[AiOrder]) -> Vec<UnitKind> {
        orders
            .iter()
            .filter_map(|o| match o {
                AiOrder::Train { kind, .. } => Some(*kind),
                AiOrder::Unit { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_decision_cadence() {
        let mut fixture = Fixture::new(Resources::ZERO);
        fixture.unit(1, UnitKind::Worker, 100, 100);
        let mut ai = AiController::new(1, Difficulty::Easy, 7);

        ai.decide(&fixture.world, &fixture.catalog, 0);
        assert!(!ai.is_due(59));
        assert!(ai.is_due(60));
        assert_eq!(Difficulty::Hard.decision_interval(), 20);
        assert_eq!(Difficulty::Medium.decision_interval(), 40);
    }

    #[test]
    fn test_first_decision_enters_gathering_and_trains_workers() {
        let mut fixture = Fixture::new(Resources::new(500, 0));
        fixture.building(1, BuildingKind::Base, 300, 300);
        fixture.unit(1, UnitKind::Worker, 300, 360);
        let mut ai = AiController::new(1, Difficulty::Medium, 1);

        let orders = ai.decide(&fixture.world, &fixture.catalog, 0);

        assert_eq!(ai.state, AiState::Gathering);
        assert_eq!(trains(&orders), vec![UnitKind::Worker]);
    }

    #[test]
    fn test_gathering_moves_to_expanding_at_floor() {
        let mut fixture = Fixture::new(Resources::ZERO);
        fixture.building(1, BuildingKind::Base, 300, 300);
        for i in 0..5 {
            fixture.unit(1, UnitKind::Worker, 280 + i * 20, 360);
        }
        let mut ai = AiController::new(1, Difficulty::Medium, 1);
        ai.decide(&fixture.world, &fixture.catalog, 0);
        assert_eq!(ai.state, AiState::Expanding);
    }

    #[test]
    fn test_expanding_with_full_army_starts_attacking() {
        let mut fixture = Fixture::new(Resources::ZERO);
        fixture.building(1, BuildingKind::Base, 300, 300);
        fixture.building(1, BuildingKind::Barracks, 420, 300);
        for i in 0..5 {
            fixture.unit(1, UnitKind::Worker, 280 + i * 20, 360);
        }
        for i in 0..10 {
            fixture.unit(1, UnitKind::Infantry, 250 + i * 20, 450);
        }
        let mut ai = AiController::new(1, Difficulty::Medium, 1);
        ai.state = AiState::Expanding;

        ai.decide(&fixture.world, &fixture.catalog, 0);

        assert_eq!(ai.state, AiState::Attacking);
        assert_eq!(ai.combat_goal, INITIAL_COMBAT_GOAL + COMBAT_GOAL_STEP);
    }

    #[test]
    fn test_attack_prefers_structures_and_sends_half() {
        let mut fixture = Fixture::new(Resources::ZERO);
        fixture.building(1, BuildingKind::Base, 300, 300);
        for i in 0..6 {
            fixture.unit(1, UnitKind::Infantry, 250 + i * 20, 450);
        }
        let enemy_base = fixture.building(2, BuildingKind::Base, 1700, 1700);
        fixture.unit(2, UnitKind::Worker, 1700, 1600);
        let mut ai = AiController::new(1, Difficulty::Medium, 1);
        ai.state = AiState::Attacking;

        let orders = ai.decide(&fixture.world, &fixture.catalog, 0);

        let attacks: Vec<_> = orders
            .iter()
            .filter_map(|o| match o {
                AiOrder::Unit {
                    command: UnitCommand::Attack(target),
                    ..
                } => Some(*target),
                _ => None,
            })
            .collect();
        assert_eq!(attacks.len(), 3);
        assert!(attacks.iter().all(|t| *t == Target::Building(enemy_base)));
    }

    #[test]
    fn test_attack_without_enemy_reverts_to_expanding() {
        let mut fixture = Fixture::new(Resources::ZERO);
        fixture.building(1, BuildingKind::Base, 300, 300);
        fixture.unit(1, UnitKind::Infantry, 300, 450);
        let mut ai = AiController::new(1, Difficulty::Medium, 1);
        ai.state = AiState::Attacking;

        ai.decide(&fixture.world, &fixture.catalog, 0);

        assert_eq!(ai.state, AiState::Expanding);
        assert_eq!(ai.combat_goal, INITIAL_COMBAT_GOAL + COMBAT_GOAL_STEP);
    }

    #[test]
    fn test_damage_triggers_defending_and_reverts() {
        let mut fixture = Fixture::new(Resources::ZERO);
        let base = fixture.building(1, BuildingKind::Base, 300, 300);
        let guard = fixture.unit(1, UnitKind::Infantry, 600, 600);
        let mut ai = AiController::new(1, Difficulty::Hard, 1);
        ai.state = AiState::Expanding;
        ai.decide(&fixture.world, &fixture.catalog, 0);

        fixture.world.buildings.get_mut(base).unwrap().last_damaged_tick = Some(10);
        let orders = ai.decide(&fixture.world, &fixture.catalog, 20);
        assert_eq!(ai.state, AiState::Defending);
        assert!(orders.contains(&AiOrder::Unit {
            unit: guard,
            command: UnitCommand::Move(Vec2Fixed::from_ints(300, 300)),
        }));

        ai.decide(&fixture.world, &fixture.catalog, 40);
        assert_eq!(ai.state, AiState::Expanding);
    }

    #[test]
    fn test_idle_workers_round_robin() {
        let mut fixture = Fixture::new(Resources::ZERO);
        fixture.building(1, BuildingKind::Base, 300, 300);
        let near = fixture.node(300, 420);
        let far = fixture.node(450, 300);
        fixture.node(1500, 1500);
        let w1 = fixture.unit(1, UnitKind::Worker, 280, 360);
        let w2 = fixture.unit(1, UnitKind::Worker, 300, 360);
        let w3 = fixture.unit(1, UnitKind::Worker, 320, 360);
        let mut ai = AiController::new(1, Difficulty::Medium, 1);

        let orders = ai.decide(&fixture.world, &fixture.catalog, 0);

        let gathers: Vec<_> = orders
            .iter()
            .filter_map(|o| match o {
                AiOrder::Unit {
                    unit,
                    command: UnitCommand::Gather(node),
                } => Some((*unit, *node)),
                _ => None,
            })
            .collect();
        assert_eq!(gathers, vec![(w1, near), (w2, far), (w3, near)]);
    }

    #[test]
    fn test_expansion_targets_distant_node() {
        let mut fixture = Fixture::new(Resources::new(1000, 0));
        fixture.building(1, BuildingKind::Base, 300, 300);
        fixture.building(1, BuildingKind::Barracks, 420, 300);
        fixture.node(300, 420);
        let remote = fixture.node(900, 300);
        for i in 0..5 {
            fixture.unit(1, UnitKind::Worker, 280 + i * 20, 360);
        }
        fixture.world.rebuild_index();
        let mut ai = AiController::new(1, Difficulty::Medium, 1);
        ai.state = AiState::Expanding;

        let orders = ai.decide(&fixture.world, &fixture.catalog, 0);

        let remote_pos = fixture.world.resources.get(remote).unwrap().position;
        let build = orders.iter().find_map(|o| match o {
            AiOrder::Unit {
                command: UnitCommand::Build { kind, position },
                ..
            } => Some((*kind, *position)),
            _ => None,
        });
        let (kind, position) = build.unwrap();
        assert_eq!(kind, BuildingKind::Base);
        assert!(position.distance(remote_pos) < Fixed::from_num(200));
    }

    #[test]
    fn test_auto_attack_engages_nearby_enemy() {
        let mut fixture = Fixture::new(Resources::ZERO);
        fixture.building(1, BuildingKind::Base, 300, 300);
        let guard = fixture.unit(1, UnitKind::Infantry, 600, 600);
        let intruder = fixture.unit(2, UnitKind::Worker, 620, 600);
        fixture.world.rebuild_index();
        let mut ai = AiController::new(1, Difficulty::Medium, 1);
        ai.state = AiState::Expanding;

        let orders = ai.decide(&fixture.world, &fixture.catalog, 0);

        assert!(orders.contains(&AiOrder::Unit {
            unit: guard,
            command: UnitCommand::Attack(Target::Unit(intruder)),
        }));
    }

    #[test]
    fn test_same_seed_same_orders() {
        let build = || {
            let mut fixture = Fixture::new(Resources::new(2000, 500));
            fixture.building(1, BuildingKind::Base, 300, 300);
            fixture.building(1, BuildingKind::Barracks, 420, 300);
            fixture.building(1, BuildingKind::Barracks, 420, 420);
            for i in 0..5 {
                fixture.unit(1, UnitKind::Worker, 280 + i * 20, 360);
            }
            fixture
        };
        let a = build();
        let b = build();
        let mut ai_a = AiController::new(1, Difficulty::Medium, 99);
        let mut ai_b = AiController::new(1, Difficulty::Medium, 99);
        ai_a.state = AiState::Expanding;
        ai_b.state = AiState::Expanding;

        assert_eq!(
            ai_a.decide(&a.world, &a.catalog, 0),
            ai_b.decide(&b.world, &b.catalog, 0)
        );
    }
}
