//! Per-unit behavioral state machine.
//!
//! Every tick each live unit cools its weapon, takes the next queued
//! command if idle, then runs the step for its current state. State changes
//! go through [`transition`], which enforces the state machine's edges and
//! logs anything else as an editor error.

use tracing::{debug, info, warn};

use crate::buildings::Building;
use crate::components::{
    Attacker, BuildOrder, EntityClass, EntityId, PatrolRoute, Projectile, Target, Unit,
    UnitCommand, UnitState,
};
use crate::economy::GATHER_AMOUNT;
use crate::math::{Fixed, Vec2Fixed};
use crate::races::Catalog;
use crate::simulation::{DamageEvent, GatherEvent, TickEvents};
use crate::spatial::{ClassFilter, IndexEntry, DEFAULT_PLACEMENT_ATTEMPTS};
use crate::world::World;

/// Extra reach beyond touching radii for gathering and building.
pub const INTERACTION_MARGIN: i32 = 5;

/// Arrival threshold floor for point destinations.
pub const MIN_ARRIVAL_DISTANCE: i32 = 2;

/// Avoidance looks this many radii out.
const AVOIDANCE_RANGE_FACTOR: i32 = 3;

/// Avoidance force is capped at this percentage of base speed.
const AVOIDANCE_CAP_PERCENT: i32 = 30;

/// Move `unit` to `next` if the state machine allows it.
///
/// Returns `false` (and leaves the state alone) for a disallowed edge.
pub fn transition(unit: &mut Unit, next: UnitState, tick: u64) -> bool {
    if unit.state == next {
        return true;
    }
    if !unit.state.can_transition_to(next) {
        warn!(
            tick,
            unit = unit.id,
            from = unit.state.name(),
            to = next.name(),
            "Disallowed state transition ignored"
        );
        return false;
    }
    debug!(
        tick,
        unit = unit.id,
        from = unit.state.name(),
        to = next.name(),
        "State transition"
    );
    unit.state = next;
    if next == UnitState::Idle {
        unit.velocity = Vec2Fixed::ZERO;
    }
    true
}

/// Start executing `command` on an idle unit.
pub fn begin_command(unit: &mut Unit, command: UnitCommand, tick: u64) {
    match command {
        UnitCommand::Stop => unit.reset(),
        UnitCommand::Move(point) => {
            unit.target = Some(Target::Point(point));
            transition(unit, UnitState::Moving, tick);
        }
        UnitCommand::Attack(target) => {
            if !unit.is_armed() {
                debug!(tick, unit = unit.id, "Unarmed unit cannot attack");
                return;
            }
            unit.target = Some(target);
            transition(unit, UnitState::Moving, tick);
        }
        UnitCommand::Gather(node) => {
            unit.gather_target = Some(node);
            transition(unit, UnitState::Moving, tick);
        }
        UnitCommand::Patrol(a, b) => {
            unit.patrol = Some(PatrolRoute::new(a, b));
            transition(unit, UnitState::Patrolling, tick);
        }
        UnitCommand::Build { kind, position } => {
            unit.build_order = Some(BuildOrder {
                kind,
                position,
                site: None,
            });
            transition(unit, UnitState::Moving, tick);
        }
    }
}

/// Advance one unit by one tick.
pub fn update_unit(
    world: &mut World,
    catalog: &Catalog,
    id: EntityId,
    tick: u64,
    events: &mut TickEvents,
) {
    let Some(mut unit) = world.units.remove(id) else {
        return;
    };
    if !unit.health.is_dead() {
        step(&mut unit, world, catalog, tick, events);
    }
    world.units.insert(id, unit);
}

fn step(unit: &mut Unit, world: &mut World, catalog: &Catalog, tick: u64, events: &mut TickEvents) {
    if let Some(attack) = unit.attack.as_mut() {
        attack.tick_cooldown();
    }

    if unit.state == UnitState::Idle {
        if let Some(command) = unit.commands.pop() {
            begin_command(unit, command, tick);
        }
    }

    match unit.state {
        UnitState::Idle => unit.velocity = Vec2Fixed::ZERO,
        UnitState::Moving => step_moving(unit, world, catalog, tick),
        UnitState::Attacking => step_attacking(unit, world, tick, events),
        UnitState::Gathering => step_gathering(unit, world, tick, events),
        UnitState::Building => step_building(unit, world, tick, events),
        UnitState::Patrolling => step_patrolling(unit, world, tick),
    }
}

fn arrival_distance(unit: &Unit) -> Fixed {
    unit.speed.max(Fixed::from_num(MIN_ARRIVAL_DISTANCE))
}

fn step_moving(unit: &mut Unit, world: &mut World, catalog: &Catalog, tick: u64) {
    let margin = Fixed::from_num(INTERACTION_MARGIN);

    if let Some(order) = unit.build_order {
        let site_radius = catalog
            .building(unit.race, order.kind)
            .map_or(Fixed::ZERO, |template| template.radius());
        if unit.position.distance(order.position) <= unit.radius + site_radius + margin {
            found_or_join_site(unit, world, catalog, tick);
        } else {
            steer_toward(unit, world, order.position);
        }
        return;
    }

    if let Some(node_id) = unit.gather_target {
        let Some(node) = world.resources.get(node_id).copied() else {
            unit.gather_target = None;
            transition(unit, UnitState::Idle, tick);
            return;
        };
        if node.is_depleted() {
            unit.gather_target = None;
            transition(unit, UnitState::Idle, tick);
        } else if unit.position.distance(node.position) <= unit.radius + node.radius + margin {
            unit.gather_timer = Unit::gather_interval();
            unit.velocity = Vec2Fixed::ZERO;
            transition(unit, UnitState::Gathering, tick);
        } else {
            steer_toward(unit, world, node.position);
        }
        return;
    }

    match unit.target {
        Some(Target::Point(point)) => {
            if unit.position.distance(point) <= arrival_distance(unit) {
                unit.target = None;
                transition(unit, UnitState::Idle, tick);
            } else {
                steer_toward(unit, world, point);
            }
        }
        Some(target) => {
            let Some(position) = world
                .target_position(&target)
                .filter(|_| world.is_target_alive(&target))
            else {
                unit.target = None;
                transition(unit, UnitState::Idle, tick);
                return;
            };
            if in_attack_range(unit, world, &target, position) {
                unit.velocity = Vec2Fixed::ZERO;
                transition(unit, UnitState::Attacking, tick);
            } else {
                steer_toward(unit, world, position);
            }
        }
        None => {
            transition(unit, UnitState::Idle, tick);
        }
    }
}

fn in_attack_range(unit: &Unit, world: &World, target: &Target, position: Vec2Fixed) -> bool {
    unit.attack_profile().is_some_and(|attack| {
        unit.position.distance(position) <= attack.range + world.target_radius(target)
    })
}

fn step_attacking(unit: &mut Unit, world: &mut World, tick: u64, events: &mut TickEvents) {
    let Some(target) = unit.target.filter(|t| t.entity_id().is_some()) else {
        unit.target = None;
        transition(unit, UnitState::Idle, tick);
        return;
    };
    let Some(position) = world
        .target_position(&target)
        .filter(|_| world.is_target_alive(&target))
    else {
        debug!(tick, unit = unit.id, "Target lost");
        unit.target = None;
        transition(unit, UnitState::Idle, tick);
        return;
    };
    if !in_attack_range(unit, world, &target, position) {
        transition(unit, UnitState::Moving, tick);
        return;
    }

    unit.velocity = Vec2Fixed::ZERO;
    let Some(attack) = unit.attack.as_mut() else {
        unit.target = None;
        transition(unit, UnitState::Idle, tick);
        return;
    };
    if !attack.can_attack() {
        return;
    }
    attack.reset_cooldown();
    let (damage, melee) = (attack.damage, attack.is_melee());

    if melee {
        let dealt = world.damage_target(&target, damage, tick);
        events.damage.push(DamageEvent {
            source: unit.id,
            target,
            amount: dealt,
        });
        if !world.is_target_alive(&target) {
            unit.target = None;
            transition(unit, UnitState::Idle, tick);
        }
    } else {
        let projectile_id = world.allocate_id();
        let projectile = Projectile::new(
            projectile_id,
            unit.owner,
            unit.id,
            unit.position,
            target,
            position,
            damage,
        );
        world.projectiles.insert(projectile_id, projectile);
        events.projectiles_fired.push(projectile_id);
    }
}

fn step_gathering(unit: &mut Unit, world: &mut World, tick: u64, events: &mut TickEvents) {
    let Some(node_id) = unit.gather_target else {
        transition(unit, UnitState::Idle, tick);
        return;
    };
    let Some(node) = world.resources.get_mut(node_id) else {
        unit.gather_target = None;
        transition(unit, UnitState::Idle, tick);
        return;
    };

    unit.gather_timer = unit.gather_timer.saturating_sub(1);
    if unit.gather_timer > 0 {
        return;
    }
    unit.gather_timer = Unit::gather_interval();

    let kind = node.kind;
    let amount = node.extract(GATHER_AMOUNT);
    let depleted = node.is_depleted();
    world.add_resources(unit.owner, kind, amount);
    events.gathered.push(GatherEvent {
        unit: unit.id,
        node: node_id,
        kind,
        amount,
    });

    if depleted {
        world.resources.remove(node_id);
        world.index.remove(node_id);
        events.depleted.push(node_id);
        info!(tick, node = node_id, "Resource node depleted");
        unit.gather_target = None;
        transition(unit, UnitState::Idle, tick);
    }
}

fn step_building(unit: &mut Unit, world: &mut World, tick: u64, events: &mut TickEvents) {
    let Some(site_id) = unit.build_order.and_then(|order| order.site) else {
        unit.build_order = None;
        transition(unit, UnitState::Idle, tick);
        return;
    };
    let Some(site) = world.buildings.get_mut(site_id) else {
        debug!(tick, unit = unit.id, site = site_id, "Construction site gone");
        unit.build_order = None;
        transition(unit, UnitState::Idle, tick);
        return;
    };
    if site.is_constructed {
        unit.build_order = None;
        transition(unit, UnitState::Idle, tick);
        return;
    }

    if site.work_on(tick) {
        let owner = site.owner;
        let kind = site.kind;
        if let Some(player) = world.players.get_mut(&owner) {
            player.complete_site(site_id);
        }
        events.constructed.push(site_id);
        info!(
            tick,
            building = site_id,
            player = owner,
            kind = kind.name(),
            "Construction complete"
        );
        unit.build_order = None;
        transition(unit, UnitState::Idle, tick);
    }
}

/// On arrival, join an unfinished own site of the same kind at the spot,
/// or pay for and found a new one.
fn found_or_join_site(unit: &mut Unit, world: &mut World, catalog: &Catalog, tick: u64) {
    let Some(mut order) = unit.build_order else {
        return;
    };

    let existing = world.buildings.iter_sorted().find(|b| {
        b.owner == unit.owner
            && b.kind == order.kind
            && !b.is_constructed
            && b.position.distance(order.position) <= b.radius()
    });
    if let Some(site) = existing {
        debug!(tick, unit = unit.id, site = site.id, "Joining construction site");
        order.site = Some(site.id);
        unit.build_order = Some(order);
        unit.velocity = Vec2Fixed::ZERO;
        transition(unit, UnitState::Building, tick);
        return;
    }

    let Ok(template) = catalog.building(unit.race, order.kind) else {
        warn!(tick, unit = unit.id, kind = order.kind.name(), "No building template");
        unit.build_order = None;
        transition(unit, UnitState::Idle, tick);
        return;
    };

    let placement = world.index.find_valid_placement_excluding(
        order.position,
        template.radius(),
        DEFAULT_PLACEMENT_ATTEMPTS,
        Some(unit.id),
    );
    if !placement.is_found() {
        debug!(tick, unit = unit.id, "No room for construction site");
        unit.build_order = None;
        transition(unit, UnitState::Idle, tick);
        return;
    }

    if let Err(err) = world.spend_resources(unit.owner, &template.cost) {
        debug!(tick, unit = unit.id, %err, "Cannot found construction site");
        unit.build_order = None;
        transition(unit, UnitState::Idle, tick);
        return;
    }

    let site_id = world.allocate_id();
    let site = Building::new_site(
        site_id,
        unit.owner,
        unit.race,
        order.kind,
        template,
        placement.position,
    );
    world.index.insert(IndexEntry {
        id: site_id,
        class: EntityClass::Building,
        owner: Some(unit.owner),
        position: site.position,
        radius: site.radius(),
    });
    world.buildings.insert(site_id, site);
    if let Some(player) = world.players.get_mut(&unit.owner) {
        player.sites.insert(site_id);
    }
    info!(
        tick,
        unit = unit.id,
        site = site_id,
        kind = order.kind.name(),
        "Construction site founded"
    );

    order.site = Some(site_id);
    order.position = placement.position;
    unit.build_order = Some(order);
    unit.velocity = Vec2Fixed::ZERO;
    transition(unit, UnitState::Building, tick);
}

fn step_patrolling(unit: &mut Unit, world: &mut World, tick: u64) {
    let Some(mut route) = unit.patrol else {
        // A route-less patrol has no exit edge; drop back to idle so the
        // queue keeps draining.
        debug!(tick, unit = unit.id, "Patrolling without a route");
        unit.reset();
        return;
    };
    if unit.position.distance(route.current()) <= arrival_distance(unit) {
        route.advance();
        unit.patrol = Some(route);
    }
    steer_toward(unit, world, route.current());
}

/// Repulsion from nearby units, capped at a share of base speed.
fn avoidance(unit: &Unit, world: &World) -> Vec2Fixed {
    let reach = unit.radius * Fixed::from_num(AVOIDANCE_RANGE_FACTOR);
    if reach <= Fixed::ZERO {
        return Vec2Fixed::ZERO;
    }
    let mut push = Vec2Fixed::ZERO;
    for hit in world
        .index
        .query_radius(unit.position, reach, ClassFilter::UNITS, |e| e.id != unit.id)
    {
        let weight = (reach - hit.distance) / reach;
        push -= hit.direction.scale(weight);
    }
    let cap = unit.speed * Fixed::from_num(AVOIDANCE_CAP_PERCENT) / Fixed::from_num(100);
    push.scale(unit.speed).clamp_length(cap)
}

/// Head toward `goal` at base speed, blend in avoidance, integrate and
/// clamp to the world bounds.
fn steer_toward(unit: &mut Unit, world: &World, goal: Vec2Fixed) {
    let offset = goal - unit.position;
    let distance = offset.length();
    let desired = if distance <= unit.speed {
        offset
    } else {
        offset.normalize().scale(unit.speed)
    };
    unit.velocity = desired + avoidance(unit, world);
    unit.position = world.clamp_to_world(unit.position + unit.velocity, unit.radius);
}
