//! End-to-end match scenarios driven through the public command surface.

use skirmish_core::ai::{AiState, Difficulty, COMBAT_GOAL_STEP, INITIAL_COMBAT_GOAL};
use skirmish_core::prelude::*;
use skirmish_core::spatial::DEFAULT_PLACEMENT_ATTEMPTS;
use skirmish_test_utils::fixtures::{fixed, pos, run_until, test_config, two_player_sim};

#[test]
fn worker_drains_node_at_ten_per_second() {
    let mut sim = two_player_sim(0);
    let node = sim.spawn_resource(ResourceKind::Minerals, 1000, pos(500, 500), fixed(12));
    let worker = sim.spawn_unit(1, UnitKind::Worker, pos(520, 500)).unwrap();
    let before = sim.player(1).unwrap().ledger.minerals;

    sim.gather(worker, node, false).unwrap();

    let mut extractions = Vec::new();
    for _ in 0..2200 {
        let tick = sim.get_tick();
        let events = sim.tick();
        for gather in events.gathered {
            extractions.push((tick, gather.amount));
        }
        if sim.world().resources.get(node).is_none() {
            break;
        }
    }

    assert_eq!(extractions.len(), 100);
    assert!(extractions.iter().all(|&(_, amount)| amount == 10));
    assert!(extractions
        .windows(2)
        .all(|w| w[1].0 - w[0].0 == u64::from(TICK_RATE)));
    assert_eq!(sim.player(1).unwrap().ledger.minerals, before + 1000);
    assert!(sim.world().resources.get(node).is_none());
    assert!(sim
        .world()
        .index
        .query_radius(pos(500, 500), fixed(50), ClassFilter::RESOURCES, |_| true)
        .is_empty());
    assert_eq!(sim.unit(worker).unwrap().state, UnitState::Idle);
}

#[test]
fn ranged_attacker_fires_one_projectile_per_cycle() {
    let mut catalog = Catalog::standard();
    let template = catalog
        .races
        .get_mut(&Race::Vanguard)
        .and_then(|profile| profile.units.get_mut(&UnitKind::Ranged))
        .unwrap();
    template.attack.as_mut().unwrap().range = fixed(40);

    let mut sim = Simulation::with_catalog(test_config(0), catalog).unwrap();
    sim.add_player(1, Race::Vanguard).unwrap();
    sim.add_player(2, Race::Swarm).unwrap();
    let archer = sim.spawn_unit(1, UnitKind::Ranged, pos(500, 500)).unwrap();
    let enemy = sim.spawn_unit(2, UnitKind::Infantry, pos(535, 500)).unwrap();
    let cooldown = sim.unit(archer).unwrap().attack.unwrap().cooldown_ticks;

    sim.attack(archer, enemy, false).unwrap();
    assert_eq!(sim.unit(archer).unwrap().state, UnitState::Moving);
    sim.tick();
    assert_eq!(sim.unit(archer).unwrap().state, UnitState::Attacking);

    let mut volleys = Vec::new();
    for _ in 0..150 {
        let tick = sim.get_tick();
        let fired = sim.tick().projectiles_fired;
        assert!(fired.len() <= 1);
        if !fired.is_empty() {
            volleys.push(tick);
        }
    }

    // Swarm infantry has 40 health and each bolt deals 10.
    assert_eq!(volleys.len(), 4);
    assert!(volleys
        .windows(2)
        .all(|w| w[1] - w[0] == u64::from(cooldown)));
    assert!(sim.unit(enemy).is_none());
    assert_eq!(sim.unit(archer).unwrap().state, UnitState::Idle);
}

#[test]
fn melee_attacker_strikes_without_projectiles() {
    let mut sim = two_player_sim(0);
    let brawler = sim.spawn_unit(1, UnitKind::Infantry, pos(500, 500)).unwrap();
    let enemy = sim.spawn_unit(2, UnitKind::Worker, pos(530, 500)).unwrap();
    sim.attack(brawler, enemy, false).unwrap();

    let mut fired = 0;
    let mut hits = 0;
    for _ in 0..200 {
        let events = sim.tick();
        fired += events.projectiles_fired.len();
        hits += events.damage.len();
    }

    assert_eq!(fired, 0);
    assert!(hits > 0);
    assert!(sim.unit(enemy).is_none());
}

#[test]
fn expanding_ai_with_army_attacks_next_cycle() {
    let mut sim = two_player_sim(0);
    sim.enable_ai(1, Some(Difficulty::Medium)).unwrap();
    sim.spawn_building(1, BuildingKind::Base, pos(300, 300), true).unwrap();
    sim.spawn_building(1, BuildingKind::Barracks, pos(450, 300), true).unwrap();
    for i in 0..5 {
        sim.spawn_unit(1, UnitKind::Worker, pos(250 + i * 25, 400)).unwrap();
    }
    for i in 0..10 {
        sim.spawn_unit(1, UnitKind::Infantry, pos(250 + i * 25, 460)).unwrap();
    }
    sim.spawn_building(2, BuildingKind::Base, pos(1700, 1700), true).unwrap();

    // First decision: idle -> gathering, and with the worker floor met,
    // straight on to expanding.
    sim.tick();
    assert_eq!(sim.ai(1).unwrap().state, AiState::Expanding);

    let interval = Difficulty::Medium.decision_interval();
    let switched = run_until(&mut sim, interval + 1, |s| {
        s.ai(1).unwrap().state != AiState::Expanding
    });
    assert!(switched.is_some());
    let ai = sim.ai(1).unwrap();
    assert_eq!(ai.state, AiState::Attacking);
    assert_eq!(ai.combat_goal, INITIAL_COMBAT_GOAL + COMBAT_GOAL_STEP);
}

#[test]
fn placement_falls_back_after_twenty_candidates() {
    let mut sim = two_player_sim(0);
    // Bases are radius 40 and spaced 80 apart: every point in the block is
    // within 57 of some center.
    for i in 0..12 {
        for j in 0..12 {
            sim.spawn_building(1, BuildingKind::Base, pos(584 + i * 80, 584 + j * 80), true)
                .unwrap();
        }
    }
    let target = pos(1030, 1030);

    let placement = sim
        .world()
        .index
        .find_valid_placement(target, fixed(40), DEFAULT_PLACEMENT_ATTEMPTS);

    assert_eq!(placement.outcome, PlacementOutcome::Exhausted);
    assert_eq!(placement.attempts, DEFAULT_PLACEMENT_ATTEMPTS);
    assert_eq!(placement.position, target);
}

#[test]
fn placement_spirals_away_from_a_single_building() {
    let mut sim = two_player_sim(0);
    let blocker = pos(1000, 1000);
    sim.spawn_building(1, BuildingKind::Base, blocker, true).unwrap();
    let target = pos(1030, 1000);

    let placement = sim
        .world()
        .index
        .find_valid_placement(target, fixed(40), DEFAULT_PLACEMENT_ATTEMPTS);

    assert!(placement.is_found());
    assert!(placement.attempts > 1);
    assert!(placement.attempts <= DEFAULT_PLACEMENT_ATTEMPTS);
    assert!(placement.position.distance(blocker) >= fixed(80));
}

#[test]
fn worker_raises_barracks_from_command() {
    let mut sim = two_player_sim(0);
    let worker = sim.spawn_unit(1, UnitKind::Worker, pos(400, 400)).unwrap();
    let before = sim.player(1).unwrap().ledger;

    sim.build(worker, BuildingKind::Barracks, pos(500, 400), false).unwrap();
    // Paid on founding, not on issue.
    assert_eq!(sim.player(1).unwrap().ledger, before);

    let mut constructed = Vec::new();
    for _ in 0..1200 {
        constructed.extend(sim.tick().constructed);
        if !constructed.is_empty() {
            break;
        }
    }

    assert_eq!(constructed.len(), 1);
    let barracks = sim.building(constructed[0]).unwrap();
    assert!(barracks.is_constructed);
    assert!(sim.player(1).unwrap().buildings.contains(&barracks.id));
    assert_eq!(sim.player(1).unwrap().ledger.minerals, before.minerals - 150);
    assert_eq!(sim.unit(worker).unwrap().state, UnitState::Idle);
}

#[test]
fn ai_match_progresses_deterministically() {
    let build = || {
        let mut config = test_config(42);
        config.starting_resources = Resources::new(800, 0);
        let mut sim = Simulation::new(config).unwrap();
        for (player, race, corner) in [(1, Race::Vanguard, 300), (2, Race::Ascendant, 1700)] {
            sim.add_player(player, race).unwrap();
            sim.enable_ai(player, Some(Difficulty::Hard)).unwrap();
            sim.setup_starting_base(player, pos(corner, corner)).unwrap();
            sim.spawn_resource(ResourceKind::Minerals, 1500, pos(corner + 150, corner), fixed(12));
        }
        sim
    };

    let mut a = build();
    let mut b = build();
    a.run(1200);
    b.run(1200);

    assert_eq!(a.state_hash(), b.state_hash());
    assert!(a.player(1).unwrap().units.len() > 4);
    assert!(a.ai(1).unwrap().state != AiState::Idle);
}

#[test]
fn resumed_patrol_keeps_its_route_and_queue() {
    let mut sim = two_player_sim(0);
    let patroller = sim.spawn_unit(1, UnitKind::Infantry, pos(200, 200)).unwrap();
    let worker = sim.spawn_unit(1, UnitKind::Worker, pos(300, 600)).unwrap();
    sim.patrol(patroller, pos(200, 200), pos(600, 200), false).unwrap();
    sim.move_unit(worker, pos(700, 600), false).unwrap();
    sim.move_unit(worker, pos(700, 900), true).unwrap();
    sim.run(6);

    let snapshot = WorldSnapshot::capture(&sim);
    let mut resumed =
        Simulation::from_snapshot(sim.config().clone(), Catalog::standard(), &snapshot).unwrap();
    assert_eq!(resumed.unit(patroller), sim.unit(patroller));
    assert_eq!(resumed.unit(worker), sim.unit(worker));

    for _ in 0..200 {
        sim.tick();
        resumed.tick();
        assert_eq!(sim.state_hash(), resumed.state_hash());
    }
    let unit = resumed.unit(patroller).unwrap();
    assert_eq!(unit.state, UnitState::Patrolling);
    assert!(unit.patrol.is_some());
    assert_eq!(resumed.unit(worker).unwrap().position, sim.unit(worker).unwrap().position);
}

#[test]
fn trained_unit_appears_at_distant_rally_point() {
    let mut sim = two_player_sim(0);
    let base = sim.setup_starting_base(1, pos(300, 300)).unwrap();
    let rally = pos(700, 300);
    sim.set_rally_point(base, rally).unwrap();
    let before = sim.player(1).unwrap().units.clone();
    sim.train(base, UnitKind::Worker).unwrap();

    let produced = run_until(&mut sim, 400, |s| s.player(1).unwrap().units.len() > before.len());
    assert!(produced.is_some());

    let player = sim.player(1).unwrap();
    let fresh = player.units.difference(&before).next().copied().unwrap();
    let unit = sim.unit(fresh).unwrap();
    assert!(unit.position.distance(rally) <= fixed(1));
    assert_eq!(unit.state, UnitState::Idle);
}

#[test]
fn ai_gather_orders_take_effect_within_the_tick() {
    let mut sim = Simulation::new(test_config(0)).unwrap();
    sim.add_player(1, Race::Swarm).unwrap();
    sim.enable_ai(1, Some(Difficulty::Hard)).unwrap();
    sim.setup_starting_base(1, pos(400, 400)).unwrap();
    let node = sim.spawn_resource(ResourceKind::Minerals, 1000, pos(400, 560), fixed(12));

    sim.tick();

    let gathering = sim
        .world()
        .units
        .values()
        .filter(|u| u.kind == UnitKind::Worker)
        .filter(|u| u.state != UnitState::Idle)
        .count();
    assert!(gathering > 0);
    assert!(sim.world().resources.get(node).is_some());
}
