//! Property tests over the command surface and the spatial index.

use proptest::prelude::*;
use skirmish_core::buildings::{ProductionQueue, CANCEL_REFUND_PERCENT};
use skirmish_core::prelude::*;
use skirmish_core::simulation::STARTING_WORKERS;
use skirmish_core::spatial::DEFAULT_PLACEMENT_ATTEMPTS;
use skirmish_test_utils::determinism::strategies::{
    arb_damage, arb_health, arb_position, arb_race, arb_unit_kind,
};
use skirmish_test_utils::fixtures::{fixed, pos, test_config, two_player_sim};

fn with_barracks() -> (Simulation, EntityId) {
    let mut sim = two_player_sim(0);
    let barracks = sim
        .spawn_building(1, BuildingKind::Barracks, pos(600, 600), true)
        .unwrap();
    (sim, barracks)
}

fn arb_combat_kind() -> impl Strategy<Value = UnitKind> {
    prop_oneof![Just(UnitKind::Infantry), Just(UnitKind::Ranged)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn queue_never_exceeds_cap(orders in prop::collection::vec(arb_combat_kind(), 0..12)) {
        let (mut sim, barracks) = with_barracks();
        let start = sim.player(1).unwrap().ledger;
        let mut spent = Resources::ZERO;

        for kind in orders {
            let cost = sim.catalog().unit(Race::Vanguard, kind).unwrap().cost;
            match sim.train(barracks, kind) {
                Ok(()) => {
                    spent.minerals += cost.minerals;
                    spent.gas += cost.gas;
                }
                Err(err) => prop_assert!(matches!(
                    err,
                    CommandError::QueueFull | CommandError::InsufficientResources
                )),
            }
            let queued = sim.building(barracks).unwrap().queue.len();
            prop_assert!(queued <= ProductionQueue::DEFAULT_MAX_QUEUE_SIZE);
        }

        let ledger = sim.player(1).unwrap().ledger;
        prop_assert_eq!(ledger.minerals, start.minerals - spent.minerals);
        prop_assert_eq!(ledger.gas, start.gas - spent.gas);
    }

    #[test]
    fn cancel_refunds_half_regardless_of_progress(
        orders in prop::collection::vec(arb_combat_kind(), 1..=5),
        pick in 0usize..5,
        elapsed in 0u64..250,
    ) {
        let (mut sim, barracks) = with_barracks();
        for &kind in &orders {
            sim.train(barracks, kind).unwrap();
        }
        sim.run(elapsed);

        let queue = &sim.building(barracks).unwrap().queue;
        let index = pick % queue.len();
        let cost = queue.iter().nth(index).unwrap().cost;
        let before = sim.player(1).unwrap().ledger;

        let refund = sim.cancel_production(barracks, index).unwrap();

        prop_assert_eq!(refund.minerals, cost.minerals * CANCEL_REFUND_PERCENT / 100);
        prop_assert_eq!(refund.gas, cost.gas * CANCEL_REFUND_PERCENT / 100);
        let after = sim.player(1).unwrap().ledger;
        prop_assert_eq!(after.minerals, before.minerals + refund.minerals);
        prop_assert_eq!(after.gas, before.gas + refund.gas);
    }

    #[test]
    fn found_placement_never_overlaps_a_building(
        blockers in prop::collection::vec(arb_position(2048), 1..30),
        target in arb_position(2048),
        radius in 8i32..60,
    ) {
        let mut sim = two_player_sim(0);
        for &at in &blockers {
            sim.spawn_building(2, BuildingKind::Barracks, at, true).unwrap();
        }
        let radius = fixed(radius);

        let placement = sim
            .world()
            .index
            .find_valid_placement(target, radius, DEFAULT_PLACEMENT_ATTEMPTS);

        prop_assert!(placement.attempts <= DEFAULT_PLACEMENT_ATTEMPTS);
        if placement.is_found() {
            for building in sim.world().buildings.values() {
                prop_assert!(
                    placement.position.distance(building.position) >= radius + building.radius()
                );
            }
        } else {
            prop_assert_eq!(placement.position, target);
        }
    }

    #[test]
    fn placement_respects_unit_overlap_allowance(
        crowd in prop::collection::vec(arb_position(400), 1..40),
        target in arb_position(400),
    ) {
        let mut sim = two_player_sim(0);
        for &at in &crowd {
            sim.spawn_unit(1, UnitKind::Infantry, at + pos(800, 800)).unwrap();
        }
        let target = target + pos(800, 800);
        let radius = fixed(10);

        let placement = sim
            .world()
            .index
            .find_valid_placement(target, radius, DEFAULT_PLACEMENT_ATTEMPTS);

        if placement.is_found() {
            let neighborhood = radius * fixed(3);
            let allowance = fixed(80) / fixed(100);
            let near: Vec<_> = sim
                .world()
                .units
                .values()
                .filter(|u| {
                    u.position.distance_squared(placement.position) <= neighborhood * neighborhood
                })
                .collect();
            let overlapping = near
                .iter()
                .filter(|u| u.position.distance(placement.position) < (radius + u.radius) * allowance)
                .count();
            prop_assert!(overlapping * 5 <= near.len());
        }
    }

    #[test]
    fn health_stays_in_bounds_through_combat(
        reds in prop::collection::vec((arb_unit_kind(), arb_position(200)), 1..8),
        blues in prop::collection::vec((arb_unit_kind(), arb_position(200)), 1..8),
    ) {
        let mut sim = two_player_sim(0);
        let mut red_ids = Vec::new();
        let mut blue_ids = Vec::new();
        for (kind, at) in reds {
            red_ids.push(sim.spawn_unit(1, kind, at + pos(400, 400)).unwrap());
        }
        for (kind, at) in blues {
            blue_ids.push(sim.spawn_unit(2, kind, at + pos(500, 400)).unwrap());
        }
        for (i, &red) in red_ids.iter().enumerate() {
            let _ = sim.attack(red, blue_ids[i % blue_ids.len()], false);
        }
        for (i, &blue) in blue_ids.iter().enumerate() {
            let _ = sim.attack(blue, red_ids[i % red_ids.len()], false);
        }

        for _ in 0..300 {
            let events = sim.tick();
            for unit in sim.world().units.values() {
                prop_assert!(unit.health.current <= unit.health.max);
                prop_assert!(!unit.health.is_dead());
            }
            for dead in events.deaths {
                prop_assert!(sim.unit(dead).is_none());
            }
        }
    }

    #[test]
    fn health_stays_within_max_under_damage_and_healing(
        max in arb_health(),
        hits in prop::collection::vec((arb_damage(), any::<bool>()), 0..40),
    ) {
        let mut health = Health::new(max);
        for (amount, is_heal) in hits {
            let before = health.current;
            if is_heal {
                let healed = health.heal(amount);
                prop_assert_eq!(health.current, before + healed);
            } else {
                let dealt = health.apply_damage(amount);
                prop_assert_eq!(health.current, before - dealt);
            }
            prop_assert!(health.current <= health.max);
            prop_assert!(health.percentage() <= 100);
        }
    }

    #[test]
    fn starting_base_is_complete_for_every_race(race in arb_race(), at in arb_position(2048)) {
        let mut sim = Simulation::new(test_config(0)).unwrap();
        sim.add_player(1, race).unwrap();
        let base = sim.setup_starting_base(1, at).unwrap();

        let building = sim.building(base).unwrap();
        prop_assert!(building.is_constructed);
        prop_assert_eq!(building.race, race);

        let player = sim.player(1).unwrap();
        prop_assert_eq!(player.units.len(), STARTING_WORKERS);
        let size = fixed(2048);
        for &id in &player.units {
            let worker = sim.unit(id).unwrap();
            prop_assert_eq!(worker.kind, UnitKind::Worker);
            prop_assert!(worker.position.x >= worker.radius && worker.position.x <= size - worker.radius);
            prop_assert!(worker.position.y >= worker.radius && worker.position.y <= size - worker.radius);
        }
    }
}
