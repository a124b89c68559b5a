//! Simulation benchmarks for skirmish_core.
//!
//! Run with: `cargo bench -p skirmish_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use skirmish_core::prelude::*;
use skirmish_core::spatial::DEFAULT_PLACEMENT_ATTEMPTS;

fn ai_match() -> Simulation {
    let mut sim = Simulation::new(SimConfig {
        seed: 17,
        ..SimConfig::default()
    })
    .unwrap();
    for (player, race, x) in [(1, Race::Vanguard, 300), (2, Race::Swarm, 1700)] {
        sim.add_player(player, race).unwrap();
        sim.enable_ai(player, Some(Difficulty::Hard)).unwrap();
        sim.setup_starting_base(player, Vec2Fixed::from_ints(x, x)).unwrap();
        for offset in [-150, 150] {
            sim.spawn_resource(
                ResourceKind::Minerals,
                1500,
                Vec2Fixed::from_ints(x + offset, x),
                Fixed::from_num(12),
            );
        }
    }
    sim
}

fn crowded_index() -> SpatialIndex {
    let mut sim = Simulation::default();
    sim.add_player(1, Race::Vanguard).unwrap();
    for i in 0..40 {
        for j in 0..25 {
            sim.spawn_unit(1, UnitKind::Infantry, Vec2Fixed::from_ints(100 + i * 40, 100 + j * 40))
                .unwrap();
        }
    }
    sim.world_mut().rebuild_index();
    sim.world().index.clone()
}

pub fn simulation_benchmark(c: &mut Criterion) {
    c.bench_function("ai_match_600_ticks", |b| {
        b.iter_batched(
            ai_match,
            |mut sim| {
                sim.run(600);
                black_box(sim.state_hash())
            },
            criterion::BatchSize::SmallInput,
        );
    });

    let index = crowded_index();
    c.bench_function("query_radius_1000_units", |b| {
        b.iter(|| {
            black_box(index.query_radius(
                Vec2Fixed::from_ints(800, 600),
                Fixed::from_num(120),
                ClassFilter::UNITS,
                |_| true,
            ))
        });
    });
    c.bench_function("find_valid_placement_crowded", |b| {
        b.iter(|| {
            black_box(index.find_valid_placement(
                Vec2Fixed::from_ints(800, 600),
                Fixed::from_num(32),
                DEFAULT_PLACEMENT_ATTEMPTS,
            ))
        });
    });
}

criterion_group!(benches, simulation_benchmark);
criterion_main!(benches);
