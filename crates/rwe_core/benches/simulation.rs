//! Simulation benchmarks for rwe_core.
//!
//! Run with: `cargo bench -p rwe_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rwe_core::command::{IssueMode, PlayerUnitCommand};
use rwe_core::ids::PlayerId;
use rwe_core::math::SimVector;
use rwe_core::pathfinding::{find_unit_path, PathFindingService};
use rwe_core::simulation::GameSimulation;
use rwe_core::unit::{NavigationGoal, UnitOrder};
use rwe_test_utils::fixtures::{create_test_simulation, spawn_at};

/// Two armies of gunners marching at each other.
fn setup_battle() -> GameSimulation {
    let mut sim = create_test_simulation(2, 99);
    for row in 0..4 {
        for col in 0..8 {
            let x = -280 + col * 80;
            let a = spawn_at(&mut sim, "GUNNER", 0, x, -400 + row * 40);
            let b = spawn_at(&mut sim, "MORTAR", 1, x, 400 - row * 40);
            for (unit, owner, z) in [(a, 0, 200), (b, 1, -200)] {
                sim.issue_unit_command(
                    PlayerId(owner),
                    unit,
                    &PlayerUnitCommand::IssueOrder {
                        order: UnitOrder::Move(SimVector::from_ints(x, 0, z)),
                        mode: IssueMode::Immediate,
                    },
                );
            }
        }
    }
    sim
}

/// A tank behind a wall of rocks with a single gap at the far end.
fn setup_wall() -> GameSimulation {
    let mut sim = create_test_simulation(1, 1);
    for x in (-496..480).step_by(16) {
        sim.spawn_feature("ROCK1", SimVector::from_ints(x, 0, 8))
            .expect("rock should fit");
    }
    spawn_at(&mut sim, "TANK", 0, -400, -300);
    sim
}

pub fn tick_benchmark(c: &mut Criterion) {
    c.bench_function("tick_64_units_battle", |b| {
        b.iter_batched(
            || (setup_battle(), PathFindingService::new()),
            |(mut sim, mut pathfinder)| {
                for _ in 0..30 {
                    sim.tick(&mut pathfinder);
                }
                black_box(sim.compute_hash())
            },
            BatchSize::LargeInput,
        );
    });
}

pub fn pathfinding_benchmark(c: &mut Criterion) {
    let sim = setup_wall();
    let unit = sim.unit_ids()[0];
    let goal = NavigationGoal::Position(SimVector::from_ints(-400, 0, 300));
    c.bench_function("path_around_wall", |b| {
        b.iter(|| black_box(find_unit_path(&sim, unit, black_box(&goal))));
    });
}

pub fn hash_benchmark(c: &mut Criterion) {
    let mut sim = setup_battle();
    let mut pathfinder = PathFindingService::new();
    for _ in 0..60 {
        sim.tick(&mut pathfinder);
    }
    c.bench_function("compute_hash_64_units", |b| {
        b.iter(|| black_box(sim.compute_hash()));
    });
}

criterion_group!(benches, tick_benchmark, pathfinding_benchmark, hash_benchmark);
criterion_main!(benches);
