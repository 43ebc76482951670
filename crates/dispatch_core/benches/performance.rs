use bevy_ecs::prelude::World;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use dispatch_core::map::LocationOnRoad;
use dispatch_core::runner::{run, simulation_schedule};
use dispatch_core::scenario::{build_world, SimulationParams, TripRecord};
use dispatch_core::test_helpers::{grid_map, secs};

fn bench_path_table_build(c: &mut Criterion) {
    c.bench_function("path_table_grid_12x12", |b| {
        b.iter(|| black_box(grid_map(12, 12, 100.0, 10.0)));
    });
}

fn bench_simulated_day(c: &mut Criterion) {
    c.bench_function("simulate_grid_day", |b| {
        b.iter(|| {
            let map = grid_map(6, 6, 150.0, 10.0);
            let n = map.roads().len();
            let trips: Vec<TripRecord> = (0..100u64)
                .map(|i| {
                    let pickup_road = &map.roads()[(i as usize * 7) % n];
                    let dropoff_road = &map.roads()[(i as usize * 13 + 5) % n];
                    TripRecord {
                        pickup: LocationOnRoad::new(pickup_road, pickup_road.length / 3.0),
                        dropoff: LocationOnRoad::new(dropoff_road, dropoff_road.length / 2.0),
                        pickup_time: secs(5 * i),
                        dropoff_time: secs(5 * i + 120),
                    }
                })
                .collect();

            let params = SimulationParams::default()
                .with_number_of_agents(10)
                .with_seed(42)
                .with_maximum_life_secs(300);
            let mut world = World::new();
            build_world(&mut world, map, trips, &params);

            let mut schedule = simulation_schedule();
            black_box(run(&mut world, &mut schedule, 1_000_000));
        });
    });
}

criterion_group!(benches, bench_path_table_build, bench_simulated_day);
criterion_main!(benches);
