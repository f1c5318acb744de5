//! Scalability benchmarks for the swarm engine
//!
//! Measures grid rebuilds and full simulator steps at increasing agent counts.
//!
//! Run with: cargo bench --bench scalability

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use horde_swarm::swarm::constants::flocking::DT;
use horde_swarm::swarm::grid::{GridLayout, SpatialGrid};
use horde_swarm::swarm::{join_combat, Agent, OwnerTag, PoiField, Simulator, SimulatorSettings};
use horde_swarm::util::vec2::Vec2;
use rand::Rng;
use uuid::Uuid;

/// Randomly scattered agents split across `owners` tags
fn scatter_agents(count: usize, bound: f32, owners: u8) -> Vec<Agent> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            let position = Vec2::new(rng.gen_range(-bound..bound), rng.gen_range(-bound..bound));
            let velocity = Vec2::from_angle(rng.gen_range(0.0..std::f32::consts::TAU));
            Agent::new(position, velocity, OwnerTag((i % owners as usize) as u8))
        })
        .collect()
}

fn colony_sim(count: u32) -> Simulator {
    let mut settings = SimulatorSettings::colony();
    settings.initial_capacity = count as usize;
    let mut sim = Simulator::solo(
        Uuid::new_v4(),
        count,
        Vec2::ZERO,
        settings,
        Arc::new(PoiField::empty()),
    )
    .expect("colony simulator");
    // Spawn everyone up front so the timed steps do no growth
    sim.step(DT).expect("initial step");
    sim
}

/// A combat simulator holding two colonies of `per_side` agents each
fn combat_sim(per_side: u32) -> Simulator {
    let pois = Arc::new(PoiField::empty());
    let mut settings = SimulatorSettings::combat();
    settings.initial_capacity = per_side as usize * 2;
    let mut combat = Simulator::merged(settings, Arc::clone(&pois)).expect("combat simulator");

    for target in [Vec2::new(-20.0, 0.0), Vec2::new(20.0, 0.0)] {
        let colony = Uuid::new_v4();
        let mut sim = Simulator::solo(colony, per_side, target, SimulatorSettings::colony(), Arc::clone(&pois))
            .expect("colony simulator");
        sim.step(DT).expect("colony step");
        join_combat(&mut sim, &mut combat, colony).expect("join combat");
    }
    combat
}

/// Benchmark the counting-sort grid rebuild
fn bench_grid_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_rebuild");
    group.sample_size(50);

    for count in [1_000, 10_000, 50_000, 100_000] {
        let agents = scatter_agents(count, 200.0, 6);
        let layout = GridLayout::new(256.0, 256.0, 2.0).expect("layout");
        let mut grid = SpatialGrid::new(layout);
        let mut sorted = Vec::with_capacity(count);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("counting_sort", count), &count, |b, _| {
            b.iter(|| {
                grid.rebuild(black_box(&agents), &mut sorted, count).expect("rebuild");
                black_box(grid.len())
            })
        });
    }
    group.finish();
}

/// Benchmark a full step of a single-colony simulator
fn bench_colony_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("colony_step");
    group.sample_size(30);

    for count in [1_000u32, 10_000, 50_000] {
        let mut sim = colony_sim(count);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("solo", count), &count, |b, _| {
            b.iter(|| black_box(sim.step(DT).expect("step")))
        });
    }
    group.finish();
}

/// Benchmark a full step of a two-sided combat simulator
fn bench_combat_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("combat_step");
    group.sample_size(30);

    for per_side in [500u32, 2_500, 10_000] {
        let mut sim = combat_sim(per_side);

        group.throughput(Throughput::Elements(per_side as u64 * 2));
        group.bench_with_input(BenchmarkId::new("merged", per_side * 2), &per_side, |b, _| {
            b.iter(|| black_box(sim.step(DT).expect("step")))
        });
    }
    group.finish();
}

/// Step time against the 33.3ms budget at 30 Hz
fn bench_tick_budget(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_budget");
    group.sample_size(100);
    group.measurement_time(std::time::Duration::from_secs(10));

    for count in [20_000u32, 50_000] {
        let mut sim = colony_sim(count);

        group.bench_with_input(BenchmarkId::new("vs_budget", count), &count, |b, _| {
            b.iter(|| sim.step(DT).expect("step"))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_grid_rebuild,
    bench_colony_step,
    bench_combat_step,
    bench_tick_budget,
);

criterion_main!(benches);
