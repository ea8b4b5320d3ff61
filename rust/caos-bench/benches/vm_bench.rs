//! Criterion benchmarks for script execution and tick scheduling.

use caos_bench::{counting_loop, timer_world};
use caos_runtime::{Harness, Scheduler, SchedulerConfig, SimWorld, WorldConfig};
use caos_vm::ExecutionContext;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("step");
    for iterations in [100u32, 10_000, 100_000] {
        let parsed = match caos_compiler::parse("c3", &counting_loop(iterations)) {
            Ok(parsed) => parsed,
            Err(e) => {
                eprintln!("Skipping step/{}: {}", iterations, e);
                continue;
            }
        };
        group.throughput(Throughput::Elements(u64::from(iterations)));
        group.bench_with_input(BenchmarkId::new("counting_loop", iterations), &parsed, |b, parsed| {
            b.iter(|| {
                let mut world = SimWorld::default();
                let mut context = ExecutionContext::new(parsed.installer.clone(), None);
                black_box(context.step(&mut world))
            });
        });
    }
    group.finish();
}

fn bench_ticks(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");
    for agents in [10u32, 100, 1_000] {
        let source = timer_world(agents);
        group.throughput(Throughput::Elements(u64::from(agents)));
        group.bench_with_input(BenchmarkId::new("timer_agents", agents), &source, |b, src| {
            let mut harness = Harness::new(WorldConfig::default(), SchedulerConfig::default());
            if let Err(e) = harness.run(caos_compiler::Dialect::C3, src) {
                eprintln!("Skipping tick/{}: {}", agents, e);
                return;
            }
            b.iter(|| black_box(harness.scheduler.tick(&mut harness.world)));
        });
    }
    group.finish();
}

fn bench_run_script(c: &mut Criterion) {
    let source = format!("{}dbg: asrt va00 eq 1000\n", counting_loop(1_000));
    c.bench_function("run_script/counting_loop_1000", |b| {
        b.iter(|| caos_runtime::run_script("c3", black_box(&source)));
    });
}

fn bench_fresh_scheduler(c: &mut Criterion) {
    let parsed = match caos_compiler::parse("c3", &timer_world(100)) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("Skipping scheduler/install: {}", e);
            return;
        }
    };
    c.bench_function("scheduler/install_and_tick_100", |b| {
        b.iter(|| {
            let mut scheduler = Scheduler::new(SchedulerConfig { timeslice: Some(10_000), ..SchedulerConfig::default() });
            let mut world = SimWorld::default();
            scheduler.install(&parsed);
            for _ in 0..10 {
                black_box(scheduler.tick(&mut world));
            }
        });
    });
}

criterion_group!(benches, bench_step, bench_ticks, bench_run_script, bench_fresh_scheduler);
criterion_main!(benches);
