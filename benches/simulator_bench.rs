//! Performance benchmarks for the logic evaluation engine.
//!
//! Run with: `cargo bench`
//! Or with rayon: `cargo bench --features parallel`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use logic_eval::{
    Address, BlockKind, Difference, Evaluator, GateKind, LogicSimulator, LogicState, Position,
    SimulatorId,
};

// ============================================================================
// Circuit Builders
// ============================================================================

/// Rows of XOR gates, each fed by the two gates above it, over a row of
/// alternating constants. Every row ends in a junction.
fn build_lattice(sim: &LogicSimulator, gates: usize) -> Vec<SimulatorId> {
    const WIDTH: usize = 64;
    let guard = sim.pause();
    let mut ids = Vec::with_capacity(gates);
    for i in 0..gates {
        let kind = if i < WIDTH {
            if i % 2 == 0 {
                GateKind::ConstantOn
            } else {
                GateKind::ConstantOff
            }
        } else if i % WIDTH == WIDTH - 1 {
            GateKind::Junction
        } else {
            GateKind::Xor
        };
        let id = sim.add_gate(&guard, kind).unwrap();
        if i >= WIDTH {
            let above = ids[i - WIDTH];
            let diagonal = ids[i - WIDTH + 1 - (i % WIDTH == WIDTH - 1) as usize];
            sim.connect(&guard, above, 0, id, 0).unwrap();
            sim.connect(&guard, diagonal, 0, id, 0).unwrap();
        }
        ids.push(id);
    }
    ids
}

/// A chain of `length` junctions behind one constant.
fn build_junction_chain(sim: &LogicSimulator, length: usize) -> SimulatorId {
    let guard = sim.pause();
    let mut previous = sim.add_gate(&guard, GateKind::ConstantOn).unwrap();
    for _ in 0..length {
        let next = sim.add_gate(&guard, GateKind::Junction).unwrap();
        sim.connect(&guard, previous, 0, next, 0).unwrap();
        previous = next;
    }
    previous
}

fn inverter_row(width: i32) -> Difference {
    let mut diff = Difference::new();
    for x in 0..width {
        diff = diff
            .place((x, 0), BlockKind::Switch)
            .place((x, 1), BlockKind::Nor)
            .place((x, 2), BlockKind::Light)
            .connect((x, 0), (x, 1), 0)
            .connect((x, 1), (x, 2), 0);
    }
    diff
}

// ============================================================================
// Tick Benchmarks
// ============================================================================

fn bench_tick_lattice(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_lattice");

    for gates in [256, 4096, 65536].iter() {
        group.throughput(Throughput::Elements(*gates as u64));
        group.bench_with_input(BenchmarkId::new("gates", gates), gates, |b, &gates| {
            let sim = LogicSimulator::new();
            build_lattice(&sim, gates);
            let guard = sim.pause();
            b.iter(|| {
                sim.run_ticks(&guard, 1);
            });
        });
    }

    group.finish();
}

fn bench_junction_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("junction_chain");

    for length in [16, 256, 4096].iter() {
        group.throughput(Throughput::Elements(*length as u64));
        group.bench_with_input(BenchmarkId::new("length", length), length, |b, &length| {
            let sim = LogicSimulator::new();
            let end = build_junction_chain(&sim, length);
            let guard = sim.pause();
            b.iter(|| {
                sim.run_ticks(&guard, 1);
                black_box(sim.get_state(end).unwrap());
            });
        });
    }

    group.finish();
}

// ============================================================================
// Editing Benchmarks
// ============================================================================

fn bench_make_edit(c: &mut Criterion) {
    let mut group = c.benchmark_group("make_edit");

    for width in [8, 64, 512].iter() {
        let diff = inverter_row(*width);
        group.throughput(Throughput::Elements(diff.len() as u64));
        group.bench_with_input(BenchmarkId::new("blocks", width * 3), &diff, |b, diff| {
            b.iter(|| {
                let mut evaluator = Evaluator::new();
                black_box(evaluator.make_edit(diff, 0).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_remove_and_compact(c: &mut Criterion) {
    let mut group = c.benchmark_group("remove_and_compact");

    for width in [64, 512].iter() {
        let build = inverter_row(*width);
        let mut removal = Difference::new();
        for x in (0..*width).step_by(2) {
            removal = removal.remove((x, 1));
        }
        group.bench_with_input(BenchmarkId::new("blocks", width * 3), width, |b, _| {
            b.iter_batched(
                || {
                    let mut evaluator = Evaluator::new();
                    evaluator.make_edit(&build, 0).unwrap();
                    evaluator
                },
                |mut evaluator| black_box(evaluator.make_edit(&removal, 0).unwrap()),
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

// ============================================================================
// State Access Benchmarks
// ============================================================================

fn bench_bulk_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_reads");

    for width in [64, 512].iter() {
        let mut evaluator = Evaluator::new();
        evaluator.make_edit(&inverter_row(*width), 0).unwrap();
        let lights: Vec<Address> = (0..*width)
            .map(|x| Address::of(Position::new(x, 2)))
            .collect();
        evaluator
            .set_state(&Address::of(Position::new(0, 0)), LogicState::High)
            .unwrap();

        group.throughput(Throughput::Elements(*width as u64));
        group.bench_with_input(BenchmarkId::new("addresses", width), &lights, |b, lights| {
            b.iter(|| black_box(evaluator.get_states(lights)));
        });
    }

    group.finish();
}

// ============================================================================
// Criterion Groups
// ============================================================================

criterion_group!(
    benches,
    bench_tick_lattice,
    bench_junction_chain,
    bench_make_edit,
    bench_remove_and_compact,
    bench_bulk_reads,
);

criterion_main!(benches);
