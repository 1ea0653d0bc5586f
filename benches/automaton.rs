//! Criterion benchmarks for the tick engine.
//!
//! Run with:
//!   cargo bench
//!   cargo bench --no-default-features --features serde
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use cellnet::automaton::ExecutionTier;
use cellnet::cell::Cell;
use cellnet::network::SimulationNetwork;
use cellnet::params::SimulationParameters;

/// Layers of `width` nodes joined by excitatory links, driven by oscillators.
fn make_network(width: usize, layers: usize) -> SimulationNetwork {
    let net = SimulationNetwork::new(SimulationParameters::default()).unwrap();
    let mut prev: Vec<_> = (0..width)
        .map(|i| {
            net.add_node(Cell::oscillator(3, 1, (i % 4) as u16))
                .unwrap()
        })
        .collect();

    for _ in 0..layers {
        let layer: Vec<_> = (0..width)
            .map(|_| net.add_node(Cell::node(0.6, 0.5)).unwrap())
            .collect();
        for (k, &to) in layer.iter().enumerate() {
            for offset in [0, 1, width / 2] {
                let from = prev[(k + offset) % width];
                let link = net.add_node(Cell::excitatory_link(0.4)).unwrap();
                net.add_edge(link, from).unwrap();
                net.add_edge(to, link).unwrap();
            }
        }
        prev = layer;
    }
    net
}

/// Benchmark step() with varying network sizes.
fn bench_step_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_size");

    for width in [64, 256, 1024].iter() {
        let net = make_network(*width, 4);
        group.throughput(Throughput::Elements(net.len() as u64));

        for tier in [ExecutionTier::Scalar, ExecutionTier::Parallel] {
            let name = format!("{tier:?}").to_lowercase();
            group.bench_with_input(BenchmarkId::new(name, width), width, |b, _| {
                net.set_execution_tier(tier);
                b.iter(|| black_box(net.step().unwrap().updated));
            });
        }
    }

    group.finish();
}

/// Benchmark a full image write and read.
fn bench_image(c: &mut Criterion) {
    let net = make_network(256, 4);
    let mut bytes = Vec::new();
    net.write_binary(&mut bytes).unwrap();

    let mut group = c.benchmark_group("image");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("write", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(bytes.len());
            net.write_binary(&mut out).unwrap();
            black_box(out.len())
        });
    });
    group.bench_function("read", |b| {
        b.iter(|| {
            let loaded = SimulationNetwork::read_binary(&mut bytes.as_slice()).unwrap();
            black_box(loaded.len())
        });
    });
    group.finish();
}

criterion_group!(benches, bench_step_sizes, bench_image);
criterion_main!(benches);
