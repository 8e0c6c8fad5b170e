use criterion::{black_box, criterion_group, criterion_main, Criterion};

use par_louvain::coloring::color_graph;
use par_louvain::graph::{CsrGraph, VInt};
use par_louvain::louvain::{louvain_colored, louvain_serial};

/// Circulant graph: vertex i joins i + 1 and i + 2 around the ring, which
/// gives a regular graph with a clear community structure at every scale.
fn circulant(n: usize) -> CsrGraph {
    let mut list = Vec::with_capacity(2 * n);
    for i in 0..n {
        list.push((i as VInt, ((i + 1) % n) as VInt, 1.0));
        list.push((i as VInt, ((i + 2) % n) as VInt, 1.0));
    }
    CsrGraph::from_edge_list(n, &list).unwrap()
}

fn bench_coloring(c: &mut Criterion) {
    let graph = circulant(10_000);
    c.bench_function("color_circulant_10k", |b| {
        b.iter(|| color_graph(black_box(&graph), 7))
    });
}

fn bench_optimizer(c: &mut Criterion) {
    let graph = circulant(2_000);
    c.bench_function("louvain_serial_circulant_2k", |b| {
        b.iter(|| louvain_serial(black_box(&graph), 1e-6, 1_000).unwrap())
    });
    let coloring = color_graph(&graph, 7);
    c.bench_function("louvain_colored_circulant_2k", |b| {
        b.iter(|| louvain_colored(black_box(&graph), &coloring, 1e-2, 1_000).unwrap())
    });
}

criterion_group!(benches, bench_coloring, bench_optimizer);
criterion_main!(benches);
