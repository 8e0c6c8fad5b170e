use fixedbitset::FixedBitSet;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::graph::{CsrGraph, VInt};

/// A proper distance-1 coloring: no two adjacent vertices share a color.
pub struct Coloring {
    pub colors: Vec<i32>,
    pub num_colors: usize,
}

impl Coloring {
    /// Group vertices by color. Vertices inside one class are pairwise
    /// non-adjacent, so the optimizer may move them concurrently.
    pub fn classes(&self) -> Vec<Vec<VInt>> {
        let mut classes = vec![Vec::new(); self.num_colors];
        for (v, &color) in self.colors.iter().enumerate() {
            if color >= 0 {
                classes[color as usize].push(v as VInt);
            }
        }
        classes
    }
}

/// Speculate-and-resolve coloring. Every round colors the whole work queue
/// against the previous round's colors, then detects conflicting edges and
/// re-queues the lower-priority endpoint of each. The loop runs until no
/// conflicts remain.
pub fn color_graph(graph: &CsrGraph, seed: u64) -> Coloring {
    let mut rng = StdRng::seed_from_u64(seed);
    let tie_breaks: Vec<f64> = (0..graph.vertex_count).map(|_| rng.gen::<f64>()).collect();
    color_with_tie_breaks(graph, &tie_breaks)
}

/// Coloring against caller-provided tie-break values, one per vertex in
/// [0, 1). Equal values fall back to the vertex id.
pub fn color_with_tie_breaks(graph: &CsrGraph, tie_breaks: &[f64]) -> Coloring {
    let nv = graph.vertex_count;
    debug_assert_eq!(tie_breaks.len(), nv);
    let mut colors = vec![-1i32; nv];
    let mut queue: Vec<VInt> = (0..nv as VInt).collect();

    while !queue.is_empty() {
        // Speculation step: propose colors reading only the colors left by
        // the previous round.
        let proposals: Vec<i32> = queue
            .par_iter()
            .map(|&v| smallest_free_color(graph, &colors, v as usize))
            .collect();
        for (&v, &color) in queue.iter().zip(proposals.iter()) {
            colors[v as usize] = color;
        }

        // Conflict step: on every monochromatic edge the endpoint with the
        // lower tie-break value (lower id on equality) backs off.
        let requeue: Vec<VInt> = queue
            .par_iter()
            .copied()
            .filter(|&v| loses_conflict(graph, &colors, tie_breaks, v as usize))
            .collect();
        for &v in &requeue {
            colors[v as usize] = -1;
        }
        queue = requeue;
    }

    let num_colors = colors.iter().copied().max().map_or(0, |c| c as usize + 1);
    Coloring { colors, num_colors }
}

/// Smallest non-negative color unused by any already-colored neighbor.
/// A vertex with d neighbors always finds a free color in [0, d], so the
/// mark buffer is sized by the vertex's own degree, not a global cap.
fn smallest_free_color(graph: &CsrGraph, colors: &[i32], v: usize) -> i32 {
    let degree = graph.degree(v);
    let mut used = FixedBitSet::with_capacity(degree + 1);
    for e in graph.neighbors(v) {
        if e.tail as usize == v {
            continue;
        }
        let color = colors[e.tail as usize];
        if color >= 0 && (color as usize) <= degree {
            used.insert(color as usize);
        }
    }
    for candidate in 0..=degree {
        if !used.contains(candidate) {
            return candidate as i32;
        }
    }
    degree as i32
}

fn loses_conflict(graph: &CsrGraph, colors: &[i32], tie_breaks: &[f64], v: usize) -> bool {
    let color = colors[v];
    graph.neighbors(v).iter().any(|e| {
        let w = e.tail as usize;
        w != v
            && colors[w] == color
            && (tie_breaks[v] < tie_breaks[w] || (tie_breaks[v] == tie_breaks[w] && v < w))
    })
}

/// Post-condition of the engine: every non-self edge joins two different
/// colors and every vertex is colored.
pub fn verify_coloring(graph: &CsrGraph, colors: &[i32]) -> bool {
    (0..graph.vertex_count).into_par_iter().all(|v| {
        colors[v] >= 0
            && graph
                .neighbors(v)
                .iter()
                .all(|e| e.tail as usize == v || colors[e.tail as usize] != colors[v])
    })
}
