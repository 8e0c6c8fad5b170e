use anyhow::Result;
use itertools::Itertools;
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::coarsen::coarsen;
use crate::coloring::color_graph;
use crate::comm_table::renumber_communities;
use crate::config::ClusteringConfig;
use crate::graph::CsrGraph;
use crate::louvain::{louvain_colored, louvain_serial, NO_COMMUNITY};
use crate::util::Timer;

/// Hard caps bounding the runtime regardless of convergence.
pub const MAX_PHASES: usize = 200;
pub const MAX_TOTAL_ITERATIONS: usize = 10_000;

const COLORING_SEED: u64 = 0x1777;

pub struct ClusteringResult {
    /// Community id per original vertex, -1 for isolated vertices.
    pub communities: Vec<i64>,
    pub modularity: f64,
    pub phases: usize,
    pub iterations: usize,
}

/// Pre-pass over the input graph: isolated vertices leave the clustering
/// entirely and degree-one vertices adopt their single neighbor, as long
/// as that neighbor has other edges or a smaller id. Returns the
/// assignment and the number of vertices it fixed.
pub fn vertex_following(graph: &CsrGraph) -> (Vec<i64>, usize) {
    let nv = graph.vertex_count;
    let c: Vec<i64> = (0..nv)
        .into_par_iter()
        .map(|i| {
            let adjacency = graph.neighbors(i);
            match adjacency.len() {
                0 => NO_COMMUNITY,
                1 => {
                    let tail = adjacency[0].tail as usize;
                    if tail != i && (graph.degree(tail) > 1 || i > tail) {
                        tail as i64
                    } else {
                        i as i64
                    }
                }
                _ => i as i64,
            }
        })
        .collect();
    let fixed = c
        .par_iter()
        .enumerate()
        .filter(|(i, &community)| community != *i as i64)
        .count();
    (c, fixed)
}

/// Multi-phase driver: optional coloring, one optimizer run, contiguous
/// renumbering, composition into the original-vertex mapping and a
/// coarsening step, repeated until the modularity gain between phases
/// drops under the threshold. When coloring was in use, one more pass with
/// the serial variant at full precision runs before termination.
pub fn run_phases(graph: CsrGraph, config: &ClusteringConfig) -> Result<ClusteringResult> {
    let original_count = graph.vertex_count;
    let mut c_orig = vec![NO_COMMUNITY; original_count];
    let mut seeded = false;
    let mut g = graph;

    if config.vertex_following {
        let (mut c, fixed) = vertex_following(&g);
        if fixed > 0 {
            let clusters = renumber_communities(&mut c)?;
            info!(
                "vertex following fixed {} vertices, {} remain",
                fixed, clusters
            );
            let next = coarsen(&g, &c, clusters)?;
            c_orig.copy_from_slice(&c);
            seeded = true;
            g = next;
        }
    }

    let mut prev_mod = -1.0;
    let mut final_mod = 0.0;
    let mut total_iterations = 0usize;
    let mut phase = 0usize;
    let mut coloring_active = config.coloring;

    loop {
        if phase >= MAX_PHASES {
            warn!("stopping after the {} phase cap", MAX_PHASES);
            break;
        }
        if total_iterations >= MAX_TOTAL_ITERATIONS {
            warn!(
                "stopping after the {} cumulative iteration cap",
                MAX_TOTAL_ITERATIONS
            );
            break;
        }
        phase += 1;
        let budget = MAX_TOTAL_ITERATIONS - total_iterations;
        let use_coloring = coloring_active && g.vertex_count > config.min_graph_size;

        let timer = Timer::start();
        let result = if use_coloring {
            let coloring = color_graph(&g, COLORING_SEED);
            debug!(
                "phase {}: colored {} vertices with {} colors",
                phase, g.vertex_count, coloring.num_colors
            );
            louvain_colored(&g, &coloring, config.c_threshold, budget)?
        } else {
            louvain_serial(&g, config.threshold, budget)?
        };
        total_iterations += result.iterations;
        final_mod = result.modularity;

        let mut c = result.communities;
        let clusters = renumber_communities(&mut c)?;
        info!(
            "phase {}: modularity {:.6}, {} communities, {} iterations, {:.3}s",
            phase,
            result.modularity,
            clusters,
            result.iterations,
            timer.elapsed_secs()
        );

        // Compose the phase assignment onto the original vertices.
        if !seeded {
            c_orig.copy_from_slice(&c);
            seeded = true;
        } else {
            for slot in c_orig.iter_mut() {
                if *slot >= 0 {
                    *slot = c[*slot as usize];
                }
            }
        }

        if clusters == 0 {
            break;
        }
        let gate = if use_coloring {
            config.c_threshold
        } else {
            config.threshold
        };
        if result.modularity - prev_mod > gate && clusters > 1 {
            g = coarsen(&g, &c, clusters)?;
            prev_mod = result.modularity;
        } else if use_coloring {
            // The colored passes converged; give the serial variant one
            // run at full precision before stopping.
            coloring_active = false;
        } else {
            break;
        }
    }

    let sizes = c_orig.iter().filter(|&&x| x >= 0).counts();
    info!(
        "final: modularity {:.6}, {} communities, largest holds {} vertices",
        final_mod,
        sizes.len(),
        sizes.values().max().copied().unwrap_or(0)
    );

    Ok(ClusteringResult {
        communities: c_orig,
        modularity: final_mod,
        phases: phase,
        iterations: total_iterations,
    })
}
