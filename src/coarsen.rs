use anyhow::{ensure, Result};
use rayon::prelude::*;

use crate::comm_table::LocalMap;
use crate::graph::{CsrGraph, Edge, VInt};

/// Collapse every community into one vertex of the next-level graph.
/// Expects `c` renumbered to the contiguous range [0, num_clusters);
/// vertices assigned -1 are left out of the new graph entirely.
///
/// Two passes over the input edges: the first counts, per new vertex, the
/// edges it will aggregate so that its local map can be allocated exactly;
/// the second fills the maps. Edges are only aggregated in the canonical
/// direction (larger community first) and mirrored back during
/// materialization, so each undirected inter-community edge is counted
/// once, and intra-community edges land on the self-loop entry from both
/// directions, making the self-loop weight twice the internal edge weight.
pub fn coarsen(graph: &CsrGraph, c: &[i64], num_clusters: usize) -> Result<CsrGraph> {
    let nv = graph.vertex_count;
    ensure!(c.len() == nv, "community array length does not match the graph");
    ensure!(
        c.par_iter().all(|&x| x >= -1 && x < num_clusters as i64),
        "community id outside [-1, {}): the assignment was not renumbered",
        num_clusters
    );

    // Sizing pass, merged from per-thread partial counts.
    let slots: Vec<usize> = (0..nv)
        .into_par_iter()
        .fold(
            || vec![0usize; num_clusters],
            |mut acc, i| {
                let cu = c[i];
                if cu < 0 {
                    return acc;
                }
                for e in graph.neighbors(i) {
                    let ct = c[e.tail as usize];
                    if cu > ct || (cu == ct && i <= e.tail as usize) {
                        acc[cu as usize] += 1;
                    }
                }
                acc
            },
        )
        .reduce(
            || vec![0usize; num_clusters],
            |mut left, right| {
                for (l, r) in left.iter_mut().zip(right.iter()) {
                    *l += r;
                }
                left
            },
        );

    // Fill pass. Every map gets one extra slot holding its own self-loop
    // entry, pre-seeded with weight 0.
    let mut maps: Vec<LocalMap> = Vec::with_capacity(num_clusters);
    for (u, &count) in slots.iter().enumerate() {
        let mut map = LocalMap::with_capacity(count + 1);
        map.accumulate(u as i64, 0.0)?;
        maps.push(map);
    }
    for i in 0..nv {
        let cu = c[i];
        if cu < 0 {
            continue;
        }
        for e in graph.neighbors(i) {
            let ct = c[e.tail as usize];
            if cu >= ct {
                maps[cu as usize].accumulate(ct, e.weight)?;
            }
        }
    }

    // Offsets pass. Each cross-community entry contributes an edge slot to
    // both endpoints, each self-loop entry exactly one.
    let mut incidence = vec![0usize; num_clusters];
    let mut ne_out = 0usize;
    let mut ne_self = 0usize;
    for (u, map) in maps.iter().enumerate() {
        for (community, _) in map.iter() {
            if community == u as i64 {
                ne_self += 1;
                incidence[u] += 1;
            } else {
                ne_out += 1;
                incidence[u] += 1;
                incidence[community as usize] += 1;
            }
        }
    }
    let mut offsets = vec![0usize; num_clusters + 1];
    for u in 0..num_clusters {
        offsets[u + 1] = offsets[u] + incidence[u];
    }
    ensure!(
        ne_self == num_clusters,
        "every coarse vertex must carry exactly one self-loop entry, found {}",
        ne_self
    );
    ensure!(
        offsets[num_clusters] == 2 * ne_out + ne_self,
        "coarsened edge slots {} do not match 2 * {} + {}",
        offsets[num_clusters],
        ne_out,
        ne_self
    );

    // Materialization pass: one edge per map entry plus its mirror, placed
    // through per-vertex write cursors.
    let mut cursor: Vec<usize> = offsets[..num_clusters].to_vec();
    let mut edges = vec![
        Edge {
            head: 0,
            tail: 0,
            weight: 0.0
        };
        offsets[num_clusters]
    ];
    for (u, map) in maps.iter().enumerate() {
        for (community, weight) in map.iter() {
            edges[cursor[u]] = Edge {
                head: u as VInt,
                tail: community as VInt,
                weight,
            };
            cursor[u] += 1;
            if community != u as i64 {
                edges[cursor[community as usize]] = Edge {
                    head: community as VInt,
                    tail: u as VInt,
                    weight,
                };
                cursor[community as usize] += 1;
            }
        }
    }

    Ok(CsrGraph {
        vertex_count: num_clusters,
        edge_count: ne_out + ne_self,
        offsets,
        edges,
    })
}

#[cfg(test)]
mod test_coarsen {
    use super::*;
    use crate::graph::VInt;

    fn ring(n: usize) -> CsrGraph {
        let list: Vec<(VInt, VInt, f64)> = (0..n)
            .map(|i| (i as VInt, ((i + 1) % n) as VInt, 1.0))
            .collect();
        CsrGraph::from_edge_list(n, &list).unwrap()
    }

    #[test]
    fn test_single_community_collapse() {
        // Collapsing everything into one community leaves a single vertex
        // whose self-loop weighs twice the total edge weight.
        let g = ring(4);
        let c = vec![0i64, 0, 0, 0];
        let coarse = coarsen(&g, &c, 1).unwrap();
        assert_eq!(coarse.vertex_count, 1);
        assert_eq!(coarse.edges.len(), 1);
        assert_eq!(coarse.edges[0].head, 0);
        assert_eq!(coarse.edges[0].tail, 0);
        assert_eq!(coarse.edges[0].weight, 8.0);
    }

    #[test]
    fn test_ring_pairs() {
        // Adjacent pairs {0, 1} and {2, 3}: one internal edge each, two
        // cut edges between the pairs.
        let g = ring(4);
        let c = vec![0i64, 0, 1, 1];
        let coarse = coarsen(&g, &c, 2).unwrap();
        assert_eq!(coarse.vertex_count, 2);
        coarse.validate().unwrap();
        // Self-loops carry 2x the internal weight.
        let self_weight = |v: usize| {
            coarse
                .neighbors(v)
                .iter()
                .filter(|e| e.tail as usize == v)
                .map(|e| e.weight)
                .sum::<f64>()
        };
        assert_eq!(self_weight(0), 2.0);
        assert_eq!(self_weight(1), 2.0);
        // The two cut edges aggregate into one coarse edge of weight 2 in
        // both directions.
        let cross: Vec<&Edge> = coarse.edges.iter().filter(|e| e.head != e.tail).collect();
        assert_eq!(cross.len(), 2);
        assert!(cross.iter().all(|e| e.weight == 2.0));
        // Total weighted degree is conserved by coarsening.
        assert_eq!(coarse.total_weighted_degree(), g.total_weighted_degree());
    }

    #[test]
    fn test_weight_conservation() {
        // A weighted graph with a self-loop, split 3 + 2.
        let list: Vec<(VInt, VInt, f64)> = vec![
            (0, 1, 1.5),
            (1, 2, 2.0),
            (0, 2, 0.5),
            (2, 3, 1.0),
            (3, 4, 4.0),
            (4, 4, 3.0),
        ];
        let g = CsrGraph::from_edge_list(5, &list).unwrap();
        let c = vec![0i64, 0, 0, 1, 1];
        let coarse = coarsen(&g, &c, 2).unwrap();
        coarse.validate().unwrap();
        assert_eq!(coarse.vertex_count, 2);
        assert_eq!(coarse.total_weighted_degree(), g.total_weighted_degree());
        // Internal weight of {0, 1, 2} is 4.0, of {3, 4} is 4.0 plus the
        // self-loop stored once.
        let self_edge = |v: usize| {
            coarse
                .neighbors(v)
                .iter()
                .find(|e| e.tail as usize == v)
                .unwrap()
                .weight
        };
        assert_eq!(self_edge(0), 8.0);
        assert_eq!(self_edge(1), 11.0);
        let cross = coarse.neighbors(0).iter().find(|e| e.tail == 1).unwrap();
        assert_eq!(cross.weight, 1.0);
    }

    #[test]
    fn test_isolated_vertices_excluded() {
        // Vertex 3 is isolated and assigned -1; the coarse graph must not
        // contain it.
        let g = CsrGraph::from_edge_list(4, &[(0, 1, 1.0), (1, 2, 1.0)]).unwrap();
        let c = vec![0i64, 0, 0, -1];
        let coarse = coarsen(&g, &c, 1).unwrap();
        assert_eq!(coarse.vertex_count, 1);
        assert_eq!(coarse.edges[0].weight, 4.0);
    }

    #[test]
    fn test_rejects_unrenumbered_assignment() {
        let g = ring(4);
        let c = vec![0i64, 0, 5, 5];
        assert!(coarsen(&g, &c, 2).is_err());
    }

    #[test]
    fn test_zero_weight_self_loops_seeded() {
        // Two singleton communities joined by one edge: both coarse
        // vertices still carry a zero-weight self-loop entry.
        let g = CsrGraph::from_edge_list(2, &[(0, 1, 1.0)]).unwrap();
        let c = vec![0i64, 1];
        let coarse = coarsen(&g, &c, 2).unwrap();
        assert_eq!(coarse.vertex_count, 2);
        assert_eq!(coarse.edges.len(), 4);
        for v in 0..2 {
            let self_edge = coarse
                .neighbors(v)
                .iter()
                .find(|e| e.tail as usize == v)
                .unwrap();
            assert_eq!(self_edge.weight, 0.0);
        }
        assert_eq!(coarse.total_weighted_degree(), 2.0);
    }
}
