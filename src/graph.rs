use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use log::info;
use rayon::prelude::*;

use crate::config::READ_BUFFER_SIZE;

#[allow(dead_code)]
pub type VInt = u32;

/// One stored half of an undirected edge. Every edge between two distinct
/// vertices appears twice, once from each endpoint; a self-loop is stored once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub head: VInt,
    pub tail: VInt,
    pub weight: f64,
}

/// Compact adjacency structure, read-only for the duration of one
/// clustering phase. The neighbor range of vertex v is
/// `edges[offsets[v]..offsets[v + 1]]`.
pub struct CsrGraph {
    pub vertex_count: usize,
    pub edge_count: usize, // Each undirected edge counted once.
    pub offsets: Vec<usize>,
    pub edges: Vec<Edge>,
}

impl CsrGraph {
    /// Build the adjacency structure from an undirected edge list in which
    /// every edge appears exactly once. Mirrors are stored here.
    pub fn from_edge_list(vertex_count: usize, list: &[(VInt, VInt, f64)]) -> Result<CsrGraph> {
        let mut counts = vec![0usize; vertex_count];
        for &(u, v, w) in list {
            ensure!(
                (u as usize) < vertex_count && (v as usize) < vertex_count,
                "edge ({}, {}) references a vertex outside [0, {})",
                u,
                v,
                vertex_count
            );
            ensure!(w >= 0.0, "edge ({}, {}) has negative weight {}", u, v, w);
            counts[u as usize] += 1;
            if u != v {
                counts[v as usize] += 1;
            }
        }

        let mut offsets = vec![0usize; vertex_count + 1];
        for i in 0..vertex_count {
            offsets[i + 1] = offsets[i] + counts[i];
        }

        let mut cursor: Vec<usize> = offsets[..vertex_count].to_vec();
        let mut edges = vec![
            Edge {
                head: 0,
                tail: 0,
                weight: 0.0
            };
            offsets[vertex_count]
        ];
        for &(u, v, w) in list {
            edges[cursor[u as usize]] = Edge {
                head: u,
                tail: v,
                weight: w,
            };
            cursor[u as usize] += 1;
            if u != v {
                edges[cursor[v as usize]] = Edge {
                    head: v,
                    tail: u,
                    weight: w,
                };
                cursor[v as usize] += 1;
            }
        }

        Ok(CsrGraph {
            vertex_count,
            edge_count: list.len(),
            offsets,
            edges,
        })
    }

    #[inline]
    pub fn neighbors(&self, v: usize) -> &[Edge] {
        &self.edges[self.offsets[v]..self.offsets[v + 1]]
    }

    #[inline]
    pub fn degree(&self, v: usize) -> usize {
        self.offsets[v + 1] - self.offsets[v]
    }

    /// Sum of edge weights over the neighbor range, self-loop weight
    /// counted once.
    #[inline]
    pub fn weighted_degree(&self, v: usize) -> f64 {
        self.neighbors(v).iter().map(|e| e.weight).sum()
    }

    /// Total weighted degree of the graph, i.e. twice the total edge weight
    /// for a graph without self-loops.
    pub fn total_weighted_degree(&self) -> f64 {
        self.edges.par_iter().map(|e| e.weight).sum()
    }

    /// Structural check used by tests: offsets are a monotone cover of the
    /// edge array and every non-self edge has its mirror.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.offsets.len() == self.vertex_count + 1, "offsets length mismatch");
        ensure!(self.offsets[0] == 0, "offsets must start at 0");
        for v in 0..self.vertex_count {
            ensure!(self.offsets[v] <= self.offsets[v + 1], "offsets must be non-decreasing");
        }
        ensure!(
            self.offsets[self.vertex_count] == self.edges.len(),
            "offsets do not cover the edge array"
        );
        for v in 0..self.vertex_count {
            for e in self.neighbors(v) {
                ensure!(e.head as usize == v, "edge head does not match its range");
                ensure!((e.tail as usize) < self.vertex_count, "edge tail out of range");
                if e.head != e.tail {
                    let mirrored = self
                        .neighbors(e.tail as usize)
                        .iter()
                        .any(|m| m.tail == e.head && m.weight == e.weight);
                    ensure!(mirrored, "edge ({}, {}) has no mirror", e.head, e.tail);
                }
            }
        }
        Ok(())
    }

    /// Load a graph in the Metis adjacency format: a `NV NE [fmt]` header,
    /// '%' comment lines, then one line of 1-based neighbor ids per vertex,
    /// with interleaved weights when fmt is 1.
    pub fn load_metis(path: impl AsRef<Path>) -> Result<CsrGraph> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("cannot open graph file {}", path.display()))?;
        let reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
        let mut lines = reader.lines();

        let header = loop {
            match lines.next() {
                None => bail!("metis file {} is empty", path.display()),
                Some(line) => {
                    let line = line?;
                    let trimmed = line.trim().to_string();
                    if trimmed.is_empty() || trimmed.starts_with('%') {
                        continue;
                    }
                    break trimmed;
                }
            }
        };
        let tokens: Vec<&str> = header.split_whitespace().collect();
        ensure!(tokens.len() >= 2, "metis header must contain vertex and edge counts");
        let vertex_count: usize = tokens[0].parse().context("bad vertex count in header")?;
        let edge_count: usize = tokens[1].parse().context("bad edge count in header")?;
        let fmt: u32 = if tokens.len() > 2 {
            tokens[2].parse().context("bad format code in header")?
        } else {
            0
        };
        ensure!(fmt == 0 || fmt == 1, "unsupported metis format code {}", fmt);
        let weighted = fmt == 1;

        let mut offsets = Vec::with_capacity(vertex_count + 1);
        offsets.push(0usize);
        let mut edges: Vec<Edge> = Vec::with_capacity(2 * edge_count);
        let mut head: usize = 0;
        for line in lines {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.starts_with('%') {
                continue;
            }
            if head >= vertex_count {
                // Trailing blank lines are tolerated, extra data is not.
                ensure!(trimmed.is_empty(), "more vertex lines than the header declared");
                continue;
            }
            let mut it = trimmed.split_whitespace();
            while let Some(token) = it.next() {
                let neighbor: usize = token
                    .parse()
                    .with_context(|| format!("bad neighbor id on line of vertex {}", head))?;
                ensure!(
                    neighbor >= 1 && neighbor <= vertex_count,
                    "neighbor id {} out of range on line of vertex {}",
                    neighbor,
                    head
                );
                let weight = if weighted {
                    it.next()
                        .with_context(|| format!("missing edge weight for vertex {}", head))?
                        .parse::<f64>()
                        .context("bad edge weight")?
                } else {
                    1.0
                };
                edges.push(Edge {
                    head: head as VInt,
                    tail: (neighbor - 1) as VInt,
                    weight,
                });
            }
            offsets.push(edges.len());
            head += 1;
        }
        ensure!(
            head == vertex_count,
            "expected {} vertex lines, found {}",
            vertex_count,
            head
        );
        ensure!(
            edges.len() == 2 * edge_count,
            "adjacency lists hold {} entries, the header promised {}",
            edges.len(),
            2 * edge_count
        );

        Ok(CsrGraph {
            vertex_count,
            edge_count,
            offsets,
            edges,
        })
    }

    /// Load a graph from a plain edge list, one `u v [w]` line per
    /// undirected edge, 0-based ids, '#' or '%' comment lines.
    pub fn load_edge_list(path: impl AsRef<Path>) -> Result<CsrGraph> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("cannot open graph file {}", path.display()))?;
        let reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

        let mut list: Vec<(VInt, VInt, f64)> = Vec::new();
        let mut max_id: u64 = 0;
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('%') {
                continue;
            }
            let tokens: Vec<&str> = trimmed.split_whitespace().collect();
            ensure!(tokens.len() >= 2, "line {}: expected `u v [w]`", number + 1);
            let u: VInt = tokens[0].parse().with_context(|| format!("line {}", number + 1))?;
            let v: VInt = tokens[1].parse().with_context(|| format!("line {}", number + 1))?;
            let w: f64 = if tokens.len() > 2 {
                tokens[2].parse().with_context(|| format!("line {}", number + 1))?
            } else {
                1.0
            };
            max_id = max_id.max(u as u64).max(v as u64);
            list.push((u, v, w));
        }
        let vertex_count = if list.is_empty() { 0 } else { max_id as usize + 1 };
        CsrGraph::from_edge_list(vertex_count, &list)
    }

    /// Log the descriptive statistics of the graph.
    pub fn display_characteristics(&self) {
        let nv = self.vertex_count;
        if nv == 0 {
            info!("graph is empty");
            return;
        }
        let mut sum = 0usize;
        let mut sum_sq = 0usize;
        let mut max_degree = 0usize;
        let mut isolated = 0usize;
        let mut degree_one = 0usize;
        for v in 0..nv {
            let degree = self.degree(v);
            sum += degree;
            sum_sq += degree * degree;
            max_degree = max_degree.max(degree);
            match degree {
                0 => isolated += 1,
                1 => degree_one += 1,
                _ => {}
            }
        }
        let average = sum as f64 / nv as f64;
        let variance = sum_sq as f64 / nv as f64 - average * average;
        info!("number of vertices   : {}", nv);
        info!("number of edges      : {}", self.edge_count);
        info!("maximum degree       : {}", max_degree);
        info!("average degree       : {:.4}", average);
        info!("degree variance      : {:.4}", variance);
        info!("standard deviation   : {:.4}", variance.max(0.0).sqrt());
        info!(
            "isolated vertices    : {} ({:.2}%)",
            isolated,
            isolated as f64 / nv as f64 * 100.0
        );
        info!(
            "degree-one vertices  : {} ({:.2}%)",
            degree_one,
            degree_one as f64 / nv as f64 * 100.0
        );
        info!(
            "density              : {:.6}%",
            self.edge_count as f64 / (nv as f64 * nv as f64) * 100.0
        );
    }
}

#[cfg(test)]
mod test_graph {
    use std::io::Write;

    use super::*;

    fn ring(n: usize) -> CsrGraph {
        let list: Vec<(VInt, VInt, f64)> = (0..n)
            .map(|i| (i as VInt, ((i + 1) % n) as VInt, 1.0))
            .collect();
        CsrGraph::from_edge_list(n, &list).unwrap()
    }

    #[test]
    fn test_from_edge_list() {
        let g = ring(4);
        assert_eq!(g.vertex_count, 4);
        assert_eq!(g.edge_count, 4);
        assert_eq!(g.offsets, vec![0, 2, 4, 6, 8]);
        g.validate().unwrap();
        // Every vertex of the ring sees both ring neighbors.
        let tails: Vec<VInt> = g.neighbors(0).iter().map(|e| e.tail).collect();
        assert!(tails.contains(&1) && tails.contains(&3));
        assert_eq!(g.weighted_degree(2), 2.0);
        assert_eq!(g.total_weighted_degree(), 8.0);
    }

    #[test]
    fn test_self_loop_stored_once() {
        let g = CsrGraph::from_edge_list(2, &[(0, 1, 1.0), (1, 1, 3.0)]).unwrap();
        assert_eq!(g.degree(1), 2);
        assert_eq!(g.weighted_degree(1), 4.0);
        g.validate().unwrap();
    }

    #[test]
    fn test_load_metis() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "% a comment line").unwrap();
        writeln!(file, "4 4").unwrap();
        writeln!(file, "2 4").unwrap();
        writeln!(file, "1 3").unwrap();
        writeln!(file, "2 4").unwrap();
        writeln!(file, "3 1").unwrap();
        let g = CsrGraph::load_metis(file.path()).unwrap();
        assert_eq!(g.vertex_count, 4);
        assert_eq!(g.edge_count, 4);
        g.validate().unwrap();
    }

    #[test]
    fn test_load_metis_isolated_vertex() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "3 1").unwrap();
        writeln!(file, "2").unwrap();
        writeln!(file, "1").unwrap();
        writeln!(file).unwrap();
        let g = CsrGraph::load_metis(file.path()).unwrap();
        assert_eq!(g.vertex_count, 3);
        assert_eq!(g.degree(2), 0);
        g.validate().unwrap();
    }

    #[test]
    fn test_load_edge_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# a comment line").unwrap();
        writeln!(file, "0 1").unwrap();
        writeln!(file, "1 2 2.5").unwrap();
        let g = CsrGraph::load_edge_list(file.path()).unwrap();
        assert_eq!(g.vertex_count, 3);
        assert_eq!(g.edge_count, 2);
        assert_eq!(g.weighted_degree(1), 3.5);
        g.validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_header() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "4").unwrap();
        assert!(CsrGraph::load_metis(file.path()).is_err());
    }
}
