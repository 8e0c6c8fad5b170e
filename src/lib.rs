//! Multi-phase modularity clustering over a compact adjacency structure.
//!
//! Each phase runs a Louvain local-move optimizer, either serially safe
//! over full-pass snapshots or batched by a speculative distance-1 vertex
//! coloring, then collapses the resulting communities into the vertices of
//! a smaller graph and repeats until the modularity gain fades.

pub mod coarsen;
pub mod coloring;
pub mod comm_table;
pub mod config;
pub mod graph;
pub mod logger;
pub mod louvain;
pub mod output;
pub mod phases;
pub mod util;

pub use config::ClusteringConfig;
pub use graph::CsrGraph;
pub use phases::{run_phases, ClusteringResult};
