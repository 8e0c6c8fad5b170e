use std::fs::File;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

#[allow(dead_code)]
pub(crate) const READ_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Parameters consumed by the clustering core. Everything else (file paths,
/// formats, output switches) belongs to the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Partition vertices into conflict-free batches before each phase.
    pub coloring: bool,
    /// Collapse isolated and degree-one vertices before the first phase.
    pub vertex_following: bool,
    /// Coloring is skipped once the graph shrinks to this many vertices.
    pub min_graph_size: usize,
    /// Modularity gain below which the optimizer stops.
    pub threshold: f64,
    /// Looser threshold used while coloring is active.
    pub c_threshold: f64,
    /// Worker thread count for the rayon pool.
    pub threads: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        ClusteringConfig {
            coloring: false,
            vertex_following: false,
            min_graph_size: 100_000,
            threshold: 1e-6,
            c_threshold: 1e-2,
            threads: num_cpus::get(),
        }
    }
}

impl ClusteringConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<ClusteringConfig> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("cannot open config file {}", path.display()))?;
        let config: ClusteringConfig = serde_yaml::from_reader(file)
            .with_context(|| format!("cannot parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.threshold > 0.0, "threshold must be positive");
        ensure!(self.c_threshold > 0.0, "c_threshold must be positive");
        ensure!(self.threads >= 1, "thread count must be at least 1");
        Ok(())
    }
}
