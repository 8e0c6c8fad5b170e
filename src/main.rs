use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::info;

use par_louvain::config::ClusteringConfig;
use par_louvain::graph::CsrGraph;
use par_louvain::logger::init_logger;
use par_louvain::output::write_communities;
use par_louvain::phases::run_phases;
use par_louvain::util::Timer;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GraphFormat {
    /// Metis adjacency format, `NV NE [fmt]` header and 1-based lists.
    Metis,
    /// One `u v [w]` line per undirected edge, 0-based ids.
    EdgeList,
}

#[derive(Parser, Debug)]
#[command(name = "par-louvain", about = "Multi-phase parallel modularity clustering")]
struct Cli {
    /// Input graph file.
    input: PathBuf,

    #[arg(short, long, value_enum, default_value = "metis")]
    format: GraphFormat,

    /// Enable the coloring-batched optimizer on large graphs.
    #[arg(short, long)]
    coloring: bool,

    /// Collapse isolated and degree-one vertices before phase one.
    #[arg(short, long)]
    vertex_following: bool,

    /// Write the final assignment here, one community id per line.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Modularity gain threshold of the serial optimizer.
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Looser threshold used while coloring is active.
    #[arg(short = 'd', long)]
    c_threshold: Option<f64>,

    /// Smallest graph the coloring stage is still worth running on.
    #[arg(short = 'm', long)]
    min_graph_size: Option<usize>,

    /// Worker thread count, defaults to all cores.
    #[arg(long)]
    threads: Option<usize>,

    /// Optional YAML file with the clustering parameters; command-line
    /// flags override it.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_logger();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ClusteringConfig::from_yaml_file(path)?,
        None => ClusteringConfig::default(),
    };
    if cli.coloring {
        config.coloring = true;
    }
    if cli.vertex_following {
        config.vertex_following = true;
    }
    if let Some(threshold) = cli.threshold {
        config.threshold = threshold;
    }
    if let Some(c_threshold) = cli.c_threshold {
        config.c_threshold = c_threshold;
    }
    if let Some(min_graph_size) = cli.min_graph_size {
        config.min_graph_size = min_graph_size;
    }
    if let Some(threads) = cli.threads {
        config.threads = threads;
    }
    config.validate()?;

    info!("input file       : {}", cli.input.display());
    info!("file format      : {:?}", cli.format);
    info!("coloring         : {}", config.coloring);
    info!("vertex following : {}", config.vertex_following);
    info!("threshold        : {}", config.threshold);
    info!("c-threshold      : {}", config.c_threshold);
    info!("min graph size   : {}", config.min_graph_size);
    info!("threads          : {}", config.threads);

    let timer = Timer::start();
    let graph = match cli.format {
        GraphFormat::Metis => CsrGraph::load_metis(&cli.input)?,
        GraphFormat::EdgeList => CsrGraph::load_edge_list(&cli.input)?,
    };
    info!(
        "loaded {} vertices and {} edges in {:.3}s",
        graph.vertex_count,
        graph.edge_count,
        timer.elapsed_secs()
    );
    graph.display_characteristics();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build()?;
    let timer = Timer::start();
    let result = pool.install(|| run_phases(graph, &config))?;
    info!(
        "clustering finished: modularity {:.6} after {} phases and {} iterations in {:.3}s",
        result.modularity,
        result.phases,
        result.iterations,
        timer.elapsed_secs()
    );

    if let Some(path) = &cli.output {
        write_communities(path, &result.communities)?;
        info!("wrote {} assignments to {}", result.communities.len(), path.display());
    }
    Ok(())
}
