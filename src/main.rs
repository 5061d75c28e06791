use pcontainers::config::RuntimeConfig;
use pcontainers::container::{PVector, TargetMap};
use pcontainers::error::ContainerError;
use pcontainers::graph::{Direction, GraphKind, PGraph, Recorder, Traversal};
use pcontainers::runtime::{Cluster, LocationContext};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;

/// What location 0 reports once the demo has run.
#[derive(Debug, Serialize)]
struct Summary {
    locations: usize,
    vector_size: usize,
    local_sizes: Vec<usize>,
    directory_ranges: usize,
    vertices: usize,
    edges: usize,
    bfs_reached: u64,
    components: u64,
    dfs_time: u64,
    topological_blocked: usize,
}

#[derive(Debug, Clone, Copy)]
struct DemoOptions {
    size: usize,
    vertices_per_location: usize,
    edges: usize,
    seed: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut config = RuntimeConfig::from_env();
    let mut options = DemoOptions {
        size: 100,
        vertices_per_location: 16,
        edges: 96,
        seed: 7,
    };

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--locations", Some(v)) => {
                config = config.with_locations(v.parse()?);
                i += 2;
            }
            ("--size", Some(v)) => {
                options.size = v.parse()?;
                i += 2;
            }
            ("--vertices", Some(v)) => {
                options.vertices_per_location = v.parse()?;
                i += 2;
            }
            ("--edges", Some(v)) => {
                options.edges = v.parse()?;
                i += 2;
            }
            ("--seed", Some(v)) => {
                options.seed = v.parse()?;
                i += 2;
            }
            ("--help", _) => {
                eprintln!(
                    "Usage: {} [--locations N] [--size N] [--vertices N] [--edges N] [--seed N]",
                    args[0]
                );
                return Ok(());
            }
            (other, _) => {
                tracing::warn!("Ignoring argument '{}'", other);
                i += 1;
            }
        }
    }

    tracing::info!(
        "Starting {} location(s): vector of {}, {} vertices per location, {} edges",
        config.locations,
        options.size,
        options.vertices_per_location,
        options.edges
    );

    let results = Cluster::run(config, move |ctx| run_location(ctx, options)).await?;

    for result in results {
        if let Some(summary) = result? {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}

async fn run_location(
    ctx: Arc<LocationContext>,
    options: DemoOptions,
) -> Result<Option<Summary>, ContainerError> {
    let me = ctx.id();
    let count = ctx.count();

    // 1. Vector: fill, then skew towards the higher locations.
    let vector = PVector::new(ctx.clone(), options.size, 0u64).await?;
    for entry in vector.local_offset_map() {
        for index in entry.range() {
            vector.set(index, (index * index) as u64).await?;
        }
    }
    vector.distribute(&skewed_target(options.size, count)).await?;
    let local_sizes = ctx.all_gather(&vector.local_size()).await?;
    let vector_size = vector.size().await?;

    // 2. Graph: a random DAG, edges always point to a larger GID.
    let graph: PGraph<u64, f64> = PGraph::new(ctx.clone(), GraphKind::Directed).await?;
    for n in 0..options.vertices_per_location {
        graph.add_vertex((me * options.vertices_per_location + n) as u64).await?;
    }
    graph.update().await?;
    let mut gids: Vec<u64> = ctx
        .all_gather(&graph.local_vertices())
        .await?
        .into_iter()
        .flatten()
        .collect();
    gids.sort_unstable();

    if me == 0 && gids.len() > 1 {
        let mut rng = StdRng::seed_from_u64(options.seed);
        for _ in 0..options.edges {
            let a = rng.gen_range(0..gids.len());
            let b = rng.gen_range(0..gids.len());
            if a == b {
                continue;
            }
            let (source, dest) = (gids[a.min(b)], gids[a.max(b)]);
            graph.add_edge(source, dest, rng.gen_range(0.0..1.0)).await?;
        }
    }
    ctx.barrier().await;
    let vertices = graph.num_vertices().await?;
    let edges = graph.num_edges().await?;

    // 3. Traversals.
    let bfs_reached = match gids.first() {
        Some(&root) => {
            let recorder = graph.bfs(root, Direction::Forward, Recorder::default()).await?;
            ctx.all_reduce_sum(recorder.visits.len() as u64).await?
        }
        None => 0,
    };

    let traversal = Traversal::new(&graph, Recorder::default()).await?;
    let components = traversal.bfs_all(Direction::Forward).await?;
    traversal.reset().await?;
    let dfs_time = traversal.dfs_all(Direction::Forward).await?;
    traversal.reset().await?;
    let topological_blocked = traversal.topological(Direction::Forward).await?;
    drop(traversal);

    let summary = Summary {
        locations: count,
        vector_size,
        local_sizes,
        directory_ranges: vector.global_offset_map().len(),
        vertices,
        edges,
        bfs_reached,
        components,
        dfs_time,
        topological_blocked,
    };
    ctx.barrier().await;
    Ok((me == 0).then_some(summary))
}

/// Location `d` receives a share proportional to `d + 1`.
fn skewed_target(size: usize, locations: usize) -> TargetMap {
    let weights: usize = (1..=locations).sum();
    let mut target = TargetMap::new();
    let mut lo = 0;
    for dest in 0..locations {
        let hi = if dest + 1 == locations {
            size
        } else {
            lo + size * (dest + 1) / weights
        };
        target.insert(dest, vec![lo..hi]);
        lo = hi;
    }
    target
}
