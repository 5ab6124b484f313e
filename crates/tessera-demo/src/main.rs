//! Streams a procedural world through a tile cache along a camera path.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p tessera-demo` for the quadtree session, or
//! `cargo run -p tessera-demo -- --tree oct --frames 300` for the octree.

mod camera;
mod source;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use glam::DVec3;
use tessera_cache::{
    CacheError, ImageTextureBuilder, OctreeCache, QuadtreeCache, RenderableBuilder,
    SurfaceMeshBuilder, TileCache, TileLayout, TilePayload, TileProvider, WorkerProvider,
};
use tessera_config::{CliArgs, Config, TreeKind};
use tracing::{error, info};

use camera::FlyPath;
use source::{ProceduralImages, ProceduralSurfaces, Simulation};

fn main() {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tessera")
    });

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    tessera_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let result = match config.session.tree {
        TreeKind::Quad => run_quadtree(&config),
        TreeKind::Oct => run_octree(&config),
    };
    if let Err(e) = result {
        error!(error = %e, "session aborted");
        std::process::exit(1);
    }
}

/// Configured fetch threads; 0 leaves one core for the frame loop.
fn worker_threads(config: &Config) -> usize {
    match config.provider.worker_threads {
        0 => num_cpus::get().max(2) - 1,
        n => n,
    }
}

fn run_quadtree(config: &Config) -> Result<(), CacheError> {
    let simulation = Simulation::new(&config.provider, config.session.seed);
    let provider = WorkerProvider::new(
        ProceduralImages::new(simulation, config.provider.tile_pixels),
        worker_threads(config),
        config.provider.queue_capacity,
    );
    let extent = config.provider.world_extent;
    let layout = TileLayout::new(DVec3::ZERO, DVec3::new(extent, extent, 0.0));
    let mut cache = QuadtreeCache::new(config.cache.clone(), layout, provider, ImageTextureBuilder)?;
    info!(extent, "quadtree session started");
    run_session(&mut cache, config);
    Ok(())
}

fn run_octree(config: &Config) -> Result<(), CacheError> {
    let simulation = Simulation::new(&config.provider, config.session.seed);
    let provider = WorkerProvider::new(
        ProceduralSurfaces::new(simulation),
        worker_threads(config),
        config.provider.queue_capacity,
    );
    let layout = TileLayout::new(DVec3::ZERO, DVec3::splat(config.provider.world_extent));
    let mut cache = OctreeCache::new(config.cache.clone(), layout, provider, SurfaceMeshBuilder)?;
    info!(extent = config.provider.world_extent, "octree session started");
    run_session(&mut cache, config);
    Ok(())
}

/// Fly the camera path, logging frame statistics at the configured interval.
fn run_session<const D: usize, const B: usize, T, Bd>(cache: &mut TileCache<D, B, T, Bd>, config: &Config)
where
    T: TileProvider<D>,
    T::Payload: TilePayload,
    Bd: RenderableBuilder<D, T::Payload>,
{
    let path = FlyPath::new(&config.camera, config.session.frames);
    let frame_time = Duration::from_millis(config.session.frame_time_ms);
    let interval = config.debug.stats_interval;
    let started = Instant::now();

    for frame in 0..config.session.frames {
        let frame_start = Instant::now();
        let stats = *cache.update(&path.view(frame));

        let (mut drawn, mut substituted) = (0usize, 0usize);
        for tile in cache.selected() {
            if let Some(built) = tile.renderable {
                drawn += 1;
                if built.source_level < tile.address.level {
                    substituted += 1;
                }
            }
        }

        if interval > 0 && (frame + 1) % interval == 0 {
            info!(
                frame = stats.frame,
                visited = stats.visited,
                culled = stats.culled,
                selected = stats.selected,
                drawn,
                substituted,
                requested = stats.requested,
                in_flight = stats.in_flight,
                completed = stats.completed,
                failed = stats.failed,
                resident = stats.resident,
                resident_kib = stats.resident_bytes / 1024,
                evicted = stats.evicted,
                nodes = stats.nodes,
                "frame stats"
            );
        }

        if let Some(rest) = frame_time.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    let totals = cache.stats();
    info!(
        frames = totals.frames,
        requests = totals.requests,
        loads = totals.loads,
        failures = totals.failures,
        stale = totals.stale_completions,
        cancellations = totals.cancellations,
        evictions = totals.evictions,
        pruned = totals.pruned,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "session finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_threads_auto_leaves_a_core() {
        let mut config = Config::default();
        assert_eq!(worker_threads(&config), num_cpus::get().max(2) - 1);
        assert!(worker_threads(&config) >= 1);
        config.provider.worker_threads = 3;
        assert_eq!(worker_threads(&config), 3);
    }
}
