use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use strata_runtime::{Scheduler, World};
use strata_world::ChunkCoord;

mod config;

use config::ServerConfig;

#[derive(Parser, Debug)]
#[command(name = "strata", about = "Headless voxel world server")]
struct Args {
    /// Server config (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ticks to run before saving and exiting; 0 runs forever
    #[arg(short, long)]
    ticks: Option<u64>,

    /// Overrides the world seed
    #[arg(short, long)]
    seed: Option<i32>,

    /// Overrides the world directory
    #[arg(short, long)]
    world_dir: Option<PathBuf>,

    /// Region worker threads
    #[arg(long)]
    workers: Option<usize>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if let Err(e) = run(args) {
        log::error!("server stopped: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let mut server = match &args.config {
        Some(path) => ServerConfig::load_from_path(path)?,
        None => ServerConfig::default(),
    };
    if let Some(t) = args.ticks {
        server.ticks = t;
    }
    if let Some(w) = args.workers {
        server.region_workers = w;
    }
    let mut world_cfg = server.world_config()?;
    if let Some(seed) = args.seed {
        world_cfg.seed = seed;
    }
    if let Some(dir) = args.world_dir {
        world_cfg.world_dir = dir;
    }
    let registry = Arc::new(server.registry()?);
    log::info!(
        "starting world_dir={} seed={} materials={} tick_ms={} ticks={}",
        world_cfg.world_dir.display(),
        world_cfg.seed,
        registry.len(),
        server.tick_ms,
        server.ticks
    );

    let world = World::new(world_cfg, registry)?;
    let scheduler = Scheduler::new(world.clone(), server.region_workers, server.tick_ms)?;
    let result = drive(&world, &scheduler, &server);
    drop(scheduler);
    world.shutdown();
    let s = world.stats();
    log::info!(
        "shutdown complete generated={} saved={} entity_failures={}",
        s.generated_chunks,
        s.saved_chunks,
        s.entity_failures
    );
    result
}

fn drive(world: &World, scheduler: &Scheduler, server: &ServerConfig) -> Result<(), Box<dyn Error>> {
    world.pregenerate(ChunkCoord::new(0, 0, 0), server.spawn_radius)?;
    if server.ticks == 0 {
        loop {
            scheduler.run(1000)?;
        }
    }
    scheduler.run(server.ticks)?;
    Ok(())
}
