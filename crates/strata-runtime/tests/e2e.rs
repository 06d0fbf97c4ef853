use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use strata_blocks::{Block, BlockUpdate, DynamicBehavior, MaterialRegistry, UpdateOutcome};
use strata_chunk::{Chunk, ChunkObserver, EntityId, Populator};
use strata_runtime::{Entity, LoadPolicy, Scheduler, World};
use strata_world::config::TickLimits;
use strata_world::worldgen::FlatParams;
use strata_world::{ChunkCoord, GeneratorConfig, WorldConfig};

fn flat_config(dir: &Path, limits: TickLimits) -> WorldConfig {
    WorldConfig {
        world_dir: dir.to_path_buf(),
        generator: GeneratorConfig::Flat(FlatParams::default()),
        generation_workers: 2,
        touch_neighbors: false,
        limits,
        ..WorldConfig::default()
    }
}

fn quiet_limits() -> TickLimits {
    TickLimits {
        autosave_ticks: 0,
        ..TickLimits::default()
    }
}

fn tick_until(sched: &Scheduler, max: usize, mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..max {
        if done() {
            return true;
        }
        sched.tick().unwrap();
    }
    done()
}

#[test]
fn flat_world_lights_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let reg = Arc::new(MaterialRegistry::with_defaults());
    let stone = reg.id_by_name("stone").unwrap();
    let world = World::new(flat_config(dir.path(), quiet_limits()), reg.clone()).unwrap();
    let sched = Scheduler::new(world.clone(), 2, 50).unwrap();

    assert_eq!(world.get_block_material(0, 0, 0).unwrap(), stone.0);
    assert_eq!(world.get_block_material(0, 100, 0).unwrap(), 0);
    assert!(tick_until(&sched, 500, || sched.lighting().is_idle()));
    // A couple more ticks so population has re-lit everything.
    assert!(tick_until(&sched, 500, || {
        sched.lighting().is_idle()
            && world
                .loaded(ChunkCoord::new(0, 0, 0))
                .is_some_and(|c| c.is_populated())
    }));

    let sky = |x, y, z| {
        world
            .get_chunk_at_block(x, y, z, LoadPolicy::NoLoad)
            .unwrap()
            .unwrap()
            .sky_light(x, y, z)
            .unwrap()
    };
    assert_eq!(sky(0, 100, 0), 15);
    assert_eq!(sky(0, 64, 0), 15);
    assert_eq!(sky(0, 0, 0), 0);
    assert_eq!(sky(7, 40, 9), 0);

    drop(sched);
    world.shutdown();
    drop(world);

    let reopened = World::new(flat_config(dir.path(), quiet_limits()), reg).unwrap();
    reopened.context().clock.bind_main_thread();
    let chunk = reopened
        .get_chunk(ChunkCoord::new(0, 0, 0), LoadPolicy::LoadOnly)
        .unwrap()
        .expect("chunk written at shutdown");
    assert_eq!(chunk.get_block(0, 0, 0).unwrap(), Block::of(stone));
    assert!(chunk.is_populated());
    assert_eq!(reopened.stats().generated_chunks, 0);
}

#[test]
fn unobserved_chunks_are_reaped_and_saved() {
    let dir = tempfile::tempdir().unwrap();
    let reg = Arc::new(MaterialRegistry::with_defaults());
    let limits = TickLimits {
        reap_per_tick: 4096,
        unload_per_tick: 4096,
        reap_delay_ticks: 2,
        autosave_ticks: 0,
        ..TickLimits::default()
    };
    let world = World::new(flat_config(dir.path(), limits), reg).unwrap();
    let sched = Scheduler::new(world.clone(), 2, 50).unwrap();
    world.pregenerate(ChunkCoord::new(0, 0, 0), 0).unwrap();
    let generated = world.stats().generated_chunks;
    assert_eq!(generated, 256);

    assert!(tick_until(&sched, 2000, || world.stats().regions == 0));
    assert_eq!(world.stats().loaded_chunks, 0);
    assert!(world.chunk_exists(ChunkCoord::new(0, 0, 0)));
    assert!(world.chunk_exists(ChunkCoord::new(3, 15, 3)));

    // Comes back from disk, not from the generator.
    assert_eq!(world.get_block(1, 1, 1).unwrap().id, world.context().registry.id_by_name("stone").unwrap().0);
    assert_eq!(world.stats().generated_chunks, generated);
    world.shutdown();
}

struct Markers {
    glass: Block,
}

impl Populator for Markers {
    fn name(&self) -> &str {
        "markers"
    }

    fn populate(&self, chunk: &Chunk) -> Result<(), Box<dyn Error + Send + Sync>> {
        // One marker on the surface of every chunk sitting just above the ground.
        if chunk.coord().cy == 4 {
            let (x, y, z) = chunk.coord().base();
            chunk.set_block(x + 8, y, z + 8, self.glass)?;
        }
        Ok(())
    }
}

#[test]
fn populators_run_on_generated_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let reg = Arc::new(MaterialRegistry::with_defaults());
    let glass = Block::of(reg.id_by_name("glass").unwrap());
    let world = World::new(flat_config(dir.path(), quiet_limits()), reg).unwrap();
    let sched = Scheduler::new(world.clone(), 2, 50).unwrap();
    world.add_populator(Arc::new(Markers { glass }));
    world.pregenerate(ChunkCoord::new(0, 4, 0), 0).unwrap();
    assert_eq!(world.loaded_columns(), 16);

    assert!(tick_until(&sched, 200, || {
        world
            .loaded(ChunkCoord::new(1, 4, 2))
            .is_some_and(|c| c.is_populated())
    }));
    assert_eq!(world.get_block(8, 64, 8).unwrap(), glass);
    assert_eq!(world.get_block(24, 64, 40).unwrap(), glass);
    assert_eq!(world.get_block(9, 64, 8).unwrap(), Block::AIR);
    world.shutdown();
}

fn ripen(u: &BlockUpdate) -> UpdateOutcome {
    let data = u.block.data + 1;
    UpdateOutcome {
        set: Some(Block::new(u.block.id, data)),
        reschedule_at: (data < 3).then_some(u.time + 50),
    }
}

#[test]
fn scheduled_updates_run_across_region_edge() {
    let dir = tempfile::tempdir().unwrap();
    let mut reg = MaterialRegistry::with_defaults();
    let dirt = reg.id_by_name("dirt").unwrap();
    reg.attach_dynamic(
        dirt,
        DynamicBehavior {
            update: ripen,
            range: 1,
            first_delay_ms: Some(50),
        },
    )
    .unwrap();
    let world = World::new(flat_config(dir.path(), quiet_limits()), Arc::new(reg)).unwrap();
    let sched = Scheduler::new(world.clone(), 2, 50).unwrap();

    // x = 0 sits on the region edge, so updates here run in the global pass.
    world.set_block(0, 70, 0, Block::of(dirt)).unwrap();
    for _ in 0..6 {
        sched.tick().unwrap();
    }
    assert_eq!(world.get_block(0, 70, 0).unwrap(), Block::new(dirt.0, 3));

    // And one well inside the region runs locally.
    world.set_block(8, 70, 8, Block::of(dirt)).unwrap();
    for _ in 0..6 {
        sched.tick().unwrap();
    }
    assert_eq!(world.get_block(8, 70, 8).unwrap(), Block::new(dirt.0, 3));
    world.shutdown();
}

struct Walker {
    id: u64,
    at: ChunkCoord,
    fail: bool,
    ticks: AtomicU64,
}

impl ChunkObserver for Walker {
    fn id(&self) -> EntityId {
        EntityId(self.id)
    }
    fn position(&self) -> ChunkCoord {
        self.at
    }
    fn view_distance(&self) -> u32 {
        1
    }
}

impl Entity for Walker {
    fn tick(&self, _world: &World, _dt_ms: u64) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        if self.fail {
            return Err("stuck".into());
        }
        Ok(())
    }
}

#[test]
fn entities_keep_chunks_observed_and_failures_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let reg = Arc::new(MaterialRegistry::with_defaults());
    let world = World::new(flat_config(dir.path(), quiet_limits()), reg).unwrap();
    let sched = Scheduler::new(world.clone(), 2, 50).unwrap();
    let home = ChunkCoord::new(0, 4, 0);
    let good = Arc::new(Walker {
        id: 1,
        at: home,
        fail: false,
        ticks: AtomicU64::new(0),
    });
    let bad = Arc::new(Walker {
        id: 2,
        at: home,
        fail: true,
        ticks: AtomicU64::new(0),
    });
    sched.entities().add(good.clone());
    sched.entities().add(bad.clone());

    assert!(tick_until(&sched, 500, || {
        world
            .loaded(home)
            .is_some_and(|c| c.is_observed() && c.has_entities())
    }));
    let ticks = good.ticks.load(Ordering::Relaxed);
    assert_eq!(bad.ticks.load(Ordering::Relaxed), ticks);
    assert_eq!(world.stats().entity_failures, ticks);
    assert!(world.stats().observed_chunks >= 1);
    world.shutdown();
}
