use super::*;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::TryRecvError;
use parking_lot::Mutex;
use strata_blocks::{Block, MaterialRegistry};
use strata_chunk::{
    BlockStore, Chunk, ChunkInit, ChunkObserver, ChunkSnapshot, ChunkSync, EntityId, LightBuffers, SaveState,
};
use strata_world::worldgen::FlatParams;
use strata_world::{ChunkCoord, GeneratorConfig, RegionCoord, WorldConfig};

fn flat_config(dir: &Path) -> WorldConfig {
    WorldConfig {
        world_dir: dir.to_path_buf(),
        generator: GeneratorConfig::Flat(FlatParams::default()),
        generation_workers: 1,
        touch_neighbors: false,
        ..WorldConfig::default()
    }
}

fn open(dir: &Path) -> Arc<World> {
    let world = World::new(flat_config(dir), Arc::new(MaterialRegistry::with_defaults())).unwrap();
    world.context().clock.bind_main_thread();
    world
}

fn block(world: &World, name: &str) -> Block {
    Block::of(world.context().registry.id_by_name(name).unwrap())
}

#[derive(Default)]
struct Watcher {
    full: Mutex<Vec<ChunkCoord>>,
    deltas: Mutex<Vec<(ChunkCoord, usize, usize, usize, Block)>>,
}

impl ChunkSync for Watcher {
    fn on_chunk_full_resend(&self, snapshot: &ChunkSnapshot) {
        self.full.lock().push(snapshot.coord);
    }
    fn on_block_delta(&self, coord: ChunkCoord, x: usize, y: usize, z: usize, block: Block) {
        self.deltas.lock().push((coord, x, y, z, block));
    }
}

impl ChunkObserver for Watcher {
    fn id(&self) -> EntityId {
        EntityId(7)
    }
    fn position(&self) -> ChunkCoord {
        ChunkCoord::new(0, 4, 0)
    }
    fn view_distance(&self) -> u32 {
        1
    }
    fn sync(&self) -> Option<&dyn ChunkSync> {
        Some(self)
    }
}

#[test]
fn publish_keeps_first_loaded_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let world = open(dir.path());
    let region = world.region_or_create(RegionCoord::new(0, 0, 0)).unwrap();
    let coord = ChunkCoord::new(2, 3, 4);
    let make = || {
        let ctx = world.context().clone();
        world.with_column(coord.cx, coord.cz, |col| {
            Chunk::new(
                ChunkInit {
                    coord,
                    blocks: BlockStore::uniform(Block::AIR, 10),
                    light: LightBuffers::dark(),
                    populated: true,
                    generation: 0,
                },
                ctx,
                region.shared().clone(),
                col,
            )
        })
    };
    let (first, won) = region.publish(make());
    assert!(won);
    let second = make();
    let (kept, won) = region.publish(second.clone());
    assert!(!won);
    assert!(Arc::ptr_eq(&kept, &first));
    assert!(!second.is_loaded());
    assert_eq!(region.len(), 1);
    assert!(Arc::ptr_eq(&world.loaded(coord).unwrap(), &first));
}

#[test]
fn sequence_follows_region_parity() {
    let dir = tempfile::tempdir().unwrap();
    let world = open(dir.path());
    let a = world.region_or_create(RegionCoord::new(0, 0, 0)).unwrap();
    let b = world.region_or_create(RegionCoord::new(1, 0, 1)).unwrap();
    let c = world.region_or_create(RegionCoord::new(-1, 1, 0)).unwrap();
    assert_eq!(a.sequence(), 0);
    assert_eq!(b.sequence(), 5);
    assert_eq!(c.sequence(), 3);
    assert!(matches!(
        a.run_physics(SEQUENCES),
        Err(RegionError::SequenceMismatch { .. })
    ));
    assert!(matches!(a.run_physics(-2), Err(RegionError::SequenceMismatch { .. })));
    assert_eq!(a.run_physics(3).unwrap(), 0);
}

#[test]
fn blocking_generation_fills_flat_terrain() {
    let dir = tempfile::tempdir().unwrap();
    let world = open(dir.path());
    let stone = block(&world, "stone");
    assert!(world.get_chunk(ChunkCoord::new(0, 0, 0), LoadPolicy::NoLoad).unwrap().is_none());

    assert_eq!(world.get_block(0, 0, 0).unwrap(), stone);
    assert_eq!(world.get_block(3, 63, 3).unwrap(), stone);
    assert_eq!(world.get_block(3, 64, 3).unwrap(), Block::AIR);
    assert_eq!(world.get_block_material(0, 100, 0).unwrap(), 0);

    // One 4x4 range of columns, full region height.
    let stats = world.stats();
    assert_eq!(stats.generated_chunks, 4 * 16 * 4);
    let region = world.region(RegionCoord::new(0, 0, 0)).unwrap();
    assert_eq!(region.generator().state(0), ColumnState::Copied);
    assert_eq!(region.generator().state(1), ColumnState::None);

    let chunk = world.loaded(ChunkCoord::new(0, 6, 0)).unwrap();
    assert_eq!(chunk.sky_light(0, 100, 0).unwrap(), 15);
    assert_ne!(chunk.generation(), 0);
    let column = chunk.column();
    assert_eq!(column.surface_height(0, 0), 63);
}

#[test]
fn blocking_generation_refused_under_snapshot_lock() {
    let dir = tempfile::tempdir().unwrap();
    let world = open(dir.path());
    let _read = world.snapshot_lock().read();
    let err = world
        .get_chunk(ChunkCoord::new(0, 0, 0), LoadPolicy::LoadOrGenerate)
        .unwrap_err();
    assert!(matches!(err, RegionError::SnapshotLockHeld));
}

#[test]
fn queued_generation_completes_in_background() {
    let dir = tempfile::tempdir().unwrap();
    let world = open(dir.path());
    let coord = ChunkCoord::new(5, 2, 9);
    let got = world.get_chunk(coord, LoadPolicy::LoadOrQueueGenerate).unwrap();
    assert!(got.is_none());
    let region = world.region(coord.region()).unwrap();
    let (lx, _, lz) = coord.region_local();
    let index = region.generator().column_index(lx, lz);
    // Chunks are published before the range flips to Copied.
    let deadline = Instant::now() + Duration::from_secs(20);
    while region.generator().state(index) != ColumnState::Copied {
        assert!(Instant::now() < deadline, "background generation never finished");
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(world.loaded(coord).is_some());
}

#[test]
fn unloaded_chunk_reloads_with_its_edits() {
    let dir = tempfile::tempdir().unwrap();
    let world = open(dir.path());
    let glass = block(&world, "glass");
    let coord = ChunkCoord::new(0, 4, 0);
    let chunk = world.get_chunk(coord, LoadPolicy::LoadOrGenerate).unwrap().unwrap();
    chunk.set_block(1, 70, 1, glass).unwrap();
    chunk.unload(true).unwrap();

    let region = world.region(coord.region()).unwrap();
    let empty = region.copy_snapshot().unwrap();
    assert!(!empty);
    assert!(!chunk.is_loaded());
    assert!(world.loaded(coord).is_none());
    assert!(world.chunk_exists(coord));

    let again = world.get_chunk(coord, LoadPolicy::LoadOnly).unwrap().unwrap();
    assert!(!Arc::ptr_eq(&again, &chunk));
    assert_eq!(again.get_block(1, 70, 1).unwrap(), glass);
    assert_eq!(again.generation(), 0);
}

#[test]
fn dropping_unsaved_chunk_allows_regeneration() {
    let dir = tempfile::tempdir().unwrap();
    let world = open(dir.path());
    let coord = ChunkCoord::new(1, 2, 1);
    let chunk = world.get_chunk(coord, LoadPolicy::LoadOrGenerate).unwrap().unwrap();
    let region = world.region(coord.region()).unwrap();
    chunk.unload(false).unwrap();
    region.copy_snapshot().unwrap();
    assert!(!world.chunk_exists(coord));
    assert_eq!(region.generator().state(0), ColumnState::None);

    let before = world.stats().generated_chunks;
    let again = world.get_chunk(coord, LoadPolicy::LoadOrGenerate).unwrap().unwrap();
    assert!(again.is_loaded());
    // Only the dropped chunk comes back; its neighbors are still loaded.
    assert_eq!(world.stats().generated_chunks, before + 1);
    assert!(again.generation() > chunk.generation());
}

#[test]
fn cancelled_unload_keeps_the_save_request() {
    let dir = tempfile::tempdir().unwrap();
    let world = open(dir.path());
    let coord = ChunkCoord::new(0, 1, 0);
    let chunk = world.get_chunk(coord, LoadPolicy::LoadOrGenerate).unwrap().unwrap();
    chunk.unload(true).unwrap();
    assert!(!chunk.cancel_unload());
    assert_eq!(chunk.save_state(), SaveState::Save);
    assert!(!world.chunk_exists(coord));

    let region = world.region(coord.region()).unwrap();
    region.copy_snapshot().unwrap();
    assert!(chunk.is_loaded());
    assert_eq!(chunk.save_state(), SaveState::None);
    assert!(world.chunk_exists(coord));
}

#[test]
fn future_snapshot_resolves_at_pre_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let world = open(dir.path());
    let coord = ChunkCoord::new(0, 3, 0);
    world.get_chunk(coord, LoadPolicy::LoadOrGenerate).unwrap().unwrap();
    let region = world.region(coord.region()).unwrap();

    let with_light = region.get_future_snapshot(coord, false, true);
    let blocks_only = region.get_future_snapshot(coord, false, false);
    let missing = region.get_future_snapshot(ChunkCoord::new(9, 3, 9), false, true);
    assert!(matches!(with_light.try_recv(), Err(TryRecvError::Empty)));

    region.pre_snapshot().unwrap();
    let snap = with_light.try_recv().unwrap();
    assert_eq!(snap.coord, coord);
    assert_eq!(snap.ids.len(), 4096);
    assert!(!snap.sky_light.is_empty());
    assert!(blocks_only.try_recv().unwrap().sky_light.is_empty());
    assert!(matches!(missing.try_recv(), Err(TryRecvError::Disconnected)));

    // A caller that gave up on its future does not fail the stage.
    drop(region.get_future_snapshot(coord, false, true));
    let kept = region.get_future_snapshot(coord, false, false);
    region.pre_snapshot().unwrap();
    assert_eq!(kept.try_recv().unwrap().coord, coord);
}

#[test]
fn observers_get_full_chunk_then_deltas() {
    let dir = tempfile::tempdir().unwrap();
    let world = open(dir.path());
    let glass = block(&world, "glass");
    let coord = ChunkCoord::new(0, 4, 0);
    let chunk = world.get_chunk(coord, LoadPolicy::LoadOrGenerate).unwrap().unwrap();
    let region = world.region(coord.region()).unwrap();
    let watcher = Arc::new(Watcher::default());
    assert!(chunk.refresh_observer(watcher.clone()).unwrap());

    region.pre_snapshot().unwrap();
    assert_eq!(*watcher.full.lock(), vec![coord]);
    assert!(watcher.deltas.lock().is_empty());

    chunk.set_block(2, 66, 3, glass).unwrap();
    region.pre_snapshot().unwrap();
    assert_eq!(watcher.full.lock().len(), 1);
    assert_eq!(*watcher.deltas.lock(), vec![(coord, 2, 2, 3, glass)]);

    // Nothing changed since.
    region.pre_snapshot().unwrap();
    assert_eq!(watcher.deltas.lock().len(), 1);
}

#[test]
fn empty_region_is_removed_and_retired() {
    let dir = tempfile::tempdir().unwrap();
    let world = open(dir.path());
    let coord = RegionCoord::new(3, 0, 3);
    let region = world.region_or_create(coord).unwrap();
    assert!(region.is_empty());
    assert!(world.remove_region_if_empty(coord));
    assert!(region.is_retired());
    assert!(world.region(coord).is_none());
    assert!(!world.remove_region_if_empty(coord));
}

#[test]
fn buffer_width_must_divide_region() {
    assert!(matches!(RegionGenerator::new(3), Err(RegionError::InvalidWidth(3))));
    assert!(matches!(RegionGenerator::new(32), Err(RegionError::InvalidWidth(32))));
    let g = RegionGenerator::new(4).unwrap();
    assert_eq!(g.columns(), 16);
    assert_eq!(g.column_index(5, 9), 2 * 4 + 1);
}
