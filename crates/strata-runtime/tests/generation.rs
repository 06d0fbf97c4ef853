use std::sync::Arc;
use std::time::{Duration, Instant};

use strata_blocks::MaterialRegistry;
use strata_runtime::{ColumnState, LoadPolicy, World};
use strata_world::worldgen::FlatParams;
use strata_world::{ChunkCoord, GeneratorConfig, RegionCoord, WorldConfig};

fn open(dir: &std::path::Path, workers: usize) -> Arc<World> {
    open_with(dir, workers, false)
}

fn open_with(dir: &std::path::Path, workers: usize, touch_neighbors: bool) -> Arc<World> {
    let cfg = WorldConfig {
        world_dir: dir.to_path_buf(),
        generator: GeneratorConfig::Flat(FlatParams::default()),
        generation_workers: workers,
        touch_neighbors,
        ..WorldConfig::default()
    };
    World::new(cfg, Arc::new(MaterialRegistry::with_defaults())).unwrap()
}

#[test]
fn racing_requests_generate_each_range_once() {
    let dir = tempfile::tempdir().unwrap();
    let world = open(dir.path(), 3);
    let coords: Vec<ChunkCoord> = (0..4)
        .flat_map(|x| (0..4).map(move |z| ChunkCoord::new(x, 7, z)))
        .collect();

    // Background requests first, then blocking callers pile onto the same range.
    for c in &coords {
        world.get_chunk(*c, LoadPolicy::LoadOrQueueGenerate).unwrap();
    }
    let results: Vec<Vec<Arc<strata_chunk::Chunk>>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let world = &world;
                let coords = &coords;
                s.spawn(move || {
                    coords
                        .iter()
                        .map(|c| {
                            world
                                .get_chunk(*c, LoadPolicy::LoadOrGenerate)
                                .unwrap()
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for got in &results[1..] {
        for (a, b) in got.iter().zip(results[0].iter()) {
            assert!(Arc::ptr_eq(a, b));
        }
    }
    assert_eq!(world.stats().generated_chunks, 4 * 16 * 4);
    let region = world.region(RegionCoord::new(0, 0, 0)).unwrap();
    assert_eq!(region.generator().state(0), ColumnState::Copied);
    assert_eq!(region.len(), 4 * 16 * 4);
}

#[test]
fn neighbors_in_other_regions_are_generated_independently() {
    let dir = tempfile::tempdir().unwrap();
    let world = open(dir.path(), 2);
    let west = ChunkCoord::new(-1, 0, 0);
    let east = ChunkCoord::new(0, 0, 0);
    world.get_chunk(east, LoadPolicy::LoadOrGenerate).unwrap().unwrap();
    world.get_chunk(west, LoadPolicy::LoadOrQueueGenerate).unwrap();
    let deadline = Instant::now() + Duration::from_secs(20);
    let copied = || {
        world
            .region(west.region())
            .is_some_and(|r| r.generator().state(3) == ColumnState::Copied)
    };
    while !copied() {
        assert!(Instant::now() < deadline, "west never generated");
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(world.loaded(west).is_some());
    assert_eq!(world.stats().regions, 2);
    assert_eq!(world.stats().generated_chunks, 2 * 4 * 16 * 4);
    assert_eq!(world.stats().queued_generation, 0);
    world.shutdown();
}

fn wait_copied(world: &World, region: RegionCoord, index: usize) {
    let deadline = Instant::now() + Duration::from_secs(20);
    while !world
        .region(region)
        .is_some_and(|r| r.generator().state(index) == ColumnState::Copied)
    {
        assert!(Instant::now() < deadline, "range {} of {:?} never generated", index, region);
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn finished_range_generates_its_lateral_neighbors() {
    let dir = tempfile::tempdir().unwrap();
    let world = open_with(dir.path(), 2, true);
    world.get_chunk(ChunkCoord::new(0, 0, 0), LoadPolicy::LoadOrGenerate).unwrap().unwrap();

    let home = RegionCoord::new(0, 0, 0);
    // West and north sit across a region edge.
    wait_copied(&world, RegionCoord::new(-1, 0, 0), 3);
    wait_copied(&world, RegionCoord::new(0, 0, -1), 12);
    wait_copied(&world, home, 1);
    wait_copied(&world, home, 4);
    assert!(world.loaded(ChunkCoord::new(-1, 15, 0)).is_some());
    assert!(world.loaded(ChunkCoord::new(3, 0, -1)).is_some());

    // Neighbor ranges do not spread any further.
    std::thread::sleep(Duration::from_millis(200));
    let region = world.region(home).unwrap();
    assert_eq!(region.generator().state(5), ColumnState::None);
    assert_eq!(region.generator().state(2), ColumnState::None);
    assert_eq!(world.stats().regions, 3);
    assert_eq!(world.stats().generated_chunks, 5 * 4 * 16 * 4);
    world.shutdown();
}

#[test]
fn persisted_neighbors_are_not_regenerated() {
    let dir = tempfile::tempdir().unwrap();
    {
        let world = open(dir.path(), 1);
        world.get_chunk(ChunkCoord::new(-1, 0, 0), LoadPolicy::LoadOrGenerate).unwrap().unwrap();
        world.shutdown();
    }
    let world = open_with(dir.path(), 1, true);
    world.get_chunk(ChunkCoord::new(0, 0, 0), LoadPolicy::LoadOrGenerate).unwrap().unwrap();
    let home = RegionCoord::new(0, 0, 0);
    // Sides are touched west first, so once the rest are done west was decided.
    wait_copied(&world, home, 1);
    wait_copied(&world, RegionCoord::new(0, 0, -1), 12);
    wait_copied(&world, home, 4);
    assert!(world.loaded(ChunkCoord::new(-1, 0, 0)).is_none());
    assert!(
        world
            .region(RegionCoord::new(-1, 0, 0))
            .is_none_or(|r| r.generator().state(3) == ColumnState::None)
    );
    assert_eq!(world.stats().generated_chunks, 4 * 4 * 16 * 4);
    world.shutdown();
}
