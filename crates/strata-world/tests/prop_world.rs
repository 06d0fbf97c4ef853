use proptest::prelude::*;
use strata_blocks::{Block, MaterialRegistry};
use strata_world::coords::block_local;
use strata_world::{
    CHUNK_SIZE, ChunkCoord, CuboidBuffer, FlatGenerator, GeneratorConfig, REGION_CHUNKS, Stage,
    TerrainGenerator, TickClock, WorldConfig, build_generator, local_index,
};

fn world_i32() -> impl Strategy<Value = i32> {
    -1_000_000i32..=1_000_000
}

proptest! {
    // A block lands in exactly one chunk and its local offset rebuilds the world position.
    #[test]
    fn block_to_chunk_roundtrip(x in world_i32(), y in world_i32(), z in world_i32()) {
        let c = ChunkCoord::from_block(x, y, z);
        let (bx, by, bz) = c.base();
        let (lx, ly, lz) = block_local(x, y, z);
        prop_assert_eq!((bx + lx as i32, by + ly as i32, bz + lz as i32), (x, y, z));
        prop_assert!(local_index(lx, ly, lz) < CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE);
    }

    // Region local coordinates plus the region base give back the chunk.
    #[test]
    fn chunk_region_roundtrip(cx in world_i32(), cy in world_i32(), cz in world_i32()) {
        let c = ChunkCoord::new(cx >> 4, cy >> 4, cz >> 4);
        let r = c.region();
        let (lx, ly, lz) = c.region_local();
        prop_assert!(lx < REGION_CHUNKS && ly < REGION_CHUNKS && lz < REGION_CHUNKS);
        prop_assert_eq!(r.chunk_at(lx, ly, lz), c);
    }

    // chunk_blocks reads the same cells as get_world.
    #[test]
    fn chunk_slice_matches_world_reads(ox in 0usize..2, oz in 0usize..2, seed in any::<u16>()) {
        let mut buf = CuboidBuffer::for_chunks(ChunkCoord::new(-1, 0, 3), 2, 1);
        for (i, b) in buf.blocks.iter_mut().enumerate() {
            *b = Block::new((i as u16).wrapping_add(seed), 0);
        }
        let slice = buf.chunk_blocks(ox, 0, oz);
        let (bx, by, bz) = buf.base;
        for (x, y, z) in [(0, 0, 0), (15, 15, 15), (3, 9, 12)] {
            let w = buf.get_world(bx + (ox * 16 + x) as i32, by + y as i32, bz + (oz * 16 + z) as i32);
            prop_assert_eq!(Some(slice[local_index(x, y, z)]), w);
        }
    }
}

#[test]
fn flat_generator_fills_below_height() {
    let stone = Block::new(1, 0);
    let g = FlatGenerator::new(64, stone);
    let mut buf = CuboidBuffer::for_chunks(ChunkCoord::new(0, 3, 0), 1, 2);
    let maps = g.generate(&mut buf);
    assert_eq!(maps.len(), 1);
    assert_eq!(buf.get_world(0, 63, 0), Some(stone));
    assert_eq!(buf.get_world(5, 64, 5), Some(Block::AIR));
    assert_eq!(g.surface_heights(0, 0).unwrap()[0], 63);
}

#[test]
fn noise_generator_matches_its_surface_heights() {
    let reg = MaterialRegistry::with_defaults();
    let g = build_generator(&GeneratorConfig::default(), 7, &reg).unwrap();
    let heights = g.surface_heights(2, -1).unwrap();
    let mut buf = CuboidBuffer::for_chunks(ChunkCoord::new(2, 0, -1), 1, 16);
    g.generate(&mut buf);
    let (bx, _, bz) = buf.base;
    for (x, z) in [(0usize, 0usize), (7, 11), (15, 15)] {
        let h = heights[z * 16 + x];
        let top = buf.get_world(bx + x as i32, h, bz + z as i32).unwrap();
        let above = buf.get_world(bx + x as i32, h + 1, bz + z as i32).unwrap();
        assert!(reg.is_surface(top.id));
        assert_eq!(above, Block::AIR);
    }
}

#[test]
fn unknown_generator_material_is_an_error() {
    let reg = MaterialRegistry::new();
    assert!(build_generator(&GeneratorConfig::default(), 0, &reg).is_err());
}

#[test]
fn config_defaults_and_overrides() {
    let cfg = WorldConfig::from_toml_str(
        r#"
        seed = 9
        generator_width = 8
        [generator]
        mode = "flat"
        height = 10
        [limits]
        populate_per_tick = 5
        "#,
    )
    .unwrap();
    assert_eq!(cfg.seed, 9);
    assert_eq!(cfg.generator_width, 8);
    assert_eq!(cfg.limits.populate_per_tick, 5);
    assert_eq!(cfg.limits.reap_per_tick, 10);
    assert_eq!(cfg.dirty_capacity, 10);
    assert!(matches!(cfg.generator, GeneratorConfig::Flat(ref f) if f.height == 10));
}

#[test]
fn clock_fences_by_thread_and_stage() {
    let clock = TickClock::new();
    // Creating thread is main and the clock starts idle.
    assert!(clock.check(0, Stage::REGION_WRITE, Stage::MAIN_WRITE).is_ok());
    clock.set_stage(Stage::PHYSICS);
    assert!(clock.check(0, Stage::REGION_WRITE, Stage::MAIN_WRITE).is_err());
    let me = strata_world::thread_token();
    assert!(clock.check(me, Stage::REGION_WRITE, Stage::MAIN_WRITE).is_ok());
    clock.set_stage(Stage::SNAPSHOT);
    assert!(clock.check(me, Stage::REGION_WRITE, Stage::MAIN_WRITE).is_err());

    let other = std::thread::spawn(move || strata_world::thread_token()).join().unwrap();
    assert_ne!(other, me);
}
