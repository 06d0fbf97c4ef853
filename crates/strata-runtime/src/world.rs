use std::error::Error;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use strata_blocks::{Block, MaterialRegistry};
use strata_chunk::{Chunk, Column, Populator, WorldAccess, WorldContext};
use strata_io::{ChunkRecord, WorldStorage};
use strata_world::{ChunkCoord, RegionCoord, TerrainGenerator, WorldConfig, build_generator};

use crate::buffer_pool::BufferPool;
use crate::error::RegionError;
use crate::gen_pool::GenerationPool;
use crate::generator::ColumnState;
use crate::region::{LoadPolicy, Region};
use crate::save_worker::SaveWorker;
use crate::snapshot_lock::SnapshotLock;

/// Counter readout for logs and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorldStats {
    pub regions: usize,
    pub loaded_chunks: usize,
    pub observed_chunks: usize,
    pub generated_chunks: u64,
    pub saved_chunks: u64,
    pub entity_failures: u64,
    pub queued_generation: usize,
    pub pending_saves: usize,
}

/// The region map plus everything regions share: storage, terrain,
/// populators, columns, and the background lanes.
pub struct World {
    ctx: Arc<WorldContext>,
    storage: Arc<WorldStorage>,
    terrain: Arc<dyn TerrainGenerator>,
    populators: RwLock<Vec<Arc<dyn Populator>>>,
    regions: RwLock<HashMap<RegionCoord, Arc<Region>>>,
    columns: Mutex<HashMap<(i32, i32), Arc<Column>>>,
    snapshot_lock: SnapshotLock,
    gen_pool: GenerationPool,
    saver: SaveWorker,
    buffers: BufferPool,
    self_ref: Weak<World>,
}

impl World {
    pub fn new(config: WorldConfig, registry: Arc<MaterialRegistry>) -> Result<Arc<World>, Box<dyn Error>> {
        let terrain = build_generator(&config.generator, config.seed, &registry)?;
        // Validate the width before any region needs it.
        let _ = crate::generator::RegionGenerator::new(config.generator_width)?;
        let storage = Arc::new(WorldStorage::new(
            &config.world_dir,
            Duration::from_millis(config.region_file_timeout_ms),
        ));
        let workers = config.generation_workers.max(1);
        let width = config.generator_width;
        let ctx = Arc::new(WorldContext::new(registry, config));
        let saver = SaveWorker::new(storage.clone(), ctx.clone())?;
        let gen_pool = GenerationPool::new(workers)?;
        log::info!(
            target: "region",
            "world opened dir={} generator={} workers={} width={}",
            storage.dir().display(),
            terrain.name(),
            workers,
            width
        );
        let world = Arc::new_cyclic(|me: &Weak<World>| World {
            ctx: ctx.clone(),
            storage,
            terrain,
            populators: RwLock::new(Vec::new()),
            regions: RwLock::new(HashMap::new()),
            columns: Mutex::new(HashMap::new()),
            snapshot_lock: SnapshotLock::new(),
            gen_pool,
            saver,
            // One buffer per background worker plus one for a blocking caller.
            buffers: BufferPool::new(workers + 1, width),
            self_ref: me.clone(),
        });
        let weak = Arc::downgrade(&world);
        let weak: Weak<dyn WorldAccess> = weak;
        ctx.bind_world(weak);
        Ok(world)
    }

    pub fn context(&self) -> &Arc<WorldContext> {
        &self.ctx
    }

    pub fn storage(&self) -> &Arc<WorldStorage> {
        &self.storage
    }

    pub fn terrain(&self) -> &Arc<dyn TerrainGenerator> {
        &self.terrain
    }

    pub fn buffers(&self) -> &BufferPool {
        &self.buffers
    }

    pub fn snapshot_lock(&self) -> &SnapshotLock {
        &self.snapshot_lock
    }

    pub(crate) fn saver(&self) -> &SaveWorker {
        &self.saver
    }

    pub fn add_populator(&self, populator: Arc<dyn Populator>) {
        log::info!(target: "gen", "populator added name={}", populator.name());
        self.populators.write().push(populator);
    }

    pub fn populators(&self) -> Vec<Arc<dyn Populator>> {
        self.populators.read().clone()
    }

    // ---- regions ----

    pub fn region(&self, coord: RegionCoord) -> Option<Arc<Region>> {
        self.regions.read().get(&coord).cloned()
    }

    pub fn region_or_create(&self, coord: RegionCoord) -> Result<Arc<Region>, RegionError> {
        if let Some(r) = self.region(coord) {
            return Ok(r);
        }
        let mut regions = self.regions.write();
        if let Some(r) = regions.get(&coord) {
            return Ok(r.clone());
        }
        let region = Arc::new(Region::new(
            coord,
            self.self_ref.clone(),
            self.ctx.config.generator_width,
        )?);
        regions.insert(coord, region.clone());
        log::debug!(target: "region", "region created coord={:?}", coord);
        Ok(region)
    }

    pub fn regions(&self) -> Vec<Arc<Region>> {
        self.regions.read().values().cloned().collect()
    }

    /// Drops a region with no chunks and no background work. Callers hold
    /// the snapshot write lock so nothing publishes into it meanwhile.
    pub fn remove_region_if_empty(&self, coord: RegionCoord) -> bool {
        let mut regions = self.regions.write();
        let Some(region) = regions.get(&coord) else {
            return false;
        };
        if !region.is_empty() {
            return false;
        }
        region.retire();
        regions.remove(&coord);
        log::debug!(target: "region", "region removed coord={:?}", coord);
        true
    }

    // ---- chunks ----

    /// Chunk in some region grid. Never loads.
    pub fn loaded(&self, coord: ChunkCoord) -> Option<Arc<Chunk>> {
        self.region(coord.region())?.loaded_chunk(coord)
    }

    pub fn get_chunk(&self, coord: ChunkCoord, policy: LoadPolicy) -> Result<Option<Arc<Chunk>>, RegionError> {
        if policy == LoadPolicy::NoLoad {
            return Ok(self.loaded(coord));
        }
        let region = self.region_or_create(coord.region())?;
        let chunk = region.get_chunk(coord, policy)?;
        if chunk.is_none() && region.is_retired() {
            // Lost a race with region removal; the next lookup makes a new one.
            return self.region_or_create(coord.region())?.get_chunk(coord, policy);
        }
        Ok(chunk)
    }

    pub fn get_chunk_at_block(&self, x: i32, y: i32, z: i32, policy: LoadPolicy) -> Result<Option<Arc<Chunk>>, RegionError> {
        self.get_chunk(ChunkCoord::from_block(x, y, z), policy)
    }

    /// Block at a world position, generating its chunk if needed.
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> Result<Block, RegionError> {
        match self.get_chunk_at_block(x, y, z, LoadPolicy::LoadOrGenerate)? {
            Some(c) => Ok(c.get_block(x, y, z)?),
            None => Ok(Block::AIR),
        }
    }

    pub fn get_block_material(&self, x: i32, y: i32, z: i32) -> Result<u16, RegionError> {
        Ok(self.get_block(x, y, z)?.id)
    }

    /// Returns the previous block.
    pub fn set_block(&self, x: i32, y: i32, z: i32, block: Block) -> Result<Block, RegionError> {
        match self.get_chunk_at_block(x, y, z, LoadPolicy::LoadOrGenerate)? {
            Some(c) => Ok(c.set_block(x, y, z, block)?),
            None => Err(RegionError::Generation(format!(
                "no chunk at block ({}, {}, {})",
                x, y, z
            ))),
        }
    }

    /// Blocking generation of every chunk within `radius` of `center`.
    /// Returns how many chunks are loaded there afterwards.
    pub fn pregenerate(&self, center: ChunkCoord, radius: i32) -> Result<usize, RegionError> {
        let mut loaded = 0;
        for dy in -radius..=radius {
            for dz in -radius..=radius {
                for dx in -radius..=radius {
                    let coord = center.offset(dx, dy, dz);
                    if self.get_chunk(coord, LoadPolicy::LoadOrGenerate)?.is_some() {
                        loaded += 1;
                    }
                }
            }
        }
        log::info!(target: "gen", "pregenerated center={:?} radius={} chunks={}", center, radius, loaded);
        Ok(loaded)
    }

    pub(crate) fn queue_generation(&self, region: &Region, index: usize) {
        if region.generator().state(index) == ColumnState::Copied {
            return;
        }
        let Some(region) = self.region(region.coord()) else {
            return;
        };
        if self.gen_pool.submit_column(region.clone(), index) {
            log::trace!(target: "gen", "generation queued region={:?} column={}", region.coord(), index);
        }
    }

    /// Border refresh for a finished range; `generate` also fills in the
    /// lateral neighbor ranges that are neither loaded nor persisted.
    pub(crate) fn touch_neighbors(&self, origin: ChunkCoord, width: usize, generate: bool) {
        self.gen_pool.submit_borders(self.self_ref.clone(), origin, width, generate);
    }

    // ---- persistence ----

    /// Pending writes shadow what is on disk.
    pub fn read_chunk(&self, coord: ChunkCoord) -> Option<ChunkRecord> {
        match self.saver.pending_chunk(coord) {
            Some(rec) => Some(ChunkRecord::clone(&rec)),
            None => self.storage.read_chunk(coord),
        }
    }

    pub fn chunk_exists(&self, coord: ChunkCoord) -> bool {
        self.saver.pending_chunk(coord).is_some() || self.storage.chunk_exists(coord)
    }

    /// Runs `f` on the column at `(cx, cz)`, loading it if needed. The
    /// column map stays locked for the duration so the column cannot be
    /// released while `f` registers chunks with it.
    pub fn with_column<R>(&self, cx: i32, cz: i32, f: impl FnOnce(Arc<Column>) -> R) -> R {
        let mut columns = self.columns.lock();
        let column = columns
            .entry((cx, cz))
            .or_insert_with(|| {
                let rec = match self.saver.pending_column(cx, cz) {
                    Some(rec) => Some(rec.as_ref().clone()),
                    None => self.storage.read_column(cx, cz),
                };
                Arc::new(match rec {
                    Some(rec) => Column::from_record(cx, cz, &rec),
                    None => Column::new(cx, cz),
                })
            })
            .clone();
        f(column)
    }

    pub fn loaded_columns(&self) -> usize {
        self.columns.lock().len()
    }

    pub fn stats(&self) -> WorldStats {
        let c = &self.ctx.counters;
        WorldStats {
            regions: self.regions.read().len(),
            loaded_chunks: c.loaded_chunks.load(Ordering::Relaxed),
            observed_chunks: c.observed_chunks.load(Ordering::Relaxed),
            generated_chunks: c.generated_chunks.load(Ordering::Relaxed),
            saved_chunks: c.saved_chunks.load(Ordering::Relaxed),
            entity_failures: c.entity_failures.load(Ordering::Relaxed),
            queued_generation: self.gen_pool.queued(),
            pending_saves: self.saver.pending_len(),
        }
    }

    /// Stops generation, writes out every loaded chunk that differs from
    /// disk and every dirty column, then closes storage.
    pub fn shutdown(&self) {
        self.gen_pool.shutdown();
        let mut chunks = 0;
        for region in self.regions() {
            for chunk in region.loaded_chunks() {
                if !chunk.take_modified() && chunk.generation() == 0 {
                    continue;
                }
                match chunk.to_record() {
                    Ok(rec) => {
                        self.saver.submit_chunk(rec);
                        chunks += 1;
                    }
                    Err(e) => {
                        log::warn!(target: "io", "skipping save coord={:?} err={}", chunk.coord(), e);
                    }
                }
            }
        }
        let mut columns = 0;
        for (&(cx, cz), column) in self.columns.lock().iter() {
            if column.take_dirty() {
                self.saver.submit_column(cx, cz, column.to_record());
                columns += 1;
            }
        }
        self.saver.shutdown();
        self.storage.close_all();
        log::info!(target: "io", "world saved chunks={} columns={}", chunks, columns);
    }
}

impl WorldAccess for World {
    fn loaded_chunk(&self, coord: ChunkCoord) -> Option<Arc<Chunk>> {
        self.loaded(coord)
    }

    fn release_column(&self, cx: i32, cz: i32) {
        let mut columns = self.columns.lock();
        let Some(column) = columns.get(&(cx, cz)) else {
            return;
        };
        if column.active_chunks() > 0 {
            return;
        }
        if let Some(column) = columns.remove(&(cx, cz)) {
            if column.take_dirty() {
                // Queued under the map lock so a reload sees the pending record.
                self.saver.submit_column(cx, cz, column.to_record());
            }
        }
    }
}
