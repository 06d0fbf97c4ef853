use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use strata_blocks::Block;
use strata_io::ChunkRecord;
use strata_world::{ChunkCoord, Stage, block_local, local_index};

use crate::block_store::BlockStore;
use crate::column::{Column, HEIGHT_UNKNOWN, HeightChange};
use crate::context::WorldContext;
use crate::error::ChunkError;
use crate::light::{LightBuffers, LightChannel};
use crate::light_work::{LightOp, LightQueues, LightWork};
use crate::observer::{ChunkObserver, ChunkSnapshot, EntityId, ObserverEntry};
use crate::populator::Populator;
use crate::region_shared::{PhysicsRequest, RegionShared};
use crate::save_state::{AtomicSaveState, Drained, SaveState};
use crate::snapshot::{Snapshotable, SnapshotableMap};

/// Block and light arrays; dropped when the chunk unloads.
pub struct ChunkStorage {
    pub blocks: BlockStore,
    pub light: LightBuffers,
}

/// Everything needed to construct a chunk, from generation or from disk.
pub struct ChunkInit {
    pub coord: ChunkCoord,
    pub blocks: BlockStore,
    pub light: LightBuffers,
    pub populated: bool,
    pub generation: u64,
}

impl ChunkInit {
    pub fn from_record(rec: &ChunkRecord, dirty_capacity: usize) -> Self {
        Self {
            coord: rec.coord,
            blocks: BlockStore::from_arrays(&rec.ids, &rec.data, dirty_capacity),
            light: LightBuffers::from_bytes(&rec.sky_light, &rec.block_light),
            populated: rec.populated,
            generation: 0,
        }
    }
}

/// What observers need to hear about since the last pre-snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirtyDelta {
    Clean,
    /// Chunk-local coordinates and the block now there.
    Blocks(Vec<(usize, usize, usize, Block)>),
    /// Too many changes, or light changed; resend the whole chunk.
    Full,
}

type ObserverMap = SnapshotableMap<EntityId, ObserverEntry>;
type EntityMap = SnapshotableMap<EntityId, Arc<dyn ChunkObserver>>;

/// One 16x16x16 cube of the world.
///
/// Block and light data live behind a single guarded entry point that
/// rejects access once the chunk is unloaded. Writes are fenced by tick
/// stage: the owning region's executor during its write stages, or the
/// main thread during the narrower main stages.
pub struct Chunk {
    coord: ChunkCoord,
    ctx: Arc<WorldContext>,
    region: Arc<RegionShared>,
    column: Arc<Column>,
    storage: RwLock<Option<ChunkStorage>>,
    save_state: AtomicSaveState,
    generation: u64,
    populated: AtomicBool,
    light_dirty: AtomicBool,
    modified: AtomicBool,
    last_observed_tick: AtomicU64,
    observer_count: AtomicUsize,
    light_work: LightQueues,
    observers: Arc<ObserverMap>,
    entities: Arc<EntityMap>,
    new_observers: Mutex<Vec<EntityId>>,
}

impl Chunk {
    pub fn new(
        init: ChunkInit,
        ctx: Arc<WorldContext>,
        region: Arc<RegionShared>,
        column: Arc<Column>,
    ) -> Arc<Chunk> {
        column.register_chunk();
        let observers: Arc<ObserverMap> = Arc::new(SnapshotableMap::new());
        let entities: Arc<EntityMap> = Arc::new(SnapshotableMap::new());
        let weak_obs = Arc::downgrade(&observers);
        let weak_obs: Weak<dyn Snapshotable> = weak_obs;
        let weak_ent = Arc::downgrade(&entities);
        let weak_ent: Weak<dyn Snapshotable> = weak_ent;
        region.snapshots.register(weak_obs);
        region.snapshots.register(weak_ent);
        let tick = ctx.clock.tick();
        Arc::new(Chunk {
            coord: init.coord,
            ctx,
            region,
            column,
            storage: RwLock::new(Some(ChunkStorage {
                blocks: init.blocks,
                light: init.light,
            })),
            save_state: AtomicSaveState::default(),
            generation: init.generation,
            populated: AtomicBool::new(init.populated),
            light_dirty: AtomicBool::new(false),
            modified: AtomicBool::new(false),
            last_observed_tick: AtomicU64::new(tick),
            observer_count: AtomicUsize::new(0),
            light_work: LightQueues::default(),
            observers,
            entities,
            new_observers: Mutex::new(Vec::new()),
        })
    }

    #[inline]
    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    pub fn column(&self) -> &Arc<Column> {
        &self.column
    }

    pub fn region(&self) -> &Arc<RegionShared> {
        &self.region
    }

    pub fn context(&self) -> &Arc<WorldContext> {
        &self.ctx
    }

    /// Set by the region generator; 0 for chunks read from disk.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn save_state(&self) -> SaveState {
        self.save_state.get()
    }

    pub fn is_loaded(&self) -> bool {
        !self.save_state.get().is_unloaded()
    }

    pub fn contains_block(&self, x: i32, y: i32, z: i32) -> bool {
        ChunkCoord::from_block(x, y, z) == self.coord
    }

    /// The one guarded entry point to block and light data.
    fn with_storage<R>(&self, f: impl FnOnce(&ChunkStorage) -> R) -> Result<R, ChunkError> {
        let guard = self.storage.read_recursive();
        match guard.as_ref() {
            Some(s) if self.is_loaded() => Ok(f(s)),
            _ => Err(ChunkError::StaleChunk(self.coord)),
        }
    }

    fn ensure_loaded(&self) -> Result<(), ChunkError> {
        if self.is_loaded() {
            Ok(())
        } else {
            Err(ChunkError::StaleChunk(self.coord))
        }
    }

    fn local(&self, x: i32, y: i32, z: i32) -> Result<(usize, usize, usize), ChunkError> {
        if !self.contains_block(x, y, z) {
            return Err(ChunkError::OutOfBounds { x, y, z });
        }
        Ok(block_local(x, y, z))
    }

    /// Global stages are sequenced across regions, so any executor may
    /// write there.
    fn check_block_write(&self) -> Result<(), ChunkError> {
        let clock = &self.ctx.clock;
        if clock
            .stage()
            .intersects(Stage::GLOBAL_PHYSICS | Stage::GLOBAL_DYNAMIC_BLOCKS)
        {
            return Ok(());
        }
        clock.check(self.region.owner(), Stage::REGION_WRITE, Stage::MAIN_WRITE)?;
        Ok(())
    }

    fn check_light_write(&self) -> Result<(), ChunkError> {
        self.ctx
            .clock
            .check(self.region.owner(), Stage::REGION_WRITE, Stage::MAIN_LIGHT_WRITE)?;
        Ok(())
    }

    // ---- blocks ----

    pub fn get_block(&self, x: i32, y: i32, z: i32) -> Result<Block, ChunkError> {
        let (lx, ly, lz) = self.local(x, y, z)?;
        self.with_storage(|s| s.blocks.get(lx, ly, lz))
    }

    pub fn get_block_material(&self, x: i32, y: i32, z: i32) -> Result<u16, ChunkError> {
        self.get_block(x, y, z).map(|b| b.id)
    }

    /// Chunk-local read used by lighting and population.
    pub fn block_local(&self, lx: usize, ly: usize, lz: usize) -> Result<Block, ChunkError> {
        self.with_storage(|s| s.blocks.get(lx, ly, lz))
    }

    /// Writes `block` and returns what was there.
    pub fn set_block(&self, x: i32, y: i32, z: i32, block: Block) -> Result<Block, ChunkError> {
        self.check_block_write()?;
        let (lx, ly, lz) = self.local(x, y, z)?;
        let old = self.with_storage(|s| s.blocks.get_and_set(lx, ly, lz, block))?;
        if old != block {
            self.block_changed(x, y, z, old, block);
        }
        Ok(old)
    }

    pub fn compare_and_set_block(
        &self,
        x: i32,
        y: i32,
        z: i32,
        expect: Block,
        block: Block,
    ) -> Result<bool, ChunkError> {
        self.check_block_write()?;
        let (lx, ly, lz) = self.local(x, y, z)?;
        let ok = self.with_storage(|s| s.blocks.compare_and_set(lx, ly, lz, expect, block))?;
        if ok && expect != block {
            self.block_changed(x, y, z, expect, block);
        }
        Ok(ok)
    }

    /// Returns the old field value.
    pub fn set_block_data_field(&self, x: i32, y: i32, z: i32, mask: u16, value: u16) -> Result<u16, ChunkError> {
        self.write_field(x, y, z, |s, lx, ly, lz| s.blocks.set_field(lx, ly, lz, mask, value))
    }

    pub fn add_block_data_field(&self, x: i32, y: i32, z: i32, mask: u16, delta: u16) -> Result<u16, ChunkError> {
        self.write_field(x, y, z, |s, lx, ly, lz| s.blocks.add_field(lx, ly, lz, mask, delta))
    }

    pub fn is_block_data_field_set(&self, x: i32, y: i32, z: i32, mask: u16) -> Result<bool, ChunkError> {
        Ok(self.get_block(x, y, z)?.data & mask != 0)
    }

    fn write_field(
        &self,
        x: i32,
        y: i32,
        z: i32,
        op: impl FnOnce(&ChunkStorage, usize, usize, usize) -> u16,
    ) -> Result<u16, ChunkError> {
        self.check_block_write()?;
        let (lx, ly, lz) = self.local(x, y, z)?;
        let (before, old_field, after) = self.with_storage(|s| {
            let before = s.blocks.get(lx, ly, lz);
            let old_field = op(s, lx, ly, lz);
            (before, old_field, s.blocks.get(lx, ly, lz))
        })?;
        if before != after {
            self.block_changed(x, y, z, before, after);
        }
        Ok(old_field)
    }

    /// Side effects of a block write that changed something. Runs without
    /// holding the storage guard.
    fn block_changed(&self, x: i32, y: i32, z: i32, old: Block, new: Block) {
        let reg = &self.ctx.registry;
        self.modified.store(true, Ordering::Release);
        self.region.dirty_queue.push(self.coord);

        if self.is_populated() {
            let range = reg.physics_range(old.id, new.id).max(1);
            self.region.queue_physics(PhysicsRequest { x, y, z, range });
        }
        if old.id == new.id {
            return;
        }
        if reg.dynamic(old.id).is_some() {
            self.region.reset_dynamic(x, y, z);
        }
        if let Some(delay) = reg.dynamic(new.id).and_then(|d| d.first_delay_ms) {
            self.region
                .queue_dynamic(x, y, z, self.ctx.time_ms() + delay, 0);
        }

        let (lx, ly, lz) = block_local(x, y, z);
        let i = local_index(lx, ly, lz) as u16;
        let change = self.column.notify_block_change(lx, y, lz, reg.is_surface(new.id), |cy| {
            self.surface_at(x, cy, z)
        });

        let new_occludes = reg.occludes(new.id);
        let light_changed = reg.occludes(old.id) != new_occludes
            || reg.light_level(old.id) != reg.light_level(new.id)
            || reg.opacity(old.id) != reg.opacity(new.id);
        if light_changed {
            self.light_work
                .add_update(LightChannel::Block, i, reg.light_level(new.id));
            if !new_occludes {
                self.light_work.add_op(LightChannel::Block, i, LightOp::Refresh);
            }
            self.register_light(LightChannel::Block);
        }

        let height = self.column.surface_height(lx, lz);
        if new_occludes {
            self.light_work.add_update(LightChannel::Sky, i, 0);
        } else if height == HEIGHT_UNKNOWN || y > height {
            self.light_work.add_update(LightChannel::Sky, i, 15);
        } else {
            self.light_work.add_op(LightChannel::Sky, i, LightOp::Refresh);
        }
        self.register_light(LightChannel::Sky);

        if let Some(HeightChange { old: from, new: to }) = change {
            if from == HEIGHT_UNKNOWN {
                return;
            }
            if to > from {
                for cy in from + 1..to {
                    self.sky_update_at(x, cy, z, 0);
                }
            } else {
                for cy in to + 1..=from {
                    if cy != y {
                        self.sky_update_at(x, cy, z, 15);
                    }
                }
            }
        }
    }

    /// Surface test for the height scan; `None` where nothing is loaded.
    fn surface_at(&self, x: i32, y: i32, z: i32) -> Option<bool> {
        let id = if self.contains_block(x, y, z) {
            self.get_block(x, y, z).ok()?.id
        } else {
            self.ctx.chunk_at_block(x, y, z)?.get_block(x, y, z).ok()?.id
        };
        Some(self.ctx.registry.is_surface(id))
    }

    fn sky_update_at(&self, x: i32, y: i32, z: i32, value: u8) {
        let (lx, ly, lz) = block_local(x, y, z);
        if self.contains_block(x, y, z) {
            let _ = self.add_light_update(LightChannel::Sky, lx, ly, lz, value);
        } else if let Some(c) = self.ctx.chunk_at_block(x, y, z) {
            let _ = c.add_light_update(LightChannel::Sky, lx, ly, lz, value);
        }
    }

    // ---- light ----

    pub fn block_light(&self, x: i32, y: i32, z: i32) -> Result<u8, ChunkError> {
        let (lx, ly, lz) = self.local(x, y, z)?;
        self.light(LightChannel::Block, lx, ly, lz)
    }

    pub fn sky_light(&self, x: i32, y: i32, z: i32) -> Result<u8, ChunkError> {
        let (lx, ly, lz) = self.local(x, y, z)?;
        self.light(LightChannel::Sky, lx, ly, lz)
    }

    #[inline]
    pub fn light(&self, channel: LightChannel, lx: usize, ly: usize, lz: usize) -> Result<u8, ChunkError> {
        self.with_storage(|s| s.light.get(channel, lx, ly, lz))
    }

    /// Writes a light value and queues the propagation it implies. Returns
    /// the previous value.
    pub fn set_light_sync(
        &self,
        channel: LightChannel,
        lx: usize,
        ly: usize,
        lz: usize,
        value: u8,
    ) -> Result<u8, ChunkError> {
        self.check_light_write()?;
        let value = value.min(15);
        let old = self.with_storage(|s| s.light.set(channel, lx, ly, lz, value))?;
        if old != value {
            let i = local_index(lx, ly, lz) as u16;
            let op = if value > old { LightOp::Greater } else { LightOp::Lesser };
            self.light_work.add_op(channel, i, op);
            self.register_light(channel);
            self.light_dirty.store(true, Ordering::Release);
            self.modified.store(true, Ordering::Release);
            self.region.dirty_queue.push(self.coord);
        }
        Ok(old)
    }

    /// Queues an op; resolution happens on the lighting engine's schedule.
    pub fn add_light_op(&self, channel: LightChannel, lx: usize, ly: usize, lz: usize, op: LightOp) -> Result<(), ChunkError> {
        self.ensure_loaded()?;
        self.light_work.add_op(channel, local_index(lx, ly, lz) as u16, op);
        self.register_light(channel);
        Ok(())
    }

    /// Queues a direct value write, applied before any pending op.
    pub fn add_light_update(&self, channel: LightChannel, lx: usize, ly: usize, lz: usize, value: u8) -> Result<(), ChunkError> {
        self.ensure_loaded()?;
        self.light_work
            .add_update(channel, local_index(lx, ly, lz) as u16, value);
        self.register_light(channel);
        Ok(())
    }

    fn register_light(&self, channel: LightChannel) {
        if self.light_work.try_register(channel) {
            self.ctx.light_queue(channel).push(self.coord);
        }
    }

    /// Hands the pending work of one channel to the engine. Clears the
    /// registration first so work queued meanwhile registers again.
    pub fn take_light_work(&self, channel: LightChannel) -> LightWork {
        self.light_work.unregister(channel);
        self.light_work.take(channel)
    }

    /// Registered with a lighting queue and not yet fully resolved.
    pub fn is_lighting(&self) -> bool {
        self.light_work.is_registered()
    }

    /// Zeroes both channels and drops pending work. Used before a full
    /// re-initialization.
    pub fn reset_light(&self) -> Result<(), ChunkError> {
        self.check_light_write()?;
        self.with_storage(|s| {
            s.light.sky.fill(0);
            s.light.block.fill(0);
        })?;
        self.light_work.clear();
        self.light_dirty.store(true, Ordering::Release);
        self.region.dirty_queue.push(self.coord);
        Ok(())
    }

    pub fn is_light_dirty(&self) -> bool {
        self.light_dirty.load(Ordering::Acquire)
    }

    // ---- dirty tracking ----

    pub fn is_dirty(&self) -> bool {
        self.is_light_dirty()
            || self
                .with_storage(|s| s.blocks.is_dirty())
                .unwrap_or(false)
    }

    /// Collects and clears the changes since the last call.
    pub fn drain_dirty(&self) -> Result<DirtyDelta, ChunkError> {
        self.with_storage(|s| {
            let light = self.light_dirty.swap(false, Ordering::AcqRel);
            let delta = if light || s.blocks.is_dirty_overflow() {
                DirtyDelta::Full
            } else if s.blocks.is_dirty() {
                let blocks = (0..s.blocks.dirty_len())
                    .filter_map(|n| s.blocks.dirty_block_at(n))
                    .map(|(x, y, z)| (x, y, z, s.blocks.get(x, y, z)))
                    .collect();
                DirtyDelta::Blocks(blocks)
            } else {
                DirtyDelta::Clean
            };
            s.blocks.reset_dirty();
            delta
        })
    }

    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::Acquire)
    }

    pub fn take_modified(&self) -> bool {
        self.modified.swap(false, Ordering::AcqRel)
    }

    /// Compresses an idle uniform store back to its single-value form.
    pub fn compress_if_required(&self) -> Result<bool, ChunkError> {
        self.check_block_write()?;
        let mut guard = self.storage.write();
        let Some(s) = guard.as_mut() else {
            return Err(ChunkError::StaleChunk(self.coord));
        };
        if s.blocks.is_dirty() {
            return Ok(false);
        }
        match s.blocks.compress() {
            Some(c) => {
                s.blocks = c;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ---- save state ----

    /// Requests persistence at the next snapshot.
    pub fn save(&self) -> Result<(), ChunkError> {
        if !self.save_state.mark_save() {
            return Err(ChunkError::StaleChunk(self.coord));
        }
        self.region.save_queue.push(self.coord);
        Ok(())
    }

    /// Requests removal at the next snapshot, optionally saving first.
    pub fn unload(&self, persist: bool) -> Result<(), ChunkError> {
        if !self.save_state.mark_unload(persist) {
            return Err(ChunkError::StaleChunk(self.coord));
        }
        self.region.save_queue.push(self.coord);
        Ok(())
    }

    /// Returns true if the chunk was already unloaded; the caller must
    /// drop this handle and fetch the chunk again.
    pub fn cancel_unload(&self) -> bool {
        self.save_state.cancel_unload()
    }

    pub fn drain_save_state(&self) -> Drained {
        self.save_state.drain_for_snapshot()
    }

    /// Final teardown: region executor during the snapshot stage, or the
    /// main thread while idle.
    pub fn set_unloaded(&self) -> Result<(), ChunkError> {
        self.ctx
            .clock
            .check(self.region.owner(), Stage::SNAPSHOT, Stage::SNAPSHOT | Stage::IDLE)?;
        self.teardown()
    }

    /// Teardown for a chunk that never made it into the grid.
    pub fn set_unloaded_unchecked(&self) {
        let _ = self.teardown();
    }

    fn teardown(&self) -> Result<(), ChunkError> {
        if self.save_state.set_unloaded().is_none() {
            return Err(ChunkError::DoubleUnload(self.coord));
        }
        *self.storage.write() = None;
        self.light_work.clear();
        if self.observer_count.swap(0, Ordering::AcqRel) > 0 {
            self.ctx
                .counters
                .observed_chunks
                .fetch_sub(1, Ordering::AcqRel);
        }
        if self.column.deregister_chunk() {
            let (cx, cz) = self.column.coords();
            if let Some(world) = self.ctx.world() {
                world.release_column(cx, cz);
            }
        }
        log::trace!(target: "region", "chunk unloaded coord={:?}", self.coord);
        Ok(())
    }

    // ---- population ----

    pub fn is_populated(&self) -> bool {
        self.populated.load(Ordering::Acquire)
    }

    pub fn set_populated(&self, populated: bool) {
        self.populated.store(populated, Ordering::Release);
    }

    /// Runs every populator once. A failing populator is logged and the
    /// rest still run; the chunk ends up populated either way. Returns
    /// whether anything ran, in which case the caller re-initializes light.
    pub fn populate(&self, force: bool, populators: &[Arc<dyn Populator>]) -> Result<bool, ChunkError> {
        self.check_block_write()?;
        self.ensure_loaded()?;
        if self.is_populated() && !force {
            return Ok(false);
        }
        for p in populators {
            if !self.is_loaded() {
                log::debug!(target: "gen", "population abandoned coord={:?}", self.coord);
                return Ok(false);
            }
            if let Err(e) = p.populate(self) {
                log::error!(
                    target: "gen",
                    "populator failed name={} coord={:?} err={}",
                    p.name(),
                    self.coord,
                    e
                );
            }
        }
        self.set_populated(true);
        self.modified.store(true, Ordering::Release);
        Ok(true)
    }

    // ---- observers and entities ----

    /// Adds or refreshes an observer. Cancels a pending unload and restarts
    /// the reap cooldown. Returns true for a new observer.
    pub fn refresh_observer(&self, observer: Arc<dyn ChunkObserver>) -> Result<bool, ChunkError> {
        self.ensure_loaded()?;
        if self.cancel_unload() {
            return Err(ChunkError::StaleChunk(self.coord));
        }
        let id = observer.id();
        let distance = observer.view_distance();
        let (prev, _) = self
            .observers
            .insert_counted(id, ObserverEntry { observer, distance });
        self.last_observed_tick
            .store(self.ctx.clock.tick(), Ordering::Release);
        if prev.is_some() {
            return Ok(false);
        }
        if self.observer_count.fetch_add(1, Ordering::AcqRel) == 0 {
            self.ctx
                .counters
                .observed_chunks
                .fetch_add(1, Ordering::AcqRel);
        }
        self.new_observers.lock().push(id);
        if !self.is_populated() {
            self.region.priority_populate_queue.push(self.coord);
        }
        Ok(true)
    }

    pub fn remove_observer(&self, id: EntityId) -> bool {
        let (prev, _) = self.observers.remove_counted(&id);
        if prev.is_none() {
            return false;
        }
        self.last_observed_tick
            .store(self.ctx.clock.tick(), Ordering::Release);
        let was = self
            .observer_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if was == Ok(1) {
            self.ctx
                .counters
                .observed_chunks
                .fetch_sub(1, Ordering::AcqRel);
        }
        true
    }

    /// Drops observers that went offline or out of range.
    pub fn update_expired_observers(&self) -> usize {
        let expired: Vec<EntityId> = self
            .observers
            .live_entries()
            .into_iter()
            .filter(|(_, e)| e.is_expired(self.coord))
            .map(|(id, _)| id)
            .collect();
        expired
            .into_iter()
            .filter(|id| self.remove_observer(*id))
            .count()
    }

    pub fn live_observers(&self) -> Vec<ObserverEntry> {
        self.observers.live_values()
    }

    pub fn is_observed(&self) -> bool {
        self.observer_count.load(Ordering::Acquire) > 0
    }

    /// Observers added since the last call; they are owed a full chunk.
    pub fn take_new_observers(&self) -> Vec<EntityId> {
        std::mem::take(&mut *self.new_observers.lock())
    }

    pub fn add_entity(&self, entity: Arc<dyn ChunkObserver>) -> Result<(), ChunkError> {
        self.ensure_loaded()?;
        self.entities.insert(entity.id(), entity);
        Ok(())
    }

    pub fn remove_entity(&self, id: EntityId) -> bool {
        self.entities.remove(&id).is_some()
    }

    pub fn live_entities(&self) -> Vec<Arc<dyn ChunkObserver>> {
        self.entities.live_values()
    }

    pub fn entities_snapshot(&self) -> Arc<HashMap<EntityId, Arc<dyn ChunkObserver>>> {
        self.entities.snapshot()
    }

    pub fn has_entities(&self) -> bool {
        self.entities.live_len() > 0
    }

    /// Unobserved for at least `delay` ticks and not mid-lighting.
    pub fn is_reapable(&self, tick: u64, delay: u64) -> bool {
        !self.is_observed()
            && !self.is_lighting()
            && tick.saturating_sub(self.last_observed_tick.load(Ordering::Acquire)) >= delay
    }

    // ---- snapshots and persistence ----

    pub fn snapshot(&self, with_entities: bool) -> Result<ChunkSnapshot, ChunkError> {
        let entities = if with_entities {
            let mut ids: Vec<EntityId> = self.entities_snapshot().keys().copied().collect();
            ids.sort();
            ids
        } else {
            Vec::new()
        };
        self.with_storage(|s| {
            let (ids, data) = s.blocks.to_arrays();
            ChunkSnapshot {
                coord: self.coord,
                populated: self.is_populated(),
                ids,
                data,
                sky_light: s.light.sky.to_bytes(),
                block_light: s.light.block.to_bytes(),
                entities,
            }
        })
    }

    pub fn to_record(&self) -> Result<ChunkRecord, ChunkError> {
        self.with_storage(|s| {
            let (ids, data) = s.blocks.to_arrays();
            ChunkRecord {
                coord: self.coord,
                populated: self.is_populated(),
                ids,
                data,
                sky_light: s.light.sky.to_bytes(),
                block_light: s.light.block.to_bytes(),
            }
        })
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("coord", &self.coord)
            .field("state", &self.save_state.get())
            .field("generation", &self.generation)
            .field("populated", &self.is_populated())
            .finish()
    }
}
