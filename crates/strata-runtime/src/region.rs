use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_channel::{Receiver, Sender, bounded};
use hashbrown::HashSet;
use parking_lot::{Mutex, RwLock};
use strata_blocks::{Block, BlockUpdate, UpdateOutcome};
use strata_chunk::{
    Chunk, ChunkError, ChunkInit, ChunkSnapshot, DirtyDelta, DynamicUpdate, PhysicsRequest, RegionShared,
};
use strata_lighting::init_chunk_lighting;
use strata_world::{ChunkCoord, REGION_CHUNKS, RegionCoord};

use crate::dynamic_tree::TimedUpdates;
use crate::error::RegionError;
use crate::generator::RegionGenerator;
use crate::world::World;

const SLOTS: usize = REGION_CHUNKS * REGION_CHUNKS * REGION_CHUNKS;

/// Number of distinct cross-region sequences; regions with the same
/// coordinate parity share one and never touch each other's neighbors.
pub const SEQUENCES: i32 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Only what is already in the grid.
    NoLoad,
    /// Grid, then disk.
    LoadOnly,
    /// Grid, then disk, then blocking generation.
    LoadOrGenerate,
    /// Grid, then disk; otherwise queue background generation and return
    /// nothing for now.
    LoadOrQueueGenerate,
}

struct SnapshotRequest {
    coord: ChunkCoord,
    with_entities: bool,
    render: bool,
    tx: Sender<ChunkSnapshot>,
}

/// A fixed 16x16x16 grid of chunk slots plus the per-tick stage entry
/// points the scheduler drives.
///
/// Slots only change through [`Region::publish`] and the snapshot stage.
/// Stage methods bind the calling thread as the region's executor before
/// touching chunks.
pub struct Region {
    coord: RegionCoord,
    shared: Arc<RegionShared>,
    world: Weak<World>,
    slots: Box<[RwLock<Option<Arc<Chunk>>>]>,
    count: AtomicUsize,
    generator: RegionGenerator,
    sequence: i32,
    cursor: AtomicUsize,
    retired: AtomicBool,
    pending_jobs: AtomicUsize,
    dt_ms: AtomicU64,
    futures: Mutex<Vec<SnapshotRequest>>,
    global_dynamic: Mutex<Vec<DynamicUpdate>>,
}

impl Region {
    pub fn new(coord: RegionCoord, world: Weak<World>, width: usize) -> Result<Self, RegionError> {
        Ok(Self {
            coord,
            shared: Arc::new(RegionShared::new(coord, Box::new(TimedUpdates::new()))),
            world,
            slots: (0..SLOTS).map(|_| RwLock::new(None)).collect(),
            count: AtomicUsize::new(0),
            generator: RegionGenerator::new(width)?,
            sequence: (coord.rx & 1) | ((coord.ry & 1) << 1) | ((coord.rz & 1) << 2),
            cursor: AtomicUsize::new(0),
            retired: AtomicBool::new(false),
            pending_jobs: AtomicUsize::new(0),
            dt_ms: AtomicU64::new(0),
            futures: Mutex::new(Vec::new()),
            global_dynamic: Mutex::new(Vec::new()),
        })
    }

    #[inline]
    pub fn coord(&self) -> RegionCoord {
        self.coord
    }

    pub fn shared(&self) -> &Arc<RegionShared> {
        &self.shared
    }

    pub fn generator(&self) -> &RegionGenerator {
        &self.generator
    }

    /// Cross-region sequence this region runs its global passes in.
    pub fn sequence(&self) -> i32 {
        self.sequence
    }

    pub fn world(&self) -> Result<Arc<World>, RegionError> {
        self.world.upgrade().ok_or(RegionError::WorldGone)
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// No chunks and no background work in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.pending_jobs.load(Ordering::Acquire) == 0
    }

    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    pub(crate) fn job_started(&self) {
        self.pending_jobs.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn job_finished(&self) {
        self.pending_jobs.fetch_sub(1, Ordering::AcqRel);
    }

    fn slot(&self, coord: ChunkCoord) -> &RwLock<Option<Arc<Chunk>>> {
        let (x, y, z) = coord.region_local();
        &self.slots[(y * REGION_CHUNKS + z) * REGION_CHUNKS + x]
    }

    pub fn contains(&self, coord: ChunkCoord) -> bool {
        coord.region() == self.coord
    }

    /// The chunk in the grid, if any and still loaded.
    pub fn loaded_chunk(&self, coord: ChunkCoord) -> Option<Arc<Chunk>> {
        if !self.contains(coord) {
            return None;
        }
        self.slot(coord).read().clone().filter(|c| c.is_loaded())
    }

    pub fn loaded_chunks(&self) -> Vec<Arc<Chunk>> {
        self.slots
            .iter()
            .filter_map(|s| s.read().clone())
            .filter(|c| c.is_loaded())
            .collect()
    }

    /// Installs `chunk` in its slot unless a loaded chunk is already there.
    /// Returns the chunk that ended up in the slot and whether it is the
    /// one passed in; the loser is torn down.
    pub fn publish(&self, chunk: Arc<Chunk>) -> (Arc<Chunk>, bool) {
        let mut slot = self.slot(chunk.coord()).write();
        if let Some(existing) = slot.as_ref() {
            if existing.is_loaded() {
                let existing = existing.clone();
                drop(slot);
                chunk.set_unloaded_unchecked();
                return (existing, false);
            }
        } else {
            self.count.fetch_add(1, Ordering::AcqRel);
        }
        *slot = Some(chunk.clone());
        drop(slot);
        chunk
            .context()
            .counters
            .loaded_chunks
            .fetch_add(1, Ordering::Relaxed);
        if !chunk.is_populated() {
            self.shared.populate_queue.push(chunk.coord());
        }
        (chunk, true)
    }

    /// Clears the slot if it still holds exactly `chunk`.
    fn remove(&self, chunk: &Arc<Chunk>) -> bool {
        let mut slot = self.slot(chunk.coord()).write();
        match slot.as_ref() {
            Some(c) if Arc::ptr_eq(c, chunk) => {
                *slot = None;
                self.count.fetch_sub(1, Ordering::AcqRel);
                chunk
                    .context()
                    .counters
                    .loaded_chunks
                    .fetch_sub(1, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    // ---- chunk access ----

    pub fn get_chunk(&self, coord: ChunkCoord, policy: LoadPolicy) -> Result<Option<Arc<Chunk>>, RegionError> {
        if let Some(c) = self.loaded_chunk(coord) {
            return Ok(Some(c));
        }
        if policy == LoadPolicy::NoLoad || !self.contains(coord) {
            return Ok(None);
        }
        let world = self.world()?;
        if let Some(c) = self.load(&world, coord) {
            return Ok(Some(c));
        }
        let (lx, _, lz) = coord.region_local();
        let index = self.generator.column_index(lx, lz);
        match policy {
            LoadPolicy::LoadOrGenerate => {
                self.generator.generate(&world, self, index, true)?;
                Ok(self.loaded_chunk(coord))
            }
            LoadPolicy::LoadOrQueueGenerate => {
                world.queue_generation(self, index);
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// Reads the chunk from disk and publishes it. Missing and corrupt
    /// records both come back as `None`.
    fn load(&self, world: &World, coord: ChunkCoord) -> Option<Arc<Chunk>> {
        let rec = world.read_chunk(coord)?;
        let ctx = world.context();
        let init = ChunkInit::from_record(&rec, ctx.config.dirty_capacity);
        let _read = world.snapshot_lock().read();
        if self.is_retired() {
            return None;
        }
        let chunk = world.with_column(coord.cx, coord.cz, |col| {
            Chunk::new(init, ctx.clone(), self.shared.clone(), col)
        });
        let (chunk, won) = self.publish(chunk);
        if won {
            log::trace!(target: "io", "chunk loaded coord={:?}", coord);
        }
        Some(chunk)
    }

    /// Resolves on the next pre-snapshot with a copy of the chunk, or
    /// disconnects if the chunk is not loaded by then. `render` includes
    /// the light arrays.
    pub fn get_future_snapshot(&self, coord: ChunkCoord, with_entities: bool, render: bool) -> Receiver<ChunkSnapshot> {
        let (tx, rx) = bounded(1);
        self.futures.lock().push(SnapshotRequest {
            coord,
            with_entities,
            render,
            tx,
        });
        rx
    }

    // ---- tick stages ----

    pub fn start_tick(&self, dt_ms: u64) -> Result<(), RegionError> {
        self.shared.bind_owner();
        self.dt_ms.store(dt_ms, Ordering::Release);
        let world = self.world()?;
        let budget = world.context().config.limits.populate_per_tick;
        let wanted = self.shared.priority_populate_queue.drain(budget);
        self.populate(&world, wanted)?;
        Ok(())
    }

    fn check_sequence(sequence: i32) -> Result<(), RegionError> {
        if (-1..SEQUENCES).contains(&sequence) {
            Ok(())
        } else {
            Err(RegionError::SequenceMismatch {
                expected: SEQUENCES,
                got: sequence,
            })
        }
    }

    /// `-1` runs the local pass; otherwise the global pass runs if
    /// `sequence` is this region's.
    pub fn run_physics(&self, sequence: i32) -> Result<usize, RegionError> {
        Self::check_sequence(sequence)?;
        self.shared.bind_owner();
        let requests = if sequence == -1 {
            self.shared.physics_local.drain_all()
        } else if sequence == self.sequence {
            self.shared.physics_global.drain_all()
        } else {
            return Ok(0);
        };
        if requests.is_empty() {
            return Ok(0);
        }
        let world = self.world()?;
        let now = world.context().time_ms();
        let mut n = 0;
        for req in requests {
            n += self.apply_physics(&world, req, now)?;
        }
        Ok(n)
    }

    fn apply_physics(&self, world: &World, req: PhysicsRequest, now: u64) -> Result<usize, RegionError> {
        let reg = &world.context().registry;
        let r = i32::from(req.range);
        let mut n = 0;
        for dy in -r..=r {
            for dz in -r..=r {
                for dx in -r..=r {
                    if (dx, dy, dz) == (0, 0, 0) {
                        continue;
                    }
                    let (x, y, z) = (req.x + dx, req.y + dy, req.z + dz);
                    let Some(chunk) = world.loaded(ChunkCoord::from_block(x, y, z)) else {
                        continue;
                    };
                    let block = chunk.get_block(x, y, z)?;
                    let Some(behavior) = reg.dynamic(block.id) else {
                        continue;
                    };
                    let outcome = (behavior.update)(&BlockUpdate {
                        x,
                        y,
                        z,
                        block,
                        time: now,
                        data: 0,
                    });
                    Self::apply_outcome(&chunk, x, y, z, block, outcome)?;
                    n += 1;
                }
            }
        }
        Ok(n)
    }

    fn apply_outcome(chunk: &Chunk, x: i32, y: i32, z: i32, seen: Block, outcome: UpdateOutcome) -> Result<(), ChunkError> {
        if let Some(new) = outcome.set {
            if !chunk.compare_and_set_block(x, y, z, seen, new)? {
                return Ok(());
            }
        }
        if let Some(at) = outcome.reschedule_at {
            chunk.region().queue_dynamic(x, y, z, at, 0);
        }
        Ok(())
    }

    /// Due scheduled updates. The local pass runs those whose effect stays
    /// inside the region and holds the rest for the global pass.
    pub fn run_dynamic_updates(&self, time: u64, sequence: i32) -> Result<usize, RegionError> {
        Self::check_sequence(sequence)?;
        self.shared.bind_owner();
        let world = self.world()?;
        let reg = &world.context().registry;
        let updates = if sequence == -1 {
            let due = self.shared.dynamic.lock().drain_due(time);
            let mut local = Vec::with_capacity(due.len());
            let mut global = self.global_dynamic.lock();
            for u in due {
                let range = world
                    .loaded(ChunkCoord::from_block(u.x, u.y, u.z))
                    .and_then(|c| c.get_block(u.x, u.y, u.z).ok())
                    .and_then(|b| reg.dynamic(b.id))
                    .map(|d| d.range)
                    .unwrap_or(0);
                if self.shared.contains_cube(u.x, u.y, u.z, range) {
                    local.push(u);
                } else {
                    global.push(u);
                }
            }
            local
        } else if sequence == self.sequence {
            std::mem::take(&mut *self.global_dynamic.lock())
        } else {
            return Ok(0);
        };
        let mut n = 0;
        for u in updates {
            let Some(chunk) = world.loaded(ChunkCoord::from_block(u.x, u.y, u.z)) else {
                continue;
            };
            let block = chunk.get_block(u.x, u.y, u.z)?;
            let Some(behavior) = reg.dynamic(block.id) else {
                continue;
            };
            let outcome = (behavior.update)(&BlockUpdate {
                x: u.x,
                y: u.y,
                z: u.z,
                block,
                time,
                data: u.data,
            });
            Self::apply_outcome(&chunk, u.x, u.y, u.z, block, outcome)?;
            n += 1;
        }
        Ok(n)
    }

    /// Bounded sweep: population, compression, reaping, and autosave.
    pub fn finalize(&self) -> Result<(), RegionError> {
        self.shared.bind_owner();
        let world = self.world()?;
        let ctx = world.context();
        let limits = &ctx.config.limits;
        let tick = ctx.clock.tick();

        let wanted = self.shared.populate_queue.drain(limits.populate_per_tick);
        self.populate(&world, wanted)?;

        let mut visited = 0;
        let mut reaped = 0;
        let mut steps = 0;
        while visited < limits.reap_per_tick && steps < SLOTS {
            let i = self.cursor.fetch_add(1, Ordering::Relaxed) % SLOTS;
            steps += 1;
            let Some(chunk) = self.slots[i].read().clone() else {
                continue;
            };
            if !chunk.is_loaded() {
                continue;
            }
            visited += 1;
            chunk.compress_if_required()?;
            if reaped < limits.unload_per_tick
                && !chunk.has_entities()
                && chunk.is_reapable(tick, limits.reap_delay_ticks)
            {
                chunk.unload(chunk.is_modified() || chunk.generation() != 0)?;
                reaped += 1;
            } else if !chunk.is_populated() {
                self.shared.populate_queue.push(chunk.coord());
            }
        }
        if reaped > 0 {
            log::debug!(target: "region", "reaping region={:?} chunks={}", self.coord, reaped);
        }

        if limits.autosave_ticks > 0 && tick > 0 && tick % limits.autosave_ticks == 0 {
            for chunk in self.loaded_chunks() {
                if chunk.is_modified() {
                    chunk.save()?;
                }
            }
        }
        Ok(())
    }

    fn populate(&self, world: &World, coords: Vec<ChunkCoord>) -> Result<(), RegionError> {
        if coords.is_empty() {
            return Ok(());
        }
        let populators = world.populators();
        for coord in coords {
            let Some(chunk) = self.loaded_chunk(coord) else {
                continue;
            };
            if chunk.populate(false, &populators)? {
                init_chunk_lighting(&chunk)?;
            }
        }
        Ok(())
    }

    /// Pushes this tick's changes to observers and fulfills snapshot
    /// requests.
    pub fn pre_snapshot(&self) -> Result<(), RegionError> {
        self.shared.bind_owner();
        let dirty: HashSet<ChunkCoord> = self.shared.dirty_queue.drain_all().into_iter().collect();
        for chunk in self.loaded_chunks() {
            let coord = chunk.coord();
            chunk.update_expired_observers();
            for e in chunk.live_entities() {
                if !e.is_online() || e.position() != coord {
                    chunk.remove_entity(e.id());
                }
            }
            let fresh = chunk.take_new_observers();
            let delta = if dirty.contains(&coord) {
                chunk.drain_dirty()?
            } else {
                DirtyDelta::Clean
            };
            if fresh.is_empty() && delta == DirtyDelta::Clean {
                continue;
            }
            let mut full: Option<ChunkSnapshot> = None;
            for entry in chunk.live_observers() {
                let Some(sync) = entry.observer.sync() else {
                    continue;
                };
                if delta == DirtyDelta::Full || fresh.contains(&entry.observer.id()) {
                    if full.is_none() {
                        full = Some(chunk.snapshot(false)?);
                    }
                    if let Some(snap) = full.as_ref() {
                        sync.on_chunk_full_resend(snap);
                    }
                } else if let DirtyDelta::Blocks(blocks) = &delta {
                    for &(x, y, z, b) in blocks {
                        sync.on_block_delta(coord, x, y, z, b);
                    }
                }
            }
        }

        let requests = std::mem::take(&mut *self.futures.lock());
        for req in requests {
            let Some(chunk) = self.loaded_chunk(req.coord) else {
                continue;
            };
            let mut snap = chunk.snapshot(req.with_entities)?;
            if !req.render {
                snap.sky_light.clear();
                snap.block_light.clear();
            }
            if req.tx.send(snap).is_err() {
                log::debug!(target: "region", "snapshot future dropped coord={:?}", req.coord);
            }
        }
        Ok(())
    }

    /// Publishes snapshot fields, then performs the saves and unloads marked
    /// this tick. Returns true when the region holds no chunks afterwards.
    pub fn copy_snapshot(&self) -> Result<bool, RegionError> {
        self.shared.bind_owner();
        self.shared.snapshots.copy_all();
        let world = self.world()?;
        let mut saved = 0;
        let mut unloaded = 0;
        for coord in self.shared.save_queue.drain_all() {
            let Some(chunk) = self.slot(coord).read().clone() else {
                continue;
            };
            let drained = chunk.drain_save_state();
            if drained.save {
                chunk.take_modified();
                world.saver().submit_chunk(chunk.to_record()?);
                saved += 1;
            }
            if drained.unload && self.remove(&chunk) {
                chunk.set_unloaded()?;
                unloaded += 1;
                if !drained.save && !world.chunk_exists(coord) {
                    let (lx, _, lz) = coord.region_local();
                    self.generator.reset(self.generator.column_index(lx, lz));
                }
            }
        }
        if saved + unloaded > 0 {
            log::debug!(
                target: "region",
                "snapshot region={:?} saved={} unloaded={} remaining={}",
                self.coord,
                saved,
                unloaded,
                self.len()
            );
        }
        Ok(self.is_empty())
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("coord", &self.coord)
            .field("chunks", &self.len())
            .field("sequence", &self.sequence)
            .finish()
    }
}
