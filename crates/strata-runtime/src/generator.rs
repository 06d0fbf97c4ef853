use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;
use strata_chunk::{BlockStore, Chunk, ChunkInit};
use strata_lighting::{prefill_light, refresh_face, seed_generated};
use strata_world::{CHUNK_SIZE, ChunkCoord, REGION_CHUNKS};

use crate::error::RegionError;
use crate::region::Region;
use crate::snapshot_lock::SnapshotLock;
use crate::world::World;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ColumnState {
    None = 0,
    InProgressAsync = 1,
    InProgressSync = 2,
    /// Terrain is built and chunks are being published.
    Copying = 3,
    Copied = 4,
}

impl ColumnState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ColumnState::None,
            1 => ColumnState::InProgressAsync,
            2 => ColumnState::InProgressSync,
            3 => ColumnState::Copying,
            _ => ColumnState::Copied,
        }
    }
}

/// Fills a region, one `width` x `width` chunk column range at a time.
///
/// Each range is generated at most once. Requests race through a per-range
/// state word and lock: blocking callers wait on the lock, background
/// callers bail if someone else is already at it.
pub struct RegionGenerator {
    width: usize,
    per_side: usize,
    states: Box<[AtomicU8]>,
    locks: Box<[Mutex<()>]>,
}

impl RegionGenerator {
    pub fn new(width: usize) -> Result<Self, RegionError> {
        if width == 0 || !width.is_power_of_two() || width > REGION_CHUNKS {
            return Err(RegionError::InvalidWidth(width));
        }
        let per_side = REGION_CHUNKS / width;
        let n = per_side * per_side;
        Ok(Self {
            width,
            per_side,
            states: (0..n).map(|_| AtomicU8::new(ColumnState::None as u8)).collect(),
            locks: (0..n).map(|_| Mutex::new(())).collect(),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn columns(&self) -> usize {
        self.states.len()
    }

    /// Range index holding the region-local chunk column `(lx, lz)`.
    pub fn column_index(&self, lx: usize, lz: usize) -> usize {
        (lz / self.width) * self.per_side + lx / self.width
    }

    pub fn state(&self, index: usize) -> ColumnState {
        ColumnState::from_u8(self.states[index].load(Ordering::Acquire))
    }

    fn set_state(&self, index: usize, state: ColumnState) {
        self.states[index].store(state as u8, Ordering::Release);
    }

    /// Forgets that a range was generated, so a chunk dropped without being
    /// persisted can be generated again.
    pub fn reset(&self, index: usize) {
        let _ = self.states[index].compare_exchange(
            ColumnState::Copied as u8,
            ColumnState::None as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Generates range `index` of `region` unless that already happened.
    ///
    /// Returns true once the range is copied. A background request
    /// (`sync == false`) returns false instead of waiting on another
    /// request.
    pub fn generate(&self, world: &World, region: &Region, index: usize, sync: bool) -> Result<bool, RegionError> {
        self.generate_range(world, region, index, sync, world.context().config.touch_neighbors)
    }

    /// Background generation of a range bordering one that just finished.
    /// Does not touch further, so generation never spreads on its own.
    pub(crate) fn generate_for_neighbor(&self, world: &World, region: &Region, index: usize) -> Result<bool, RegionError> {
        self.generate_range(world, region, index, false, false)
    }

    fn generate_range(
        &self,
        world: &World,
        region: &Region,
        index: usize,
        sync: bool,
        touch: bool,
    ) -> Result<bool, RegionError> {
        match self.state(index) {
            ColumnState::Copied => return Ok(true),
            ColumnState::None => {}
            _ if !sync => return Ok(false),
            _ => {}
        }
        if sync && SnapshotLock::held_by_current_thread() {
            log::error!(
                target: "gen",
                "blocking generation under snapshot lock region={:?} column={}",
                region.coord(),
                index
            );
            return Err(RegionError::SnapshotLockHeld);
        }
        let _guard = if sync {
            self.locks[index].lock()
        } else {
            match self.locks[index].try_lock() {
                Some(g) => g,
                None => return Ok(false),
            }
        };
        if self.state(index) == ColumnState::Copied {
            return Ok(true);
        }
        self.set_state(
            index,
            if sync {
                ColumnState::InProgressSync
            } else {
                ColumnState::InProgressAsync
            },
        );
        match self.fill(world, region, index) {
            Ok(Some(published)) => {
                self.set_state(index, ColumnState::Copied);
                log::debug!(
                    target: "gen",
                    "column generated region={:?} column={} chunks={} sync={}",
                    region.coord(),
                    index,
                    published,
                    sync
                );
                world.touch_neighbors(self.origin(region, index), self.width, touch);
                Ok(true)
            }
            Ok(None) => {
                self.set_state(index, ColumnState::None);
                log::debug!(target: "gen", "generation abandoned region={:?} column={}", region.coord(), index);
                Ok(false)
            }
            Err(e) => {
                self.set_state(index, ColumnState::None);
                Err(e)
            }
        }
    }

    fn origin(&self, region: &Region, index: usize) -> ChunkCoord {
        let (ox, oz) = ((index % self.per_side) * self.width, (index / self.per_side) * self.width);
        region.coord().chunk_at(ox, 0, oz)
    }

    /// Builds the range and publishes its chunks. `None` when the region
    /// was retired before publication.
    fn fill(&self, world: &World, region: &Region, index: usize) -> Result<Option<usize>, RegionError> {
        let ctx = world.context();
        let reg = &ctx.registry;
        let terrain = world.terrain();
        let origin = self.origin(region, index);
        let w = self.width;
        let s = CHUNK_SIZE;

        let mut buf = world.buffers().acquire(origin);
        let biomes = terrain.generate(&mut buf);
        let (_, by, _) = buf.base;

        // Surface heights per chunk column, `oz * w + ox`, each `z * 16 + x`.
        let mut heights: Vec<Vec<i32>> = Vec::with_capacity(w * w);
        for oz in 0..w {
            for ox in 0..w {
                let (cx, cz) = (origin.cx + ox as i32, origin.cz + oz as i32);
                let h = world.with_column(cx, cz, |col| {
                    if !col.all_known() {
                        if let Some(hs) = terrain.surface_heights(cx, cz) {
                            col.fill_unknown(&hs);
                        }
                    }
                    for z in 0..s {
                        for x in 0..s {
                            let (bx, bz) = (ox * s + x, oz * s + z);
                            let top = (0..buf.sy)
                                .rev()
                                .find(|&y| reg.is_surface(buf.get_local(bx, y, bz).id));
                            if let Some(y) = top {
                                col.raise_height(x, z, by + y as i32);
                            }
                        }
                    }
                    if let Some(b) = biomes.get(oz * w + ox) {
                        col.set_biomes(b.clone());
                    }
                    (0..s * s)
                        .map(|i| col.surface_height(i % s, i / s))
                        .collect::<Vec<i32>>()
                });
                heights.push(h);
            }
        }

        // Disk lookups stay outside the snapshot lock; anything loaded in the
        // meantime is caught by the slot check below.
        let mut slots = Vec::with_capacity(REGION_CHUNKS * w * w);
        for oy in 0..REGION_CHUNKS {
            for oz in 0..w {
                for ox in 0..w {
                    let coord = origin.offset(ox as i32, oy as i32, oz as i32);
                    if !world.chunk_exists(coord) {
                        slots.push((coord, ox, oy, oz));
                    }
                }
            }
        }

        let _read = world.snapshot_lock().read();
        if region.is_retired() {
            return Ok(None);
        }
        self.set_state(index, ColumnState::Copying);
        let mut published = 0;
        for (coord, ox, oy, oz) in slots {
            if region.loaded_chunk(coord).is_some() {
                continue;
            }
            let blocks = buf.chunk_blocks(ox, oy, oz);
            let light = prefill_light(coord, &blocks, &heights[oz * w + ox], reg);
            let init = ChunkInit {
                coord,
                blocks: BlockStore::from_blocks(&blocks, ctx.config.dirty_capacity),
                light,
                populated: false,
                generation: ctx.next_generation(),
            };
            let chunk = world.with_column(coord.cx, coord.cz, |col| {
                Chunk::new(init, ctx.clone(), region.shared().clone(), col)
            });
            let (chunk, won) = region.publish(chunk);
            if !won {
                continue;
            }
            seed_generated(&chunk)?;
            region.shared().populate_queue.push(coord);
            ctx.counters.generated_chunks.fetch_add(1, Ordering::Relaxed);
            published += 1;
        }
        Ok(Some(published))
    }
}

/// Queues edge refreshes on loaded chunks bordering a freshly generated
/// range, including chunks in neighboring regions. Never loads.
pub(crate) fn refresh_borders(world: &World, origin: ChunkCoord, width: usize) {
    let w = width as i32;
    for oy in 0..REGION_CHUNKS as i32 {
        for i in 0..w {
            let sides = [
                (origin.offset(-1, oy, i), 1, 0),
                (origin.offset(w, oy, i), -1, 0),
                (origin.offset(i, oy, -1), 0, 1),
                (origin.offset(i, oy, w), 0, -1),
            ];
            for (coord, dx, dz) in sides {
                let Some(chunk) = world.loaded(coord) else {
                    continue;
                };
                if let Err(e) = refresh_face(&chunk, dx, dz) {
                    log::debug!(target: "gen", "border refresh skipped coord={:?} err={}", coord, e);
                }
            }
        }
    }
}

/// Generates the lateral neighbor ranges of a freshly generated range in the
/// background, creating regions on the far side of a region edge as needed.
/// A neighbor that is on disk or already loaded is left alone.
pub(crate) fn touch_neighbors(world: &World, origin: ChunkCoord, width: usize) {
    let w = width as i32;
    let sides = [
        origin.offset(-1, 0, 0),
        origin.offset(w, 0, 0),
        origin.offset(0, 0, -1),
        origin.offset(0, 0, w),
    ];
    for coord in sides {
        if let Err(e) = touch_range(world, coord) {
            log::warn!(target: "gen", "neighbor generation failed coord={:?} err={}", coord, e);
        }
    }
}

fn touch_range(world: &World, coord: ChunkCoord) -> Result<(), RegionError> {
    if world.chunk_exists(coord) || world.loaded(coord).is_some() {
        return Ok(());
    }
    // Region removal happens under the snapshot write lock, so holding the
    // read lock keeps a fresh region alive until the job is counted.
    let region = {
        let _read = world.snapshot_lock().read();
        let region = world.region_or_create(coord.region())?;
        if region.is_retired() {
            return Ok(());
        }
        region.job_started();
        region
    };
    let (lx, _, lz) = coord.region_local();
    let index = region.generator().column_index(lx, lz);
    let out = region.generator().generate_for_neighbor(world, &region, index);
    region.job_finished();
    if let Ok(true) = out {
        log::trace!(target: "gen", "neighbor range generated region={:?} column={}", region.coord(), index);
    }
    out.map(|_| ())
}
