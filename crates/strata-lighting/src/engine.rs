use std::ops::AddAssign;
use std::sync::Arc;

use hashbrown::HashMap;
use strata_chunk::{Chunk, ChunkError, HEIGHT_UNKNOWN, LightChannel, LightOp, WorldContext};
use strata_world::{CHUNK_BITS, CHUNK_SIZE, ChunkCoord, block_local};

const FACES: [(i32, i32, i32); 6] = [
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, 1),
    (0, 0, -1),
];

#[inline]
fn unindex(i: u16) -> (usize, usize, usize) {
    let i = i as usize;
    let mask = CHUNK_SIZE - 1;
    (i & mask, i >> (2 * CHUNK_BITS), (i >> CHUNK_BITS) & mask)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LightStats {
    /// Chunk work batches taken from the queues.
    pub batches: usize,
    pub updates: usize,
    pub ops: usize,
    /// Stored values that actually changed.
    pub writes: usize,
}

impl AddAssign for LightStats {
    fn add_assign(&mut self, o: Self) {
        self.batches += o.batches;
        self.updates += o.updates;
        self.ops += o.ops;
        self.writes += o.writes;
    }
}

/// One readable light cell.
struct Cell {
    chunk: Arc<Chunk>,
    y: i32,
    x: i32,
    z: i32,
    lx: usize,
    ly: usize,
    lz: usize,
    id: u16,
    light: u8,
}

/// Chunk lookups cached for the duration of one batch.
struct Pass<'a> {
    ctx: &'a WorldContext,
    channel: LightChannel,
    chunks: HashMap<ChunkCoord, Option<Arc<Chunk>>>,
}

impl<'a> Pass<'a> {
    fn new(ctx: &'a WorldContext, channel: LightChannel) -> Self {
        Self {
            ctx,
            channel,
            chunks: HashMap::new(),
        }
    }

    fn chunk(&mut self, coord: ChunkCoord) -> Option<Arc<Chunk>> {
        let ctx = self.ctx;
        self.chunks
            .entry(coord)
            .or_insert_with(|| ctx.loaded_chunk(coord))
            .clone()
    }

    fn read(&self, chunk: Arc<Chunk>, lx: usize, ly: usize, lz: usize) -> Option<Cell> {
        let id = chunk.block_local(lx, ly, lz).ok()?.id;
        let light = chunk.light(self.channel, lx, ly, lz).ok()?;
        let (bx, by, bz) = chunk.coord().base();
        Some(Cell {
            x: bx + lx as i32,
            y: by + ly as i32,
            z: bz + lz as i32,
            chunk,
            lx,
            ly,
            lz,
            id,
            light,
        })
    }

    fn at(&mut self, x: i32, y: i32, z: i32) -> Option<Cell> {
        let chunk = self.chunk(ChunkCoord::from_block(x, y, z))?;
        let (lx, ly, lz) = block_local(x, y, z);
        self.read(chunk, lx, ly, lz)
    }

    fn neighbor(&mut self, c: &Cell, face: (i32, i32, i32)) -> Option<Cell> {
        let (dx, dy, dz) = face;
        let (nx, ny, nz) = (c.lx as i32 + dx, c.ly as i32 + dy, c.lz as i32 + dz);
        let inside = |v: i32| (0..CHUNK_SIZE as i32).contains(&v);
        if inside(nx) && inside(ny) && inside(nz) {
            self.read(c.chunk.clone(), nx as usize, ny as usize, nz as usize)
        } else {
            self.at(c.x + dx, c.y + dy, c.z + dz)
        }
    }
}

/// Flood-fill resolver for one light channel.
///
/// Work arrives per chunk as direct updates plus greater, lesser, and
/// refresh ops. Each batch applies updates first, then ops in that order.
/// Writes go through [`Chunk::set_light_sync`], which queues the follow-up
/// op on the written chunk, so propagation continues in later batches.
pub struct LightModel {
    ctx: Arc<WorldContext>,
    channel: LightChannel,
}

impl LightModel {
    pub fn new(ctx: Arc<WorldContext>, channel: LightChannel) -> Self {
        Self { ctx, channel }
    }

    pub fn channel(&self) -> LightChannel {
        self.channel
    }

    /// Chunks waiting for this channel.
    pub fn pending(&self) -> usize {
        self.ctx.light_queue(self.channel).len()
    }

    #[inline]
    fn opacity(&self, id: u16) -> u8 {
        self.ctx.registry.opacity(id).saturating_add(1)
    }

    #[inline]
    fn occludes(&self, id: u16) -> bool {
        self.ctx.registry.occludes(id)
    }

    fn is_source(&self, c: &Cell) -> bool {
        match self.channel {
            LightChannel::Block => self.ctx.registry.light_level(c.id) > 0,
            LightChannel::Sky => {
                if self.occludes(c.id) {
                    return false;
                }
                let h = c.chunk.column().surface_height(c.lx, c.lz);
                h == HEIGHT_UNKNOWN || c.y > h
            }
        }
    }

    /// Lowest value the cell may hold.
    fn floor(&self, c: &Cell) -> u8 {
        match self.channel {
            LightChannel::Block => self.ctx.registry.light_level(c.id),
            LightChannel::Sky => {
                if self.is_source(c) {
                    15
                } else {
                    0
                }
            }
        }
    }

    /// Occluding cells only carry light if they emit it.
    fn participates(&self, c: &Cell) -> bool {
        !self.occludes(c.id) || self.is_source(c)
    }

    fn set(&self, c: &Cell, value: u8, stats: &mut LightStats) -> Result<(), ChunkError> {
        let old = c
            .chunk
            .set_light_sync(self.channel, c.lx, c.ly, c.lz, value)?;
        if old != value {
            stats.writes += 1;
        }
        Ok(())
    }

    /// Processes up to `budget` chunk batches.
    pub fn resolve(&self, budget: usize) -> Result<LightStats, ChunkError> {
        let queue = self.ctx.light_queue(self.channel);
        let mut stats = LightStats::default();
        while stats.batches < budget {
            let coords = queue.drain(budget - stats.batches);
            if coords.is_empty() {
                break;
            }
            stats.batches += coords.len();
            let mut pass = Pass::new(&self.ctx, self.channel);
            let mut greater = Vec::new();
            let mut lesser = Vec::new();
            let mut refresh = Vec::new();
            for coord in coords {
                let Some(chunk) = pass.chunk(coord) else {
                    log::trace!(target: "light", "dropping work for unloaded chunk coord={:?}", coord);
                    continue;
                };
                let work = chunk.take_light_work(self.channel);
                for (i, value) in work.updates {
                    stats.updates += 1;
                    let (lx, ly, lz) = unindex(i);
                    if let Some(c) = pass.read(chunk.clone(), lx, ly, lz) {
                        let v = value.max(self.floor(&c));
                        self.set(&c, v, &mut stats)?;
                    }
                }
                for (i, op) in work.ops {
                    stats.ops += 1;
                    let target = (chunk.clone(), i);
                    match op {
                        LightOp::Greater => greater.push(target),
                        LightOp::Lesser => lesser.push(target),
                        LightOp::Refresh => refresh.push(target),
                    }
                }
            }
            for (chunk, i) in greater {
                let (lx, ly, lz) = unindex(i);
                if let Some(c) = pass.read(chunk, lx, ly, lz) {
                    self.greater(&mut pass, &c, &mut stats)?;
                }
            }
            for (chunk, i) in lesser {
                let (lx, ly, lz) = unindex(i);
                if let Some(c) = pass.read(chunk, lx, ly, lz) {
                    self.lesser(&mut pass, &c, &mut stats)?;
                }
            }
            for (chunk, i) in refresh {
                let (lx, ly, lz) = unindex(i);
                if let Some(c) = pass.read(chunk, lx, ly, lz) {
                    self.refresh(&mut pass, &c, &mut stats)?;
                }
            }
        }
        Ok(stats)
    }

    /// Raises every neighbor the center can now light further.
    fn greater(&self, pass: &mut Pass<'_>, c: &Cell, stats: &mut LightStats) -> Result<(), ChunkError> {
        if c.light == 0 || !self.participates(c) {
            return Ok(());
        }
        for face in FACES {
            let Some(n) = pass.neighbor(c, face) else {
                continue;
            };
            if self.occludes(n.id) {
                continue;
            }
            let v = c.light.saturating_sub(self.opacity(n.id));
            if v > n.light {
                self.set(&n, v, stats)?;
            }
        }
        Ok(())
    }

    /// The center went darker: each neighbor either still has a brighter
    /// supplier and re-spreads, or drops to its floor and cascades.
    fn lesser(&self, pass: &mut Pass<'_>, c: &Cell, stats: &mut LightStats) -> Result<(), ChunkError> {
        for face in FACES {
            let Some(n) = pass.neighbor(c, face) else {
                continue;
            };
            if n.light == 0 || !self.participates(&n) {
                continue;
            }
            let floor = self.floor(&n);
            if n.light == 15 || n.light <= floor || self.justified(pass, &n) {
                n.chunk
                    .add_light_op(self.channel, n.lx, n.ly, n.lz, LightOp::Greater)?;
                continue;
            }
            self.set(&n, floor, stats)?;
            if floor > 0 {
                n.chunk
                    .add_light_op(self.channel, n.lx, n.ly, n.lz, LightOp::Greater)?;
            }
        }
        Ok(())
    }

    /// Some neighbor still supplies at least the cell's current value.
    fn justified(&self, pass: &mut Pass<'_>, c: &Cell) -> bool {
        let need = u16::from(c.light) + u16::from(self.opacity(c.id));
        FACES.iter().any(|face| {
            pass.neighbor(c, *face)
                .is_some_and(|m| self.participates(&m) && u16::from(m.light) >= need)
        })
    }

    fn refresh(&self, pass: &mut Pass<'_>, c: &Cell, stats: &mut LightStats) -> Result<(), ChunkError> {
        if self.occludes(c.id) {
            return Ok(());
        }
        let floor = self.floor(c);
        if self.channel == LightChannel::Sky && c.light == 15 && floor == 15 {
            return Ok(());
        }
        let op = self.opacity(c.id);
        let mut v = floor;
        for face in FACES {
            if let Some(m) = pass.neighbor(c, face) {
                if self.participates(&m) {
                    v = v.max(m.light.saturating_sub(op));
                }
            }
        }
        if v != c.light {
            self.set(c, v, stats)?;
        }
        Ok(())
    }
}

/// The block-light and sky-light models of one world, driven once per
/// tick during the lighting stage.
pub struct LightingEngine {
    block: LightModel,
    sky: LightModel,
    budget: usize,
}

impl LightingEngine {
    pub fn new(ctx: Arc<WorldContext>) -> Self {
        let budget = ctx.config.limits.light_batches_per_tick.max(1);
        Self {
            block: LightModel::new(ctx.clone(), LightChannel::Block),
            sky: LightModel::new(ctx, LightChannel::Sky),
            budget,
        }
    }

    pub fn model(&self, channel: LightChannel) -> &LightModel {
        match channel {
            LightChannel::Block => &self.block,
            LightChannel::Sky => &self.sky,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.block.pending() == 0 && self.sky.pending() == 0
    }

    /// One tick's worth of work for each channel.
    pub fn resolve_tick(&self) -> Result<LightStats, ChunkError> {
        let mut stats = self.block.resolve(self.budget)?;
        stats += self.sky.resolve(self.budget)?;
        if stats.batches > 0 {
            log::trace!(
                target: "light",
                "resolved batches={} updates={} ops={} writes={}",
                stats.batches,
                stats.updates,
                stats.ops,
                stats.writes
            );
        }
        Ok(stats)
    }

    /// Runs ticks until both queues drain or `max_ticks` is reached.
    pub fn resolve_until_idle(&self, max_ticks: usize) -> Result<LightStats, ChunkError> {
        let mut total = LightStats::default();
        for _ in 0..max_ticks {
            if self.is_idle() {
                break;
            }
            total += self.resolve_tick()?;
        }
        if !self.is_idle() {
            log::warn!(
                target: "light",
                "lighting still busy after {} ticks block={} sky={}",
                max_ticks,
                self.block.pending(),
                self.sky.pending()
            );
        }
        Ok(total)
    }
}
