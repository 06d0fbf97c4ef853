use std::sync::Arc;

use strata_blocks::Block;
use strata_world::ChunkCoord;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

/// Consumer of per-tick chunk deltas (network or render sync).
pub trait ChunkSync: Send + Sync {
    fn on_chunk_full_resend(&self, snapshot: &ChunkSnapshot);
    /// `(x, y, z)` are chunk-local.
    fn on_block_delta(&self, coord: ChunkCoord, x: usize, y: usize, z: usize, block: Block);
}

/// An entity that can watch chunks or live inside one.
pub trait ChunkObserver: Send + Sync {
    fn id(&self) -> EntityId;
    /// Chunk containing the entity's live position.
    fn position(&self) -> ChunkCoord;
    /// Chebyshev radius in chunks.
    fn view_distance(&self) -> u32;
    fn is_online(&self) -> bool {
        true
    }
    fn sync(&self) -> Option<&dyn ChunkSync> {
        None
    }
}

#[derive(Clone)]
pub struct ObserverEntry {
    pub observer: Arc<dyn ChunkObserver>,
    pub distance: u32,
}

impl ObserverEntry {
    /// Offline, or moved out of range of `coord`.
    pub fn is_expired(&self, coord: ChunkCoord) -> bool {
        if !self.observer.is_online() {
            return true;
        }
        let p = self.observer.position();
        let d = (p.cx - coord.cx)
            .abs()
            .max((p.cy - coord.cy).abs())
            .max((p.cz - coord.cz).abs());
        d as i64 > i64::from(self.distance)
    }
}

/// Copy of a chunk's blocks and light taken at a tick boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkSnapshot {
    pub coord: ChunkCoord,
    pub populated: bool,
    pub ids: Vec<u16>,
    pub data: Vec<u16>,
    pub sky_light: Vec<u8>,
    pub block_light: Vec<u8>,
    pub entities: Vec<EntityId>,
}

impl ChunkSnapshot {
    pub fn block(&self, x: usize, y: usize, z: usize) -> Block {
        let i = strata_world::local_index(x, y, z);
        Block::new(self.ids[i], self.data[i])
    }
}
