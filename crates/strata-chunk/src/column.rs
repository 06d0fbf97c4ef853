use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};

use strata_io::ColumnRecord;
use strata_world::{BiomeMap, CHUNK_SIZE};

/// Height of a column cell nobody has computed yet.
pub const HEIGHT_UNKNOWN: i32 = i32::MIN;

const AREA: usize = CHUNK_SIZE * CHUNK_SIZE;

/// Surface height change reported by [`Column::notify_block_change`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeightChange {
    pub old: i32,
    pub new: i32,
}

/// Surface-height cache for the 16x16 cells of one vertical chunk stack.
///
/// Heights are the y of the topmost surface block. Cells start unknown and
/// are filled from generation or the terrain generator's estimate, then
/// maintained incrementally as blocks change.
pub struct Column {
    cx: i32,
    cz: i32,
    heights: Box<[AtomicI32]>,
    chunks: AtomicUsize,
    dirty: AtomicBool,
    biomes: OnceLock<BiomeMap>,
}

#[inline]
fn cell(x: usize, z: usize) -> usize {
    (z & (CHUNK_SIZE - 1)) * CHUNK_SIZE + (x & (CHUNK_SIZE - 1))
}

impl Column {
    pub fn new(cx: i32, cz: i32) -> Self {
        Self {
            cx,
            cz,
            heights: (0..AREA).map(|_| AtomicI32::new(HEIGHT_UNKNOWN)).collect(),
            chunks: AtomicUsize::new(0),
            dirty: AtomicBool::new(false),
            biomes: OnceLock::new(),
        }
    }

    pub fn from_record(cx: i32, cz: i32, rec: &ColumnRecord) -> Self {
        let col = Self::new(cx, cz);
        for (cell, h) in col.heights.iter().zip(rec.heights.iter()) {
            cell.store(*h, Ordering::Relaxed);
        }
        col
    }

    pub fn to_record(&self) -> ColumnRecord {
        ColumnRecord {
            heights: self.heights.iter().map(|h| h.load(Ordering::Acquire)).collect(),
        }
    }

    pub fn coords(&self) -> (i32, i32) {
        (self.cx, self.cz)
    }

    /// Raw height; [`HEIGHT_UNKNOWN`] if never computed.
    #[inline]
    pub fn surface_height(&self, x: usize, z: usize) -> i32 {
        self.heights[cell(x, z)].load(Ordering::Acquire)
    }

    pub fn is_known(&self, x: usize, z: usize) -> bool {
        self.surface_height(x, z) != HEIGHT_UNKNOWN
    }

    pub fn all_known(&self) -> bool {
        self.heights
            .iter()
            .all(|h| h.load(Ordering::Acquire) != HEIGHT_UNKNOWN)
    }

    /// Keeps the larger of the stored and offered heights. Generation calls
    /// this once per chunk, so the tallest chunk's answer wins.
    pub fn raise_height(&self, x: usize, z: usize, h: i32) -> bool {
        let prev = self.heights[cell(x, z)].fetch_max(h, Ordering::AcqRel);
        if h > prev {
            self.dirty.store(true, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Fills still-unknown cells from an estimate, indexed `z * 16 + x`.
    pub fn fill_unknown(&self, heights: &[i32]) {
        for (cell, h) in self.heights.iter().zip(heights.iter()) {
            if cell
                .compare_exchange(HEIGHT_UNKNOWN, *h, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.dirty.store(true, Ordering::Release);
            }
        }
    }

    /// Updates the cached height after the block at `y` changed.
    ///
    /// `surface` is whether the new block counts toward the height map.
    /// `surface_at` answers the same for lower cells while scanning down and
    /// returns `None` where the chunk is not loaded; the scan stops there.
    pub fn notify_block_change(
        &self,
        x: usize,
        y: i32,
        z: usize,
        surface: bool,
        mut surface_at: impl FnMut(i32) -> Option<bool>,
    ) -> Option<HeightChange> {
        let slot = &self.heights[cell(x, z)];
        loop {
            let old = slot.load(Ordering::Acquire);
            let new = if surface {
                if old != HEIGHT_UNKNOWN && y <= old {
                    return None;
                }
                y
            } else {
                if old != y {
                    return None;
                }
                let mut ny = y - 1;
                while let Some(false) = surface_at(ny) {
                    ny -= 1;
                }
                ny
            };
            if slot
                .compare_exchange(old, new, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.dirty.store(true, Ordering::Release);
                return Some(HeightChange { old, new });
            }
        }
    }

    pub fn register_chunk(&self) -> usize {
        self.chunks.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns true when this was the last registered chunk.
    pub fn deregister_chunk(&self) -> bool {
        let prev = self
            .chunks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        matches!(prev, Ok(1))
    }

    pub fn active_chunks(&self) -> usize {
        self.chunks.load(Ordering::Acquire)
    }

    /// First writer wins; biomes never change after generation.
    pub fn set_biomes(&self, map: BiomeMap) -> bool {
        self.biomes.set(map).is_ok()
    }

    pub fn biomes(&self) -> Option<&BiomeMap> {
        self.biomes.get()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }
}
